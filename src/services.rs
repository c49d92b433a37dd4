//! Background service lifecycle management.
//!
//! `AccountingLoop` owns the sampler and the ledger exclusively and runs one
//! tick per interval: sample delta, roll to today, apply delta, persist.
//! Readers only ever see the immutable snapshots it publishes.
//!
//! The loop runs on a dedicated named thread because every save does a
//! blocking write and `sync_all`.

use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::Context;
use tokio::sync::watch;

use crate::commands::logic::build_snapshot;
use crate::commands::{AppState, UsageSnapshot};
use crate::config;
use crate::core::{Clock, CounterSampler, CounterSource, Rollover, UsageLedger};
use crate::error::AppError;
use crate::store::{Loaded, StateFile};

/// What happened during one tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickReport {
    /// `None` when the counter read failed and no delta was applied.
    pub delta: Option<u64>,
    pub rollover: Option<Rollover>,
    /// Whether a save was attempted and succeeded.
    pub saved: bool,
}

/// The single owner of accounting state.
pub struct AccountingLoop<S, C> {
    sampler: CounterSampler<S>,
    ledger: UsageLedger,
    store: StateFile,
    clock: C,
    /// Set when the in-memory ledger is ahead of the file.
    dirty: bool,
    last_error: Option<AppError>,
    ticks: u64,
    publisher: watch::Sender<UsageSnapshot>,
}

impl<S: CounterSource, C: Clock> AccountingLoop<S, C> {
    /// Wire a loaded ledger to its sampler and clock and return the read side.
    pub fn new(
        sampler: CounterSampler<S>,
        loaded: Loaded,
        store: StateFile,
        clock: C,
    ) -> (Self, AppState) {
        let Loaded {
            ledger,
            save_error,
            ..
        } = loaded;
        let dirty = save_error.is_some();
        let initial = build_snapshot(&ledger, save_error.clone(), 0);
        let (publisher, snapshot) = watch::channel(initial);
        let state = AppState {
            snapshot,
            data_file: store.path().to_path_buf(),
        };
        let accounting = Self {
            sampler,
            ledger,
            store,
            clock,
            dirty,
            last_error: save_error,
            ticks: 0,
            publisher,
        };
        (accounting, state)
    }

    /// Run one accounting cycle and publish the resulting snapshot.
    pub fn tick(&mut self) -> TickReport {
        let delta = match self.sampler.delta() {
            Ok(delta) => Some(delta),
            Err(e) => {
                tracing::warn!("Skipping tick, counter read failed: {e}");
                None
            }
        };

        let rollover = self.ledger.roll_to_today(self.clock.today());
        if let Some(r) = &rollover {
            tracing::info!(
                "Day changed {} -> {} ({} skipped days, {} evicted)",
                r.from,
                r.to,
                r.filled,
                r.evicted
            );
            self.dirty = true;
        }

        if let Some(bytes) = delta {
            if self.ledger.apply_delta(bytes) {
                self.dirty = true;
            }
        }

        let saved = self.dirty && self.persist();
        self.ticks += 1;
        self.publish();

        TickReport {
            delta,
            rollover,
            saved,
        }
    }

    /// Save if anything is pending. Used on shutdown.
    pub fn flush(&mut self) -> bool {
        if !self.dirty {
            return true;
        }
        let saved = self.persist();
        self.publish();
        saved
    }

    fn persist(&mut self) -> bool {
        match self.store.save(&self.ledger) {
            Ok(()) => {
                if self.last_error.take().is_some() {
                    tracing::info!("Usage ledger saved again after earlier failure");
                }
                self.dirty = false;
                true
            }
            Err(e) => {
                // Keep dirty so the next tick retries.
                self.last_error = Some(e);
                false
            }
        }
    }

    fn publish(&self) {
        self.publisher.send_replace(build_snapshot(
            &self.ledger,
            self.last_error.clone(),
            self.ticks,
        ));
    }

    pub fn ledger(&self) -> &UsageLedger {
        &self.ledger
    }

    /// Tick every `interval` until `stop` receives a message or its sender
    /// is dropped, then flush. Blocks the calling thread.
    pub fn run(mut self, interval: Duration, stop: mpsc::Receiver<()>) -> Self {
        loop {
            match stop.recv_timeout(interval) {
                Err(RecvTimeoutError::Timeout) => {
                    self.tick();
                }
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        if !self.flush() {
            tracing::error!("Final save of usage ledger failed");
        }
        self
    }
}

/// Handles for the workers spawned by [`BackgroundServices::start`].
pub struct BackgroundServices<S, C> {
    stop: mpsc::Sender<()>,
    accounting: JoinHandle<AccountingLoop<S, C>>,
    reporter: tokio::task::JoinHandle<()>,
}

impl<S, C> BackgroundServices<S, C>
where
    S: CounterSource + 'static,
    C: Clock + 'static,
{
    /// Start the accounting thread and the snapshot reporter task.
    ///
    /// Must be called from inside a tokio runtime.
    pub fn start(accounting: AccountingLoop<S, C>, state: AppState) -> anyhow::Result<Self> {
        let (stop, stop_rx) = mpsc::channel();
        let interval = Duration::from_secs(config::TICK_INTERVAL_SECS);
        let accounting = std::thread::Builder::new()
            .name("usage-accounting".into())
            .spawn(move || accounting.run(interval, stop_rx))
            .context("Failed to spawn usage accounting thread")?;
        let reporter = tokio::spawn(report_snapshots(state));
        Ok(Self {
            stop,
            accounting,
            reporter,
        })
    }

    /// Stop ticking, wait for the final save, and return the loop.
    pub async fn shutdown(self) -> Option<AccountingLoop<S, C>> {
        let _ = self.stop.send(());
        let handle = self.accounting;
        let joined = tokio::task::spawn_blocking(move || handle.join()).await;
        self.reporter.abort();
        match joined {
            Ok(Ok(accounting)) => Some(accounting),
            Ok(Err(_)) => {
                tracing::error!("Accounting thread panicked");
                None
            }
            Err(e) => {
                tracing::error!("Failed to join accounting thread: {e}");
                None
            }
        }
    }
}

/// Headless stand-in for a view: logs day changes and save failures as they happen.
async fn report_snapshots(state: AppState) {
    let mut ticks = state.snapshot.clone();
    let (mut date, mut had_error) = {
        let s = ticks.borrow_and_update();
        (s.current_date, s.last_error.is_some())
    };
    tracing::info!(
        "Tracking usage in {} (today {}: {})",
        state.data_file.display(),
        date,
        ticks.borrow().today_label
    );

    while ticks.changed().await.is_ok() {
        let snapshot = ticks.borrow_and_update().clone();
        if snapshot.current_date != date {
            if let Some(previous) = snapshot.history.iter().find(|row| row.date == date) {
                tracing::info!("Usage for {}: {}", previous.date, previous.usage);
            }
            date = snapshot.current_date;
        }
        match (&snapshot.last_error, had_error) {
            (Some(e), false) => tracing::error!("Failed to save data: {e}"),
            (None, true) => tracing::info!("Saving data recovered"),
            _ => {}
        }
        had_error = snapshot.last_error.is_some();
        tracing::debug!("Today's usage: {}", snapshot.today_label);
    }
}
