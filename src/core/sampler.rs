//! Cumulative network counter sampling.
//!
//! Wraps the OS sent+received byte counter and turns successive readings into
//! non-negative deltas. A counter that goes backwards (interface reset, wrap)
//! yields a zero delta and the baseline moves to the new reading.

use sysinfo::Networks;

use crate::error::AppError;

/// One reading of the cumulative counters, summed across all interfaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CounterReading {
    pub sent: u64,
    pub received: u64,
}

impl CounterReading {
    pub fn total(&self) -> u64 {
        self.sent.saturating_add(self.received)
    }
}

/// Source of cumulative byte counters.
pub trait CounterSource: Send {
    fn read_cumulative(&mut self) -> Result<CounterReading, AppError>;
}

/// Counter source backed by `sysinfo`'s per-interface totals.
pub struct SysinfoCounter {
    networks: Networks,
}

impl SysinfoCounter {
    pub fn new() -> Self {
        Self {
            networks: Networks::new_with_refreshed_list(),
        }
    }
}

impl Default for SysinfoCounter {
    fn default() -> Self {
        Self::new()
    }
}

impl CounterSource for SysinfoCounter {
    fn read_cumulative(&mut self) -> Result<CounterReading, AppError> {
        self.networks.refresh();
        if self.networks.list().is_empty() {
            // Interfaces may have come up after startup.
            self.networks.refresh_list();
            if self.networks.list().is_empty() {
                return Err(AppError::Counter("no network interfaces reported".into()));
            }
        }

        let mut reading = CounterReading::default();
        for data in self.networks.list().values() {
            reading.sent = reading.sent.saturating_add(data.total_transmitted());
            reading.received = reading.received.saturating_add(data.total_received());
        }
        Ok(reading)
    }
}

/// Turns cumulative readings into per-interval deltas.
pub struct CounterSampler<S> {
    source: S,
    baseline: Option<u64>,
}

impl<S: CounterSource> CounterSampler<S> {
    /// Create a sampler and take the initial baseline reading.
    ///
    /// If the first read fails the baseline stays unset and the next
    /// successful read establishes it.
    pub fn new(mut source: S) -> Self {
        let baseline = match source.read_cumulative() {
            Ok(reading) => Some(reading.total()),
            Err(e) => {
                tracing::warn!("Initial counter read failed: {e}");
                None
            }
        };
        Self { source, baseline }
    }

    /// Current cumulative bytes (sent + received).
    pub fn sample(&mut self) -> Result<u64, AppError> {
        self.source.read_cumulative().map(|r| r.total())
    }

    /// Bytes transferred since the previous call.
    ///
    /// On a read failure the baseline is left untouched and the error is returned,
    /// so a later successful read does not produce an inflated delta.
    pub fn delta(&mut self) -> Result<u64, AppError> {
        let total = self.sample()?;
        let delta = match self.baseline {
            Some(baseline) if total >= baseline => total - baseline,
            Some(baseline) => {
                tracing::debug!("Counter went backwards ({baseline} -> {total}), clamping to 0");
                0
            }
            None => 0,
        };
        self.baseline = Some(total);
        Ok(delta)
    }

    pub fn baseline(&self) -> Option<u64> {
        self.baseline
    }
}
