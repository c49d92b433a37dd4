pub mod commands;
pub mod config;
pub mod core;
pub mod error;
pub mod services;
pub mod store;

use anyhow::Context;

use crate::core::{Clock, CounterSampler, SysinfoCounter, SystemClock};
use services::{AccountingLoop, BackgroundServices};
use store::StateFile;

/// Run the usage ledger until Ctrl-C.
pub fn run() -> anyhow::Result<()> {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        tracing::error!("PANIC in NetLedger: {info}");
        default_hook(info);
    }));

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config::DEFAULT_LOG_FILTER.into()),
        )
        .init();

    let data_file = config::data_file_path()?;
    let runtime = tokio::runtime::Runtime::new().context("Failed to start tokio runtime")?;

    runtime.block_on(async move {
        let clock = SystemClock;
        let store = StateFile::new(data_file);
        let loaded = store.load(clock.today());
        if let Some(e) = &loaded.save_error {
            tracing::error!("Failed to save data: {e}");
        }

        let sampler = CounterSampler::new(SysinfoCounter::new());
        let (accounting, state) = AccountingLoop::new(sampler, loaded, store, clock);
        let services = BackgroundServices::start(accounting, state)?;
        tracing::info!("NetLedger accounting started");

        let signal = tokio::signal::ctrl_c().await;
        if let Err(e) = &signal {
            tracing::error!("Failed to listen for Ctrl-C: {e}");
        }
        services.shutdown().await;
        tracing::info!("NetLedger stopped");
        signal.context("Failed to listen for shutdown signal")
    })
}
