//! Shared application state read by the presentation layer.

use std::path::PathBuf;

use tokio::sync::watch;

use super::logic::UsageSnapshot;

/// Read side of the accounting loop.
///
/// The loop publishes a fresh [`UsageSnapshot`] after every tick; readers
/// never touch the ledger itself.
#[derive(Clone)]
pub struct AppState {
    pub snapshot: watch::Receiver<UsageSnapshot>,
    /// Location of the persisted ledger, for diagnostics.
    pub data_file: PathBuf,
}
