//! Centralized runtime constants for NetLedger.
//!
//! All tunable intervals, retention sizes, and file locations are collected here
//! so they can be found and adjusted in a single place.

use std::path::PathBuf;

use anyhow::{Context, Result};

/// Interval at which the accounting loop samples the counter and updates the ledger (seconds).
pub const TICK_INTERVAL_SECS: u64 = 1;

/// Number of calendar days kept in the usage history, today included.
pub const RETENTION_DAYS: u32 = 30;

/// File name of the persisted ledger inside the user's home directory.
pub const DATA_FILE_NAME: &str = ".data_usage_monitor.json";

/// Suffix appended to the data file path for the write-then-rename temp file.
pub const TEMP_FILE_SUFFIX: &str = ".tmp";

/// Environment variable that overrides the data file location.
pub const DATA_FILE_ENV: &str = "NETLEDGER_DATA_FILE";

/// Log filter used when `RUST_LOG` is not set.
pub const DEFAULT_LOG_FILTER: &str = "netledger=info,netledger_lib=info";

/// Resolve the ledger file path: `$NETLEDGER_DATA_FILE` if set, else `~/.data_usage_monitor.json`.
pub fn data_file_path() -> Result<PathBuf> {
    resolve_data_file(std::env::var_os(DATA_FILE_ENV).map(PathBuf::from))
}

fn resolve_data_file(override_path: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(path) = override_path.filter(|p| !p.as_os_str().is_empty()) {
        return Ok(path);
    }
    let home =
        dirs::home_dir().context("Could not determine home directory for the usage ledger")?;
    Ok(home.join(DATA_FILE_NAME))
}
