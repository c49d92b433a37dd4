//! Pure presentation helpers over the ledger.
//!
//! These functions take plain parameters and can be unit-tested without a
//! running accounting loop.

use chrono::NaiveDate;
use serde::Serialize;

use crate::core::UsageLedger;
use crate::error::AppError;

/// One row of the history table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoryRow {
    pub date: NaiveDate,
    pub bytes: u64,
    /// Human-readable size, e.g. `"1.50 MB"`.
    pub usage: String,
}

/// Immutable view of the ledger handed to the presentation layer after each tick.
#[derive(Debug, Clone, Serialize)]
pub struct UsageSnapshot {
    pub current_date: NaiveDate,
    pub today_bytes: u64,
    pub today_label: String,
    /// Newest first.
    pub history: Vec<HistoryRow>,
    /// Most recent save failure, cleared by the next successful save.
    pub last_error: Option<AppError>,
    /// Number of completed accounting ticks.
    pub tick: u64,
}

/// Build a snapshot of `ledger` for the presentation layer.
pub fn build_snapshot(
    ledger: &UsageLedger,
    last_error: Option<AppError>,
    tick: u64,
) -> UsageSnapshot {
    UsageSnapshot {
        current_date: ledger.current_date(),
        today_bytes: ledger.current_usage(),
        today_label: format_bytes(ledger.current_usage()),
        history: history_rows(ledger),
        last_error,
        tick,
    }
}

/// History rows sorted by date, newest first.
pub fn history_rows(ledger: &UsageLedger) -> Vec<HistoryRow> {
    ledger
        .history_desc()
        .map(|(date, bytes)| HistoryRow {
            date,
            bytes,
            usage: format_bytes(bytes),
        })
        .collect()
}

/// Format a byte count with two decimals in 1024-based units, up to PB.
pub fn format_bytes(bytes: u64) -> String {
    let mut value = bytes as f64;
    for unit in ["B", "KB", "MB", "GB", "TB"] {
        if value < 1024.0 {
            return format!("{value:.2} {unit}");
        }
        value /= 1024.0;
    }
    format!("{value:.2} PB")
}
