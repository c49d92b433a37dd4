//! Usage queries for the presentation layer.

use chrono::NaiveDate;
use tokio::sync::watch;

use crate::error::AppError;

use super::logic::UsageSnapshot;
use super::state::AppState;

/// Formatted size of today's usage.
pub fn get_today_label(state: &AppState) -> String {
    state.snapshot.borrow().today_label.clone()
}

/// `(date, formatted size)` pairs, newest first.
pub fn get_history_snapshot(state: &AppState) -> Vec<(NaiveDate, String)> {
    state
        .snapshot
        .borrow()
        .history
        .iter()
        .map(|row| (row.date, row.usage.clone()))
        .collect()
}

/// The latest save failure, if the most recent save did not succeed.
pub fn get_last_error(state: &AppState) -> Option<AppError> {
    state.snapshot.borrow().last_error.clone()
}

/// Receiver that is notified after each accounting tick.
pub fn subscribe_ticks(state: &AppState) -> watch::Receiver<UsageSnapshot> {
    state.snapshot.clone()
}
