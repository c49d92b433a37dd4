//! Collaborator interface consumed by the presentation layer.
//!
//! - `usage`: today's label, history snapshot, tick subscription
//! - `logic`: Pure snapshot and formatting functions (unit-testable)
//! - `state`: Shared `AppState` definition

pub mod logic;
mod state;
pub mod usage;

pub use logic::{format_bytes, HistoryRow, UsageSnapshot};
pub use state::AppState;
