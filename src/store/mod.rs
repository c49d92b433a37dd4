//! JSON persistence for the usage ledger.
//!
//! The state file is a single JSON object:
//!
//! ```text
//! {
//!   "history": { "YYYY-MM-DD": bytes },
//!   "current_date": "YYYY-MM-DD",
//!   "current_usage": bytes
//! }
//! ```
//!
//! Saves go through a sibling temp file followed by a rename, so a crash
//! mid-write never leaves a truncated file behind. Loading never fails: a
//! missing or unreadable file yields a fresh ledger and a [`LoadOutcome`]
//! describing why.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::config;
use crate::core::{Rollover, UsageLedger};
use crate::error::AppError;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// On-disk shape of the ledger.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct StoredLedger {
    history: BTreeMap<String, u64>,
    current_date: String,
    current_usage: u64,
}

impl From<&UsageLedger> for StoredLedger {
    fn from(ledger: &UsageLedger) -> Self {
        Self {
            history: ledger
                .history()
                .iter()
                .map(|(d, b)| (format_date(*d), *b))
                .collect(),
            current_date: format_date(ledger.current_date()),
            current_usage: ledger.current_usage(),
        }
    }
}

/// How the ledger was obtained at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    /// Persisted state was read and validated.
    Restored,
    /// No state file existed; a default ledger was created.
    Missing,
    /// The file could not be read (`Io`) or did not match the expected shape
    /// (`Persistence`).
    Corrupt { reason: AppError },
    /// The stored `current_date` was not a valid calendar date.
    InvalidDate { value: String },
}

impl LoadOutcome {
    /// Whether the persisted state was discarded in favour of defaults.
    pub fn used_defaults(&self) -> bool {
        !matches!(self, LoadOutcome::Restored)
    }
}

/// Result of [`StateFile::load`].
#[derive(Debug)]
pub struct Loaded {
    pub ledger: UsageLedger,
    pub outcome: LoadOutcome,
    pub rollover: Option<Rollover>,
    /// Set when the post-load save failed. The in-memory ledger is still valid.
    pub save_error: Option<AppError>,
}

/// Handle to the ledger's JSON state file.
#[derive(Debug, Clone)]
pub struct StateFile {
    path: PathBuf,
}

impl StateFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Temp path used for write-then-rename: `<path>.tmp`.
    pub fn temp_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(config::TEMP_FILE_SUFFIX);
        PathBuf::from(name)
    }

    /// Load the ledger and bring it up to `today`.
    ///
    /// Defaults, rollovers and reconciliations are written back immediately so
    /// the file exists and is current from here on.
    pub fn load(&self, today: NaiveDate) -> Loaded {
        let (ledger, outcome, rollover) = match self.read_stored() {
            Ok(None) => (UsageLedger::new(today), LoadOutcome::Missing, None),
            Ok(Some(stored)) => match parse_date(&stored.current_date) {
                Some(current_date) => {
                    let history = parse_history(stored.history);
                    let (ledger, rollover) =
                        UsageLedger::restore(history, current_date, stored.current_usage, today);
                    (ledger, LoadOutcome::Restored, rollover)
                }
                None => (
                    UsageLedger::new(today),
                    LoadOutcome::InvalidDate {
                        value: stored.current_date,
                    },
                    None,
                ),
            },
            Err(reason) => (
                UsageLedger::new(today),
                LoadOutcome::Corrupt { reason },
                None,
            ),
        };

        match &outcome {
            LoadOutcome::Restored => tracing::info!(
                "Restored usage ledger from {} ({} days)",
                self.path.display(),
                ledger.history().len()
            ),
            LoadOutcome::Missing => {
                tracing::info!("No usage ledger at {}, starting fresh", self.path.display())
            }
            LoadOutcome::Corrupt { reason } => tracing::warn!(
                "Usage ledger at {} is unreadable, starting fresh: {reason}",
                self.path.display()
            ),
            LoadOutcome::InvalidDate { value } => tracing::warn!(
                "Usage ledger at {} has invalid current_date {value:?}, starting fresh",
                self.path.display()
            ),
        }
        if let Some(r) = &rollover {
            tracing::info!(
                "Rolled ledger forward {} -> {} ({} skipped days, {} evicted)",
                r.from,
                r.to,
                r.filled,
                r.evicted
            );
        }

        let save_error = self.save(&ledger).err();
        Loaded {
            ledger,
            outcome,
            rollover,
            save_error,
        }
    }

    /// Atomically replace the state file with `ledger`.
    pub fn save(&self, ledger: &UsageLedger) -> Result<(), AppError> {
        let json = serde_json::to_vec(&StoredLedger::from(ledger))?;
        self.write_atomic(&json).map_err(|e| {
            tracing::error!("Failed to save usage ledger: {e:#}");
            AppError::from(e)
        })
    }

    fn write_atomic(&self, bytes: &[u8]) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }

        let temp_path = self.temp_path();
        let written = fs::File::create(&temp_path)
            .and_then(|mut file| {
                file.write_all(bytes)?;
                file.sync_all()
            })
            .with_context(|| format!("Failed to write temp file: {}", temp_path.display()));
        if let Err(e) = written {
            let _ = fs::remove_file(&temp_path);
            return Err(e);
        }

        fs::rename(&temp_path, &self.path)
            .with_context(|| format!("Failed to rename temp file to: {}", self.path.display()))
    }

    /// `Ok(None)` when the file does not exist; `Err` when it exists but is unusable.
    fn read_stored(&self) -> Result<Option<StoredLedger>, AppError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            // NotFound, or ENOTDIR when a path component is a regular file.
            Err(_) if !self.path.exists() => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_str(&content)?))
    }
}

fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s, DATE_FORMAT).ok()
}

/// Keys that are not dates are dropped.
fn parse_history(raw: BTreeMap<String, u64>) -> BTreeMap<NaiveDate, u64> {
    raw.into_iter()
        .filter_map(|(key, bytes)| match parse_date(&key) {
            Some(date) => Some((date, bytes)),
            None => {
                tracing::debug!("Dropping history entry with invalid date key {key:?}");
                None
            }
        })
        .collect()
}
