//! Unified error type for the accounting engine and its collaborator interface.
//!
//! `AppError` serializes as `{ "kind": "...", "message": "..." }` so a
//! presentation layer can programmatically distinguish error categories.

use serde::ser::SerializeStruct;

/// Application-level error.
///
/// Each variant maps to a distinct failure domain. None of them is fatal to
/// the accounting loop.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AppError {
    /// Ledger file could not be encoded, decoded or written.
    #[error("{0}")]
    Persistence(String),

    /// The OS network counter could not be read.
    #[error("{0}")]
    Counter(String),

    /// I/O and OS-level errors reading the ledger file.
    #[error("{0}")]
    Io(String),
}

impl AppError {
    /// Returns the error kind as a string matching the variant name.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Persistence(_) => "Persistence",
            AppError::Counter(_) => "Counter",
            AppError::Io(_) => "Io",
        }
    }
}

impl serde::Serialize for AppError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut s = serializer.serialize_struct("AppError", 2)?;
        s.serialize_field("kind", self.kind())?;
        s.serialize_field("message", &self.to_string())?;
        s.end()
    }
}

// ---- From implementations for ergonomic error conversion ----

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Persistence(format!("{err:#}"))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Persistence(err.to_string())
    }
}
