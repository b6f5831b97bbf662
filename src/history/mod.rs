//! Measurement history: an append-only log of records persisted as a JSON
//! array, plus CSV/JSON export.
//!
//! The history file is owned by [`HistoryStore`]. Appends are a full
//! read-modify-write followed by an atomic rename, so a crash never leaves a
//! half-written file behind.

pub mod export;
pub mod record;
pub mod store;

use std::path::PathBuf;

use thiserror::Error;

pub use export::ExportFormat;
pub use record::{MeasurementRecord, TIMESTAMP_FORMAT, TIMESTAMP_PLACEHOLDER};
pub use store::{CorruptionPolicy, HistoryStore};

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("could not save history to {}: {reason}", .path.display())]
    Persistence { path: PathBuf, reason: String },

    #[error("history file {} is unreadable: {reason}", .path.display())]
    Corruption { path: PathBuf, reason: String },

    #[error("could not export history to {}: {reason}", .path.display())]
    Export { path: PathBuf, reason: String },

    #[error("refusing to save invalid record: {0}")]
    InvalidRecord(String),
}

impl HistoryError {
    /// Stable name of the error kind, as shown to users.
    pub fn kind(&self) -> &'static str {
        match self {
            HistoryError::Persistence { .. } => "PersistenceError",
            HistoryError::Corruption { .. } => "CorruptionError",
            HistoryError::Export { .. } => "ExportError",
            HistoryError::InvalidRecord(_) => "PersistenceError",
        }
    }
}
