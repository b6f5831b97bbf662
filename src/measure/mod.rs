//! Measurement orchestration: drives a [`SpeedTestBackend`] through server
//! selection, download and upload on a background thread and publishes
//! progress for the presentation layer to poll.

pub mod backend;
pub mod http;
pub mod runner;
pub mod session;

use serde::Serialize;
use thiserror::Error;

pub use backend::{BackendError, BackendFactory, ServerDescriptor, SpeedTestBackend};
pub use runner::{MeasurementRunner, ResultSink, SessionHandle};
pub use session::{MeasurementOutcome, Phase, PhaseRange, SessionSnapshot};

/// Classified failure of a measurement session.
#[derive(Debug, Clone, PartialEq, Error, Serialize)]
#[serde(tag = "kind", content = "message")]
pub enum MeasureError {
    /// Server selection or backend setup failed, usually no connectivity.
    #[error("Error retrieving configuration: {0}")]
    #[serde(rename = "ConfigurationError")]
    Configuration(String),

    /// A phase finished without a usable number.
    #[error("Measurement failed: {0}")]
    #[serde(rename = "MeasurementError")]
    Measurement(String),

    /// Anything else raised by the backend.
    #[error("An error occurred: {0}")]
    #[serde(rename = "ExecutionError")]
    Execution(String),
}

impl MeasureError {
    pub fn kind(&self) -> &'static str {
        match self {
            MeasureError::Configuration(_) => "ConfigurationError",
            MeasureError::Measurement(_) => "MeasurementError",
            MeasureError::Execution(_) => "ExecutionError",
        }
    }

    pub fn message(&self) -> &str {
        match self {
            MeasureError::Configuration(m)
            | MeasureError::Measurement(m)
            | MeasureError::Execution(m) => m,
        }
    }
}

/// Convert a raw rate in bits per second to megabits per second, rounded to
/// two decimals. Missing, non-finite and negative rates yield `None`.
pub fn bits_to_mbps(raw_bps: Option<f64>) -> Option<f64> {
    let raw = raw_bps?;
    if !raw.is_finite() || raw < 0.0 {
        return None;
    }
    Some((raw / 1_000_000.0 * 100.0).round() / 100.0)
}
