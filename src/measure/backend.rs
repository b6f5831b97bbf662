//! The external measurement capability, seen from the runner.

use serde::Serialize;
use thiserror::Error;

/// Server chosen by [`SpeedTestBackend::select_best_server`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServerDescriptor {
    pub id: String,
    pub host: String,
    pub sponsor: String,
    pub name: String,
    pub latency_ms: Option<f64>,
}

/// Failure reported by a backend call.
#[derive(Debug, Error)]
pub enum BackendError {
    /// Test configuration or server list could not be retrieved.
    #[error("{0}")]
    Config(String),

    /// The transfer itself failed.
    #[error("{0}")]
    Transport(String),

    #[error("{0}")]
    Other(String),
}

/// Blocking speed test capability.
///
/// Calls are made in order on a dedicated background thread: server
/// selection, download, upload, then `latency_ms`. Progress callbacks take a
/// `(completed, total)` pair in whatever unit the backend counts.
pub trait SpeedTestBackend: Send {
    fn select_best_server(&mut self) -> Result<ServerDescriptor, BackendError>;

    /// Returns the download rate in bits per second.
    fn measure_download(
        &mut self,
        progress: &mut dyn FnMut(u64, u64),
    ) -> Result<Option<f64>, BackendError>;

    /// Returns the upload rate in bits per second.
    fn measure_upload(
        &mut self,
        progress: &mut dyn FnMut(u64, u64),
    ) -> Result<Option<f64>, BackendError>;

    /// Latency in milliseconds observed during the earlier phases.
    fn latency_ms(&self) -> Option<f64>;
}

/// Creates a fresh backend for each session.
pub trait BackendFactory: Send + Sync {
    fn create(&self) -> Result<Box<dyn SpeedTestBackend>, BackendError>;
}

impl<F> BackendFactory for F
where
    F: Fn() -> Result<Box<dyn SpeedTestBackend>, BackendError> + Send + Sync,
{
    fn create(&self) -> Result<Box<dyn SpeedTestBackend>, BackendError> {
        self()
    }
}
