//! netgauge -- Internet speed tests with a persistent result history.
//!
//! This crate provides the measurement runner and its progress channel, the
//! append-only history store, host network information, and the formatting
//! used by the `netgauge` terminal front end.

pub mod config;
pub mod diagnostics;
pub mod history;
pub mod logging;
pub mod measure;
pub mod network;
pub mod presenter;
pub mod progress;
pub mod report;

use std::sync::Arc;

use config::Settings;
use diagnostics::DiagnosticSink;
use history::HistoryStore;
use measure::http::HttpBackend;
use measure::{BackendError, MeasurementRunner, SpeedTestBackend};

/// History store at the configured location with the configured
/// corruption policy.
pub fn open_history(settings: &Settings, sink: Arc<dyn DiagnosticSink>) -> HistoryStore {
    HistoryStore::new(settings.history_path(), sink).with_policy(settings.history.on_corruption)
}

/// Runner backed by the HTTP speed test backend. Results go to `store`
/// when `auto_save` is set.
pub fn build_runner(
    settings: &Settings,
    store: Arc<HistoryStore>,
    auto_save: bool,
    sink: Arc<dyn DiagnosticSink>,
) -> MeasurementRunner {
    let backend_config = settings.backend_config();
    tracing::debug!(server = %backend_config.server_url, "configuring HTTP backend");
    let factory = move || -> Result<Box<dyn SpeedTestBackend>, BackendError> {
        Ok(Box::new(HttpBackend::new(backend_config.clone())?))
    };
    MeasurementRunner::new(Arc::new(factory), sink).with_results(store, auto_save)
}
