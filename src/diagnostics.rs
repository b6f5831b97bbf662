//! Diagnostic sink shared by the measurement runner and the history store.
//!
//! Components never reach for a global logger directly; they are handed an
//! `Arc<dyn DiagnosticSink>` at construction time. The production sink
//! forwards to `tracing`, tests use [`MemorySink`] to assert on what was
//! reported.

use std::sync::Mutex;

use serde::Serialize;

/// Severity of a diagnostic event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Debug,
    Info,
    Warn,
    Error,
}

/// A single diagnostic event emitted by a component.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiagnosticEvent {
    pub severity: Severity,
    /// Emitting component, e.g. `"runner"` or `"history"`.
    pub component: &'static str,
    pub message: String,
}

impl DiagnosticEvent {
    pub fn new(severity: Severity, component: &'static str, message: impl Into<String>) -> Self {
        Self {
            severity,
            component,
            message: message.into(),
        }
    }

    pub fn debug(component: &'static str, message: impl Into<String>) -> Self {
        Self::new(Severity::Debug, component, message)
    }

    pub fn info(component: &'static str, message: impl Into<String>) -> Self {
        Self::new(Severity::Info, component, message)
    }

    pub fn warn(component: &'static str, message: impl Into<String>) -> Self {
        Self::new(Severity::Warn, component, message)
    }

    pub fn error(component: &'static str, message: impl Into<String>) -> Self {
        Self::new(Severity::Error, component, message)
    }
}

/// Receiver of diagnostic events.
pub trait DiagnosticSink: Send + Sync {
    fn record(&self, event: DiagnosticEvent);
}

/// Forwards every event to `tracing` at the matching level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn record(&self, event: DiagnosticEvent) {
        let DiagnosticEvent {
            severity,
            component,
            message,
        } = event;
        match severity {
            Severity::Debug => tracing::debug!(component, "{}", message),
            Severity::Info => tracing::info!(component, "{}", message),
            Severity::Warn => tracing::warn!(component, "{}", message),
            Severity::Error => tracing::error!(component, "{}", message),
        }
    }
}

/// Keeps every event in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<DiagnosticEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all events recorded so far, in order.
    pub fn events(&self) -> Vec<DiagnosticEvent> {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Whether an event of `severity` whose message contains `needle` was recorded.
    pub fn contains(&self, severity: Severity, needle: &str) -> bool {
        self.events()
            .iter()
            .any(|e| e.severity == severity && e.message.contains(needle))
    }

    pub fn count(&self, severity: Severity) -> usize {
        self.events()
            .iter()
            .filter(|e| e.severity == severity)
            .count()
    }
}

impl DiagnosticSink for MemorySink {
    fn record(&self, event: DiagnosticEvent) {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(event);
    }
}
