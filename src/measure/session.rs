//! Session state shared between the runner thread and its observers.

use serde::Serialize;
use uuid::Uuid;

use super::{MeasureError, ServerDescriptor};

/// Stage of a measurement session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Idle,
    SelectingServer,
    Downloading,
    Uploading,
    Complete,
    Failed,
}

impl Phase {
    pub fn label(&self) -> &'static str {
        match self {
            Phase::Idle => "Ready",
            Phase::SelectingServer => "Finding best server...",
            Phase::Downloading => "Testing download speed...",
            Phase::Uploading => "Testing upload speed...",
            Phase::Complete => "Test complete!",
            Phase::Failed => "Test failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::Complete | Phase::Failed)
    }

    /// Whether the session is doing network work in this phase.
    pub fn is_running(&self) -> bool {
        matches!(
            self,
            Phase::SelectingServer | Phase::Downloading | Phase::Uploading
        )
    }
}

/// Slice `start..=end` of the overall progress scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseRange {
    pub start: u8,
    pub end: u8,
}

pub const SERVER_SELECTION: PhaseRange = PhaseRange::new(0, 20);
pub const DOWNLOAD: PhaseRange = PhaseRange::new(20, 60);
pub const UPLOAD: PhaseRange = PhaseRange::new(60, 90);
pub const FINALIZE: PhaseRange = PhaseRange::new(90, 100);

impl PhaseRange {
    pub const fn new(start: u8, end: u8) -> Self {
        Self { start, end }
    }

    /// Map a `(current, total)` callback pair onto this range.
    ///
    /// Returns `None` for a zero denominator. `current` beyond `total` is
    /// clamped to the end of the range.
    pub fn scale(&self, current: u64, total: u64) -> Option<u8> {
        if total == 0 {
            return None;
        }
        let fraction = current.min(total) as f64 / total as f64;
        let span = f64::from(self.end.saturating_sub(self.start));
        Some(self.start + (fraction * span).floor() as u8)
    }
}

/// Final numbers of a successful session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MeasurementOutcome {
    pub download_mbps: f64,
    pub upload_mbps: f64,
    pub ping_ms: f64,
}

/// Point-in-time view of a session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub session_id: Uuid,
    pub phase: Phase,
    pub progress_percent: u8,
    pub server: Option<ServerDescriptor>,
    pub outcome: Option<MeasurementOutcome>,
    pub error: Option<MeasureError>,
    /// Whether the outcome was handed to the result sink successfully.
    pub saved: bool,
    pub save_error: Option<String>,
}

impl SessionSnapshot {
    pub fn new(session_id: Uuid) -> Self {
        Self {
            session_id,
            phase: Phase::Idle,
            progress_percent: 0,
            server: None,
            outcome: None,
            error: None,
            saved: false,
            save_error: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.phase.is_terminal()
    }

    /// Status line in the form shown while a test runs.
    pub fn status_line(&self) -> String {
        format!("{} (Progress: {}%)", self.phase.label(), self.progress_percent)
    }
}
