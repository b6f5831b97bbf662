use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use super::export::{self, ExportFormat};
use super::{HistoryError, MeasurementRecord};
use crate::diagnostics::{DiagnosticEvent, DiagnosticSink};
use crate::measure::{MeasurementOutcome, ResultSink};

const COMPONENT: &str = "history";

/// What `append` does when the existing history file cannot be parsed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorruptionPolicy {
    /// Drop the unreadable content and start a fresh log with the new record.
    #[default]
    Discard,
    /// Refuse to append and leave the file untouched.
    #[serde(rename = "fail")]
    FailClosed,
}

/// Owner of the persisted history file.
pub struct HistoryStore {
    path: PathBuf,
    policy: CorruptionPolicy,
    sink: Arc<dyn DiagnosticSink>,
}

impl HistoryStore {
    pub fn new(path: impl Into<PathBuf>, sink: Arc<dyn DiagnosticSink>) -> Self {
        Self {
            path: path.into(),
            policy: CorruptionPolicy::default(),
            sink,
        }
    }

    pub fn with_policy(mut self, policy: CorruptionPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the history file exists at all.
    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Read the whole log.
    ///
    /// A missing file is an empty history. A file that exists but cannot be
    /// parsed is reported as [`HistoryError::Corruption`]; nothing is repaired.
    pub fn load(&self) -> Result<Vec<MeasurementRecord>, HistoryError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(HistoryError::Corruption {
                    path: self.path.clone(),
                    reason: e.to_string(),
                })
            }
        };

        parse(&bytes).map_err(|reason| {
            self.sink.record(DiagnosticEvent::error(
                COMPONENT,
                format!("could not read {}: {}", self.path.display(), reason),
            ));
            HistoryError::Corruption {
                path: self.path.clone(),
                reason,
            }
        })
    }

    /// Append one record with a read-modify-write of the whole file.
    ///
    /// The parent directory must already exist. Unparseable existing content
    /// is handled according to the store's [`CorruptionPolicy`].
    pub fn append(&self, record: MeasurementRecord) -> Result<(), HistoryError> {
        record.validate().map_err(HistoryError::InvalidRecord)?;

        let dir = self.directory();
        if !dir.is_dir() {
            let reason = format!("directory {} does not exist", dir.display());
            self.sink.record(DiagnosticEvent::error(COMPONENT, reason.clone()));
            return Err(self.persistence_error(reason));
        }

        let mut history = self.read_for_append()?;
        history.push(record);

        let body = to_pretty_json(&history).map_err(|e| self.persistence_error(e.to_string()))?;
        self.replace_contents(dir, &body)
            .map_err(|e| self.persistence_error(e.to_string()))?;

        self.sink.record(DiagnosticEvent::info(
            COMPONENT,
            format!(
                "saved record to {} ({} total)",
                self.path.display(),
                history.len()
            ),
        ));
        Ok(())
    }

    /// Write `records` to `destination`. Never touches the history file.
    pub fn export(
        &self,
        records: &[MeasurementRecord],
        destination: &Path,
        format: ExportFormat,
    ) -> Result<(), HistoryError> {
        if let Err(e) = export::write(records, destination, format) {
            self.sink
                .record(DiagnosticEvent::error(COMPONENT, e.to_string()));
            return Err(e);
        }
        self.sink.record(DiagnosticEvent::info(
            COMPONENT,
            format!(
                "exported {} record(s) as {} to {}",
                records.len(),
                format,
                destination.display()
            ),
        ));
        Ok(())
    }

    /// Load the log and export it in one step.
    pub fn export_all(&self, destination: &Path, format: ExportFormat) -> Result<usize, HistoryError> {
        let records = self.load()?;
        self.export(&records, destination, format)?;
        Ok(records.len())
    }

    fn read_for_append(&self) -> Result<Vec<MeasurementRecord>, HistoryError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(self.persistence_error(e.to_string())),
        };

        match parse(&bytes) {
            Ok(history) => Ok(history),
            Err(reason) => match self.policy {
                CorruptionPolicy::Discard => {
                    // Existing content is lost here.
                    self.sink.record(DiagnosticEvent::warn(
                        COMPONENT,
                        format!(
                            "{} is unreadable ({}); starting a new history",
                            self.path.display(),
                            reason
                        ),
                    ));
                    Ok(Vec::new())
                }
                CorruptionPolicy::FailClosed => {
                    self.sink.record(DiagnosticEvent::error(
                        COMPONENT,
                        format!(
                            "{} is unreadable ({}); refusing to overwrite it",
                            self.path.display(),
                            reason
                        ),
                    ));
                    Err(HistoryError::Corruption {
                        path: self.path.clone(),
                        reason,
                    })
                }
            },
        }
    }

    fn replace_contents(&self, dir: &Path, body: &[u8]) -> io::Result<()> {
        let mut tmp = NamedTempFile::new_in(dir)?;
        // Temp files are created owner-only; keep the mode of the file being replaced.
        if let Ok(meta) = fs::metadata(&self.path) {
            tmp.as_file().set_permissions(meta.permissions())?;
        }
        tmp.write_all(body)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| e.error)?;
        Ok(())
    }

    fn directory(&self) -> &Path {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        }
    }

    fn persistence_error(&self, reason: String) -> HistoryError {
        HistoryError::Persistence {
            path: self.path.clone(),
            reason,
        }
    }
}

impl ResultSink for HistoryStore {
    fn save_result(&self, outcome: &MeasurementOutcome) -> anyhow::Result<()> {
        self.append(MeasurementRecord::now(
            outcome.download_mbps,
            outcome.upload_mbps,
            outcome.ping_ms,
        ))?;
        Ok(())
    }
}

/// Parse and validate the full contents of a history file.
fn parse(bytes: &[u8]) -> Result<Vec<MeasurementRecord>, String> {
    let history: Vec<MeasurementRecord> =
        serde_json::from_slice(bytes).map_err(|e| e.to_string())?;
    for (idx, record) in history.iter().enumerate() {
        record
            .validate()
            .map_err(|reason| format!("record {}: {}", idx + 1, reason))?;
    }
    Ok(history)
}

/// Serialize with four-space indentation, matching existing history files.
fn to_pretty_json(history: &[MeasurementRecord]) -> serde_json::Result<Vec<u8>> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    history.serialize(&mut ser)?;
    buf.push(b'\n');
    Ok(buf)
}
