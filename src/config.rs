//! User settings, persisted as TOML in the netgauge data directory.
//!
//! Every field has a default, so a partial or empty file loads fine and the
//! missing keys are back-filled. Resolution order for the settings file:
//! 1. The path in the `NETGAUGE_CONFIG` environment variable.
//! 2. `<data dir>/settings.toml`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::Local;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::history::{CorruptionPolicy, TIMESTAMP_FORMAT};
use crate::measure::http::HttpBackendConfig;

const APP_DIR: &str = "netgauge";
const SETTINGS_FILE: &str = "settings.toml";
const HISTORY_FILE: &str = "history.json";

/// Root directory for settings, history and logs.
///
/// `NETGAUGE_HOME` wins; otherwise the platform's local data directory.
pub fn data_dir() -> PathBuf {
    if let Ok(home) = std::env::var("NETGAUGE_HOME") {
        if !home.trim().is_empty() {
            return PathBuf::from(home);
        }
    }
    dirs::data_local_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}

/// Create the data directory if needed and return it.
pub fn ensure_data_dir() -> Result<PathBuf> {
    let dir = data_dir();
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create data directory {}", dir.display()))?;
    Ok(dir)
}

pub fn default_settings_path() -> PathBuf {
    match std::env::var("NETGAUGE_CONFIG") {
        Ok(path) if !path.trim().is_empty() => PathBuf::from(path),
        _ => data_dir().join(SETTINGS_FILE),
    }
}

fn now_string() -> String {
    Local::now().format(TIMESTAMP_FORMAT).to_string()
}

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Append each successful measurement to the history.
    pub auto_save_results: bool,
    /// Print host and adapter details before a run.
    pub show_network_info: bool,
    /// Server host to use instead of the configured `measurement.server_url`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preferred_server_id: Option<String>,
    pub dark_mode: bool,
    /// Local time of the last run.
    pub last_used: String,
    pub measurement: MeasurementConfig,
    pub history: HistoryConfig,
    pub logging: LoggingConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            auto_save_results: true,
            show_network_info: true,
            preferred_server_id: None,
            dark_mode: false,
            last_used: now_string(),
            measurement: MeasurementConfig::default(),
            history: HistoryConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Settings {
    /// Load settings from a TOML file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read settings file: {}", path.display()))?;
        let settings: Self = toml::from_str(&content)
            .with_context(|| format!("failed to parse settings file: {}", path.display()))?;
        info!(path = %path.display(), "loaded settings");
        Ok(settings)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let body = toml::to_string_pretty(self).context("failed to serialize settings")?;
        std::fs::write(path, body)
            .with_context(|| format!("failed to write settings file: {}", path.display()))?;
        info!(path = %path.display(), "settings saved");
        Ok(())
    }

    /// Stamp `last_used` with the current local time.
    pub fn touch(&mut self) {
        self.last_used = now_string();
    }

    /// Update one user-facing key from its string form.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "auto_save_results" => self.auto_save_results = parse_bool(key, value)?,
            "show_network_info" => self.show_network_info = parse_bool(key, value)?,
            "dark_mode" => self.dark_mode = parse_bool(key, value)?,
            "preferred_server_id" => {
                let value = value.trim();
                self.preferred_server_id = match value {
                    "" | "none" | "auto" => None,
                    other => Some(other.to_string()),
                };
            }
            "history.on_corruption" => {
                self.history.on_corruption = match value.trim() {
                    "discard" => CorruptionPolicy::Discard,
                    "fail" => CorruptionPolicy::FailClosed,
                    other => bail!("invalid value '{other}' for {key} (expected discard or fail)"),
                }
            }
            "logging.level" => self.logging.level = value.trim().to_string(),
            other => bail!("unknown setting '{other}'"),
        }
        Ok(())
    }

    /// Where the history file lives.
    pub fn history_path(&self) -> PathBuf {
        self.history
            .path
            .clone()
            .unwrap_or_else(|| data_dir().join(HISTORY_FILE))
    }

    /// Backend parameters, honouring `preferred_server_id`.
    pub fn backend_config(&self) -> HttpBackendConfig {
        let m = &self.measurement;
        HttpBackendConfig {
            server_url: self
                .preferred_server_id
                .clone()
                .unwrap_or_else(|| m.server_url.clone()),
            download_bytes: m.download_bytes,
            upload_bytes: m.upload_bytes,
            upload_chunks: m.upload_chunks,
            timeout: Duration::from_secs(m.timeout_secs),
            latency_samples: m.latency_samples,
        }
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Ok(true),
        "false" | "no" | "off" | "0" => Ok(false),
        other => bail!("invalid value '{other}' for {key} (expected true or false)"),
    }
}

// ---------------------------------------------------------------------------
// Measurement
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeasurementConfig {
    pub server_url: String,
    pub download_bytes: u64,
    pub upload_bytes: u64,
    /// Number of POST requests the upload is split into.
    pub upload_chunks: u32,
    pub timeout_secs: u64,
    pub latency_samples: u32,
}

impl Default for MeasurementConfig {
    fn default() -> Self {
        let backend = HttpBackendConfig::default();
        Self {
            server_url: backend.server_url,
            download_bytes: backend.download_bytes,
            upload_bytes: backend.upload_bytes,
            upload_chunks: backend.upload_chunks,
            timeout_secs: backend.timeout.as_secs(),
            latency_samples: backend.latency_samples,
        }
    }
}

// ---------------------------------------------------------------------------
// History
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Override for the history file location.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    pub on_corruption: CorruptionPolicy,
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default tracing filter when `RUST_LOG` is unset.
    pub level: String,
    /// Also append logs to `<data dir>/logs/netgauge.log`.
    pub file: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: true,
        }
    }
}
