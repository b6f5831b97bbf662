//! Snapshot export of the history log.

use std::fmt;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::str::FromStr;

use super::{HistoryError, MeasurementRecord};

/// Header row of the CSV export.
pub const CSV_HEADER: [&str; 5] = [
    "#",
    "Timestamp",
    "Download (Mbps)",
    "Upload (Mbps)",
    "Ping (ms)",
];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ExportFormat {
    #[default]
    Csv,
    Json,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Json => "json",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "csv" => Ok(ExportFormat::Csv),
            "json" => Ok(ExportFormat::Json),
            other => Err(format!("unknown export format '{other}' (expected csv or json)")),
        }
    }
}

/// Write `records` to `destination` in the requested format.
///
/// The destination is created or truncated. Any I/O failure is reported as
/// [`HistoryError::Export`].
pub fn write(
    records: &[MeasurementRecord],
    destination: &Path,
    format: ExportFormat,
) -> Result<(), HistoryError> {
    let result = File::create(destination).and_then(|file| {
        let mut out = BufWriter::new(file);
        match format {
            ExportFormat::Csv => write_csv(records, &mut out)?,
            ExportFormat::Json => {
                serde_json::to_writer_pretty(&mut out, records).map_err(io::Error::from)?;
                writeln!(out)?;
            }
        }
        out.flush()
    });

    result.map_err(|e| HistoryError::Export {
        path: destination.to_path_buf(),
        reason: e.to_string(),
    })
}

/// Write the CSV form: header row, then one 1-indexed row per record.
pub fn write_csv<W: Write>(records: &[MeasurementRecord], out: &mut W) -> io::Result<()> {
    writeln!(out, "{}", CSV_HEADER.join(","))?;
    for (idx, record) in records.iter().enumerate() {
        writeln!(
            out,
            "{},{},{},{},{}",
            idx + 1,
            csv_field(&record.timestamp),
            record.download_mbps,
            record.upload_mbps,
            record.ping_ms
        )?;
    }
    Ok(())
}

/// Quote a field if it contains a delimiter, quote or line break.
fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}
