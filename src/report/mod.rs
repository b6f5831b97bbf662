//! Measurement result formatting: history table, text chart and summary.

pub mod chart;
pub mod table;

pub use chart::{render_chart, ChartSeries};
pub use table::{render_table, table_rows, TableRow};

use serde::Serialize;

use crate::history::MeasurementRecord;
use crate::measure::MeasurementOutcome;

/// Shown in place of a table or chart when no history file exists.
pub const NO_HISTORY: &str = "No history available.";

/// Format a rate in Mbps, switching to Gbps at 1000.
pub fn format_speed(mbps: f64) -> String {
    if mbps >= 1000.0 {
        format!("{:.2} Gbps", mbps / 1000.0)
    } else {
        format!("{:.2} Mbps", mbps)
    }
}

/// One-line result of a finished session.
pub fn format_outcome(outcome: &MeasurementOutcome) -> String {
    format!(
        "Download: {} | Upload: {} | Ping: {:.2} ms",
        format_speed(outcome.download_mbps),
        format_speed(outcome.upload_mbps),
        outcome.ping_ms
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SeriesStats {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
}

impl SeriesStats {
    fn from_values(values: impl Iterator<Item = f64>) -> Option<Self> {
        let mut count = 0usize;
        let mut sum = 0.0;
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        for v in values {
            count += 1;
            sum += v;
            min = min.min(v);
            max = max.max(v);
        }
        (count > 0).then(|| Self {
            min,
            max,
            mean: sum / count as f64,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistorySummary {
    pub count: usize,
    pub download: SeriesStats,
    pub upload: SeriesStats,
    pub ping: SeriesStats,
}

/// Min/max/mean per series, `None` for an empty history.
pub fn summary(records: &[MeasurementRecord]) -> Option<HistorySummary> {
    Some(HistorySummary {
        count: records.len(),
        download: SeriesStats::from_values(records.iter().map(|r| r.download_mbps))?,
        upload: SeriesStats::from_values(records.iter().map(|r| r.upload_mbps))?,
        ping: SeriesStats::from_values(records.iter().map(|r| r.ping_ms))?,
    })
}

/// Text block for [`HistorySummary`].
pub fn format_summary(summary: &HistorySummary) -> String {
    let line = |name: &str, s: &SeriesStats, unit: &str| {
        format!(
            "{:<10} min {:>9.2} {unit}  max {:>9.2} {unit}  avg {:>9.2} {unit}",
            name, s.min, s.max, s.mean
        )
    };
    format!(
        "{} test{}\n{}\n{}\n{}",
        summary.count,
        if summary.count == 1 { "" } else { "s" },
        line("Download", &summary.download, "Mbps"),
        line("Upload", &summary.upload, "Mbps"),
        line("Ping", &summary.ping, "ms "),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(d: f64, u: f64, p: f64) -> MeasurementRecord {
        MeasurementRecord {
            timestamp: "2024-04-01 12:00:00".to_string(),
            download_mbps: d,
            upload_mbps: u,
            ping_ms: p,
        }
    }

    #[test]
    fn test_format_speed_mbps() {
        assert_eq!(format_speed(245.3), "245.30 Mbps");
        assert_eq!(format_speed(0.0), "0.00 Mbps");
        assert_eq!(format_speed(999.99), "999.99 Mbps");
    }

    #[test]
    fn test_format_speed_gbps() {
        assert_eq!(format_speed(1000.0), "1.00 Gbps");
        assert_eq!(format_speed(9412.0), "9.41 Gbps");
    }

    #[test]
    fn test_format_outcome() {
        let line = format_outcome(&MeasurementOutcome {
            download_mbps: 100.0,
            upload_mbps: 1500.0,
            ping_ms: 12.5,
        });
        assert_eq!(line, "Download: 100.00 Mbps | Upload: 1.50 Gbps | Ping: 12.50 ms");
    }

    #[test]
    fn test_summary_stats() {
        let records = vec![record(100.0, 10.0, 20.0), record(50.0, 30.0, 10.0)];
        let s = summary(&records).unwrap();
        assert_eq!(s.count, 2);
        assert_eq!(s.download.min, 50.0);
        assert_eq!(s.download.max, 100.0);
        assert_eq!(s.download.mean, 75.0);
        assert_eq!(s.upload.mean, 20.0);
        assert_eq!(s.ping.min, 10.0);

        let text = format_summary(&s);
        assert!(text.starts_with("2 tests\n"));
        assert!(text.contains("Download"));
    }

    #[test]
    fn test_summary_empty() {
        assert!(summary(&[]).is_none());
    }
}
