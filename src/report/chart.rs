//! Text chart of the measurement history.
//!
//! Each test gets one bar per series, scaled against the largest rate in
//! the history so download and upload bars are comparable.

use serde::Serialize;

use crate::history::MeasurementRecord;

const BAR_WIDTH: usize = 40;

/// Numeric series extracted from the history, one entry per test.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ChartSeries {
    pub test_numbers: Vec<usize>,
    pub labels: Vec<String>,
    pub download: Vec<f64>,
    pub upload: Vec<f64>,
    pub ping: Vec<f64>,
}

impl ChartSeries {
    pub fn from_records(records: &[MeasurementRecord]) -> Self {
        let mut series = Self::default();
        for (i, r) in records.iter().enumerate() {
            let n = i + 1;
            series.test_numbers.push(n);
            series.labels.push(if r.has_timestamp() {
                r.timestamp.clone()
            } else {
                format!("Test {n}")
            });
            series.download.push(r.download_mbps);
            series.upload.push(r.upload_mbps);
            series.ping.push(r.ping_ms);
        }
        series
    }

    pub fn len(&self) -> usize {
        self.test_numbers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.test_numbers.is_empty()
    }
}

fn bar(value: f64, max: f64) -> String {
    let cells = if max > 0.0 {
        ((value / max) * BAR_WIDTH as f64).round() as usize
    } else {
        0
    };
    "#".repeat(cells.min(BAR_WIDTH))
}

pub fn render_chart(series: &ChartSeries) -> String {
    let max_rate = series
        .download
        .iter()
        .chain(&series.upload)
        .copied()
        .fold(0.0_f64, f64::max);
    let max_ping = series.ping.iter().copied().fold(0.0_f64, f64::max);

    let mut out = String::from("Speed Test History\n");
    for i in 0..series.len() {
        out.push_str(&format!("\n{}\n", series.labels[i]));
        out.push_str(&format!(
            "  down {:<width$} {:.2} Mbps\n",
            bar(series.download[i], max_rate),
            series.download[i],
            width = BAR_WIDTH
        ));
        out.push_str(&format!(
            "  up   {:<width$} {:.2} Mbps\n",
            bar(series.upload[i], max_rate),
            series.upload[i],
            width = BAR_WIDTH
        ));
        out.push_str(&format!(
            "  ping {:<width$} {:.2} ms\n",
            bar(series.ping[i], max_ping),
            series.ping[i],
            width = BAR_WIDTH
        ));
    }
    out
}
