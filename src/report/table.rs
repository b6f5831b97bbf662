//! History table view.

use serde::Serialize;

use crate::history::MeasurementRecord;

/// One displayed row; `index` starts at 1.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableRow {
    pub index: usize,
    pub timestamp: String,
    pub download_mbps: f64,
    pub upload_mbps: f64,
    pub ping_ms: f64,
}

pub fn table_rows(records: &[MeasurementRecord]) -> Vec<TableRow> {
    records
        .iter()
        .enumerate()
        .map(|(i, r)| TableRow {
            index: i + 1,
            timestamp: r.timestamp.clone(),
            download_mbps: r.download_mbps,
            upload_mbps: r.upload_mbps,
            ping_ms: r.ping_ms,
        })
        .collect()
}

/// Fixed-width table with a header and separator line.
pub fn render_table(rows: &[TableRow]) -> String {
    let mut out = format!(
        "{:>4} | {:<19} | {:>15} | {:>13} | {:>9}\n",
        "#", "Timestamp", "Download (Mbps)", "Upload (Mbps)", "Ping (ms)"
    );
    out.push_str(&format!("{}\n", "-".repeat(73)));
    for row in rows {
        out.push_str(&format!(
            "{:>4} | {:<19} | {:>15.2} | {:>13.2} | {:>9.2}\n",
            row.index, row.timestamp, row.download_mbps, row.upload_mbps, row.ping_ms
        ));
    }
    out
}
