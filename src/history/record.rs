use chrono::{DateTime, Local, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Format used for the `timestamp` field of persisted records.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Substituted when a legacy record carries no `timestamp`.
pub const TIMESTAMP_PLACEHOLDER: &str = "N/A";

fn placeholder_timestamp() -> String {
    TIMESTAMP_PLACEHOLDER.to_string()
}

/// One persisted measurement outcome.
///
/// The on-disk field names (`download_speed`, `upload_speed`, `ping`) are
/// kept for compatibility with existing history files. All three numeric
/// fields are required; only `timestamp` may be absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurementRecord {
    #[serde(default = "placeholder_timestamp")]
    pub timestamp: String,
    #[serde(rename = "download_speed")]
    pub download_mbps: f64,
    #[serde(rename = "upload_speed")]
    pub upload_mbps: f64,
    #[serde(rename = "ping")]
    pub ping_ms: f64,
}

impl MeasurementRecord {
    /// Build a record stamped with the current local time.
    pub fn now(download_mbps: f64, upload_mbps: f64, ping_ms: f64) -> Self {
        Self::at(Local::now(), download_mbps, upload_mbps, ping_ms)
    }

    pub fn at(at: DateTime<Local>, download_mbps: f64, upload_mbps: f64, ping_ms: f64) -> Self {
        Self {
            timestamp: at.format(TIMESTAMP_FORMAT).to_string(),
            download_mbps,
            upload_mbps,
            ping_ms,
        }
    }

    /// Whether the record carries a real timestamp rather than the placeholder.
    pub fn has_timestamp(&self) -> bool {
        !self.timestamp.is_empty() && self.timestamp != TIMESTAMP_PLACEHOLDER
    }

    /// Parsed timestamp, if it is in [`TIMESTAMP_FORMAT`].
    pub fn parsed_timestamp(&self) -> Option<NaiveDateTime> {
        NaiveDateTime::parse_from_str(&self.timestamp, TIMESTAMP_FORMAT).ok()
    }

    /// Check that every numeric field is finite and non-negative.
    pub fn validate(&self) -> Result<(), String> {
        for (field, value) in [
            ("download_speed", self.download_mbps),
            ("upload_speed", self.upload_mbps),
            ("ping", self.ping_ms),
        ] {
            if !value.is_finite() {
                return Err(format!("{field} is not a finite number"));
            }
            if value < 0.0 {
                return Err(format!("{field} is negative ({value})"));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_serializes_with_legacy_field_names() {
        let at = Local.with_ymd_and_hms(2024, 4, 1, 12, 0, 0).unwrap();
        let record = MeasurementRecord::at(at, 80.0, 40.0, 15.0);
        let json = serde_json::to_value(&record).unwrap();

        assert_eq!(json["timestamp"], "2024-04-01 12:00:00");
        assert_eq!(json["download_speed"], 80.0);
        assert_eq!(json["upload_speed"], 40.0);
        assert_eq!(json["ping"], 15.0);
    }

    #[test]
    fn test_missing_timestamp_uses_placeholder() {
        let record: MeasurementRecord =
            serde_json::from_str(r#"{"download_speed": 10, "upload_speed": 5, "ping": 30.5}"#)
                .unwrap();

        assert_eq!(record.timestamp, TIMESTAMP_PLACEHOLDER);
        assert!(!record.has_timestamp());
        assert_eq!(record.download_mbps, 10.0);
    }

    #[test]
    fn test_missing_ping_is_rejected() {
        let parsed = serde_json::from_str::<MeasurementRecord>(
            r#"{"timestamp": "2024-04-01 12:00:00", "download_speed": 10, "upload_speed": 5}"#,
        );
        assert!(parsed.is_err());
    }

    #[test]
    fn test_null_field_is_rejected() {
        let parsed = serde_json::from_str::<MeasurementRecord>(
            r#"{"download_speed": null, "upload_speed": 5, "ping": 1}"#,
        );
        assert!(parsed.is_err());
    }

    #[test]
    fn test_validate_rejects_negative_and_nan() {
        assert!(MeasurementRecord::now(1.0, 2.0, 3.0).validate().is_ok());
        assert!(MeasurementRecord::now(-1.0, 2.0, 3.0).validate().is_err());
        assert!(MeasurementRecord::now(1.0, f64::NAN, 3.0).validate().is_err());
        assert!(MeasurementRecord::now(1.0, 2.0, f64::INFINITY).validate().is_err());
    }

    #[test]
    fn test_parsed_timestamp() {
        let record = MeasurementRecord {
            timestamp: "2024-04-01 12:30:45".to_string(),
            download_mbps: 1.0,
            upload_mbps: 1.0,
            ping_ms: 1.0,
        };
        let parsed = record.parsed_timestamp().unwrap();
        assert_eq!(parsed.format("%H:%M").to_string(), "12:30");
        assert!(MeasurementRecord {
            timestamp: "yesterday".to_string(),
            ..record
        }
        .parsed_timestamp()
        .is_none());
    }
}
