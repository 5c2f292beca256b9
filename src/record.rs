//! The `ScanRecord` data model — the unit written to the spool and inserted
//! into the remote database.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One parsed barcode scan, ready for durable storage.
///
/// Field names use Rust's idiomatic snake_case internally, but the
/// `#[serde(rename = ...)]` on every field pins the on-disk spool JSON and
/// the database column names to the literal PascalCase names the spool
/// format and the target table schema are documented in: `DeviceID`,
/// `EntryNo`, `DACS_CLASS`, and so on. Dropping these renames would still
/// compile and round-trip internally, but it would silently change the
/// wire format any other consumer of the spool file depends on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanRecord {
    #[serde(rename = "DeviceID")]
    pub device_id: String,
    #[serde(rename = "ScannerName")]
    pub scanner_name: String,
    #[serde(rename = "EntryNo")]
    pub entry_no: i32,
    #[serde(rename = "Barcode")]
    pub barcode: String,
    #[serde(rename = "ScanDate")]
    pub scan_date: NaiveDate,
    #[serde(rename = "ScanTime")]
    pub scan_time: String,
    #[serde(rename = "UserID")]
    pub user_id: Option<String>,
    #[serde(rename = "PreferredUser")]
    pub preferred_user: Option<String>,

    #[serde(rename = "Stowage")]
    pub stowage: Option<String>,
    #[serde(rename = "FlightNo")]
    pub flight_no: Option<String>,
    #[serde(rename = "OrderDate")]
    pub order_date: Option<NaiveDate>,
    #[serde(rename = "DACS_CLASS")]
    pub dacs_class: Option<String>,
    #[serde(rename = "Leg")]
    pub leg: Option<String>,
    #[serde(rename = "Gally")]
    pub gally: Option<String>,
    #[serde(rename = "BlockNo")]
    pub block_no: Option<String>,
    #[serde(rename = "ContainerCode")]
    pub container_code: Option<String>,
    #[serde(rename = "DES")]
    pub des: Option<String>,
    #[serde(rename = "DACS_ACType")]
    pub dacs_ac_type: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ScanRecord {
        ScanRecord {
            device_id: "D1".into(),
            scanner_name: "scanner0".into(),
            entry_no: 1,
            barcode: "abc123".into(),
            scan_date: NaiveDate::from_ymd_opt(2026, 7, 28).unwrap(),
            scan_time: "12:00:00".into(),
            user_id: Some("alice".into()),
            preferred_user: None,
            stowage: Some("STW".into()),
            flight_no: None,
            order_date: None,
            dacs_class: None,
            leg: None,
            gally: None,
            block_no: None,
            container_code: None,
            des: None,
            dacs_ac_type: None,
        }
    }

    #[test]
    fn spool_json_uses_pascal_case_keys() {
        let json = serde_json::to_string(&sample()).unwrap();
        assert!(json.contains("\"DeviceID\":\"D1\""));
        assert!(json.contains("\"EntryNo\":1"));
        assert!(json.contains("\"ScanDate\""));
        assert!(json.contains("\"DACS_CLASS\":null"));
        assert!(json.contains("\"DACS_ACType\":null"));
        assert!(json.contains("\"DES\":null"));
        assert!(!json.contains("\"device_id\""));
        assert!(!json.contains("\"dacs_class\""));
    }

    #[test]
    fn round_trips_through_pascal_case_json() {
        let original = sample();
        let json = serde_json::to_string(&original).unwrap();
        let parsed: ScanRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, original);
    }
}
