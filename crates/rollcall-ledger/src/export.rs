//! CSV rendering of the attendance log.

use crate::ledger::{AttendanceRecord, TIMESTAMP_FORMAT};

pub const CSV_HEADER: &str = "time,name,status";
const STATUS_PRESENT: &str = "Present";

/// Quote a field when it contains a separator, quote or line break.
fn field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// One header line then one `time,name,Present` row per record, in the
/// order given. Rows are newline-separated without a trailing newline.
pub fn to_csv(records: &[AttendanceRecord]) -> Vec<u8> {
    let mut out = String::from(CSV_HEADER);
    for record in records {
        out.push('\n');
        out.push_str(&record.timestamp.format(TIMESTAMP_FORMAT).to_string());
        out.push(',');
        out.push_str(&field(&record.name));
        out.push(',');
        out.push_str(STATUS_PRESENT);
    }
    out.into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDateTime;

    fn record(id: i64, name: &str, ts: &str) -> AttendanceRecord {
        AttendanceRecord {
            id,
            name: name.into(),
            timestamp: NaiveDateTime::parse_from_str(ts, TIMESTAMP_FORMAT).unwrap(),
        }
    }

    #[test]
    fn test_empty_log_is_header_only() {
        assert_eq!(to_csv(&[]), b"time,name,status");
    }

    #[test]
    fn test_rows_in_given_order() {
        let csv = to_csv(&[
            record(2, "bob", "2024-05-02 10:00:00"),
            record(1, "alice", "2024-05-01 08:30:05"),
        ]);
        assert_eq!(
            String::from_utf8(csv).unwrap(),
            "time,name,status\n2024-05-02 10:00:00,bob,Present\n2024-05-01 08:30:05,alice,Present"
        );
    }

    #[test]
    fn test_names_with_separators_are_quoted() {
        let csv = to_csv(&[record(1, "Doe, \"JD\" Jane", "2024-05-02 10:00:00")]);
        let text = String::from_utf8(csv).unwrap();
        assert_eq!(
            text.lines().nth(1).unwrap(),
            "2024-05-02 10:00:00,\"Doe, \"\"JD\"\" Jane\",Present"
        );
    }
}
