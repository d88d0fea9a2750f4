//! Time and reference-number utilities

use chrono::NaiveDateTime;

/// Current UTC timestamp in milliseconds
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Generate a reference number: `PREFIX` + `YYYYMMDD` + 5 random digits.
///
/// Used for return numbers (`RET...`). Order numbers are assigned by the
/// storefront at checkout and arrive pre-formed.
pub fn reference_number(prefix: &str) -> String {
    use rand::Rng;
    let date = chrono::Utc::now().format("%Y%m%d");
    let suffix: u32 = rand::thread_rng().gen_range(10000..100000);
    format!("{prefix}{date}{suffix}")
}

/// Datetime formats the carrier emits across its webhook shapes.
///
/// The primary scan format is `"14 10 2025 10:00:00"`; older payloads use
/// dashed dates, and the query API returns RFC 3339.
const CARRIER_DATETIME_FORMATS: &[&str] = &[
    "%d %m %Y %H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
    "%d-%m-%Y %H:%M:%S",
];

/// Parse a carrier-supplied datetime string into unix milliseconds (UTC).
///
/// Returns `None` for unparseable input; callers fall back to the
/// event-level timestamp rather than inventing one.
pub fn parse_carrier_datetime(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(raw) {
        return Some(dt.timestamp_millis());
    }
    for fmt in CARRIER_DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(dt.and_utc().timestamp_millis());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_carrier_scan_format() {
        let ms = parse_carrier_datetime("14 10 2025 10:00:00").unwrap();
        let dt = chrono::DateTime::from_timestamp_millis(ms).unwrap();
        assert_eq!(dt.to_rfc3339(), "2025-10-14T10:00:00+00:00");
    }

    #[test]
    fn parses_rfc3339() {
        assert!(parse_carrier_datetime("2025-10-14T10:00:00+05:30").is_some());
    }

    #[test]
    fn parses_dashed_formats() {
        assert!(parse_carrier_datetime("2025-10-14 10:00:00").is_some());
        assert!(parse_carrier_datetime("14-10-2025 10:00:00").is_some());
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!(parse_carrier_datetime(""), None);
        assert_eq!(parse_carrier_datetime("tomorrow"), None);
    }

    #[test]
    fn reference_number_shape() {
        let n = reference_number("RET");
        assert!(n.starts_with("RET"));
        assert_eq!(n.len(), 3 + 8 + 5);
    }
}
