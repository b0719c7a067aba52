//! Timestamp helpers.
//!
//! Timestamps are stored as RFC3339 text with microsecond precision so that
//! the same column type works on both SQLite and PostgreSQL and sorts
//! lexically.

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};

/// Current time, truncated to the stored precision.
pub fn now() -> DateTime<Utc> {
    let now = Utc::now();
    parse(&format(&now)).unwrap_or(now)
}

/// Format a timestamp for storage.
pub fn format(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a stored timestamp.
///
/// Accepts RFC3339 and the bare `YYYY-MM-DD HH:MM:SS` form SQLite's
/// `datetime()` produces.
pub fn parse(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .ok()
        .map(|naive| naive.and_utc())
}

/// Parse a stored timestamp, falling back to the epoch for corrupt values.
pub fn parse_or_epoch(s: &str) -> DateTime<Utc> {
    parse(s).unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_format_parse() {
        let dt = Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 0).unwrap();
        let s = format(&dt);
        assert_eq!(s, "2024-01-15T10:30:00.000000Z");
        assert_eq!(parse(&s), Some(dt));
    }

    #[test]
    fn test_parse_sqlite_format() {
        let dt = parse("2024-01-15 10:30:00").unwrap();
        assert_eq!(dt, Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 0).unwrap());
    }

    #[test]
    fn test_parse_invalid() {
        assert!(parse("yesterday").is_none());
        assert_eq!(parse_or_epoch("yesterday"), DateTime::<Utc>::UNIX_EPOCH);
    }

    #[test]
    fn test_stored_values_sort_lexically() {
        let a = format(&Utc.with_ymd_and_hms(2024, 1, 9, 0, 0, 0).unwrap());
        let b = format(&Utc.with_ymd_and_hms(2024, 1, 10, 0, 0, 0).unwrap());
        assert!(a < b);
    }
}
