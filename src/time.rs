//! Clock access and due-date parsing.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer};

/// Current wall-clock time in UTC.
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Milliseconds since the Unix epoch, clamped at zero.
pub fn now_ms() -> u64 {
    u64::try_from(Utc::now().timestamp_millis()).unwrap_or(0)
}

/// Parses an RFC 3339 timestamp or a bare `YYYY-MM-DD` date (midnight UTC).
pub fn parse_due_date(raw: &str) -> Result<DateTime<Utc>, String> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
        .ok_or_else(|| format!("invalid date `{raw}`, expected RFC 3339 or YYYY-MM-DD"))
}

/// Serde adapter for a required due date in either accepted format.
pub fn deserialize_due_date<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_due_date(&raw).map_err(serde::de::Error::custom)
}

/// Serde adapter for an optional due date in either accepted format.
pub fn deserialize_opt_due_date<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer)?
        .map(|raw| parse_due_date(&raw).map_err(serde::de::Error::custom))
        .transpose()
}

#[cfg(test)]
mod tests {
    use chrono::{Datelike, Timelike};

    use super::*;

    #[test]
    fn parses_bare_date_as_midnight_utc() {
        let ts = parse_due_date("2024-01-15").unwrap();
        assert_eq!((ts.year(), ts.month(), ts.day()), (2024, 1, 15));
        assert_eq!((ts.hour(), ts.minute()), (0, 0));
    }

    #[test]
    fn parses_rfc3339_with_offset() {
        let ts = parse_due_date("2024-01-15T10:00:00+02:00").unwrap();
        assert_eq!(ts.hour(), 8);
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_due_date("next tuesday").is_err());
        assert!(parse_due_date("2024-13-01").is_err());
    }
}
