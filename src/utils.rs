// Utility functions
use chrono::{DateTime, NaiveDateTime, Utc};

/// Parses an RFC 3339 timestamp, or a naive ISO 8601 one taken as UTC.
pub fn parse_datetime(date_str: &str) -> Option<DateTime<Utc>> {
    let date_str = date_str.trim();
    DateTime::parse_from_rfc3339(date_str)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(date_str, "%Y-%m-%dT%H:%M:%S%.f")
                .ok()
                .map(|naive| naive.and_utc())
        })
}
