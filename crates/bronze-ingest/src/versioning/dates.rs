//! Date parsing helpers shared by resolvers
//!
//! Every date-based marker is normalised to `YYYY-MM-DD`.

use super::ResolveError;
use chrono::{DateTime, NaiveDate, NaiveDateTime};

pub const MARKER_FORMAT: &str = "%Y-%m-%d";

pub fn to_marker(date: NaiveDate) -> String {
    date.format(MARKER_FORMAT).to_string()
}

/// Parse `value` with a `strftime` pattern that may or may not include a time.
pub fn parse_with_format(value: &str, format: &str) -> Result<NaiveDate, ResolveError> {
    let value = value.trim();
    NaiveDateTime::parse_from_str(value, format)
        .map(|dt| dt.date())
        .or_else(|_| NaiveDate::parse_from_str(value, format))
        .map_err(|_| ResolveError::Date {
            value: value.to_string(),
            format: format.to_string(),
        })
}

/// Accepts RFC 3339, `YYYY-MM-DD[ HH:MM[:SS]]` (also with a `T`) and epoch
/// milliseconds.
pub fn parse_flexible(value: &str) -> Option<NaiveDate> {
    let value = value.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.date_naive());
    }

    for format in [
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M",
    ] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, format) {
            return Some(dt.date());
        }
    }

    if let Ok(date) = NaiveDate::parse_from_str(value, MARKER_FORMAT) {
        return Some(date);
    }

    value
        .parse::<i64>()
        .ok()
        .and_then(DateTime::from_timestamp_millis)
        .map(|dt| dt.date_naive())
}

/// HTTP `Last-Modified` header value (RFC 7231 IMF-fixdate).
pub fn parse_http_date(value: &str) -> Option<DateTime<chrono::Utc>> {
    DateTime::parse_from_rfc2822(value.trim())
        .ok()
        .map(|dt| dt.with_timezone(&chrono::Utc))
}
