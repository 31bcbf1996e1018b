//! Parsing of client-supplied timestamps.
//!
//! Accepts RFC 3339 (`Z` or any numeric offset, normalised to UTC) as well as
//! naive ISO-8601 date-times and plain dates, which are read as UTC.

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Utc};

use crate::error::ServiceError;

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// Years outside 0..=9999 are rejected: storage keeps fixed-width RFC 3339 text.
pub fn parse_iso_timestamp(raw: &str, field: &str) -> Result<DateTime<Utc>, ServiceError> {
    parse_any(raw.trim())
        .filter(|parsed| (0..=9999).contains(&parsed.year()))
        .ok_or_else(|| ServiceError::validation(format!("{field} must be an ISO 8601 string.")))
}

fn parse_any(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Some(parsed.with_timezone(&Utc));
    }
    if let Ok(parsed) = DateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%.f%:z") {
        return Some(parsed.with_timezone(&Utc));
    }
    for format in NAIVE_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(value, format) {
            return Some(parsed.and_utc());
        }
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|parsed| parsed.and_utc())
}

/// Absent and empty values both mean "not provided".
pub fn parse_optional_iso_timestamp(
    raw: Option<&str>,
    field: &str,
) -> Result<Option<DateTime<Utc>>, ServiceError> {
    match raw {
        None => Ok(None),
        Some(value) if value.trim().is_empty() => Ok(None),
        Some(value) => parse_iso_timestamp(value, field).map(Some),
    }
}
