use std::iter::repeat;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};

pub fn find_first_subpath<P: AsRef<Path>, F: Fn(&Path) -> bool>(
    root: impl AsRef<Path>,
    subpaths: &[P],
    search: F,
) -> Option<PathBuf> {
    subpaths
        .iter()
        .zip(repeat(root.as_ref()))
        .map(|(b, a)| a.join(b))
        .find(|it: &PathBuf| search(it))
}

/// Parses an ISO-8601 timestamp as sent by course systems.
///
/// Accepts RFC 3339 (`2024-12-20T23:59:00Z`), a date-time without offset
/// (read as UTC) and a bare date (UTC midnight). Anything else is `None`.
pub fn parse_timestamp(raw: impl AsRef<str>) -> Option<DateTime<Utc>> {
    let raw = raw.as_ref().trim();

    if let Ok(it) = DateTime::parse_from_rfc3339(raw) {
        return Some(it.with_timezone(&Utc));
    }

    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(it) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(Utc.from_utc_datetime(&it));
        }
    }

    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|it| it.and_hms_opt(0, 0, 0))
        .map(|it| Utc.from_utc_datetime(&it))
}
