//! Field sanitization applied before anything is written to the sink.
//!
//! Hosted-table string fields have hard length limits (256 chars unless the
//! live schema says otherwise) and date fields are stored date-only. These
//! helpers are total: no input produces an error.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};

/// Default maximum length of a string field in a hosted table.
pub const FIELD_LENGTH_DEFAULT: usize = 256;

/// Marker appended to values that were cut to fit a field.
pub const TRUNCATION_MARKER: &str = "...";

/// Truncate `value` to at most `max_len` characters.
///
/// Values that already fit are returned unchanged. Longer values keep the
/// first `max_len - 3` characters plus the truncation marker; when
/// `with_marker` is false (or `max_len` leaves no room for the marker) the
/// value is cut hard instead. `None` becomes the empty string.
pub fn truncate(value: Option<&str>, max_len: usize, with_marker: bool) -> String {
    let Some(s) = value else {
        return String::new();
    };
    let chars: Vec<char> = s.chars().collect();
    if chars.len() <= max_len {
        return s.to_string();
    }
    if with_marker && max_len > TRUNCATION_MARKER.len() {
        let mut out: String = chars[..max_len - TRUNCATION_MARKER.len()].iter().collect();
        out.push_str(TRUNCATION_MARKER);
        out
    } else {
        chars[..max_len].iter().collect()
    }
}

/// Convert a portal epoch-millisecond timestamp to a date.
///
/// The portal uses `-1` for "never"; that and out-of-range values yield
/// `None`.
pub fn date_from_millis(millis: Option<i64>) -> Option<NaiveDate> {
    let ms = millis?;
    if ms < 0 {
        return None;
    }
    Utc.timestamp_millis_opt(ms)
        .single()
        .map(|dt| dt.date_naive())
}

/// Render a date in the staging-file form (`YYYY/MM/DD`).
pub fn format_date(date: NaiveDate) -> String {
    date.format("%Y/%m/%d").to_string()
}

/// Whole days elapsed between a portal timestamp and `now`.
pub fn days_since_millis(millis: Option<i64>, now: DateTime<Utc>) -> Option<i64> {
    let ms = millis?;
    if ms < 0 {
        return None;
    }
    let then = Utc.timestamp_millis_opt(ms).single()?;
    Some((now - then).num_days())
}

/// Whole days elapsed between a date and `today`.
pub fn days_since_date(date: NaiveDate, today: NaiveDate) -> i64 {
    (today - date).num_days()
}
