//! Timestamp, timezone, and duration parsing for calendar data.
//!
//! Everything here is a pure function of its inputs: no clock access, no
//! environment lookups. Callers that need "today" read the clock themselves
//! and pass the result in.
//!
//! # Accepted datetime forms
//!
//! - iCalendar basic form: `20240101`, `20240101T090000`, `20240101T090000Z`
//! - ISO 8601 extended form: `2024-01-01`, `2024-01-01T09:00`, `2024-01-01T09:00:00`
//! - RFC 3339 with an explicit offset: `2024-01-01T09:00:00+01:00`
//!
//! Forms without an offset are read as wall-clock time in the zone the caller
//! supplies.

use chrono::{
    DateTime, Duration, LocalResult, NaiveDate, NaiveDateTime, Offset, TimeZone, Utc,
};
use chrono_tz::Tz;

use crate::error::TallyError;

const NAIVE_FORMATS: &[&str] = &[
    "%Y%m%dT%H%M%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
];

const DATE_FORMATS: &[&str] = &["%Y%m%d", "%Y-%m-%d"];

/// Parse an IANA timezone string into `Tz`.
pub fn parse_timezone(s: &str) -> Result<Tz, TallyError> {
    s.trim()
        .parse::<Tz>()
        .map_err(|_| TallyError::InvalidTimezone(format!("'{}'", s)))
}

/// Parse a datetime, reading offset-less forms as wall-clock time in `zone`.
///
/// The returned value is expressed in `zone` even when the input carried its
/// own offset (the instant is preserved).
///
/// # Errors
///
/// Returns [`TallyError::InvalidDatetime`] when no accepted form matches, or
/// when the wall-clock time cannot be placed in `zone`.
///
/// # Examples
///
/// ```
/// use tally_engine::temporal::parse_datetime;
///
/// let dt = parse_datetime("2024-01-01T09:00", chrono_tz::Europe::Berlin).unwrap();
/// assert_eq!(dt.to_rfc3339(), "2024-01-01T09:00:00+01:00");
/// ```
pub fn parse_datetime(s: &str, zone: Tz) -> Result<DateTime<Tz>, TallyError> {
    let s = s.trim();

    if let Some(utc) = parse_utc_suffixed(s) {
        return Ok(utc.with_timezone(&zone));
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&zone));
    }

    let naive = parse_naive(s)
        .ok_or_else(|| TallyError::InvalidDatetime(format!("'{}': unrecognized format", s)))?;

    resolve_local(&zone, &naive).ok_or_else(|| {
        TallyError::InvalidDatetime(format!("'{}' does not exist in {}", s, zone.name()))
    })
}

/// Parse an iCalendar property value (`UNTIL`, `EXDATE`) into a UTC instant.
///
/// A trailing `Z` always means UTC. Otherwise the value is local time in
/// `zone` when one is given (a `TZID` parameter), and UTC when it is not.
pub fn parse_ical_datetime(s: &str, zone: Option<Tz>) -> Result<DateTime<Utc>, TallyError> {
    parse_datetime(s, zone.unwrap_or(Tz::UTC)).map(|dt| dt.with_timezone(&Utc))
}

/// Place a wall-clock time in `tz`.
///
/// Ambiguous times (fall-back overlap) resolve to the earlier instant. Times
/// inside a spring-forward gap keep the offset in force before the gap, which
/// moves them forward by the gap length.
pub fn resolve_local(tz: &Tz, naive: &NaiveDateTime) -> Option<DateTime<Tz>> {
    match tz.from_local_datetime(naive) {
        LocalResult::Single(dt) => Some(dt),
        LocalResult::Ambiguous(earliest, _) => Some(earliest),
        LocalResult::None => {
            let day_before = naive.checked_sub_signed(Duration::days(1))?;
            let offset = tz.offset_from_local_datetime(&day_before).earliest()?.fix();
            let utc =
                naive.checked_sub_signed(Duration::seconds(offset.local_minus_utc().into()))?;
            Some(tz.from_utc_datetime(&utc))
        }
    }
}

/// Parse a span such as `15m`, `1h30m`, `+2d`, or `1w2d3h4m5s`.
///
/// A leading `+` or `-` is optional. Units are `w`, `d`, `h`, `m`, `s`
/// (case-insensitive) and may be combined in any order.
///
/// # Errors
///
/// Returns [`TallyError::InvalidDuration`] for empty input, numbers without a
/// unit, units without a number, or unknown units.
pub fn parse_duration(s: &str) -> Result<Duration, TallyError> {
    let s = s.trim();
    if s.is_empty() {
        return Err(TallyError::InvalidDuration("empty duration".to_string()));
    }

    let (sign, rest) = match s.as_bytes().first() {
        Some(b'+') => (1i64, &s[1..]),
        Some(b'-') => (-1i64, &s[1..]),
        _ => (1i64, s),
    };

    if rest.is_empty() {
        return Err(TallyError::InvalidDuration(format!(
            "duration has no components: '{s}'"
        )));
    }

    let mut total_seconds: i64 = 0;
    let mut num_buf = String::new();

    for ch in rest.chars() {
        if ch.is_ascii_digit() {
            num_buf.push(ch);
            continue;
        }
        if num_buf.is_empty() {
            return Err(TallyError::InvalidDuration(format!(
                "expected number before '{ch}' in '{s}'"
            )));
        }
        let n: i64 = num_buf
            .parse()
            .map_err(|_| TallyError::InvalidDuration(format!("invalid number in '{s}'")))?;
        num_buf.clear();

        let unit_seconds = match ch {
            'w' | 'W' => 7 * 86_400,
            'd' | 'D' => 86_400,
            'h' | 'H' => 3_600,
            'm' | 'M' => 60,
            's' | 'S' => 1,
            _ => {
                return Err(TallyError::InvalidDuration(format!(
                    "unknown unit '{ch}' in '{s}'"
                )));
            }
        };
        total_seconds = n
            .checked_mul(unit_seconds)
            .and_then(|v| total_seconds.checked_add(v))
            .ok_or_else(|| TallyError::InvalidDuration(format!("'{s}' is out of range")))?;
    }

    // Trailing number without unit
    if !num_buf.is_empty() {
        return Err(TallyError::InvalidDuration(format!(
            "number without unit at end of '{s}'"
        )));
    }

    Duration::try_seconds(sign * total_seconds)
        .ok_or_else(|| TallyError::InvalidDuration(format!("'{s}' is out of range")))
}

/// Decimal hours in a span, e.g. 90 minutes → `1.5`.
pub fn hours(d: Duration) -> f64 {
    d.num_seconds() as f64 / 3600.0
}

/// Decimal hours rounded to two places, e.g. 20 minutes → `"0.33"`.
pub fn format_hours(d: Duration) -> String {
    format!("{:.2}", hours(d))
}

// ── Internal helpers ────────────────────────────────────────────────────────

/// `YYYYMMDDTHHMMSSZ` is not RFC 3339, so the basic UTC form is handled apart.
fn parse_utc_suffixed(s: &str) -> Option<DateTime<Utc>> {
    let body = s.strip_suffix('Z').or_else(|| s.strip_suffix('z'))?;
    let naive = parse_naive(body)?;
    Some(Utc.from_utc_datetime(&naive))
}

fn parse_naive(s: &str) -> Option<NaiveDateTime> {
    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
}
