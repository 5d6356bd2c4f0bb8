//! Typed extraction of recurrence metadata from raw property records.
//!
//! A calendar parser hands events over with their `RRULE` and `EXDATE` lines
//! as untyped [`Property`] records. [`Recurrence::from_properties`] scans them
//! once and produces a validated [`RecurrenceRule`] plus an [`ExceptionSet`],
//! so the generator never touches raw records.
//!
//! Only a subset of RFC 5545 is understood: `FREQ`, `COUNT`, `UNTIL`, and a
//! comma-separated `BYDAY` list. Other rule parts are carried in [`RuleParts`]
//! but ignored.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Duration, Months, Utc, Weekday};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::error::TallyError;
use crate::temporal::{parse_ical_datetime, parse_timezone, resolve_local};

/// Property name carrying the recurrence rule.
pub const RRULE: &str = "RRULE";
/// Property name carrying excluded instants.
pub const EXDATE: &str = "EXDATE";
/// Parameter naming the zone of an `EXDATE` value.
pub const TZID: &str = "TZID";

/// A raw content line attached to an event: name, value, and parameters.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Property {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub params: BTreeMap<String, Vec<String>>,
}

impl Property {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            params: BTreeMap::new(),
        }
    }

    /// Attach a parameter value, e.g. `TZID=Europe/Berlin`.
    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.entry(name.into()).or_default().push(value.into());
        self
    }

    /// First value of the named parameter.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .get(name)
            .and_then(|values| values.first())
            .map(String::as_str)
    }
}

// ── Rule parts ──────────────────────────────────────────────────────────────

/// Rule-part name → value, as written in the RRULE string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleParts(BTreeMap<String, String>);

impl RuleParts {
    /// Split `FREQ=DAILY;COUNT=3` on `;` and then on the first `=`.
    ///
    /// Empty segments are skipped so a trailing `;` is harmless. A later
    /// duplicate key replaces an earlier one.
    pub fn parse(s: &str) -> Result<Self, TallyError> {
        let mut parts = BTreeMap::new();
        for segment in s.split(';') {
            let segment = segment.trim();
            if segment.is_empty() {
                continue;
            }
            let (key, value) = segment
                .split_once('=')
                .ok_or_else(|| TallyError::MalformedRule(format!("'{}'", segment)))?;
            parts.insert(key.trim().to_string(), value.trim().to_string());
        }
        Ok(Self(parts))
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }
}

// ── Frequency ───────────────────────────────────────────────────────────────

/// The step unit between base candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Frequency {
    Second,
    Minute,
    Hour,
    Day,
    Week,
    Month,
    Year,
}

impl Frequency {
    /// Map an RFC 5545 `FREQ` token (`DAILY`, `WEEKLY`, ...) to its unit.
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "SECONDLY" => Some(Self::Second),
            "MINUTELY" => Some(Self::Minute),
            "HOURLY" => Some(Self::Hour),
            "DAILY" => Some(Self::Day),
            "WEEKLY" => Some(Self::Week),
            "MONTHLY" => Some(Self::Month),
            "YEARLY" => Some(Self::Year),
            _ => None,
        }
    }

    /// `start` moved forward by `steps` units.
    ///
    /// Sub-day units add elapsed time. Day and week units keep the local
    /// wall-clock time. Month and year units clamp to the end of a shorter
    /// month (Jan 31 + 1 month → Feb 29 in a leap year). Returns `None` on
    /// overflow.
    pub fn advance(self, start: &DateTime<Tz>, steps: u32) -> Option<DateTime<Tz>> {
        let n = i64::from(steps);
        match self {
            Self::Second => start.checked_add_signed(Duration::try_seconds(n)?),
            Self::Minute => start.checked_add_signed(Duration::try_minutes(n)?),
            Self::Hour => start.checked_add_signed(Duration::try_hours(n)?),
            Self::Day => shift_local(start, |naive| {
                naive.checked_add_signed(Duration::try_days(n)?)
            }),
            Self::Week => shift_local(start, |naive| {
                naive.checked_add_signed(Duration::try_weeks(n)?)
            }),
            Self::Month => shift_local(start, |naive| naive.checked_add_months(Months::new(steps))),
            Self::Year => shift_local(start, |naive| {
                naive.checked_add_months(Months::new(steps.checked_mul(12)?))
            }),
        }
    }
}

fn shift_local(
    start: &DateTime<Tz>,
    shift: impl FnOnce(chrono::NaiveDateTime) -> Option<chrono::NaiveDateTime>,
) -> Option<DateTime<Tz>> {
    let tz = start.timezone();
    let shifted = shift(start.naive_local())?;
    resolve_local(&tz, &shifted)
}

/// Parse a two-letter RFC 5545 weekday token (`MO` .. `SU`).
pub fn parse_weekday_token(token: &str) -> Result<Weekday, TallyError> {
    match token.trim() {
        "MO" => Ok(Weekday::Mon),
        "TU" => Ok(Weekday::Tue),
        "WE" => Ok(Weekday::Wed),
        "TH" => Ok(Weekday::Thu),
        "FR" => Ok(Weekday::Fri),
        "SA" => Ok(Weekday::Sat),
        "SU" => Ok(Weekday::Sun),
        other => Err(TallyError::InvalidWeekday(format!("'{}'", other))),
    }
}

// ── RecurrenceRule ──────────────────────────────────────────────────────────

/// A validated recurrence rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecurrenceRule {
    pub frequency: Frequency,
    /// Cap on base candidates.
    pub count: Option<u32>,
    /// Inclusive end of generation.
    pub until: Option<DateTime<Utc>>,
    /// Weekday refinement. Empty unless BYDAY listed two or more days.
    pub by_day: Vec<Weekday>,
}

impl RecurrenceRule {
    /// The rule of an event without RRULE: `FREQ=YEARLY;COUNT=1`.
    pub fn once() -> Self {
        Self {
            frequency: Frequency::Year,
            count: Some(1),
            until: None,
            by_day: Vec::new(),
        }
    }

    /// Parse and validate an RRULE value.
    ///
    /// # Errors
    ///
    /// - [`TallyError::MissingFrequency`] — no `FREQ` part
    /// - [`TallyError::UnsupportedFrequencyWithCount`] — `COUNT` with an unknown `FREQ`
    /// - [`TallyError::UnsupportedFrequency`] — unknown `FREQ` without `COUNT`
    /// - [`TallyError::ConflictingBounds`] — both `COUNT` and `UNTIL`
    /// - [`TallyError::InvalidCount`], [`TallyError::InvalidDatetime`],
    ///   [`TallyError::InvalidWeekday`] — unparseable part values
    ///
    /// # Examples
    ///
    /// ```
    /// use tally_engine::rule::{Frequency, RecurrenceRule};
    ///
    /// let rule = RecurrenceRule::parse("FREQ=DAILY;COUNT=3").unwrap();
    /// assert_eq!(rule.frequency, Frequency::Day);
    /// assert_eq!(rule.count, Some(3));
    /// ```
    pub fn parse(s: &str) -> Result<Self, TallyError> {
        Self::from_parts(&RuleParts::parse(s)?)
    }

    pub fn from_parts(parts: &RuleParts) -> Result<Self, TallyError> {
        let token = parts.get("FREQ").ok_or(TallyError::MissingFrequency)?;
        let frequency = Frequency::from_token(token);

        let count = match parts.get("COUNT") {
            Some(raw) => {
                if frequency.is_none() {
                    return Err(TallyError::UnsupportedFrequencyWithCount(token.to_string()));
                }
                Some(
                    raw.parse::<u32>()
                        .map_err(|_| TallyError::InvalidCount(format!("'{}'", raw)))?,
                )
            }
            None => None,
        };

        let frequency =
            frequency.ok_or_else(|| TallyError::UnsupportedFrequency(token.to_string()))?;

        let until = match parts.get("UNTIL") {
            Some(_) if count.is_some() => return Err(TallyError::ConflictingBounds),
            Some(raw) => Some(parse_ical_datetime(raw, None)?),
            None => None,
        };

        let by_day = match parts.get("BYDAY") {
            Some(list) if list.contains(',') => list
                .split(',')
                .map(parse_weekday_token)
                .collect::<Result<Vec<_>, _>>()?,
            _ => Vec::new(),
        };

        Ok(Self {
            frequency,
            count,
            until,
            by_day,
        })
    }
}

impl Default for RecurrenceRule {
    fn default() -> Self {
        Self::once()
    }
}

// ── ExceptionSet ────────────────────────────────────────────────────────────

/// Instants at which a generated occurrence is suppressed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExceptionSet(BTreeSet<DateTime<Utc>>);

impl ExceptionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add every instant listed in one `EXDATE` record.
    ///
    /// The value may be a comma-separated list. A `TZID` parameter places
    /// offset-less values in that zone; without it they are UTC.
    pub fn add_property(&mut self, property: &Property) -> Result<(), TallyError> {
        let zone = property.param(TZID).map(parse_timezone).transpose()?;
        for value in property.value.split(',').filter(|v| !v.trim().is_empty()) {
            self.0.insert(parse_ical_datetime(value, zone)?);
        }
        Ok(())
    }

    pub fn insert(&mut self, instant: DateTime<Utc>) -> bool {
        self.0.insert(instant)
    }

    pub fn contains<T: chrono::TimeZone>(&self, instant: &DateTime<T>) -> bool {
        self.0.contains(&instant.with_timezone(&Utc))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<DateTime<Utc>> for ExceptionSet {
    fn from_iter<I: IntoIterator<Item = DateTime<Utc>>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

// ── Recurrence ──────────────────────────────────────────────────────────────

/// Everything the generator needs besides the event's own begin and duration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Recurrence {
    pub rule: RecurrenceRule,
    pub exceptions: ExceptionSet,
}

impl Recurrence {
    /// Scan property records once: the first `RRULE` wins, every `EXDATE`
    /// contributes. Without an `RRULE` the event occurs exactly once.
    pub fn from_properties(properties: &[Property]) -> Result<Self, TallyError> {
        let mut rule = None;
        let mut exceptions = ExceptionSet::new();

        for property in properties {
            match property.name.as_str() {
                RRULE if rule.is_none() => rule = Some(RecurrenceRule::parse(&property.value)?),
                EXDATE => exceptions.add_property(property)?,
                _ => {}
            }
        }

        Ok(Self {
            rule: rule.unwrap_or_default(),
            exceptions,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    // ── RuleParts tests ─────────────────────────────────────────────────

    #[test]
    fn test_parts_split() {
        let parts = RuleParts::parse("FREQ=WEEKLY;BYDAY=MO,WE;COUNT=4").unwrap();
        assert_eq!(parts.get("FREQ"), Some("WEEKLY"));
        assert_eq!(parts.get("BYDAY"), Some("MO,WE"));
        assert_eq!(parts.get("COUNT"), Some("4"));
        assert!(!parts.contains("UNTIL"));
    }

    #[test]
    fn test_parts_trailing_semicolon() {
        let parts = RuleParts::parse("FREQ=DAILY;").unwrap();
        assert_eq!(parts.get("FREQ"), Some("DAILY"));
    }

    #[test]
    fn test_parts_missing_equals() {
        let err = RuleParts::parse("FREQ=DAILY;COUNT").unwrap_err();
        assert!(matches!(err, TallyError::MalformedRule(_)));
    }

    // ── RecurrenceRule tests ────────────────────────────────────────────

    #[test]
    fn test_rule_missing_freq() {
        assert_eq!(
            RecurrenceRule::parse("COUNT=3").unwrap_err(),
            TallyError::MissingFrequency
        );
    }

    #[test]
    fn test_rule_count_and_until_conflict() {
        assert_eq!(
            RecurrenceRule::parse("FREQ=DAILY;COUNT=3;UNTIL=20240110T000000Z").unwrap_err(),
            TallyError::ConflictingBounds
        );
    }

    #[test]
    fn test_rule_unknown_freq_with_count() {
        assert_eq!(
            RecurrenceRule::parse("FREQ=FORTNIGHTLY;COUNT=2").unwrap_err(),
            TallyError::UnsupportedFrequencyWithCount("FORTNIGHTLY".to_string())
        );
    }

    #[test]
    fn test_rule_unknown_freq_without_count() {
        assert_eq!(
            RecurrenceRule::parse("FREQ=FORTNIGHTLY").unwrap_err(),
            TallyError::UnsupportedFrequency("FORTNIGHTLY".to_string())
        );
    }

    #[test]
    fn test_rule_invalid_count() {
        assert!(matches!(
            RecurrenceRule::parse("FREQ=DAILY;COUNT=many").unwrap_err(),
            TallyError::InvalidCount(_)
        ));
    }

    #[test]
    fn test_rule_until_parsed_as_utc() {
        let rule = RecurrenceRule::parse("FREQ=WEEKLY;UNTIL=20240131T235959Z").unwrap();
        assert_eq!(
            rule.until,
            Some(Utc.with_ymd_and_hms(2024, 1, 31, 23, 59, 59).unwrap())
        );
        assert_eq!(rule.count, None);
    }

    #[test]
    fn test_rule_single_byday_ignored() {
        let rule = RecurrenceRule::parse("FREQ=WEEKLY;BYDAY=MO").unwrap();
        assert!(rule.by_day.is_empty());
    }

    #[test]
    fn test_rule_byday_list() {
        let rule = RecurrenceRule::parse("FREQ=DAILY;BYDAY=MO,WE,FR").unwrap();
        assert_eq!(rule.by_day, vec![Weekday::Mon, Weekday::Wed, Weekday::Fri]);
    }

    #[test]
    fn test_rule_byday_bad_token() {
        assert!(matches!(
            RecurrenceRule::parse("FREQ=DAILY;BYDAY=MO,XX").unwrap_err(),
            TallyError::InvalidWeekday(_)
        ));
    }

    #[test]
    fn test_rule_once_default() {
        let rule = RecurrenceRule::default();
        assert_eq!(rule.frequency, Frequency::Year);
        assert_eq!(rule.count, Some(1));
    }

    // ── Frequency tests ─────────────────────────────────────────────────

    #[test]
    fn test_advance_month_clamps() {
        let start = Tz::UTC.with_ymd_and_hms(2024, 1, 31, 9, 0, 0).unwrap();
        let next = Frequency::Month.advance(&start, 1).unwrap();
        assert_eq!(next.to_rfc3339(), "2024-02-29T09:00:00+00:00");
        // computed from the start, so March is back on the 31st
        let after = Frequency::Month.advance(&start, 2).unwrap();
        assert_eq!(after.to_rfc3339(), "2024-03-31T09:00:00+00:00");
    }

    #[test]
    fn test_advance_day_keeps_wall_clock_across_dst() {
        let start = chrono_tz::America::New_York
            .with_ymd_and_hms(2024, 3, 9, 9, 0, 0)
            .unwrap();
        let next = Frequency::Day.advance(&start, 1).unwrap();
        assert_eq!(next.to_rfc3339(), "2024-03-10T09:00:00-04:00");
    }

    #[test]
    fn test_advance_hour_is_elapsed_time() {
        let start = Tz::UTC.with_ymd_and_hms(2024, 1, 1, 23, 0, 0).unwrap();
        let next = Frequency::Hour.advance(&start, 2).unwrap();
        assert_eq!(next.to_rfc3339(), "2024-01-02T01:00:00+00:00");
    }

    // ── Recurrence extraction tests ─────────────────────────────────────

    #[test]
    fn test_extract_without_rrule_occurs_once() {
        let recurrence = Recurrence::from_properties(&[]).unwrap();
        assert_eq!(recurrence.rule, RecurrenceRule::once());
        assert!(recurrence.exceptions.is_empty());
    }

    #[test]
    fn test_extract_first_rrule_wins() {
        let recurrence = Recurrence::from_properties(&[
            Property::new(RRULE, "FREQ=DAILY;COUNT=2"),
            Property::new(RRULE, "FREQ=WEEKLY;COUNT=9"),
        ])
        .unwrap();
        assert_eq!(recurrence.rule.frequency, Frequency::Day);
        assert_eq!(recurrence.rule.count, Some(2));
    }

    #[test]
    fn test_extract_every_exdate() {
        let recurrence = Recurrence::from_properties(&[
            Property::new(EXDATE, "20240102T090000Z"),
            Property::new(EXDATE, "20240103T090000").with_param(TZID, "Europe/Berlin"),
            Property::new(EXDATE, "20240105T090000Z,20240106T090000Z"),
        ])
        .unwrap();
        assert_eq!(recurrence.exceptions.len(), 4);
        assert!(recurrence
            .exceptions
            .contains(&Utc.with_ymd_and_hms(2024, 1, 3, 8, 0, 0).unwrap()));
    }

    #[test]
    fn test_extract_bad_tzid() {
        let err = Recurrence::from_properties(&[
            Property::new(EXDATE, "20240103T090000").with_param(TZID, "Nowhere/Special")
        ])
        .unwrap_err();
        assert!(matches!(err, TallyError::InvalidTimezone(_)));
    }

    #[test]
    fn test_property_deserializes_without_params() {
        let property: Property =
            serde_json::from_str(r#"{"name":"RRULE","value":"FREQ=DAILY"}"#).unwrap();
        assert_eq!(property.name, "RRULE");
        assert!(property.params.is_empty());
    }
}
