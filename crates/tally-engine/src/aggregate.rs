//! Per-name duration totals over a date window.
//!
//! [`group_between`] selects the events that fall inside a [`Window`],
//! expands each against the window end, and folds the occurrences into
//! [`Totals`]. Names keep the order in which they were first seen.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::TallyError;
use crate::expander::{expand, Event, Occurrence};
use crate::temporal::hours;

/// A `[start, end]` range of instants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Window {
    /// # Errors
    ///
    /// Returns [`TallyError::InvalidDatetime`] if `end` is before `start`.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, TallyError> {
        if end < start {
            return Err(TallyError::InvalidDatetime(format!(
                "window end {} is before start {}",
                end.to_rfc3339(),
                start.to_rfc3339()
            )));
        }
        Ok(Self { start, end })
    }

    /// Whether the event's first instance lies entirely within the window.
    ///
    /// An event whose end is not representable lies in no window.
    pub fn includes(&self, event: &Event) -> bool {
        event.begin.with_timezone(&Utc) >= self.start
            && event
                .end()
                .is_some_and(|end| end.with_timezone(&Utc) <= self.end)
    }
}

/// What to do with an event whose recurrence metadata is invalid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorPolicy {
    /// Stop at the first invalid event.
    #[default]
    Abort,
    /// Log a warning and leave the event out.
    Skip,
}

/// Accumulated duration for one event name.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupTotal {
    pub name: String,
    pub seconds: i64,
    pub hours: f64,
}

/// Ordered mapping from event name to accumulated duration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Totals {
    entries: Vec<(String, Duration)>,
    index: HashMap<String, usize>,
}

impl Totals {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `name` with a zero total if it is not present yet.
    pub fn touch(&mut self, name: &str) -> &mut Duration {
        let position = match self.index.get(name) {
            Some(&position) => position,
            None => {
                self.entries.push((name.to_string(), Duration::zero()));
                self.index.insert(name.to_string(), self.entries.len() - 1);
                self.entries.len() - 1
            }
        };
        &mut self.entries[position].1
    }

    pub fn add(&mut self, occurrence: &Occurrence) {
        *self.touch(&occurrence.name) += occurrence.duration();
    }

    pub fn get(&self, name: &str) -> Option<Duration> {
        self.index.get(name).map(|&position| self.entries[position].1)
    }

    /// Names and totals in first-seen order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, Duration)> + '_ {
        self.entries
            .iter()
            .map(|(name, total)| (name.as_str(), *total))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Serializable rows, one per name.
    pub fn rows(&self) -> Vec<GroupTotal> {
        self.iter()
            .map(|(name, total)| GroupTotal {
                name: name.to_string(),
                seconds: total.num_seconds(),
                hours: hours(total),
            })
            .collect()
    }
}

impl Extend<Occurrence> for Totals {
    fn extend<I: IntoIterator<Item = Occurrence>>(&mut self, iter: I) {
        for occurrence in iter {
            self.add(&occurrence);
        }
    }
}

impl FromIterator<Occurrence> for Totals {
    fn from_iter<I: IntoIterator<Item = Occurrence>>(iter: I) -> Self {
        let mut totals = Self::new();
        totals.extend(iter);
        totals
    }
}

/// Total the durations of every event inside `window`, grouped by name.
///
/// An included event registers its name even if it yields no occurrences.
/// Occurrences are generated up to `window.end`; the window start only
/// decides which events are included.
///
/// # Errors
///
/// With [`ErrorPolicy::Abort`], the first expansion error is returned. With
/// [`ErrorPolicy::Skip`], failing events are logged and left out.
pub fn group_between<'a>(
    events: impl IntoIterator<Item = &'a Event>,
    window: &Window,
    policy: ErrorPolicy,
) -> Result<Totals, TallyError> {
    let mut totals = Totals::new();

    for event in events {
        // An unrepresentable end is an expansion error, reported under the policy.
        if event.end().is_some() && !window.includes(event) {
            debug!(event = %event.name, begin = %event.begin, "outside window");
            continue;
        }

        match expand(event, window.end) {
            Ok(occurrences) => {
                totals.touch(&event.name);
                totals.extend(occurrences);
            }
            Err(err) => match policy {
                ErrorPolicy::Abort => return Err(err),
                ErrorPolicy::Skip => {
                    warn!(event = %event.name, error = %err, "skipping event");
                }
            },
        }
    }

    Ok(totals)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::{Property, RRULE};
    use chrono::TimeZone;
    use chrono_tz::Tz;

    fn at(d: u32, h: u32) -> DateTime<Tz> {
        Tz::UTC.with_ymd_and_hms(2024, 1, d, h, 0, 0).unwrap()
    }

    fn january() -> Window {
        Window::new(
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap(),
        )
        .unwrap()
    }

    fn recurring(name: &str, begin: DateTime<Tz>, minutes: i64, rule: &str) -> Event {
        Event::new(name, begin, Duration::minutes(minutes))
            .with_property(Property::new(RRULE, rule))
    }

    #[test]
    fn test_window_rejects_reversed_bounds() {
        let start = Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        assert!(Window::new(start, end).is_err());
    }

    #[test]
    fn test_window_includes_only_contained_events() {
        let window = january();
        assert!(window.includes(&Event::new("in", at(3, 9), Duration::hours(1))));
        let before = Tz::UTC.with_ymd_and_hms(2023, 12, 31, 23, 0, 0).unwrap();
        assert!(!window.includes(&Event::new("early", before, Duration::hours(2))));
        assert!(!window.includes(&Event::new("late", at(31, 23), Duration::hours(2))));
    }

    #[test]
    fn test_group_between_out_of_range_duration_follows_policy() {
        let huge = Event::new("Huge", at(1, 9), Duration::weeks(99_999_999));
        assert!(!january().includes(&huge));

        let events = vec![huge, Event::new("Fine", at(2, 9), Duration::hours(1))];
        let totals = group_between(&events, &january(), ErrorPolicy::Skip).unwrap();
        assert_eq!(totals.get("Huge"), None);
        assert_eq!(totals.get("Fine"), Some(Duration::hours(1)));

        let err = group_between(&events, &january(), ErrorPolicy::Abort).unwrap_err();
        assert!(matches!(err, TallyError::InvalidDuration(_)));
    }

    #[test]
    fn test_totals_keep_first_seen_order() {
        let mut totals = Totals::new();
        totals.touch("b");
        totals.touch("a");
        totals.touch("b");
        let names: Vec<&str> = totals.iter().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["b", "a"]);
        assert_eq!(totals.get("a"), Some(Duration::zero()));
    }

    #[test]
    fn test_totals_from_occurrences() {
        let totals: Totals = vec![
            Occurrence { name: "x".into(), begin: at(1, 9), end: at(1, 10) },
            Occurrence { name: "y".into(), begin: at(1, 9), end: at(1, 11) },
            Occurrence { name: "x".into(), begin: at(2, 9), end: at(2, 10) },
        ]
        .into_iter()
        .collect();
        assert_eq!(totals.get("x"), Some(Duration::hours(2)));
        assert_eq!(totals.get("y"), Some(Duration::hours(2)));
        assert_eq!(totals.len(), 2);
    }

    #[test]
    fn test_group_between_sums_per_name() {
        let events = vec![
            recurring("Standup", at(1, 9), 15, "FREQ=DAILY;COUNT=4"),
            Event::new("Review", at(5, 14), Duration::minutes(90)),
            recurring("Standup", at(15, 9), 15, "FREQ=DAILY;COUNT=2"),
        ];
        let totals = group_between(&events, &january(), ErrorPolicy::Abort).unwrap();
        assert_eq!(totals.get("Standup"), Some(Duration::minutes(90)));
        assert_eq!(totals.get("Review"), Some(Duration::minutes(90)));

        let rows = totals.rows();
        assert_eq!(rows[0].name, "Standup");
        assert_eq!(rows[0].seconds, 5400);
        assert!((rows[0].hours - 1.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_group_between_registers_fully_excluded_event() {
        let events = vec![recurring("Gone", at(2, 9), 30, "FREQ=DAILY;COUNT=0")];
        let totals = group_between(&events, &january(), ErrorPolicy::Abort).unwrap();
        assert_eq!(totals.get("Gone"), Some(Duration::zero()));
    }

    #[test]
    fn test_group_between_ignores_events_outside_window() {
        let december = Tz::UTC.with_ymd_and_hms(2023, 12, 20, 9, 0, 0).unwrap();
        let events = vec![recurring("Old", december, 60, "FREQ=DAILY")];
        let totals = group_between(&events, &january(), ErrorPolicy::Abort).unwrap();
        assert!(totals.is_empty());
    }

    #[test]
    fn test_group_between_abort_policy() {
        let events = vec![
            recurring("Good", at(1, 9), 30, "FREQ=DAILY;COUNT=2"),
            recurring("Bad", at(1, 9), 30, "COUNT=2"),
        ];
        let err = group_between(&events, &january(), ErrorPolicy::Abort).unwrap_err();
        assert_eq!(err, TallyError::MissingFrequency);
    }

    #[test]
    fn test_group_between_skip_policy() {
        let events = vec![
            recurring("Bad", at(1, 9), 30, "FREQ=DAILY;COUNT=2;UNTIL=20240105T000000Z"),
            recurring("Good", at(1, 9), 30, "FREQ=DAILY;COUNT=2"),
        ];
        let totals = group_between(&events, &january(), ErrorPolicy::Skip).unwrap();
        assert_eq!(totals.get("Bad"), None);
        assert_eq!(totals.get("Good"), Some(Duration::hours(1)));
    }

    #[test]
    fn test_error_policy_deserializes_lowercase() {
        let policy: ErrorPolicy = serde_json::from_str("\"skip\"").unwrap();
        assert_eq!(policy, ErrorPolicy::Skip);
    }
}
