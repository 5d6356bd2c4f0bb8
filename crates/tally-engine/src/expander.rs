//! Occurrence expansion: one event plus a window end → concrete occurrences.
//!
//! Generation runs in three stages per base candidate:
//!
//! 1. Step from the event's begin by the rule's frequency, stopping at the
//!    end bound (`min(UNTIL, window_end)`, inclusive) or after `COUNT` base
//!    candidates.
//! 2. If BYDAY lists two or more weekdays, replace each base candidate with
//!    every matching day among the seven days starting at that candidate.
//!    This is a flat seven-day lookahead, not full RFC 5545 BYDAY semantics:
//!    a DAILY base with `BYDAY=MO,WE` revisits the same Monday from several
//!    base candidates, and output is only ordered within each lookahead.
//! 3. Drop any occurrence whose begin equals an EXDATE instant.
//!
//! The expander never looks at the window start; callers select events that
//! intersect their window before expanding.

use chrono::{DateTime, Duration, Utc, Weekday};
use chrono_tz::Tz;
use tracing::debug;

use crate::error::TallyError;
use crate::rule::{ExceptionSet, Frequency, Property, Recurrence};

/// Length of the BYDAY lookahead after each base candidate, in days.
const BYDAY_SCAN_DAYS: u32 = 7;

/// A calendar event as handed over by the parser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub name: String,
    pub begin: DateTime<Tz>,
    pub duration: Duration,
    /// Raw `RRULE` / `EXDATE` / other content lines.
    pub properties: Vec<Property>,
}

impl Event {
    pub fn new(name: impl Into<String>, begin: DateTime<Tz>, duration: Duration) -> Self {
        Self {
            name: name.into(),
            begin,
            duration,
            properties: Vec::new(),
        }
    }

    pub fn with_property(mut self, property: Property) -> Self {
        self.properties.push(property);
        self
    }

    /// End of the first instance, or `None` if it falls outside chrono's range.
    pub fn end(&self) -> Option<DateTime<Tz>> {
        self.begin.checked_add_signed(self.duration)
    }
}

/// One concrete instance of an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Occurrence {
    pub name: String,
    pub begin: DateTime<Tz>,
    pub end: DateTime<Tz>,
}

impl Occurrence {
    pub fn duration(&self) -> Duration {
        self.end - self.begin
    }
}

/// An event whose recurrence metadata has been extracted and validated.
///
/// Expanding a prepared event cannot fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedEvent {
    pub name: String,
    pub begin: DateTime<Tz>,
    pub duration: Duration,
    pub recurrence: Recurrence,
}

impl PreparedEvent {
    /// Extract the typed recurrence from `event`'s property records.
    ///
    /// # Errors
    ///
    /// Returns [`TallyError::InvalidDuration`] for a negative duration or one
    /// whose end is not representable, and any rule or EXDATE error from
    /// [`Recurrence::from_properties`].
    pub fn prepare(event: &Event) -> Result<Self, TallyError> {
        if event.duration < Duration::zero() {
            return Err(TallyError::InvalidDuration(format!(
                "event '{}' has negative duration {}",
                event.name, event.duration
            )));
        }
        if event.end().is_none() {
            return Err(TallyError::InvalidDuration(format!(
                "event '{}' ends out of range ({} after {})",
                event.name,
                event.duration,
                event.begin.to_rfc3339()
            )));
        }
        Ok(Self {
            name: event.name.clone(),
            begin: event.begin,
            duration: event.duration,
            recurrence: Recurrence::from_properties(&event.properties)?,
        })
    }

    /// Occurrences up to `window_end` (inclusive).
    pub fn occurrences(&self, window_end: DateTime<Utc>) -> Occurrences {
        Occurrences::new(self, window_end)
    }
}

/// Expand `event` into its occurrences up to `window_end` (inclusive).
///
/// All validation happens before the iterator is returned, so an error means
/// nothing was generated.
///
/// # Examples
///
/// ```
/// use chrono::{Duration, TimeZone, Utc};
/// use tally_engine::expander::{expand, Event};
/// use tally_engine::rule::Property;
///
/// let begin = chrono_tz::UTC.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap();
/// let event = Event::new("Standup", begin, Duration::minutes(15))
///     .with_property(Property::new("RRULE", "FREQ=DAILY;COUNT=3"));
/// let window_end = Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap();
///
/// let days: Vec<u32> = expand(&event, window_end)
///     .unwrap()
///     .map(|o| chrono::Datelike::day(&o.begin))
///     .collect();
/// assert_eq!(days, vec![1, 2, 3]);
/// ```
pub fn expand(event: &Event, window_end: DateTime<Utc>) -> Result<Occurrences, TallyError> {
    Ok(PreparedEvent::prepare(event)?.occurrences(window_end))
}

/// [`expand`], collected.
pub fn expand_all(
    event: &Event,
    window_end: DateTime<Utc>,
) -> Result<Vec<Occurrence>, TallyError> {
    Ok(expand(event, window_end)?.collect())
}

/// Sort occurrences by begin instant.
///
/// BYDAY output is only ordered within each lookahead; use this when a caller
/// needs a globally ordered sequence. The sort is stable.
pub fn chronological(occurrences: impl IntoIterator<Item = Occurrence>) -> Vec<Occurrence> {
    let mut sorted: Vec<Occurrence> = occurrences.into_iter().collect();
    sorted.sort_by_key(|o| o.begin.with_timezone(&Utc));
    sorted
}

/// Lazy occurrence sequence produced by [`expand`].
#[derive(Debug, Clone)]
pub struct Occurrences {
    name: String,
    begin: DateTime<Tz>,
    duration: Duration,
    frequency: Frequency,
    limit: Option<u32>,
    end: DateTime<Utc>,
    by_day: Vec<Weekday>,
    exceptions: ExceptionSet,
    /// Index of the next base candidate.
    step: u32,
    scan: Option<DayScan>,
    exhausted: bool,
}

#[derive(Debug, Clone)]
struct DayScan {
    start: DateTime<Tz>,
    offset: u32,
}

impl Occurrences {
    fn new(event: &PreparedEvent, window_end: DateTime<Utc>) -> Self {
        let rule = &event.recurrence.rule;
        let end = match rule.until {
            Some(until) => until.min(window_end),
            None => window_end,
        };

        debug!(
            event = %event.name,
            frequency = ?rule.frequency,
            count = ?rule.count,
            end = %end,
            by_day = ?rule.by_day,
            exceptions = event.recurrence.exceptions.len(),
            "expanding event"
        );

        Self {
            name: event.name.clone(),
            begin: event.begin,
            duration: event.duration,
            frequency: rule.frequency,
            limit: rule.count,
            end,
            by_day: rule.by_day.clone(),
            exceptions: event.recurrence.exceptions.clone(),
            step: 0,
            scan: None,
            exhausted: false,
        }
    }

    fn next_base(&mut self) -> Option<DateTime<Tz>> {
        if self.exhausted || self.limit.is_some_and(|limit| self.step >= limit) {
            return None;
        }
        match self.frequency.advance(&self.begin, self.step) {
            Some(candidate) if candidate.with_timezone(&Utc) <= self.end => {
                self.step += 1;
                Some(candidate)
            }
            _ => {
                self.exhausted = true;
                None
            }
        }
    }

    /// Next matching day in the current BYDAY lookahead, if any.
    fn next_in_scan(&mut self) -> Option<DateTime<Tz>> {
        let scan = self.scan.as_mut()?;
        while scan.offset < BYDAY_SCAN_DAYS {
            // Offset 0 is the base candidate itself; rebuilding it from wall
            // time would lose the second instance of a repeated hour.
            let day = match scan.offset {
                0 => Some(scan.start),
                offset => Frequency::Day.advance(&scan.start, offset),
            };
            scan.offset += 1;
            match day {
                Some(day) if day.with_timezone(&Utc) <= self.end => {
                    if self.by_day.contains(&chrono::Datelike::weekday(&day)) {
                        return Some(day);
                    }
                }
                _ => break,
            }
        }
        self.scan = None;
        None
    }

    fn occurrence(&self, begin: DateTime<Tz>) -> Option<Occurrence> {
        Some(Occurrence {
            name: self.name.clone(),
            begin,
            end: begin.checked_add_signed(self.duration)?,
        })
    }
}

impl Iterator for Occurrences {
    type Item = Occurrence;

    fn next(&mut self) -> Option<Occurrence> {
        loop {
            let begin = match self.next_in_scan() {
                Some(day) => day,
                None => {
                    let candidate = self.next_base()?;
                    if !self.by_day.is_empty() {
                        self.scan = Some(DayScan {
                            start: candidate,
                            offset: 0,
                        });
                        continue;
                    }
                    candidate
                }
            };

            if self.exceptions.contains(&begin) {
                debug!(event = %self.name, begin = %begin, "skipping excluded occurrence");
                continue;
            }
            let occurrence = self.occurrence(begin);
            if occurrence.is_none() {
                // later candidates would end out of range too
                self.exhausted = true;
                self.scan = None;
            }
            return occurrence;
        }
    }
}

impl std::iter::FusedIterator for Occurrences {}
