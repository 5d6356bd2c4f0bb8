use std::path::Path;

use anyhow::{Context, Result};
use chrono_tz::Tz;
use serde::Deserialize;
use tally_engine::{
    parse_datetime, parse_duration, parse_timezone, Event, Property, TallyError,
};

/// One event as written in the input file.
///
/// ```json
/// {"name": "Standup", "begin": "2024-01-01T09:00", "tzid": "Europe/Berlin",
///  "duration": "15m", "properties": [{"name": "RRULE", "value": "FREQ=DAILY;COUNT=3"}]}
/// ```
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawEvent {
    pub name: String,
    pub begin: String,
    #[serde(default)]
    pub tzid: Option<String>,
    pub duration: String,
    #[serde(default)]
    pub properties: Vec<Property>,
}

impl RawEvent {
    /// Resolve times against the event's own zone, or `default_zone`.
    pub fn into_event(self, default_zone: Tz) -> Result<Event> {
        let zone = match &self.tzid {
            Some(tzid) => parse_timezone(tzid)?,
            None => default_zone,
        };
        let begin = parse_datetime(&self.begin, zone)
            .with_context(|| format!("event '{}': begin", self.name))?;
        let duration = parse_duration(&self.duration)
            .with_context(|| format!("event '{}': duration", self.name))?;
        if begin.checked_add_signed(duration).is_none() {
            return Err(TallyError::InvalidDuration(format!(
                "{} after {} is out of range",
                self.duration, self.begin
            )))
            .with_context(|| format!("event '{}': duration", self.name));
        }

        Ok(Event {
            name: self.name,
            begin,
            duration,
            properties: self.properties,
        })
    }
}

pub fn read_events(path: &Path, default_zone: Tz) -> Result<Vec<Event>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading events {}", path.display()))?;
    parse_events(&text, default_zone).with_context(|| format!("parsing events {}", path.display()))
}

pub fn parse_events(text: &str, default_zone: Tz) -> Result<Vec<Event>> {
    let raw: Vec<RawEvent> = serde_json::from_str(text)?;
    raw.into_iter()
        .map(|event| event.into_event(default_zone))
        .collect()
}
