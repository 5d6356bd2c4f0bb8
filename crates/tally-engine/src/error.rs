//! Error types for tally-engine operations.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TallyError {
    #[error("RRULE must contain FREQ")]
    MissingFrequency,

    #[error("Unsupported frequency with COUNT: {0}")]
    UnsupportedFrequencyWithCount(String),

    #[error("Unsupported frequency: {0}")]
    UnsupportedFrequency(String),

    #[error("RRULE cannot contain both COUNT and UNTIL")]
    ConflictingBounds,

    #[error("Malformed RRULE part: {0}")]
    MalformedRule(String),

    #[error("Invalid COUNT: {0}")]
    InvalidCount(String),

    #[error("Invalid BYDAY weekday: {0}")]
    InvalidWeekday(String),

    #[error("Invalid timezone: {0}")]
    InvalidTimezone(String),

    #[error("Invalid datetime: {0}")]
    InvalidDatetime(String),

    #[error("Invalid duration: {0}")]
    InvalidDuration(String),
}
