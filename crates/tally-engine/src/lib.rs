//! # tally-engine
//!
//! Recurrence expansion for calendar events, and per-name duration totals.
//!
//! Given an event with an optional `RRULE` and any number of `EXDATE`
//! records, the engine produces the concrete occurrences of that event up to
//! a window end, so callers can sum time spent per event name.
//!
//! Only the subset of RFC 5545 that timesheet-style exports use is covered:
//! `FREQ`, `COUNT`, `UNTIL`, a comma-separated `BYDAY` list, and `EXDATE` with
//! an optional `TZID`. Parsing `.ics` files is left to the caller.
//!
//! ## Modules
//!
//! - [`rule`] — Raw property records → typed `RecurrenceRule` + `ExceptionSet`
//! - [`expander`] — Event + window end → lazy sequence of occurrences
//! - [`aggregate`] — Window selection and per-name totals
//! - [`temporal`] — Datetime, timezone, and duration parsing
//! - [`error`] — Error types

pub mod aggregate;
pub mod error;
pub mod expander;
pub mod rule;
pub mod temporal;

pub use aggregate::{group_between, ErrorPolicy, GroupTotal, Totals, Window};
pub use error::TallyError;
pub use expander::{
    chronological, expand, expand_all, Event, Occurrence, Occurrences, PreparedEvent,
};
pub use rule::{ExceptionSet, Frequency, Property, Recurrence, RecurrenceRule, RuleParts};
pub use temporal::{format_hours, parse_datetime, parse_duration, parse_timezone};
