use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use tally_engine::ErrorPolicy;

/// Total calendar event durations per event name over a date window.
#[derive(Parser, Debug)]
#[command(
    name = "tally",
    version,
    about = "Group calendar events by name, aggregating the duration of every occurrence"
)]
pub struct Cli {
    /// JSON file holding an array of events.
    pub events: PathBuf,

    /// Window start (ISO date or datetime).
    pub start: String,

    /// Window end (ISO date or datetime). Defaults to today.
    pub end: Option<String>,

    /// Path to a TOML configuration file.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Zone for datetimes without an offset. Overrides the config file.
    #[arg(short, long)]
    pub timezone: Option<String>,

    /// What to do with events whose recurrence rule is invalid.
    #[arg(long, value_enum)]
    pub on_error: Option<PolicyArg>,

    /// Print JSON instead of tab-separated lines.
    #[arg(long)]
    pub json: bool,

    /// Increase verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyArg {
    Abort,
    Skip,
}

impl From<PolicyArg> for ErrorPolicy {
    fn from(arg: PolicyArg) -> Self {
        match arg {
            PolicyArg::Abort => ErrorPolicy::Abort,
            PolicyArg::Skip => ErrorPolicy::Skip,
        }
    }
}
