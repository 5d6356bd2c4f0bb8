mod cli;
mod config;
mod input;
mod logging;

use std::io::{self, Write};
use std::process;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use clap::Parser;
use tally_engine::{
    format_hours, group_between, parse_datetime, parse_timezone, temporal::resolve_local,
    ErrorPolicy, Totals, Window,
};
use tracing::info;

use crate::cli::Cli;
use crate::config::TallyConfig;

fn main() {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    if let Err(e) = run(cli) {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => TallyConfig::load(path)?,
        None => TallyConfig::defaults(),
    };

    let zone = parse_timezone(cli.timezone.as_deref().unwrap_or(&config.timezone))?;
    let policy: ErrorPolicy = cli.on_error.map(Into::into).unwrap_or(config.on_error);

    let start = parse_bound(&cli.start, zone).context("window start")?;
    let end = match &cli.end {
        Some(end) => parse_bound(end, zone).context("window end")?,
        None => today(zone)?,
    };
    let window = Window::new(start, end)?;

    let events = input::read_events(&cli.events, zone)?;
    info!(
        events = events.len(),
        start = %window.start,
        end = %window.end,
        ?policy,
        "tallying"
    );

    let totals = group_between(&events, &window, policy)?;

    let stdout = io::stdout();
    let mut out = stdout.lock();
    if cli.json {
        write_json(&mut out, &totals)?;
    } else {
        write_text(&mut out, &totals)?;
    }
    Ok(())
}

fn parse_bound(s: &str, zone: Tz) -> Result<DateTime<Utc>> {
    Ok(parse_datetime(s, zone)?.with_timezone(&Utc))
}

/// Midnight at the start of the current day in `zone`.
fn today(zone: Tz) -> Result<DateTime<Utc>> {
    let midnight = Utc::now()
        .with_timezone(&zone)
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .context("midnight out of range")?;
    let local = resolve_local(&zone, &midnight).context("today's midnight is not representable")?;
    Ok(local.with_timezone(&Utc))
}

fn write_text(out: &mut impl Write, totals: &Totals) -> Result<()> {
    for (name, total) in totals.iter() {
        writeln!(out, "{}\t{}", name, format_hours(total))?;
    }
    Ok(())
}

fn write_json(out: &mut impl Write, totals: &Totals) -> Result<()> {
    serde_json::to_writer_pretty(&mut *out, &totals.rows())?;
    writeln!(out)?;
    Ok(())
}
