use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use jiff::Timestamp;

/// Expansion window used when `--range` is not given.
pub const DEFAULT_RANGE: &str = "2000-01-01T00:00:00Z/2032-01-01T00:00:00Z";

/// Identify IANA time zones from observed UTC-offset histories.
#[derive(Parser)]
#[command(
    name = "guesstz",
    version,
    about = "Identify IANA time zones from observed UTC-offset histories"
)]
pub struct Cli {
    /// Increase verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Subcommand to run.
    #[command(subcommand)]
    pub command: Command,
}

/// Available subcommands.
#[derive(Subcommand)]
pub enum Command {
    /// Build an observance database from a directory of zone definitions.
    Create(CreateArgs),
    /// Dump a database's header, offset index, and zone histories as JSON.
    Print(PrintArgs),
    /// Match an observed offset history against a database.
    Guess(GuessArgs),
}

/// Arguments for the `create` subcommand.
#[derive(clap::Args)]
pub struct CreateArgs {
    /// Directory of zone definition JSON files (searched recursively).
    #[arg(short, long)]
    pub zoneinfo: PathBuf,

    /// Expansion window as START/END in RFC 3339, half-open.
    #[arg(short, long, default_value = DEFAULT_RANGE)]
    pub range: String,

    /// Path for the database file.
    #[arg(short, long)]
    pub out: PathBuf,
}

/// Arguments for the `print` subcommand.
#[derive(clap::Args)]
pub struct PrintArgs {
    /// Path to the database file.
    pub db: PathBuf,
}

/// Arguments for the `guess` subcommand.
#[derive(clap::Args)]
pub struct GuessArgs {
    /// Path to the database file.
    pub db: PathBuf,

    /// Query range as START/END or just START in RFC 3339. Defaults to the
    /// database's own window.
    #[arg(short, long)]
    pub range: Option<String>,

    /// Zone definition JSON to identify; reads stdin when omitted.
    #[arg(short, long)]
    pub input: Option<PathBuf>,
}

/// Parses `START/END` where both bounds are required and `START < END`.
pub fn parse_range(s: &str) -> Result<(Timestamp, Timestamp)> {
    let (start, end) = s
        .split_once('/')
        .with_context(|| format!("range {s:?} is not START/END"))?;
    let start: Timestamp = start
        .parse()
        .with_context(|| format!("invalid range start {start:?}"))?;
    let end: Timestamp = end
        .parse()
        .with_context(|| format!("invalid range end {end:?}"))?;
    if start >= end {
        bail!("range start {start} is not before end {end}");
    }
    Ok((start, end))
}

/// Parses `START/END` or a bare `START`; a missing end is resolved later
/// against the database window.
pub fn parse_query_range(s: &str) -> Result<(Timestamp, Option<Timestamp>)> {
    match s.split_once('/') {
        Some(_) => {
            let (start, end) = parse_range(s)?;
            Ok((start, Some(end)))
        }
        None => {
            let start: Timestamp = s
                .parse()
                .with_context(|| format!("invalid range start {s:?}"))?;
            Ok((start, None))
        }
    }
}
