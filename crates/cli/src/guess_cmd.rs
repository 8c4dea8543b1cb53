use std::fs;
use std::io;

use anyhow::{Context, Result};
use guesstz_expand::ZoneDefinition;
use tracing::info;

use guesstz::engine::Guesser;

use crate::cli::{self, GuessArgs};

pub fn run(args: GuessArgs) -> Result<()> {
    let guesser = Guesser::open(&args.db)
        .with_context(|| format!("opening {}", args.db.display()))?;

    let (start, end) = match &args.range {
        Some(range) => cli::parse_query_range(range)?,
        None => (guesser.db().window_start(), None),
    };

    let text = match &args.input {
        Some(path) => fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?,
        None => io::read_to_string(io::stdin()).context("reading stdin")?,
    };
    let zone: ZoneDefinition =
        serde_json::from_str(&text).context("parsing zone definition")?;
    info!(components = zone.components.len(), %start, "matching");

    match guesser.guess(&zone, start, end)? {
        Some(id) => println!("{id}"),
        None => println!("unknown"),
    }
    Ok(())
}
