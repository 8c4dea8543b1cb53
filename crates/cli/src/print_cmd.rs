use anyhow::{Context, Result};

use guesstz::engine::Guesser;

use crate::cli::PrintArgs;

pub fn run(args: PrintArgs) -> Result<()> {
    let guesser = Guesser::open(&args.db)
        .with_context(|| format!("opening {}", args.db.display()))?;
    println!("{}", serde_json::to_string_pretty(&guesser.encode()?)?);
    Ok(())
}
