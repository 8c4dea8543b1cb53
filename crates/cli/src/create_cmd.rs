use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use guesstz_db::DbBuilder;
use guesstz_expand::{RuleComponent, ZoneDefinition};
use serde::Deserialize;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::cli::{self, CreateArgs};

/// On-disk zone definition: an IANA identifier plus its rule components.
#[derive(Deserialize)]
struct ZoneFile {
    id: String,
    #[serde(default)]
    components: Vec<RuleComponent>,
}

pub fn run(args: CreateArgs) -> Result<()> {
    let (start, end) = cli::parse_range(&args.range)?;
    let source_version = read_source_version(&args.zoneinfo);
    info!(
        zoneinfo = %args.zoneinfo.display(),
        %source_version,
        %start,
        %end,
        "building database"
    );

    let mut builder = DbBuilder::new(start, end, source_version)?;
    let mut added = 0usize;
    let mut skipped = 0usize;
    for path in zone_files(&args.zoneinfo) {
        let text = fs::read_to_string(&path)
            .with_context(|| format!("reading {}", path.display()))?;
        let zone: ZoneFile = serde_json::from_str(&text)
            .with_context(|| format!("parsing {}", path.display()))?;
        let definition = ZoneDefinition {
            components: zone.components,
        };
        let staged = builder
            .add_zone(&zone.id, &definition)
            .with_context(|| format!("expanding {} from {}", zone.id, path.display()))?;
        if staged {
            added += 1;
        } else {
            debug!(zone = zone.id.as_str(), "no observances in range");
            skipped += 1;
        }
    }
    if builder.is_empty() {
        bail!(
            "no zone definitions produced observances under {}",
            args.zoneinfo.display()
        );
    }

    let file = File::create(&args.out)
        .with_context(|| format!("creating {}", args.out.display()))?;
    let mut out = BufWriter::new(file);
    builder.write_to(&mut out)?;
    info!(added, skipped, out = %args.out.display(), "database written");
    Ok(())
}

/// All `.json` files under `dir`, in path order so builds are reproducible.
fn zone_files(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| {
            entry.file_type().is_file()
                && entry.path().extension().is_some_and(|ext| ext == "json")
        })
        .map(|entry| entry.into_path())
        .collect();
    files.sort();
    files
}

/// The rule source's version string, read from a `version` file at the top
/// of the zoneinfo directory.
fn read_source_version(dir: &Path) -> String {
    fs::read_to_string(dir.join("version"))
        .map(|s| s.trim().to_string())
        .unwrap_or_else(|_| "unknown".to_string())
}
