//! The matching engine: slides an observed offset history along each
//! candidate zone's stored history and reports the identifier of a zone
//! whose behavior is indistinguishable over the query range.

use std::path::Path;

use guesstz_db::{Db, DbError, Observances};
use guesstz_expand::{expand, ExpandError, Observance, Window, ZoneDefinition};
use jiff::Timestamp;
use serde_json::{json, Map, Value};
use thiserror::Error;
use tracing::debug;

/// Well-known zones favored when several candidates match. One
/// representative per common offset band, roughly west to east.
pub const DEFAULT_PREFERRED: &[&str] = &[
    "US/Aleutian",
    "US/Alaska",
    "US/Pacific",
    "US/Mountain",
    "US/Central",
    "US/Eastern",
    "America/Puerto_Rico",
    "America/Nuuk",
    "Atlantic/Azores",
    "Europe/London",
    "Europe/Berlin",
    "Europe/Athens",
    "Indian/Mauritius",
    "Asia/Dhaka",
    "Australia/Melbourne",
    "Pacific/Norfolk",
];

#[derive(Debug, Error)]
pub enum GuessError {
    #[error(
        "query start {start} is outside the database window [{window_start}, {window_end})"
    )]
    StartOutsideWindow {
        start: Timestamp,
        window_start: Timestamp,
        window_end: Timestamp,
    },
    #[error(transparent)]
    Db(#[from] DbError),
    #[error(transparent)]
    Expand(#[from] ExpandError),
}

/// A database plus a preference list, ready to answer queries.
pub struct Guesser {
    db: Db,
    preferred: Vec<String>,
}

impl Guesser {
    /// Opens the database at `path` with the default preference list.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, GuessError> {
        Ok(Self::new(Db::open(path)?))
    }

    pub fn new(db: Db) -> Self {
        Self::with_preferences(db, DEFAULT_PREFERRED.iter().map(|s| s.to_string()))
    }

    pub fn with_preferences(db: Db, preferred: impl IntoIterator<Item = String>) -> Self {
        Self {
            db,
            preferred: preferred.into_iter().collect(),
        }
    }

    pub fn db(&self) -> &Db {
        &self.db
    }

    /// Identifies `zone` by its behavior over `[start, end)`.
    ///
    /// `end` defaults to the database window end, and is clamped to it. The
    /// result is `Ok(None)` when no stored zone behaves like `zone` over the
    /// query range; among several that do, a zone on the preference list
    /// wins, otherwise the candidate latest in index order is reported.
    ///
    /// # Errors
    ///
    /// Returns [`GuessError::StartOutsideWindow`] when `start` falls outside
    /// the database's expansion window.
    pub fn guess(
        &self,
        zone: &ZoneDefinition,
        start: Timestamp,
        end: Option<Timestamp>,
    ) -> Result<Option<String>, GuessError> {
        let window_start = self.db.window_start();
        let window_end = self.db.window_end();
        if start < window_start || start >= window_end {
            return Err(GuessError::StartOutsideWindow {
                start,
                window_start,
                window_end,
            });
        }
        let end = match end {
            Some(end) if end < window_end => end,
            _ => window_end,
        };

        let window = Window::closed(start, end)?;
        let unknown = expand(zone, window)?.observances;
        let Some(first) = unknown.first() else {
            return Ok(None);
        };

        if let Some(id) = fixed_offset_id(zone, &unknown) {
            debug!(%id, "fixed-offset shortcut");
            return Ok(Some(id));
        }

        let Some(first_entry) = self.db.first_entry_with_offset(first.offset) else {
            return Ok(None);
        };

        let mut best = None;
        let mut i = first_entry;
        while let Some(entry) = self.db.entry_at(i) {
            if entry.offset != first.offset {
                break;
            }
            let candidate = self.db.zone_at(entry.zone_index)?;
            if candidate_matches(candidate.observances, &unknown) {
                if self.preferred.iter().any(|p| p == candidate.id) {
                    debug!(id = candidate.id, "preferred zone matched");
                    return Ok(Some(candidate.id.to_string()));
                }
                best = Some(candidate.id.to_string());
            }
            i += 1;
        }
        Ok(best)
    }

    /// Renders the whole database as JSON: header fields, the offset index
    /// grouped by offset, and every zone's observance history.
    pub fn encode(&self) -> Result<Value, GuessError> {
        let db = &self.db;
        let config = json!({
            "dbVersion": guesstz_db::VERSION,
            "endianness": "little",
            "sourceVersion": db.source_version(),
            "createdAt": db.created_at().to_string(),
            "rangeStart": db.window_start().to_string(),
            "rangeEnd": db.window_end().to_string(),
        });

        let mut offsets = Map::new();
        let mut i = 0;
        while let Some(entry) = db.entry_at(i) {
            let mut ids = Vec::new();
            while let Some(next) = db.entry_at(i) {
                if next.offset != entry.offset {
                    break;
                }
                ids.push(Value::from(db.zone_at(next.zone_index)?.id));
                i += 1;
            }
            offsets.insert(format_offset(entry.offset), Value::from(ids));
        }

        let mut timezones = Map::new();
        for zone in db.zones() {
            let history: Vec<Value> = zone
                .observances
                .iter()
                .map(|ob| json!([ob.onset.to_string(), format_offset(ob.offset)]))
                .collect();
            timezones.insert(zone.id.to_string(), Value::from(history));
        }

        Ok(json!({
            "config": config,
            "offsets": offsets,
            "timezones": timezones,
        }))
    }
}

/// Recognizes zones with a single constant whole-hour offset and names them
/// `Etc/GMT±H`. Those identifiers carry the sign inverted relative to the
/// offset, and only exist for results between -14 and +12.
fn fixed_offset_id(zone: &ZoneDefinition, unknown: &[Observance]) -> Option<String> {
    if unknown.len() != 1 || !zone.single_standard() {
        return None;
    }
    let offset = unknown[0].offset;
    if offset % 3600 != 0 {
        return None;
    }
    let hours = -(offset / 3600);
    if !(-14..=12).contains(&hours) {
        return None;
    }
    Some(format!("Etc/GMT{hours:+}"))
}

/// True when `unknown` appears as a contiguous run inside `history`.
///
/// The run is anchored by binary-searching the latest stored onset at or
/// before the query start; the first observance compares by offset only
/// (its onset is the query start, not a real transition), all later ones
/// must match exactly.
fn candidate_matches(history: Observances<'_>, unknown: &[Observance]) -> bool {
    let target = unknown[0].onset;
    let mut lo = 0;
    let mut hi = history.len();
    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        let Some(ob) = history.get(mid) else {
            return false;
        };
        if ob.onset <= target {
            lo = mid + 1;
        } else {
            hi = mid;
        }
    }
    if lo == 0 {
        // The zone's history starts after the query does.
        return false;
    }
    let slide = lo - 1;

    if history.len() - slide < unknown.len() {
        return false;
    }
    match history.get(slide) {
        Some(head) if head.offset == unknown[0].offset => {}
        _ => return false,
    }
    for (k, expected) in unknown.iter().enumerate().skip(1) {
        if history.get(slide + k) != Some(*expected) {
            return false;
        }
    }
    true
}

/// Formats a UTC offset as `±HHMM`, with trailing seconds only when the
/// offset is not minute-aligned.
pub fn format_offset(seconds: i32) -> String {
    let sign = if seconds < 0 { '-' } else { '+' };
    let abs = seconds.unsigned_abs();
    let h = abs / 3600;
    let m = (abs % 3600) / 60;
    let s = abs % 60;
    if s == 0 {
        format!("{sign}{h:02}{m:02}")
    } else {
        format!("{sign}{h:02}{m:02}{s:02}")
    }
}
