//! One-shot database construction.

use std::collections::HashSet;
use std::io::Write;

use byteorder::{LittleEndian, WriteBytesExt};
use guesstz_expand::{expand, Observance, Window, ZoneDefinition};
use jiff::Timestamp;
use tracing::debug;

use crate::format::{self, IndexEntry, BOM, MAGIC, OBSERVANCE_SIZE, VERSION};
use crate::DbError;

/// One zone's expanded history, staged for serialization.
struct ZoneRecord {
    id: String,
    observances: Vec<Observance>,
    /// Byte index of this record within the zone-record table.
    index: u64,
}

impl ZoneRecord {
    fn serialized_len(&self) -> u64 {
        (self.id.len() + 1 + 4 + self.observances.len() * OBSERVANCE_SIZE) as u64
    }
}

/// Accumulates zone definitions and serializes them into a database.
///
/// The builder owns all intermediate state: the staged zone records, the
/// growing offset index, and the running byte index assigned to each record.
/// Construction is a single-threaded batch pass; call
/// [`add_zone`](DbBuilder::add_zone) once per discovered zone, then
/// [`write_to`](DbBuilder::write_to) or [`to_bytes`](DbBuilder::to_bytes).
pub struct DbBuilder {
    window: Window,
    source_version: String,
    zones: Vec<ZoneRecord>,
    entries: Vec<IndexEntry>,
    ids: HashSet<String>,
    next_index: u64,
}

impl DbBuilder {
    /// Creates a builder for the half-open expansion window
    /// `[window_start, window_end)`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::InvalidWindow`] unless `window_start < window_end`.
    pub fn new(
        window_start: Timestamp,
        window_end: Timestamp,
        source_version: impl Into<String>,
    ) -> Result<Self, DbError> {
        if window_start >= window_end {
            return Err(DbError::InvalidWindow {
                start: window_start,
                end: window_end,
            });
        }
        let window = Window::closed(window_start, window_end)?;
        Ok(Self {
            window,
            source_version: source_version.into(),
            zones: Vec::new(),
            entries: Vec::new(),
            ids: HashSet::new(),
            next_index: 0,
        })
    }

    /// Expands `zone` over the database window and stages it for
    /// serialization.
    ///
    /// Returns `Ok(false)` when the expansion is empty (the zone contributes
    /// no records and is skipped).
    ///
    /// # Errors
    ///
    /// Returns [`DbError::DuplicateZone`] for an id that was already added,
    /// or any expansion failure.
    pub fn add_zone(&mut self, id: &str, zone: &ZoneDefinition) -> Result<bool, DbError> {
        if self.ids.contains(id) {
            return Err(DbError::DuplicateZone(id.to_string()));
        }

        let expansion = expand(zone, self.window)?;
        if expansion.observances.is_empty() {
            debug!(zone = id, "empty expansion, zone skipped");
            return Ok(false);
        }

        // Distinct offsets in first-appearance order; each one points the
        // global index at this zone's record.
        let mut distinct: Vec<i32> = Vec::new();
        for ob in &expansion.observances {
            if !distinct.contains(&ob.offset) {
                distinct.push(ob.offset);
            }
        }

        let record = ZoneRecord {
            id: id.to_string(),
            observances: expansion.observances,
            index: self.next_index,
        };
        debug!(
            zone = id,
            observances = record.observances.len(),
            offsets = distinct.len(),
            index = record.index,
            "zone staged"
        );

        for offset in distinct {
            self.entries.push(IndexEntry {
                offset,
                zone_index: record.index,
            });
        }
        self.next_index += record.serialized_len();
        self.ids.insert(id.to_string());
        self.zones.push(record);
        Ok(true)
    }

    /// Number of zones staged so far.
    pub fn len(&self) -> usize {
        self.zones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }

    /// Serializes the database: header, sorted offset index, zone records,
    /// and the terminating zero byte.
    pub fn write_to<W: Write>(mut self, w: &mut W) -> Result<(), DbError> {
        self.entries
            .sort_by_key(|entry| (entry.offset, entry.zone_index));

        // Header.
        w.write_all(MAGIC)?;
        w.write_u8(VERSION)?;
        w.write_u16::<LittleEndian>(BOM)?;
        w.write_i64::<LittleEndian>(Timestamp::now().as_second())?;
        w.write_i64::<LittleEndian>(self.window.start().as_second())?;
        // A builder window is always closed.
        let end = self.window.end().unwrap_or(Timestamp::MAX);
        w.write_i64::<LittleEndian>(end.as_second())?;
        w.write_all(self.source_version.as_bytes())?;
        w.write_u8(0)?;

        // Offset index.
        w.write_u32::<LittleEndian>(self.entries.len() as u32)?;
        for entry in &self.entries {
            format::write_index_entry(w, entry)?;
        }

        // Zone records, addressed only by byte index.
        for zone in &self.zones {
            w.write_all(zone.id.as_bytes())?;
            w.write_u8(0)?;
            w.write_u32::<LittleEndian>(zone.observances.len() as u32)?;
            for ob in &zone.observances {
                format::write_observance(w, ob)?;
            }
        }
        w.write_u8(0)?;

        Ok(())
    }

    /// Serializes the database into an owned byte vector.
    pub fn to_bytes(self) -> Result<Vec<u8>, DbError> {
        let mut bytes = Vec::new();
        self.write_to(&mut bytes)?;
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::INDEX_ENTRY_SIZE;
    use guesstz_expand::RuleComponent;
    use jiff::civil;

    fn ts(s: &str) -> Timestamp {
        s.parse().unwrap()
    }

    fn fixed_zone(offset: i32) -> ZoneDefinition {
        ZoneDefinition {
            components: vec![RuleComponent {
                start: civil::datetime(1970, 1, 1, 0, 0, 0, 0),
                offset_from: 0,
                offset_to: offset,
                daylight: false,
                repeat: None,
                extra_dates: vec![],
            }],
        }
    }

    fn builder() -> DbBuilder {
        DbBuilder::new(
            ts("2000-01-01T00:00:00Z"),
            ts("2032-01-01T00:00:00Z"),
            "2025a",
        )
        .unwrap()
    }

    #[test]
    fn rejects_malformed_window() {
        let at = ts("2000-01-01T00:00:00Z");
        assert!(matches!(
            DbBuilder::new(at, at, "x"),
            Err(DbError::InvalidWindow { .. })
        ));
    }

    #[test]
    fn rejects_duplicate_ids() {
        let mut b = builder();
        assert!(b.add_zone("A/B", &fixed_zone(3600)).unwrap());
        assert!(matches!(
            b.add_zone("A/B", &fixed_zone(7200)),
            Err(DbError::DuplicateZone(_))
        ));
    }

    #[test]
    fn skips_zones_with_empty_expansion() {
        let mut b = builder();
        // Starts after the window closes, so nothing is emitted.
        let zone = ZoneDefinition {
            components: vec![RuleComponent {
                start: civil::datetime(2040, 1, 1, 0, 0, 0, 0),
                offset_from: 0,
                offset_to: 3600,
                daylight: false,
                repeat: None,
                extra_dates: vec![],
            }],
        };
        assert!(!b.add_zone("Late/Zone", &zone).unwrap());
        assert_eq!(b.len(), 0);
    }

    #[test]
    fn header_layout_is_fixed() {
        let mut b = builder();
        b.add_zone("A/B", &fixed_zone(3600)).unwrap();
        let bytes = b.to_bytes().unwrap();

        assert_eq!(&bytes[..8], MAGIC);
        assert_eq!(bytes[8], VERSION);
        // Little-endian BOM leads with 0xFF.
        assert_eq!(&bytes[9..11], &[0xFF, 0xFE]);
        // created_at, window_start, window_end follow.
        let start = i64::from_le_bytes(bytes[19..27].try_into().unwrap());
        assert_eq!(start, ts("2000-01-01T00:00:00Z").as_second());
        let end = i64::from_le_bytes(bytes[27..35].try_into().unwrap());
        assert_eq!(end, ts("2032-01-01T00:00:00Z").as_second());
        // Source version string, zero terminated.
        assert_eq!(&bytes[35..41], b"2025a\0");
        // Exactly one index entry for the single distinct offset.
        let count = u32::from_le_bytes(bytes[41..45].try_into().unwrap());
        assert_eq!(count, 1);
        // The file ends with the zone table terminator.
        assert_eq!(*bytes.last().unwrap(), 0);
    }

    #[test]
    fn byte_indexes_accumulate_record_sizes() {
        let mut b = builder();
        b.add_zone("AA", &fixed_zone(3600)).unwrap();
        b.add_zone("BB", &fixed_zone(7200)).unwrap();
        // First record: "AA\0" + count + one observance.
        let first_len = (3 + 4 + OBSERVANCE_SIZE) as u64;
        assert_eq!(b.zones[0].index, 0);
        assert_eq!(b.zones[1].index, first_len);
    }

    #[test]
    fn index_entries_sorted_by_offset_then_index() {
        let mut b = builder();
        b.add_zone("High/Offset", &fixed_zone(7200)).unwrap();
        b.add_zone("Low/Offset", &fixed_zone(-3600)).unwrap();
        b.add_zone("Mid/Offset", &fixed_zone(3600)).unwrap();
        let bytes = b.to_bytes().unwrap();

        // Index starts right after the header (35 bytes) + "2025a\0" + count.
        let index_pos = 35 + 6 + 4;
        let offsets: Vec<i32> = (0..3)
            .map(|i| {
                let at = index_pos + i * INDEX_ENTRY_SIZE;
                i32::from_le_bytes(bytes[at..at + 4].try_into().unwrap())
            })
            .collect();
        assert_eq!(offsets, vec![-3600, 3600, 7200]);
    }
}
