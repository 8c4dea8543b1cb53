//! Read-only, memory-mapped database access.
//!
//! [`Db::open`] maps the file and validates the whole structure up front:
//! header fields, index ordering, and every zone record the index can reach.
//! After `parse` succeeds, lookups never fail structurally, so the accessors
//! hand out plain values and `Option`s instead of `Result`s.

use std::collections::HashSet;
use std::fs::File;
use std::path::Path;

use guesstz_expand::Observance;
use jiff::Timestamp;
use memmap2::Mmap;
use tracing::debug;

use crate::format::{
    self, IndexEntry, INDEX_ENTRY_SIZE, MAGIC, OBSERVANCE_SIZE, VERSION,
};
use crate::DbError;

enum Buf {
    Mapped(Mmap),
    Owned(Vec<u8>),
}

impl Buf {
    fn bytes(&self) -> &[u8] {
        match self {
            Buf::Mapped(map) => map,
            Buf::Owned(vec) => vec,
        }
    }
}

/// An opened observance database.
///
/// Holds the raw bytes (mapped or owned) plus the decoded header and the
/// byte positions of the two tables. All observance data stays in place;
/// reads decode on the fly.
pub struct Db {
    buf: Buf,
    created_at: Timestamp,
    window_start: Timestamp,
    window_end: Timestamp,
    source_version: String,
    index_pos: usize,
    index_count: usize,
    zones_pos: usize,
}

impl Db {
    /// Maps `path` and validates it as a version-1 database.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, DbError> {
        let file = File::open(path)?;
        // Safety: the map is read-only and the builder writes databases in
        // one shot; concurrent truncation is not part of the access model.
        let map = unsafe { Mmap::map(&file)? };
        Self::parse(Buf::Mapped(map))
    }

    /// Validates an in-memory serialized database.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, DbError> {
        Self::parse(Buf::Owned(bytes))
    }

    fn parse(buf: Buf) -> Result<Self, DbError> {
        let bytes = buf.bytes();

        let magic = format::field_at(bytes, 0, MAGIC.len(), "magic")?;
        if magic != MAGIC {
            return Err(DbError::BadMagic);
        }
        let version = format::read_u8_at(bytes, 8, "version")?;
        if version != VERSION {
            return Err(DbError::UnsupportedVersion(version));
        }
        let bom = format::field_at(bytes, 9, 2, "bom")?;
        if bom != [0xFF, 0xFE] {
            return Err(DbError::EndiannessMismatch);
        }

        let created_at = read_timestamp(bytes, 11, "created_at")?;
        let window_start = read_timestamp(bytes, 19, "window_start")?;
        let window_end = read_timestamp(bytes, 27, "window_end")?;
        if window_start >= window_end {
            return Err(DbError::InvalidWindow {
                start: window_start,
                end: window_end,
            });
        }

        let (source_version, version_len) = format::read_cstr_at(bytes, 35, "source_version")?;
        let source_version = source_version.to_string();

        let count_pos = 35 + version_len + 1;
        let index_count = format::read_u32_at(bytes, count_pos, "index count")? as usize;
        let index_pos = count_pos + 4;
        let index_end = index_pos
            .checked_add(index_count * INDEX_ENTRY_SIZE)
            .filter(|&end| end <= bytes.len())
            .ok_or(DbError::Truncated {
                what: "offset index",
                at: index_pos,
            })?;
        let zones_pos = index_end;

        let record_starts = validate_zone_records(bytes, zones_pos)?;
        validate_index(bytes, index_pos, index_count, &record_starts)?;

        debug!(
            zones = record_starts.len(),
            index_entries = index_count,
            %source_version,
            "database opened"
        );

        Ok(Self {
            buf,
            created_at,
            window_start,
            window_end,
            source_version,
            index_pos,
            index_count,
            zones_pos,
        })
    }

    pub fn created_at(&self) -> Timestamp {
        self.created_at
    }

    /// Start of the expansion window the database covers (inclusive).
    pub fn window_start(&self) -> Timestamp {
        self.window_start
    }

    /// End of the expansion window the database covers (exclusive).
    pub fn window_end(&self) -> Timestamp {
        self.window_end
    }

    /// Version string of the rule source the database was built from.
    pub fn source_version(&self) -> &str {
        &self.source_version
    }

    /// Number of entries in the offset index.
    pub fn index_len(&self) -> usize {
        self.index_count
    }

    /// Decodes index entry `i`, or `None` past the end of the index.
    pub fn entry_at(&self, i: usize) -> Option<IndexEntry> {
        format::entry_at(self.buf.bytes(), self.index_pos, self.index_count, i)
    }

    /// Position of the first index entry whose offset equals `offset`, if
    /// any. The index is sorted by offset, so all matches follow
    /// contiguously.
    pub fn first_entry_with_offset(&self, offset: i32) -> Option<usize> {
        let mut lo = 0;
        let mut hi = self.index_count;
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            let entry = self.entry_at(mid)?;
            if entry.offset < offset {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        match self.entry_at(lo) {
            Some(entry) if entry.offset == offset => Some(lo),
            _ => None,
        }
    }

    /// Resolves a zone record by its byte index into the zone-record table.
    ///
    /// # Errors
    ///
    /// Fails when `zone_index` does not land on a decodable record; indexes
    /// taken from [`entry_at`](Db::entry_at) are always valid.
    pub fn zone_at(&self, zone_index: u64) -> Result<ZoneView<'_>, DbError> {
        let (view, _) = parse_record(self.buf.bytes(), self.zones_pos, zone_index)?;
        Ok(view)
    }

    /// Iterates over all zone records in byte-index order.
    pub fn zones(&self) -> Zones<'_> {
        Zones {
            bytes: self.buf.bytes(),
            zones_pos: self.zones_pos,
            rel: 0,
        }
    }
}

fn read_timestamp(bytes: &[u8], pos: usize, what: &'static str) -> Result<Timestamp, DbError> {
    let seconds = format::read_i64_at(bytes, pos, what)?;
    Timestamp::from_second(seconds).map_err(DbError::TimeOutOfRange)
}

/// Walks the zone-record table from `zones_pos` to the terminating zero
/// byte, decoding every record, and returns the set of valid record byte
/// indexes.
fn validate_zone_records(bytes: &[u8], zones_pos: usize) -> Result<HashSet<u64>, DbError> {
    let mut starts = HashSet::new();
    let mut rel: u64 = 0;
    loop {
        let abs = zones_pos + rel as usize;
        if format::read_u8_at(bytes, abs, "zone table terminator")? == 0 {
            return Ok(starts);
        }
        let (view, next) = parse_record(bytes, zones_pos, rel)?;
        for i in 0..view.observances.len() {
            // Forces the onset through timestamp range validation.
            view.observances.get(i).ok_or(DbError::Truncated {
                what: "observance onset",
                at: abs,
            })?;
        }
        starts.insert(rel);
        rel = next;
    }
}

fn validate_index(
    bytes: &[u8],
    index_pos: usize,
    count: usize,
    record_starts: &HashSet<u64>,
) -> Result<(), DbError> {
    let mut prev: Option<IndexEntry> = None;
    for i in 0..count {
        let entry = format::entry_at(bytes, index_pos, count, i).ok_or(DbError::Truncated {
            what: "offset index entry",
            at: index_pos + i * INDEX_ENTRY_SIZE,
        })?;
        if let Some(prev) = prev {
            if (entry.offset, entry.zone_index) <= (prev.offset, prev.zone_index) {
                return Err(DbError::UnsortedIndex(i));
            }
        }
        if !record_starts.contains(&entry.zone_index) {
            return Err(DbError::BadZonePointer {
                entry: i,
                at: entry.zone_index,
            });
        }
        prev = Some(entry);
    }
    Ok(())
}

fn parse_record(
    bytes: &[u8],
    zones_pos: usize,
    rel: u64,
) -> Result<(ZoneView<'_>, u64), DbError> {
    let abs = zones_pos
        .checked_add(usize::try_from(rel).map_err(|_| DbError::Truncated {
            what: "zone record",
            at: zones_pos,
        })?)
        .ok_or(DbError::Truncated {
            what: "zone record",
            at: zones_pos,
        })?;
    let (id, id_len) = format::read_cstr_at(bytes, abs, "zone id")?;
    let count_pos = abs + id_len + 1;
    let count = format::read_u32_at(bytes, count_pos, "observance count")? as usize;
    let data_pos = count_pos + 4;
    let data = format::field_at(bytes, data_pos, count * OBSERVANCE_SIZE, "observances")?;
    let next = rel + (id_len + 1 + 4 + count * OBSERVANCE_SIZE) as u64;
    Ok((
        ZoneView {
            id,
            observances: Observances { data, count },
        },
        next,
    ))
}

/// A zone record borrowed from the database buffer.
#[derive(Clone, Copy)]
pub struct ZoneView<'a> {
    pub id: &'a str,
    pub observances: Observances<'a>,
}

/// A zone's packed observance list, decoded lazily.
#[derive(Clone, Copy)]
pub struct Observances<'a> {
    data: &'a [u8],
    count: usize,
}

impl<'a> Observances<'a> {
    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Decodes observance `i`, or `None` out of range.
    pub fn get(&self, i: usize) -> Option<Observance> {
        if i >= self.count {
            return None;
        }
        let pos = i * OBSERVANCE_SIZE;
        let seconds = format::read_i64_at(self.data, pos, "onset").ok()?;
        let offset = format::read_i32_at(self.data, pos + 8, "offset").ok()?;
        let onset = Timestamp::from_second(seconds).ok()?;
        Some(Observance { onset, offset })
    }

    pub fn iter(self) -> impl Iterator<Item = Observance> + 'a {
        (0..self.count).filter_map(move |i| self.get(i))
    }
}

/// Iterator over every zone record, in the order the builder staged them.
pub struct Zones<'a> {
    bytes: &'a [u8],
    zones_pos: usize,
    rel: u64,
}

impl<'a> Iterator for Zones<'a> {
    type Item = ZoneView<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let abs = self.zones_pos + self.rel as usize;
        if *self.bytes.get(abs)? == 0 {
            return None;
        }
        // Records were fully validated at open time.
        let (view, next) = parse_record(self.bytes, self.zones_pos, self.rel).ok()?;
        self.rel = next;
        Some(view)
    }
}
