//! # guesstz-db
//!
//! The precomputed observance database: write-once, read-many storage for
//! many zones' expanded UTC-offset histories, addressed through an
//! offset-sorted index.
//!
//! ## File layout (v1)
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │ HEADER                                              │
//! │                                                     │
//! │ magic "guesstz\0" | version (u8) | bom (u16 0xFEFF) │
//! │ created_at (i64) | window_start (i64)               │
//! │ window_end (i64) | source_version (cstring)         │
//! ├─────────────────────────────────────────────────────┤
//! │ OFFSET INDEX (offset → zone record mapping)         │
//! │                                                     │
//! │ count (u32)                                         │
//! │ offset (i32) | zone_index (u64)                     │
//! │                                                     │
//! │ ... repeated, sorted by (offset, zone_index) ...    │
//! ├─────────────────────────────────────────────────────┤
//! │ ZONE RECORDS (terminated by a single zero byte)     │
//! │                                                     │
//! │ id (cstring) | count (u32)                          │
//! │ onset (i64) | offset (i32)                          │
//! │                                                     │
//! │ ... records in byte-index order ...                 │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! All integers are little-endian; timestamps are UNIX epoch seconds. The
//! BOM field holds `0xFEFF` in the file's own byte order, so a reader on a
//! mismatched-endianness file sees the bytes reversed and rejects it.
//!
//! A database is built in one shot by [`DbBuilder`] and opened read-only by
//! [`Db`], which maps the file and never copies or mutates the record
//! tables. One opened [`Db`] may serve any number of concurrent lookups.

mod format;
mod reader;
mod writer;

use jiff::Timestamp;
use thiserror::Error;

pub use format::{IndexEntry, INDEX_ENTRY_SIZE, MAGIC, OBSERVANCE_SIZE, VERSION};
pub use reader::{Db, Observances, ZoneView, Zones};
pub use writer::DbBuilder;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("not a guesstz database (bad magic)")]
    BadMagic,
    #[error("unsupported database version {0}")]
    UnsupportedVersion(u8),
    #[error("database endianness differs from this reader's byte order")]
    EndiannessMismatch,
    #[error("database truncated reading {what} at byte {at}")]
    Truncated { what: &'static str, at: usize },
    #[error("zone id at byte {at} is not valid UTF-8")]
    BadZoneId { at: usize },
    #[error("timestamp field outside the representable time range")]
    TimeOutOfRange(#[source] jiff::Error),
    #[error("offset index entry {0} breaks (offset, zone_index) order")]
    UnsortedIndex(usize),
    #[error("offset index entry {entry} points at byte {at}, which is not a zone record start")]
    BadZonePointer { entry: usize, at: u64 },
    #[error("invalid database window: start {start} is not before end {end}")]
    InvalidWindow { start: Timestamp, end: Timestamp },
    #[error("duplicate zone id {0:?}")]
    DuplicateZone(String),
    #[error(transparent)]
    Expand(#[from] guesstz_expand::ExpandError),
}
