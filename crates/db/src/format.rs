//! Binary format constants, field codecs, and bounds-checked reads.
//!
//! Every multi-byte field goes through one of the `read_*_at` helpers, which
//! validate the remaining buffer length before touching it; nothing in this
//! crate reads past the mapped extent.

use std::io::{Result as IoResult, Write};

use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};
use guesstz_expand::Observance;

use crate::DbError;

/// File magic, including the zero terminator.
pub const MAGIC: &[u8; 8] = b"guesstz\0";

/// Current database format version.
pub const VERSION: u8 = 1;

/// Byte-order mark written in the file's own endianness.
pub const BOM: u16 = 0xFEFF;

/// Serialized size of one observance: onset (i64) + offset (i32).
pub const OBSERVANCE_SIZE: usize = 8 + 4;

/// Serialized size of one offset-index entry: offset (i32) + zone_index (u64).
pub const INDEX_ENTRY_SIZE: usize = 4 + 8;

/// One offset-index entry: a distinct UTC offset of some zone, pointing at
/// that zone's record by byte index into the zone-record table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexEntry {
    pub offset: i32,
    pub zone_index: u64,
}

pub fn write_observance<W: Write>(w: &mut W, ob: &Observance) -> IoResult<()> {
    w.write_i64::<LittleEndian>(ob.onset.as_second())?;
    w.write_i32::<LittleEndian>(ob.offset)?;
    Ok(())
}

pub fn write_index_entry<W: Write>(w: &mut W, entry: &IndexEntry) -> IoResult<()> {
    w.write_i32::<LittleEndian>(entry.offset)?;
    w.write_u64::<LittleEndian>(entry.zone_index)?;
    Ok(())
}

pub fn field_at<'b>(
    buf: &'b [u8],
    pos: usize,
    len: usize,
    what: &'static str,
) -> Result<&'b [u8], DbError> {
    buf.get(pos..pos.checked_add(len).ok_or(DbError::Truncated { what, at: pos })?)
        .ok_or(DbError::Truncated { what, at: pos })
}

pub fn read_u8_at(buf: &[u8], pos: usize, what: &'static str) -> Result<u8, DbError> {
    Ok(field_at(buf, pos, 1, what)?[0])
}

pub fn read_u32_at(buf: &[u8], pos: usize, what: &'static str) -> Result<u32, DbError> {
    Ok(LittleEndian::read_u32(field_at(buf, pos, 4, what)?))
}

pub fn read_i32_at(buf: &[u8], pos: usize, what: &'static str) -> Result<i32, DbError> {
    Ok(LittleEndian::read_i32(field_at(buf, pos, 4, what)?))
}

pub fn read_i64_at(buf: &[u8], pos: usize, what: &'static str) -> Result<i64, DbError> {
    Ok(LittleEndian::read_i64(field_at(buf, pos, 8, what)?))
}

pub fn read_u64_at(buf: &[u8], pos: usize, what: &'static str) -> Result<u64, DbError> {
    Ok(LittleEndian::read_u64(field_at(buf, pos, 8, what)?))
}

/// Reads a zero-terminated UTF-8 string starting at `pos`, returning the
/// string and its length *excluding* the terminator.
pub fn read_cstr_at<'b>(
    buf: &'b [u8],
    pos: usize,
    what: &'static str,
) -> Result<(&'b str, usize), DbError> {
    let tail = buf.get(pos..).ok_or(DbError::Truncated { what, at: pos })?;
    let nul = tail
        .iter()
        .position(|&b| b == 0)
        .ok_or(DbError::Truncated { what, at: pos })?;
    let s = std::str::from_utf8(&tail[..nul]).map_err(|_| DbError::BadZoneId { at: pos })?;
    Ok((s, nul))
}

/// Decodes the index entry at table position `i` from the packed index
/// starting at `index_pos`. Positions past the validated table yield `None`.
pub fn entry_at(buf: &[u8], index_pos: usize, count: usize, i: usize) -> Option<IndexEntry> {
    if i >= count {
        return None;
    }
    let pos = index_pos + i * INDEX_ENTRY_SIZE;
    let bytes = buf.get(pos..pos + INDEX_ENTRY_SIZE)?;
    Some(IndexEntry {
        offset: LittleEndian::read_i32(&bytes[..4]),
        zone_index: LittleEndian::read_u64(&bytes[4..]),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use jiff::Timestamp;

    #[test]
    fn observance_codec_round_trip() {
        let ob = Observance {
            onset: "2000-01-01T00:00:00Z".parse().unwrap(),
            offset: -18000,
        };
        let mut buf = Vec::new();
        write_observance(&mut buf, &ob).unwrap();
        assert_eq!(buf.len(), OBSERVANCE_SIZE);
        assert_eq!(read_i64_at(&buf, 0, "onset").unwrap(), ob.onset.as_second());
        assert_eq!(read_i32_at(&buf, 8, "offset").unwrap(), ob.offset);
    }

    #[test]
    fn index_entry_codec_round_trip() {
        let entry = IndexEntry {
            offset: 3600,
            zone_index: 12345,
        };
        let mut buf = Vec::new();
        write_index_entry(&mut buf, &entry).unwrap();
        assert_eq!(buf.len(), INDEX_ENTRY_SIZE);
        assert_eq!(entry_at(&buf, 0, 1, 0), Some(entry));
        assert_eq!(entry_at(&buf, 0, 1, 1), None);
    }

    #[test]
    fn negative_onset_survives() {
        let ob = Observance {
            onset: Timestamp::from_second(-86400).unwrap(),
            offset: 0,
        };
        let mut buf = Vec::new();
        write_observance(&mut buf, &ob).unwrap();
        assert_eq!(read_i64_at(&buf, 0, "onset").unwrap(), -86400);
    }

    #[test]
    fn reads_never_pass_the_buffer_end() {
        let buf = [0u8; 4];
        assert!(read_i64_at(&buf, 0, "x").is_err());
        assert!(read_u32_at(&buf, 2, "x").is_err());
        assert!(read_u8_at(&buf, 4, "x").is_err());
        assert!(read_cstr_at(&[1, 2, 3], 0, "x").is_err()); // no terminator
    }

    #[test]
    fn cstr_reads_utf8_up_to_nul() {
        let buf = b"Europe/Berlin\0rest";
        let (s, len) = read_cstr_at(buf, 0, "id").unwrap();
        assert_eq!(s, "Europe/Berlin");
        assert_eq!(len, 13);
    }
}
