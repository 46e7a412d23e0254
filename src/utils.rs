//! Utility functions for little-endian field access, timestamps and names.

use crate::error::{RegistryError, Result};
use byteorder::{ByteOrder, LittleEndian};
use chrono::{DateTime, Utc};
use encoding_rs::{UTF_16LE, WINDOWS_1252};

/// Offset where hive bins start (after base block)
pub const HBIN_START_OFFSET: u32 = 0x1000;

/// Every hive structure length is a multiple of this.
pub const BLOCK_ALIGNMENT: usize = 8;

/// Seconds between 1601-01-01 and 1970-01-01.
pub const FILETIME_UNIX_DIFF: i64 = 11_644_473_600;

/// FILETIME ticks (100ns) per second.
const FILETIME_TICKS_PER_SECOND: u64 = 10_000_000;

/// Offset of the checksum field in the base block.
const CHECKSUM_OFFSET: usize = 0x1FC;

/// Sequential little-endian reader over a byte slice.
///
/// Every read is bounds-checked and reports the field being read, so a
/// truncated record surfaces as [`RegistryError::OutOfBounds`] naming the
/// field instead of a panic.
#[derive(Debug, Clone)]
pub struct FieldReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> FieldReader<'a> {
    /// Creates a reader positioned at the start of `data`.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Creates a reader positioned at `pos`.
    pub fn at(data: &'a [u8], pos: usize) -> Self {
        Self { data, pos }
    }

    /// Current position within the underlying slice.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Takes the next `len` bytes.
    pub fn bytes(&mut self, len: usize, field: &'static str) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(len)
            .ok_or_else(|| RegistryError::out_of_bounds(field, usize::MAX, self.data.len()))?;
        if end > self.data.len() {
            return Err(RegistryError::out_of_bounds(field, end, self.data.len()));
        }
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    /// Takes everything after the current position.
    pub fn rest(&mut self) -> &'a [u8] {
        let rest = self.data.get(self.pos..).unwrap_or(&[]);
        self.pos = self.pos.max(self.data.len());
        rest
    }

    /// Reads a fixed-size byte array.
    pub fn array<const N: usize>(&mut self, field: &'static str) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.bytes(N, field)?);
        Ok(out)
    }

    /// Reads a little-endian `u16`.
    pub fn u16(&mut self, field: &'static str) -> Result<u16> {
        Ok(LittleEndian::read_u16(self.bytes(2, field)?))
    }

    /// Reads a little-endian `u32`.
    pub fn u32(&mut self, field: &'static str) -> Result<u32> {
        Ok(LittleEndian::read_u32(self.bytes(4, field)?))
    }

    /// Reads a little-endian `i32`.
    pub fn i32(&mut self, field: &'static str) -> Result<i32> {
        Ok(LittleEndian::read_i32(self.bytes(4, field)?))
    }

    /// Reads a little-endian `u64`.
    pub fn u64(&mut self, field: &'static str) -> Result<u64> {
        Ok(LittleEndian::read_u64(self.bytes(8, field)?))
    }
}

/// Reads a u32 from a byte slice at the given offset.
pub fn read_u32_le(data: &[u8], offset: usize) -> Result<u32> {
    FieldReader::at(data, offset).u32("u32 field")
}

/// Reads an i32 from a byte slice at the given offset.
pub fn read_i32_le(data: &[u8], offset: usize) -> Result<i32> {
    FieldReader::at(data, offset).i32("i32 field")
}

/// Rejects buffers that are empty or not a multiple of [`BLOCK_ALIGNMENT`].
#[inline]
pub fn ensure_aligned(data: &[u8]) -> Result<()> {
    if data.is_empty() || data.len() % BLOCK_ALIGNMENT != 0 {
        return Err(RegistryError::misaligned(data.len()));
    }
    Ok(())
}

/// Calculates XOR checksum for the first 508 bytes of the base block.
pub fn calculate_checksum(data: &[u8]) -> u32 {
    let end = CHECKSUM_OFFSET.min(data.len() - data.len() % 4);
    let checksum = data[..end]
        .chunks_exact(4)
        .fold(0u32, |acc, dword| acc ^ LittleEndian::read_u32(dword));

    match checksum {
        0xFFFF_FFFF => 0xFFFF_FFFE,
        0 => 1,
        other => other,
    }
}

/// Converts a Windows FILETIME to a UTC timestamp.
///
/// Sub-second ticks are truncated, so the result has whole-second resolution.
pub fn filetime_to_datetime(filetime: u64) -> Option<DateTime<Utc>> {
    let seconds = (filetime / FILETIME_TICKS_PER_SECOND) as i64 - FILETIME_UNIX_DIFF;
    DateTime::from_timestamp(seconds, 0)
}

/// Converts a UTC timestamp to a Windows FILETIME, truncated to whole seconds.
///
/// Returns `None` for instants before 1601-01-01.
pub fn datetime_to_filetime(datetime: DateTime<Utc>) -> Option<u64> {
    let seconds = u64::try_from(datetime.timestamp().checked_add(FILETIME_UNIX_DIFF)?).ok()?;
    seconds.checked_mul(FILETIME_TICKS_PER_SECOND)
}

/// Decodes a compressed (single-byte) registry name.
///
/// Compressed names are Latin-1; Windows-1252 is a superset for the printable range.
pub fn read_compressed_name(data: &[u8]) -> String {
    let (decoded, _had_errors) = WINDOWS_1252.decode_without_bom_handling(data);
    decoded.trim_end_matches('\0').to_string()
}

/// Reads a UTF-16LE string from a byte slice, trimming null terminators.
///
/// # Errors
///
/// Returns an error if the data length is not even (UTF-16 requires 2-byte units)
/// or if the UTF-16 decoding fails.
pub fn read_utf16_string(data: &[u8], offset: u32) -> Result<String> {
    if data.is_empty() {
        return Ok(String::new());
    }

    if data.len() % 2 != 0 {
        return Err(RegistryError::InvalidUtf16 { offset });
    }

    let (decoded, had_errors) = UTF_16LE.decode_without_bom_handling(data);
    if had_errors {
        return Err(RegistryError::InvalidUtf16 { offset });
    }

    Ok(decoded.trim_end_matches('\0').to_string())
}

/// Converts a relative cell offset to an absolute hive offset.
///
/// Cell offsets in the registry are relative to the first hbin (at 0x1000).
///
/// # Errors
///
/// Returns `RegistryError::InvalidOffset` if the offset would overflow.
#[inline]
pub fn cell_offset_to_absolute(cell_offset: u32) -> Result<u32> {
    cell_offset
        .checked_add(HBIN_START_OFFSET)
        .ok_or(RegistryError::InvalidOffset {
            offset: cell_offset,
            hive_size: 0,
        })
}

/// Converts an absolute hive offset to a relative cell offset.
///
/// # Errors
///
/// Returns `RegistryError::InvalidOffset` if the offset is before hbin start.
#[inline]
pub fn absolute_to_cell_offset(absolute_offset: u32) -> Result<u32> {
    absolute_offset
        .checked_sub(HBIN_START_OFFSET)
        .ok_or(RegistryError::InvalidOffset {
            offset: absolute_offset,
            hive_size: 0,
        })
}
