//! Hive bin (hbin) decoding and encoding.
//!
//! Hive bins are 4KB-aligned blocks that contain registry cells. Each hbin
//! has a 32-byte header followed by a sequence of cells that exactly fills
//! the declared bin size. The bin sequence [`HBinData`] is the bins laid end
//! to end, starting right after the base block.

use crate::cell::{Cell, CellPosition};
use crate::error::{RegistryError, Result};
use crate::utils::{ensure_aligned, filetime_to_datetime, FieldReader};
use byteorder::{LittleEndian, WriteBytesExt};
use chrono::{DateTime, Utc};
use tracing::{debug, trace, warn};

/// Expected signature for hive bins ("hbin").
pub const HBIN_SIGNATURE: &[u8; 4] = b"hbin";

/// Size of an hbin header.
pub const HBIN_HEADER_SIZE: usize = 0x20;

/// Bin sizes written by Windows are multiples of this.
pub const HBIN_ALIGNMENT: u32 = 0x1000;

/// Hive bin header structure.
///
/// Format:
/// ```text
/// Offset  Size  Description
/// 0x00    4     Signature ("hbin")
/// 0x04    4     Offset of this bin from the first bin
/// 0x08    4     Bin size, header included
/// 0x0C    8     Reserved
/// 0x14    8     Timestamp (FILETIME)
/// 0x1C    4     Spare
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct HbinHeader {
    /// Signature, should be "hbin".
    pub signature: [u8; 4],

    /// Offset of this hbin from the start of the hive bins (relative to 0x1000).
    pub offset: u32,

    /// Size of this hbin in bytes (including header).
    pub size: u32,

    /// Reserved field.
    pub reserved: u64,

    /// Timestamp (Windows FILETIME).
    pub timestamp: u64,

    /// Spare field.
    pub spare: u32,
}

impl HbinHeader {
    /// Decodes an hbin header from the first 32 bytes of `data`.
    ///
    /// # Errors
    ///
    /// Returns an error if fewer than 32 bytes are supplied or the signature
    /// is not `hbin`.
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < HBIN_HEADER_SIZE {
            return Err(RegistryError::MalformedInput(format!(
                "hbin header of {} bytes, expected at least {}",
                data.len(),
                HBIN_HEADER_SIZE
            )));
        }

        let mut reader = FieldReader::new(data);
        let signature = reader.array::<4>("hbin signature")?;
        if &signature != HBIN_SIGNATURE {
            return Err(RegistryError::invalid_signature(HBIN_SIGNATURE, &signature));
        }

        Ok(HbinHeader {
            signature,
            offset: reader.u32("hbin offset")?,
            size: reader.u32("hbin size")?,
            reserved: reader.u64("hbin reserved")?,
            timestamp: reader.u64("hbin timestamp")?,
            spare: reader.u32("hbin spare")?,
        })
    }

    /// Appends the encoded header to `out`.
    pub fn encode_into(&self, out: &mut Vec<u8>) -> Result<()> {
        out.extend_from_slice(&self.signature);
        out.write_u32::<LittleEndian>(self.offset)?;
        out.write_u32::<LittleEndian>(self.size)?;
        out.write_u64::<LittleEndian>(self.reserved)?;
        out.write_u64::<LittleEndian>(self.timestamp)?;
        out.write_u32::<LittleEndian>(self.spare)?;
        Ok(())
    }

    /// Returns the size of the data area (excluding the header).
    pub fn data_size(&self) -> u32 {
        self.size.saturating_sub(HBIN_HEADER_SIZE as u32)
    }

    /// Returns true if the bin size is a multiple of 4096.
    pub fn is_aligned(&self) -> bool {
        self.size % HBIN_ALIGNMENT == 0
    }

    /// Timestamp as UTC, truncated to whole seconds.
    pub fn timestamp_datetime(&self) -> Option<DateTime<Utc>> {
        filetime_to_datetime(self.timestamp)
    }
}

/// A hive bin: header plus the cells filling it.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct HBin {
    /// Bin header.
    pub header: HbinHeader,

    /// Cells in storage order.
    pub cells: Vec<Cell>,
}

impl HBin {
    /// Decodes a standalone bin.
    ///
    /// Cells are tagged with bin index 0; use [`HBinData::decode`] to decode a
    /// sequence with consistent indices.
    pub fn decode(data: &[u8]) -> Result<Self> {
        Self::decode_at(data, 0)
    }

    /// Decodes a bin that sits at `index` within its sequence.
    pub(crate) fn decode_at(data: &[u8], index: usize) -> Result<Self> {
        ensure_aligned(data)?;
        let header = HbinHeader::decode(data)?;

        let size = header.size as usize;
        if size < HBIN_HEADER_SIZE {
            return Err(RegistryError::MalformedInput(format!(
                "hbin size {} is smaller than its header",
                size
            )));
        }
        if size > data.len() {
            return Err(RegistryError::out_of_bounds("hbin size", size, data.len()));
        }
        if !header.is_aligned() {
            trace!(index, size, "Bin size is not a multiple of 4096");
        }

        let bin = &data[..size];
        let mut cells = Vec::new();
        let mut cursor = HBIN_HEADER_SIZE;

        while cursor < size {
            let cell_size = FieldReader::at(bin, cursor).i32("cell size")?;
            let cell_len = cell_size.unsigned_abs() as usize;
            let end = cursor
                .checked_add(cell_len)
                .filter(|&end| end <= size)
                .ok_or_else(|| RegistryError::out_of_bounds("cell size", cell_len, size - cursor))?;

            // A zero-sized cell is rejected here by the alignment guard.
            let mut cell = Cell::decode(&bin[cursor..end])?;
            cell.set_position(CellPosition {
                bin: index,
                offset: cursor as u32,
            });
            trace!(index, offset = cursor, cell_size, cell_type = ?cell.cell_type(), "Decoded cell");

            cells.push(cell);
            cursor = end;
        }

        Ok(HBin { header, cells })
    }

    /// Encodes the bin.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(self.header.size as usize);
        self.encode_into(&mut out)?;
        Ok(out)
    }

    /// Appends the encoded bin to `out`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InconsistentField`] if the cells do not fill
    /// the declared bin size exactly.
    pub fn encode_into(&self, out: &mut Vec<u8>) -> Result<()> {
        let start = out.len();
        self.header.encode_into(out)?;
        for cell in &self.cells {
            cell.encode_into(out)?;
        }

        let written = out.len() - start;
        if written != self.header.size as usize {
            return Err(RegistryError::inconsistent(
                "hbin size",
                self.header.size as usize,
                written,
            ));
        }
        Ok(())
    }

    /// Bin size in bytes, header included.
    pub fn size(&self) -> u32 {
        self.header.size
    }

    /// Finds the cell starting at `offset`, measured from the start of the bin.
    pub fn cell_at(&self, offset: u32) -> Option<&Cell> {
        let mut cursor = HBIN_HEADER_SIZE as u32;
        for cell in &self.cells {
            if cursor == offset {
                return Some(cell);
            }
            if cursor > offset {
                return None;
            }
            cursor = cursor.checked_add(cell.cell_size() as u32)?;
        }
        None
    }
}

/// The sequence of bins following the base block.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct HBinData {
    /// Bins in storage order.
    pub bins: Vec<HBin>,
}

impl HBinData {
    /// Decodes consecutive bins until `data` is exhausted.
    ///
    /// Each bin's extent comes from the size field of its own header. The
    /// header's offset field is informational; a mismatch with the running
    /// position is logged but not rejected.
    pub fn decode(data: &[u8]) -> Result<Self> {
        ensure_aligned(data)?;

        let mut bins = Vec::new();
        let mut start = 0usize;

        while start < data.len() {
            let size = FieldReader::at(data, start + 8).u32("hbin size")? as usize;
            if size < HBIN_HEADER_SIZE {
                return Err(RegistryError::MalformedInput(format!(
                    "hbin at {:#x} declares size {}, smaller than its header",
                    start, size
                )));
            }
            let end = start
                .checked_add(size)
                .filter(|&end| end <= data.len())
                .ok_or_else(|| {
                    RegistryError::out_of_bounds("hbin size", size, data.len() - start)
                })?;

            let bin = HBin::decode_at(&data[start..end], bins.len())?;
            if bin.header.offset as usize != start {
                warn!(
                    index = bins.len(),
                    declared = bin.header.offset,
                    actual = start,
                    "Bin offset field does not match its position"
                );
            }

            bins.push(bin);
            start = end;
        }

        debug!(
            bins = bins.len(),
            cells = bins.iter().map(|b| b.cells.len()).sum::<usize>(),
            "Decoded bin sequence"
        );
        Ok(HBinData { bins })
    }

    /// Encodes every bin, in order.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(self.total_size());
        for bin in &self.bins {
            bin.encode_into(&mut out)?;
        }
        Ok(out)
    }

    /// Number of bins.
    pub fn len(&self) -> usize {
        self.bins.len()
    }

    /// Returns true if there are no bins.
    pub fn is_empty(&self) -> bool {
        self.bins.is_empty()
    }

    /// Sum of all declared bin sizes.
    pub fn total_size(&self) -> usize {
        self.bins.iter().map(|b| b.header.size as usize).sum()
    }

    /// Start of each bin, relative to the first one.
    pub fn bin_offsets(&self) -> Vec<u32> {
        self.bins
            .iter()
            .scan(0u32, |next, bin| {
                let start = *next;
                *next = next.saturating_add(bin.header.size);
                Some(start)
            })
            .collect()
    }

    /// Iterates over every cell of every bin.
    pub fn cells(&self) -> impl Iterator<Item = &Cell> + '_ {
        self.bins.iter().flat_map(|bin| bin.cells.iter())
    }

    /// Looks up a cell by its back-reference.
    pub fn cell(&self, position: CellPosition) -> Option<&Cell> {
        self.bins.get(position.bin)?.cell_at(position.offset)
    }

    /// Converts a back-reference into a cell offset, as used by the offset
    /// fields of key nodes, values and subkey lists.
    pub fn cell_offset(&self, position: CellPosition) -> Option<u32> {
        let bin_start = *self.bin_offsets().get(position.bin)?;
        bin_start.checked_add(position.offset)
    }

    /// Resolves a cell offset to the cell starting there.
    ///
    /// Returns `None` for [`crate::cell::NO_CELL`] and for offsets that do
    /// not land on a cell boundary.
    pub fn resolve(&self, offset: u32) -> Option<&Cell> {
        let mut bin_start = 0u32;
        for bin in &self.bins {
            let bin_end = bin_start.checked_add(bin.header.size)?;
            if offset < bin_end {
                return bin.cell_at(offset.checked_sub(bin_start)?);
            }
            bin_start = bin_end;
        }
        None
    }
}
