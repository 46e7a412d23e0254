//! Big data (db) decoding and encoding.
//!
//! Values larger than 16,344 bytes are split into segments. The db cell only
//! describes them: its metadata field is the segment count and its single
//! fixed field points at a separate cell holding the segment offsets. Neither
//! the list nor the segments are followed here.

use crate::cell::HCellData;
use crate::error::Result;
use byteorder::{LittleEndian, WriteBytesExt};

/// Big data signature.
pub const BIG_DATA_SIGNATURE: &[u8; 2] = b"db";

/// Big data block header structure.
///
/// Format:
/// ```text
/// Offset  Size  Description
/// 0x00    4     Cell size
/// 0x04    2     Signature ("db")
/// 0x06    2     Number of segments
/// 0x08    4     Offset to segment list
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BigData {
    /// Cell prologue; `metadata` holds the segment count.
    pub header: HCellData,

    /// Offset to the list of segment offsets.
    pub segment_list_offset: u32,
}

impl BigData {
    /// Decodes a big data cell, starting at its size field.
    pub fn decode(data: &[u8]) -> Result<Self> {
        let mut header = HCellData::decode(data, BIG_DATA_SIGNATURE)?;
        let mut reader = header.body(data);

        let segment_list_offset = reader.u32("segment list offset")?;
        header.padding = reader.rest().to_vec();

        Ok(BigData {
            header,
            segment_list_offset,
        })
    }

    /// Encodes the big data cell.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(self.header.cell_size());
        self.encode_into(&mut out)?;
        Ok(out)
    }

    /// Appends the encoded big data cell to `out`.
    pub fn encode_into(&self, out: &mut Vec<u8>) -> Result<()> {
        let start = self.header.begin_encode(out)?;
        out.write_u32::<LittleEndian>(self.segment_list_offset)?;
        self.header.end_encode(out, start)
    }

    /// Number of data segments.
    pub fn segment_count(&self) -> u16 {
        self.header.metadata
    }
}
