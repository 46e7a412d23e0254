//! Data records: the fallback cell variant.
//!
//! Value payloads, big data segment lists, free space and any cell whose
//! signature is not recognised are kept as opaque bytes after the size field.

use crate::cell::{CellPosition, HCELL_SIZE_LENGTH};
use crate::error::{RegistryError, Result};
use crate::utils::FieldReader;
use byteorder::{LittleEndian, WriteBytesExt};
use std::fmt;

/// Raw cell.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DataRecord {
    /// Signed cell size; negative means allocated.
    pub size: i32,

    /// Every byte after the size field.
    pub data: Vec<u8>,

    /// Set when the record was decoded as part of a bin.
    pub position: Option<CellPosition>,
}

impl DataRecord {
    /// Creates a record for a cell being built by hand.
    pub fn new(size: i32, data: Vec<u8>) -> Self {
        Self {
            size,
            data,
            position: None,
        }
    }

    /// Decodes a raw cell.
    ///
    /// The buffer must hold at least the declared size; everything after the
    /// size field becomes the payload. Inside a bin each cell is handed
    /// exactly its declared size, so the payload is `|size| - 4` bytes.
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < HCELL_SIZE_LENGTH {
            return Err(RegistryError::MalformedInput(format!(
                "data record of {} bytes, expected at least {}",
                data.len(),
                HCELL_SIZE_LENGTH
            )));
        }

        let mut reader = FieldReader::new(data);
        let size = reader.i32("cell size")?;
        let cell_size = size.unsigned_abs() as usize;
        if data.len() < cell_size {
            return Err(RegistryError::out_of_bounds("cell size", cell_size, data.len()));
        }

        Ok(DataRecord::new(size, reader.rest().to_vec()))
    }

    /// Encodes the record.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(HCELL_SIZE_LENGTH + self.data.len());
        self.encode_into(&mut out)?;
        Ok(out)
    }

    /// Appends the encoded record to `out`.
    pub fn encode_into(&self, out: &mut Vec<u8>) -> Result<()> {
        out.write_i32::<LittleEndian>(self.size)?;
        out.extend_from_slice(&self.data);
        Ok(())
    }

    /// Returns true if the cell is in use.
    pub fn is_allocated(&self) -> bool {
        self.size < 0
    }

    /// First two payload bytes, where a structured cell would keep its signature.
    pub fn signature(&self) -> Option<[u8; 2]> {
        match self.data.as_slice() {
            [a, b, ..] => Some([*a, *b]),
            _ => None,
        }
    }
}

impl fmt::Display for DataRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const PREVIEW: usize = 16;
        let shown = self.data.len().min(PREVIEW);
        write!(
            f,
            "data record ({} bytes): {}",
            self.data.len(),
            hex::encode(&self.data[..shown])
        )?;
        if self.data.len() > PREVIEW {
            write!(f, "...")?;
        }
        Ok(())
    }
}
