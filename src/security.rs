//! Key security (sk) decoding and encoding.
//!
//! Security cells are shared between keys and linked into a ring through
//! their forward and backward offsets.

use crate::cell::HCellData;
use crate::error::{RegistryError, Result};
use byteorder::{LittleEndian, WriteBytesExt};

/// Key security signature.
pub const KEY_SECURITY_SIGNATURE: &[u8; 2] = b"sk";

/// Size of the fixed block following the cell prologue.
pub const KEY_SECURITY_DATA_SIZE: usize = 16;

/// Key security (sk) structure. The prologue's metadata field is reserved.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct KeySecurity {
    /// Cell prologue; `metadata` is reserved.
    pub header: HCellData,

    /// Offset of the next security cell in the ring.
    pub flink: u32,

    /// Offset of the previous security cell in the ring.
    pub blink: u32,

    /// Number of keys referencing this descriptor.
    pub reference_count: u32,

    /// Length of the security descriptor in bytes.
    pub descriptor_size: u32,

    /// Raw self-relative security descriptor.
    pub descriptor: Vec<u8>,
}

impl KeySecurity {
    /// Decodes a key security cell, starting at its size field.
    pub fn decode(data: &[u8]) -> Result<Self> {
        let mut header = HCellData::decode(data, KEY_SECURITY_SIGNATURE)?;
        let mut reader = header.body(data);

        let flink = reader.u32("flink")?;
        let blink = reader.u32("blink")?;
        let reference_count = reader.u32("reference count")?;
        let descriptor_size = reader.u32("security descriptor size")?;

        let descriptor = reader
            .bytes(descriptor_size as usize, "security descriptor size")?
            .to_vec();
        header.padding = reader.rest().to_vec();

        Ok(KeySecurity {
            header,
            flink,
            blink,
            reference_count,
            descriptor_size,
            descriptor,
        })
    }

    /// Encodes the key security cell.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(self.header.cell_size());
        self.encode_into(&mut out)?;
        Ok(out)
    }

    /// Appends the encoded key security cell to `out`.
    pub fn encode_into(&self, out: &mut Vec<u8>) -> Result<()> {
        if self.descriptor_size as usize != self.descriptor.len() {
            return Err(RegistryError::inconsistent(
                "security descriptor size",
                self.descriptor_size as usize,
                self.descriptor.len(),
            ));
        }

        let start = self.header.begin_encode(out)?;
        out.write_u32::<LittleEndian>(self.flink)?;
        out.write_u32::<LittleEndian>(self.blink)?;
        out.write_u32::<LittleEndian>(self.reference_count)?;
        out.write_u32::<LittleEndian>(self.descriptor_size)?;
        out.extend_from_slice(&self.descriptor);
        self.header.end_encode(out, start)
    }
}
