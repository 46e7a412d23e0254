//! Subkey index cells (li, lf, lh, ri).
//!
//! A key's subkeys are reached through a two-level index: an index root (ri)
//! lists leaf cells, and each leaf (li, lf, lh) lists key nodes. The element
//! count lives in the prologue's metadata field. Fast and hash leaves share a
//! wire layout of 8-byte elements: key offset followed by a 4-byte hint.

use crate::cell::HCellData;
use crate::error::{RegistryError, Result};
use byteorder::{LittleEndian, WriteBytesExt};

/// Index leaf signature.
pub const INDEX_LEAF_SIGNATURE: &[u8; 2] = b"li";

/// Fast leaf signature.
pub const FAST_LEAF_SIGNATURE: &[u8; 2] = b"lf";

/// Hash leaf signature.
pub const HASH_LEAF_SIGNATURE: &[u8; 2] = b"lh";

/// Index root signature.
pub const INDEX_ROOT_SIGNATURE: &[u8; 2] = b"ri";

/// Width of an offset element.
pub const OFFSET_ELEMENT_SIZE: usize = 4;

/// Width of a named element.
pub const NAMED_ELEMENT_SIZE: usize = 8;

/// Element of a fast or hash leaf.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NamedElement {
    /// Offset to the key node.
    pub offset: u32,

    /// First four name bytes (lf) or name hash (lh).
    pub hint: [u8; 4],
}

impl NamedElement {
    /// The hint read as a little-endian integer, i.e. the lh name hash.
    pub fn hint_u32(&self) -> u32 {
        u32::from_le_bytes(self.hint)
    }
}

/// Index leaf (li): plain list of key node offsets.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct IndexLeaf {
    /// Cell prologue; `metadata` holds the element count.
    pub header: HCellData,
    /// Key node offsets.
    pub elements: Vec<u32>,
}

/// Fast leaf (lf): key node offsets with name hints.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FastLeaf {
    /// Cell prologue; `metadata` holds the element count.
    pub header: HCellData,
    /// Offset and name hint pairs.
    pub elements: Vec<NamedElement>,
}

/// Hash leaf (lh): key node offsets with name hashes.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct HashLeaf {
    /// Cell prologue; `metadata` holds the element count.
    pub header: HCellData,
    /// Offset and name hash pairs.
    pub elements: Vec<NamedElement>,
}

/// Index root (ri): list of leaf cell offsets.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct IndexRoot {
    /// Cell prologue; `metadata` holds the element count.
    pub header: HCellData,
    /// Leaf cell offsets.
    pub elements: Vec<u32>,
}

fn decode_offsets(data: &[u8], signature: &[u8; 2]) -> Result<(HCellData, Vec<u32>)> {
    let mut header = HCellData::decode(data, signature)?;
    let mut reader = header.body(data);

    // Bounds-check the whole list up front so the error names the count.
    let count = header.metadata as usize;
    let mut list = reader.clone();
    list.bytes(count * OFFSET_ELEMENT_SIZE, "element count")?;

    let elements = (0..count)
        .map(|_| reader.u32("element count"))
        .collect::<Result<Vec<_>>>()?;
    header.padding = reader.rest().to_vec();
    Ok((header, elements))
}

fn encode_offsets(header: &HCellData, elements: &[u32], out: &mut Vec<u8>) -> Result<()> {
    check_count(header, elements.len())?;
    let start = header.begin_encode(out)?;
    for element in elements {
        out.write_u32::<LittleEndian>(*element)?;
    }
    header.end_encode(out, start)
}

fn decode_named(data: &[u8], signature: &[u8; 2]) -> Result<(HCellData, Vec<NamedElement>)> {
    let mut header = HCellData::decode(data, signature)?;
    let mut reader = header.body(data);

    let count = header.metadata as usize;
    let mut list = reader.clone();
    list.bytes(count * NAMED_ELEMENT_SIZE, "element count")?;

    let mut elements = Vec::with_capacity(count);
    for _ in 0..count {
        let offset = reader.u32("element count")?;
        let hint = reader.array::<4>("element count")?;
        elements.push(NamedElement { offset, hint });
    }
    header.padding = reader.rest().to_vec();
    Ok((header, elements))
}

fn encode_named(header: &HCellData, elements: &[NamedElement], out: &mut Vec<u8>) -> Result<()> {
    check_count(header, elements.len())?;
    let start = header.begin_encode(out)?;
    for element in elements {
        out.write_u32::<LittleEndian>(element.offset)?;
        out.extend_from_slice(&element.hint);
    }
    header.end_encode(out, start)
}

fn check_count(header: &HCellData, actual: usize) -> Result<()> {
    if header.metadata as usize != actual {
        return Err(RegistryError::inconsistent(
            "element count",
            header.metadata as usize,
            actual,
        ));
    }
    Ok(())
}

impl IndexLeaf {
    /// Decodes an index leaf, starting at its size field.
    pub fn decode(data: &[u8]) -> Result<Self> {
        let (header, elements) = decode_offsets(data, INDEX_LEAF_SIGNATURE)?;
        Ok(Self { header, elements })
    }

    /// Encodes the index leaf.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(self.header.cell_size());
        self.encode_into(&mut out)?;
        Ok(out)
    }

    /// Appends the encoded index leaf to `out`.
    pub fn encode_into(&self, out: &mut Vec<u8>) -> Result<()> {
        encode_offsets(&self.header, &self.elements, out)
    }
}

impl FastLeaf {
    /// Decodes a fast leaf, starting at its size field.
    pub fn decode(data: &[u8]) -> Result<Self> {
        let (header, elements) = decode_named(data, FAST_LEAF_SIGNATURE)?;
        Ok(Self { header, elements })
    }

    /// Encodes the fast leaf.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(self.header.cell_size());
        self.encode_into(&mut out)?;
        Ok(out)
    }

    /// Appends the encoded fast leaf to `out`.
    pub fn encode_into(&self, out: &mut Vec<u8>) -> Result<()> {
        encode_named(&self.header, &self.elements, out)
    }

    /// Iterates over the key node offsets.
    pub fn key_offsets(&self) -> impl Iterator<Item = u32> + '_ {
        self.elements.iter().map(|e| e.offset)
    }
}

impl HashLeaf {
    /// Decodes a hash leaf, starting at its size field.
    pub fn decode(data: &[u8]) -> Result<Self> {
        let (header, elements) = decode_named(data, HASH_LEAF_SIGNATURE)?;
        Ok(Self { header, elements })
    }

    /// Encodes the hash leaf.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(self.header.cell_size());
        self.encode_into(&mut out)?;
        Ok(out)
    }

    /// Appends the encoded hash leaf to `out`.
    pub fn encode_into(&self, out: &mut Vec<u8>) -> Result<()> {
        encode_named(&self.header, &self.elements, out)
    }

    /// Iterates over the key node offsets.
    pub fn key_offsets(&self) -> impl Iterator<Item = u32> + '_ {
        self.elements.iter().map(|e| e.offset)
    }
}

impl IndexRoot {
    /// Decodes an index root, starting at its size field.
    pub fn decode(data: &[u8]) -> Result<Self> {
        let (header, elements) = decode_offsets(data, INDEX_ROOT_SIGNATURE)?;
        Ok(Self { header, elements })
    }

    /// Encodes the index root.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(self.header.cell_size());
        self.encode_into(&mut out)?;
        Ok(out)
    }

    /// Appends the encoded index root to `out`.
    pub fn encode_into(&self, out: &mut Vec<u8>) -> Result<()> {
        encode_offsets(&self.header, &self.elements, out)
    }
}
