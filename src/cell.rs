//! Registry cell definitions, the shared cell prologue and the signature dispatcher.
//!
//! Every cell starts with an 8-byte prologue: a signed 32-bit size (negative
//! when allocated), a 2-byte signature and a 16-bit metadata field whose
//! meaning depends on the variant. [`Cell::decode`] peeks the signature and
//! hands the bytes to the matching variant decoder; anything unrecognised is
//! kept as a [`DataRecord`].

use crate::bigdata::BigData;
use crate::error::{RegistryError, Result};
use crate::key::KeyNode;
use crate::record::DataRecord;
use crate::security::KeySecurity;
use crate::subkey_list::{FastLeaf, HashLeaf, IndexLeaf, IndexRoot};
use crate::utils::{ensure_aligned, read_i32_le, FieldReader};
use crate::value::KeyValue;
use byteorder::{LittleEndian, WriteBytesExt};
use std::fmt;
use tracing::debug;

/// Length of the signed size field that opens every cell.
pub const HCELL_SIZE_LENGTH: usize = 4;

/// Length of the full cell prologue (size, signature, metadata).
pub const HCELL_DATA_SIZE: usize = 8;

/// Offset value used by the format for "no cell".
pub const NO_CELL: u32 = 0xFFFF_FFFF;

/// Signature-to-variant table used by the dispatcher.
pub const CELL_SIGNATURES: [(&[u8; 2], CellType); 8] = [
    (b"li", CellType::IndexLeaf),
    (b"lf", CellType::FastLeaf),
    (b"lh", CellType::HashLeaf),
    (b"ri", CellType::IndexRoot),
    (b"nk", CellType::KeyNode),
    (b"vk", CellType::KeyValue),
    (b"sk", CellType::KeySecurity),
    (b"db", CellType::BigData),
];

/// Location of a decoded cell: index of its bin in the bin sequence and the
/// byte offset of the cell from the start of that bin (header included).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CellPosition {
    /// Index of the owning bin.
    pub bin: usize,
    /// Offset of the cell from the start of the owning bin.
    pub offset: u32,
}

/// Prologue shared by every structured cell.
///
/// Besides the three wire fields it carries the cell's back-reference and the
/// bytes that follow the variant's data up to the declared size.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct HCellData {
    /// Signed cell size; negative means allocated.
    pub size: i32,

    /// Two-byte cell signature.
    pub signature: [u8; 2],

    /// Variant-specific: element count, name length, flags or reserved.
    pub metadata: u16,

    /// Set when the cell was decoded as part of a bin.
    pub position: Option<CellPosition>,

    /// Bytes between the end of the variant data and the declared size.
    pub padding: Vec<u8>,
}

impl HCellData {
    /// Creates a prologue for a cell being built by hand.
    pub fn new(size: i32, signature: [u8; 2], metadata: u16) -> Self {
        Self {
            size,
            signature,
            metadata,
            position: None,
            padding: Vec::new(),
        }
    }

    /// Decodes the prologue and checks that `data` holds the whole declared cell.
    ///
    /// # Errors
    ///
    /// - `MalformedInput` when fewer than 8 bytes are supplied
    /// - `InvalidSignature` when the signature is not `expected`
    /// - `OutOfBounds` when the declared size exceeds `data` or is smaller than the prologue
    pub fn decode(data: &[u8], expected: &[u8; 2]) -> Result<Self> {
        if data.len() < HCELL_DATA_SIZE {
            return Err(RegistryError::MalformedInput(format!(
                "cell data of {} bytes, expected at least {}",
                data.len(),
                HCELL_DATA_SIZE
            )));
        }

        let mut reader = FieldReader::new(data);
        let size = reader.i32("cell size")?;
        let signature = reader.array::<2>("cell signature")?;
        let metadata = reader.u16("cell metadata")?;

        if &signature != expected {
            return Err(RegistryError::invalid_signature(expected, &signature));
        }

        let header = Self::new(size, signature, metadata);
        header.assert_payload_size(data)?;
        if header.cell_size() < HCELL_DATA_SIZE {
            return Err(RegistryError::out_of_bounds(
                "cell size",
                HCELL_DATA_SIZE,
                header.cell_size(),
            ));
        }
        Ok(header)
    }

    /// Absolute value of the size field: the true length of the cell.
    pub fn cell_size(&self) -> usize {
        self.size.unsigned_abs() as usize
    }

    /// Returns true if the cell is in use.
    pub fn is_allocated(&self) -> bool {
        self.size < 0
    }

    /// Fails unless `data` holds at least the declared cell size.
    pub fn assert_payload_size(&self, data: &[u8]) -> Result<()> {
        if data.len() < self.cell_size() {
            return Err(RegistryError::out_of_bounds(
                "cell size",
                self.cell_size(),
                data.len(),
            ));
        }
        Ok(())
    }

    /// Reader over the declared cell, positioned after the prologue.
    ///
    /// Reads through it can never run past the declared size.
    pub fn body<'a>(&self, data: &'a [u8]) -> FieldReader<'a> {
        let end = self.cell_size().min(data.len());
        FieldReader::at(&data[..end], HCELL_DATA_SIZE)
    }

    /// Writes the prologue and returns the position the cell started at.
    pub fn begin_encode(&self, out: &mut Vec<u8>) -> Result<usize> {
        let start = out.len();
        out.write_i32::<LittleEndian>(self.size)?;
        out.extend_from_slice(&self.signature);
        out.write_u16::<LittleEndian>(self.metadata)?;
        Ok(start)
    }

    /// Appends the padding and checks the cell came out at its declared size.
    pub fn end_encode(&self, out: &mut Vec<u8>, start: usize) -> Result<()> {
        out.extend_from_slice(&self.padding);
        let written = out.len() - start;
        if written != self.cell_size() {
            return Err(RegistryError::inconsistent(
                "cell size",
                self.cell_size(),
                written,
            ));
        }
        Ok(())
    }
}

/// Cell variants, identified by signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CellType {
    /// Key node (nk) - represents a registry key.
    KeyNode,

    /// Key value (vk) - represents a registry value.
    KeyValue,

    /// Security descriptor (sk).
    KeySecurity,

    /// Index leaf (li) - list of subkey offsets.
    IndexLeaf,

    /// Fast leaf (lf) - list of subkeys with name hints.
    FastLeaf,

    /// Hash leaf (lh) - list of subkeys with name hashes.
    HashLeaf,

    /// Index root (ri) - list of subkey list offsets.
    IndexRoot,

    /// Big data (db) - segmented value payload descriptor.
    BigData,

    /// Raw payload, free space or unrecognised signature.
    DataRecord,
}

impl CellType {
    /// Maps a signature to its variant; unknown signatures map to `DataRecord`.
    pub fn from_signature(sig: &[u8]) -> Self {
        CELL_SIGNATURES
            .iter()
            .find(|(known, _)| known.as_slice() == sig)
            .map(|(_, cell_type)| *cell_type)
            .unwrap_or(CellType::DataRecord)
    }

    /// Returns the 2-byte signature for this cell type, if it has one.
    pub fn signature(&self) -> Option<&'static [u8; 2]> {
        CELL_SIGNATURES
            .iter()
            .find(|(_, cell_type)| cell_type == self)
            .map(|(sig, _)| *sig)
    }

    /// Returns true if this cell type represents a subkey list.
    pub fn is_subkey_list(&self) -> bool {
        matches!(
            self,
            CellType::IndexLeaf | CellType::FastLeaf | CellType::HashLeaf | CellType::IndexRoot
        )
    }
}

/// A decoded cell.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Cell {
    /// nk
    KeyNode(KeyNode),
    /// vk
    KeyValue(KeyValue),
    /// sk
    KeySecurity(KeySecurity),
    /// li
    IndexLeaf(IndexLeaf),
    /// lf
    FastLeaf(FastLeaf),
    /// lh
    HashLeaf(HashLeaf),
    /// ri
    IndexRoot(IndexRoot),
    /// db
    BigData(BigData),
    /// Anything else.
    DataRecord(DataRecord),
}

impl Cell {
    /// Decodes one cell, dispatching on its signature.
    ///
    /// `data` must be exactly the cell (or at least its declared size) and a
    /// multiple of 8 bytes long. Allocated cells fail with the variant
    /// decoder's error. A free cell that does not decode as its signature
    /// suggests is kept as a [`DataRecord`] so stale contents survive intact.
    pub fn decode(data: &[u8]) -> Result<Self> {
        ensure_aligned(data)?;

        let size = read_i32_le(data, 0)?;
        let cell_type = CellType::from_signature(&data[HCELL_SIZE_LENGTH..HCELL_SIZE_LENGTH + 2]);

        match Self::decode_as(cell_type, data) {
            Err(err) if size > 0 && cell_type != CellType::DataRecord => {
                debug!(?cell_type, size, error = %err, "Free cell kept as raw data record");
                DataRecord::decode(data).map(Cell::DataRecord)
            }
            result => result,
        }
    }

    /// Decodes `data` as the given variant without consulting its signature.
    pub fn decode_as(cell_type: CellType, data: &[u8]) -> Result<Self> {
        match cell_type {
            CellType::KeyNode => KeyNode::decode(data).map(Cell::KeyNode),
            CellType::KeyValue => KeyValue::decode(data).map(Cell::KeyValue),
            CellType::KeySecurity => KeySecurity::decode(data).map(Cell::KeySecurity),
            CellType::IndexLeaf => IndexLeaf::decode(data).map(Cell::IndexLeaf),
            CellType::FastLeaf => FastLeaf::decode(data).map(Cell::FastLeaf),
            CellType::HashLeaf => HashLeaf::decode(data).map(Cell::HashLeaf),
            CellType::IndexRoot => IndexRoot::decode(data).map(Cell::IndexRoot),
            CellType::BigData => BigData::decode(data).map(Cell::BigData),
            CellType::DataRecord => DataRecord::decode(data).map(Cell::DataRecord),
        }
    }

    /// Encodes the cell.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(self.cell_size());
        self.encode_into(&mut out)?;
        Ok(out)
    }

    /// Appends the encoded cell to `out`.
    pub fn encode_into(&self, out: &mut Vec<u8>) -> Result<()> {
        match self {
            Cell::KeyNode(cell) => cell.encode_into(out),
            Cell::KeyValue(cell) => cell.encode_into(out),
            Cell::KeySecurity(cell) => cell.encode_into(out),
            Cell::IndexLeaf(cell) => cell.encode_into(out),
            Cell::FastLeaf(cell) => cell.encode_into(out),
            Cell::HashLeaf(cell) => cell.encode_into(out),
            Cell::IndexRoot(cell) => cell.encode_into(out),
            Cell::BigData(cell) => cell.encode_into(out),
            Cell::DataRecord(cell) => cell.encode_into(out),
        }
    }

    /// Returns the variant of this cell.
    pub fn cell_type(&self) -> CellType {
        match self {
            Cell::KeyNode(_) => CellType::KeyNode,
            Cell::KeyValue(_) => CellType::KeyValue,
            Cell::KeySecurity(_) => CellType::KeySecurity,
            Cell::IndexLeaf(_) => CellType::IndexLeaf,
            Cell::FastLeaf(_) => CellType::FastLeaf,
            Cell::HashLeaf(_) => CellType::HashLeaf,
            Cell::IndexRoot(_) => CellType::IndexRoot,
            Cell::BigData(_) => CellType::BigData,
            Cell::DataRecord(_) => CellType::DataRecord,
        }
    }

    /// Shared prologue; `None` for data records, which only carry a size.
    pub fn header(&self) -> Option<&HCellData> {
        match self {
            Cell::KeyNode(cell) => Some(&cell.header),
            Cell::KeyValue(cell) => Some(&cell.header),
            Cell::KeySecurity(cell) => Some(&cell.header),
            Cell::IndexLeaf(cell) => Some(&cell.header),
            Cell::FastLeaf(cell) => Some(&cell.header),
            Cell::HashLeaf(cell) => Some(&cell.header),
            Cell::IndexRoot(cell) => Some(&cell.header),
            Cell::BigData(cell) => Some(&cell.header),
            Cell::DataRecord(_) => None,
        }
    }

    /// Raw signed size field.
    pub fn size(&self) -> i32 {
        match self {
            Cell::DataRecord(record) => record.size,
            _ => self.header().map(|h| h.size).unwrap_or_default(),
        }
    }

    /// True length of the cell on disk.
    pub fn cell_size(&self) -> usize {
        self.size().unsigned_abs() as usize
    }

    /// Returns true if the cell is in use.
    pub fn is_allocated(&self) -> bool {
        self.size() < 0
    }

    /// Back-reference to the owning bin, set when decoded as part of a bin.
    pub fn position(&self) -> Option<CellPosition> {
        match self {
            Cell::DataRecord(record) => record.position,
            _ => self.header().and_then(|h| h.position),
        }
    }

    pub(crate) fn set_position(&mut self, position: CellPosition) {
        let slot = match self {
            Cell::KeyNode(cell) => &mut cell.header.position,
            Cell::KeyValue(cell) => &mut cell.header.position,
            Cell::KeySecurity(cell) => &mut cell.header.position,
            Cell::IndexLeaf(cell) => &mut cell.header.position,
            Cell::FastLeaf(cell) => &mut cell.header.position,
            Cell::HashLeaf(cell) => &mut cell.header.position,
            Cell::IndexRoot(cell) => &mut cell.header.position,
            Cell::BigData(cell) => &mut cell.header.position,
            Cell::DataRecord(record) => &mut record.position,
        };
        *slot = Some(position);
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = if self.is_allocated() { "allocated" } else { "free" };
        match self.cell_type().signature() {
            Some(sig) => write!(
                f,
                "{} cell, {} bytes, {}",
                String::from_utf8_lossy(sig),
                self.cell_size(),
                state
            ),
            None => write!(f, "raw cell, {} bytes, {}", self.cell_size(), state),
        }?;
        if let Some(position) = self.position() {
            write!(f, " (bin {}, offset {:#x})", position.bin, position.offset)?;
        }
        Ok(())
    }
}

/// Flags for key nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyNodeFlags(pub u16);

impl KeyNodeFlags {
    /// Key is volatile (not stored on disk).
    pub const VOLATILE: u16 = 0x0001;

    /// Key is a mount point for another hive.
    pub const HIVE_EXIT: u16 = 0x0002;

    /// Key is the root key.
    pub const ROOT_KEY: u16 = 0x0004;

    /// Key cannot be deleted.
    pub const NO_DELETE: u16 = 0x0008;

    /// Key is a symbolic link.
    pub const SYM_LINK: u16 = 0x0010;

    /// Key name is in compressed format (ASCII).
    pub const COMP_NAME: u16 = 0x0020;

    /// Key is a predefined handle.
    pub const PREDEF_HANDLE: u16 = 0x0040;

    /// Creates a new KeyNodeFlags from a u16 value.
    pub fn new(flags: u16) -> Self {
        Self(flags)
    }

    /// Returns true if the specified flag is set.
    pub fn has_flag(&self, flag: u16) -> bool {
        (self.0 & flag) != 0
    }

    /// Returns true if the key name is compressed (ASCII).
    pub fn is_compressed(&self) -> bool {
        self.has_flag(Self::COMP_NAME)
    }

    /// Returns true if this is a volatile key.
    pub fn is_volatile(&self) -> bool {
        self.has_flag(Self::VOLATILE)
    }

    /// Returns true if this is the root key.
    pub fn is_root(&self) -> bool {
        self.has_flag(Self::ROOT_KEY)
    }
}

/// Registry value data types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    /// No value type.
    None,

    /// String (null-terminated).
    String,

    /// String with environment variables.
    ExpandString,

    /// Binary data.
    Binary,

    /// 32-bit little-endian integer.
    Dword,

    /// 32-bit big-endian integer.
    DwordBigEndian,

    /// Symbolic link (Unicode).
    Link,

    /// Multiple strings.
    MultiString,

    /// Resource list.
    ResourceList,

    /// Full resource descriptor.
    FullResourceDescriptor,

    /// Resource requirements list.
    ResourceRequirementsList,

    /// 64-bit little-endian integer.
    Qword,

    /// Unknown or non-standard value type.
    Unknown(u32),
}

impl ValueType {
    /// Maps the raw type field to a value type. Unknown codes are kept.
    pub fn from_u32(value: u32) -> Self {
        match value {
            0 => ValueType::None,
            1 => ValueType::String,
            2 => ValueType::ExpandString,
            3 => ValueType::Binary,
            4 => ValueType::Dword,
            5 => ValueType::DwordBigEndian,
            6 => ValueType::Link,
            7 => ValueType::MultiString,
            8 => ValueType::ResourceList,
            9 => ValueType::FullResourceDescriptor,
            10 => ValueType::ResourceRequirementsList,
            11 => ValueType::Qword,
            _ => ValueType::Unknown(value),
        }
    }

    /// Returns the name of this value type.
    pub fn name(&self) -> String {
        match self {
            ValueType::None => "REG_NONE".to_string(),
            ValueType::String => "REG_SZ".to_string(),
            ValueType::ExpandString => "REG_EXPAND_SZ".to_string(),
            ValueType::Binary => "REG_BINARY".to_string(),
            ValueType::Dword => "REG_DWORD".to_string(),
            ValueType::DwordBigEndian => "REG_DWORD_BIG_ENDIAN".to_string(),
            ValueType::Link => "REG_LINK".to_string(),
            ValueType::MultiString => "REG_MULTI_SZ".to_string(),
            ValueType::ResourceList => "REG_RESOURCE_LIST".to_string(),
            ValueType::FullResourceDescriptor => "REG_FULL_RESOURCE_DESCRIPTOR".to_string(),
            ValueType::ResourceRequirementsList => "REG_RESOURCE_REQUIREMENTS_LIST".to_string(),
            ValueType::Qword => "REG_QWORD".to_string(),
            ValueType::Unknown(value) => format!("REG_UNKNOWN_{:#010x}", value),
        }
    }
}
