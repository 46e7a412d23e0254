//! Registry key node (nk) decoding and encoding.

use crate::cell::{HCellData, KeyNodeFlags, HCELL_DATA_SIZE};
use crate::error::{RegistryError, Result};
use crate::utils::{filetime_to_datetime, read_compressed_name, read_utf16_string};
use byteorder::{LittleEndian, WriteBytesExt};

/// Key node signature.
pub const KEY_NODE_SIGNATURE: &[u8; 2] = b"nk";

/// Size of the fixed block following the cell prologue.
pub const KEY_NODE_DATA_SIZE: usize = 72;

/// Offset of the name within an encoded key node.
pub const KEY_NAME_OFFSET: usize = HCELL_DATA_SIZE + KEY_NODE_DATA_SIZE;

/// Key node (nk) structure.
///
/// The prologue's metadata field holds the key flags. Offsets are relative to
/// the start of the bin area and are kept exactly as stored, so `0xFFFFFFFF`
/// ([`crate::cell::NO_CELL`]) survives a round trip.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct KeyNode {
    /// Cell prologue; `metadata` holds the key flags.
    pub header: HCellData,

    /// Last written timestamp (Windows FILETIME).
    pub last_written: u64,

    /// Access bits.
    pub access_bits: u32,

    /// Offset to parent key node.
    pub parent_offset: u32,

    /// Number of subkeys.
    pub subkey_count: u32,

    /// Number of volatile subkeys.
    pub volatile_subkey_count: u32,

    /// Offset to subkey list.
    pub subkey_list_offset: u32,

    /// Offset to volatile subkey list.
    pub volatile_subkey_list_offset: u32,

    /// Number of values.
    pub value_count: u32,

    /// Offset to value list.
    pub value_list_offset: u32,

    /// Offset to security descriptor.
    pub security_offset: u32,

    /// Offset to class name.
    pub class_name_offset: u32,

    /// Maximum length of subkey name.
    pub max_subkey_name_len: u32,

    /// Maximum length of subkey class name.
    pub max_subkey_class_len: u32,

    /// Maximum length of value name.
    pub max_value_name_len: u32,

    /// Maximum length of value data.
    pub max_value_data_len: u32,

    /// Work variable.
    pub work_var: u32,

    /// Length of key name in bytes.
    pub name_length: u16,

    /// Length of class name in bytes.
    pub class_name_length: u16,

    /// Raw key name bytes.
    pub name: Vec<u8>,
}

impl KeyNode {
    /// Decodes a key node, starting at its size field.
    ///
    /// # Errors
    ///
    /// Returns an error if the signature is not `nk` or if the fixed block or
    /// the name does not fit in the declared cell size.
    pub fn decode(data: &[u8]) -> Result<Self> {
        let mut header = HCellData::decode(data, KEY_NODE_SIGNATURE)?;
        let mut reader = header.body(data);

        let last_written = reader.u64("last written timestamp")?;
        let access_bits = reader.u32("access bits")?;
        let parent_offset = reader.u32("parent offset")?;
        let subkey_count = reader.u32("subkey count")?;
        let volatile_subkey_count = reader.u32("volatile subkey count")?;
        let subkey_list_offset = reader.u32("subkey list offset")?;
        let volatile_subkey_list_offset = reader.u32("volatile subkey list offset")?;
        let value_count = reader.u32("value count")?;
        let value_list_offset = reader.u32("value list offset")?;
        let security_offset = reader.u32("security offset")?;
        let class_name_offset = reader.u32("class name offset")?;
        let max_subkey_name_len = reader.u32("largest subkey name length")?;
        let max_subkey_class_len = reader.u32("largest subkey class name length")?;
        let max_value_name_len = reader.u32("largest value name length")?;
        let max_value_data_len = reader.u32("largest value data size")?;
        let work_var = reader.u32("work var")?;
        let name_length = reader.u16("key name length")?;
        let class_name_length = reader.u16("class name length")?;

        let name = reader.bytes(name_length as usize, "key name length")?.to_vec();
        header.padding = reader.rest().to_vec();

        Ok(KeyNode {
            header,
            last_written,
            access_bits,
            parent_offset,
            subkey_count,
            volatile_subkey_count,
            subkey_list_offset,
            volatile_subkey_list_offset,
            value_count,
            value_list_offset,
            security_offset,
            class_name_offset,
            max_subkey_name_len,
            max_subkey_class_len,
            max_value_name_len,
            max_value_data_len,
            work_var,
            name_length,
            class_name_length,
            name,
        })
    }

    /// Encodes the key node.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(self.header.cell_size());
        self.encode_into(&mut out)?;
        Ok(out)
    }

    /// Appends the encoded key node to `out`.
    pub fn encode_into(&self, out: &mut Vec<u8>) -> Result<()> {
        if self.name_length as usize != self.name.len() {
            return Err(RegistryError::inconsistent(
                "key name length",
                self.name_length as usize,
                self.name.len(),
            ));
        }

        let start = self.header.begin_encode(out)?;
        out.write_u64::<LittleEndian>(self.last_written)?;
        for field in [
            self.access_bits,
            self.parent_offset,
            self.subkey_count,
            self.volatile_subkey_count,
            self.subkey_list_offset,
            self.volatile_subkey_list_offset,
            self.value_count,
            self.value_list_offset,
            self.security_offset,
            self.class_name_offset,
            self.max_subkey_name_len,
            self.max_subkey_class_len,
            self.max_value_name_len,
            self.max_value_data_len,
            self.work_var,
        ] {
            out.write_u32::<LittleEndian>(field)?;
        }
        out.write_u16::<LittleEndian>(self.name_length)?;
        out.write_u16::<LittleEndian>(self.class_name_length)?;
        out.extend_from_slice(&self.name);
        self.header.end_encode(out, start)
    }

    /// Key flags, stored in the prologue's metadata field.
    pub fn flags(&self) -> KeyNodeFlags {
        KeyNodeFlags::new(self.header.metadata)
    }

    /// Decodes the raw name for display.
    ///
    /// Compressed names are single-byte; others are UTF-16LE. The stored
    /// bytes are left untouched.
    pub fn decoded_name(&self) -> Result<String> {
        if self.flags().is_compressed() {
            Ok(read_compressed_name(&self.name))
        } else {
            let offset = self.header.position.map(|p| p.offset).unwrap_or_default();
            read_utf16_string(&self.name, offset)
        }
    }

    /// Last written timestamp, truncated to whole seconds.
    pub fn last_written_datetime(&self) -> Option<chrono::DateTime<chrono::Utc>> {
        filetime_to_datetime(self.last_written)
    }

    /// Returns true if this key has subkeys.
    pub fn has_subkeys(&self) -> bool {
        self.subkey_count > 0
    }

    /// Returns true if this key has values.
    pub fn has_values(&self) -> bool {
        self.value_count > 0
    }

    /// Returns true if this is the root key.
    pub fn is_root(&self) -> bool {
        self.flags().is_root()
    }
}
