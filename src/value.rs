//! Registry value (vk) decoding and encoding.
//!
//! A key value never embeds its payload. `data_offset` points at a separate
//! data record or big data cell, except for payloads of at most four bytes,
//! which are stored in the offset field itself. Resolving the payload is left
//! to the caller.

use crate::cell::{HCellData, ValueType};
use crate::error::{RegistryError, Result};
use crate::utils::{read_compressed_name, read_utf16_string};
use byteorder::{LittleEndian, WriteBytesExt};

/// Key value signature.
pub const KEY_VALUE_SIGNATURE: &[u8; 2] = b"vk";

/// Size of the fixed block following the cell prologue.
pub const KEY_VALUE_DATA_SIZE: usize = 16;

/// High bit of the data size: payload is stored inline in the offset field.
pub const DATA_INLINE_FLAG: u32 = 0x8000_0000;

/// Largest payload stored directly in a single data cell; bigger ones go through a db cell.
pub const MAX_DIRECT_DATA_SIZE: u32 = 16344;

/// Value flag: the name is stored in compressed (single-byte) form.
pub const VALUE_COMP_NAME: u16 = 0x0001;

/// Key value (vk) structure.
///
/// The prologue's metadata field is the name length.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct KeyValue {
    /// Cell prologue; `metadata` holds the name length.
    pub header: HCellData,

    /// Raw data size; the high bit marks inline data.
    pub data_size: u32,

    /// Offset to the data cell, or the inline data itself.
    pub data_offset: u32,

    /// Raw value type.
    pub data_type: u32,

    /// Value flags.
    pub flags: u16,

    /// Spare field.
    pub spare: u16,

    /// Raw value name bytes. Empty for the default value.
    pub name: Vec<u8>,
}

impl KeyValue {
    /// Decodes a key value, starting at its size field.
    ///
    /// # Errors
    ///
    /// Returns an error if the signature is not `vk` or if the fixed block or
    /// the name does not fit in the declared cell size.
    pub fn decode(data: &[u8]) -> Result<Self> {
        let mut header = HCellData::decode(data, KEY_VALUE_SIGNATURE)?;
        let mut reader = header.body(data);

        let data_size = reader.u32("data size")?;
        let data_offset = reader.u32("data offset")?;
        let data_type = reader.u32("data type")?;
        let flags = reader.u16("value flags")?;
        let spare = reader.u16("spare")?;

        let name = reader
            .bytes(header.metadata as usize, "value name length")?
            .to_vec();
        header.padding = reader.rest().to_vec();

        Ok(KeyValue {
            header,
            data_size,
            data_offset,
            data_type,
            flags,
            spare,
            name,
        })
    }

    /// Encodes the key value.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(self.header.cell_size());
        self.encode_into(&mut out)?;
        Ok(out)
    }

    /// Appends the encoded key value to `out`.
    pub fn encode_into(&self, out: &mut Vec<u8>) -> Result<()> {
        if self.header.metadata as usize != self.name.len() {
            return Err(RegistryError::inconsistent(
                "value name length",
                self.header.metadata as usize,
                self.name.len(),
            ));
        }

        let start = self.header.begin_encode(out)?;
        out.write_u32::<LittleEndian>(self.data_size)?;
        out.write_u32::<LittleEndian>(self.data_offset)?;
        out.write_u32::<LittleEndian>(self.data_type)?;
        out.write_u16::<LittleEndian>(self.flags)?;
        out.write_u16::<LittleEndian>(self.spare)?;
        out.extend_from_slice(&self.name);
        self.header.end_encode(out, start)
    }

    /// Payload length in bytes, without the inline marker.
    pub fn data_len(&self) -> u32 {
        self.data_size & !DATA_INLINE_FLAG
    }

    /// Returns true if the payload lives in the offset field.
    pub fn is_inline(&self) -> bool {
        self.data_size & DATA_INLINE_FLAG != 0
    }

    /// Inline payload bytes, or `None` when the payload lives in another cell.
    pub fn inline_data(&self) -> Option<Vec<u8>> {
        if !self.is_inline() {
            return None;
        }
        let len = (self.data_len() as usize).min(4);
        Some(self.data_offset.to_le_bytes()[..len].to_vec())
    }

    /// Offset of the cell holding the payload, when there is one.
    pub fn data_cell_offset(&self) -> Option<u32> {
        if self.is_inline() || self.data_len() == 0 {
            None
        } else {
            Some(self.data_offset)
        }
    }

    /// Returns true if the payload is large enough to be stored through a big data cell.
    pub fn uses_big_data(&self) -> bool {
        !self.is_inline() && self.data_len() > MAX_DIRECT_DATA_SIZE
    }

    /// Value type.
    pub fn value_type(&self) -> ValueType {
        ValueType::from_u32(self.data_type)
    }

    /// Returns true for the unnamed default value.
    pub fn is_default(&self) -> bool {
        self.name.is_empty()
    }

    /// Decodes the raw name for display; see [`crate::key::KeyNode::decoded_name`].
    pub fn decoded_name(&self) -> Result<String> {
        if self.flags & VALUE_COMP_NAME != 0 {
            Ok(read_compressed_name(&self.name))
        } else {
            let offset = self.header.position.map(|p| p.offset).unwrap_or_default();
            read_utf16_string(&self.name, offset)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    const RECORD_123: [u8; 27] = [
        0x1b, 0x00, 0x00, 0x00, // size
        0x76, 0x6b, // "vk"
        0x03, 0x00, // name length
        0x00, 0x00, 0x00, 0x00, // data size
        0x00, 0x00, 0x00, 0x00, // data offset
        0x00, 0x00, 0x00, 0x00, // data type
        0x00, 0x00, // flags
        0x00, 0x00, // spare
        0x31, 0x32, 0x33, // "123"
    ];

    #[test]
    fn test_key_value_round_trip() {
        let kv = KeyValue::decode(&RECORD_123).unwrap();
        assert_eq!(kv.header.size, 0x1b);
        assert_eq!(kv.header.metadata, 3);
        assert_eq!(kv.name, b"123");
        assert!(kv.header.padding.is_empty());
        assert_eq!(kv.value_type(), ValueType::None);
        assert_eq!(kv.encode().unwrap(), RECORD_123);
    }

    #[test]
    fn test_key_value_name_out_of_bounds() {
        let mut data = RECORD_123;
        data[6] = 0x10;
        let err = KeyValue::decode(&data).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::OutOfBounds);
        assert!(err.to_string().contains("value name length"));
    }

    #[test]
    fn test_inline_data() {
        let mut data = vec![0xe0, 0xff, 0xff, 0xff, b'v', b'k', 0x00, 0x00];
        data.extend_from_slice(&[0x04, 0x00, 0x00, 0x80]); // 4 bytes, inline
        data.extend_from_slice(&[0x01, 0x02, 0x03, 0x04]);
        data.extend_from_slice(&[0x04, 0x00, 0x00, 0x00]); // REG_DWORD
        data.extend_from_slice(&[0x01, 0x00, 0x00, 0x00]);
        data.extend_from_slice(&[0u8; 8]);

        let kv = KeyValue::decode(&data).unwrap();
        assert!(kv.is_inline());
        assert!(kv.is_default());
        assert_eq!(kv.data_len(), 4);
        assert_eq!(kv.inline_data(), Some(vec![0x01, 0x02, 0x03, 0x04]));
        assert_eq!(kv.data_cell_offset(), None);
        assert_eq!(kv.value_type(), ValueType::Dword);
        assert_eq!(kv.header.padding, vec![0u8; 8]);
        assert_eq!(kv.encode().unwrap(), data);
    }

    #[test]
    fn test_external_data() {
        let mut data = RECORD_123;
        data[8] = 0x20; // data size
        data[12] = 0x58; // data offset
        let kv = KeyValue::decode(&data).unwrap();
        assert!(!kv.is_inline());
        assert_eq!(kv.inline_data(), None);
        assert_eq!(kv.data_cell_offset(), Some(0x58));
        assert!(!kv.uses_big_data());
    }
}
