//! Registry hive base block (header) decoding and encoding.
//!
//! The base block is the first 4096 bytes (0x1000) of a registry hive file.
//! It contains metadata about the hive including version, timestamps, and
//! the root key cell offset. Every byte of it is kept, reserved areas
//! included, so that encoding reproduces the original block exactly.

use crate::error::{RegistryError, Result};
use crate::utils::{calculate_checksum, filetime_to_datetime, read_utf16_string, FieldReader};
use byteorder::{LittleEndian, WriteBytesExt};
use chrono::{DateTime, Utc};
use std::fmt;

/// Size of the base block in bytes.
pub const BASE_BLOCK_SIZE: usize = 4096;

/// Expected signature for a valid registry hive ("regf").
pub const REGF_SIGNATURE: &[u8; 4] = b"regf";

/// Offset of the file name in the base block.
const FILE_NAME_OFFSET: u32 = 0x30;

/// Minor versions accepted by [`BaseBlock::validate`] (major is always 1).
pub const SUPPORTED_MINOR_VERSIONS: std::ops::RangeInclusive<u32> = 3..=6;

/// Registry hive base block header.
///
/// Format (all integers little-endian):
/// ```text
/// Offset  Size  Description
/// 0x000   4     Signature ("regf")
/// 0x004   4     Primary sequence number
/// 0x008   4     Secondary sequence number
/// 0x00C   8     Last written timestamp (FILETIME)
/// 0x014   4     Major version
/// 0x018   4     Minor version
/// 0x01C   4     File type
/// 0x020   4     File format
/// 0x024   4     Root cell offset
/// 0x028   4     Hive bins data size
/// 0x02C   4     Clustering factor
/// 0x030   64    File name
/// 0x070   16    RmId
/// 0x080   16    LogId
/// 0x090   4     Flags
/// 0x094   16    TmId
/// 0x0A4   4     GUID signature
/// 0x0A8   8     Last reorganized timestamp
/// 0x0B0   332   Reserved
/// 0x1FC   4     Checksum
/// 0x200   3528  Reserved
/// 0xFC8   16    ThawTmId
/// 0xFD8   16    ThawRmId
/// 0xFE8   16    ThawLogId
/// 0xFF8   4     Boot type
/// 0xFFC   4     Boot recover
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BaseBlock {
    /// Signature, should be "regf" (0x66676572).
    pub signature: [u8; 4],

    /// Primary sequence number.
    pub primary_sequence: u32,

    /// Secondary sequence number.
    pub secondary_sequence: u32,

    /// Last written timestamp (Windows FILETIME).
    pub last_written: u64,

    /// Major version of the hive format.
    pub major_version: u32,

    /// Minor version of the hive format.
    pub minor_version: u32,

    /// File type (0 = normal, 1 = transaction log).
    pub file_type: u32,

    /// File format (1 = direct memory load).
    pub file_format: u32,

    /// Offset to root key cell (relative to first hbin).
    pub root_cell_offset: u32,

    /// Length of hive bins data in bytes.
    pub hive_length: u32,

    /// Clustering factor (always 1).
    pub clustering_factor: u32,

    /// Raw embedded file name (UTF-16LE, often truncated).
    pub file_name: [u8; 64],

    /// Resource manager GUID.
    pub rm_id: [u8; 16],

    /// Log GUID.
    pub log_id: [u8; 16],

    /// Hive flags.
    pub flags: u32,

    /// Transaction manager GUID.
    pub tm_id: [u8; 16],

    /// GUID signature ("OfRg" when the GUIDs are valid).
    pub guid_signature: u32,

    /// Last reorganized timestamp (Windows FILETIME).
    pub last_reorganized: u64,

    /// Reserved area before the checksum.
    pub reserved1: [u8; 332],

    /// Checksum (XOR of first 508 bytes).
    pub checksum: u32,

    /// Reserved area after the checksum.
    pub reserved2: Vec<u8>,

    /// Thaw transaction manager GUID.
    pub thaw_tm_id: [u8; 16],

    /// Thaw resource manager GUID.
    pub thaw_rm_id: [u8; 16],

    /// Thaw log GUID.
    pub thaw_log_id: [u8; 16],

    /// Boot type.
    pub boot_type: u32,

    /// Boot recover.
    pub boot_recover: u32,
}

/// Length of the second reserved area.
const RESERVED2_SIZE: usize = 3528;

impl BaseBlock {
    /// Decodes a base block from the first 4096 bytes of `data`.
    ///
    /// No field is validated here; see [`BaseBlock::validate`].
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::HiveTooSmall`] if fewer than 4096 bytes are supplied.
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < BASE_BLOCK_SIZE {
            return Err(RegistryError::HiveTooSmall {
                size: data.len(),
                minimum: BASE_BLOCK_SIZE,
            });
        }

        let mut reader = FieldReader::new(&data[..BASE_BLOCK_SIZE]);
        Ok(BaseBlock {
            signature: reader.array("regf signature")?,
            primary_sequence: reader.u32("primary sequence")?,
            secondary_sequence: reader.u32("secondary sequence")?,
            last_written: reader.u64("last written timestamp")?,
            major_version: reader.u32("major version")?,
            minor_version: reader.u32("minor version")?,
            file_type: reader.u32("file type")?,
            file_format: reader.u32("file format")?,
            root_cell_offset: reader.u32("root cell offset")?,
            hive_length: reader.u32("hive bins data size")?,
            clustering_factor: reader.u32("clustering factor")?,
            file_name: reader.array("file name")?,
            rm_id: reader.array("rm id")?,
            log_id: reader.array("log id")?,
            flags: reader.u32("flags")?,
            tm_id: reader.array("tm id")?,
            guid_signature: reader.u32("guid signature")?,
            last_reorganized: reader.u64("last reorganized timestamp")?,
            reserved1: reader.array("reserved")?,
            checksum: reader.u32("checksum")?,
            reserved2: reader.bytes(RESERVED2_SIZE, "reserved")?.to_vec(),
            thaw_tm_id: reader.array("thaw tm id")?,
            thaw_rm_id: reader.array("thaw rm id")?,
            thaw_log_id: reader.array("thaw log id")?,
            boot_type: reader.u32("boot type")?,
            boot_recover: reader.u32("boot recover")?,
        })
    }

    /// Encodes the base block into exactly 4096 bytes.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(BASE_BLOCK_SIZE);
        self.encode_into(&mut out)?;
        Ok(out)
    }

    /// Appends the encoded base block to `out`.
    pub fn encode_into(&self, out: &mut Vec<u8>) -> Result<()> {
        if self.reserved2.len() != RESERVED2_SIZE {
            return Err(RegistryError::inconsistent(
                "reserved area",
                RESERVED2_SIZE,
                self.reserved2.len(),
            ));
        }

        out.extend_from_slice(&self.signature);
        out.write_u32::<LittleEndian>(self.primary_sequence)?;
        out.write_u32::<LittleEndian>(self.secondary_sequence)?;
        out.write_u64::<LittleEndian>(self.last_written)?;
        out.write_u32::<LittleEndian>(self.major_version)?;
        out.write_u32::<LittleEndian>(self.minor_version)?;
        out.write_u32::<LittleEndian>(self.file_type)?;
        out.write_u32::<LittleEndian>(self.file_format)?;
        out.write_u32::<LittleEndian>(self.root_cell_offset)?;
        out.write_u32::<LittleEndian>(self.hive_length)?;
        out.write_u32::<LittleEndian>(self.clustering_factor)?;
        out.extend_from_slice(&self.file_name);
        out.extend_from_slice(&self.rm_id);
        out.extend_from_slice(&self.log_id);
        out.write_u32::<LittleEndian>(self.flags)?;
        out.extend_from_slice(&self.tm_id);
        out.write_u32::<LittleEndian>(self.guid_signature)?;
        out.write_u64::<LittleEndian>(self.last_reorganized)?;
        out.extend_from_slice(&self.reserved1);
        out.write_u32::<LittleEndian>(self.checksum)?;
        out.extend_from_slice(&self.reserved2);
        out.extend_from_slice(&self.thaw_tm_id);
        out.extend_from_slice(&self.thaw_rm_id);
        out.extend_from_slice(&self.thaw_log_id);
        out.write_u32::<LittleEndian>(self.boot_type)?;
        out.write_u32::<LittleEndian>(self.boot_recover)?;
        Ok(())
    }

    /// Checksum the stored fields should carry.
    pub fn compute_checksum(&self) -> Result<u32> {
        Ok(calculate_checksum(&self.encode()?))
    }

    /// Checks the signature, checksum and format version.
    ///
    /// # Errors
    ///
    /// Returns the first problem found:
    /// - [`RegistryError::InvalidSignature`] if the block does not start with `regf`
    /// - [`RegistryError::ChecksumMismatch`] if the stored checksum is wrong
    /// - [`RegistryError::UnsupportedVersion`] outside versions 1.3 to 1.6
    pub fn validate(&self) -> Result<()> {
        if &self.signature != REGF_SIGNATURE {
            return Err(RegistryError::invalid_signature(REGF_SIGNATURE, &self.signature));
        }

        let calculated = self.compute_checksum()?;
        if self.checksum != calculated {
            return Err(RegistryError::ChecksumMismatch {
                expected: self.checksum,
                calculated,
            });
        }

        if self.major_version != 1 || !SUPPORTED_MINOR_VERSIONS.contains(&self.minor_version) {
            return Err(RegistryError::UnsupportedVersion {
                major: self.major_version,
                minor: self.minor_version,
            });
        }

        Ok(())
    }

    /// Signature as text.
    pub fn signature(&self) -> String {
        String::from_utf8_lossy(&self.signature).into_owned()
    }

    /// Returns true if the hive is in a consistent state.
    ///
    /// The hive is consistent when primary and secondary sequence numbers match.
    pub fn is_consistent(&self) -> bool {
        self.primary_sequence == self.secondary_sequence
    }

    /// Embedded file name, decoded for display.
    pub fn decoded_file_name(&self) -> Result<String> {
        read_utf16_string(&self.file_name, FILE_NAME_OFFSET)
    }

    /// Last written timestamp as UTC, truncated to whole seconds.
    pub fn last_written_datetime(&self) -> Option<DateTime<Utc>> {
        filetime_to_datetime(self.last_written)
    }

    /// Last reorganized timestamp as UTC, truncated to whole seconds.
    pub fn last_reorganized_datetime(&self) -> Option<DateTime<Utc>> {
        filetime_to_datetime(self.last_reorganized)
    }
}

impl Default for BaseBlock {
    fn default() -> Self {
        BaseBlock {
            signature: *REGF_SIGNATURE,
            primary_sequence: 0,
            secondary_sequence: 0,
            last_written: 0,
            major_version: 0,
            minor_version: 0,
            file_type: 0,
            file_format: 0,
            root_cell_offset: 0,
            hive_length: 0,
            clustering_factor: 0,
            file_name: [0; 64],
            rm_id: [0; 16],
            log_id: [0; 16],
            flags: 0,
            tm_id: [0; 16],
            guid_signature: 0,
            last_reorganized: 0,
            reserved1: [0; 332],
            checksum: 0,
            reserved2: vec![0; RESERVED2_SIZE],
            thaw_tm_id: [0; 16],
            thaw_rm_id: [0; 16],
            thaw_log_id: [0; 16],
            boot_type: 0,
            boot_recover: 0,
        }
    }
}

impl fmt::Display for BaseBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Registry Hive Header:\n\
             - Signature: {}\n\
             - Version: {}.{}\n\
             - Root Cell Offset: {:#x}\n\
             - Hive Length: {} bytes\n\
             - Consistent: {}\n\
             - File Name: {}",
            self.signature(),
            self.major_version,
            self.minor_version,
            self.root_cell_offset,
            self.hive_length,
            self.is_consistent(),
            self.decoded_file_name().unwrap_or_default()
        )
    }
}
