//! Error types for hive decoding and encoding.
//!
//! Every decode and encode entry point returns [`Result`]. Decoding fails fast:
//! a cell that cannot be decoded aborts its bin, and a bin that cannot be
//! decoded aborts the whole bin sequence.

use std::io;
use thiserror::Error;

/// Result type alias for registry operations.
pub type Result<T> = std::result::Result<T, RegistryError>;

/// Coarse classification of a [`RegistryError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The buffer is empty, misaligned, or shorter than a fixed-size record.
    MalformedInput,
    /// A declared length exceeds the bytes actually available.
    OutOfBounds,
    /// Anything else (I/O, signatures, checksums, encode consistency).
    Other,
}

/// Errors that can occur while decoding or encoding hive structures.
#[derive(Error, Debug)]
pub enum RegistryError {
    /// I/O error occurred while reading or writing a hive file.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The buffer is empty, not a multiple of 8 bytes, or structurally unusable.
    #[error("Malformed input: {0}")]
    MalformedInput(String),

    /// Hive buffer is too small to hold a base block.
    #[error("Hive too small: {size} bytes (minimum: {minimum} bytes)")]
    HiveTooSmall {
        /// Bytes supplied.
        size: usize,
        /// Bytes required.
        minimum: usize,
    },

    /// A declared length does not fit in the supplied buffer.
    #[error("{field} out of bounds: requires {required} bytes, {available} available")]
    OutOfBounds {
        /// Field whose value produced the length.
        field: &'static str,
        /// Length the field demands.
        required: usize,
        /// Length actually available.
        available: usize,
    },

    /// Invalid magic signature in a header or cell.
    #[error("Invalid signature: expected {expected:?}, found {found:?}")]
    InvalidSignature {
        /// Expected signature bytes.
        expected: Vec<u8>,
        /// Signature bytes found.
        found: Vec<u8>,
    },

    /// Checksum mismatch in the base block.
    #[error("Checksum mismatch: expected {expected:#x}, calculated {calculated:#x}")]
    ChecksumMismatch {
        /// Checksum stored in the base block.
        expected: u32,
        /// Checksum computed over the first 508 bytes.
        calculated: u32,
    },

    /// Unsupported hive version.
    #[error("Unsupported hive version: {major}.{minor}")]
    UnsupportedVersion {
        /// Major version.
        major: u32,
        /// Minor version.
        minor: u32,
    },

    /// A length field disagrees with the data it describes, so the value cannot be encoded.
    #[error("Inconsistent {field}: declared {declared}, actual {actual}")]
    InconsistentField {
        /// Field holding the declared length.
        field: &'static str,
        /// Declared length.
        declared: usize,
        /// Length of the data actually held.
        actual: usize,
    },

    /// Cell offset is out of range.
    #[error("Invalid cell offset: {offset:#x} (hive size: {hive_size:#x})")]
    InvalidOffset {
        /// The offending offset.
        offset: u32,
        /// Size of the addressed area, 0 when unknown.
        hive_size: usize,
    },

    /// Invalid UTF-16 name data.
    #[error("Invalid UTF-16 string at offset {offset:#x}")]
    InvalidUtf16 {
        /// Offset of the cell holding the name.
        offset: u32,
    },

    /// A part of the hive selected for writing was never loaded.
    #[error("Hive part not loaded: {0}")]
    NotLoaded(&'static str),

    /// `save` was called without a path on a hive that was not opened from a file.
    #[error("No output path given and the hive has no retained file path")]
    NoPath,
}

impl RegistryError {
    /// Creates an invalid signature error with context.
    ///
    /// # Arguments
    ///
    /// * `expected` - Expected signature bytes
    /// * `found` - Actual signature bytes found
    pub fn invalid_signature(expected: &[u8], found: &[u8]) -> Self {
        Self::InvalidSignature {
            expected: expected.to_vec(),
            found: found.to_vec(),
        }
    }

    /// Creates an out-of-bounds error for `field`.
    pub fn out_of_bounds(field: &'static str, required: usize, available: usize) -> Self {
        Self::OutOfBounds {
            field,
            required,
            available,
        }
    }

    /// Creates an error for a buffer that is empty or not a multiple of 8 bytes.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use regf_codec::error::{ErrorKind, RegistryError};
    /// let err = RegistryError::misaligned(20);
    /// assert_eq!(err.kind(), ErrorKind::MalformedInput);
    /// ```
    pub fn misaligned(len: usize) -> Self {
        Self::MalformedInput(format!(
            "block data is empty or not 8-byte aligned ({} bytes)",
            len
        ))
    }

    /// Creates an inconsistent-field error raised while encoding.
    pub fn inconsistent(field: &'static str, declared: usize, actual: usize) -> Self {
        Self::InconsistentField {
            field,
            declared,
            actual,
        }
    }

    /// Returns the coarse kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MalformedInput(_) | Self::HiveTooSmall { .. } => ErrorKind::MalformedInput,
            Self::OutOfBounds { .. } => ErrorKind::OutOfBounds,
            _ => ErrorKind::Other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_out_of_bounds_message() {
        let err = RegistryError::out_of_bounds("key name length", 120, 92);
        assert_eq!(
            err.to_string(),
            "key name length out of bounds: requires 120 bytes, 92 available"
        );
        assert_eq!(err.kind(), ErrorKind::OutOfBounds);
    }

    #[test]
    fn test_kinds() {
        assert_eq!(
            RegistryError::HiveTooSmall { size: 1, minimum: 4096 }.kind(),
            ErrorKind::MalformedInput
        );
        assert_eq!(RegistryError::NoPath.kind(), ErrorKind::Other);
        assert_eq!(
            RegistryError::inconsistent("name length", 3, 4).kind(),
            ErrorKind::Other
        );
    }
}
