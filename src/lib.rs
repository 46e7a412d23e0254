//! # Windows Registry Hive Codec
//!
//! Byte-exact decoding and encoding of the Windows registry hive (regf)
//! binary format.
//!
//! Every structure decodes from a byte slice into an owned, typed value and
//! encodes back to the identical bytes, reserved fields, padding and free
//! space included. Nothing is normalized, so a decoded hive can be inspected
//! and written out again unchanged.
//!
//! ## Architecture
//!
//! The codec is built on several layers:
//!
//! 1. **Base Block (Header)**: Contains hive metadata and root key offset
//! 2. **Hive Bins (hbin)**: 4KB-aligned blocks containing cells
//! 3. **Cells**: Variable-sized structures sharing an 8-byte prologue
//! 4. **Key Nodes (nk)** and **Key Values (vk)**: keys and their values
//! 5. **Subkey Lists (lf/lh/li/ri)**: subkey organization
//! 6. **Security (sk)** and **Big Data (db)**: shared descriptors and segmented payloads
//! 7. **Data Records**: raw payloads, free space and unknown cells
//!
//! ## Binary Layout
//!
//! Registry hives follow this structure:
//!
//! ```text
//! [Base Block - 4KB]
//!   - Signature: "regf"
//!   - Version, timestamps, root offset
//!   - Checksum
//!
//! [Hive Bins - variable size, 4KB aligned]
//!   [Hbin Header - 32 bytes]
//!     - Signature: "hbin"
//!     - Offset, size
//!
//!   [Cells - variable size]
//!     [Cell Size - 4 bytes, negative if allocated]
//!     [Signature - 2 bytes] [Metadata - 2 bytes]
//!     [Cell Data]
//!
//! [Remnant - anything after the declared bin area]
//! ```
//!
//! ## Examples
//!
//! ```no_run
//! use regf_codec::{Cell, Hive, ReadOptions, WriteOptions};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let hive = Hive::open("SYSTEM", ReadOptions::all())?;
//!
//! if let Some(Cell::KeyNode(root)) = hive.root_cell() {
//!     println!("Root key: {}", root.decoded_name()?);
//! }
//!
//! // Write it back unchanged
//! let bytes = hive.to_bytes(&WriteOptions::all())?;
//! assert_eq!(bytes, std::fs::read("SYSTEM")?);
//! # Ok(())
//! # }
//! ```
//!
//! Single structures can be decoded without a surrounding hive:
//!
//! ```
//! use regf_codec::{Block, Cell};
//!
//! let data = [0x10, 0, 0, 0, b'd', b'b', 0x02, 0, 0x09, 0, 0, 0, 0, 0, 0, 0];
//! let block = Block::decode(&data).unwrap();
//! assert!(matches!(block, Block::Cell(Cell::BigData(_))));
//! assert_eq!(block.encode().unwrap(), data);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod bigdata;
pub mod block;
pub mod cell;
pub mod error;
pub mod hbin;
pub mod header;
pub mod hive;
pub mod key;
pub mod record;
pub mod security;
pub mod subkey_list;
pub mod utils;
pub mod value;

// Re-export main types for convenience
pub use bigdata::BigData;
pub use block::Block;
pub use cell::{Cell, CellPosition, CellType, HCellData, KeyNodeFlags, ValueType};
pub use error::{ErrorKind, RegistryError, Result};
pub use hbin::{HBin, HBinData, HbinHeader};
pub use header::BaseBlock;
pub use hive::{BinMode, Hive, ReadOptions, WriteOptions};
pub use key::KeyNode;
pub use record::DataRecord;
pub use security::KeySecurity;
pub use subkey_list::{FastLeaf, HashLeaf, IndexLeaf, IndexRoot, NamedElement};
pub use value::KeyValue;

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
