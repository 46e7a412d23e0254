//! Top-level dispatch between the three kinds of hive structure.
//!
//! A buffer starting with `regf` is a base block, one starting with `hbin`
//! is a bin, and anything else is taken to be a single cell.

use crate::cell::Cell;
use crate::error::Result;
use crate::hbin::{HBin, HBIN_SIGNATURE};
use crate::header::{BaseBlock, REGF_SIGNATURE};
use crate::utils::ensure_aligned;
use std::fmt;

/// A decoded hive structure of any kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Block {
    /// Base block (`regf`).
    BaseBlock(Box<BaseBlock>),
    /// Hive bin (`hbin`).
    HBin(HBin),
    /// Single cell.
    Cell(Cell),
}

impl Block {
    /// Decodes `data`, choosing the structure from its leading bytes.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::ErrorKind::MalformedInput`] for an empty or
    /// misaligned buffer, otherwise whatever the chosen decoder reports.
    pub fn decode(data: &[u8]) -> Result<Self> {
        ensure_aligned(data)?;

        match &data[..4] {
            sig if sig == REGF_SIGNATURE => {
                BaseBlock::decode(data).map(|block| Block::BaseBlock(Box::new(block)))
            }
            sig if sig == HBIN_SIGNATURE => HBin::decode(data).map(Block::HBin),
            _ => Cell::decode(data).map(Block::Cell),
        }
    }

    /// Encodes the structure.
    pub fn encode(&self) -> Result<Vec<u8>> {
        match self {
            Block::BaseBlock(block) => block.encode(),
            Block::HBin(bin) => bin.encode(),
            Block::Cell(cell) => cell.encode(),
        }
    }

    /// Encoded length in bytes.
    pub fn size(&self) -> usize {
        match self {
            Block::BaseBlock(_) => crate::header::BASE_BLOCK_SIZE,
            Block::HBin(bin) => bin.size() as usize,
            Block::Cell(cell) => cell.cell_size(),
        }
    }

    /// Short name of the structure kind.
    pub fn signature(&self) -> String {
        match self {
            Block::BaseBlock(block) => block.signature(),
            Block::HBin(bin) => String::from_utf8_lossy(&bin.header.signature).into_owned(),
            Block::Cell(cell) => match cell.cell_type().signature() {
                Some(sig) => String::from_utf8_lossy(sig).into_owned(),
                None => "raw".to_string(),
            },
        }
    }
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Block::BaseBlock(block) => write!(f, "{}", block),
            Block::HBin(bin) => write!(
                f,
                "hbin at {:#x}, {} bytes, {} cells",
                bin.header.offset,
                bin.size(),
                bin.cells.len()
            ),
            Block::Cell(cell) => write!(f, "{}", cell),
        }
    }
}
