//! Whole-file hive loading and saving with memory-mapped file support.
//!
//! A hive file is a base block, a bin area whose length the base block
//! declares, and whatever trailing bytes follow it. [`ReadOptions`] selects
//! which of the three are decoded and [`WriteOptions`] which are written back.

use crate::cell::{Cell, CellPosition};
use crate::error::{RegistryError, Result};
use crate::hbin::HBinData;
use crate::header::{BaseBlock, BASE_BLOCK_SIZE};
use crate::utils::{absolute_to_cell_offset, cell_offset_to_absolute, read_u32_le};
use memmap2::Mmap;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument, warn};

/// Offset of the bin area size within the base block.
const HIVE_LENGTH_OFFSET: usize = 0x28;

/// How the bin area is read or written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BinMode {
    /// Decode into bins and cells.
    #[default]
    Structured,
    /// Keep the bytes as they are.
    Raw,
    /// Leave the bin area out.
    Skip,
}

/// Selects what [`Hive::load`] and [`Hive::open`] keep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadOptions {
    /// Decode the base block. When off, the bin area size is read straight
    /// from the raw header bytes.
    pub parse_header: bool,
    /// Treatment of the bin area.
    pub bins: BinMode,
    /// Keep the bytes following the bin area.
    pub parse_remnant: bool,
    /// Keep the opened file and its path, so [`Hive::save`] can write back to it.
    pub keep_file_handle: bool,
}

impl ReadOptions {
    /// Decode everything.
    pub fn all() -> Self {
        Self {
            parse_header: true,
            bins: BinMode::Structured,
            parse_remnant: true,
            keep_file_handle: false,
        }
    }

    /// Decode the base block, keep the bin area as raw bytes.
    pub fn raw() -> Self {
        Self {
            bins: BinMode::Raw,
            ..Self::all()
        }
    }

    /// Same options, also retaining the file handle.
    pub fn with_file_handle(self) -> Self {
        Self {
            keep_file_handle: true,
            ..self
        }
    }
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self::all()
    }
}

/// Selects what [`Hive::to_bytes`] and [`Hive::save`] emit, in file order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteOptions {
    /// Emit the base block.
    pub header: bool,
    /// Source of the bin area.
    pub bins: BinMode,
    /// Emit the trailing bytes.
    pub remnant: bool,
}

impl WriteOptions {
    /// Encode everything from the decoded structures.
    pub fn all() -> Self {
        Self {
            header: true,
            bins: BinMode::Structured,
            remnant: true,
        }
    }

    /// Encode the base block, copy the raw bin area.
    pub fn raw() -> Self {
        Self {
            bins: BinMode::Raw,
            ..Self::all()
        }
    }
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self::all()
    }
}

/// A loaded hive file.
///
/// Only the parts selected by the [`ReadOptions`] are present.
#[derive(Debug)]
pub struct Hive {
    base_block: Option<BaseBlock>,
    bins: Option<HBinData>,
    raw_bins: Option<Vec<u8>>,
    remnant: Option<Vec<u8>>,
    file: Option<File>,
    path: Option<PathBuf>,
}

impl Hive {
    /// Opens a registry hive file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or if loading fails; see
    /// [`Hive::load`].
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use regf_codec::{Hive, ReadOptions};
    ///
    /// let hive = Hive::open("SYSTEM", ReadOptions::all()).unwrap();
    /// ```
    #[instrument(skip(path, options), fields(path = %path.as_ref().display()))]
    pub fn open<P: AsRef<Path>>(path: P, options: ReadOptions) -> Result<Self> {
        info!("Opening registry hive");
        let file = File::open(&path)?;

        let file_size = file.metadata()?.len() as usize;
        if file_size < BASE_BLOCK_SIZE {
            return Err(RegistryError::HiveTooSmall {
                size: file_size,
                minimum: BASE_BLOCK_SIZE,
            });
        }

        // SAFETY: the map is read-only, only lives for the duration of `load`,
        // and every access through it is bounds-checked. Decoded structures
        // own their bytes, so nothing borrows from the map afterwards.
        let mmap = unsafe { Mmap::map(&file)? };
        debug!(size = mmap.len(), "Memory mapped hive file");

        let mut hive = Self::load(&mmap, &options)?;
        if options.keep_file_handle {
            hive.file = Some(file);
            hive.path = Some(path.as_ref().to_path_buf());
        }
        Ok(hive)
    }

    /// Loads a hive from an in-memory image.
    ///
    /// # Errors
    ///
    /// - [`RegistryError::HiveTooSmall`] if `data` cannot hold a base block
    /// - [`RegistryError::OutOfBounds`] if the declared bin area runs past `data`
    /// - any bin or cell decoding error when bins are decoded
    ///
    /// A base block that fails [`BaseBlock::validate`] is only logged.
    #[instrument(skip(data), fields(size = data.len()))]
    pub fn load(data: &[u8], options: &ReadOptions) -> Result<Self> {
        if data.len() < BASE_BLOCK_SIZE {
            return Err(RegistryError::HiveTooSmall {
                size: data.len(),
                minimum: BASE_BLOCK_SIZE,
            });
        }

        let mut hive_length = read_u32_le(data, HIVE_LENGTH_OFFSET)?;
        let base_block = if options.parse_header {
            let block = BaseBlock::decode(data)?;
            if let Err(err) = block.validate() {
                warn!(error = %err, "Base block failed validation");
            }
            hive_length = block.hive_length;
            Some(block)
        } else {
            None
        };

        let bins_end = BASE_BLOCK_SIZE
            .checked_add(hive_length as usize)
            .filter(|&end| end <= data.len())
            .ok_or_else(|| {
                RegistryError::out_of_bounds(
                    "hive bins data size",
                    BASE_BLOCK_SIZE.saturating_add(hive_length as usize),
                    data.len(),
                )
            })?;
        let bin_area = &data[BASE_BLOCK_SIZE..bins_end];
        debug!(hive_length, remnant = data.len() - bins_end, "Located bin area");

        let (bins, raw_bins) = match options.bins {
            BinMode::Structured if bin_area.is_empty() => (Some(HBinData::default()), None),
            BinMode::Structured => (Some(HBinData::decode(bin_area)?), None),
            BinMode::Raw => (None, Some(bin_area.to_vec())),
            BinMode::Skip => (None, None),
        };

        let remnant = options.parse_remnant.then(|| data[bins_end..].to_vec());

        info!(bins = bins.as_ref().map_or(0, HBinData::len), "Hive loaded");
        Ok(Hive {
            base_block,
            bins,
            raw_bins,
            remnant,
            file: None,
            path: None,
        })
    }

    /// Serializes the selected parts, in file order.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NotLoaded`] if a selected part was not read,
    /// or any encoding error from the structures themselves.
    pub fn to_bytes(&self, options: &WriteOptions) -> Result<Vec<u8>> {
        let mut out = Vec::new();

        if options.header {
            self.base_block
                .as_ref()
                .ok_or(RegistryError::NotLoaded("base block"))?
                .encode_into(&mut out)?;
        }

        match options.bins {
            BinMode::Structured => {
                let bins = self.bins.as_ref().ok_or(RegistryError::NotLoaded("bins"))?;
                for bin in &bins.bins {
                    bin.encode_into(&mut out)?;
                }
            }
            BinMode::Raw => {
                let raw = self
                    .raw_bins
                    .as_ref()
                    .ok_or(RegistryError::NotLoaded("raw bins"))?;
                out.extend_from_slice(raw);
            }
            BinMode::Skip => {}
        }

        if options.remnant {
            let remnant = self
                .remnant
                .as_ref()
                .ok_or(RegistryError::NotLoaded("remnant"))?;
            out.extend_from_slice(remnant);
        }

        Ok(out)
    }

    /// Writes the selected parts to `path`, or to the path the hive was
    /// opened from when `path` is `None`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NoPath`] if neither path is available.
    #[instrument(skip(self, options))]
    pub fn save(&self, path: Option<&Path>, options: &WriteOptions) -> Result<()> {
        let path = path
            .or(self.path.as_deref())
            .ok_or(RegistryError::NoPath)?;

        let data = self.to_bytes(options)?;
        let mut file = File::create(path)?;
        file.write_all(&data)?;
        file.flush()?;

        info!(path = %path.display(), size = data.len(), "Hive saved");
        Ok(())
    }

    /// Decoded base block, if read.
    pub fn base_block(&self) -> Option<&BaseBlock> {
        self.base_block.as_ref()
    }

    /// Decoded bins, if read.
    pub fn bins(&self) -> Option<&HBinData> {
        self.bins.as_ref()
    }

    /// Raw bin area, if read.
    pub fn raw_bins(&self) -> Option<&[u8]> {
        self.raw_bins.as_deref()
    }

    /// Bytes following the bin area, if read.
    pub fn remnant(&self) -> Option<&[u8]> {
        self.remnant.as_deref()
    }

    /// Retained file handle.
    pub fn file(&self) -> Option<&File> {
        self.file.as_ref()
    }

    /// Retained file path.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// The root key cell named by the base block.
    pub fn root_cell(&self) -> Option<&Cell> {
        let offset = self.base_block.as_ref()?.root_cell_offset;
        self.bins.as_ref()?.resolve(offset)
    }

    /// Absolute file offset of a decoded cell.
    pub fn file_offset(&self, position: CellPosition) -> Result<u32> {
        let bins = self.bins.as_ref().ok_or(RegistryError::NotLoaded("bins"))?;
        let offset = bins
            .cell_offset(position)
            .ok_or(RegistryError::InvalidOffset {
                offset: position.offset,
                hive_size: bins.total_size(),
            })?;
        cell_offset_to_absolute(offset)
    }

    /// Finds the cell starting at an absolute file offset.
    pub fn cell_at_file_offset(&self, file_offset: u32) -> Result<Option<&Cell>> {
        let bins = self.bins.as_ref().ok_or(RegistryError::NotLoaded("bins"))?;
        let offset = absolute_to_cell_offset(file_offset)?;
        Ok(bins.resolve(offset))
    }
}
