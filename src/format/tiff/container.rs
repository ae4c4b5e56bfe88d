//! IFD chain traversal.
//!
//! A slide is opened once, its whole directory chain is walked and parsed
//! into an index-addressable list of [`Directory`] values, and the same file
//! handle is then handed to the patch planner and writer. The directory
//! "before" another is simply the one at `index - 1`; no back links are kept.
//!
//! # Directory Kinds
//!
//! Aperio-style SVS files mark auxiliary images with the NewSubfileType tag:
//! - **Label** (value 1): photo of the printed slide label
//! - **Macro** (value 9): overview photo of the whole glass slide
//!
//! Everything else (full-resolution image, pyramid levels, thumbnail) is a
//! primary directory and must survive de-identification untouched.

use std::collections::HashSet;
use std::fs::File;
use std::path::Path;

use serde::Serialize;
use tracing::{debug, warn};

use crate::error::TiffError;
use crate::io::{RangeReader, SlideFile};

use super::ifd::{Ifd, IfdEntry};
use super::parser::{TiffHeader, BIGTIFF_HEADER_SIZE};
use super::tags::{FieldType, TiffTag};
use super::values::ValueReader;

// =============================================================================
// Constants
// =============================================================================

/// Maximum number of IFDs to walk (safety limit; real slides have < 20)
const MAX_DIRECTORIES: usize = 4096;

/// NewSubfileType value of an SVS label image
const SUBFILE_TYPE_LABEL: u64 = 1;

/// NewSubfileType value of an SVS macro image
const SUBFILE_TYPE_MACRO: u64 = 9;

// =============================================================================
// SubImageKind
// =============================================================================

/// Role of a directory inside a slide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SubImageKind {
    /// Pyramid level or thumbnail
    Primary,
    /// Slide label image
    Label,
    /// Slide overview image
    Macro,
}

impl SubImageKind {
    /// Classify from the NewSubfileType value (absent means 0).
    pub fn from_subfile_type(value: Option<u64>) -> Self {
        match value {
            Some(SUBFILE_TYPE_LABEL) => SubImageKind::Label,
            Some(SUBFILE_TYPE_MACRO) => SubImageKind::Macro,
            _ => SubImageKind::Primary,
        }
    }

    /// Label and macro images are the auxiliary ones.
    pub fn is_auxiliary(self) -> bool {
        !matches!(self, SubImageKind::Primary)
    }
}

// =============================================================================
// Directory
// =============================================================================

/// A byte range holding one strip or tile of pixel data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DataRange {
    pub offset: u64,
    pub length: u64,
}

/// One IFD of the chain, with the fields de-identification cares about.
#[derive(Debug, Clone)]
pub struct Directory {
    /// Position in the chain (0 = first IFD)
    pub index: usize,

    /// The parsed IFD
    pub ifd: Ifd,

    /// Raw NewSubfileType value, if the tag is present
    pub subfile_type: Option<u64>,

    /// Classification derived from `subfile_type`
    pub kind: SubImageKind,

    /// Whether TileWidth and TileLength are both present and non-zero
    pub is_tiled: bool,

    pub width: Option<u64>,
    pub height: Option<u64>,

    /// ImageDescription text up to the first NUL, if the tag is ASCII
    pub description: Option<String>,

    /// Tile ranges for tiled directories, strip ranges otherwise
    pub payload: Vec<DataRange>,
}

impl Directory {
    /// File offset of this IFD.
    #[inline]
    pub fn offset(&self) -> u64 {
        self.ifd.offset
    }

    /// Absolute position of this IFD's next-IFD pointer.
    #[inline]
    pub fn next_pointer_position(&self) -> u64 {
        self.ifd.next_pointer_position
    }

    /// The ImageDescription entry, if present.
    pub fn description_entry(&self) -> Option<&IfdEntry> {
        self.ifd.get_entry_by_tag(TiffTag::ImageDescription)
    }

    /// Total size of the pixel payload in bytes.
    pub fn payload_bytes(&self) -> u64 {
        self.payload.iter().map(|r| r.length).sum()
    }
}

// =============================================================================
// Container
// =============================================================================

/// An open TIFF/BigTIFF slide and its parsed directory chain.
#[derive(Debug)]
pub struct Container<R> {
    reader: R,
    header: TiffHeader,
    directories: Vec<Directory>,
}

impl Container<SlideFile<File>> {
    /// Open a slide on disk without write access and parse its chain.
    pub fn open_path_read_only(path: impl AsRef<Path>) -> Result<Self, TiffError> {
        Self::open(SlideFile::open_read_only(path)?)
    }
}

impl<R> Container<R> {
    /// The parsed header.
    pub fn header(&self) -> &TiffHeader {
        &self.header
    }

    /// All directories in chain order.
    pub fn directories(&self) -> &[Directory] {
        &self.directories
    }

    /// Directory at a chain position.
    pub fn directory(&self, index: usize) -> Option<&Directory> {
        self.directories.get(index)
    }

    /// Description of the first directory, which identifies the scanner.
    pub fn first_description(&self) -> Option<&str> {
        self.directories.first()?.description.as_deref()
    }

    /// Mutable access to the held handle, for reads and patches.
    pub fn reader_mut(&mut self) -> &mut R {
        &mut self.reader
    }

    /// Close the container and return the handle.
    pub fn into_reader(self) -> R {
        self.reader
    }
}

impl<R: RangeReader> Container<R> {
    /// Parse the header and walk the full IFD chain.
    ///
    /// # Errors
    /// - Header errors (`InvalidMagic`, `InvalidVersion`, ...) when the file
    ///   is not TIFF/BigTIFF
    /// - `InvalidIfdOffset` when a next-IFD pointer leads outside the file or
    ///   to an IFD that does not fit in it
    /// - `CyclicChain` when the chain revisits an IFD
    pub fn open(mut reader: R) -> Result<Self, TiffError> {
        let size = reader.size();
        let header_len = (BIGTIFF_HEADER_SIZE as u64).min(size) as usize;
        let header_bytes = reader.read_exact_at(0, header_len)?;
        let header = TiffHeader::parse(&header_bytes, size)?;

        let ifds = Self::parse_all_ifds(&mut reader, &header)?;

        let mut directories = Vec::with_capacity(ifds.len());
        for (index, ifd) in ifds.into_iter().enumerate() {
            directories.push(Self::build_directory(&mut reader, &header, index, ifd)?);
        }

        debug!(
            file = reader.identifier(),
            bigtiff = header.is_bigtiff,
            directories = directories.len(),
            "Parsed IFD chain"
        );

        Ok(Container {
            reader,
            header,
            directories,
        })
    }

    /// Follow next-IFD pointers from the header until a zero pointer.
    fn parse_all_ifds(reader: &mut R, header: &TiffHeader) -> Result<Vec<Ifd>, TiffError> {
        let size = reader.size();
        let count_size = header.ifd_count_size() as u64;

        let mut ifds = Vec::new();
        let mut seen = HashSet::new();
        let mut offset = header.first_ifd_offset;

        while offset != 0 {
            if ifds.len() >= MAX_DIRECTORIES {
                return Err(TiffError::TooManyDirectories(MAX_DIRECTORIES));
            }
            if !seen.insert(offset) {
                return Err(TiffError::CyclicChain(offset));
            }
            if offset < header.header_size() as u64
                || offset.checked_add(count_size).map_or(true, |end| end > size)
            {
                return Err(TiffError::InvalidIfdOffset(offset));
            }

            // First, read just enough to get the entry count
            let count_bytes = reader.read_exact_at(offset, count_size as usize)?;
            let entry_count = header.read_entry_count(&count_bytes);

            let ifd_size = Ifd::calculate_size(entry_count, header)
                .filter(|&len| offset.checked_add(len as u64).is_some_and(|end| end <= size))
                .ok_or(TiffError::InvalidIfdOffset(offset))?;

            let ifd_bytes = reader.read_exact_at(offset, ifd_size)?;
            let ifd = Ifd::parse(&ifd_bytes, offset, header)?;

            offset = ifd.next_ifd_offset;
            ifds.push(ifd);
        }

        Ok(ifds)
    }

    /// Resolve the tag values a directory needs for classification and patching.
    fn build_directory(
        reader: &mut R,
        header: &TiffHeader,
        index: usize,
        ifd: Ifd,
    ) -> Result<Directory, TiffError> {
        let byte_order = header.byte_order;
        let mut values = ValueReader::new(reader, header);

        let subfile_type = ifd.get_u64(TiffTag::NewSubfileType, byte_order);
        let tile_width = ifd.get_u64(TiffTag::TileWidth, byte_order).unwrap_or(0);
        let tile_length = ifd.get_u64(TiffTag::TileLength, byte_order).unwrap_or(0);
        let is_tiled = tile_width > 0 && tile_length > 0;

        let description = match ifd.get_entry_by_tag(TiffTag::ImageDescription) {
            Some(entry) if entry.field_type == Some(FieldType::Ascii) => {
                Some(values.read_string(entry)?)
            }
            Some(entry) => {
                warn!(
                    directory = index,
                    field_type = entry.field_type_raw,
                    "ImageDescription is not ASCII; ignoring it"
                );
                None
            }
            None => None,
        };

        let (offsets_tag, counts_tag) = if is_tiled {
            (TiffTag::TileOffsets, TiffTag::TileByteCounts)
        } else {
            (TiffTag::StripOffsets, TiffTag::StripByteCounts)
        };

        let payload = match (
            ifd.get_entry_by_tag(offsets_tag),
            ifd.get_entry_by_tag(counts_tag),
        ) {
            (Some(offsets), Some(counts)) => {
                let offsets = values.read_u64_array(offsets)?;
                let counts = values.read_u64_array(counts)?;
                if offsets.len() != counts.len() {
                    return Err(TiffError::InvalidTagValue {
                        tag: counts_tag.name(),
                        message: format!(
                            "{} offsets but {} byte counts in directory {}",
                            offsets.len(),
                            counts.len(),
                            index
                        ),
                    });
                }
                offsets
                    .into_iter()
                    .zip(counts)
                    .map(|(offset, length)| DataRange { offset, length })
                    .collect()
            }
            _ => Vec::new(),
        };

        Ok(Directory {
            index,
            subfile_type,
            kind: SubImageKind::from_subfile_type(subfile_type),
            is_tiled,
            width: ifd.get_u64(TiffTag::ImageWidth, byte_order),
            height: ifd.get_u64(TiffTag::ImageLength, byte_order),
            description,
            payload,
            ifd,
        })
    }

    /// Total file size in bytes.
    pub fn size(&self) -> u64 {
        self.reader.size()
    }

    /// Identifier of the underlying file.
    pub fn identifier(&self) -> &str {
        self.reader.identifier()
    }
}
