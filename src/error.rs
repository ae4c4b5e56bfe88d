use thiserror::Error;

/// I/O errors that can occur when reading or patching a slide file
#[derive(Debug, Error)]
pub enum IoError {
    /// Underlying read, seek or write failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Requested range exceeds the file bounds
    #[error("Range out of bounds: requested {requested} bytes at offset {offset}, size is {size}")]
    RangeOutOfBounds {
        offset: u64,
        requested: u64,
        size: u64,
    },
}

/// Errors that can occur when parsing TIFF files
#[derive(Debug, Error)]
pub enum TiffError {
    /// I/O error while reading the file
    #[error("I/O error: {0}")]
    Io(#[from] IoError),

    /// Invalid TIFF magic bytes (not II or MM)
    #[error("Invalid TIFF magic bytes: expected 0x4949 (II) or 0x4D4D (MM), got 0x{0:04X}")]
    InvalidMagic(u16),

    /// Invalid TIFF version number
    #[error("Invalid TIFF version: expected 42 (TIFF) or 43 (BigTIFF), got {0}")]
    InvalidVersion(u16),

    /// Invalid BigTIFF offset byte size (must be 8)
    #[error("Invalid BigTIFF offset byte size: expected 8, got {0}")]
    InvalidBigTiffOffsetSize(u16),

    /// File is too small to contain a valid TIFF header
    #[error("File too small: need at least {required} bytes, got {actual}")]
    FileTooSmall { required: u64, actual: u64 },

    /// IFD offset points outside the file, or the IFD does not fit in it
    #[error("Invalid IFD offset: {0}")]
    InvalidIfdOffset(u64),

    /// An IFD offset was visited twice while walking the chain
    #[error("IFD chain loops back to offset {0}")]
    CyclicChain(u64),

    /// The chain is longer than any slide we are willing to walk
    #[error("IFD chain exceeds {0} directories")]
    TooManyDirectories(usize),

    /// Tag has unexpected type or count
    #[error("Invalid tag value for {tag}: {message}")]
    InvalidTagValue { tag: &'static str, message: String },

    /// Unknown field type in IFD entry
    #[error("Unknown field type: {0}")]
    UnknownFieldType(u16),
}

impl TiffError {
    /// True for failures in the fixed-size header, i.e. "this is not a TIFF at all".
    pub fn is_header_error(&self) -> bool {
        matches!(
            self,
            TiffError::InvalidMagic(_)
                | TiffError::InvalidVersion(_)
                | TiffError::InvalidBigTiffOffsetSize(_)
                | TiffError::FileTooSmall { .. }
        )
    }
}

/// Errors reported by a de-identification run on a single slide.
///
/// Every variant except `Io` is raised while planning, before the first byte
/// of the file is written. An `Io` failure during apply leaves the file in an
/// unspecified, possibly partially redacted state.
#[derive(Debug, Error)]
pub enum DeidError {
    /// Header magic or version is not TIFF/BigTIFF
    #[error("Not a TIFF container: {0}")]
    NotATiffContainer(TiffError),

    /// A next-IFD pointer references an invalid position
    #[error("Truncated IFD chain: {0}")]
    TruncatedChain(TiffError),

    /// Other structural problem with the container (bad tag types etc.)
    #[error("Malformed TIFF: {0}")]
    Malformed(TiffError),

    /// First directory description matches none of the known scanners
    #[error("Unrecognized slide vendor: no known scanner marker in ImageDescription")]
    UnrecognizedVendor,

    /// The identifier delimiter is missing from a description
    #[error("Identifier not found: {delimiter:?} absent from directory {directory} description")]
    IdentifierNotFound {
        directory: usize,
        delimiter: &'static str,
    },

    /// A directory that must be redacted has no ASCII ImageDescription
    #[error("Directory {directory} has no ASCII ImageDescription to redact")]
    DescriptionMissing { directory: usize },

    /// The redacted description would not fit in the stored value
    #[error(
        "Replacement does not fit directory {directory} description: {required} bytes needed, {available} stored"
    )]
    ReplacementTooLong {
        directory: usize,
        required: usize,
        available: usize,
    },

    /// No tiled directory to anchor chain truncation
    #[error("No tiled directory found in IFD chain")]
    NoTiledDirectoryFound,

    /// The first directory is itself a label or macro image
    #[error("First directory is an auxiliary image; refusing to unlink the whole chain")]
    NoPrimaryDirectory,

    /// A payload range recorded in a directory lies outside the file
    #[error("Directory {directory} payload [{offset}, +{length}) lies outside the file")]
    PayloadOutOfBounds {
        directory: usize,
        offset: u64,
        length: u64,
    },

    /// Zeroing an auxiliary payload would clobber bytes a kept directory uses
    #[error("Directory {directory} payload at {offset} overlaps data of a retained directory")]
    PayloadOverlap { directory: usize, offset: u64 },

    /// Post-apply check found identifying data still reachable
    #[error("Verification failed: {reason}")]
    VerificationFailed { reason: String },

    /// Read, seek or write failure against the file
    #[error("I/O error: {0}")]
    Io(#[from] IoError),
}

impl From<TiffError> for DeidError {
    fn from(err: TiffError) -> Self {
        match err {
            TiffError::Io(io) => DeidError::Io(io),
            e if e.is_header_error() => DeidError::NotATiffContainer(e),
            e @ (TiffError::InvalidIfdOffset(_)
            | TiffError::CyclicChain(_)
            | TiffError::TooManyDirectories(_)) => DeidError::TruncatedChain(e),
            e => DeidError::Malformed(e),
        }
    }
}

impl From<std::io::Error> for DeidError {
    fn from(err: std::io::Error) -> Self {
        DeidError::Io(IoError::Io(err))
    }
}
