//! # slide-deid
//!
//! In-place de-identification of SVS whole-slide images.
//!
//! Slide scanners embed identifying data in two places: a `Key = Value`
//! field of the TIFF ImageDescription, and the label and macro photographs
//! stored as extra directories at the end of the IFD chain. This library
//! removes both by overwriting bytes that already exist in the file. Nothing
//! is inserted or moved and the file length never changes, so multi-gigabyte
//! slides are processed without being rewritten.
//!
//! ## Architecture
//!
//! - [`io`] - Range reads over a slide file and the fixed-offset [`PatchWriter`]
//! - [`mod@format`] - TIFF/BigTIFF chain parsing, SVS descriptions, vendor detection
//! - [`deid`] - Redaction, chain surgery, verification and inspection
//! - [`batch`] / [`staging`] - Multi-file runs and working copies
//! - [`config`] - CLI types
//!
//! ## Example
//!
//! ```rust,no_run
//! use slide_deid::{deidentify_path, DeidOptions};
//!
//! let report = deidentify_path("slide.svs", &DeidOptions::default())?;
//! println!("{}: {} bytes changed", report.vendor, report.bytes_written());
//! # Ok::<(), slide_deid::DeidError>(())
//! ```

pub mod batch;
pub mod config;
pub mod deid;
pub mod error;
pub mod format;
pub mod io;
pub mod staging;

// Re-export commonly used types
pub use batch::{collect_slides, run_batch, BatchOptions, BatchReport, FileOutcome};
pub use config::{Cli, Command, InspectConfig, OutputFormat, RunConfig};
pub use deid::{
    deidentify, deidentify_path, inspect_path, plan, pyramid_digest, summarize, verify,
    DeidOptions, DeidPlan, DeidReport, SlideSummary, DEFAULT_REPLACEMENT,
};
pub use error::{DeidError, IoError, TiffError};
pub use format::tiff::{
    ByteOrder, Container, DataRange, Directory, FieldType, Ifd, IfdEntry, SubImageKind,
    TiffHeader, TiffTag, BIGTIFF_HEADER_SIZE, TIFF_HEADER_SIZE,
};
pub use format::{classify, is_tiff_header, SvsDescription, UnlinkStrategy, VendorProfile};
pub use io::{
    PatchPlan, PatchReason, PatchSummary, PatchWriter, RangeReader, RangeWriter, SlideFile,
};
pub use staging::stage_copy;
