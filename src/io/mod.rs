//! Byte-level access to slide files.
//!
//! [`RangeReader`] and [`RangeWriter`] are what the parser and patcher are
//! written against; [`SlideFile`] implements them for files on disk and for
//! in-memory buffers.

mod patch;
mod range_reader;

pub use patch::{
    Patch, PatchData, PatchPlan, PatchReason, PatchSummary, PatchWriter, ZERO_CHUNK_SIZE,
};
pub use range_reader::{RangeReader, RangeWriter, SlideFile};
