//! Fixed-offset, fixed-length overwrites.
//!
//! Every edit made to a slide goes through [`PatchWriter`]. A patch replaces
//! bytes that already exist in the file; nothing is inserted, removed or
//! appended, so the file length is invariant.
//!
//! Patches are collected into a [`PatchPlan`] before anything is written.
//! Applying a plan is a sequence of independent writes with no transaction
//! log: if a write fails halfway through, earlier patches stay committed and
//! the file must be treated as possibly corrupt.

use serde::Serialize;
use tracing::debug;

use crate::error::IoError;

use super::range_reader::RangeWriter;

/// Size of the buffer used when zeroing large payloads.
pub const ZERO_CHUNK_SIZE: usize = 64 * 1024;

// =============================================================================
// Patch Plan
// =============================================================================

/// Why a patch exists. Carried through to reports and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PatchReason {
    /// Rewrite of a directory's ImageDescription value
    RedactDescription { directory: usize },

    /// Zero fill of a strip or tile belonging to an unlinked directory
    ZeroPayload { directory: usize },

    /// Zeroing of a directory's next-IFD pointer
    TerminateChain { directory: usize },
}

/// Content written by a patch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatchData {
    /// Literal replacement bytes
    Bytes(Vec<u8>),

    /// A run of zero bytes of the given length
    Zeros(u64),
}

/// A single overwrite of already-allocated bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Patch {
    pub offset: u64,
    pub data: PatchData,
    pub reason: PatchReason,
}

impl Patch {
    /// Number of bytes covered by this patch.
    pub fn len(&self) -> u64 {
        match &self.data {
            PatchData::Bytes(b) => b.len() as u64,
            PatchData::Zeros(n) => *n,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Ordered list of patches for one slide.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PatchPlan {
    patches: Vec<Patch>,
}

impl PatchPlan {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a literal overwrite.
    pub fn overwrite(&mut self, offset: u64, bytes: Vec<u8>, reason: PatchReason) {
        self.patches.push(Patch {
            offset,
            data: PatchData::Bytes(bytes),
            reason,
        });
    }

    /// Queue a zero fill. Empty ranges are dropped.
    pub fn zero(&mut self, offset: u64, len: u64, reason: PatchReason) {
        if len == 0 {
            return;
        }
        self.patches.push(Patch {
            offset,
            data: PatchData::Zeros(len),
            reason,
        });
    }

    pub fn patches(&self) -> &[Patch] {
        &self.patches
    }

    pub fn len(&self) -> usize {
        self.patches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patches.is_empty()
    }

    /// Total number of bytes covered by the plan.
    pub fn total_bytes(&self) -> u64 {
        self.patches.iter().map(Patch::len).sum()
    }
}

// =============================================================================
// Patch Writer
// =============================================================================

/// Counters describing what an applied plan actually changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PatchSummary {
    /// Patches that wrote at least one chunk
    pub patches_written: usize,

    /// Patches whose target bytes already held the desired content
    pub patches_unchanged: usize,

    /// Bytes physically rewritten
    pub bytes_written: u64,
}

/// Seek-and-overwrite primitive shared by the redactor and the unlinker.
///
/// Existing bytes are read before each write and the write is skipped when
/// they already match, so re-running a plan on a processed file reports zero
/// bytes written.
pub struct PatchWriter<'a, W: RangeWriter> {
    target: &'a mut W,
    summary: PatchSummary,
}

impl<'a, W: RangeWriter> PatchWriter<'a, W> {
    pub fn new(target: &'a mut W) -> Self {
        Self {
            target,
            summary: PatchSummary::default(),
        }
    }

    /// Overwrite `bytes` at `offset`. Returns whether anything was written.
    pub fn overwrite(&mut self, offset: u64, bytes: &[u8]) -> Result<bool, IoError> {
        let current = self.target.read_exact_at(offset, bytes.len())?;
        if current[..] == *bytes {
            return Ok(false);
        }
        self.target.write_all_at(offset, bytes)?;
        self.summary.bytes_written += bytes.len() as u64;
        Ok(true)
    }

    /// Fill `[offset, offset + len)` with zeros, one chunk at a time.
    pub fn zero_range(&mut self, offset: u64, len: u64) -> Result<bool, IoError> {
        let zeros = vec![0u8; ZERO_CHUNK_SIZE];
        let mut written = false;
        let mut position = offset;
        let end = offset.checked_add(len).ok_or(IoError::RangeOutOfBounds {
            offset,
            requested: len,
            size: self.target.size(),
        })?;

        while position < end {
            let chunk = (end - position).min(ZERO_CHUNK_SIZE as u64) as usize;
            written |= self.overwrite(position, &zeros[..chunk])?;
            position += chunk as u64;
        }

        Ok(written)
    }

    /// Apply one patch.
    pub fn apply_patch(&mut self, patch: &Patch) -> Result<(), IoError> {
        let written = match &patch.data {
            PatchData::Bytes(bytes) => self.overwrite(patch.offset, bytes)?,
            PatchData::Zeros(len) => self.zero_range(patch.offset, *len)?,
        };

        debug!(
            offset = patch.offset,
            len = patch.len(),
            reason = ?patch.reason,
            written,
            "Applied patch"
        );

        if written {
            self.summary.patches_written += 1;
        } else {
            self.summary.patches_unchanged += 1;
        }
        Ok(())
    }

    /// Apply every patch of a plan in order. Stops at the first failure.
    pub fn apply(&mut self, plan: &PatchPlan) -> Result<(), IoError> {
        for patch in plan.patches() {
            self.apply_patch(patch)?;
        }
        Ok(())
    }

    /// Flush the target and return the counters.
    pub fn finish(self) -> Result<PatchSummary, IoError> {
        self.target.flush()?;
        Ok(self.summary)
    }
}
