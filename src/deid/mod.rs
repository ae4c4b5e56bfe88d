//! Slide de-identification.
//!
//! One run over a slide is:
//!
//! 1. parse the IFD chain ([`Container::open`])
//! 2. classify the scanner from the first description
//! 3. plan the description redaction and the chain surgery into one
//!    [`PatchPlan`]
//! 4. apply the plan with a [`PatchWriter`]
//! 5. re-parse the file and [`verify`](verify::verify) the result
//!
//! Steps 1 to 3 never write, so any error they raise leaves the slide
//! byte-for-byte unchanged. Step 4 has no transaction log; callers that need
//! all-or-nothing semantics should run on a copy (see [`crate::staging`]).

pub mod inspect;
pub mod redact;
pub mod unlink;
pub mod verify;

use std::fs::File;
use std::path::Path;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::DeidError;
use crate::format::tiff::Container;
use crate::format::{classify, UnlinkStrategy, VendorProfile};
use crate::io::{PatchPlan, PatchSummary, PatchWriter, RangeReader, RangeWriter, SlideFile};

pub use inspect::{pyramid_digest, summarize, DirectorySummary, SlideSummary};
pub use redact::{find_identifier, plan_redaction, redact, Redaction};
pub use unlink::{plan_unlink, strip, Unlink};
pub use verify::verify;

/// Token written in place of the identifier when none is configured.
pub const DEFAULT_REPLACEMENT: &str = "MDACC";

// =============================================================================
// Options
// =============================================================================

/// Per-run settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeidOptions {
    /// Text substituted for every identifier occurrence
    pub replacement: String,

    /// Plan and report, but write nothing
    pub dry_run: bool,

    /// Re-parse and check the file after applying
    pub verify: bool,

    /// Hash the pyramid payload before and after
    pub digest: bool,
}

impl Default for DeidOptions {
    fn default() -> Self {
        Self {
            replacement: DEFAULT_REPLACEMENT.to_string(),
            dry_run: false,
            verify: true,
            digest: false,
        }
    }
}

impl DeidOptions {
    pub fn with_replacement(mut self, replacement: impl Into<String>) -> Self {
        self.replacement = replacement.into();
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_verify(mut self, verify: bool) -> Self {
        self.verify = verify;
        self
    }

    pub fn with_digest(mut self, digest: bool) -> Self {
        self.digest = digest;
        self
    }
}

// =============================================================================
// Planning
// =============================================================================

/// Everything that will be done to a slide, computed up front.
#[derive(Debug, Clone)]
pub struct DeidPlan {
    pub vendor: VendorProfile,
    pub strategy: UnlinkStrategy,
    pub redaction: Redaction,
    pub unlink: Unlink,
    pub patches: PatchPlan,
}

/// Classify the slide and plan every patch without writing.
///
/// # Errors
/// - `UnrecognizedVendor` if the first directory has no description or it
///   matches no profile
/// - any redaction or unlink planning failure
pub fn plan<R: RangeReader>(
    container: &mut Container<R>,
    replacement: &str,
) -> Result<DeidPlan, DeidError> {
    let vendor = container
        .first_description()
        .map(classify)
        .unwrap_or(VendorProfile::Unrecognized);
    let strategy = vendor
        .unlink_strategy()
        .ok_or(DeidError::UnrecognizedVendor)?;

    debug!(file = container.identifier(), %vendor, "Classified slide");

    let mut patches = PatchPlan::new();
    let redaction = plan_redaction(container, vendor, replacement, &mut patches)?;
    let unlink = plan_unlink(container, strategy, &mut patches)?;

    Ok(DeidPlan {
        vendor,
        strategy,
        redaction,
        unlink,
        patches,
    })
}

// =============================================================================
// Report
// =============================================================================

/// What a run did to one slide. Contains no identifying text.
#[derive(Debug, Clone, Serialize)]
pub struct DeidReport {
    pub file: String,
    pub vendor: VendorProfile,
    pub strategy: UnlinkStrategy,
    pub file_size: u64,
    pub dry_run: bool,

    /// Directories whose description bytes changed
    pub redacted_directories: Vec<usize>,

    /// Identifier occurrences replaced
    pub occurrences: usize,

    /// Directories no longer reachable from the header
    pub removed_directories: Vec<usize>,

    /// Auxiliary payload bytes zero-filled
    pub zeroed_bytes: u64,

    pub planned_patches: usize,
    pub planned_bytes: u64,

    /// Counters from the writer; `None` on a dry run
    pub applied: Option<PatchSummary>,

    pub verified: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub digest_before: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub digest_after: Option<String>,
}

impl DeidReport {
    fn from_plan(container_id: &str, file_size: u64, plan: &DeidPlan, dry_run: bool) -> Self {
        Self {
            file: container_id.to_string(),
            vendor: plan.vendor,
            strategy: plan.strategy,
            file_size,
            dry_run,
            redacted_directories: plan.redaction.changed_directories.clone(),
            occurrences: plan.redaction.occurrences,
            removed_directories: plan.unlink.removed_directories.clone(),
            zeroed_bytes: plan.unlink.zeroed_bytes,
            planned_patches: plan.patches.len(),
            planned_bytes: plan.patches.total_bytes(),
            applied: None,
            verified: false,
            digest_before: None,
            digest_after: None,
        }
    }

    /// Bytes physically changed, 0 for dry runs and already processed slides.
    pub fn bytes_written(&self) -> u64 {
        self.applied.map(|s| s.bytes_written).unwrap_or(0)
    }
}

// =============================================================================
// Entry points
// =============================================================================

/// De-identify a slide held by any writable range handle.
///
/// The handle is consumed because verification re-parses the chain from it.
pub fn deidentify<R: RangeWriter>(
    reader: R,
    options: &DeidOptions,
) -> Result<DeidReport, DeidError> {
    let mut container = Container::open(reader)?;
    let id = container.identifier().to_string();

    let digest_before = if options.digest {
        Some(pyramid_digest(&mut container)?)
    } else {
        None
    };

    let plan = plan(&mut container, &options.replacement)?;
    let mut report = DeidReport::from_plan(&id, container.size(), &plan, options.dry_run);
    report.digest_before = digest_before;

    if options.dry_run {
        info!(
            file = %id,
            vendor = %plan.vendor,
            patches = plan.patches.len(),
            bytes = plan.patches.total_bytes(),
            "Dry run: nothing written"
        );
        return Ok(report);
    }

    let mut writer = PatchWriter::new(container.reader_mut());
    writer.apply(&plan.patches)?;
    let summary = writer.finish()?;
    report.applied = Some(summary);

    if summary.bytes_written == 0 {
        debug!(file = %id, "Slide was already de-identified");
    }

    let mut reparsed = Container::open(container.into_reader())?;

    if options.verify {
        verify(
            &reparsed,
            plan.vendor,
            &plan.redaction.identifier,
            &options.replacement,
        )?;
        report.verified = true;
    }

    if let Some(before) = &report.digest_before {
        let after = pyramid_digest(&mut reparsed)?;
        if *before != after {
            warn!(file = %id, "Pyramid payload changed during de-identification");
            return Err(DeidError::VerificationFailed {
                reason: "pyramid digest changed".to_string(),
            });
        }
        report.digest_after = Some(after);
    }

    info!(
        file = %id,
        vendor = %plan.vendor,
        redacted = ?report.redacted_directories,
        removed = ?report.removed_directories,
        bytes_written = summary.bytes_written,
        "De-identified slide"
    );

    Ok(report)
}

/// De-identify the slide at `path` in place.
pub fn deidentify_path(
    path: impl AsRef<Path>,
    options: &DeidOptions,
) -> Result<DeidReport, DeidError> {
    let path = path.as_ref();
    let file: SlideFile<File> = if options.dry_run {
        SlideFile::open_read_only(path)?
    } else {
        SlideFile::open(path)?
    };
    deidentify(file, options)
}

/// Parse and summarize the slide at `path` without opening it for writing.
pub fn inspect_path(
    path: impl AsRef<Path>,
    digest: bool,
) -> Result<(SlideSummary, Option<String>), DeidError> {
    let mut container = Container::open_path_read_only(path)?;
    let summary = summarize(&container);
    let digest = if digest {
        Some(pyramid_digest(&mut container)?)
    } else {
        None
    };
    Ok((summary, digest))
}
