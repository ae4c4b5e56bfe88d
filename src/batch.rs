//! Sequential processing of many slides.
//!
//! Each file is handled on its own: a failure is recorded in the report and
//! the next file is processed. Staged runs validate the source with a dry
//! run first, so a slide that cannot be de-identified never produces a copy;
//! a copy whose processing fails later is deleted.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{info, warn};

use crate::deid::{deidentify_path, DeidOptions, DeidReport};
use crate::error::DeidError;
use crate::staging::stage_copy;

/// Extension picked up when a directory is given.
const SLIDE_EXTENSION: &str = "svs";

/// Expand `path` into the slides to process.
///
/// A file yields itself. A directory yields its `*.svs` entries
/// (case-insensitive), sorted, without recursing.
pub fn collect_slides(path: &Path) -> Result<Vec<PathBuf>, DeidError> {
    if !path.is_dir() {
        if !path.exists() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{} does not exist", path.display()),
            )
            .into());
        }
        return Ok(vec![path.to_path_buf()]);
    }

    let mut slides = Vec::new();
    for entry in fs::read_dir(path)? {
        let entry = entry?;
        let candidate = entry.path();
        let is_slide = candidate
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case(SLIDE_EXTENSION));
        if is_slide && entry.file_type()?.is_file() {
            slides.push(candidate);
        }
    }
    slides.sort();
    Ok(slides)
}

/// Settings for a batch run.
#[derive(Debug, Clone, Default)]
pub struct BatchOptions {
    pub deid: DeidOptions,

    /// Patch the given files directly instead of staged copies
    pub in_place: bool,
}

/// Result for one input file.
#[derive(Debug, Serialize)]
pub struct FileOutcome {
    pub source: PathBuf,

    /// File that was patched: the source itself or its staged copy
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<PathBuf>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<DeidReport>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FileOutcome {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Aggregate of a batch run.
#[derive(Debug, Default, Serialize)]
pub struct BatchReport {
    pub succeeded: usize,
    pub failed: usize,
    pub files: Vec<FileOutcome>,
}

impl BatchReport {
    pub fn all_succeeded(&self) -> bool {
        self.failed == 0
    }

    fn push(&mut self, outcome: FileOutcome) {
        if outcome.is_success() {
            self.succeeded += 1;
        } else {
            self.failed += 1;
        }
        self.files.push(outcome);
    }
}

/// Process `paths` one after another.
pub fn run_batch(paths: &[PathBuf], options: &BatchOptions) -> BatchReport {
    let mut report = BatchReport::default();

    for path in paths {
        let outcome = match process_one(path, options) {
            Ok((output, deid)) => FileOutcome {
                source: path.clone(),
                output: Some(output),
                report: Some(deid),
                error: None,
            },
            Err(err) => {
                warn!(file = %path.display(), error = %err, "De-identification failed");
                FileOutcome {
                    source: path.clone(),
                    output: None,
                    report: None,
                    error: Some(err.to_string()),
                }
            }
        };
        report.push(outcome);
    }

    info!(
        succeeded = report.succeeded,
        failed = report.failed,
        "Batch finished"
    );
    report
}

fn process_one(path: &Path, options: &BatchOptions) -> Result<(PathBuf, DeidReport), DeidError> {
    if options.in_place {
        return Ok((path.to_path_buf(), deidentify_path(path, &options.deid)?));
    }

    let preflight = deidentify_path(path, &options.deid.clone().with_dry_run(true))?;
    if options.deid.dry_run {
        return Ok((path.to_path_buf(), preflight));
    }

    let staged = stage_copy(path)?;
    match deidentify_path(&staged, &options.deid) {
        Ok(report) => Ok((staged, report)),
        Err(err) => {
            if let Err(remove_err) = fs::remove_file(&staged) {
                warn!(
                    file = %staged.display(),
                    error = %remove_err,
                    "Could not remove failed staged copy"
                );
            }
            Err(err)
        }
    }
}
