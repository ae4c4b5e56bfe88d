//! Working copies for non-destructive runs.
//!
//! A slide is copied to `<parent>/DeidentifiedImages/<YYYYmmdd_HHMMSS>.<ext>`
//! and the copy is patched instead of the original. Names already taken get
//! a `_1`, `_2`... suffix.

use std::fs::{self, File, OpenOptions};
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use tracing::debug;

use crate::error::DeidError;

/// Directory created next to the source slide for staged copies.
pub const STAGING_DIR: &str = "DeidentifiedImages";

const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Suffix attempts before giving up on finding a free name.
const MAX_SUFFIX: u32 = 10_000;

/// Copy `source` into its staging directory and return the new path.
pub fn stage_copy(source: &Path) -> Result<PathBuf, DeidError> {
    stage_copy_at(source, Local::now())
}

/// [`stage_copy`] with an explicit clock reading.
pub fn stage_copy_at(source: &Path, now: DateTime<Local>) -> Result<PathBuf, DeidError> {
    let dir = staging_dir(source);
    fs::create_dir_all(&dir)?;

    let stem = now.format(TIMESTAMP_FORMAT).to_string();
    let extension = source.extension().and_then(|e| e.to_str());

    let mut input = File::open(source)?;
    let (target, mut output) = create_unique(&dir, &stem, extension)?;

    if let Err(err) = io::copy(&mut input, &mut output).and_then(|_| output.sync_all()) {
        drop(output);
        let _ = fs::remove_file(&target);
        return Err(err.into());
    }

    debug!(
        source = %source.display(),
        target = %target.display(),
        "Staged working copy"
    );
    Ok(target)
}

/// `<parent>/DeidentifiedImages` for `source`.
pub fn staging_dir(source: &Path) -> PathBuf {
    let parent = match source.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    parent.join(STAGING_DIR)
}

fn file_name(stem: &str, suffix: u32, extension: Option<&str>) -> String {
    let base = if suffix == 0 {
        stem.to_string()
    } else {
        format!("{}_{}", stem, suffix)
    };
    match extension {
        Some(ext) => format!("{}.{}", base, ext),
        None => base,
    }
}

/// Claim the first free name with `create_new`.
fn create_unique(
    dir: &Path,
    stem: &str,
    extension: Option<&str>,
) -> Result<(PathBuf, File), DeidError> {
    for suffix in 0..MAX_SUFFIX {
        let path = dir.join(file_name(stem, suffix, extension));
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => return Ok((path, file)),
            Err(err) if err.kind() == ErrorKind::AlreadyExists => continue,
            Err(err) => return Err(err.into()),
        }
    }
    Err(io::Error::new(
        ErrorKind::AlreadyExists,
        format!("no free staging name for {} in {}", stem, dir.display()),
    )
    .into())
}
