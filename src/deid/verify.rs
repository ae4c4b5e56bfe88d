//! Post-apply checks, run against a freshly re-parsed container.

use tracing::debug;

use crate::error::DeidError;
use crate::format::svs::{find_subslice, replace_all};
use crate::format::tiff::Container;
use crate::format::{UnlinkStrategy, VendorProfile};
use crate::io::RangeReader;

/// Check that a processed slide no longer exposes the identifier or the
/// auxiliary images `profile` is responsible for.
pub fn verify<R: RangeReader>(
    container: &Container<R>,
    profile: VendorProfile,
    identifier: &str,
    replacement: &str,
) -> Result<(), DeidError> {
    for &index in profile.redacted_directories() {
        let description = container
            .directory(index)
            .and_then(|dir| dir.description.as_deref())
            .ok_or(DeidError::DescriptionMissing { directory: index })?;

        // Occurrences inside the token itself do not count
        let remainder = replace_all(description.as_bytes(), replacement.as_bytes(), b"");
        if find_subslice(&remainder, identifier.as_bytes()).is_some() {
            return Err(DeidError::VerificationFailed {
                reason: format!("identifier still present in directory {} description", index),
            });
        }
    }

    let directories = container.directories();
    match profile.unlink_strategy() {
        Some(UnlinkStrategy::TerminateBeforeAuxiliary) => {
            if let Some(dir) = directories.iter().rev().find(|d| d.kind.is_auxiliary()) {
                // Only a trailing run is ever unlinked; an earlier one is out of scope
                if dir.index + 1 == directories.len() {
                    return Err(DeidError::VerificationFailed {
                        reason: format!(
                            "{:?} image still linked at directory {}",
                            dir.kind, dir.index
                        ),
                    });
                }
            }
        }
        Some(UnlinkStrategy::TruncateAfterLastTiled) => {
            let last = directories.last().map(|d| d.index);
            let last_tiled = directories.iter().rev().find(|d| d.is_tiled).map(|d| d.index);
            if last != last_tiled {
                return Err(DeidError::VerificationFailed {
                    reason: format!(
                        "chain continues past the last tiled directory ({:?} vs {:?})",
                        last_tiled, last
                    ),
                });
            }
        }
        None => return Err(DeidError::UnrecognizedVendor),
    }

    debug!(file = container.identifier(), "Verification passed");
    Ok(())
}
