//! ImageDescription redaction.
//!
//! The identifier is read from the first directory's description (the value
//! after the profile's `|Key = ` delimiter) and every occurrence of it is
//! replaced by the token in each designated directory.
//!
//! A TIFF value cannot grow in place, so the rewritten description must fit
//! the stored bytes:
//! - shorter text is padded with NUL up to the original text length; readers
//!   stop at the first NUL and the tag's count field is left as stored
//! - longer text is refused with `ReplacementTooLong`
//!
//! Bytes after the original terminator are preserved.

use serde::Serialize;
use tracing::debug;

use crate::error::DeidError;
use crate::format::svs::{count_subslice, extract_field, replace_all};
use crate::format::tiff::{Container, TiffHeader, ValueReader};
use crate::format::VendorProfile;
use crate::io::{PatchPlan, PatchReason, PatchWriter, RangeReader, RangeWriter};

/// Outcome of planning a redaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Redaction {
    /// The value found after the profile's delimiter. Never serialized.
    #[serde(skip)]
    pub identifier: String,

    /// Directories whose stored description bytes will change
    pub changed_directories: Vec<usize>,

    /// Total identifier occurrences replaced across all directories
    pub occurrences: usize,
}

/// Identifier value of the first directory's description.
///
/// A description with non-ASCII bytes counts as missing: the parsed text no
/// longer matches the stored bytes, so nothing in it could be replaced.
pub fn find_identifier<R: RangeReader>(
    container: &Container<R>,
    profile: VendorProfile,
) -> Result<Vec<u8>, DeidError> {
    let delimiter = profile
        .identifier_delimiter()
        .ok_or(DeidError::UnrecognizedVendor)?;
    let description = container
        .first_description()
        .filter(|text| text.is_ascii())
        .ok_or(DeidError::DescriptionMissing { directory: 0 })?;

    match extract_field(description.as_bytes(), delimiter.as_bytes()) {
        Some(value) if !value.is_empty() => Ok(value.to_vec()),
        _ => Err(DeidError::IdentifierNotFound {
            directory: 0,
            delimiter,
        }),
    }
}

/// Queue the description rewrites for `profile` into `plan`.
///
/// Nothing is written; every failure leaves the file untouched.
pub fn plan_redaction<R: RangeReader>(
    container: &mut Container<R>,
    profile: VendorProfile,
    replacement: &str,
    plan: &mut PatchPlan,
) -> Result<Redaction, DeidError> {
    let identifier = find_identifier(container, profile)?;
    let header: TiffHeader = *container.header();

    let mut changed_directories = Vec::new();
    let mut occurrences = 0;

    for &index in profile.redacted_directories() {
        let entry = container
            .directory(index)
            .filter(|dir| dir.description.is_some())
            .and_then(|dir| dir.description_entry().cloned())
            .ok_or(DeidError::DescriptionMissing { directory: index })?;

        let stored = ValueReader::new(container.reader_mut(), &header).read_ascii_bytes(&entry)?;
        let text_len = stored.iter().position(|&b| b == 0).unwrap_or(stored.len());
        let text = &stored[..text_len];
        if !text.is_ascii() {
            return Err(DeidError::DescriptionMissing { directory: index });
        }

        let found = count_subslice(text, &identifier);
        let new_text = replace_all(text, &identifier, replacement.as_bytes());
        if new_text.len() > text_len {
            return Err(DeidError::ReplacementTooLong {
                directory: index,
                required: new_text.len(),
                available: text_len,
            });
        }

        let mut value = new_text;
        value.resize(text_len, 0);
        value.extend_from_slice(&stored[text_len..]);
        debug_assert_eq!(value.len(), stored.len());

        if value[..] != stored[..] {
            let position = entry.value_position(&header);
            debug!(
                directory = index,
                position,
                len = value.len(),
                occurrences = found,
                "Planned description redaction"
            );
            plan.overwrite(position, value, PatchReason::RedactDescription { directory: index });
            changed_directories.push(index);
            occurrences += found;
        }
    }

    Ok(Redaction {
        identifier: String::from_utf8_lossy(&identifier).into_owned(),
        changed_directories,
        occurrences,
    })
}

/// Plan and immediately apply the description redaction on its own.
pub fn redact<R: RangeWriter>(
    container: &mut Container<R>,
    profile: VendorProfile,
    replacement: &str,
) -> Result<Redaction, DeidError> {
    let mut plan = PatchPlan::new();
    let redaction = plan_redaction(container, profile, replacement, &mut plan)?;

    let mut writer = PatchWriter::new(container.reader_mut());
    writer.apply(&plan)?;
    writer.finish()?;

    Ok(redaction)
}
