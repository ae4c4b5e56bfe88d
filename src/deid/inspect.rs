//! Read-only slide summaries and the pyramid integrity digest.

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::error::DeidError;
use crate::format::tiff::{ByteOrder, Container, SubImageKind};
use crate::format::{classify, SvsDescription, VendorProfile};
use crate::io::RangeReader;

/// Chunk size used when hashing payload bytes.
const DIGEST_CHUNK_SIZE: u64 = 1024 * 1024;

/// Longest description prefix shown in summaries.
const DESCRIPTION_PREVIEW_CHARS: usize = 120;

/// One row of a slide summary.
#[derive(Debug, Clone, Serialize)]
pub struct DirectorySummary {
    pub index: usize,
    pub offset: u64,
    pub kind: SubImageKind,
    pub subfile_type: Option<u64>,
    pub tiled: bool,
    pub width: Option<u64>,
    pub height: Option<u64>,
    pub payload_ranges: usize,
    pub payload_bytes: u64,
    pub description: Option<String>,
}

/// Structure of a slide as seen by the de-identifier.
#[derive(Debug, Clone, Serialize)]
pub struct SlideSummary {
    pub file: String,
    pub size: u64,
    pub byte_order: ByteOrder,
    pub bigtiff: bool,
    pub vendor: VendorProfile,
    pub metadata: Option<SvsDescription>,
    pub directories: Vec<DirectorySummary>,
}

/// Summarize a parsed slide.
pub fn summarize<R: RangeReader>(container: &Container<R>) -> SlideSummary {
    let header = container.header();
    let first = container.first_description();

    let directories = container
        .directories()
        .iter()
        .map(|dir| DirectorySummary {
            index: dir.index,
            offset: dir.offset(),
            kind: dir.kind,
            subfile_type: dir.subfile_type,
            tiled: dir.is_tiled,
            width: dir.width,
            height: dir.height,
            payload_ranges: dir.payload.len(),
            payload_bytes: dir.payload_bytes(),
            description: dir.description.as_deref().map(preview),
        })
        .collect();

    SlideSummary {
        file: container.identifier().to_string(),
        size: container.size(),
        byte_order: header.byte_order,
        bigtiff: header.is_bigtiff,
        vendor: first.map(classify).unwrap_or(VendorProfile::Unrecognized),
        metadata: first.map(SvsDescription::parse),
        directories,
    }
}

/// SHA-256 (hex) over the payload of every primary directory, in chain order.
///
/// Label and macro payloads are excluded, so the digest is the same before
/// and after de-identification when the pyramid was left intact.
pub fn pyramid_digest<R: RangeReader>(container: &mut Container<R>) -> Result<String, DeidError> {
    let ranges: Vec<_> = container
        .directories()
        .iter()
        .filter(|dir| dir.kind == SubImageKind::Primary)
        .flat_map(|dir| dir.payload.iter().copied())
        .collect();

    let reader = container.reader_mut();
    let mut hasher = Sha256::new();

    for range in ranges {
        let mut position = range.offset;
        let end = range
            .offset
            .checked_add(range.length)
            .ok_or(crate::error::IoError::RangeOutOfBounds {
                offset: range.offset,
                requested: range.length,
                size: reader.size(),
            })?;
        while position < end {
            let len = (end - position).min(DIGEST_CHUNK_SIZE);
            let chunk = reader.read_exact_at(position, len as usize)?;
            hasher.update(&chunk);
            position += len;
        }
    }

    Ok(hex::encode(hasher.finalize()))
}

fn preview(description: &str) -> String {
    let flat = description.replace(['\r', '\n'], " ");
    if flat.chars().count() <= DESCRIPTION_PREVIEW_CHARS {
        flat
    } else {
        let cut: String = flat.chars().take(DESCRIPTION_PREVIEW_CHARS).collect();
        format!("{}...", cut)
    }
}
