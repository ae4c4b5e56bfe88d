//! SVS ImageDescription grammar.
//!
//! SVS files store their metadata in the ImageDescription tag of the first
//! directories as a pipe-separated string:
//!
//! ```text
//! Aperio Image Library v12.0.5
//! 46000x32914 [0,100 46000x32714] (240x240) JPEG/RGB Q=70|AppMag = 20|Filename = 1234|MPP = 0.499
//! ```
//!
//! The first segment is a free-form banner; every later segment is
//! `Key = Value`. Scanner identifiers live in one of those values, so
//! redaction works on raw bytes: the value is located by its `|Key = `
//! prefix and ends at the next `|`.

use std::collections::BTreeMap;

use serde::Serialize;

/// Field separator of the SVS description grammar.
pub const FIELD_SEPARATOR: u8 = b'|';

/// Banner prefix written by Aperio-compatible scanners.
const APERIO_BANNER: &str = "Aperio";

// =============================================================================
// SVS Description
// =============================================================================

/// Parsed view of an SVS ImageDescription, for reporting.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SvsDescription {
    /// First segment before any `|`
    pub banner: String,

    /// Whether the banner names the Aperio library
    pub is_aperio: bool,

    /// Microns per pixel
    pub mpp: Option<f64>,

    /// Objective magnification (e.g., 20, 40)
    pub magnification: Option<f64>,

    /// Every `Key = Value` pair, in key order
    pub properties: BTreeMap<String, String>,
}

impl SvsDescription {
    /// Parse a description string. Never fails; unknown shapes yield empty fields.
    pub fn parse(description: &str) -> Self {
        let mut parts = description.split('|');
        let banner = parts.next().unwrap_or_default().trim().to_string();

        let mut parsed = SvsDescription {
            is_aperio: banner.starts_with(APERIO_BANNER),
            banner,
            ..Default::default()
        };

        for part in parts {
            let Some((key, value)) = part.split_once('=') else {
                continue;
            };
            let key = key.trim();
            let value = value.trim();

            match key {
                "MPP" => parsed.mpp = value.parse().ok(),
                "AppMag" => parsed.magnification = value.parse().ok(),
                _ => {}
            }
            parsed.properties.insert(key.to_string(), value.to_string());
        }

        parsed
    }
}

// =============================================================================
// Byte-level helpers
// =============================================================================

/// Position of the first occurrence of `needle` in `haystack`.
pub fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || needle.len() > haystack.len() {
        return None;
    }
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

/// Count non-overlapping occurrences of `needle`.
pub fn count_subslice(haystack: &[u8], needle: &[u8]) -> usize {
    let mut count = 0;
    let mut rest = haystack;
    while let Some(pos) = find_subslice(rest, needle) {
        count += 1;
        rest = &rest[pos + needle.len()..];
    }
    count
}

/// Value following the first `delimiter`, up to the next `|` or the end.
///
/// Returns `None` when the delimiter is absent. The value may be empty.
pub fn extract_field<'a>(description: &'a [u8], delimiter: &[u8]) -> Option<&'a [u8]> {
    let start = find_subslice(description, delimiter)? + delimiter.len();
    let rest = &description[start..];
    let end = rest
        .iter()
        .position(|&b| b == FIELD_SEPARATOR)
        .unwrap_or(rest.len());
    Some(&rest[..end])
}

/// Replace every non-overlapping occurrence of `needle`, scanning left to right.
pub fn replace_all(haystack: &[u8], needle: &[u8], replacement: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(haystack.len());
    let mut rest = haystack;
    while let Some(pos) = find_subslice(rest, needle) {
        out.extend_from_slice(&rest[..pos]);
        out.extend_from_slice(replacement);
        rest = &rest[pos + needle.len()..];
    }
    out.extend_from_slice(rest);
    out
}
