//! Scanner vendor classification.
//!
//! The first directory's ImageDescription names the scanner that produced
//! the slide. Each supported scanner family stores the identifying value in
//! a different description field and lays out its auxiliary images
//! differently, so the classification result is a [`VendorProfile`] that
//! carries everything the redactor and the unlinker need.
//!
//! Markers are checked in a fixed order and the first match wins. A GT450
//! description that also happened to contain "AT2" would be treated as AT2;
//! that ordering is policy.

use serde::Serialize;

// =============================================================================
// UnlinkStrategy
// =============================================================================

/// How auxiliary images are removed from the directory chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnlinkStrategy {
    /// Walk back from the tail, zero every trailing label/macro payload and
    /// cut the chain in front of it.
    TerminateBeforeAuxiliary,

    /// Cut the chain right after the last tiled directory, leaving the
    /// payload of whatever followed in place but unreachable.
    TruncateAfterLastTiled,
}

// =============================================================================
// VendorProfile
// =============================================================================

/// Closed set of scanner conventions this tool knows how to de-identify.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VendorProfile {
    /// Aperio ScanScope AT2: identifier in `Filename`
    AperioAt2,

    /// Aperio GT450: identifier in `ScanScope ID`
    AperioGt450,

    /// Motic SVS export: identifier in `Barcode`
    Motic,

    /// None of the known markers
    Unrecognized,
}

/// Profiles in classification priority order.
const PRIORITY: [VendorProfile; 3] = [
    VendorProfile::AperioAt2,
    VendorProfile::AperioGt450,
    VendorProfile::Motic,
];

impl VendorProfile {
    /// Get a human-readable name for the profile.
    pub const fn name(self) -> &'static str {
        match self {
            VendorProfile::AperioAt2 => "Aperio AT2",
            VendorProfile::AperioGt450 => "Aperio GT450",
            VendorProfile::Motic => "Motic",
            VendorProfile::Unrecognized => "Unrecognized",
        }
    }

    /// Literal substring that identifies the profile in the first description.
    pub const fn marker(self) -> Option<&'static str> {
        match self {
            VendorProfile::AperioAt2 => Some("AT2"),
            VendorProfile::AperioGt450 => Some("GT450"),
            VendorProfile::Motic => Some("Barcode"),
            VendorProfile::Unrecognized => None,
        }
    }

    /// Text that immediately precedes the identifier value.
    ///
    /// The value ends at the next `|` (or the end of the description).
    pub const fn identifier_delimiter(self) -> Option<&'static str> {
        match self {
            VendorProfile::AperioAt2 => Some("|Filename = "),
            VendorProfile::AperioGt450 => Some("|ScanScope ID = "),
            VendorProfile::Motic => Some("|Barcode = "),
            VendorProfile::Unrecognized => None,
        }
    }

    /// Directories whose descriptions must be redacted.
    ///
    /// Aperio writes the same metadata into the base image and the
    /// thumbnail; Motic only into the base image.
    pub const fn redacted_directories(self) -> &'static [usize] {
        match self {
            VendorProfile::AperioAt2 | VendorProfile::AperioGt450 => &[0, 1],
            VendorProfile::Motic => &[0],
            VendorProfile::Unrecognized => &[],
        }
    }

    /// Chain surgery used for this profile.
    pub const fn unlink_strategy(self) -> Option<UnlinkStrategy> {
        match self {
            VendorProfile::AperioAt2 | VendorProfile::AperioGt450 => {
                Some(UnlinkStrategy::TerminateBeforeAuxiliary)
            }
            VendorProfile::Motic => Some(UnlinkStrategy::TruncateAfterLastTiled),
            VendorProfile::Unrecognized => None,
        }
    }

    pub fn is_recognized(self) -> bool {
        self != VendorProfile::Unrecognized
    }
}

impl std::fmt::Display for VendorProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// =============================================================================
// Classification
// =============================================================================

/// Classify a slide from its first directory's description.
pub fn classify(first_description: &str) -> VendorProfile {
    PRIORITY
        .into_iter()
        .find(|profile| {
            profile
                .marker()
                .is_some_and(|marker| first_description.contains(marker))
        })
        .unwrap_or(VendorProfile::Unrecognized)
}

/// Check if bytes start with a TIFF or BigTIFF signature.
///
/// A quick filter for directory scans, before attempting full parsing.
pub fn is_tiff_header(bytes: &[u8]) -> bool {
    matches!(
        bytes.get(..4),
        Some([0x49, 0x49, 0x2A, 0x00])
            | Some([0x49, 0x49, 0x2B, 0x00])
            | Some([0x4D, 0x4D, 0x00, 0x2A])
            | Some([0x4D, 0x4D, 0x00, 0x2B])
    )
}

// =============================================================================
// Tests
// =============================================================================
