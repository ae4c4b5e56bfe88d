//! Removal of label and macro images from the IFD chain.
//!
//! Two chain shapes are handled:
//!
//! ```text
//! Aperio:  [base] -> [thumb] -> [level1] -> [level2] -> [label] -> [macro] -> 0
//!                                                 cut here ^ (label, macro zeroed)
//!
//! Motic:   [base] -> [level1] -> [thumb] -> [label] -> [macro] -> 0
//!                      cut after the last tiled IFD ^ (payload left in place)
//! ```
//!
//! The chain-termination walk stops at the first primary directory seen from
//! the tail; an auxiliary image sitting between pyramid levels is not
//! searched for.

use serde::Serialize;
use tracing::debug;

use crate::error::DeidError;
use crate::format::tiff::{Container, DataRange, Directory, Ifd, TiffHeader};
use crate::format::UnlinkStrategy;
use crate::io::{PatchPlan, PatchReason, PatchWriter, RangeReader, RangeWriter};

/// Outcome of planning the chain surgery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Unlink {
    pub strategy: UnlinkStrategy,

    /// Directories that will no longer be reachable from the header
    pub removed_directories: Vec<usize>,

    /// Directory whose next-IFD pointer becomes the new end of the chain
    pub new_tail: Option<usize>,

    /// Payload bytes scheduled for zero fill
    pub zeroed_bytes: u64,
}

/// Queue the chain surgery for `strategy` into `plan`.
///
/// Nothing is written; every failure leaves the file untouched.
pub fn plan_unlink<R: RangeReader>(
    container: &Container<R>,
    strategy: UnlinkStrategy,
    plan: &mut PatchPlan,
) -> Result<Unlink, DeidError> {
    match strategy {
        UnlinkStrategy::TerminateBeforeAuxiliary => plan_terminate(container, plan),
        UnlinkStrategy::TruncateAfterLastTiled => plan_truncate(container, plan),
    }
}

fn plan_terminate<R: RangeReader>(
    container: &Container<R>,
    plan: &mut PatchPlan,
) -> Result<Unlink, DeidError> {
    let directories = container.directories();
    let header = container.header();

    let trailing: Vec<&Directory> = directories
        .iter()
        .rev()
        .take_while(|dir| dir.kind.is_auxiliary())
        .collect();

    if trailing.iter().any(|dir| dir.index == 0) {
        return Err(DeidError::NoPrimaryDirectory);
    }

    let kept = &directories[..directories.len() - trailing.len()];
    let protected = Protected::collect(header, kept);

    let mut removed_directories = Vec::with_capacity(trailing.len());
    let mut zeroed_bytes = 0;

    for dir in trailing {
        for range in &dir.payload {
            check_payload(container.size(), dir.index, range)?;
            if protected.intersects(range) {
                return Err(DeidError::PayloadOverlap {
                    directory: dir.index,
                    offset: range.offset,
                });
            }
            plan.zero(
                range.offset,
                range.length,
                PatchReason::ZeroPayload {
                    directory: dir.index,
                },
            );
            zeroed_bytes += range.length;
        }

        let previous = &directories[dir.index - 1];
        plan.overwrite(
            previous.next_pointer_position(),
            header.encode_offset(0),
            PatchReason::TerminateChain {
                directory: previous.index,
            },
        );

        debug!(
            directory = dir.index,
            kind = ?dir.kind,
            payload = dir.payload_bytes(),
            "Planned auxiliary image removal"
        );
        removed_directories.push(dir.index);
    }

    let new_tail = removed_directories.last().map(|&index| index - 1);

    Ok(Unlink {
        strategy: UnlinkStrategy::TerminateBeforeAuxiliary,
        removed_directories,
        new_tail,
        zeroed_bytes,
    })
}

fn plan_truncate<R: RangeReader>(
    container: &Container<R>,
    plan: &mut PatchPlan,
) -> Result<Unlink, DeidError> {
    let directories = container.directories();

    let last_tiled = directories
        .iter()
        .filter(|dir| dir.is_tiled)
        .map(|dir| dir.index)
        .max()
        .ok_or(DeidError::NoTiledDirectoryFound)?;

    let anchor = &directories[last_tiled];
    plan.overwrite(
        anchor.next_pointer_position(),
        container.header().encode_offset(0),
        PatchReason::TerminateChain {
            directory: last_tiled,
        },
    );

    let removed_directories: Vec<usize> = (last_tiled + 1..directories.len()).collect();

    debug!(
        anchor = last_tiled,
        removed = removed_directories.len(),
        "Planned chain truncation"
    );

    Ok(Unlink {
        strategy: UnlinkStrategy::TruncateAfterLastTiled,
        removed_directories,
        new_tail: Some(last_tiled),
        zeroed_bytes: 0,
    })
}

/// Plan and immediately apply the chain surgery on its own.
pub fn strip<R: RangeWriter>(
    container: &mut Container<R>,
    strategy: UnlinkStrategy,
) -> Result<Unlink, DeidError> {
    let mut plan = PatchPlan::new();
    let unlink = plan_unlink(container, strategy, &mut plan)?;

    let mut writer = PatchWriter::new(container.reader_mut());
    writer.apply(&plan)?;
    writer.finish()?;

    Ok(unlink)
}

fn check_payload(file_size: u64, directory: usize, range: &DataRange) -> Result<(), DeidError> {
    match range.offset.checked_add(range.length) {
        Some(end) if end <= file_size => Ok(()),
        _ => Err(DeidError::PayloadOutOfBounds {
            directory,
            offset: range.offset,
            length: range.length,
        }),
    }
}

/// Byte ranges zero fill must not touch, sorted by offset.
struct Protected {
    ranges: Vec<DataRange>,
    /// Furthest end among `ranges[..=i]`
    reach: Vec<u64>,
}

impl Protected {
    /// The header plus, for every kept directory, its IFD table, its
    /// external tag values and its strips or tiles.
    fn collect(header: &TiffHeader, kept: &[Directory]) -> Self {
        let mut ranges = vec![DataRange {
            offset: 0,
            length: header.header_size() as u64,
        }];

        for dir in kept {
            ranges.push(DataRange {
                offset: dir.offset(),
                length: Ifd::calculate_size(dir.ifd.entry_count() as u64, header)
                    .map_or(0, |len| len as u64),
            });
            ranges.extend(
                dir.ifd
                    .entries
                    .iter()
                    .filter(|entry| !entry.is_inline)
                    .filter_map(|entry| {
                        Some(DataRange {
                            offset: entry.value_offset(header),
                            length: entry.value_byte_size()?,
                        })
                    }),
            );
            ranges.extend(dir.payload.iter().copied());
        }

        Self::from_ranges(ranges)
    }

    fn from_ranges(mut ranges: Vec<DataRange>) -> Self {
        ranges.retain(|range| range.length > 0);
        ranges.sort_by_key(|range| range.offset);
        let reach = ranges
            .iter()
            .scan(0u64, |furthest, range| {
                *furthest = (*furthest).max(range.offset.saturating_add(range.length));
                Some(*furthest)
            })
            .collect();
        Protected { ranges, reach }
    }

    /// Whether `range` shares at least one byte with any protected range.
    ///
    /// Protected ranges may nest or repeat (shared blank tiles), so the
    /// check uses the furthest end reached before `range`'s end rather than
    /// the nearest range alone.
    fn intersects(&self, range: &DataRange) -> bool {
        if range.length == 0 {
            return false;
        }
        let end = range.offset.saturating_add(range.length);
        let idx = self.ranges.partition_point(|r| r.offset < end);
        idx > 0 && self.reach[idx - 1] > range.offset
    }
}
