//! End-to-end de-identification tests against files on disk.
//!
//! Tests verify:
//! - The AT2 scenario: identifier replaced, label and macro zeroed, chain cut
//! - Only the planned bytes change and the file length is preserved
//! - A second run writes nothing
//! - GT450 and Motic profiles, BigTIFF and big-endian files
//! - Every planning failure leaves the file byte-for-byte unchanged

use std::fs;

use slide_deid::{
    deidentify_path, inspect_path, Container, DeidError, DeidOptions, SubImageKind,
    UnlinkStrategy, VendorProfile,
};

use super::test_utils::{
    at2_slide, changed_positions, find, gt450_slide, motic_slide, write_slide, BuiltTiff,
    ByteOrderType, IfdBuilder, TiffBuilder, LABEL_BYTES,
};

/// Whether `pos` falls inside any of the given (start, len) spans.
fn within(spans: &[(u64, u64)], pos: usize) -> bool {
    let pos = pos as u64;
    spans.iter().any(|&(start, len)| pos >= start && pos < start + len)
}

/// Spans an Aperio run is allowed to touch.
fn aperio_allowed_spans(slide: &BuiltTiff) -> Vec<(u64, u64)> {
    let ptr = slide.pointer_width() as u64;
    let mut spans = Vec::new();
    for index in [0, 1] {
        let (pos, len) = slide.descriptions[index].unwrap();
        spans.push((pos, len as u64));
    }
    for index in [4, 5] {
        spans.extend(slide.payloads[index].iter().copied());
    }
    spans.push((slide.next_pointers[3], ptr));
    spans.push((slide.next_pointers[4], ptr));
    spans
}

fn assert_unchanged_on_error(slide_data: &[u8], expect: impl Fn(&DeidError) -> bool) {
    let dir = tempfile::tempdir().unwrap();
    let path = write_slide(dir.path(), "slide.svs", slide_data);

    let err = deidentify_path(&path, &DeidOptions::default()).unwrap_err();
    assert!(expect(&err), "unexpected error: {:?}", err);
    assert_eq!(fs::read(&path).unwrap(), slide_data);
}

// =============================================================================
// Aperio AT2
// =============================================================================

#[test]
fn test_at2_scenario() {
    let slide = at2_slide(ByteOrderType::LittleEndian, false, "SCANNER123");
    let dir = tempfile::tempdir().unwrap();
    let path = write_slide(dir.path(), "case.svs", &slide.data);

    let report = deidentify_path(&path, &DeidOptions::default()).unwrap();
    let after = fs::read(&path).unwrap();

    assert_eq!(report.vendor, VendorProfile::AperioAt2);
    assert_eq!(report.strategy, UnlinkStrategy::TerminateBeforeAuxiliary);
    assert_eq!(report.redacted_directories, vec![0, 1]);
    assert_eq!(report.occurrences, 2);
    assert_eq!(report.removed_directories, vec![5, 4]);
    assert_eq!(report.zeroed_bytes, (LABEL_BYTES + 2 * 900) as u64);
    assert!(report.verified);

    // Descriptions
    for index in [0, 1] {
        let stored = slide.description_bytes(&after, index);
        assert!(find(stored, b"|Filename = MDACC|").is_some());
        assert!(find(stored, b"SCANNER123").is_none());
    }

    // Label and macro payloads are zero, pyramid payloads are intact
    for index in [4, 5] {
        for chunk in slide.payload_bytes(&after, index) {
            assert!(chunk.iter().all(|&b| b == 0));
        }
    }
    for index in 0..4 {
        assert_eq!(
            slide.payload_bytes(&after, index),
            slide.payload_bytes(&slide.data, index)
        );
    }

    // The chain now ends after the last pyramid level
    assert_eq!(slide.read_offset(&after, slide.next_pointers[3]), 0);

    // Nothing outside the planned spans changed
    let allowed = aperio_allowed_spans(&slide);
    for pos in changed_positions(&slide.data, &after) {
        assert!(within(&allowed, pos), "unexpected change at byte {}", pos);
    }

    let container = Container::open_path_read_only(&path).unwrap();
    assert_eq!(container.directories().len(), 4);
    assert!(container
        .directories()
        .iter()
        .all(|d| d.kind == SubImageKind::Primary));
}

#[test]
fn test_second_run_is_a_no_op() {
    let slide = at2_slide(ByteOrderType::LittleEndian, false, "SCANNER123");
    let dir = tempfile::tempdir().unwrap();
    let path = write_slide(dir.path(), "case.svs", &slide.data);

    let first = deidentify_path(&path, &DeidOptions::default()).unwrap();
    assert!(first.bytes_written() > 0);
    let once = fs::read(&path).unwrap();

    let second = deidentify_path(&path, &DeidOptions::default()).unwrap();
    assert_eq!(second.bytes_written(), 0);
    assert!(second.redacted_directories.is_empty());
    assert!(second.removed_directories.is_empty());
    assert_eq!(fs::read(&path).unwrap(), once);
}

#[test]
fn test_gt450_second_run_is_a_no_op() {
    let slide = gt450_slide(ByteOrderType::BigEndian, true, "SS45001");
    let dir = tempfile::tempdir().unwrap();
    let path = write_slide(dir.path(), "gt450.svs", &slide.data);

    assert!(deidentify_path(&path, &DeidOptions::default())
        .unwrap()
        .bytes_written()
        > 0);
    let once = fs::read(&path).unwrap();

    let second = deidentify_path(&path, &DeidOptions::default()).unwrap();
    assert_eq!(second.vendor, VendorProfile::AperioGt450);
    assert_eq!(second.bytes_written(), 0);
    assert!(second.verified);
    assert_eq!(fs::read(&path).unwrap(), once);
}

#[test]
fn test_at2_bigtiff_big_endian() {
    let slide = at2_slide(ByteOrderType::BigEndian, true, "BE-SLIDE-77");
    let dir = tempfile::tempdir().unwrap();
    let path = write_slide(dir.path(), "big.svs", &slide.data);

    let report = deidentify_path(&path, &DeidOptions::default()).unwrap();
    let after = fs::read(&path).unwrap();

    assert_eq!(report.vendor, VendorProfile::AperioAt2);
    assert_eq!(after.len(), slide.data.len());
    assert_eq!(slide.read_offset(&after, slide.next_pointers[3]), 0);
    assert!(find(&after, b"BE-SLIDE-77").is_none());

    let allowed = aperio_allowed_spans(&slide);
    for pos in changed_positions(&slide.data, &after) {
        assert!(within(&allowed, pos), "unexpected change at byte {}", pos);
    }
}

#[test]
fn test_shorter_token_keeps_trailing_bytes() {
    let description = super::test_utils::at2_description("SCANNER123");
    let slide = TiffBuilder::new()
        .add_ifd(
            IfdBuilder::tiled_level(1024, 768, 1, 100, 0x10)
                .with_description_trailer(&description, b"XYZ"),
        )
        .add_ifd(IfdBuilder::striped(256, 192, 1, 100, 0x20).with_description(&description))
        .build();
    let dir = tempfile::tempdir().unwrap();
    let path = write_slide(dir.path(), "trailer.svs", &slide.data);

    deidentify_path(&path, &DeidOptions::default().with_replacement("ID")).unwrap();
    let after = fs::read(&path).unwrap();

    let stored = slide.description_bytes(&after, 0);
    let original = slide.description_bytes(&slide.data, 0);
    assert_eq!(stored.len(), original.len());
    assert!(stored.ends_with(b"\0XYZ"));

    let text_end = stored.iter().position(|&b| b == 0).unwrap();
    assert!(find(&stored[..text_end], b"|Filename = ID|").is_some());
    // "SCANNER123" -> "ID" frees 8 bytes, which become NUL
    assert!(stored[text_end..text_end + 8].iter().all(|&b| b == 0));
}

#[test]
fn test_digest_survives_run() {
    let slide = at2_slide(ByteOrderType::LittleEndian, false, "SCANNER123");
    let dir = tempfile::tempdir().unwrap();
    let path = write_slide(dir.path(), "case.svs", &slide.data);

    let (_, before) = inspect_path(&path, true).unwrap();
    let report = deidentify_path(&path, &DeidOptions::default().with_digest(true)).unwrap();
    let (_, after) = inspect_path(&path, true).unwrap();

    assert_eq!(report.digest_before, before);
    assert_eq!(report.digest_after, after);
    assert_eq!(before, after);
}

#[test]
fn test_dry_run_writes_nothing() {
    let slide = at2_slide(ByteOrderType::LittleEndian, false, "SCANNER123");
    let dir = tempfile::tempdir().unwrap();
    let path = write_slide(dir.path(), "case.svs", &slide.data);

    let report = deidentify_path(&path, &DeidOptions::default().with_dry_run(true)).unwrap();
    assert!(report.dry_run);
    assert!(report.applied.is_none());
    assert_eq!(report.removed_directories, vec![5, 4]);
    assert_eq!(fs::read(&path).unwrap(), slide.data);
}

// =============================================================================
// Aperio GT450
// =============================================================================

#[test]
fn test_gt450_redacts_scanner_id() {
    let slide = gt450_slide(ByteOrderType::BigEndian, false, "SS45001");
    let dir = tempfile::tempdir().unwrap();
    let path = write_slide(dir.path(), "gt.svs", &slide.data);

    let report = deidentify_path(&path, &DeidOptions::default()).unwrap();
    let after = fs::read(&path).unwrap();

    assert_eq!(report.vendor, VendorProfile::AperioGt450);
    for index in [0, 1] {
        let stored = slide.description_bytes(&after, index);
        assert!(find(stored, b"|ScanScope ID = MDACC|").is_some());
        assert!(find(stored, b"SS45001").is_none());
        // Other fields are left alone
        assert!(find(stored, b"|Filename = 100234|").is_some());
    }
    assert_eq!(report.removed_directories, vec![5, 4]);
}

// =============================================================================
// Motic
// =============================================================================

#[test]
fn test_motic_truncates_after_last_tiled() {
    let slide = motic_slide(ByteOrderType::LittleEndian, true, "BC-000042");
    let dir = tempfile::tempdir().unwrap();
    let path = write_slide(dir.path(), "motic.svs", &slide.data);

    let report = deidentify_path(&path, &DeidOptions::default()).unwrap();
    let after = fs::read(&path).unwrap();

    assert_eq!(report.vendor, VendorProfile::Motic);
    assert_eq!(report.strategy, UnlinkStrategy::TruncateAfterLastTiled);
    assert_eq!(report.redacted_directories, vec![0]);
    assert_eq!(report.removed_directories, vec![2, 3, 4]);
    assert_eq!(report.zeroed_bytes, 0);

    assert_eq!(slide.read_offset(&after, slide.next_pointers[1]), 0);
    let stored = slide.description_bytes(&after, 0);
    assert!(find(stored, b"|Barcode = MDACC|").is_some());
    assert!(find(&after, b"BC-000042").is_none());

    // Payload after the cut is unreachable but not erased
    assert_eq!(
        slide.payload_bytes(&after, 3),
        slide.payload_bytes(&slide.data, 3)
    );

    let container = Container::open_path_read_only(&path).unwrap();
    assert_eq!(container.directories().len(), 2);
    assert!(container.directories().iter().all(|d| d.is_tiled));
}

#[test]
fn test_motic_second_run_is_a_no_op() {
    let slide = motic_slide(ByteOrderType::BigEndian, false, "BC-000042");
    let dir = tempfile::tempdir().unwrap();
    let path = write_slide(dir.path(), "motic.svs", &slide.data);

    let first = deidentify_path(&path, &DeidOptions::default()).unwrap();
    assert!(first.bytes_written() > 0);
    let once = fs::read(&path).unwrap();

    let second = deidentify_path(&path, &DeidOptions::default()).unwrap();
    assert_eq!(second.strategy, UnlinkStrategy::TruncateAfterLastTiled);
    assert_eq!(second.bytes_written(), 0);
    assert!(second.redacted_directories.is_empty());
    assert!(second.removed_directories.is_empty());
    assert!(second.verified);
    assert_eq!(fs::read(&path).unwrap(), once);
}

// =============================================================================
// Failures leave the file untouched
// =============================================================================

#[test]
fn test_unrecognized_vendor() {
    let slide = TiffBuilder::new()
        .add_ifd(
            IfdBuilder::tiled_level(100, 100, 1, 50, 1)
                .with_description("Generic Scanner 3000|Serial = 1234"),
        )
        .add_ifd(IfdBuilder::striped(10, 10, 1, 20, 2).with_subfile_type(1))
        .build();
    assert_unchanged_on_error(&slide.data, |e| matches!(e, DeidError::UnrecognizedVendor));
}

#[test]
fn test_missing_description() {
    let slide = TiffBuilder::new()
        .add_ifd(IfdBuilder::tiled_level(100, 100, 1, 50, 1))
        .build();
    assert_unchanged_on_error(&slide.data, |e| matches!(e, DeidError::UnrecognizedVendor));
}

#[test]
fn test_not_a_tiff() {
    let data = b"%PDF-1.7 definitely not a slide".to_vec();
    assert_unchanged_on_error(&data, |e| matches!(e, DeidError::NotATiffContainer(_)));
}

#[test]
fn test_next_pointer_past_end_of_file() {
    let mut slide = at2_slide(ByteOrderType::LittleEndian, false, "SCANNER123");
    let beyond = slide.data.len() as u64 + 1000;
    slide.poke_offset(slide.next_pointers[2], beyond);
    assert_unchanged_on_error(&slide.data, |e| matches!(e, DeidError::TruncatedChain(_)));
}

#[test]
fn test_cyclic_chain() {
    let mut slide = at2_slide(ByteOrderType::BigEndian, false, "SCANNER123");
    let first = slide.ifd_offsets[0];
    slide.poke_offset(slide.next_pointers[3], first);
    assert_unchanged_on_error(&slide.data, |e| matches!(e, DeidError::TruncatedChain(_)));
}

#[test]
fn test_replacement_too_long() {
    let slide = at2_slide(ByteOrderType::LittleEndian, false, "Q7");
    let dir = tempfile::tempdir().unwrap();
    let path = write_slide(dir.path(), "case.svs", &slide.data);

    let options = DeidOptions::default().with_replacement(
        "A-REPLACEMENT-TOKEN-LONGER-THAN-ANY-DESCRIPTION-IN-THIS-FILE-".repeat(8),
    );
    let err = deidentify_path(&path, &options).unwrap_err();
    assert!(matches!(
        err,
        DeidError::ReplacementTooLong { directory: 0, .. }
    ));
    assert_eq!(fs::read(&path).unwrap(), slide.data);
}

#[test]
fn test_label_overlapping_pyramid_is_refused() {
    let mut slide = at2_slide(ByteOrderType::LittleEndian, false, "SCANNER123");
    // Point the label strip at the first base tile
    let base_tile = slide.payloads[0][0].0;
    slide.poke_offset(slide.payload_offset_fields[4], base_tile);
    assert_unchanged_on_error(&slide.data, |e| {
        matches!(e, DeidError::PayloadOverlap { directory: 4, .. })
    });
}

#[test]
fn test_label_overlapping_kept_ifd_is_refused() {
    for bigtiff in [false, true] {
        let mut slide = at2_slide(ByteOrderType::LittleEndian, bigtiff, "SCANNER123");
        let first_ifd = slide.ifd_offsets[0];
        slide.poke_offset(slide.payload_offset_fields[4], first_ifd);
        slide.poke_offset(slide.payload_count_fields[4], 64);
        assert_unchanged_on_error(&slide.data, |e| {
            matches!(e, DeidError::PayloadOverlap { directory: 4, offset } if *offset == first_ifd)
        });
    }
}

#[test]
fn test_label_overlapping_kept_description_is_refused() {
    let mut slide = at2_slide(ByteOrderType::BigEndian, false, "SCANNER123");
    let (thumbnail_description, _) = slide.descriptions[1].unwrap();
    slide.poke_offset(slide.payload_offset_fields[4], thumbnail_description + 10);
    slide.poke_offset(slide.payload_count_fields[4], 8);
    assert_unchanged_on_error(&slide.data, |e| {
        matches!(e, DeidError::PayloadOverlap { directory: 4, .. })
    });
}

#[test]
fn test_non_ascii_identifier_is_refused() {
    let mut slide = at2_slide(ByteOrderType::LittleEndian, false, "SCANNERQQ");
    let pos = find(&slide.data, b"SCANNERQQ").unwrap();
    slide.data[pos + 7] = 0xE9;
    assert_unchanged_on_error(&slide.data, |e| {
        matches!(e, DeidError::DescriptionMissing { directory: 0 })
    });
}

#[test]
fn test_label_payload_out_of_bounds_is_refused() {
    let mut slide = at2_slide(ByteOrderType::LittleEndian, false, "SCANNER123");
    let past_end = slide.data.len() as u64 - 10;
    slide.poke_offset(slide.payload_offset_fields[4], past_end);
    assert_unchanged_on_error(&slide.data, |e| {
        matches!(e, DeidError::PayloadOutOfBounds { directory: 4, .. })
    });
}

#[test]
fn test_auxiliary_only_chain_is_refused() {
    let slide = TiffBuilder::new()
        .add_ifd(
            IfdBuilder::striped(100, 100, 1, 50, 1)
                .with_subfile_type(1)
                .with_description(&super::test_utils::at2_description("X1234567")),
        )
        .add_ifd(
            IfdBuilder::striped(100, 100, 1, 50, 2)
                .with_subfile_type(9)
                .with_description(&super::test_utils::at2_description("X1234567")),
        )
        .build();
    assert_unchanged_on_error(&slide.data, |e| matches!(e, DeidError::NoPrimaryDirectory));
}

#[test]
fn test_motic_without_tiles_is_refused() {
    let slide = TiffBuilder::new()
        .add_ifd(
            IfdBuilder::striped(100, 100, 1, 50, 1)
                .with_description(&super::test_utils::motic_description("B1234567")),
        )
        .build();
    assert_unchanged_on_error(&slide.data, |e| matches!(e, DeidError::NoTiledDirectoryFound));
}
