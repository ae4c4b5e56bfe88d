//! Test utilities for integration tests.
//!
//! Builds synthetic SVS-like files: classic TIFF or BigTIFF, either byte
//! order, with tiled pyramid levels, a striped thumbnail and label/macro
//! sub-images. The builder records where everything landed so tests can
//! assert on exact byte positions.

use std::fs;
use std::path::{Path, PathBuf};

// =============================================================================
// Constants
// =============================================================================

/// Size of the single label strip produced by the slide helpers.
pub const LABEL_BYTES: usize = 4096;

const TAG_NEW_SUBFILE_TYPE: u16 = 254;
const TAG_IMAGE_WIDTH: u16 = 256;
const TAG_IMAGE_LENGTH: u16 = 257;
const TAG_IMAGE_DESCRIPTION: u16 = 270;
const TAG_STRIP_OFFSETS: u16 = 273;
const TAG_STRIP_BYTE_COUNTS: u16 = 279;
const TAG_TILE_WIDTH: u16 = 322;
const TAG_TILE_LENGTH: u16 = 323;
const TAG_TILE_OFFSETS: u16 = 324;
const TAG_TILE_BYTE_COUNTS: u16 = 325;

const TYPE_ASCII: u16 = 2;
const TYPE_SHORT: u16 = 3;
const TYPE_LONG: u16 = 4;
const TYPE_LONG8: u16 = 16;

// =============================================================================
// TIFF File Builders
// =============================================================================

#[derive(Clone, Copy, Debug)]
pub enum ByteOrderType {
    LittleEndian,
    BigEndian,
}

impl ByteOrderType {
    fn put(self, data: &mut Vec<u8>, value: u64, width: usize) {
        let bytes = value.to_be_bytes();
        let be = &bytes[8 - width..];
        match self {
            ByteOrderType::BigEndian => data.extend_from_slice(be),
            ByteOrderType::LittleEndian => data.extend(be.iter().rev()),
        }
    }

    pub fn read(self, bytes: &[u8]) -> u64 {
        let iter: Box<dyn Iterator<Item = &u8>> = match self {
            ByteOrderType::BigEndian => Box::new(bytes.iter()),
            ByteOrderType::LittleEndian => Box::new(bytes.iter().rev()),
        };
        iter.fold(0u64, |acc, &b| (acc << 8) | b as u64)
    }
}

/// Builder for one IFD.
#[derive(Clone)]
pub struct IfdBuilder {
    subfile_type: Option<u32>,
    tiled: bool,
    width: u32,
    height: u32,
    description: Option<Vec<u8>>,
    chunks: Vec<Vec<u8>>,
}

impl IfdBuilder {
    /// A tiled pyramid level with `tiles` tiles of `tile_len` bytes.
    pub fn tiled_level(width: u32, height: u32, tiles: usize, tile_len: usize, fill: u8) -> Self {
        Self {
            subfile_type: None,
            tiled: true,
            width,
            height,
            description: None,
            chunks: (0..tiles)
                .map(|i| vec![fill.wrapping_add(i as u8); tile_len])
                .collect(),
        }
    }

    /// A striped image with `strips` strips of `strip_len` bytes.
    pub fn striped(width: u32, height: u32, strips: usize, strip_len: usize, fill: u8) -> Self {
        Self {
            tiled: false,
            ..Self::tiled_level(width, height, strips, strip_len, fill)
        }
    }

    pub fn with_subfile_type(mut self, value: u32) -> Self {
        self.subfile_type = Some(value);
        self
    }

    /// NUL-terminated ASCII description.
    pub fn with_description(mut self, text: &str) -> Self {
        let mut bytes = text.as_bytes().to_vec();
        bytes.push(0);
        self.description = Some(bytes);
        self
    }

    /// Description whose stored value carries extra bytes after the terminator.
    pub fn with_description_trailer(mut self, text: &str, trailer: &[u8]) -> Self {
        let mut bytes = text.as_bytes().to_vec();
        bytes.push(0);
        bytes.extend_from_slice(trailer);
        self.description = Some(bytes);
        self
    }
}

/// A built file and where its parts were placed.
pub struct BuiltTiff {
    pub data: Vec<u8>,
    pub byte_order: ByteOrderType,
    pub is_bigtiff: bool,
    pub ifd_offsets: Vec<u64>,
    /// Position of each IFD's next-IFD pointer
    pub next_pointers: Vec<u64>,
    /// (value position, stored length) of each IFD's description
    pub descriptions: Vec<Option<(u64, usize)>>,
    /// (offset, length) of each strip or tile
    pub payloads: Vec<Vec<(u64, u64)>>,
    /// Position of the first stored payload offset (inline field or array)
    pub payload_offset_fields: Vec<u64>,
    /// Position of the first stored payload byte count (inline field or array)
    pub payload_count_fields: Vec<u64>,
}

impl BuiltTiff {
    pub fn pointer_width(&self) -> usize {
        if self.is_bigtiff {
            8
        } else {
            4
        }
    }

    /// Overwrite an offset-sized value at `position` in the built bytes.
    pub fn poke_offset(&mut self, position: u64, value: u64) {
        let mut encoded = Vec::new();
        self.byte_order
            .put(&mut encoded, value, self.pointer_width());
        let start = position as usize;
        self.data[start..start + encoded.len()].copy_from_slice(&encoded);
    }

    pub fn read_offset(&self, data: &[u8], position: u64) -> u64 {
        let start = position as usize;
        self.byte_order
            .read(&data[start..start + self.pointer_width()])
    }

    pub fn description_bytes<'a>(&self, data: &'a [u8], index: usize) -> &'a [u8] {
        let (pos, len) = self.descriptions[index].expect("directory has a description");
        &data[pos as usize..pos as usize + len]
    }

    pub fn payload_bytes<'a>(&self, data: &'a [u8], index: usize) -> Vec<&'a [u8]> {
        self.payloads[index]
            .iter()
            .map(|&(o, l)| &data[o as usize..(o + l) as usize])
            .collect()
    }
}

struct Entry {
    tag: u16,
    field_type: u16,
    count: u64,
    value: Vec<u8>,
}

/// Builder for creating test TIFF files.
pub struct TiffBuilder {
    byte_order: ByteOrderType,
    is_bigtiff: bool,
    ifds: Vec<IfdBuilder>,
}

impl TiffBuilder {
    pub fn new() -> Self {
        Self {
            byte_order: ByteOrderType::LittleEndian,
            is_bigtiff: false,
            ifds: Vec::new(),
        }
    }

    pub fn with_byte_order(mut self, order: ByteOrderType) -> Self {
        self.byte_order = order;
        self
    }

    pub fn with_bigtiff(mut self, is_bigtiff: bool) -> Self {
        self.is_bigtiff = is_bigtiff;
        self
    }

    pub fn add_ifd(mut self, ifd: IfdBuilder) -> Self {
        self.ifds.push(ifd);
        self
    }

    /// Build the TIFF file data.
    pub fn build(self) -> BuiltTiff {
        let order = self.byte_order;
        let big = self.is_bigtiff;
        let (header_size, count_size, entry_size, ptr) = if big {
            (16u64, 8usize, 20u64, 8usize)
        } else {
            (8u64, 2usize, 12u64, 4usize)
        };
        let offset_type = if big { TYPE_LONG8 } else { TYPE_LONG };

        let mut data = Vec::new();
        match order {
            ByteOrderType::LittleEndian => data.extend_from_slice(b"II"),
            ByteOrderType::BigEndian => data.extend_from_slice(b"MM"),
        }
        if big {
            order.put(&mut data, 43, 2);
            order.put(&mut data, 8, 2);
            order.put(&mut data, 0, 2);
        } else {
            order.put(&mut data, 42, 2);
        }
        order.put(&mut data, header_size, ptr);

        let mut built = BuiltTiff {
            data: Vec::new(),
            byte_order: order,
            is_bigtiff: big,
            ifd_offsets: Vec::new(),
            next_pointers: Vec::new(),
            descriptions: Vec::new(),
            payloads: Vec::new(),
            payload_offset_fields: Vec::new(),
            payload_count_fields: Vec::new(),
        };

        let last = self.ifds.len().saturating_sub(1);
        for (i, ifd) in self.ifds.iter().enumerate() {
            let ifd_pos = data.len() as u64;
            let n = ifd.chunks.len() as u64;
            let (offsets_tag, counts_tag) = if ifd.tiled {
                (TAG_TILE_OFFSETS, TAG_TILE_BYTE_COUNTS)
            } else {
                (TAG_STRIP_OFFSETS, TAG_STRIP_BYTE_COUNTS)
            };

            let mut entries = vec![
                uint_entry(order, TAG_IMAGE_WIDTH, TYPE_LONG, ifd.width as u64),
                uint_entry(order, TAG_IMAGE_LENGTH, TYPE_LONG, ifd.height as u64),
            ];
            if let Some(v) = ifd.subfile_type {
                entries.push(uint_entry(order, TAG_NEW_SUBFILE_TYPE, TYPE_LONG, v as u64));
            }
            if let Some(desc) = &ifd.description {
                entries.push(Entry {
                    tag: TAG_IMAGE_DESCRIPTION,
                    field_type: TYPE_ASCII,
                    count: desc.len() as u64,
                    value: desc.clone(),
                });
            }
            if ifd.tiled {
                entries.push(uint_entry(order, TAG_TILE_WIDTH, TYPE_SHORT, 256));
                entries.push(uint_entry(order, TAG_TILE_LENGTH, TYPE_SHORT, 256));
            }
            let mut counts = Vec::new();
            for chunk in &ifd.chunks {
                order.put(&mut counts, chunk.len() as u64, ptr);
            }
            entries.push(Entry {
                tag: offsets_tag,
                field_type: offset_type,
                count: n,
                value: vec![0; n as usize * ptr],
            });
            entries.push(Entry {
                tag: counts_tag,
                field_type: offset_type,
                count: n,
                value: counts,
            });
            entries.sort_by_key(|e| e.tag);

            // Layout: table, external values, payload chunks
            let table_end = ifd_pos + count_size as u64 + entries.len() as u64 * entry_size + ptr as u64;
            let mut cursor = table_end;
            let mut external = Vec::with_capacity(entries.len());
            for entry in &entries {
                if entry.value.len() > ptr {
                    external.push(Some(cursor));
                    cursor += entry.value.len() as u64;
                } else {
                    external.push(None);
                }
            }
            let mut chunk_positions = Vec::new();
            for chunk in &ifd.chunks {
                chunk_positions.push(cursor);
                cursor += chunk.len() as u64;
            }

            let offsets_idx = entries
                .iter()
                .position(|e| e.tag == offsets_tag)
                .expect("offsets entry");
            let mut offsets = Vec::new();
            for &p in &chunk_positions {
                order.put(&mut offsets, p, ptr);
            }
            entries[offsets_idx].value = offsets;

            order.put(&mut data, entries.len() as u64, count_size);
            let mut description = None;
            let mut offsets_field = 0;
            let mut counts_field = 0;
            for (entry, ext) in entries.iter().zip(&external) {
                order.put(&mut data, entry.tag as u64, 2);
                order.put(&mut data, entry.field_type as u64, 2);
                order.put(&mut data, entry.count, ptr);
                let field_pos = data.len() as u64;
                let value_pos = match ext {
                    Some(pos) => {
                        order.put(&mut data, *pos, ptr);
                        *pos
                    }
                    None => {
                        let mut field = entry.value.clone();
                        field.resize(ptr, 0);
                        data.extend_from_slice(&field);
                        field_pos
                    }
                };
                if entry.tag == TAG_IMAGE_DESCRIPTION {
                    description = Some((value_pos, entry.value.len()));
                }
                if entry.tag == offsets_tag {
                    offsets_field = value_pos;
                }
                if entry.tag == counts_tag {
                    counts_field = value_pos;
                }
            }

            built.ifd_offsets.push(ifd_pos);
            built.next_pointers.push(data.len() as u64);
            let next = if i == last { 0 } else { cursor };
            order.put(&mut data, next, ptr);

            for (entry, ext) in entries.iter().zip(&external) {
                if ext.is_some() {
                    data.extend_from_slice(&entry.value);
                }
            }
            for chunk in &ifd.chunks {
                data.extend_from_slice(chunk);
            }
            assert_eq!(data.len() as u64, cursor);

            built.descriptions.push(description);
            built.payload_offset_fields.push(offsets_field);
            built.payload_count_fields.push(counts_field);
            built.payloads.push(
                chunk_positions
                    .iter()
                    .zip(&ifd.chunks)
                    .map(|(&p, c)| (p, c.len() as u64))
                    .collect(),
            );
        }

        built.data = data;
        built
    }
}

impl Default for TiffBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn uint_entry(order: ByteOrderType, tag: u16, field_type: u16, value: u64) -> Entry {
    let width = if field_type == TYPE_SHORT { 2 } else { 4 };
    let mut bytes = Vec::new();
    order.put(&mut bytes, value, width);
    Entry {
        tag,
        field_type,
        count: 1,
        value: bytes,
    }
}

// =============================================================================
// Descriptions
// =============================================================================

pub fn at2_description(identifier: &str) -> String {
    format!(
        "Aperio Image Library v12.0.5\r\n46000x32914 [0,100 46000x32914] (256x256) JPEG/RGB Q=70\
         |AppMag = 20|StripeWidth = 2040|ScanScope ID = SS1234|Filename = {}|Date = 12/29/09\
         |Time = 09:59:15|MPP = 0.4990|ScannerType = AT2",
        identifier
    )
}

pub fn at2_thumbnail_description(identifier: &str) -> String {
    format!(
        "Aperio Image Library v12.0.5\r\n46000x32914 -> 1024x732 - |AppMag = 20\
         |ScanScope ID = SS1234|Filename = {}|MPP = 0.4990|ScannerType = AT2",
        identifier
    )
}

pub fn gt450_description(scanner_id: &str) -> String {
    format!(
        "Aperio Leica Biosystems GT450 v1.0.1\r\n80000x60000 [0,0,80000x60000] (256x256) JPEG/YCC Q=91\
         |AppMag = 40|Date = 03/02/2021|Filename = 100234|ScanScope ID = {}|MPP = 0.2630",
        scanner_id
    )
}

pub fn motic_description(barcode: &str) -> String {
    format!(
        "Motic Digital Slide\r\n30000x20000 (256x256) JPEG|AppMag = 20|Barcode = {}|MPP = 0.2600",
        barcode
    )
}

// =============================================================================
// Slides
// =============================================================================

/// Aperio layout: base, thumbnail, two more levels, label, macro.
pub fn aperio_slide(
    order: ByteOrderType,
    bigtiff: bool,
    base_description: &str,
    thumbnail_description: &str,
) -> BuiltTiff {
    TiffBuilder::new()
        .with_byte_order(order)
        .with_bigtiff(bigtiff)
        .add_ifd(IfdBuilder::tiled_level(1024, 768, 4, 300, 0x10).with_description(base_description))
        .add_ifd(IfdBuilder::striped(256, 192, 1, 500, 0x20).with_description(thumbnail_description))
        .add_ifd(IfdBuilder::tiled_level(512, 384, 2, 200, 0x30).with_subfile_type(0))
        .add_ifd(IfdBuilder::tiled_level(256, 192, 1, 120, 0x40).with_subfile_type(0))
        .add_ifd(IfdBuilder::striped(400, 300, 1, LABEL_BYTES, 0x4C).with_subfile_type(1))
        .add_ifd(IfdBuilder::striped(1200, 400, 2, 900, 0x6D).with_subfile_type(9))
        .build()
}

pub fn at2_slide(order: ByteOrderType, bigtiff: bool, identifier: &str) -> BuiltTiff {
    aperio_slide(
        order,
        bigtiff,
        &at2_description(identifier),
        &at2_thumbnail_description(identifier),
    )
}

pub fn gt450_slide(order: ByteOrderType, bigtiff: bool, scanner_id: &str) -> BuiltTiff {
    let description = gt450_description(scanner_id);
    aperio_slide(order, bigtiff, &description, &description)
}

/// Motic layout: base, one level, thumbnail, label, macro.
pub fn motic_slide(order: ByteOrderType, bigtiff: bool, barcode: &str) -> BuiltTiff {
    TiffBuilder::new()
        .with_byte_order(order)
        .with_bigtiff(bigtiff)
        .add_ifd(
            IfdBuilder::tiled_level(1024, 768, 4, 300, 0x10)
                .with_description(&motic_description(barcode)),
        )
        .add_ifd(IfdBuilder::tiled_level(512, 384, 2, 200, 0x30).with_subfile_type(0))
        .add_ifd(IfdBuilder::striped(256, 192, 1, 500, 0x20).with_subfile_type(0))
        .add_ifd(IfdBuilder::striped(400, 300, 1, LABEL_BYTES, 0x4C).with_subfile_type(1))
        .add_ifd(IfdBuilder::striped(1200, 400, 1, 900, 0x6D).with_subfile_type(9))
        .build()
}

// =============================================================================
// Files
// =============================================================================

pub fn write_slide(dir: &Path, name: &str, data: &[u8]) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, data).expect("write slide");
    path
}

pub fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Byte positions where two equal-length buffers differ.
pub fn changed_positions(before: &[u8], after: &[u8]) -> Vec<usize> {
    assert_eq!(before.len(), after.len(), "file length changed");
    before
        .iter()
        .zip(after)
        .enumerate()
        .filter(|(_, (a, b))| a != b)
        .map(|(i, _)| i)
        .collect()
}
