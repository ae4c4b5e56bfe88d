//! IFD (Image File Directory) parsing.
//!
//! ```text
//! Classic TIFF                         BigTIFF
//! +0   u16  entry count                +0   u64  entry count
//! +2   12-byte entries...              +8   20-byte entries...
//!      tag u16, type u16,                   tag u16, type u16,
//!      count u32, value/offset u32          count u64, value/offset u64
//! +2+12n  u32 next IFD offset          +8+20n  u64 next IFD offset
//! ```
//!
//! Every entry remembers the absolute file position of its value field so
//! that a value can later be overwritten where it lives, inline or not.

use crate::error::TiffError;

use super::parser::{ByteOrder, TiffHeader};
use super::tags::{FieldType, TiffTag};

// =============================================================================
// IfdEntry
// =============================================================================

/// A single tag entry of an IFD.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IfdEntry {
    /// Numeric tag ID
    pub tag_id: u16,

    /// Parsed field type, `None` if the type is unknown
    pub field_type: Option<FieldType>,

    /// Field type exactly as stored
    pub field_type_raw: u16,

    /// Number of values
    pub count: u64,

    /// Raw value/offset field (4 significant bytes in classic TIFF, 8 in BigTIFF)
    pub value_offset_bytes: [u8; 8],

    /// Whether the value is stored inside the entry itself
    pub is_inline: bool,

    /// Absolute file position of the value/offset field
    pub value_field_position: u64,
}

impl IfdEntry {
    /// Interpreted tag, if it is one we know.
    pub fn tag(&self) -> Option<TiffTag> {
        TiffTag::from_u16(self.tag_id)
    }

    /// Total size of the value in bytes, `None` for unknown field types.
    pub fn value_byte_size(&self) -> Option<u64> {
        let field_type = self.field_type?;
        (field_type.size_in_bytes() as u64).checked_mul(self.count)
    }

    /// External offset held in the value field (meaningless for inline values).
    pub fn value_offset(&self, header: &TiffHeader) -> u64 {
        header.read_offset(&self.value_offset_bytes)
    }

    /// Absolute position of the first value byte, inline or external.
    pub fn value_position(&self, header: &TiffHeader) -> u64 {
        if self.is_inline {
            self.value_field_position
        } else {
            self.value_offset(header)
        }
    }

    /// Single inline unsigned integer value (Short, Long or Long8 with count 1).
    pub fn inline_u64(&self, byte_order: ByteOrder) -> Option<u64> {
        if !self.is_inline || self.count != 1 {
            return None;
        }
        match self.field_type? {
            FieldType::Short => Some(byte_order.read_u16(&self.value_offset_bytes) as u64),
            FieldType::Long | FieldType::Ifd => {
                Some(byte_order.read_u32(&self.value_offset_bytes) as u64)
            }
            FieldType::Long8 | FieldType::Ifd8 => {
                Some(byte_order.read_u64(&self.value_offset_bytes))
            }
            _ => None,
        }
    }
}

// =============================================================================
// Ifd
// =============================================================================

/// A parsed IFD and its position in the file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ifd {
    /// File offset of the IFD (where the entry count lives)
    pub offset: u64,

    /// Entries in stored order
    pub entries: Vec<IfdEntry>,

    /// Offset of the next IFD, 0 at the end of the chain
    pub next_ifd_offset: u64,

    /// Absolute position of the next-IFD pointer field
    pub next_pointer_position: u64,
}

impl Ifd {
    /// Number of bytes an IFD with `entry_count` entries occupies,
    /// including the count and the next-IFD pointer.
    ///
    /// Returns `None` if the size does not fit in memory addressing.
    pub fn calculate_size(entry_count: u64, header: &TiffHeader) -> Option<usize> {
        let table = entry_count.checked_mul(header.ifd_entry_size() as u64)?;
        let total = table
            .checked_add(header.ifd_count_size() as u64)?
            .checked_add(header.ifd_next_offset_size() as u64)?;
        usize::try_from(total).ok()
    }

    /// Parse an IFD from `bytes`, which must start at file offset `offset`
    /// and span exactly [`Ifd::calculate_size`] bytes.
    pub fn parse(bytes: &[u8], offset: u64, header: &TiffHeader) -> Result<Self, TiffError> {
        let count_size = header.ifd_count_size();
        if bytes.len() < count_size {
            return Err(TiffError::InvalidIfdOffset(offset));
        }

        let entry_count = header.read_entry_count(bytes);
        let expected = Ifd::calculate_size(entry_count, header)
            .ok_or(TiffError::InvalidIfdOffset(offset))?;
        if bytes.len() < expected {
            return Err(TiffError::InvalidIfdOffset(offset));
        }

        let entry_size = header.ifd_entry_size();
        let byte_order = header.byte_order;
        let mut entries = Vec::with_capacity(entry_count as usize);

        for i in 0..entry_count as usize {
            let start = count_size + i * entry_size;
            let raw = &bytes[start..start + entry_size];

            let tag_id = byte_order.read_u16(&raw[0..2]);
            let field_type_raw = byte_order.read_u16(&raw[2..4]);
            let field_type = FieldType::from_u16(field_type_raw);

            let (count, value_field) = if header.is_bigtiff {
                (byte_order.read_u64(&raw[4..12]), &raw[12..20])
            } else {
                (byte_order.read_u32(&raw[4..8]) as u64, &raw[8..12])
            };

            let mut value_offset_bytes = [0u8; 8];
            value_offset_bytes[..value_field.len()].copy_from_slice(value_field);

            let is_inline = field_type
                .map(|t| t.fits_inline(count, header.is_bigtiff))
                .unwrap_or(false);

            entries.push(IfdEntry {
                tag_id,
                field_type,
                field_type_raw,
                count,
                value_offset_bytes,
                is_inline,
                value_field_position: offset + (start + entry_size - value_field.len()) as u64,
            });
        }

        let next_start = count_size + entry_count as usize * entry_size;
        let next_ifd_offset = header.read_offset(&bytes[next_start..]);

        Ok(Ifd {
            offset,
            entries,
            next_ifd_offset,
            next_pointer_position: offset + next_start as u64,
        })
    }

    /// Find an entry by tag.
    pub fn get_entry_by_tag(&self, tag: TiffTag) -> Option<&IfdEntry> {
        let id = tag.as_u16();
        self.entries.iter().find(|e| e.tag_id == id)
    }

    /// Single inline unsigned value of a tag, if present.
    pub fn get_u64(&self, tag: TiffTag, byte_order: ByteOrder) -> Option<u64> {
        self.get_entry_by_tag(tag)?.inline_u64(byte_order)
    }

    /// Number of entries in the IFD.
    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }
}
