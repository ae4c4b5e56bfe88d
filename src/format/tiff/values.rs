//! TIFF tag value reading.
//!
//! Values can be stored either inline in the IFD entry (for small values)
//! or at an offset in the file (for larger values like arrays). Array
//! values such as StripOffsets are fetched with one ranged read.

use bytes::Bytes;

use crate::error::TiffError;
use crate::io::RangeReader;

use super::ifd::IfdEntry;
use super::parser::{ByteOrder, TiffHeader};
use super::tags::FieldType;

// =============================================================================
// ValueReader
// =============================================================================

/// Reads tag values from a TIFF file.
///
/// This struct combines a RangeReader with TIFF header information to
/// read values respecting the file's byte order and format.
pub struct ValueReader<'a, R: RangeReader> {
    reader: &'a mut R,
    header: &'a TiffHeader,
}

impl<'a, R: RangeReader> ValueReader<'a, R> {
    /// Create a new ValueReader.
    pub fn new(reader: &'a mut R, header: &'a TiffHeader) -> Self {
        Self { reader, header }
    }

    /// Get the byte order from the header.
    #[inline]
    pub fn byte_order(&self) -> ByteOrder {
        self.header.byte_order
    }

    /// Read raw bytes for an IFD entry's value.
    ///
    /// For inline values, returns the bytes from the entry.
    /// For offset values, fetches the bytes from the file.
    pub fn read_bytes(&mut self, entry: &IfdEntry) -> Result<Bytes, TiffError> {
        let size = entry
            .value_byte_size()
            .ok_or(TiffError::UnknownFieldType(entry.field_type_raw))?;

        if entry.is_inline {
            return Ok(Bytes::copy_from_slice(
                &entry.value_offset_bytes[..size as usize],
            ));
        }

        let len = usize::try_from(size).map_err(|_| TiffError::InvalidTagValue {
            tag: "unknown",
            message: format!("value of {} bytes cannot be addressed", size),
        })?;
        let offset = entry.value_offset(self.header);
        Ok(self.reader.read_exact_at(offset, len)?)
    }

    /// Read an array of unsigned values from an entry, widened to u64.
    ///
    /// This is how StripOffsets/StripByteCounts and TileOffsets/TileByteCounts
    /// are loaded; a single value is returned as a one-element array.
    pub fn read_u64_array(&mut self, entry: &IfdEntry) -> Result<Vec<u64>, TiffError> {
        let field_type = entry
            .field_type
            .ok_or(TiffError::UnknownFieldType(entry.field_type_raw))?;

        if !field_type.is_unsigned_integer() {
            return Err(TiffError::InvalidTagValue {
                tag: entry.tag().map(|t| t.name()).unwrap_or("unknown"),
                message: format!("expected Short, Long or Long8 array, got {:?}", field_type),
            });
        }

        if entry.count == 0 {
            return Ok(Vec::new());
        }

        let bytes = self.read_bytes(entry)?;
        Ok(parse_u64_array(
            &bytes,
            entry.count as usize,
            field_type,
            self.header.byte_order,
        ))
    }

    /// Read a string value from an entry (ASCII type).
    ///
    /// The value is cut at the first NUL; trailing padding is not returned.
    pub fn read_string(&mut self, entry: &IfdEntry) -> Result<String, TiffError> {
        let bytes = self.read_ascii_bytes(entry)?;
        let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
        Ok(String::from_utf8_lossy(&bytes[..end]).into_owned())
    }

    /// Read the full stored bytes of an ASCII entry, terminator and padding included.
    pub fn read_ascii_bytes(&mut self, entry: &IfdEntry) -> Result<Bytes, TiffError> {
        let field_type = entry
            .field_type
            .ok_or(TiffError::UnknownFieldType(entry.field_type_raw))?;

        if field_type != FieldType::Ascii {
            return Err(TiffError::InvalidTagValue {
                tag: entry.tag().map(|t| t.name()).unwrap_or("unknown"),
                message: format!("expected Ascii type for string, got {:?}", field_type),
            });
        }

        self.read_bytes(entry)
    }
}

// =============================================================================
// Convenience functions for reading from bytes directly
// =============================================================================

/// Parse an array of unsigned values from raw bytes, widening to u64.
///
/// Elements that would run past the end of `bytes` are dropped.
pub fn parse_u64_array(
    bytes: &[u8],
    count: usize,
    field_type: FieldType,
    byte_order: ByteOrder,
) -> Vec<u64> {
    let width = field_type.size_in_bytes();
    bytes
        .chunks_exact(width)
        .take(count)
        .filter_map(|chunk| match width {
            2 => Some(byte_order.read_u16(chunk) as u64),
            4 => Some(byte_order.read_u32(chunk) as u64),
            8 => Some(byte_order.read_u64(chunk)),
            _ => None,
        })
        .collect()
}

// =============================================================================
// Tests
// =============================================================================
