//! TIFF/BigTIFF container reader.
//!
//! # Key Concepts
//!
//! - **Byte order**: TIFF files declare their endianness (II = little-endian, MM = big-endian)
//!   in the header. All multi-byte values, read or written, must respect it.
//!
//! - **Classic TIFF vs BigTIFF**: Classic TIFF uses 2-byte entry counts, 12-byte entries and
//!   32-bit offsets; BigTIFF uses 8-byte counts, 20-byte entries and 64-bit offsets.
//!
//! - **IFD chain**: each IFD ends with the offset of the next one; a zero offset ends the
//!   chain. Cutting the chain means zeroing one of these pointers.
//!
//! - **Inline vs offset values**: Small values are stored inline in the IFD entry,
//!   larger values are stored at an offset pointed to by the entry.

mod container;
mod ifd;
mod parser;
mod tags;
mod values;

pub use container::{Container, DataRange, Directory, SubImageKind};
pub use ifd::{Ifd, IfdEntry};
pub use parser::{ByteOrder, TiffHeader, BIGTIFF_HEADER_SIZE, TIFF_HEADER_SIZE};
pub use tags::{FieldType, TiffTag};
pub use values::{parse_u64_array, ValueReader};
