use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use bytes::Bytes;

use crate::error::IoError;

/// Trait for reading byte ranges from a slide file.
///
/// The TIFF parser only ever asks for exact ranges at absolute offsets, so
/// it works the same against a file on disk or an in-memory buffer.
pub trait RangeReader {
    /// Read exactly `len` bytes starting at `offset`.
    ///
    /// Returns an error if the range is out of bounds or if the read fails.
    fn read_exact_at(&mut self, offset: u64, len: usize) -> Result<Bytes, IoError>;

    /// Get the total size of the resource in bytes.
    fn size(&self) -> u64;

    /// Get a unique identifier for this resource (for logging).
    fn identifier(&self) -> &str;
}

/// A [`RangeReader`] that can also overwrite bytes in place.
///
/// Implementations must never change the length of the underlying resource:
/// a write that would cross the end of the file is rejected.
pub trait RangeWriter: RangeReader {
    /// Overwrite `bytes.len()` bytes starting at `offset`.
    fn write_all_at(&mut self, offset: u64, bytes: &[u8]) -> Result<(), IoError>;

    /// Flush buffered writes to the underlying storage.
    fn flush(&mut self) -> Result<(), IoError>;
}

/// Seekable slide file, either a real file or any `Read + Seek` stand-in.
///
/// The length is captured once when the handle is created; every later read
/// and write is checked against it.
#[derive(Debug)]
pub struct SlideFile<F> {
    inner: F,
    size: u64,
    identifier: String,
}

impl SlideFile<File> {
    /// Open a slide for read-modify-write.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, IoError> {
        let path = path.as_ref();
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        Self::new(file, path.display().to_string())
    }

    /// Open a slide for inspection only.
    pub fn open_read_only(path: impl AsRef<Path>) -> Result<Self, IoError> {
        let path = path.as_ref();
        let file = File::open(path)?;
        Self::new(file, path.display().to_string())
    }
}

impl<F: Seek> SlideFile<F> {
    /// Wrap an already-open handle.
    pub fn new(mut inner: F, identifier: impl Into<String>) -> Result<Self, IoError> {
        let size = inner.seek(SeekFrom::End(0))?;
        Ok(Self {
            inner,
            size,
            identifier: identifier.into(),
        })
    }

    /// Give back the wrapped handle.
    pub fn into_inner(self) -> F {
        self.inner
    }

    fn check_range(&self, offset: u64, len: u64) -> Result<(), IoError> {
        match offset.checked_add(len) {
            Some(end) if end <= self.size => Ok(()),
            _ => Err(IoError::RangeOutOfBounds {
                offset,
                requested: len,
                size: self.size,
            }),
        }
    }
}

impl<F: Read + Seek> RangeReader for SlideFile<F> {
    fn read_exact_at(&mut self, offset: u64, len: usize) -> Result<Bytes, IoError> {
        self.check_range(offset, len as u64)?;
        self.inner.seek(SeekFrom::Start(offset))?;
        let mut buf = vec![0u8; len];
        self.inner.read_exact(&mut buf)?;
        Ok(Bytes::from(buf))
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn identifier(&self) -> &str {
        &self.identifier
    }
}

impl<F: Read + Write + Seek> RangeWriter for SlideFile<F> {
    fn write_all_at(&mut self, offset: u64, bytes: &[u8]) -> Result<(), IoError> {
        self.check_range(offset, bytes.len() as u64)?;
        self.inner.seek(SeekFrom::Start(offset))?;
        self.inner.write_all(bytes)?;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), IoError> {
        self.inner.flush()?;
        Ok(())
    }
}
