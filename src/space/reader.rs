//! Blob Reader
//!
//! Streams a file's bytes straight out of its container. The reader holds an
//! open reference for its whole lifetime, so a concurrent delete cannot hand
//! the range to another blob while it is being read.

use std::io::{self, Read, Seek, SeekFrom};
use std::sync::Arc;

use crate::container::Container;

use super::BlobFile;

/// Open handle over one stored blob
pub struct BlobReader {
    file: Arc<BlobFile>,
    container: Arc<Container>,
    pos: u64,
}

impl BlobReader {
    /// Wrap an already opened file
    pub(crate) fn new(file: Arc<BlobFile>, container: Arc<Container>) -> Self {
        Self {
            file,
            container,
            pos: 0,
        }
    }

    pub fn file(&self) -> &Arc<BlobFile> {
        &self.file
    }

    /// Exact length of the blob
    pub fn size(&self) -> u64 {
        self.file.size()
    }

    pub fn md5(&self) -> [u8; 16] {
        self.file.md5()
    }

    /// Read the remaining content into memory
    pub fn read_all(&mut self) -> io::Result<Vec<u8>> {
        let mut data = Vec::with_capacity(self.size().saturating_sub(self.pos) as usize);
        self.read_to_end(&mut data)?;
        Ok(data)
    }
}

impl Read for BlobReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let remaining = self.file.size().saturating_sub(self.pos);
        if remaining == 0 || buf.is_empty() {
            return Ok(0);
        }
        let len = (buf.len() as u64).min(remaining) as usize;
        let n = self
            .container
            .read_at(&mut buf[..len], self.file.offset() + self.pos)?;
        self.pos += n as u64;
        Ok(n)
    }
}

impl Seek for BlobReader {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(p) => Some(p),
            SeekFrom::End(delta) => self.file.size().checked_add_signed(delta),
            SeekFrom::Current(delta) => self.pos.checked_add_signed(delta),
        };
        match target {
            Some(p) => {
                self.pos = p;
                Ok(p)
            }
            None => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek before start of blob",
            )),
        }
    }
}

impl Drop for BlobReader {
    fn drop(&mut self) {
        if let Err(e) = self.file.close() {
            tracing::error!("Failed to release {}: {}", self.file.name(), e);
        }
    }
}
