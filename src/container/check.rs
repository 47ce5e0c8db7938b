//! Container integrity check

use std::io::Read;
use std::sync::Arc;

use crate::error::{AtlasError, Result};
use crate::size_class;
use crate::space::{BlobFile, Space};

use super::{Container, ContainerState};

const CHECK_CHUNK: usize = 64 * 1024;

impl Container {
    /// Verify chain, free list, counters and stored content.
    ///
    /// Returns the first violation found as `Integrity`.
    pub fn check(&self) -> Result<()> {
        let files = {
            let state = self.state.lock();
            state
                .check_structure(self.size)
                .map_err(|e| AtlasError::Integrity(format!("container {}: {}", self.id, e)))?;
            state
                .chain
                .iter()
                .filter_map(|(_, node)| match &node.space {
                    Space::File(file) if file.is_sealed() => Some(Arc::clone(file)),
                    _ => None,
                })
                .collect::<Vec<_>>()
        };

        for file in files {
            self.check_content(&file)?;
        }
        Ok(())
    }

    fn check_content(&self, file: &Arc<BlobFile>) -> Result<()> {
        let mut reader = match file.reader() {
            Ok(reader) => reader,
            // Deleted since the snapshot
            Err(AtlasError::FileDeleted(_)) => return Ok(()),
            Err(e) => return Err(e),
        };

        let mut ctx = md5::Context::new();
        let mut buf = vec![0u8; CHECK_CHUNK];
        let mut read = 0u64;
        loop {
            let n = reader.read(&mut buf)?;
            if n == 0 {
                break;
            }
            ctx.consume(&buf[..n]);
            read += n as u64;
        }

        if read != file.size() {
            return Err(AtlasError::Integrity(format!(
                "container {}: {} has {} of {} bytes",
                self.id,
                file.name(),
                read,
                file.size()
            )));
        }
        let digest = ctx.compute().0;
        if digest != file.md5() {
            return Err(AtlasError::Integrity(format!(
                "container {}: {} md5 {:x} does not match stored {}",
                self.id,
                file.name(),
                md5::Digest(digest),
                file.md5_hex()
            )));
        }
        Ok(())
    }
}

impl ContainerState {
    fn check_structure(&self, capacity: u64) -> std::result::Result<(), String> {
        let mut expected_offset = 0u64;
        let mut holes = 0usize;
        let mut hole_size = 0u64;
        let (mut file_count, mut file_size, mut file_real_size) = (0u64, 0u64, 0u64);
        let mut last = None;

        for (id, node) in self.chain.iter() {
            if node.offset != expected_offset {
                return Err(format!(
                    "node at {} should start at {}",
                    node.offset, expected_offset
                ));
            }
            if node.class == 0 {
                return Err(format!("zero size class at {}", node.offset));
            }
            match &node.space {
                Space::Hole => {
                    if !self.holes.contains(node.class, node.offset, id) {
                        return Err(format!("hole at {} missing from free list", node.offset));
                    }
                    holes += 1;
                    hole_size += node.size();
                }
                Space::File(file) => {
                    if file.offset() != node.offset || file.size_class() != node.class {
                        return Err(format!("{} geometry differs from its node", file.name()));
                    }
                    if file.size() > node.size() {
                        return Err(format!("{} outgrows class {}", file.name(), node.class));
                    }
                    file_count += 1;
                    file_size += file.size();
                    file_real_size += size_class::size_of(node.class);
                }
            }
            expected_offset = node.end();
            last = Some(id);
        }

        if last != self.chain.tail() {
            return Err("tail is not the last node".to_string());
        }
        if expected_offset > capacity {
            return Err(format!("used extent {} exceeds capacity {}", expected_offset, capacity));
        }
        if holes != self.holes.len() || hole_size != self.holes.total_size() {
            return Err(format!(
                "free list tracks {} holes ({} bytes), chain has {} ({} bytes)",
                self.holes.len(),
                self.holes.total_size(),
                holes,
                hole_size
            ));
        }
        if (file_count, file_size, file_real_size)
            != (self.file_count, self.file_size, self.file_real_size)
        {
            return Err(format!(
                "counters ({}, {}, {}) differ from chain ({}, {}, {})",
                self.file_count,
                self.file_size,
                self.file_real_size,
                file_count,
                file_size,
                file_real_size
            ));
        }
        Ok(())
    }
}
