//! Container dump and restore
//!
//! The index file is a header followed by one record per chain node, walking
//! from the tail back to the head. Files whose upload has not completed, and
//! deleted files still waiting for their last reader, are written as holes
//! (and dropped entirely when they trail the chain), so a dump only ever
//! describes committed, live blobs.

use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use bytes::BytesMut;
use parking_lot::Mutex;

use crate::error::{AtlasError, Result};
use crate::persist;
use crate::size_class;
use crate::space::codec::{ContainerHeader, FileRecord, HoleRecord, Record};
use crate::space::{BlobFile, FileStub, Space};

use super::{Container, ContainerState};

impl Container {
    /// Rewrite the index file if anything changed since the last dump.
    ///
    /// Returns whether a dump was written.
    pub fn dump(&self) -> Result<bool> {
        let data = {
            let mut state = self.state.lock();
            if !state.dirty {
                return Ok(false);
            }
            let data = state.encode(self.id, self.size);
            state.dirty = false;
            data
        };

        if let Err(e) = persist::write_atomic(&self.index_path, &data) {
            self.state.lock().dirty = true;
            return Err(e);
        }
        tracing::debug!("Dumped container {} ({} bytes)", self.id, data.len());
        Ok(true)
    }

    /// Rebuild a container from its index file.
    ///
    /// Returns the container together with every restored file, for the
    /// caller to register in its path index.
    pub fn restore(dir: &Path, index_path: &Path) -> Result<(Arc<Self>, Vec<Arc<BlobFile>>)> {
        let mut reader = persist::open_reader(index_path)?;
        let header = ContainerHeader::decode(&mut reader)?;

        if let Some(named) = Self::parse_index_id(index_path) {
            if named != header.id {
                return Err(AtlasError::Corruption(format!(
                    "{} holds container {}",
                    index_path.display(),
                    header.id
                )));
            }
        }
        if header.size == 0 {
            return Err(AtlasError::Corruption(format!(
                "container {} has zero size",
                header.id
            )));
        }

        let data_path = Self::data_path_for(dir, header.id);
        let file = Self::open_data_file(&data_path)?;
        if !header.created || file.metadata()?.len() < header.size {
            persist::preallocate(&file, header.size)?;
        }

        let container = Arc::new(Self {
            id: header.id,
            size: header.size,
            data_path,
            index_path: index_path.to_path_buf(),
            file,
            state: Mutex::new(ContainerState::new(true)),
        });

        let files = {
            let mut state = container.state.lock();
            let files = state.restore_chain(&container, &mut reader)?;
            state.verify_counters(&header)?;
            // Rewrite once when the header said the file was never created
            state.dirty = !header.created;
            files
        };

        tracing::info!(
            "Restored container {}: {} files, {} bytes used",
            container.id,
            files.len(),
            container.stats().used
        );
        Ok((container, files))
    }
}

impl ContainerState {
    /// Serialize header and chain
    pub(crate) fn encode(&self, id: u64, size: u64) -> BytesMut {
        let mut records = Vec::with_capacity(self.chain.len());
        let mut header = ContainerHeader {
            id,
            size,
            file_count: self.file_count,
            file_size: self.file_size,
            file_real_size: self.file_real_size,
            created: self.created,
        };

        for (_, node) in self.chain.iter_rev() {
            let hole = HoleRecord {
                size_class: node.class,
                offset: node.offset,
            };
            match &node.space {
                Space::File(file) if file.is_sealed() && !file.is_deleted() => {
                    records.push(Record::File(FileRecord {
                        name: file.name(),
                        time: file.time(),
                        size: file.size(),
                        md5: file.md5(),
                        hole,
                    }))
                }
                // Pending uploads and deleted files still held by a reader
                Space::File(file) => {
                    header.file_count -= 1;
                    header.file_size -= file.size();
                    header.file_real_size -= node.size();
                    if !records.is_empty() {
                        records.push(Record::Hole(hole));
                    }
                }
                Space::Hole if records.is_empty() => {}
                Space::Hole => records.push(Record::Hole(hole)),
            }
        }

        let mut buf = BytesMut::with_capacity(64 + records.len() * 48);
        header.encode(&mut buf);
        for record in &records {
            record.encode(&mut buf);
        }
        buf
    }

    /// Rebuild the chain from records ordered tail to head
    fn restore_chain<R: Read>(
        &mut self,
        container: &Arc<Container>,
        reader: &mut R,
    ) -> Result<Vec<Arc<BlobFile>>> {
        let mut files = Vec::new();

        while let Some(record) = Record::decode(reader)? {
            let geometry = record.geometry();
            if geometry.size_class == 0 {
                return Err(AtlasError::Corruption(format!(
                    "zero size class at offset {}",
                    geometry.offset
                )));
            }
            let end = geometry
                .offset
                .checked_add(size_class::size_of(geometry.size_class))
                .filter(|&end| end <= container.size)
                .ok_or_else(|| {
                    AtlasError::Corruption(format!(
                        "node at {} overruns container {}",
                        geometry.offset, container.id
                    ))
                })?;

            match self.chain.head() {
                Some(head) => {
                    let successor = self.chain.node(head).offset;
                    if end != successor {
                        return Err(AtlasError::Corruption(format!(
                            "node at {} ends at {} but next node starts at {}",
                            geometry.offset, end, successor
                        )));
                    }
                }
                None if matches!(record, Record::Hole(_)) => {
                    return Err(AtlasError::Corruption("chain tail is a hole".to_string()));
                }
                None => {}
            }

            let id = self
                .chain
                .push_front(geometry.offset, geometry.size_class, Space::Hole);
            match record {
                Record::Hole(hole) => self.holes.add(hole.size_class, hole.offset, id),
                Record::File(file) => {
                    if file.size == 0 || file.size > size_class::size_of(geometry.size_class) {
                        return Err(AtlasError::Corruption(format!(
                            "file {} of {} bytes recorded in class {}",
                            file.name, file.size, geometry.size_class
                        )));
                    }
                    let stub = FileStub {
                        name: file.name,
                        size: file.size,
                        time: file.time,
                    };
                    let blob = Arc::new(BlobFile::restored(
                        &stub,
                        file.md5,
                        container,
                        id,
                        geometry.offset,
                        geometry.size_class,
                    ));
                    self.chain.node_mut(id).space = Space::File(Arc::clone(&blob));
                    self.file_count += 1;
                    self.file_size += stub.size;
                    self.file_real_size += size_class::size_of(geometry.size_class);
                    files.push(blob);
                }
            }
        }

        if let Some(head) = self.chain.head() {
            let offset = self.chain.node(head).offset;
            if offset != 0 {
                return Err(AtlasError::Corruption(format!(
                    "chain of container {} starts at {}",
                    container.id, offset
                )));
            }
        }

        files.reverse();
        Ok(files)
    }

    fn verify_counters(&self, header: &ContainerHeader) -> Result<()> {
        let restored = (self.file_count, self.file_size, self.file_real_size);
        let recorded = (header.file_count, header.file_size, header.file_real_size);
        if restored != recorded {
            return Err(AtlasError::Corruption(format!(
                "container {} counters {:?} do not match its records {:?}",
                header.id, recorded, restored
            )));
        }
        Ok(())
    }
}
