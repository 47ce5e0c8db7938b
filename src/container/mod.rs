//! Container Module
//!
//! A container is one fixed-capacity data file plus the chain of files and
//! holes covering its used extent.
//!
//! ## Responsibilities
//! - Preallocate and own the backing data file
//! - Place new files (REPLACE / APPEND / INSERT)
//! - Reclaim deleted files and coalesce holes
//! - Dump and restore the chain through the container index file
//! - Verify chain, free list and content integrity
//!
//! ## Files
//! ```text
//! {data_dir}/container_000001.dat   blob bytes, preallocated to `size`
//! {data_dir}/container_000001.idx   header + chain records, tail first
//! ```
//!
//! ## Locking
//! The chain, free list and counters sit behind one mutex. Blob bytes are
//! read and written positionally without holding it.

mod allocator;
mod chain;
mod check;
mod dump;
mod free_list;

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read};
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;

use crate::error::{AtlasError, Result};
use crate::persist;
use crate::size_class;
use crate::space::{BlobFile, FileStub, Space, SpaceInfo};

use chain::Chain;

pub use allocator::{MAX_LEFT_WALK, MAX_RIGHT_WALK};
pub use free_list::HoleFreeList;

/// Bytes copied per read while streaming a blob in
const STREAM_CHUNK: usize = 64 * 1024;

/// Placement strategy for a new file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Reuse a hole of exactly the file's size class
    Replace,
    /// Place after the current tail
    Append,
    /// Split a hole of a larger class
    Insert,
}

impl Strategy {
    /// Order in which strategies are tried across all containers
    pub const ORDER: [Strategy; 3] = [Strategy::Replace, Strategy::Append, Strategy::Insert];
}

/// Mutable state guarded by the container lock
#[derive(Debug)]
pub(crate) struct ContainerState {
    pub(crate) chain: Chain,
    pub(crate) holes: HoleFreeList,
    pub(crate) file_count: u64,
    pub(crate) file_size: u64,
    pub(crate) file_real_size: u64,
    pub(crate) dirty: bool,
    pub(crate) created: bool,
}

impl ContainerState {
    fn new(created: bool) -> Self {
        Self {
            chain: Chain::new(),
            holes: HoleFreeList::new(),
            file_count: 0,
            file_size: 0,
            file_real_size: 0,
            dirty: false,
            created,
        }
    }
}

/// Counters of one container
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContainerStats {
    pub id: u64,
    pub size: u64,
    /// End of the used extent (the tail's end)
    pub used: u64,
    pub file_count: u64,
    pub file_size: u64,
    pub file_real_size: u64,
    pub hole_count: u64,
    pub hole_size: u64,
    pub dirty: bool,
}

/// One fixed-capacity backing file and its allocator
#[derive(Debug)]
pub struct Container {
    id: u64,
    size: u64,
    data_path: PathBuf,
    index_path: PathBuf,
    file: File,
    state: Mutex<ContainerState>,
}

impl Container {
    // =========================================================================
    // Internal Path Constants
    // =========================================================================
    const FILE_PREFIX: &'static str = "container_";
    const DATA_EXT: &'static str = "dat";
    const INDEX_EXT: &'static str = "idx";

    /// Create an empty container with a preallocated data file
    pub fn create(dir: &Path, id: u64, size: u64) -> Result<Arc<Self>> {
        if size == 0 {
            return Err(AtlasError::Config("container size must be positive".to_string()));
        }
        let data_path = Self::data_path_for(dir, id);
        let file = Self::open_data_file(&data_path)?;
        persist::preallocate(&file, size)?;

        let mut state = ContainerState::new(true);
        state.dirty = true;

        tracing::info!("Created container {} ({} bytes) at {}", id, size, data_path.display());

        Ok(Arc::new(Self {
            id,
            size,
            data_path,
            index_path: Self::index_path_for(dir, id),
            file,
            state: Mutex::new(state),
        }))
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Capacity in bytes
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn data_path(&self) -> &Path {
        &self.data_path
    }

    pub fn index_path(&self) -> &Path {
        &self.index_path
    }

    pub fn is_dirty(&self) -> bool {
        self.state.lock().dirty
    }

    /// Force the next dump to rewrite the index
    pub fn mark_dirty(&self) {
        self.state.lock().dirty = true;
    }

    // =========================================================================
    // Allocation
    // =========================================================================

    /// Reserve space for `stub` with one strategy; `None` when it does not fit
    pub fn allocate(self: &Arc<Self>, stub: &FileStub, strategy: Strategy) -> Option<Arc<BlobFile>> {
        if stub.size == 0 {
            return None;
        }
        let class = size_class::class_of(stub.size);
        if size_class::size_of(class) > self.size {
            return None;
        }

        let mut state = self.state.lock();
        let id = state.place(class, strategy, self.size)?;

        let offset = state.chain.node(id).offset;
        let file = Arc::new(BlobFile::new(stub, self, id, offset, class));
        state.chain.node_mut(id).space = Space::File(Arc::clone(&file));

        state.file_count += 1;
        state.file_size += stub.size;
        state.file_real_size += size_class::size_of(class);
        state.dirty = true;

        tracing::debug!(
            "Container {}: {:?} placed {} ({} bytes, class {}) at {}",
            self.id,
            strategy,
            stub.name,
            stub.size,
            class,
            offset
        );
        Some(file)
    }

    /// Return a deleted file's range to the allocator
    pub(crate) fn release(&self, file: &BlobFile) -> Result<()> {
        let mut state = self.state.lock();
        let id = file.node();
        match &state.chain.node(id).space {
            Space::File(owner) if std::ptr::eq(Arc::as_ptr(owner), file) => {}
            _ => panic!(
                "chain corrupted: node {} of container {} does not hold {}",
                id.index(),
                self.id,
                file.name()
            ),
        }

        tracing::debug!(
            "Container {}: releasing {} at {} ({} bytes)",
            self.id,
            file.name(),
            file.offset(),
            file.footprint()
        );
        state.release(id, file.size())
    }

    // =========================================================================
    // Blob I/O
    // =========================================================================

    pub fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        self.file.read_at(buf, offset)
    }

    pub fn write_at(&self, buf: &[u8], offset: u64) -> Result<()> {
        self.file.write_all_at(buf, offset)?;
        Ok(())
    }

    /// Stream exactly `file.size()` bytes from `reader` into the file's range
    /// and seal it with their MD5.
    ///
    /// A stream shorter or longer than the declared size is `SizeMismatch`;
    /// the caller still owns the reservation and must delete it.
    pub fn fill<R: Read>(&self, file: &BlobFile, mut reader: R) -> Result<[u8; 16]> {
        assert_eq!(
            file.container_id(),
            self.id,
            "{} belongs to container {}",
            file.name(),
            file.container_id()
        );
        let expected = file.size();

        let mut ctx = md5::Context::new();
        let mut buf = vec![0u8; STREAM_CHUNK.min(expected as usize)];
        let mut written = 0u64;

        while written < expected {
            let n = match reader.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            };
            if written + n as u64 > expected {
                return Err(AtlasError::SizeMismatch {
                    expected,
                    actual: written + n as u64,
                });
            }
            self.write_at(&buf[..n], file.offset() + written)?;
            ctx.consume(&buf[..n]);
            written += n as u64;
        }

        if written != expected {
            return Err(AtlasError::SizeMismatch {
                expected,
                actual: written,
            });
        }
        // The stream must end exactly at the declared size
        let mut extra = [0u8; 1];
        if read_retrying(&mut reader, &mut extra)? != 0 {
            return Err(AtlasError::SizeMismatch {
                expected,
                actual: written + 1,
            });
        }

        let digest = ctx.compute().0;
        file.seal(digest);
        // A dump taken mid-stream recorded this range as free
        self.mark_dirty();
        Ok(digest)
    }

    // =========================================================================
    // Inspection
    // =========================================================================

    pub fn stats(&self) -> ContainerStats {
        let state = self.state.lock();
        ContainerStats {
            id: self.id,
            size: self.size,
            used: state.chain.tail_end(),
            file_count: state.file_count,
            file_size: state.file_size,
            file_real_size: state.file_real_size,
            hole_count: state.holes.len() as u64,
            hole_size: state.holes.total_size(),
            dirty: state.dirty,
        }
    }

    /// Snapshot of the chain in offset order
    pub fn nodes(&self) -> Vec<SpaceInfo> {
        let state = self.state.lock();
        state.chain.iter().map(|(_, node)| SpaceInfo::from_node(node)).collect()
    }

    /// Live files in offset order
    pub fn files(&self) -> Vec<Arc<BlobFile>> {
        let state = self.state.lock();
        state
            .chain
            .iter()
            .filter_map(|(_, node)| match &node.space {
                Space::File(file) => Some(Arc::clone(file)),
                Space::Hole => None,
            })
            .collect()
    }

    // =========================================================================
    // Teardown
    // =========================================================================

    /// Remove the data and index files (tests and teardown only)
    pub fn destroy(self: Arc<Self>) -> Result<()> {
        for path in [&self.data_path, &self.index_path] {
            match fs::remove_file(path) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        tracing::info!("Destroyed container {}", self.id);
        Ok(())
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    /// Data file path for container `id`
    pub fn data_path_for(dir: &Path, id: u64) -> PathBuf {
        dir.join(format!("{}{:06}.{}", Self::FILE_PREFIX, id, Self::DATA_EXT))
    }

    /// Index file path for container `id`
    pub fn index_path_for(dir: &Path, id: u64) -> PathBuf {
        dir.join(format!("{}{:06}.{}", Self::FILE_PREFIX, id, Self::INDEX_EXT))
    }

    /// "container_000042.idx" → Some(42)
    pub fn parse_index_id(path: &Path) -> Option<u64> {
        if path.extension()? != Self::INDEX_EXT {
            return None;
        }
        let name = path.file_stem()?.to_string_lossy();
        name.strip_prefix(Self::FILE_PREFIX)?.parse().ok()
    }

    fn open_data_file(path: &Path) -> Result<File> {
        Ok(OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(path)?)
    }
}

fn read_retrying<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    loop {
        match reader.read(buf) {
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            other => return other,
        }
    }
}
