//! Blob file handles
//!
//! A `BlobFile` is owned by one node of a container chain and referenced by
//! at most one path index leaf. Deleting a file that still has open readers
//! only marks it; the byte range is reclaimed when the last reader closes.

use std::sync::{Arc, OnceLock, Weak};
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::{Mutex, RwLock};

use crate::container::Container;
use crate::error::{AtlasError, Result};
use crate::size_class::{self, SizeClass};

use super::{BlobReader, NodeId};

/// Request to place a new blob: everything known before the bytes arrive
#[derive(Debug, Clone)]
pub struct FileStub {
    pub name: String,
    pub size: u64,
    /// Creation time (unix seconds)
    pub time: u64,
}

impl FileStub {
    /// Stub stamped with the current time
    pub fn new(name: impl Into<String>, size: u64) -> Self {
        let time = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        Self {
            name: name.into(),
            size,
            time,
        }
    }
}

#[derive(Debug, Default)]
struct OpenState {
    open: u32,
    deleted: bool,
    reclaimed: bool,
}

/// A stored blob
#[derive(Debug)]
pub struct BlobFile {
    name: RwLock<String>,
    size: u64,
    time: u64,
    /// Set once the bytes are fully written (or when restored from a dump)
    md5: OnceLock<[u8; 16]>,

    container_id: u64,
    node: NodeId,
    offset: u64,
    size_class: SizeClass,
    container: Weak<Container>,

    state: Mutex<OpenState>,
}

impl BlobFile {
    pub(crate) fn new(
        stub: &FileStub,
        container: &Arc<Container>,
        node: NodeId,
        offset: u64,
        size_class: SizeClass,
    ) -> Self {
        Self {
            name: RwLock::new(stub.name.clone()),
            size: stub.size,
            time: stub.time,
            md5: OnceLock::new(),
            container_id: container.id(),
            node,
            offset,
            size_class,
            container: Arc::downgrade(container),
            state: Mutex::new(OpenState::default()),
        }
    }

    /// Handle for a file read back from a container dump
    pub(crate) fn restored(
        stub: &FileStub,
        md5: [u8; 16],
        container: &Arc<Container>,
        node: NodeId,
        offset: u64,
        size_class: SizeClass,
    ) -> Self {
        let file = Self::new(stub, container, node, offset, size_class);
        let _ = file.md5.set(md5);
        file
    }

    // =========================================================================
    // Metadata
    // =========================================================================

    /// Full path of the file
    pub fn name(&self) -> String {
        self.name.read().clone()
    }

    pub(crate) fn set_name(&self, name: String) {
        *self.name.write() = name;
    }

    /// Exact length in bytes
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Bytes reserved in the container (the rounded size class)
    pub fn footprint(&self) -> u64 {
        size_class::size_of(self.size_class)
    }

    /// Creation time (unix seconds)
    pub fn time(&self) -> u64 {
        self.time
    }

    /// MD5 of the content; all zeros until the upload completes
    pub fn md5(&self) -> [u8; 16] {
        self.md5.get().copied().unwrap_or([0; 16])
    }

    /// Hex form of `md5()`
    pub fn md5_hex(&self) -> String {
        format!("{:x}", md5::Digest(self.md5()))
    }

    /// Whether the upload completed
    pub fn is_sealed(&self) -> bool {
        self.md5.get().is_some()
    }

    /// Record the digest of the fully written content
    pub(crate) fn seal(&self, md5: [u8; 16]) {
        let _ = self.md5.set(md5);
    }

    pub fn container_id(&self) -> u64 {
        self.container_id
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn size_class(&self) -> SizeClass {
        self.size_class
    }

    pub(crate) fn node(&self) -> NodeId {
        self.node
    }

    pub(crate) fn container(&self) -> Option<Arc<Container>> {
        self.container.upgrade()
    }

    // =========================================================================
    // Open / Close / Delete
    // =========================================================================

    /// Register a reader. Fails once the file is deleted.
    pub fn open(&self) -> Result<()> {
        let mut state = self.state.lock();
        if state.deleted {
            return Err(AtlasError::FileDeleted(self.name()));
        }
        state.open += 1;
        Ok(())
    }

    /// Unregister a reader; the last close of a deleted file reclaims it
    pub fn close(&self) -> Result<()> {
        let reclaim = {
            let mut state = self.state.lock();
            state.open = state.open.saturating_sub(1);
            Self::take_reclaim(&mut state)
        };
        if reclaim {
            self.reclaim()?;
        }
        Ok(())
    }

    /// Mark deleted; reclaims now if nobody has the file open
    pub fn delete(&self) -> Result<()> {
        let reclaim = {
            let mut state = self.state.lock();
            state.deleted = true;
            Self::take_reclaim(&mut state)
        };
        if reclaim {
            self.reclaim()?;
        } else if let Some(container) = self.container() {
            // The next dump must stop recording this file
            container.mark_dirty();
        }
        Ok(())
    }

    pub fn is_deleted(&self) -> bool {
        self.state.lock().deleted
    }

    pub fn open_count(&self) -> u32 {
        self.state.lock().open
    }

    /// Open a scoped reader over the content
    pub fn reader(self: &Arc<Self>) -> Result<BlobReader> {
        let container = self
            .container()
            .ok_or_else(|| AtlasError::FileDeleted(self.name()))?;
        self.open()?;
        Ok(BlobReader::new(Arc::clone(self), container))
    }

    fn take_reclaim(state: &mut OpenState) -> bool {
        if state.deleted && state.open == 0 && !state.reclaimed {
            state.reclaimed = true;
            return true;
        }
        false
    }

    fn reclaim(&self) -> Result<()> {
        match self.container() {
            Some(container) => container.release(self),
            // Container already dropped: nothing left to free
            None => Ok(()),
        }
    }
}
