//! Storage Module
//!
//! The coordinator that ties containers, the path index and persistence
//! together.
//!
//! ## Responsibilities
//! - Restore every container on startup (all or nothing)
//! - Pick a container for each new blob and stream its bytes in
//! - Route reads and deletes through the path index
//! - Dump dirty containers on a timer and at shutdown
//!
//! ## Locking
//! ```text
//!   containers: RwLock<Vec<Arc<Container>>>   read: allocation scans
//!        │                                    write: new container only
//!        └── Container: Mutex<chain + holes + counters>
//!   index: PathIndex (own RwLock, never held with a container lock)
//! ```

mod dumper;

use std::fs;
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;

use crate::config::Config;
use crate::container::{Container, ContainerStats, Strategy};
use crate::error::{AtlasError, Result};
use crate::index::PathIndex;
use crate::size_class;
use crate::space::{BlobFile, BlobReader, FileStub};

use dumper::Dumper;

/// Aggregated counters over all containers
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StorageStats {
    pub containers: Vec<ContainerStats>,
    pub file_count: u64,
    pub file_size: u64,
    pub file_real_size: u64,
    pub hole_count: u64,
    pub hole_size: u64,
    /// Files registered in the path index
    pub index_count: u64,
    pub index_version: u64,
}

/// The blob store
pub struct Storage {
    config: Config,

    /// Every container, in id order
    containers: Arc<RwLock<Vec<Arc<Container>>>>,

    /// Names of live files
    index: PathIndex,

    /// Periodic dumps (absent when `dump_interval` is zero)
    dumper: Option<Dumper>,
}

impl Storage {
    /// Open or create a store with the given config
    ///
    /// On startup:
    /// 1. Create the data directory
    /// 2. Restore every container index concurrently; any failure aborts
    /// 3. Register restored files in the path index
    /// 4. Create the first container when none exist
    /// 5. Start the background dump thread
    pub fn open(config: Config) -> Result<Self> {
        config.validate()?;
        fs::create_dir_all(&config.data_dir)?;

        let index = PathIndex::new();
        let mut restored = Self::restore_all(&config)?;
        restored.sort_by_key(|(container, _)| container.id());

        let mut containers = Vec::with_capacity(restored.len().max(1));
        for (container, files) in restored {
            for file in files {
                Self::register_restored(&index, file)?;
            }
            containers.push(container);
        }

        if containers.is_empty() {
            containers.push(Container::create(&config.data_dir, 1, config.container_size)?);
        }

        tracing::info!(
            "Storage opened at {}: {} containers, {} files",
            config.data_dir.display(),
            containers.len(),
            index.len()
        );

        let containers = Arc::new(RwLock::new(containers));
        let dumper = (!config.dump_interval.is_zero())
            .then(|| Dumper::spawn(config.dump_interval, Arc::clone(&containers)));

        Ok(Self {
            config,
            containers,
            index,
            dumper,
        })
    }

    /// Open with a path (convenience method)
    ///
    /// Uses default config with the specified data directory
    pub fn open_path(path: impl Into<PathBuf>) -> Result<Self> {
        Self::open(Config::builder().data_dir(path).build())
    }

    // =========================================================================
    // Blob Operations
    // =========================================================================

    /// Store `size` bytes from `reader` under `name`
    ///
    /// Steps:
    /// 1. Validate size and name
    /// 2. Reserve space (REPLACE / APPEND / INSERT, then a new container)
    /// 3. Stream bytes in while hashing them
    /// 4. Register the name
    ///
    /// Any failure releases the reservation; nothing is left registered.
    pub fn add<R: Read>(&self, name: &str, reader: R, size: u64) -> Result<Arc<BlobFile>> {
        if size == 0 {
            return Err(AtlasError::InvalidSize(size));
        }
        let name = PathIndex::canonical(name)?;
        if size_class::round(size) > self.config.container_size {
            return Err(AtlasError::NoSpace { size });
        }
        if self.index.get(&name).is_some() {
            return Err(AtlasError::FileExists(name));
        }

        let stub = FileStub::new(name.as_str(), size);
        let file = self.allocate(&stub)?;

        if let Err(e) = self.stream_into(&file, reader) {
            self.discard(&file);
            return Err(e);
        }

        if let Err(e) = self.index.add(&name, Arc::clone(&file)) {
            self.discard(&file);
            return Err(e);
        }
        Ok(file)
    }

    /// Open a reader over the blob stored under `name`
    ///
    /// Returns:
    /// - `Ok(Some(reader))`: file found and opened
    /// - `Ok(None)`: no such file, or it was deleted concurrently
    pub fn get(&self, name: &str) -> Result<Option<BlobReader>> {
        let file = match self.index.get(name) {
            Some(file) => file,
            None => return Ok(None),
        };
        match file.reader() {
            Ok(reader) => Ok(Some(reader)),
            Err(AtlasError::FileDeleted(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Metadata of the file stored under `name`
    pub fn file(&self, name: &str) -> Option<Arc<BlobFile>> {
        self.index.get(name)
    }

    /// Remove `name`; its space is reclaimed once no reader holds it
    pub fn delete(&self, name: &str) -> Result<()> {
        let file = self
            .index
            .delete(name)
            .ok_or_else(|| AtlasError::FileNotFound(name.to_string()))?;
        tracing::debug!("Deleting {}", file.name());
        file.delete()
    }

    /// Remove every file at or below `prefix`; returns how many were removed
    pub fn delete_childs(&self, prefix: &str) -> Result<usize> {
        let mut deleted = 0;
        for name in self.index.list(prefix, 0) {
            match self.delete(&name) {
                Ok(()) => deleted += 1,
                // Removed concurrently
                Err(AtlasError::FileNotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }
        tracing::debug!("Deleted {} files under {:?}", deleted, prefix);
        Ok(deleted)
    }

    /// Move `old` to `new` without touching the stored bytes
    pub fn rename(&self, old: &str, new: &str) -> Result<()> {
        self.index.rename(old, new)?;
        if let Some(container) = self.index.get(new).and_then(|file| file.container()) {
            container.mark_dirty();
        }
        Ok(())
    }

    /// File names at or below `prefix` (`max_depth` 0 = unlimited)
    pub fn list(&self, prefix: &str, max_depth: usize) -> Vec<String> {
        self.index.list(prefix, max_depth)
    }

    // =========================================================================
    // Maintenance
    // =========================================================================

    /// Write the index of every dirty container; returns how many were written
    pub fn dump(&self) -> Result<usize> {
        let snapshot = self.containers.read().clone();
        dump_all(&snapshot)
    }

    /// Verify every container; returns the first violation
    pub fn check(&self) -> Result<()> {
        let snapshot = self.containers.read().clone();
        for container in &snapshot {
            container.check()?;
        }
        Ok(())
    }

    pub fn stats(&self) -> StorageStats {
        let containers: Vec<ContainerStats> =
            self.containers.read().iter().map(|c| c.stats()).collect();

        StorageStats {
            file_count: containers.iter().map(|c| c.file_count).sum(),
            file_size: containers.iter().map(|c| c.file_size).sum(),
            file_real_size: containers.iter().map(|c| c.file_real_size).sum(),
            hole_count: containers.iter().map(|c| c.hole_count).sum(),
            hole_size: containers.iter().map(|c| c.hole_size).sum(),
            index_count: self.index.len(),
            index_version: self.index.version(),
            containers,
        }
    }

    /// Close the store gracefully
    ///
    /// Stops the dump thread, then dumps once more
    pub fn close(mut self) -> Result<()> {
        if let Some(dumper) = self.dumper.take() {
            dumper.stop();
        }
        let dumped = self.dump()?;
        tracing::info!("Storage closed ({} containers dumped)", dumped);
        Ok(())
    }

    // =========================================================================
    // Accessors (for testing and debugging)
    // =========================================================================

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn index(&self) -> &PathIndex {
        &self.index
    }

    /// Snapshot of the container set
    pub fn containers(&self) -> Vec<Arc<Container>> {
        self.containers.read().clone()
    }

    pub fn container_count(&self) -> usize {
        self.containers.read().len()
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    /// Reserve space for `stub`, creating a container when nothing fits
    fn allocate(&self, stub: &FileStub) -> Result<Arc<BlobFile>> {
        {
            let containers = self.containers.read();
            for strategy in Strategy::ORDER {
                for container in containers.iter() {
                    if let Some(file) = container.allocate(stub, strategy) {
                        return Ok(file);
                    }
                }
            }
        }

        let mut containers = self.containers.write();
        // Another writer may have made room while we waited
        for container in containers.iter() {
            if let Some(file) = container.allocate(stub, Strategy::Append) {
                return Ok(file);
            }
        }

        let id = containers.iter().map(|c| c.id()).max().unwrap_or(0) + 1;
        let container = Container::create(&self.config.data_dir, id, self.config.container_size)?;
        containers.push(Arc::clone(&container));

        container
            .allocate(stub, Strategy::Append)
            .ok_or(AtlasError::NoSpace { size: stub.size })
    }

    /// Copy `reader` into the file's range and seal it
    fn stream_into<R: Read>(&self, file: &BlobFile, reader: R) -> Result<()> {
        let container = file
            .container()
            .ok_or_else(|| AtlasError::FileDeleted(file.name()))?;
        container.fill(file, reader)?;
        Ok(())
    }

    /// Release a reservation that never made it into the index
    fn discard(&self, file: &BlobFile) {
        if let Err(e) = file.delete() {
            tracing::error!("Failed to release reservation for {}: {}", file.name(), e);
        }
    }

    fn restore_all(config: &Config) -> Result<Vec<(Arc<Container>, Vec<Arc<BlobFile>>)>> {
        let mut paths = Vec::new();
        for entry in fs::read_dir(&config.data_dir)? {
            let path = entry?.path();
            if path.is_file() && Container::parse_index_id(&path).is_some() {
                paths.push(path);
            }
        }
        if paths.is_empty() {
            return Ok(Vec::new());
        }

        let dir = config.data_dir.as_path();
        let results = crossbeam::thread::scope(|scope| {
            let handles: Vec<_> = paths
                .iter()
                .map(|path| scope.spawn(move |_| Container::restore(dir, path)))
                .collect();
            handles
                .into_iter()
                .map(|handle| {
                    handle.join().unwrap_or_else(|_| {
                        Err(AtlasError::Corruption("restore thread panicked".to_string()))
                    })
                })
                .collect::<Vec<_>>()
        })
        .map_err(|_| AtlasError::Corruption("restore thread panicked".to_string()))?;

        let mut restored = Vec::with_capacity(results.len());
        for (path, result) in paths.iter().zip(results) {
            match result {
                Ok(entry) => restored.push(entry),
                Err(e) => {
                    tracing::error!("Failed to restore {}: {}", path.display(), e);
                    return Err(e);
                }
            }
        }
        Ok(restored)
    }

    /// Register a restored file; of two files with one name the newer wins
    fn register_restored(index: &PathIndex, file: Arc<BlobFile>) -> Result<()> {
        let name = file.name();
        let existing = match index.get(&name) {
            None => return index.add(&name, file),
            Some(existing) => existing,
        };

        let (winner, loser) = if (file.time(), file.container_id())
            > (existing.time(), existing.container_id())
        {
            index.delete(&name);
            index.add(&name, Arc::clone(&file))?;
            (file, existing)
        } else {
            (existing, file)
        };
        tracing::warn!(
            "{} restored from containers {} and {}; keeping container {}",
            name,
            winner.container_id(),
            loser.container_id(),
            winner.container_id()
        );
        loser.delete()
    }
}

impl Drop for Storage {
    fn drop(&mut self) {
        if let Some(dumper) = self.dumper.take() {
            dumper.stop();
        }
    }
}

/// Dump every container, returning the first error after trying them all
pub(crate) fn dump_all(containers: &[Arc<Container>]) -> Result<usize> {
    let mut dumped = 0;
    let mut first_error = None;
    for container in containers {
        match container.dump() {
            Ok(true) => dumped += 1,
            Ok(false) => {}
            Err(e) => {
                tracing::warn!("Failed to dump container {}: {}", container.id(), e);
                first_error.get_or_insert(e);
            }
        }
    }
    match first_error {
        Some(e) => Err(e),
        None => Ok(dumped),
    }
}
