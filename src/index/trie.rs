//! Path trie
//!
//! Names are split on `/`; empty segments are ignored, so `/a//b` and `a/b`
//! address the same file.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::{AtlasError, Result};
use crate::space::BlobFile;

#[derive(Debug, Default)]
struct TrieNode {
    file: Option<Arc<BlobFile>>,
    children: BTreeMap<String, TrieNode>,
}

impl TrieNode {
    fn is_empty(&self) -> bool {
        self.file.is_none() && self.children.is_empty()
    }

    fn find(&self, segments: &[&str]) -> Option<&TrieNode> {
        segments
            .iter()
            .try_fold(self, |node, segment| node.children.get(*segment))
    }

    fn attach(&mut self, segments: &[&str], file: Arc<BlobFile>) -> std::result::Result<(), Arc<BlobFile>> {
        let node = segments.iter().fold(self, |node, segment| {
            node.children.entry((*segment).to_string()).or_default()
        });
        if node.file.is_some() {
            return Err(file);
        }
        node.file = Some(file);
        Ok(())
    }

    /// Detach the file at `segments`, pruning branches left empty
    fn detach(&mut self, segments: &[&str]) -> Option<Arc<BlobFile>> {
        match segments.split_first() {
            None => self.file.take(),
            Some((segment, rest)) => {
                let child = self.children.get_mut(*segment)?;
                let file = child.detach(rest);
                if child.is_empty() {
                    self.children.remove(*segment);
                }
                file
            }
        }
    }

    fn collect(&self, path: &mut Vec<String>, depth: usize, max_depth: usize, out: &mut Vec<String>) {
        if self.file.is_some() {
            out.push(path.join("/"));
        }
        if max_depth != 0 && depth >= max_depth {
            return;
        }
        for (segment, child) in &self.children {
            path.push(segment.clone());
            child.collect(path, depth + 1, max_depth, out);
            path.pop();
        }
    }
}

#[derive(Debug, Default)]
struct Trie {
    root: TrieNode,
    version: u64,
    count: u64,
}

/// Trie from names to blob files
#[derive(Debug, Default)]
pub struct PathIndex {
    inner: RwLock<Trie>,
}

impl PathIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Non-empty segments of `name`
    pub fn segments(name: &str) -> Vec<&str> {
        name.split('/').filter(|s| !s.is_empty()).collect()
    }

    /// Normalized form of `name` ("/a//b/" → "a/b")
    pub fn canonical(name: &str) -> Result<String> {
        let segments = Self::segments(name);
        if segments.is_empty() {
            return Err(AtlasError::InvalidName(name.to_string()));
        }
        Ok(segments.join("/"))
    }

    /// Register `file` under `name`
    pub fn add(&self, name: &str, file: Arc<BlobFile>) -> Result<()> {
        let segments = Self::segments(name);
        if segments.is_empty() {
            return Err(AtlasError::InvalidName(name.to_string()));
        }

        let mut trie = self.inner.write();
        trie.root
            .attach(&segments, file)
            .map_err(|_| AtlasError::FileExists(segments.join("/")))?;
        trie.version += 1;
        trie.count += 1;
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<BlobFile>> {
        let segments = Self::segments(name);
        if segments.is_empty() {
            return None;
        }
        let trie = self.inner.read();
        trie.root.find(&segments)?.file.clone()
    }

    /// Remove and return the file at `name`
    pub fn delete(&self, name: &str) -> Option<Arc<BlobFile>> {
        let segments = Self::segments(name);
        if segments.is_empty() {
            return None;
        }
        let mut trie = self.inner.write();
        let file = trie.root.detach(&segments)?;
        trie.version += 1;
        trie.count -= 1;
        Some(file)
    }

    /// Move the file at `old` to `new`
    pub fn rename(&self, old: &str, new: &str) -> Result<()> {
        let from = Self::segments(old);
        let to = Self::segments(new);
        if from.is_empty() {
            return Err(AtlasError::InvalidName(old.to_string()));
        }
        if to.is_empty() {
            return Err(AtlasError::InvalidName(new.to_string()));
        }

        let mut trie = self.inner.write();
        if trie.root.find(&to).is_some_and(|node| node.file.is_some()) {
            return Err(AtlasError::Conflict(to.join("/")));
        }
        let file = trie
            .root
            .detach(&from)
            .ok_or_else(|| AtlasError::FileNotFound(from.join("/")))?;

        if let Err(file) = trie.root.attach(&to, Arc::clone(&file)) {
            // Put it back where it was
            let _ = trie.root.attach(&from, file);
            return Err(AtlasError::Conflict(to.join("/")));
        }
        file.set_name(to.join("/"));
        trie.version += 1;
        Ok(())
    }

    /// Every file name at or below `prefix`, sorted.
    ///
    /// `max_depth` counts segments below the prefix; 0 means unlimited.
    pub fn list(&self, prefix: &str, max_depth: usize) -> Vec<String> {
        let segments = Self::segments(prefix);
        let trie = self.inner.read();
        let mut out = Vec::new();
        if let Some(node) = trie.root.find(&segments) {
            let mut path: Vec<String> = segments.iter().map(|s| s.to_string()).collect();
            node.collect(&mut path, 0, max_depth, &mut out);
        }
        out
    }

    /// Number of registered files
    pub fn len(&self) -> u64 {
        self.inner.read().count
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bumped on every add, delete and rename
    pub fn version(&self) -> u64 {
        self.inner.read().version
    }
}
