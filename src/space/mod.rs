//! Space Module
//!
//! Byte ranges inside a container. Every range is a node in the container's
//! chain and is either a live file or a free hole.
//!
//! ## Responsibilities
//! - Shared geometry (offset + size class) for files and holes
//! - Open/close/delete protocol for files (deferred reclamation)
//! - Scoped readers over stored bytes
//! - Binary records for container index dumps
//!
//! ## Chain Layout
//! ```text
//!   offset 0                                              tail.end()
//!   ┌────────┬──────┬──────┬──────────────┬────────┐
//!   │ File a │ Hole │ Hole │    File b    │ File c │ ... unallocated
//!   └────────┴──────┴──────┴──────────────┴────────┘
//!        prev ◄──── node ────► next
//! ```

mod file;
mod reader;
pub mod codec;

use std::sync::Arc;

use crate::size_class::{self, SizeClass};

pub use file::{BlobFile, FileStub};
pub use reader::BlobReader;

/// Index of a node in a container's chain arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    /// Position of the node in the arena
    pub fn index(self) -> usize {
        self.0
    }
}

impl From<usize> for NodeId {
    fn from(index: usize) -> Self {
        Self(index)
    }
}

/// What occupies a node's byte range
#[derive(Debug, Clone)]
pub enum Space {
    /// A stored blob
    File(Arc<BlobFile>),

    /// A free range tracked by the hole free list
    Hole,
}

impl Space {
    pub fn is_free(&self) -> bool {
        matches!(self, Space::Hole)
    }
}

/// A node of the chain: geometry, links and payload
#[derive(Debug)]
pub(crate) struct Node {
    pub(crate) offset: u64,
    pub(crate) class: SizeClass,
    pub(crate) prev: Option<NodeId>,
    pub(crate) next: Option<NodeId>,
    pub(crate) space: Space,
}

impl Node {
    pub(crate) fn new(offset: u64, class: SizeClass, space: Space) -> Self {
        Self {
            offset,
            class,
            prev: None,
            next: None,
            space,
        }
    }

    /// Footprint: always the class size, never a file's exact length
    pub(crate) fn size(&self) -> u64 {
        size_class::size_of(self.class)
    }

    pub(crate) fn end(&self) -> u64 {
        self.offset + self.size()
    }

    pub(crate) fn is_free(&self) -> bool {
        self.space.is_free()
    }
}

/// Point-in-time view of one chain node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpaceInfo {
    pub offset: u64,
    pub size_class: SizeClass,
    /// Footprint in bytes
    pub size: u64,
    pub kind: SpaceKind,
}

impl SpaceInfo {
    pub fn end(&self) -> u64 {
        self.offset + self.size
    }

    pub fn is_free(&self) -> bool {
        matches!(self.kind, SpaceKind::Hole)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpaceKind {
    File { name: String, size: u64 },
    Hole,
}

impl SpaceInfo {
    pub(crate) fn from_node(node: &Node) -> Self {
        let kind = match &node.space {
            Space::File(file) => SpaceKind::File {
                name: file.name(),
                size: file.size(),
            },
            Space::Hole => SpaceKind::Hole,
        };
        Self {
            offset: node.offset,
            size_class: node.class,
            size: node.size(),
            kind,
        }
    }
}
