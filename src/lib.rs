//! # AtlasBlob
//!
//! A blob storage engine with:
//! - Fixed-capacity, preallocated container files
//! - Size-classed free lists with hole splitting and merging
//! - A hierarchical, slash-delimited namespace over stored blobs
//! - Crash-safe index dumps (temp file + rename) and all-or-nothing restore
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Front End (external)                     │
//! │        add / get / delete / delete_childs / dump / check     │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                         Storage                              │
//! │          (container set RwLock, allocation policy)           │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//!          ┌────────────┴────────────┐
//!          │                         │
//!          ▼                         ▼
//!   ┌─────────────┐          ┌──────────────┐
//!   │  PathIndex  │          │  Container   │ × N
//!   │   (trie)    │──refs───►│ chain + holes│
//!   └─────────────┘          └──────┬───────┘
//!                                   │
//!                                   ▼
//!                         ┌───────────────────┐
//!                         │ container_N.dat   │
//!                         │ container_N.idx   │
//!                         └───────────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod size_class;
pub mod space;
pub mod container;
pub mod index;
pub mod persist;
pub mod storage;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{AtlasError, Result};
pub use config::Config;
pub use container::{Container, ContainerStats, HoleFreeList, Strategy};
pub use index::PathIndex;
pub use space::{BlobFile, BlobReader, FileStub, SpaceInfo, SpaceKind};
pub use storage::{Storage, StorageStats};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of AtlasBlob
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
