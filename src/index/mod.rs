//! Index Module
//!
//! Hierarchical namespace over stored blobs.
//!
//! ## Responsibilities
//! - Map slash-delimited names to blob files
//! - Enumerate everything under a prefix
//! - Expose a change counter for external pollers
//!
//! ## Data Structure Choice
//! A trie keyed by path segment, behind one index-wide RwLock. Every
//! operation is O(segments). Children live in a BTreeMap, so listings come
//! out sorted.

mod trie;

pub use trie::PathIndex;
