//! Hole Free List
//!
//! Every hole of a container, bucketed by size class. Each bucket maps
//! offset -> chain node, so popping a bucket always returns its lowest hole.

use std::collections::BTreeMap;

use crate::size_class::{self, SizeClass};
use crate::space::NodeId;

/// Size-class index of free holes
#[derive(Debug, Default)]
pub struct HoleFreeList {
    /// Bucket `c` holds the holes of class `c`; bucket 0 stays empty
    buckets: Vec<BTreeMap<u64, NodeId>>,
    count: usize,
    total_size: u64,
    /// Highest class with a non-empty bucket (0 when empty)
    biggest: SizeClass,
}

impl HoleFreeList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of holes
    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Sum of hole footprints
    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    pub fn biggest(&self) -> SizeClass {
        self.biggest
    }

    /// Track a hole.
    ///
    /// # Panics
    /// Panics on class 0 or when a hole is already tracked at `offset`.
    pub fn add(&mut self, class: SizeClass, offset: u64, id: NodeId) {
        assert!(class != 0, "zero-class hole at offset {}", offset);

        let slot = class as usize;
        if self.buckets.len() <= slot {
            self.buckets.resize_with(slot + 1, BTreeMap::new);
        }
        let previous = self.buckets[slot].insert(offset, id);
        assert!(
            previous.is_none(),
            "hole at offset {} tracked twice in class {}",
            offset,
            class
        );

        self.count += 1;
        self.total_size += size_class::size_of(class);
        self.biggest = self.biggest.max(class);
    }

    /// Stop tracking the hole of `class` at `offset`
    pub fn remove(&mut self, class: SizeClass, offset: u64) -> Option<NodeId> {
        let id = self.buckets.get_mut(class as usize)?.remove(&offset)?;
        self.forget(class);
        Some(id)
    }

    /// Pop a hole of exactly `class`
    pub fn pop(&mut self, class: SizeClass) -> Option<(u64, NodeId)> {
        let entry = self.buckets.get_mut(class as usize)?.pop_first()?;
        self.forget(class);
        Some(entry)
    }

    /// Pop a hole from the smallest non-empty class `>= class`
    pub fn pop_at_least(&mut self, class: SizeClass) -> Option<(SizeClass, u64, NodeId)> {
        if class == 0 || class > self.biggest {
            return None;
        }
        let found = (class..=self.biggest).find(|&c| !self.buckets[c as usize].is_empty())?;
        let (offset, id) = self.pop(found)?;
        Some((found, offset, id))
    }

    pub fn contains(&self, class: SizeClass, offset: u64, id: NodeId) -> bool {
        self.buckets
            .get(class as usize)
            .and_then(|bucket| bucket.get(&offset))
            .is_some_and(|&tracked| tracked == id)
    }

    /// All tracked holes as (class, offset, node)
    pub fn iter(&self) -> impl Iterator<Item = (SizeClass, u64, NodeId)> + '_ {
        self.buckets.iter().enumerate().flat_map(|(class, bucket)| {
            bucket
                .iter()
                .map(move |(&offset, &id)| (class as SizeClass, offset, id))
        })
    }

    /// Bookkeeping after a hole of `class` left its bucket
    fn forget(&mut self, class: SizeClass) {
        self.count -= 1;
        self.total_size -= size_class::size_of(class);
        if class == self.biggest && self.buckets[class as usize].is_empty() {
            self.biggest = self
                .buckets
                .iter()
                .rposition(|bucket| !bucket.is_empty())
                .unwrap_or(0) as SizeClass;
        }
    }
}
