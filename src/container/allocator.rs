//! Container allocator
//!
//! Placement strategies, hole splitting and hole coalescing over a
//! container's chain. All methods run under the container lock.
//!
//! ## Strategies
//! - `Replace`: reuse a hole of exactly the file's class
//! - `Append`: place the file right after the tail
//! - `Insert`: split the smallest hole of a larger class
//!
//! Holes only ever merge into runs whose total is a class boundary, so
//! every hole stays findable by an exact-class lookup.

use crate::error::{AtlasError, Result};
use crate::size_class::{self, SizeClass};
use crate::space::{NodeId, Space};

use super::{ContainerState, Strategy};

/// Free neighbours visited walking left from a new hole
pub const MAX_LEFT_WALK: usize = 200;

/// Free neighbours visited walking right from the start of a free run
pub const MAX_RIGHT_WALK: usize = 400;

impl ContainerState {
    /// Reserve a node of `class` with the given strategy.
    ///
    /// The returned node still carries a `Hole` payload and is not in the
    /// free list; the caller installs the file before releasing the lock.
    pub(crate) fn place(
        &mut self,
        class: SizeClass,
        strategy: Strategy,
        capacity: u64,
    ) -> Option<NodeId> {
        match strategy {
            Strategy::Replace => self.holes.pop(class).map(|(_, id)| id),
            Strategy::Append => {
                let end = self.chain.tail_end();
                if capacity.saturating_sub(end) < size_class::size_of(class) {
                    return None;
                }
                Some(self.chain.push_back(end, class, Space::Hole))
            }
            Strategy::Insert => {
                let (hole_class, offset, id) = self.holes.pop_at_least(class)?;
                if hole_class != class {
                    self.split_hole(id, offset, hole_class, class);
                }
                Some(id)
            }
        }
    }

    /// Shrink the popped hole `id` to `class`; the remainder becomes holes
    fn split_hole(&mut self, id: NodeId, offset: u64, hole_class: SizeClass, class: SizeClass) {
        let taken = size_class::size_of(class);
        let residual = size_class::size_of(hole_class) - taken;
        self.chain.node_mut(id).class = class;

        let first = self.insert_normalized_hole(id, offset + taken, residual);
        if let Err(e) = self.normalize_hole(first) {
            tracing::error!("Residual hole at {} left unmerged: {}", offset + taken, e);
        }
    }

    /// Free the file node `id`, whose exact length is `size`
    pub(crate) fn release(&mut self, id: NodeId, size: u64) -> Result<()> {
        let class = self.chain.node(id).class;
        self.file_count -= 1;
        self.file_size -= size;
        self.file_real_size -= size_class::size_of(class);
        self.dirty = true;

        if self.chain.tail() == Some(id) {
            self.shrink_tail(id)
        } else {
            self.punch_hole(id)
        }
    }

    /// Drop the tail file and every hole exposed behind it
    fn shrink_tail(&mut self, id: NodeId) -> Result<()> {
        let mut cursor = self.chain.remove(id).prev;
        let bound = self.chain.len();
        let mut steps = 0;

        while let Some(current) = cursor {
            let node = self.chain.node(current);
            if !node.is_free() {
                break;
            }
            steps += 1;
            if steps > bound {
                tracing::error!("Tail shrink walked {} holes in a chain of {}", steps, bound);
                return Err(AtlasError::Corruption(format!(
                    "tail shrink exceeded {} nodes",
                    bound
                )));
            }
            let (class, offset) = (node.class, node.offset);
            if self.holes.remove(class, offset).is_none() {
                panic!("chain corrupted: hole at {} missing from free list", offset);
            }
            cursor = self.chain.remove(current).prev;
        }
        Ok(())
    }

    /// Turn a non-tail file node into an indexed, normalized hole
    fn punch_hole(&mut self, id: NodeId) -> Result<()> {
        let (offset, class, prev) = {
            let node = self.chain.node_mut(id);
            node.space = Space::Hole;
            (node.offset, node.class, node.prev)
        };
        if let Some(prev) = prev {
            let prev_end = self.chain.node(prev).end();
            assert_eq!(
                prev_end, offset,
                "chain corrupted: previous node ends at {} but hole starts at {}",
                prev_end, offset
            );
        }
        self.holes.add(class, offset, id);
        self.normalize_hole(id)
    }

    /// Coalesce the free run around `id` on size-class boundaries
    pub(crate) fn normalize_hole(&mut self, id: NodeId) -> Result<()> {
        let mut start = id;
        let mut steps = 0;
        while let Some(prev) = self.chain.prev(start) {
            if !self.chain.node(prev).is_free() {
                break;
            }
            steps += 1;
            if steps > MAX_LEFT_WALK {
                tracing::error!("Free run left of {} exceeds {} holes", id.index(), MAX_LEFT_WALK);
                return Err(AtlasError::Corruption(format!(
                    "free run exceeds {} holes walking left",
                    MAX_LEFT_WALK
                )));
            }
            start = prev;
        }

        let mut run = vec![start];
        let mut run_size = self.chain.node(start).size();
        let mut cursor = self.chain.next(start);
        steps = 0;

        while let Some(current) = cursor {
            let node = self.chain.node(current);
            if !node.is_free() {
                break;
            }
            steps += 1;
            if steps > MAX_RIGHT_WALK {
                tracing::error!("Free run right of {} exceeds {} holes", start.index(), MAX_RIGHT_WALK);
                return Err(AtlasError::Corruption(format!(
                    "free run exceeds {} holes walking right",
                    MAX_RIGHT_WALK
                )));
            }
            cursor = node.next;
            run_size += node.size();
            run.push(current);

            if size_class::is_boundary(run_size) {
                let merged = self.merge_holes(&run, run_size);
                run.clear();
                run.push(merged);
            }
        }
        Ok(())
    }

    /// Replace adjacent holes `run` by one hole of `total` bytes
    fn merge_holes(&mut self, run: &[NodeId], total: u64) -> NodeId {
        let first = run[0];
        for &id in run {
            let node = self.chain.node(id);
            let (class, offset) = (node.class, node.offset);
            if self.holes.remove(class, offset).is_none() {
                panic!("chain corrupted: hole at {} missing from free list", offset);
            }
        }
        for &id in &run[1..] {
            self.chain.remove(id);
        }

        let class = size_class::class_of(total);
        let offset = {
            let node = self.chain.node_mut(first);
            node.class = class;
            node.offset
        };
        self.holes.add(class, offset, first);
        first
    }

    /// Cover `size` bytes at `offset` (right after `after`) with class-sized
    /// holes, largest first. Returns the first hole.
    pub(crate) fn insert_normalized_hole(&mut self, after: NodeId, offset: u64, size: u64) -> NodeId {
        let mut prev = after;
        let mut offset = offset;
        let mut remaining = size;
        let mut first = None;

        while remaining > 0 {
            let class = size_class::floor_class(remaining);
            let id = self.chain.insert_after(prev, offset, class, Space::Hole);
            self.holes.add(class, offset, id);
            first.get_or_insert(id);

            let step = size_class::size_of(class);
            offset += step;
            remaining -= step;
            prev = id;
        }

        first.unwrap_or_else(|| panic!("empty residual hole after node {}", after.index()))
    }
}
