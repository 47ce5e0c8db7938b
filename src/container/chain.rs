//! Chain arena
//!
//! Nodes live in a slot vector owned by the container; `prev`/`next` are slot
//! indices. Vacated slots are recycled.

use crate::size_class::SizeClass;
use crate::space::{Node, NodeId, Space};

#[derive(Debug, Default)]
pub(crate) struct Chain {
    slots: Vec<Option<Node>>,
    vacant: Vec<NodeId>,
    head: Option<NodeId>,
    tail: Option<NodeId>,
    len: usize,
}

impl Chain {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }

    pub(crate) fn head(&self) -> Option<NodeId> {
        self.head
    }

    pub(crate) fn tail(&self) -> Option<NodeId> {
        self.tail
    }

    /// # Panics
    /// Panics on a vacated slot: a dangling id means the chain is corrupted.
    pub(crate) fn node(&self, id: NodeId) -> &Node {
        self.slots
            .get(id.index())
            .and_then(Option::as_ref)
            .unwrap_or_else(|| panic!("chain corrupted: dangling node {}", id.index()))
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut Node {
        self.slots
            .get_mut(id.index())
            .and_then(Option::as_mut)
            .unwrap_or_else(|| panic!("chain corrupted: dangling node {}", id.index()))
    }

    pub(crate) fn prev(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).prev
    }

    pub(crate) fn next(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).next
    }

    /// End of the used extent
    pub(crate) fn tail_end(&self) -> u64 {
        self.tail.map(|id| self.node(id).end()).unwrap_or(0)
    }

    pub(crate) fn push_back(&mut self, offset: u64, class: SizeClass, space: Space) -> NodeId {
        assert_eq!(
            offset,
            self.tail_end(),
            "chain corrupted: append at {} but tail ends at {}",
            offset,
            self.tail_end()
        );
        let mut node = Node::new(offset, class, space);
        node.prev = self.tail;
        let id = self.store(node);
        match self.tail {
            Some(tail) => self.node_mut(tail).next = Some(id),
            None => self.head = Some(id),
        }
        self.tail = Some(id);
        id
    }

    /// Caller guarantees the new node ends where the current head starts
    pub(crate) fn push_front(&mut self, offset: u64, class: SizeClass, space: Space) -> NodeId {
        let mut node = Node::new(offset, class, space);
        node.next = self.head;
        let id = self.store(node);
        match self.head {
            Some(head) => self.node_mut(head).prev = Some(id),
            None => self.tail = Some(id),
        }
        self.head = Some(id);
        id
    }

    pub(crate) fn insert_after(
        &mut self,
        after: NodeId,
        offset: u64,
        class: SizeClass,
        space: Space,
    ) -> NodeId {
        let next = self.next(after);
        let mut node = Node::new(offset, class, space);
        node.prev = Some(after);
        node.next = next;
        let id = self.store(node);
        self.node_mut(after).next = Some(id);
        match next {
            Some(next) => self.node_mut(next).prev = Some(id),
            None => self.tail = Some(id),
        }
        id
    }

    /// Unlink a node and vacate its slot
    pub(crate) fn remove(&mut self, id: NodeId) -> Node {
        let node = self.slots[id.index()]
            .take()
            .unwrap_or_else(|| panic!("chain corrupted: dangling node {}", id.index()));
        match node.prev {
            Some(prev) => self.node_mut(prev).next = node.next,
            None => self.head = node.next,
        }
        match node.next {
            Some(next) => self.node_mut(next).prev = node.prev,
            None => self.tail = node.prev,
        }
        self.vacant.push(id);
        self.len -= 1;
        node
    }

    /// Nodes in offset order
    pub(crate) fn iter(&self) -> ChainIter<'_> {
        ChainIter {
            chain: self,
            cursor: self.head,
            forward: true,
        }
    }

    /// Nodes from the tail back to the head
    pub(crate) fn iter_rev(&self) -> ChainIter<'_> {
        ChainIter {
            chain: self,
            cursor: self.tail,
            forward: false,
        }
    }

    fn store(&mut self, node: Node) -> NodeId {
        self.len += 1;
        match self.vacant.pop() {
            Some(id) => {
                self.slots[id.index()] = Some(node);
                id
            }
            None => {
                self.slots.push(Some(node));
                NodeId::from(self.slots.len() - 1)
            }
        }
    }
}

pub(crate) struct ChainIter<'a> {
    chain: &'a Chain,
    cursor: Option<NodeId>,
    forward: bool,
}

impl<'a> Iterator for ChainIter<'a> {
    type Item = (NodeId, &'a Node);

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.cursor?;
        let node = self.chain.node(id);
        self.cursor = if self.forward { node.next } else { node.prev };
        Some((id, node))
    }
}
