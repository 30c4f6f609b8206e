//! Arena storage for the allocation tree.
//!
//! Nodes live in a flat vector and refer to each other by index, never by
//! reference. A freed node keeps its slot as a tombstone so its index can
//! never be confused with a live reservation; indices are handed to callers
//! as [`ReservationId`](crate::alloc::ReservationId)s and stay stable for
//! the lifetime of the manager.

use crate::error::AllocError;
use crate::range::{MemoryRange, RangeExclusion};

#[derive(Debug, Clone)]
pub(crate) struct Node {
    pub range: MemoryRange,
    pub executable: bool,
    /// `None` for a top-level node owning an OS block.
    pub parent: Option<usize>,
    /// Child reservation indices, ordered by start address, mutually
    /// non-overlapping, all contained in `range`.
    pub children: Vec<usize>,
    pub freed: bool,
}

#[derive(Debug, Default)]
pub(crate) struct NodeArena {
    nodes: Vec<Node>,
}

impl NodeArena {
    pub fn push(&mut self, node: Node) -> usize {
        self.nodes.push(node);
        self.nodes.len() - 1
    }

    pub fn get(&self, index: usize) -> Option<&Node> {
        self.nodes.get(index)
    }

    /// A node that must still be alive. Freed or unknown indices are a
    /// caller bug and fail loudly.
    pub fn live(&self, index: usize) -> Result<&Node, AllocError> {
        match self.nodes.get(index) {
            Some(node) if !node.freed => Ok(node),
            _ => Err(AllocError::DisposedAllocation),
        }
    }

    /// Indices of live top-level nodes, in creation order.
    pub fn top_level(&self) -> Vec<usize> {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| !n.freed && n.parent.is_none())
            .map(|(i, _)| i)
            .collect()
    }

    /// The disjoint free sub-ranges of a node, ascending: the node's own
    /// range minus every live child reservation.
    pub fn free_ranges(&self, index: usize) -> Vec<MemoryRange> {
        let node = &self.nodes[index];
        let mut free = vec![node.range];
        for &child in &node.children {
            let child_range = self.nodes[child].range;
            free = free
                .iter()
                .flat_map(|r| r.exclude(&child_range).into_vec())
                .collect();
        }
        free.sort_by_key(|r| r.start());
        free
    }

    /// Attach a new child reservation, keeping the child list ordered.
    pub fn attach_child(&mut self, parent: usize, range: MemoryRange, executable: bool) -> usize {
        let index = self.push(Node {
            range,
            executable,
            parent: Some(parent),
            children: Vec::new(),
            freed: false,
        });
        self.insert_child_sorted(parent, index);
        index
    }

    pub fn insert_child_sorted(&mut self, parent: usize, child: usize) {
        let start = self.nodes[child].range.start();
        let position = self.nodes[parent]
            .children
            .iter()
            .position(|&c| self.nodes[c].range.start() > start)
            .unwrap_or(self.nodes[parent].children.len());
        self.nodes[parent].children.insert(position, child);
    }

    /// Mark a node and all of its descendants freed, clearing child lists.
    pub fn mark_freed_recursive(&mut self, index: usize) {
        let children = std::mem::take(&mut self.nodes[index].children);
        for child in children {
            self.mark_freed_recursive(child);
        }
        self.nodes[index].freed = true;
    }

    /// Detach `child` from its parent's child list, if it has a parent.
    pub fn detach_from_parent(&mut self, child: usize) {
        if let Some(parent) = self.nodes[child].parent {
            self.nodes[parent].children.retain(|&c| c != child);
        }
    }

    /// Shrink, remove, or split the children of `index` overlapping
    /// `subrange`, recursing depth-first so grandchildren never end up
    /// outside their parent.
    pub fn release_range(&mut self, index: usize, subrange: MemoryRange) {
        let children = self.nodes[index].children.clone();
        for child in children {
            let child_range = self.nodes[child].range;
            if !child_range.overlaps(&subrange) {
                continue;
            }
            self.release_range(child, subrange);

            match child_range.exclude(&subrange) {
                RangeExclusion::Empty => {
                    self.mark_freed_recursive(child);
                    self.nodes[index].children.retain(|&c| c != child);
                }
                RangeExclusion::One(remaining) => {
                    self.nodes[child].range = remaining;
                }
                RangeExclusion::Two(before, after) => {
                    self.split_child(index, child, before, after);
                }
            }
        }
    }

    /// Split `child` into two sibling reservations covering `before` and
    /// `after`, partitioning its children between the halves.
    fn split_child(&mut self, parent: usize, child: usize, before: MemoryRange, after: MemoryRange) {
        let executable = self.nodes[child].executable;
        let grandchildren = std::mem::take(&mut self.nodes[child].children);

        self.nodes[child].range = before;
        let sibling = self.push(Node {
            range: after,
            executable,
            parent: Some(parent),
            children: Vec::new(),
            freed: false,
        });

        for grandchild in grandchildren {
            let range = self.nodes[grandchild].range;
            if before.contains(&range) {
                self.nodes[child].children.push(grandchild);
            } else {
                self.nodes[grandchild].parent = Some(sibling);
                self.nodes[sibling].children.push(grandchild);
            }
        }
        self.insert_child_sorted(parent, sibling);
    }
}
