//! Fragmentation-aware sub-allocation inside a target process.
//!
//! OS-level allocation is coarse (page granularity) and expensive, while
//! callers reserve small, variously sized chunks at a high rate. The
//! [`AllocationManager`] keeps a tree of reservations carved out of each
//! OS-granted block: top-level nodes own a block, children are logical
//! sub-ranges freed back to their parent without any OS call. Structural
//! mutation is serialized by an internal lock; queries recompute from the
//! tree and are never cached.

mod arena;

use std::sync::{Mutex, MutexGuard};

use tracing::debug;

use arena::{Node, NodeArena};

use crate::error::AllocError;
use crate::process::{OsAllocator, ProcessMemory};
use crate::range::{AlignmentMode, MemoryRange};

/// Stable handle to an allocation-tree node. Stays valid as a tombstone
/// after the node is freed; any operation through a freed id fails with
/// [`AllocError::DisposedAllocation`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReservationId(usize);

/// Snapshot of a reservation handed back by the manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reservation {
    pub id: ReservationId,
    pub range: MemoryRange,
    pub executable: bool,
}

/// Parameters for [`AllocationManager::reserve`].
#[derive(Debug, Clone, Copy)]
pub struct ReserveRequest {
    pub size: u64,
    pub alignment: u64,
    pub executable: bool,
    /// When set, the reservation must lie entirely within this range.
    pub limit_range: Option<MemoryRange>,
    /// When set, free space near this address is preferred (a tight window
    /// is searched before falling back to the lowest-addressed fit).
    pub near_hint: Option<u64>,
}

impl ReserveRequest {
    pub fn new(size: u64) -> Self {
        Self {
            size,
            alignment: 1,
            executable: false,
            limit_range: None,
            near_hint: None,
        }
    }

    pub fn aligned(mut self, alignment: u64) -> Self {
        self.alignment = alignment;
        self
    }

    pub fn executable(mut self) -> Self {
        self.executable = true;
        self
    }

    pub fn within(mut self, limit: MemoryRange) -> Self {
        self.limit_range = Some(limit);
        self
    }

    pub fn near(mut self, address: u64) -> Self {
        self.near_hint = Some(address);
        self
    }
}

/// Tree-structured sub-allocator over OS-granted blocks.
#[derive(Debug, Default)]
pub struct AllocationManager {
    arena: Mutex<NodeArena>,
}

impl AllocationManager {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, NodeArena> {
        // A panic mid-mutation leaves no dangling OS resource the arena
        // could misreport, so a poisoned lock is recoverable.
        self.arena.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Reserve `size` bytes inside the target, reusing free space in an
    /// existing block when possible and requesting a new OS block
    /// otherwise.
    pub fn reserve<C>(&self, ctx: &C, request: &ReserveRequest) -> Result<Reservation, AllocError>
    where
        C: ProcessMemory + OsAllocator,
    {
        if request.size == 0 {
            return Err(AllocError::ZeroSize);
        }
        let space = ctx.address_space();
        if let Some(limit) = request.limit_range
            && !space.contains(&limit)
        {
            return Err(AllocError::LimitRangeOutOfBounds { limit, space });
        }

        let granularity = ctx.granularity().max(1);
        let mut arena = self.lock();

        if let Some((parent, range)) = find_fit(&arena, request, granularity) {
            let index = arena.attach_child(parent, range, request.executable);
            debug!(start = range.start(), size = request.size, "reserved from existing block");
            return Ok(Reservation {
                id: ReservationId(index),
                range,
                executable: request.executable,
            });
        }

        // No existing block qualifies: obtain a fresh OS block and carve
        // the reservation from its start.
        let block_size = request
            .size
            .checked_next_multiple_of(granularity)
            .ok_or(AllocError::NoFreeMemoryFound)?;
        let block = ctx.alloc_block(
            block_size,
            request.executable,
            request.limit_range,
            request.near_hint,
        )?;
        if let Some(limit) = request.limit_range
            && !limit.contains(&block)
        {
            // The collaborator ignored the bound; hand the block back.
            let _ = ctx.free_block(block);
            return Err(AllocError::NoFreeMemoryFound);
        }
        debug!(
            start = block.start(),
            size = block.byte_len(),
            executable = request.executable,
            "allocated new OS block"
        );

        let fitted = fit_range(&block, request).ok_or_else(|| {
            let _ = ctx.free_block(block);
            AllocError::NoFreeMemoryFound
        })?;

        let parent = arena.push(Node {
            range: block,
            executable: request.executable,
            parent: None,
            children: Vec::new(),
            freed: false,
        });
        let index = arena.attach_child(parent, fitted, request.executable);
        Ok(Reservation {
            id: ReservationId(index),
            range: fitted,
            executable: request.executable,
        })
    }

    /// Carve a child reservation out of an existing node's free space.
    pub fn reserve_within(
        &self,
        parent: ReservationId,
        size: u64,
        alignment: u64,
    ) -> Result<Reservation, AllocError> {
        if size == 0 {
            return Err(AllocError::ZeroSize);
        }
        let mut arena = self.lock();
        let executable = arena.live(parent.0)?.executable;

        let request = ReserveRequest::new(size).aligned(alignment);
        let fitted = arena
            .free_ranges(parent.0)
            .iter()
            .find_map(|free| fit_range(free, &request))
            .ok_or(AllocError::NoSpaceAvailable)?;

        let index = arena.attach_child(parent.0, fitted, executable);
        Ok(Reservation {
            id: ReservationId(index),
            range: fitted,
            executable,
        })
    }

    /// Free a node: children are recursively freed and detached first; a
    /// top-level node additionally releases its OS block, while a child
    /// only returns its sub-range to the parent's free pool.
    pub fn free<C>(&self, ctx: &C, id: ReservationId) -> Result<(), AllocError>
    where
        C: OsAllocator,
    {
        let mut arena = self.lock();
        let node = arena.live(id.0)?;
        let range = node.range;
        let is_top_level = node.parent.is_none();

        arena.detach_from_parent(id.0);
        arena.mark_freed_recursive(id.0);
        drop(arena);

        if is_top_level {
            debug!(start = range.start(), "releasing OS block");
            ctx.free_block(range)?;
        }
        Ok(())
    }

    /// Return `subrange` to the free pool of `id`, removing, shrinking or
    /// splitting any overlapping child reservation. The node's own OS
    /// block (if any) is untouched.
    pub fn free_range(&self, id: ReservationId, subrange: MemoryRange) -> Result<(), AllocError> {
        let mut arena = self.lock();
        arena.live(id.0)?;
        arena.release_range(id.0, subrange);
        Ok(())
    }

    /// Total bytes held by direct child reservations of `id`.
    pub fn total_reserved(&self, id: ReservationId) -> Result<u64, AllocError> {
        let arena = self.lock();
        let node = arena.live(id.0)?;
        Ok(node
            .children
            .iter()
            .filter_map(|&c| arena.get(c))
            .map(|n| n.range.byte_len())
            .sum())
    }

    /// Free bytes remaining inside `id`.
    pub fn remaining_space(&self, id: ReservationId) -> Result<u64, AllocError> {
        let arena = self.lock();
        arena.live(id.0)?;
        Ok(arena.free_ranges(id.0).iter().map(|r| r.byte_len()).sum())
    }

    /// The largest contiguous free sub-range of `id`, if any.
    pub fn largest_free_range(&self, id: ReservationId) -> Result<Option<MemoryRange>, AllocError> {
        let arena = self.lock();
        arena.live(id.0)?;
        Ok(arena
            .free_ranges(id.0)
            .into_iter()
            .max_by_key(|r| r.byte_len()))
    }

    pub fn reservation_range(&self, id: ReservationId) -> Result<MemoryRange, AllocError> {
        Ok(self.lock().live(id.0)?.range)
    }

    pub fn is_freed(&self, id: ReservationId) -> bool {
        let arena = self.lock();
        arena.get(id.0).map(|n| n.freed).unwrap_or(true)
    }

    /// The node owning `id`, or `None` when `id` is itself top-level.
    pub fn parent_of(&self, id: ReservationId) -> Result<Option<ReservationId>, AllocError> {
        Ok(self.lock().live(id.0)?.parent.map(ReservationId))
    }

    /// Live top-level nodes, each owning one OS-granted block.
    pub fn blocks(&self) -> Vec<Reservation> {
        let arena = self.lock();
        arena
            .top_level()
            .into_iter()
            .filter_map(|index| {
                let node = arena.get(index)?;
                Some(Reservation {
                    id: ReservationId(index),
                    range: node.range,
                    executable: node.executable,
                })
            })
            .collect()
    }

    /// Number of live OS-granted blocks.
    pub fn block_count(&self) -> usize {
        self.lock().top_level().len()
    }

    /// Tear down every block, cascading disposal to all reservations. The
    /// first OS release failure is returned after all nodes are already
    /// invalidated.
    pub fn free_all<C>(&self, ctx: &C) -> Result<(), AllocError>
    where
        C: OsAllocator,
    {
        let mut failure = None;
        for block in self.blocks() {
            if let Err(e) = self.free(ctx, block.id) {
                failure.get_or_insert(e);
            }
        }
        match failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// Lowest-addressed fit search over all live top-level nodes.
///
/// With a near hint, a tight window (one granularity unit each side of the
/// hint) is searched first so short-jump-style proximity requests win over
/// strictly-lowest placement; the unrestricted pass runs only if the
/// window yields nothing.
fn find_fit(
    arena: &NodeArena,
    request: &ReserveRequest,
    granularity: u64,
) -> Option<(usize, MemoryRange)> {
    let mut candidates: Vec<(usize, MemoryRange)> = Vec::new();
    for index in arena.top_level() {
        let Some(node) = arena.get(index) else {
            continue;
        };
        if node.executable != request.executable {
            continue;
        }
        if let Some(limit) = request.limit_range
            && !node.range.overlaps(&limit)
        {
            continue;
        }
        for free in arena.free_ranges(index) {
            let free = match request.limit_range {
                Some(limit) => match free.intersect(&limit) {
                    Some(clipped) => clipped,
                    None => continue,
                },
                None => free,
            };
            candidates.push((index, free));
        }
    }
    candidates.sort_by_key(|(_, r)| r.start());

    if let Some(hint) = request.near_hint {
        let window = MemoryRange::new(
            hint.saturating_sub(granularity),
            hint.saturating_add(granularity),
        )?;
        let near = candidates.iter().find_map(|(index, free)| {
            let clipped = free.intersect(&window)?;
            fit_range(&clipped, request).map(|fit| (*index, fit))
        });
        if near.is_some() {
            return near;
        }
    }

    candidates
        .iter()
        .find_map(|(index, free)| fit_range(free, request).map(|fit| (*index, fit)))
}

/// Align `free` and check it still holds `request.size` bytes; returns the
/// exact reservation range on success.
fn fit_range(free: &MemoryRange, request: &ReserveRequest) -> Option<MemoryRange> {
    let aligned = free.aligned_to(request.alignment, AlignmentMode::AlignStart)?;
    if aligned.byte_len() < request.size {
        return None;
    }
    MemoryRange::with_size(aligned.start(), request.size)
}
