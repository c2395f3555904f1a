//! Growable draw-call lists backed by pooled memory blocks.
//!
//! Batches are filled from many call sites per frame; acquiring fixed-size
//! blocks from a shared pool amortizes allocation cost across frames instead
//! of per-batch. Blocks go back to the pool on `clear`, they are never
//! deallocated mid-frame.

use std::cmp::Ordering;
use std::sync::Arc;

use parking_lot::Mutex;
use prism_core::alloc::PoolCapacities;

/// Thread-safe pool of backing blocks, shared by every list of one record
/// type. Small and large tiers bound fragmentation: short lists do not pin
/// huge blocks and long lists do not churn through tiny ones.
#[derive(Debug)]
pub struct ListPool<T> {
    small: Mutex<Vec<Vec<T>>>,
    large: Mutex<Vec<Vec<T>>>,
    capacities: Mutex<PoolCapacities>,
}

impl<T> ListPool<T> {
    pub fn new() -> Self {
        Self::with_capacities(PoolCapacities::default())
    }

    pub fn with_capacities(capacities: PoolCapacities) -> Self {
        Self {
            small: Mutex::new(Vec::new()),
            large: Mutex::new(Vec::new()),
            capacities: Mutex::new(capacities),
        }
    }

    pub fn capacities(&self) -> PoolCapacities {
        *self.capacities.lock()
    }

    /// Runtime tuning hook; `None` keeps the current value.
    pub fn adjust_capacities(
        &self,
        small_item_size_limit: Option<usize>,
        large_item_size_limit: Option<usize>,
        small_pool_capacity: Option<usize>,
        large_pool_capacity: Option<usize>,
    ) {
        self.capacities.lock().adjust(
            small_item_size_limit,
            large_item_size_limit,
            small_pool_capacity,
            large_pool_capacity,
        );
    }

    /// Logical block length for a tier under the current configuration.
    pub(crate) fn block_len(&self, large: bool) -> usize {
        let caps = self.capacities();
        let len = if large {
            caps.large_item_size_limit
        } else {
            caps.small_item_size_limit
        };
        len.max(1)
    }

    fn acquire_block(&self, large: bool, block_len: usize) -> Vec<T> {
        let stack = if large { &self.large } else { &self.small };
        let mut block = stack
            .lock()
            .pop()
            .unwrap_or_else(|| Vec::with_capacity(block_len));
        if block.capacity() < block_len {
            block.reserve(block_len - block.capacity());
        }
        block
    }

    fn release_block(&self, mut block: Vec<T>, large: bool) {
        block.clear();
        let caps = self.capacities();
        let (stack, retain) = if large {
            (&self.large, caps.large_pool_capacity)
        } else {
            (&self.small, caps.small_pool_capacity)
        };
        let mut stack = stack.lock();
        if stack.len() < retain {
            stack.push(block);
        }
        // Excess blocks are dropped here; the pool never grows past its
        // configured retention.
    }

    /// Number of free blocks in the small tier (test hook).
    pub fn free_small(&self) -> usize {
        self.small.lock().len()
    }

    /// Number of free blocks in the large tier (test hook).
    pub fn free_large(&self) -> usize {
        self.large.lock().len()
    }
}

impl<T> Default for ListPool<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// An append-only, resettable sequence of draw-call records.
///
/// Owned exclusively by one batch. The count is monotonically non-decreasing
/// between `clear` calls; records are never removed individually.
#[derive(Debug)]
pub struct DrawCallList<T: Copy> {
    pool: Arc<ListPool<T>>,
    blocks: Vec<Vec<T>>,
    /// Logical capacity of each block, fixed at list construction so index
    /// math stays O(1) even when pooled blocks over-allocate.
    block_len: usize,
    large: bool,
    len: usize,
}

impl<T: Copy> DrawCallList<T> {
    pub fn new(pool: Arc<ListPool<T>>) -> Self {
        let block_len = pool.block_len(false);
        Self {
            pool,
            blocks: Vec::new(),
            block_len,
            large: false,
            len: 0,
        }
    }

    /// Steer block allocation toward the large tier when the caller expects
    /// many records.
    pub fn with_capacity_hint(pool: Arc<ListPool<T>>, capacity: usize) -> Self {
        let large = pool.capacities().is_large(capacity);
        let block_len = pool.block_len(large);
        Self {
            pool,
            blocks: Vec::new(),
            block_len,
            large,
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Append a record. O(1) amortized; acquires a pooled block when the
    /// current one fills up.
    pub fn push(&mut self, item: T) {
        if self.len == self.blocks.len() * self.block_len {
            self.blocks
                .push(self.pool.acquire_block(self.large, self.block_len));
        }
        let block = self
            .blocks
            .last_mut()
            .expect("just ensured a block exists");
        block.push(item);
        self.len += 1;
    }

    /// Read a record by insertion index.
    ///
    /// # Panics
    ///
    /// Panics if `index >= len`.
    pub fn get(&self, index: usize) -> &T {
        assert!(index < self.len, "draw call index {} out of range", index);
        &self.blocks[index / self.block_len][index % self.block_len]
    }

    /// Mutate a record in place (used by append-time transforms only).
    pub fn get_mut(&mut self, index: usize) -> &mut T {
        assert!(index < self.len, "draw call index {} out of range", index);
        &mut self.blocks[index / self.block_len][index % self.block_len]
    }

    /// Iterate in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.blocks.iter().flat_map(|b| b.iter())
    }

    /// Reset the count to zero, returning backing blocks to the pool without
    /// deallocating them.
    pub fn clear(&mut self) {
        for block in self.blocks.drain(..) {
            self.pool.release_block(block, self.large);
        }
        self.len = 0;
    }

    /// Stable indexed sort: returns the permutation of insertion indices that
    /// orders the records under `cmp`. Ties keep insertion order, making the
    /// result deterministic for equal keys.
    pub fn sort_indices_by<F>(&self, mut cmp: F) -> Vec<u32>
    where
        F: FnMut(&T, &T) -> Ordering,
    {
        let mut indices: Vec<u32> = (0..self.len as u32).collect();
        indices.sort_by(|&a, &b| {
            cmp(self.get(a as usize), self.get(b as usize)).then_with(|| a.cmp(&b))
        });
        indices
    }
}

impl<T: Copy> Drop for DrawCallList<T> {
    fn drop(&mut self) {
        self.clear();
    }
}

impl<T: Copy> std::ops::Index<usize> for DrawCallList<T> {
    type Output = T;

    fn index(&self, index: usize) -> &T {
        self.get(index)
    }
}
