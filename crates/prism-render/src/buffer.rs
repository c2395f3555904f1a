//! Software vertex buffers and the size-tiered buffer generator.
//!
//! A [`SoftwareBuffer`] is CPU-writable staging memory packed during prepare.
//! Promotion to a hardware (GPU-resident) buffer is lazy: it happens on the
//! first [`SoftwareBuffer::set_active`] call during issue. The
//! [`BufferGenerator`] owns the backing memory; a batch holds an allocated
//! buffer only between prepare and the end of issue, then returns it.

use std::sync::atomic::{AtomicU64, Ordering};

use bytemuck::Pod;
use parking_lot::Mutex;
use prism_core::alloc::PoolCapacities;
use prism_core::profiling::profile_function;

use crate::device::{BufferHandle, Device, DeviceError};

/// CPU-writable staging memory for packed instance data.
#[derive(Debug)]
pub struct SoftwareBuffer {
    id: u64,
    data: Vec<u8>,
    stride: usize,
    large: bool,
    hardware: Option<BufferHandle>,
    /// Contents changed since the last hardware promotion.
    dirty: bool,
}

impl SoftwareBuffer {
    fn new(id: u64, byte_capacity: usize, stride: usize, large: bool) -> Self {
        Self {
            id,
            data: Vec::with_capacity(byte_capacity),
            stride,
            large,
            hardware: None,
            dirty: true,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Stride of one packed item in bytes.
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Number of packed items written so far.
    pub fn item_count(&self) -> usize {
        if self.stride == 0 {
            0
        } else {
            self.data.len() / self.stride
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    /// Append one packed item.
    ///
    /// # Panics
    ///
    /// Panics if the item size does not match the buffer stride.
    pub fn push<T: Pod>(&mut self, item: &T) {
        assert_eq!(
            std::mem::size_of::<T>(),
            self.stride,
            "Packed item size {} does not match buffer stride {}",
            std::mem::size_of::<T>(),
            self.stride
        );
        self.data.extend_from_slice(bytemuck::bytes_of(item));
        self.dirty = true;
    }

    fn reset(&mut self, stride: usize) {
        self.data.clear();
        self.stride = stride;
        self.dirty = true;
    }

    /// Promote to a hardware buffer if needed and return its handle.
    ///
    /// Must only be called from the issue thread. Fails fast when the device
    /// cannot provide a buffer; issuing with a missing hardware buffer would
    /// draw garbage.
    pub fn set_active(&mut self, device: &mut dyn Device) -> Result<BufferHandle, DeviceError> {
        if self.dirty || self.hardware.is_none() {
            let handle = device.create_vertex_buffer(&self.data, self.stride)?;
            self.hardware = Some(handle);
            self.dirty = false;
        }
        match self.hardware {
            Some(handle) => Ok(handle),
            None => Err(DeviceError::InvalidHandle),
        }
    }

    /// The hardware handle, if this buffer has been promoted.
    pub fn hardware(&self) -> Option<BufferHandle> {
        self.hardware
    }
}

/// Allocates reusable software buffers from small/large size-tiered pools.
///
/// Shared across all batches and threads; allocation is internally locked
/// since multiple prepares may run concurrently.
#[derive(Debug)]
pub struct BufferGenerator {
    small: Mutex<Vec<SoftwareBuffer>>,
    large: Mutex<Vec<SoftwareBuffer>>,
    capacities: Mutex<PoolCapacities>,
    next_id: AtomicU64,
}

impl BufferGenerator {
    pub fn new() -> Self {
        Self::with_capacities(PoolCapacities::default())
    }

    pub fn with_capacities(capacities: PoolCapacities) -> Self {
        Self {
            small: Mutex::new(Vec::new()),
            large: Mutex::new(Vec::new()),
            capacities: Mutex::new(capacities),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn capacities(&self) -> PoolCapacities {
        *self.capacities.lock()
    }

    /// Runtime tuning hook; `None` keeps the current value.
    pub fn adjust_pool_capacities(
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

    /// Allocate a buffer with capacity for at least `count` items of
    /// `stride` bytes across `stream_count` interleaved streams.
    ///
    /// Reuses the smallest pooled buffer that fits (best fit); otherwise
    /// allocates fresh, rounded up to a power of two for better reuse.
    pub fn allocate(&self, count: usize, stride: usize, stream_count: usize) -> SoftwareBuffer {
        profile_function!();
        let caps = self.capacities();
        let large = caps.is_large(count);
        let needed = count * stride * stream_count.max(1);

        let pool = if large { &self.large } else { &self.small };
        let mut pool = pool.lock();

        let mut best_idx = None;
        let mut best_capacity = usize::MAX;
        for (idx, buffer) in pool.iter().enumerate() {
            let capacity = buffer.data.capacity();
            if capacity >= needed && capacity < best_capacity {
                best_idx = Some(idx);
                best_capacity = capacity;
            }
        }

        if let Some(idx) = best_idx {
            let mut buffer = pool.swap_remove(idx);
            buffer.reset(stride);
            buffer
        } else {
            let id = self.next_id.fetch_add(1, Ordering::Relaxed);
            SoftwareBuffer::new(id, needed.next_power_of_two(), stride, large)
        }
    }

    /// Return a buffer to its tier for reuse.
    ///
    /// The tier retains at most its configured capacity; excess buffers are
    /// dropped. A released buffer keeps its hardware handle so an unchanged
    /// re-fill can skip re-promotion.
    pub fn release(&self, buffer: SoftwareBuffer) {
        let caps = self.capacities();
        let (pool, retain) = if buffer.large {
            (&self.large, caps.large_pool_capacity)
        } else {
            (&self.small, caps.small_pool_capacity)
        };
        let mut pool = pool.lock();
        if pool.len() < retain {
            pool.push(buffer);
        }
    }

    /// Number of free buffers in the small tier (test hook).
    pub fn free_small(&self) -> usize {
        self.small.lock().len()
    }

    /// Number of free buffers in the large tier (test hook).
    pub fn free_large(&self) -> usize {
        self.large.lock().len()
    }
}

impl Default for BufferGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocate_release_round_trip() {
        let generator = BufferGenerator::new();

        let mut buffers = Vec::new();
        for _ in 0..5 {
            buffers.push(generator.allocate(16, 8, 1));
        }
        assert_eq!(generator.free_small(), 0);

        for buffer in buffers {
            generator.release(buffer);
        }
        assert_eq!(generator.free_small(), 5);

        // Re-allocating and releasing the same tier leaves the free list
        // where it started.
        let buffer = generator.allocate(16, 8, 1);
        assert_eq!(generator.free_small(), 4);
        generator.release(buffer);
        assert_eq!(generator.free_small(), 5);
    }

    #[test]
    fn test_tier_selection() {
        let caps = PoolCapacities {
            small_item_size_limit: 8,
            large_item_size_limit: 64,
            small_pool_capacity: 4,
            large_pool_capacity: 4,
        };
        let generator = BufferGenerator::with_capacities(caps);

        generator.release(generator.allocate(8, 4, 1));
        generator.release(generator.allocate(9, 4, 1));
        assert_eq!(generator.free_small(), 1);
        assert_eq!(generator.free_large(), 1);
    }

    #[test]
    fn test_best_fit_reuse() {
        let generator = BufferGenerator::new();
        let a = generator.allocate(4, 4, 1);
        let b = generator.allocate(64, 4, 1);
        let (a_id, b_id) = (a.id(), b.id());
        generator.release(b);
        generator.release(a);

        // A request that fits the small buffer should take it, not the
        // larger one.
        let reused = generator.allocate(4, 4, 1);
        assert_eq!(reused.id(), a_id);
        let reused_large = generator.allocate(64, 4, 1);
        assert_eq!(reused_large.id(), b_id);
    }

    #[test]
    fn test_retention_bound() {
        let caps = PoolCapacities {
            small_item_size_limit: 8,
            large_item_size_limit: 64,
            small_pool_capacity: 2,
            large_pool_capacity: 1,
        };
        let generator = BufferGenerator::with_capacities(caps);
        let buffers: Vec<_> = (0..4).map(|_| generator.allocate(4, 4, 1)).collect();
        for buffer in buffers {
            generator.release(buffer);
        }
        assert_eq!(generator.free_small(), 2);
    }

    #[test]
    fn test_push_tracks_items() {
        let generator = BufferGenerator::new();
        let mut buffer = generator.allocate(4, 8, 1);
        buffer.push(&[1.0f32, 2.0]);
        buffer.push(&[3.0f32, 4.0]);
        assert_eq!(buffer.item_count(), 2);
        assert_eq!(buffer.bytes().len(), 16);
    }
}
