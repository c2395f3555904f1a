//! Frame driving and shared pooled resources.
//!
//! [`RenderShared`] owns every resource the batch kinds draw from (draw-call
//! block pools, the software buffer generator, the shared corner geometry,
//! frame counters). [`RenderManager`] layers batch object pools and the
//! two frame phases on top: a parallel `prepare_all` over worker threads and
//! a serialized `issue_all` on the device thread.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use prism_core::profiling::profile_function;

use crate::batch::{Batch, BatchPool};
use crate::bitmap::{BitmapBatch, BitmapBatchOptions, BitmapDrawCall};
use crate::corner::CornerBuffer;
use crate::buffer::BufferGenerator;
use crate::device::Device;
use crate::draw_list::ListPool;
use crate::error::RenderError;
use crate::material::{Material, MaterialSet};
use crate::raster::{RasterShapeBatch, RasterShapeBatchOptions, RasterShapeDrawCall};

/// Monotonic frame-scoped counters, safe to bump from prepare workers.
#[derive(Debug, Default)]
pub struct FrameStats {
    primitives: AtomicU64,
    commands: AtomicU64,
}

impl FrameStats {
    pub(crate) fn record_primitives(&self, count: u64) {
        self.primitives.fetch_add(count, Ordering::Relaxed);
    }

    pub(crate) fn record_commands(&self, count: u64) {
        self.commands.fetch_add(count, Ordering::Relaxed);
    }

    /// Primitives counted by `prepare` this frame.
    pub fn primitives(&self) -> u64 {
        self.primitives.load(Ordering::Relaxed)
    }

    /// Draw commands emitted by `issue` this frame.
    pub fn commands(&self) -> u64 {
        self.commands.load(Ordering::Relaxed)
    }

    pub fn reset(&self) {
        self.primitives.store(0, Ordering::Relaxed);
        self.commands.store(0, Ordering::Relaxed);
    }
}

/// Pooled resources shared by every batch.
pub struct RenderShared {
    pub(crate) bitmap_lists: Arc<ListPool<BitmapDrawCall>>,
    pub(crate) raster_lists: Arc<ListPool<RasterShapeDrawCall>>,
    pub(crate) buffers: BufferGenerator,
    pub(crate) corner: Mutex<CornerBuffer>,
    pub(crate) stats: FrameStats,
    sequence: AtomicU64,
}

impl RenderShared {
    pub fn new() -> Self {
        Self {
            bitmap_lists: Arc::new(ListPool::new()),
            raster_lists: Arc::new(ListPool::new()),
            buffers: BufferGenerator::new(),
            corner: Mutex::new(CornerBuffer::new()),
            stats: FrameStats::default(),
            sequence: AtomicU64::new(0),
        }
    }

    /// Global submission order; assigned once per batch at `initialize`.
    pub(crate) fn next_sequence(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::Relaxed)
    }

    /// Drop cached hardware corner geometry, e.g. after a device loss.
    pub fn invalidate_device_resources(&self) {
        self.corner.lock().invalidate();
    }
}

impl Default for RenderShared {
    fn default() -> Self {
        Self::new()
    }
}

/// How many released batches each pool retains.
const BATCH_POOL_RETAIN: usize = 128;

/// Owner of the shared resources and the per-kind batch pools.
pub struct RenderManager {
    shared: Arc<RenderShared>,
    bitmap_pool: BatchPool<BitmapBatch>,
    raster_pool: BatchPool<RasterShapeBatch>,
}

impl RenderManager {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(RenderShared::new()),
            bitmap_pool: BatchPool::new(BATCH_POOL_RETAIN),
            raster_pool: BatchPool::new(BATCH_POOL_RETAIN),
        }
    }

    pub fn shared(&self) -> &Arc<RenderShared> {
        &self.shared
    }

    pub fn stats(&self) -> &FrameStats {
        &self.shared.stats
    }

    /// Acquire and initialize a bitmap batch for this frame.
    pub fn acquire_bitmap_batch(
        &self,
        layer: i32,
        material: Arc<Material>,
        options: BitmapBatchOptions,
    ) -> Result<BitmapBatch, RenderError> {
        let shared = self.shared.clone();
        let mut batch = self.bitmap_pool.acquire(|| BitmapBatch::new(shared));
        batch.initialize(layer, material, options)?;
        Ok(batch)
    }

    pub fn release_bitmap_batch(&self, batch: BitmapBatch) {
        self.bitmap_pool.release(batch);
    }

    /// Acquire and initialize a raster shape batch for this frame.
    pub fn acquire_raster_batch(
        &self,
        layer: i32,
        materials: Arc<MaterialSet>,
        options: RasterShapeBatchOptions,
    ) -> Result<RasterShapeBatch, RenderError> {
        let shared = self.shared.clone();
        let mut batch = self.raster_pool.acquire(|| RasterShapeBatch::new(shared));
        batch.initialize(layer, materials, options)?;
        Ok(batch)
    }

    pub fn release_raster_batch(&self, batch: RasterShapeBatch) {
        self.raster_pool.release(batch);
    }

    /// Runtime tuning of every size-tiered pool; `None` keeps a value.
    pub fn adjust_pool_capacities(
        &self,
        small_item_size_limit: Option<usize>,
        large_item_size_limit: Option<usize>,
        small_pool_capacity: Option<usize>,
        large_pool_capacity: Option<usize>,
    ) {
        self.shared.bitmap_lists.adjust_capacities(
            small_item_size_limit,
            large_item_size_limit,
            small_pool_capacity,
            large_pool_capacity,
        );
        self.shared.raster_lists.adjust_capacities(
            small_item_size_limit,
            large_item_size_limit,
            small_pool_capacity,
            large_pool_capacity,
        );
        self.shared.buffers.adjust_pool_capacities(
            small_item_size_limit,
            large_item_size_limit,
            small_pool_capacity,
            large_pool_capacity,
        );
    }

    /// Prepare every batch, fanning out across worker threads.
    ///
    /// Each batch's own state machine rejects double-prepare, so splitting
    /// the slice is the only coordination needed. The first error wins;
    /// remaining batches in other chunks may still have been prepared.
    pub fn prepare_all(&self, batches: &mut [&mut dyn Batch]) -> Result<(), RenderError> {
        profile_function!();
        if batches.is_empty() {
            return Ok(());
        }

        let workers = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
            .min(batches.len());
        if workers <= 1 {
            for batch in batches.iter_mut() {
                batch.prepare()?;
            }
            return Ok(());
        }

        let chunk_len = batches.len().div_ceil(workers);
        let mut first_error = None;
        std::thread::scope(|scope| {
            let mut handles = Vec::with_capacity(workers);
            for chunk in batches.chunks_mut(chunk_len) {
                handles.push(scope.spawn(move || {
                    for batch in chunk.iter_mut() {
                        batch.prepare()?;
                    }
                    Ok::<(), RenderError>(())
                }));
            }
            for handle in handles {
                if let Ok(Err(err)) = handle.join() {
                    first_error.get_or_insert(err);
                }
            }
        });
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Issue every batch in (layer, sequence) order on the calling thread.
    pub fn issue_all(
        &self,
        batches: &mut [&mut dyn Batch],
        device: &mut dyn Device,
    ) -> Result<(), RenderError> {
        profile_function!();
        batches.sort_by_key(|b| (b.layer(), b.sequence()));
        for batch in batches.iter_mut() {
            batch.issue(device)?;
        }
        tracing::trace!(
            batches = batches.len(),
            commands = self.shared.stats.commands(),
            "issued frame batches"
        );
        Ok(())
    }
}

impl Default for RenderManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::BatchState;

    #[test]
    fn test_sequence_is_monotonic() {
        let shared = RenderShared::new();
        let a = shared.next_sequence();
        let b = shared.next_sequence();
        assert!(b > a);
    }

    #[test]
    fn test_stats_accumulate_and_reset() {
        let stats = FrameStats::default();
        stats.record_primitives(10);
        stats.record_primitives(5);
        stats.record_commands(3);
        assert_eq!(stats.primitives(), 15);
        assert_eq!(stats.commands(), 3);
        stats.reset();
        assert_eq!(stats.primitives(), 0);
        assert_eq!(stats.commands(), 0);
    }

    #[test]
    fn test_acquired_batch_is_not_prepared() {
        let manager = RenderManager::new();
        let material = Material::new(1, "bitmap");
        let batch = manager
            .acquire_bitmap_batch(0, material, BitmapBatchOptions::default())
            .unwrap();
        assert_eq!(batch.state(), BatchState::NotPrepared);
        manager.release_bitmap_batch(batch);
        assert_eq!(manager.bitmap_pool.free_count(), 1);
    }
}
