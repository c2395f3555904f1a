//! Shared batch lifecycle plumbing.
//!
//! The two batch kinds flatten their shared behavior into composable pieces
//! (draw list, buffer pool, state machine, sorter) instead of an inheritance
//! chain; what remains common lives in [`BatchHeader`], and the frame driver
//! sees every kind through the object-safe [`Batch`] trait.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::device::Device;
use crate::error::RenderError;
use crate::material::Material;
use crate::state::{BatchLifecycleState, BatchState, LifecycleError};

/// Lifecycle and ordering fields shared by every batch kind.
#[derive(Debug)]
pub struct BatchHeader {
    pub(crate) state: BatchLifecycleState,
    pub(crate) layer: i32,
    pub(crate) sequence: u64,
    pub(crate) material: Option<Arc<Material>>,
    /// Reusable batches are retained by the caller across frames and must
    /// never be mutated by the combiner.
    pub(crate) is_reusable: bool,
    /// Whether the frame driver returns this batch to its pool after issue.
    pub(crate) release_after_draw: bool,
    /// Set when this batch's draw calls were moved into another batch.
    pub(crate) is_combined: bool,
}

impl BatchHeader {
    pub(crate) fn new() -> Self {
        Self {
            state: BatchLifecycleState::default(),
            layer: 0,
            sequence: 0,
            material: None,
            is_reusable: false,
            release_after_draw: true,
            is_combined: false,
        }
    }

    /// Reset for a new lifecycle cycle.
    ///
    /// Forces `NotPrepared` unconditionally, but reports an error if the
    /// prior state was mid-prepare or mid-issue: reinitializing a busy batch
    /// is a caller lifecycle bug that would corrupt pooled buffers.
    pub(crate) fn initialize(
        &mut self,
        layer: i32,
        sequence: u64,
        material: Option<Arc<Material>>,
    ) -> Result<(), RenderError> {
        let prior = self.state.exchange(BatchState::NotPrepared);
        if prior.is_busy() {
            return Err(RenderError::BatchInUse { state: prior });
        }
        self.layer = layer;
        self.sequence = sequence;
        self.material = material;
        self.is_reusable = false;
        self.release_after_draw = true;
        self.is_combined = false;
        Ok(())
    }

    /// Enter `Preparing`; only a freshly initialized batch may be prepared.
    pub(crate) fn begin_prepare(&self) -> Result<(), RenderError> {
        let prior = self.state.exchange(BatchState::Preparing);
        match prior {
            BatchState::NotPrepared => Ok(()),
            BatchState::Invalid => Err(RenderError::BatchInvalid),
            state if state.is_busy() => Err(RenderError::BatchInUse { state }),
            state => Err(RenderError::Lifecycle(LifecycleError {
                expected: BatchState::NotPrepared,
                attempted: BatchState::Preparing,
                actual: state,
            })),
        }
    }

    pub(crate) fn finish_prepare(&self) -> Result<(), RenderError> {
        self.state
            .transition(BatchState::Preparing, BatchState::Prepared)
            .map_err(Into::into)
    }

    pub(crate) fn begin_issue(&self) -> Result<(), RenderError> {
        self.state
            .transition(BatchState::Prepared, BatchState::Issuing)
            .map_err(Into::into)
    }

    pub(crate) fn finish_issue(&self) -> Result<(), RenderError> {
        self.state
            .transition(BatchState::Issuing, BatchState::Issued)
            .map_err(Into::into)
    }

    /// Recycle back to the pool; fields are unspecified until the next
    /// `initialize`.
    pub(crate) fn release(&mut self) {
        self.state.store(BatchState::Invalid);
        self.material = None;
        self.is_combined = false;
    }
}

/// The capability interface every batch kind exposes to the frame driver.
pub trait Batch: Send {
    /// Ordering hint among sibling batches.
    fn layer(&self) -> i32;

    /// Submission sequence, the tie-break within a layer.
    fn sequence(&self) -> u64;

    fn state(&self) -> BatchState;

    /// Sort, pack and partition the accumulated draw calls. Called exactly
    /// once per lifecycle cycle, possibly from a worker thread.
    fn prepare(&mut self) -> Result<(), RenderError>;

    /// Bind device state and emit one instanced draw per sub-batch. Called
    /// exactly once, on the issue thread, after `prepare`.
    fn issue(&mut self, device: &mut dyn Device) -> Result<(), RenderError>;

    /// Drop prepared artifacts and reset to `Invalid` for pooling.
    fn release(&mut self);
}

/// An object pool for batches.
///
/// Batches are acquired from a pool instead of constructed per frame. A
/// released batch's fields are undefined until `initialize` runs on it.
#[derive(Debug)]
pub struct BatchPool<B> {
    free: Mutex<Vec<B>>,
    retain: usize,
}

impl<B: Batch> BatchPool<B> {
    pub fn new(retain: usize) -> Self {
        Self {
            free: Mutex::new(Vec::new()),
            retain,
        }
    }

    /// Take a pooled batch or construct a fresh one.
    pub fn acquire(&self, make: impl FnOnce() -> B) -> B {
        self.free.lock().pop().unwrap_or_else(make)
    }

    /// Reset a batch and return it to the pool (dropped if full).
    pub fn release(&self, mut batch: B) {
        batch.release();
        let mut free = self.free.lock();
        if free.len() < self.retain {
            free.push(batch);
        }
    }

    pub fn free_count(&self) -> usize {
        self.free.lock().len()
    }
}
