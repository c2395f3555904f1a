//! The per-batch lifecycle state machine.
//!
//! Batches are pooled and may be prepared on a worker thread while the issue
//! thread walks other batches. The atomic exchange here is the sole
//! synchronization primitive: any overlapping use of one batch fails loudly
//! instead of corrupting shared pooled buffers.

use std::sync::atomic::{AtomicU32, Ordering};

/// Lifecycle states of a batch.
///
/// `Invalid -> NotPrepared -> Preparing -> Prepared -> Issuing -> Issued`,
/// with release resetting to `Invalid` until the next `initialize`.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BatchState {
    Invalid = 0,
    NotPrepared = 1,
    Preparing = 2,
    Prepared = 3,
    Issuing = 4,
    Issued = 5,
}

impl BatchState {
    fn from_raw(raw: u32) -> Self {
        match raw {
            1 => Self::NotPrepared,
            2 => Self::Preparing,
            3 => Self::Prepared,
            4 => Self::Issuing,
            5 => Self::Issued,
            _ => Self::Invalid,
        }
    }

    /// Whether the batch is mid-operation and must not be touched.
    pub fn is_busy(&self) -> bool {
        matches!(self, Self::Preparing | Self::Issuing)
    }
}

impl std::fmt::Display for BatchState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Invalid => "Invalid",
            Self::NotPrepared => "NotPrepared",
            Self::Preparing => "Preparing",
            Self::Prepared => "Prepared",
            Self::Issuing => "Issuing",
            Self::Issued => "Issued",
        };
        f.write_str(name)
    }
}

/// An illegal lifecycle transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LifecycleError {
    /// The state the transition required.
    pub expected: BatchState,
    /// The state the caller tried to enter.
    pub attempted: BatchState,
    /// The state the batch was actually in.
    pub actual: BatchState,
}

impl std::fmt::Display for LifecycleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Illegal batch transition to {}: expected {}, batch was {}",
            self.attempted, self.expected, self.actual
        )
    }
}

impl std::error::Error for LifecycleError {}

/// Atomic storage for a [`BatchState`].
#[derive(Debug)]
pub struct BatchLifecycleState(AtomicU32);

impl BatchLifecycleState {
    pub fn new(initial: BatchState) -> Self {
        Self(AtomicU32::new(initial as u32))
    }

    pub fn load(&self) -> BatchState {
        BatchState::from_raw(self.0.load(Ordering::Acquire))
    }

    /// Unconditionally swap in `next`, returning the prior state.
    pub fn exchange(&self, next: BatchState) -> BatchState {
        BatchState::from_raw(self.0.swap(next as u32, Ordering::AcqRel))
    }

    /// Compare-and-swap transition; fails with the observed state.
    pub fn transition(&self, from: BatchState, to: BatchState) -> Result<(), LifecycleError> {
        self.0
            .compare_exchange(from as u32, to as u32, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(|actual| LifecycleError {
                expected: from,
                attempted: to,
                actual: BatchState::from_raw(actual),
            })
    }

    /// Unconditional store, used when recycling a batch back to its pool.
    pub fn store(&self, state: BatchState) {
        self.0.store(state as u32, Ordering::Release);
    }
}

impl Default for BatchLifecycleState {
    fn default() -> Self {
        Self::new(BatchState::Invalid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transition_success() {
        let state = BatchLifecycleState::new(BatchState::NotPrepared);
        assert!(state
            .transition(BatchState::NotPrepared, BatchState::Preparing)
            .is_ok());
        assert_eq!(state.load(), BatchState::Preparing);
    }

    #[test]
    fn test_transition_failure_reports_states() {
        let state = BatchLifecycleState::new(BatchState::Issued);
        let err = state
            .transition(BatchState::Prepared, BatchState::Issuing)
            .unwrap_err();
        assert_eq!(err.expected, BatchState::Prepared);
        assert_eq!(err.attempted, BatchState::Issuing);
        assert_eq!(err.actual, BatchState::Issued);
        // Failed CAS must not change the state.
        assert_eq!(state.load(), BatchState::Issued);
    }

    #[test]
    fn test_exchange_returns_prior() {
        let state = BatchLifecycleState::new(BatchState::Invalid);
        assert_eq!(state.exchange(BatchState::NotPrepared), BatchState::Invalid);
        assert_eq!(state.load(), BatchState::NotPrepared);
    }

    #[test]
    fn test_busy_states() {
        assert!(BatchState::Preparing.is_busy());
        assert!(BatchState::Issuing.is_busy());
        assert!(!BatchState::Prepared.is_busy());
        assert!(!BatchState::Invalid.is_busy());
    }
}
