//! Adjacent batch combining.
//!
//! When consecutive batches in a frame share their full device state,
//! issuing them separately wastes draw commands. The combiner walks a run of
//! same-kind batches before prepare and folds each combinable batch into the
//! nearest preceding head; emptied batches stay in the frame but their issue
//! becomes a no-op.

use crate::bitmap::{self, BitmapBatch};
use crate::error::RenderError;

/// Batch kinds that support being folded into an adjacent sibling.
pub trait Combine: Sized {
    /// Whether `rhs` may be appended onto `lhs` without changing output.
    fn can_combine(lhs: &Self, rhs: &Self) -> bool;

    /// Move `rhs`'s draw calls onto `lhs` and mark `rhs` combined.
    fn combine(lhs: &mut Self, rhs: &mut Self) -> Result<(), RenderError>;
}

impl Combine for BitmapBatch {
    fn can_combine(lhs: &Self, rhs: &Self) -> bool {
        bitmap::can_combine(lhs, rhs)
    }

    fn combine(lhs: &mut Self, rhs: &mut Self) -> Result<(), RenderError> {
        bitmap::combine(lhs, rhs)
    }
}

/// Fold combinable runs of adjacent batches in place.
///
/// Each batch is compared against the current head; on success its calls
/// move into the head and the head keeps absorbing, otherwise the batch
/// becomes the new head. Returns how many batches were emptied. Must run
/// before any of the batches is prepared.
pub fn combine_adjacent<B: Combine>(batches: &mut [B]) -> Result<usize, RenderError> {
    let mut combined = 0;
    let mut head_idx = 0;
    for i in 1..batches.len() {
        let (left, right) = batches.split_at_mut(i);
        let head = &mut left[head_idx];
        let next = &mut right[0];
        if B::can_combine(head, next) {
            B::combine(head, next)?;
            combined += 1;
        } else {
            head_idx = i;
        }
    }
    if combined > 0 {
        tracing::debug!(combined, "combined adjacent batches");
    }
    Ok(combined)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fake {
        id: u32,
        calls: Vec<u32>,
        combined: bool,
    }

    impl Combine for Fake {
        fn can_combine(lhs: &Self, rhs: &Self) -> bool {
            !lhs.combined && !rhs.combined && lhs.id == rhs.id
        }

        fn combine(lhs: &mut Self, rhs: &mut Self) -> Result<(), RenderError> {
            lhs.calls.append(&mut rhs.calls);
            rhs.combined = true;
            Ok(())
        }
    }

    fn fake(id: u32, calls: &[u32]) -> Fake {
        Fake {
            id,
            calls: calls.to_vec(),
            combined: false,
        }
    }

    #[test]
    fn test_combines_full_run() {
        let mut batches = [fake(1, &[1]), fake(1, &[2]), fake(1, &[3])];
        assert_eq!(combine_adjacent(&mut batches).unwrap(), 2);
        assert_eq!(batches[0].calls, vec![1, 2, 3]);
        assert!(batches[1].combined && batches[2].combined);
    }

    #[test]
    fn test_head_advances_past_incompatible() {
        let mut batches = [fake(1, &[1]), fake(2, &[2]), fake(2, &[3]), fake(1, &[4])];
        assert_eq!(combine_adjacent(&mut batches).unwrap(), 1);
        assert_eq!(batches[0].calls, vec![1]);
        assert_eq!(batches[1].calls, vec![2, 3]);
        // Separated equal-state runs are not re-merged.
        assert_eq!(batches[3].calls, vec![4]);
    }

    #[test]
    fn test_empty_and_single() {
        let mut none: [Fake; 0] = [];
        assert_eq!(combine_adjacent(&mut none).unwrap(), 0);
        let mut one = [fake(1, &[1])];
        assert_eq!(combine_adjacent(&mut one).unwrap(), 0);
    }
}
