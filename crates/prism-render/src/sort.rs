//! Draw-call ordering and sub-batch partitioning.
//!
//! Ordering priority, per batch configuration:
//!
//! 1. an explicit declarative sorter supplied by the caller (ties still fall
//!    back to texture identity so same-texture calls batch together);
//! 2. texture identity only, when depth buffering is enabled for the batch
//!    (the depth buffer establishes visual order);
//! 3. (explicit sort key, texture identity) otherwise.
//!
//! Sorting can also be disabled entirely for pre-sorted input. In every mode
//! ties are broken by original insertion index, so output is deterministic.

use std::cmp::Ordering;
use std::sync::Arc;

use crate::draw_list::DrawCallList;

/// A caller-supplied declarative ordering for draw calls.
pub type DeclarativeSorter<T> = Arc<dyn Fn(&T, &T) -> Ordering + Send + Sync>;

/// Sort-relevant projections of a draw-call record.
pub trait SortableDrawCall {
    /// Identity of the texture set, used to group shader-compatible calls.
    fn texture_key(&self) -> u64;

    /// The explicit sort key supplied by the caller.
    fn sort_key(&self) -> f32;
}

/// Compute the issue order for a batch's draw calls.
///
/// Returns `None` when the natural append order is used (sorting disabled or
/// nothing to sort), otherwise the permutation of insertion indices.
pub fn sort_order<T>(
    list: &DrawCallList<T>,
    disable_sorting: bool,
    sorter: Option<&DeclarativeSorter<T>>,
    use_depth_buffer: bool,
) -> Option<Vec<u32>>
where
    T: Copy + SortableDrawCall,
{
    if disable_sorting || list.len() < 2 {
        return None;
    }

    let order = if let Some(sorter) = sorter {
        let sorter = sorter.clone();
        list.sort_indices_by(move |a, b| {
            sorter(a, b).then_with(|| a.texture_key().cmp(&b.texture_key()))
        })
    } else if use_depth_buffer {
        // Texture identity only: call order is irrelevant because the depth
        // buffer resolves visibility.
        list.sort_indices_by(|a, b| a.texture_key().cmp(&b.texture_key()))
    } else {
        list.sort_indices_by(|a, b| {
            a.sort_key()
                .total_cmp(&b.sort_key())
                .then_with(|| a.texture_key().cmp(&b.texture_key()))
        })
    };
    Some(order)
}

/// Access a record through an optional permutation.
pub fn record_at<'a, T: Copy>(
    list: &'a DrawCallList<T>,
    order: Option<&[u32]>,
    position: usize,
) -> &'a T {
    match order {
        Some(indices) => list.get(indices[position] as usize),
        None => list.get(position),
    }
}

/// A contiguous run of draw calls sharing identical GPU state, emitted as one
/// instanced draw.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SubBatch<K> {
    /// The shader-relevant state shared by every call in the run.
    pub key: K,
    /// First instance in the packed buffer.
    pub instance_offset: u32,
    /// Number of instances.
    pub instance_count: u32,
}

/// Partition the ordered draw calls into [`SubBatch`] runs.
///
/// A new run starts whenever the state key differs from the previous
/// record's. This is a greedy run-length grouping, not a globally optimal
/// partition: equal-state runs separated by a differently-stated run are
/// never re-merged. The resulting offsets and counts cover `[0, len)`
/// exactly, in order, with no gaps or overlaps.
pub fn build_sub_batches<T, K, F>(
    list: &DrawCallList<T>,
    order: Option<&[u32]>,
    mut key_of: F,
) -> Vec<SubBatch<K>>
where
    T: Copy,
    K: PartialEq + Copy,
    F: FnMut(&T) -> K,
{
    let count = list.len();
    let mut sub_batches = Vec::new();
    if count == 0 {
        return sub_batches;
    }

    let mut current = key_of(record_at(list, order, 0));
    let mut start = 0u32;

    for i in 1..count {
        let key = key_of(record_at(list, order, i));
        if key != current {
            sub_batches.push(SubBatch {
                key: current,
                instance_offset: start,
                instance_count: i as u32 - start,
            });
            current = key;
            start = i as u32;
        }
    }

    sub_batches.push(SubBatch {
        key: current,
        instance_offset: start,
        instance_count: count as u32 - start,
    });

    sub_batches
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::draw_list::ListPool;

    #[derive(Debug, Clone, Copy)]
    struct Call {
        texture: u64,
        key: f32,
    }

    impl SortableDrawCall for Call {
        fn texture_key(&self) -> u64 {
            self.texture
        }

        fn sort_key(&self) -> f32 {
            self.key
        }
    }

    fn list_of(calls: &[Call]) -> DrawCallList<Call> {
        let mut list = DrawCallList::new(std::sync::Arc::new(ListPool::new()));
        for call in calls {
            list.push(*call);
        }
        list
    }

    #[test]
    fn test_sub_batches_cover_exactly() {
        let list = list_of(&[
            Call { texture: 1, key: 0.0 },
            Call { texture: 1, key: 0.0 },
            Call { texture: 2, key: 0.0 },
            Call { texture: 1, key: 0.0 },
        ]);
        let subs = build_sub_batches(&list, None, |c| c.texture);
        assert_eq!(subs.len(), 3);
        let mut next = 0u32;
        for sb in &subs {
            assert_eq!(sb.instance_offset, next);
            assert!(sb.instance_count > 0);
            next += sb.instance_count;
        }
        assert_eq!(next as usize, list.len());
    }

    #[test]
    fn test_greedy_runs_not_remerged() {
        // Texture 1 appears in two separated runs; they stay separate.
        let list = list_of(&[
            Call { texture: 1, key: 0.0 },
            Call { texture: 2, key: 0.0 },
            Call { texture: 1, key: 0.0 },
        ]);
        let subs = build_sub_batches(&list, None, |c| c.texture);
        assert_eq!(
            subs.iter().map(|s| s.key).collect::<Vec<_>>(),
            vec![1, 2, 1]
        );
    }

    #[test]
    fn test_order_and_texture_sort() {
        let list = list_of(&[
            Call { texture: 2, key: 1.0 },
            Call { texture: 1, key: 1.0 },
            Call { texture: 1, key: 0.0 },
        ]);
        let order = sort_order(&list, false, None, false).unwrap();
        // key 0 first, then key 1 sorted by texture.
        assert_eq!(order, vec![2, 1, 0]);
    }

    #[test]
    fn test_depth_buffer_sorts_by_texture_only() {
        let list = list_of(&[
            Call { texture: 5, key: 9.0 },
            Call { texture: 5, key: 1.0 },
            Call { texture: 3, key: 4.0 },
        ]);
        let order = sort_order(&list, false, None, true).unwrap();
        // Texture 3 first; within texture 5 the append order is kept even
        // though the keys differ.
        assert_eq!(order, vec![2, 0, 1]);
    }

    #[test]
    fn test_declarative_sorter_ties_fall_back_to_texture() {
        let list = list_of(&[
            Call { texture: 7, key: 0.0 },
            Call { texture: 4, key: 0.0 },
        ]);
        let sorter: DeclarativeSorter<Call> = Arc::new(|_, _| Ordering::Equal);
        let order = sort_order(&list, false, Some(&sorter), false).unwrap();
        assert_eq!(order, vec![1, 0]);
    }

    #[test]
    fn test_disabled_sorting_passes_through() {
        let list = list_of(&[
            Call { texture: 9, key: 5.0 },
            Call { texture: 1, key: 0.0 },
        ]);
        assert!(sort_order(&list, true, None, false).is_none());
    }

    #[test]
    fn test_stable_tie_break_by_insertion_index() {
        let list = list_of(&[
            Call { texture: 1, key: 2.0 },
            Call { texture: 1, key: 2.0 },
            Call { texture: 1, key: 2.0 },
        ]);
        let order = sort_order(&list, false, None, false).unwrap();
        assert_eq!(order, vec![0, 1, 2]);
    }
}
