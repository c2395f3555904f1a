//! Optimized allocation and collection types for prism.
//!
//! This module provides:
//! - Re-exports of optimized hash collections using AHash
//! - Shared pool capacity configuration used by the block-list pool and the
//!   buffer generator

// Re-export optimized hash collections
pub use ahash::{AHashMap as HashMap, AHashSet as HashSet, RandomState};

/// Type alias for the standard HashMap with AHash for better performance.
pub type AHashMap<K, V> = ahash::AHashMap<K, V>;

/// Type alias for the standard HashSet with AHash for better performance.
pub type AHashSet<T> = ahash::AHashSet<T>;

/// Size-tier configuration shared by the pooled allocators.
///
/// Allocations at or below `small_item_size_limit` items are served from the
/// small tier; anything larger comes from the large tier. The capacity
/// fields bound how many free entries each tier retains before excess
/// allocations are dropped instead of pooled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolCapacities {
    /// Maximum item count served by the small tier.
    pub small_item_size_limit: usize,
    /// Maximum item count served by the large tier. Requests above this are
    /// still honored but never retained in the pool.
    pub large_item_size_limit: usize,
    /// Maximum number of free entries retained in the small tier.
    pub small_pool_capacity: usize,
    /// Maximum number of free entries retained in the large tier.
    pub large_pool_capacity: usize,
}

impl Default for PoolCapacities {
    fn default() -> Self {
        Self {
            small_item_size_limit: 1024,
            large_item_size_limit: 65536,
            small_pool_capacity: 64,
            large_pool_capacity: 8,
        }
    }
}

impl PoolCapacities {
    /// Apply a partial adjustment; `None` fields keep their current value.
    ///
    /// This is the runtime tuning hook exposed by the renderer as
    /// `adjust_pool_capacities`.
    pub fn adjust(
        &mut self,
        small_item_size_limit: Option<usize>,
        large_item_size_limit: Option<usize>,
        small_pool_capacity: Option<usize>,
        large_pool_capacity: Option<usize>,
    ) {
        if let Some(v) = small_item_size_limit {
            self.small_item_size_limit = v.max(1);
        }
        if let Some(v) = large_item_size_limit {
            self.large_item_size_limit = v.max(self.small_item_size_limit);
        }
        if let Some(v) = small_pool_capacity {
            self.small_pool_capacity = v;
        }
        if let Some(v) = large_pool_capacity {
            self.large_pool_capacity = v;
        }
    }

    /// Whether a request for `count` items belongs to the large tier.
    pub fn is_large(&self, count: usize) -> bool {
        count > self.small_item_size_limit
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hashmap_ahash() {
        let mut map = HashMap::new();
        map.insert("key", "value");
        assert_eq!(map.get("key"), Some(&"value"));
    }

    #[test]
    fn test_adjust_partial() {
        let mut caps = PoolCapacities::default();
        caps.adjust(Some(256), None, None, Some(4));
        assert_eq!(caps.small_item_size_limit, 256);
        assert_eq!(caps.large_item_size_limit, 65536);
        assert_eq!(caps.small_pool_capacity, 64);
        assert_eq!(caps.large_pool_capacity, 4);
    }

    #[test]
    fn test_large_limit_clamped_to_small() {
        let mut caps = PoolCapacities::default();
        caps.adjust(Some(4096), Some(16), None, None);
        assert!(caps.large_item_size_limit >= caps.small_item_size_limit);
    }

    #[test]
    fn test_tier_selection() {
        let caps = PoolCapacities::default();
        assert!(!caps.is_large(1024));
        assert!(caps.is_large(1025));
    }
}
