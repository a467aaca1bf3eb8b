//! Invalidate-on-write cache of per-region route efficiency.
//!
//! Writers mark the cache dirty after releasing the route lock. The first
//! reader that finds it dirty recomputes every region under the cache lock,
//! so a burst of invalidations costs one recomputation.

use std::collections::BTreeMap;
use std::sync::Mutex;
use trade_core::{lock_or_recover, RegionId};

/// Efficiency reported for a region with no active routes.
pub const DEFAULT_REGION_EFFICIENCY: f64 = 1.0;

#[derive(Debug)]
struct CacheState {
    dirty: bool,
    values: BTreeMap<RegionId, f64>,
    recomputations: u64,
}

#[derive(Debug)]
pub struct EfficiencyCache {
    state: Mutex<CacheState>,
}

impl Default for EfficiencyCache {
    fn default() -> Self {
        Self::new()
    }
}

impl EfficiencyCache {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(CacheState {
                dirty: true,
                values: BTreeMap::new(),
                recomputations: 0,
            }),
        }
    }

    pub fn invalidate(&self) {
        lock_or_recover(&self.state, "efficiency cache").dirty = true;
    }

    pub fn is_dirty(&self) -> bool {
        lock_or_recover(&self.state, "efficiency cache").dirty
    }

    /// Cached value for `region`, recomputing all regions first if dirty.
    ///
    /// `compute` runs while the cache lock is held and may take the route lock.
    pub fn get_or_recompute(
        &self,
        region: RegionId,
        compute: impl FnOnce() -> BTreeMap<RegionId, f64>,
    ) -> f64 {
        let mut state = lock_or_recover(&self.state, "efficiency cache");
        if state.dirty {
            state.values = compute();
            state.dirty = false;
            state.recomputations += 1;
            tracing::debug!(regions = state.values.len(), "region efficiency recomputed");
        }
        state
            .values
            .get(&region)
            .copied()
            .unwrap_or(DEFAULT_REGION_EFFICIENCY)
    }

    /// Number of recomputations so far.
    pub fn recomputations(&self) -> u64 {
        lock_or_recover(&self.state, "efficiency cache").recomputations
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> BTreeMap<RegionId, f64> {
        BTreeMap::from([(RegionId(1), 0.9)])
    }

    #[test]
    fn recomputes_once_per_burst() {
        let cache = EfficiencyCache::new();
        for _ in 0..5 {
            cache.invalidate();
        }
        assert_eq!(cache.get_or_recompute(RegionId(1), table), 0.9);
        assert_eq!(cache.get_or_recompute(RegionId(2), table), 1.0);
        assert_eq!(cache.recomputations(), 1);
        assert!(!cache.is_dirty());
        cache.invalidate();
        cache.get_or_recompute(RegionId(1), table);
        assert_eq!(cache.recomputations(), 2);
    }
}
