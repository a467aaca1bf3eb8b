//! Route registry: the arena of every live route, keyed by [`RouteKey`].

use std::collections::BTreeMap;
use std::ops::Bound;
use trade_core::{RegionId, RouteKey, TradeGood, TradeRoute, TradeStatus};

/// Monthly volume and profit a route credits to each endpoint region.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Contribution {
    pub volume: f64,
    pub profit: f64,
}

impl Contribution {
    pub fn of(route: &TradeRoute) -> Self {
        Self {
            volume: route.effective_volume(),
            profit: route.monthly_profit(),
        }
    }
}

/// Before/after contribution of one route across a mutation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RouteDelta {
    pub key: RouteKey,
    pub before: Contribution,
    pub after: Contribution,
}

impl RouteDelta {
    pub fn is_zero(&self) -> bool {
        self.before == self.after
    }
}

#[derive(Debug, Default, Clone)]
pub struct RouteRegistry {
    routes: BTreeMap<RouteKey, TradeRoute>,
}

impl RouteRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub fn contains(&self, key: &RouteKey) -> bool {
        self.routes.contains_key(key)
    }

    pub fn get(&self, key: &RouteKey) -> Option<&TradeRoute> {
        self.routes.get(key)
    }

    pub fn get_mut(&mut self, key: &RouteKey) -> Option<&mut TradeRoute> {
        self.routes.get_mut(key)
    }

    /// Insert a route under its own key. Returns false, leaving the registry
    /// untouched, if the key is taken.
    pub fn insert(&mut self, route: TradeRoute) -> bool {
        if self.routes.contains_key(&route.key) {
            return false;
        }
        self.routes.insert(route.key, route);
        true
    }

    pub fn remove(&mut self, key: &RouteKey) -> Option<TradeRoute> {
        self.routes.remove(key)
    }

    pub fn clear(&mut self) {
        self.routes.clear();
    }

    pub fn keys(&self) -> impl Iterator<Item = &RouteKey> {
        self.routes.keys()
    }

    pub fn values(&self) -> impl Iterator<Item = &TradeRoute> {
        self.routes.values()
    }

    pub fn from_region(&self, region: RegionId) -> Vec<&TradeRoute> {
        self.values().filter(|r| r.key.source == region).collect()
    }

    pub fn to_region(&self, region: RegionId) -> Vec<&TradeRoute> {
        self.values().filter(|r| r.key.destination == region).collect()
    }

    pub fn for_good(&self, good: TradeGood) -> Vec<&TradeRoute> {
        self.values().filter(|r| r.key.good == good).collect()
    }

    pub fn touching(&self, region: RegionId) -> impl Iterator<Item = &TradeRoute> {
        self.values().filter(move |r| r.key.touches(region))
    }

    pub fn count_with_status(&self, status: TradeStatus) -> usize {
        self.values().filter(|r| r.status == status).count()
    }

    /// Up to `max` keys following `cursor`, wrapping around to the start.
    ///
    /// Repeated calls that pass the last returned key as the next cursor
    /// visit every route before any route is visited twice.
    pub fn batch_after(&self, cursor: Option<RouteKey>, max: usize) -> Vec<RouteKey> {
        let Some(c) = cursor else {
            return self.routes.keys().take(max).copied().collect();
        };
        let mut out: Vec<RouteKey> = self
            .routes
            .range((Bound::Excluded(c), Bound::Unbounded))
            .map(|(k, _)| *k)
            .take(max)
            .collect();
        if out.len() < max {
            let remaining = max - out.len();
            out.extend(
                self.routes
                    .range((Bound::Unbounded, Bound::Included(c)))
                    .map(|(k, _)| *k)
                    .take(remaining),
            );
        }
        out
    }

    /// Sum of contributions per region, from scratch.
    pub fn region_totals(&self) -> BTreeMap<RegionId, Contribution> {
        let mut totals: BTreeMap<RegionId, Contribution> = BTreeMap::new();
        for r in self.values() {
            let c = Contribution::of(r);
            for region in [r.key.source, r.key.destination] {
                let t = totals.entry(region).or_default();
                t.volume += c.volume;
                t.profit += c.profit;
            }
        }
        totals
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn route(src: u32, dst: u32, good: TradeGood) -> TradeRoute {
        TradeRoute {
            key: RouteKey::new(RegionId(src), RegionId(dst), good),
            status: TradeStatus::Active,
            current_volume: 10.0,
            efficiency_rating: 1.0,
            safety_rating: 1.0,
            seasonal_modifier: 1.0,
            source_price: 1.0,
            destination_price: 2.0,
            ..Default::default()
        }
    }

    #[test]
    fn insert_refuses_duplicates() {
        let mut reg = RouteRegistry::new();
        assert!(reg.insert(route(1, 2, TradeGood::Food)));
        assert!(!reg.insert(route(1, 2, TradeGood::Food)));
        assert!(reg.insert(route(1, 2, TradeGood::Wood)));
        assert_eq!(reg.len(), 2);
    }

    #[test]
    fn region_queries() {
        let mut reg = RouteRegistry::new();
        reg.insert(route(1, 2, TradeGood::Food));
        reg.insert(route(2, 3, TradeGood::Food));
        reg.insert(route(3, 1, TradeGood::Iron));
        assert_eq!(reg.from_region(RegionId(1)).len(), 1);
        assert_eq!(reg.to_region(RegionId(1)).len(), 1);
        assert_eq!(reg.for_good(TradeGood::Food).len(), 2);
        assert_eq!(reg.touching(RegionId(2)).count(), 2);
        let totals = reg.region_totals();
        assert_eq!(totals[&RegionId(2)].volume, 20.0);
        assert_eq!(totals[&RegionId(2)].profit, 20.0);
    }

    #[test]
    fn batches_wrap_around() {
        let mut reg = RouteRegistry::new();
        for d in 2..=6 {
            reg.insert(route(1, d, TradeGood::Salt));
        }
        let first = reg.batch_after(None, 3);
        assert_eq!(first.len(), 3);
        let second = reg.batch_after(first.last().copied(), 3);
        assert_eq!(second.len(), 3);
        assert_eq!(second[2], first[0]);
    }

    proptest! {
        #[test]
        fn batches_cover_every_route(n in 1u32..40, max in 1usize..10) {
            let mut reg = RouteRegistry::new();
            for d in 0..n {
                reg.insert(route(1, d + 2, TradeGood::Cloth));
            }
            let mut seen = std::collections::BTreeSet::new();
            let mut cursor = None;
            let rounds = (n as usize).div_ceil(max);
            for _ in 0..rounds {
                let batch = reg.batch_after(cursor, max);
                prop_assert!(batch.len() <= max);
                cursor = batch.last().copied();
                seen.extend(batch);
            }
            prop_assert_eq!(seen.len(), n as usize);
        }
    }
}
