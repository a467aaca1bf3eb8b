//! Region entity/component store backed by a `bevy_ecs` world.
//!
//! Each region is one entity carrying a [`Region`] marker. Trade attaches
//! [`RouteLedger`], [`HubPresence`] and [`TradeInventory`] components to it.
//! The ledger totals are the per-region cached aggregates the runtime keeps
//! in step with the route registry.

use bevy_ecs::prelude::*;
use std::collections::BTreeMap;
use trade_core::{HubTier, RegionId, RouteKey, TradeGood};

/// Default storage capacity of a region's inventory.
pub const DEFAULT_STORAGE_CAPACITY: f64 = 1000.0;

/// Identity of a region entity.
#[derive(Component, Clone, Debug, Default, PartialEq)]
pub struct Region {
    pub id: RegionId,
    pub name: String,
}

/// Routes touching a region and their cached monthly totals.
#[derive(Component, Clone, Debug, Default, PartialEq)]
pub struct RouteLedger {
    pub route_ids: Vec<RouteKey>,
    pub total_monthly_volume: f64,
    pub total_monthly_profit: f64,
}

/// Hub state mirrored for other systems.
#[derive(Component, Clone, Debug, Default, PartialEq)]
pub struct HubPresence {
    pub tier: HubTier,
    pub monthly_throughput: f64,
    pub utilization: f64,
}

/// Goods held or moving out of a region.
#[derive(Component, Clone, Debug, PartialEq)]
pub struct TradeInventory {
    pub stored: BTreeMap<TradeGood, f64>,
    pub reserved: BTreeMap<TradeGood, f64>,
    /// Monthly outbound volume per good.
    pub in_transit: BTreeMap<TradeGood, f64>,
    pub storage_capacity: f64,
    /// Outbound volume over storage capacity.
    pub utilization: f64,
}

impl Default for TradeInventory {
    fn default() -> Self {
        Self {
            stored: BTreeMap::new(),
            reserved: BTreeMap::new(),
            in_transit: BTreeMap::new(),
            storage_capacity: DEFAULT_STORAGE_CAPACITY,
            utilization: 0.0,
        }
    }
}

impl TradeInventory {
    pub(crate) fn refresh_utilization(&mut self) {
        let moving: f64 = self.in_transit.values().sum();
        self.utilization = if self.storage_capacity > 0.0 {
            moving / self.storage_capacity
        } else {
            0.0
        };
    }
}

/// Region entities indexed by id.
#[derive(Default)]
pub struct RegionStore {
    world: World,
    index: BTreeMap<RegionId, Entity>,
}

impl RegionStore {
    pub fn new() -> Self {
        Self {
            world: World::new(),
            index: BTreeMap::new(),
        }
    }

    /// Spawn a region entity, or return the existing one.
    pub fn spawn_region(&mut self, id: RegionId, name: impl Into<String>) -> Entity {
        if let Some(&e) = self.index.get(&id) {
            return e;
        }
        let e = self
            .world
            .spawn(Region {
                id,
                name: name.into(),
            })
            .id();
        self.index.insert(id, e);
        e
    }

    pub fn entity(&self, id: RegionId) -> Option<Entity> {
        self.index.get(&id).copied()
    }

    pub fn contains(&self, id: RegionId) -> bool {
        self.index.contains_key(&id)
    }

    pub fn region_count(&self) -> usize {
        self.index.len()
    }

    pub fn get<T: Component>(&self, id: RegionId) -> Option<&T> {
        self.world.get::<T>(self.entity(id)?)
    }

    pub fn has<T: Component>(&self, id: RegionId) -> bool {
        self.get::<T>(id).is_some()
    }

    /// Attach or replace a component. Returns false for an unknown region.
    pub fn insert<T: Component>(&mut self, id: RegionId, component: T) -> bool {
        let Some(e) = self.entity(id) else {
            return false;
        };
        match self.world.get_entity_mut(e) {
            Some(mut entity) => {
                entity.insert(component);
                true
            }
            None => false,
        }
    }

    /// Mutate a component in place. Returns false if it is absent.
    pub fn update<T: Component>(&mut self, id: RegionId, f: impl FnOnce(&mut T)) -> bool {
        let Some(e) = self.entity(id) else {
            return false;
        };
        match self.world.get_mut::<T>(e) {
            Some(mut c) => {
                f(&mut *c);
                true
            }
            None => false,
        }
    }

    /// Ids of regions carrying component `T`, ascending.
    pub fn regions_with<T: Component>(&mut self) -> Vec<RegionId> {
        let mut ids: Vec<RegionId> = self
            .world
            .query_filtered::<&Region, With<T>>()
            .iter(&self.world)
            .map(|r| r.id)
            .collect();
        ids.sort();
        ids
    }

    /// Spawn the region if needed and give it a ledger and an inventory.
    pub fn ensure_trade_components(&mut self, id: RegionId, name: &str) {
        self.spawn_region(id, name);
        if !self.has::<RouteLedger>(id) {
            self.insert(id, RouteLedger::default());
        }
        if !self.has::<TradeInventory>(id) {
            self.insert(id, TradeInventory::default());
        }
    }

    /// Record `key` on both endpoint ledgers.
    pub fn attach_route(&mut self, key: RouteKey) {
        for region in [key.source, key.destination] {
            self.update::<RouteLedger>(region, |l| {
                if !l.route_ids.contains(&key) {
                    l.route_ids.push(key);
                }
            });
        }
    }

    /// Forget `key` on both endpoint ledgers.
    pub fn detach_route(&mut self, key: &RouteKey) {
        for region in [key.source, key.destination] {
            self.update::<RouteLedger>(region, |l| l.route_ids.retain(|k| k != key));
        }
    }

    /// Shift both endpoint totals and the source's outbound goods.
    pub fn apply_route_delta(&mut self, key: &RouteKey, volume_delta: f64, profit_delta: f64) {
        for region in [key.source, key.destination] {
            self.update::<RouteLedger>(region, |l| {
                l.total_monthly_volume += volume_delta;
                l.total_monthly_profit += profit_delta;
            });
        }
        self.update::<TradeInventory>(key.source, |inv| {
            *inv.in_transit.entry(key.good).or_default() += volume_delta;
            inv.refresh_utilization();
        });
    }

    /// Empty every ledger and outbound figure before a rebuild.
    pub fn clear_totals(&mut self) {
        let ids: Vec<RegionId> = self.index.keys().copied().collect();
        for id in ids {
            self.update::<RouteLedger>(id, |l| {
                l.route_ids.clear();
                l.total_monthly_volume = 0.0;
                l.total_monthly_profit = 0.0;
            });
            self.update::<TradeInventory>(id, |inv| {
                inv.in_transit.clear();
                inv.refresh_utilization();
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spawn_is_idempotent() {
        let mut store = RegionStore::new();
        let a = store.spawn_region(RegionId(1), "London");
        let b = store.spawn_region(RegionId(1), "Other");
        assert_eq!(a, b);
        assert_eq!(store.get::<Region>(RegionId(1)).unwrap().name, "London");
        assert_eq!(store.region_count(), 1);
    }

    #[test]
    fn components_attach_to_known_regions_only() {
        let mut store = RegionStore::new();
        store.spawn_region(RegionId(1), "A");
        assert!(store.insert(RegionId(1), HubPresence::default()));
        assert!(!store.insert(RegionId(2), HubPresence::default()));
        assert!(store.has::<HubPresence>(RegionId(1)));
        assert!(!store.has::<RouteLedger>(RegionId(1)));
    }

    #[test]
    fn regions_with_filters_by_component() {
        let mut store = RegionStore::new();
        store.ensure_trade_components(RegionId(3), "C");
        store.spawn_region(RegionId(1), "A");
        store.ensure_trade_components(RegionId(2), "B");
        assert_eq!(
            store.regions_with::<RouteLedger>(),
            vec![RegionId(2), RegionId(3)]
        );
    }

    #[test]
    fn ledger_tracks_routes_and_totals() {
        let mut store = RegionStore::new();
        store.ensure_trade_components(RegionId(1), "A");
        store.ensure_trade_components(RegionId(2), "B");
        let key = RouteKey::new(RegionId(1), RegionId(2), TradeGood::Salt);
        store.attach_route(key);
        store.attach_route(key);
        store.apply_route_delta(&key, 100.0, 25.0);
        let l = store.get::<RouteLedger>(RegionId(2)).unwrap();
        assert_eq!(l.route_ids, vec![key]);
        assert_eq!(l.total_monthly_volume, 100.0);
        let inv = store.get::<TradeInventory>(RegionId(1)).unwrap();
        assert_eq!(inv.in_transit.get(&TradeGood::Salt), Some(&100.0));
        assert!((inv.utilization - 0.1).abs() < 1e-12);

        store.detach_route(&key);
        assert!(store.get::<RouteLedger>(RegionId(1)).unwrap().route_ids.is_empty());
    }
}
