//! Hub registry: one hub per region, tier evolution and upgrades.

use crate::routes::RouteRegistry;
use std::collections::{BTreeMap, BTreeSet};
use trade_core::config::{EconomicParameters, HubThresholds};
use trade_core::{
    DeterministicRng, HubTier, RegionId, RngCategory, RouteKey, TradeError, TradeGood, TradeHub,
};
use trade_econ::calculator::{hub_capacity, hub_reputation, hub_utilization, level_factor};

/// Infrastructure ceiling after upgrades.
pub const MAX_INFRASTRUCTURE: f64 = 3.0;

/// Tier a hub should hold for its traffic; first matching rung wins.
pub fn tier_for(t: &HubThresholds, total_volume: f64, route_count: usize) -> HubTier {
    if total_volume > t.international_port_volume && route_count > t.international_port_routes {
        HubTier::InternationalPort
    } else if total_volume > t.major_center_volume && route_count > t.major_center_routes {
        HubTier::MajorTradingCenter
    } else if route_count > t.crossroads_routes {
        HubTier::Crossroads
    } else if total_volume > t.regional_hub_volume || route_count > t.regional_hub_routes {
        HubTier::RegionalHub
    } else {
        HubTier::LocalMarket
    }
}

/// A tier change produced by [`HubRegistry::evolve_hub`].
#[derive(Clone, Debug, PartialEq)]
pub struct HubEvolution {
    pub region: RegionId,
    pub old_tier: HubTier,
    pub new_tier: HubTier,
    pub new_capacity: f64,
    pub specializations: Vec<TradeGood>,
    pub total_volume: f64,
    pub route_count: usize,
}

#[derive(Clone, Debug)]
pub struct HubRegistry {
    hubs: BTreeMap<RegionId, TradeHub>,
    thresholds: HubThresholds,
    economic: EconomicParameters,
    rng: DeterministicRng,
}

impl HubRegistry {
    pub fn new(thresholds: HubThresholds, economic: EconomicParameters, rng: DeterministicRng) -> Self {
        Self {
            hubs: BTreeMap::new(),
            thresholds,
            economic,
            rng,
        }
    }

    pub fn len(&self) -> usize {
        self.hubs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hubs.is_empty()
    }

    pub fn get(&self, region: RegionId) -> Option<&TradeHub> {
        self.hubs.get(&region)
    }

    pub fn contains(&self, region: RegionId) -> bool {
        self.hubs.contains_key(&region)
    }

    pub fn values(&self) -> impl Iterator<Item = &TradeHub> {
        self.hubs.values()
    }

    pub fn regions(&self) -> Vec<RegionId> {
        self.hubs.keys().copied().collect()
    }

    /// Replace every hub, e.g. after loading a save.
    pub fn replace_all(&mut self, hubs: Vec<TradeHub>) {
        self.hubs = hubs.into_iter().map(|h| (h.region, h)).collect();
    }

    /// Up to `max` regions following `cursor`, wrapping around.
    pub fn batch_after(&self, cursor: Option<RegionId>, max: usize) -> Vec<RegionId> {
        let mut out: Vec<RegionId> = match cursor {
            Some(c) => self.hubs.range(c..).filter(|(r, _)| **r != c).map(|(r, _)| *r).take(max).collect(),
            None => self.hubs.keys().copied().take(max).collect(),
        };
        if let Some(c) = cursor {
            let remaining = max.saturating_sub(out.len());
            out.extend(self.hubs.range(..=c).map(|(r, _)| *r).take(remaining));
        }
        out
    }

    /// Create a hub for `region`. Returns false if one already exists.
    pub fn create_hub(&mut self, region: RegionId, name: &str, tier: HubTier, year: i32) -> bool {
        if self.hubs.contains_key(&region) {
            return false;
        }
        let t = &self.thresholds;
        let e = u64::from(region.0);
        let mut hub = TradeHub::new(region, name);
        hub.tier = tier;
        hub.base_capacity = self.rng.uniform(
            e,
            0,
            0,
            RngCategory::HubCapacity,
            t.base_capacity_min,
            t.base_capacity_max,
        );
        hub.base_infrastructure = self.rng.uniform(
            e,
            0,
            0,
            RngCategory::HubInfrastructure,
            t.infrastructure_min,
            t.infrastructure_max,
        );
        hub.security_rating = t.initial_security;
        hub.established_year = year;
        self.recompute_capacity(&mut hub);
        tracing::info!(%region, name, %tier, capacity = hub.max_capacity, "trade hub created");
        self.hubs.insert(region, hub);
        true
    }

    fn recompute_capacity(&self, hub: &mut TradeHub) {
        let t = &self.thresholds;
        hub.max_capacity = hub_capacity(hub.base_capacity, hub.tier, hub.upgrade_level, t.capacity_per_level);
        hub.infrastructure_bonus = (hub.base_infrastructure
            * level_factor(hub.upgrade_level, t.infrastructure_per_level))
        .min(MAX_INFRASTRUCTURE);
    }

    /// Record both endpoints of a route. Hubs must already exist.
    pub fn attach_route(&mut self, key: RouteKey) {
        if let Some(h) = self.hubs.get_mut(&key.source) {
            h.add_route(key, false);
        }
        if let Some(h) = self.hubs.get_mut(&key.destination) {
            h.add_route(key, true);
        }
    }

    /// Release a route id from both endpoint hubs.
    pub fn detach_route(&mut self, key: &RouteKey) {
        for region in [key.source, key.destination] {
            if let Some(h) = self.hubs.get_mut(&region) {
                h.remove_route(key);
            }
        }
    }

    /// Drop route ids the registry no longer holds. Returns how many went.
    pub fn prune_routes(&mut self, routes: &RouteRegistry) -> usize {
        let mut pruned = 0;
        for hub in self.hubs.values_mut() {
            let stale: Vec<RouteKey> = hub.route_keys().filter(|k| !routes.contains(k)).copied().collect();
            for key in &stale {
                if hub.remove_route(key) {
                    pruned += 1;
                }
            }
        }
        pruned
    }

    /// Tier the hub should hold for the given traffic.
    pub fn determine_optimal_tier(&self, total_volume: f64, route_count: usize) -> HubTier {
        tier_for(&self.thresholds, total_volume, route_count)
    }

    fn hub_volume(hub: &TradeHub, routes: &RouteRegistry) -> f64 {
        hub.route_keys()
            .filter_map(|k| routes.get(k))
            .map(|r| r.effective_volume())
            .sum()
    }

    /// Recompute utilization from the hub's routes. Returns the throughput.
    pub fn update_utilization(&mut self, region: RegionId, routes: &RouteRegistry) -> Option<f64> {
        let max = self.thresholds.max_utilization;
        let hub = self.hubs.get_mut(&region)?;
        let volume = Self::hub_volume(hub, routes);
        hub.current_utilization = hub_utilization(volume, hub.effective_capacity(), max);
        hub.reputation_rating = hub_reputation(
            hub.current_utilization,
            hub.security_rating,
            hub.infrastructure_bonus,
        );
        Some(volume)
    }

    /// Clear and rebuild the specialized-goods set from incoming traffic.
    pub fn update_specializations(&mut self, region: RegionId, routes: &RouteRegistry) {
        let threshold = self.economic.specialization_threshold;
        let bonus = self.economic.specialization_bonus;
        let Some(hub) = self.hubs.get_mut(&region) else {
            return;
        };
        let mut incoming: BTreeMap<TradeGood, f64> = BTreeMap::new();
        for r in hub.incoming_routes.iter().filter_map(|k| routes.get(k)) {
            *incoming.entry(r.key.good).or_default() += r.effective_volume();
        }
        let cap = hub.effective_capacity();
        hub.specialized_goods.clear();
        hub.handling_efficiency.clear();
        for (good, volume) in incoming {
            if volume > cap * threshold {
                hub.specialized_goods.insert(good);
                hub.handling_efficiency.insert(good, bonus);
            }
        }
    }

    /// Move the hub to the tier its traffic warrants.
    ///
    /// On a change, capacity is recomputed and specializations are rebuilt.
    pub fn evolve_hub(&mut self, region: RegionId, routes: &RouteRegistry) -> Option<HubEvolution> {
        let hub = self.hubs.get(&region)?;
        let total_volume = Self::hub_volume(hub, routes);
        let route_count = hub.route_count();
        let new_tier = self.determine_optimal_tier(total_volume, route_count);
        let old_tier = hub.tier;
        if new_tier == old_tier {
            return None;
        }
        let mut hub = self.hubs.remove(&region)?;
        hub.tier = new_tier;
        self.recompute_capacity(&mut hub);
        self.hubs.insert(region, hub);
        self.update_specializations(region, routes);
        self.update_utilization(region, routes);
        let hub = self.hubs.get(&region)?;
        tracing::info!(%region, from = %old_tier, to = %new_tier, total_volume, route_count, "hub evolved");
        Some(HubEvolution {
            region,
            old_tier,
            new_tier,
            new_capacity: hub.max_capacity,
            specializations: hub.specialized_goods.iter().copied().collect(),
            total_volume,
            route_count,
        })
    }

    /// Raise the hub's upgrade level. Returns `Ok(false)` when `level` is not
    /// above the current one.
    pub fn upgrade_hub(&mut self, region: RegionId, level: u8) -> Result<bool, TradeError> {
        let max_level = self.thresholds.max_upgrade_level;
        let per_level = self.thresholds.security_per_level;
        let mut hub = self.hubs.remove(&region).ok_or(TradeError::HubNotFound(region))?;
        let level = level.clamp(1, max_level);
        let upgraded = level > hub.upgrade_level;
        if upgraded {
            let gained = f64::from(level - hub.upgrade_level);
            hub.security_rating = (hub.security_rating + per_level * gained).min(1.0);
            hub.upgrade_level = level;
            self.recompute_capacity(&mut hub);
            tracing::info!(%region, level, capacity = hub.max_capacity, "hub upgraded");
        }
        self.hubs.insert(region, hub);
        Ok(upgraded)
    }

    /// Distinct counterpart regions of the hub's routes.
    pub fn trading_partners(&self, region: RegionId) -> Vec<RegionId> {
        let Some(hub) = self.hubs.get(&region) else {
            return Vec::new();
        };
        hub.route_keys()
            .filter_map(|k| k.counterpart(region))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}
