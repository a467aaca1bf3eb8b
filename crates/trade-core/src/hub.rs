//! Trading hub records.

use crate::ids::{RegionId, RouteKey, TradeGood};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Hub classification, ordered from smallest to largest.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum HubTier {
    #[default]
    LocalMarket,
    RegionalHub,
    Crossroads,
    MajorTradingCenter,
    InternationalPort,
}

impl HubTier {
    /// Capacity multiplier applied to the region's base capacity.
    pub fn capacity_multiplier(self) -> f64 {
        match self {
            HubTier::LocalMarket => 1.0,
            HubTier::RegionalHub => 2.0,
            HubTier::Crossroads => 3.0,
            HubTier::MajorTradingCenter => 5.0,
            HubTier::InternationalPort => 10.0,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            HubTier::LocalMarket => "local_market",
            HubTier::RegionalHub => "regional_hub",
            HubTier::Crossroads => "crossroads",
            HubTier::MajorTradingCenter => "major_trading_center",
            HubTier::InternationalPort => "international_port",
        }
    }
}

impl fmt::Display for HubTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A region's trading hub. Hubs reference routes by key only.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TradeHub {
    pub region: RegionId,
    pub name: String,
    pub tier: HubTier,
    /// Throughput capacity in units per month, before modifiers.
    pub max_capacity: f64,
    /// Capacity before tier and upgrade scaling; fixed per region.
    pub base_capacity: f64,
    pub infrastructure_bonus: f64,
    /// Infrastructure before upgrade scaling; fixed per region.
    pub base_infrastructure: f64,
    /// Throughput over effective capacity, in [0, max_utilization].
    pub current_utilization: f64,
    pub security_rating: f64,
    pub reputation_rating: f64,
    /// In [1, max_upgrade_level].
    pub upgrade_level: u8,
    pub specialized_goods: BTreeSet<TradeGood>,
    pub handling_efficiency: BTreeMap<TradeGood, f64>,
    pub incoming_routes: Vec<RouteKey>,
    pub outgoing_routes: Vec<RouteKey>,
    pub established_year: i32,
}

impl Default for TradeHub {
    fn default() -> Self {
        Self {
            region: RegionId::default(),
            name: String::new(),
            tier: HubTier::LocalMarket,
            max_capacity: 100.0,
            base_capacity: 100.0,
            infrastructure_bonus: 1.0,
            base_infrastructure: 1.0,
            current_utilization: 0.0,
            security_rating: 0.9,
            reputation_rating: 1.0,
            upgrade_level: 1,
            specialized_goods: BTreeSet::new(),
            handling_efficiency: BTreeMap::new(),
            incoming_routes: Vec::new(),
            outgoing_routes: Vec::new(),
            established_year: 0,
        }
    }
}

impl TradeHub {
    pub fn new(region: RegionId, name: impl Into<String>) -> Self {
        Self {
            region,
            name: name.into(),
            ..Default::default()
        }
    }

    /// Capacity after infrastructure and reputation.
    pub fn effective_capacity(&self) -> f64 {
        self.max_capacity * self.infrastructure_bonus * (self.reputation_rating * 0.5 + 0.5)
    }

    /// Whether `additional` units fit without exceeding full utilization.
    pub fn can_handle_volume(&self, additional: f64) -> bool {
        let cap = self.effective_capacity();
        if cap <= 0.0 {
            return false;
        }
        self.current_utilization + additional / cap <= 1.0
    }

    pub fn route_count(&self) -> usize {
        self.incoming_routes.len() + self.outgoing_routes.len()
    }

    /// All route keys touching this hub, incoming first.
    pub fn route_keys(&self) -> impl Iterator<Item = &RouteKey> {
        self.incoming_routes.iter().chain(self.outgoing_routes.iter())
    }

    /// Record a route endpoint. Returns false if it was already recorded.
    pub fn add_route(&mut self, key: RouteKey, incoming: bool) -> bool {
        let list = if incoming {
            &mut self.incoming_routes
        } else {
            &mut self.outgoing_routes
        };
        if list.contains(&key) {
            return false;
        }
        list.push(key);
        true
    }

    /// Forget a route on both lists. Returns true if anything was removed.
    pub fn remove_route(&mut self, key: &RouteKey) -> bool {
        let before = self.route_count();
        self.incoming_routes.retain(|k| k != key);
        self.outgoing_routes.retain(|k| k != key);
        self.route_count() != before
    }

    pub fn is_specialized_in(&self, good: TradeGood) -> bool {
        self.specialized_goods.contains(&good)
    }

    /// Handling multiplier for `good`; 1.0 unless specialized.
    pub fn handling_efficiency_for(&self, good: TradeGood) -> f64 {
        self.handling_efficiency.get(&good).copied().unwrap_or(1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(dst: u32) -> RouteKey {
        RouteKey::new(RegionId(1), RegionId(dst), TradeGood::Wood)
    }

    #[test]
    fn add_route_never_duplicates() {
        let mut hub = TradeHub::new(RegionId(1), "Test");
        assert!(hub.add_route(key(2), false));
        assert!(!hub.add_route(key(2), false));
        assert!(hub.add_route(key(3), false));
        assert_eq!(hub.outgoing_routes.len(), 2);
    }

    #[test]
    fn remove_route_clears_both_lists() {
        let mut hub = TradeHub::new(RegionId(1), "Test");
        hub.add_route(key(2), false);
        hub.add_route(key(2), true);
        assert!(hub.remove_route(&key(2)));
        assert_eq!(hub.route_count(), 0);
        assert!(!hub.remove_route(&key(2)));
    }

    #[test]
    fn effective_capacity_scales_with_reputation() {
        let mut hub = TradeHub::new(RegionId(1), "Test");
        hub.max_capacity = 200.0;
        hub.infrastructure_bonus = 1.5;
        hub.reputation_rating = 1.0;
        assert!((hub.effective_capacity() - 300.0).abs() < 1e-9);
        hub.reputation_rating = 2.0;
        assert!((hub.effective_capacity() - 450.0).abs() < 1e-9);
    }

    #[test]
    fn capacity_check_counts_current_load() {
        let mut hub = TradeHub::new(RegionId(1), "Test");
        hub.max_capacity = 100.0;
        hub.current_utilization = 0.5;
        assert!(hub.can_handle_volume(50.0));
        assert!(!hub.can_handle_volume(51.0));
    }

    #[test]
    fn tiers_are_ordered() {
        assert!(HubTier::InternationalPort > HubTier::MajorTradingCenter);
        assert!(HubTier::Crossroads > HubTier::RegionalHub);
        assert_eq!(HubTier::InternationalPort.capacity_multiplier(), 10.0);
    }
}
