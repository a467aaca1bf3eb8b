//! Trade route records and their lifecycle states.

use crate::config::TradeConfig;
use crate::ids::{RegionId, RouteKey, TradeGood};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Connection classification of a route or a single path segment.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum RouteType {
    #[default]
    Land,
    River,
    Coastal,
    Sea,
    /// Land haul beyond the long-overland threshold.
    OverlandLong,
}

impl RouteType {
    pub const ALL: [RouteType; 5] = [
        RouteType::Land,
        RouteType::River,
        RouteType::Coastal,
        RouteType::Sea,
        RouteType::OverlandLong,
    ];

    pub fn name(self) -> &'static str {
        match self {
            RouteType::Land => "land",
            RouteType::River => "river",
            RouteType::Coastal => "coastal",
            RouteType::Sea => "sea",
            RouteType::OverlandLong => "overland_long",
        }
    }
}

impl fmt::Display for RouteType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Lifecycle state of a route.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TradeStatus {
    /// Being set up by the establishment handler; never observed in the registry.
    #[default]
    Establishing,
    Active,
    Disrupted,
    SeasonalClosed,
    /// Terminal.
    Abandoned,
}

impl TradeStatus {
    /// The closed transition table.
    pub fn can_transition_to(self, next: TradeStatus) -> bool {
        use TradeStatus::*;
        match (self, next) {
            (Abandoned, _) => false,
            (_, Abandoned) => true,
            (Establishing, Active) => true,
            (Active, Disrupted) | (Active, SeasonalClosed) => true,
            (Disrupted, Disrupted) | (Disrupted, Active) => true,
            (SeasonalClosed, Active) | (SeasonalClosed, Disrupted) => true,
            _ => false,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            TradeStatus::Establishing => "establishing",
            TradeStatus::Active => "active",
            TradeStatus::Disrupted => "disrupted",
            TradeStatus::SeasonalClosed => "seasonal_closed",
            TradeStatus::Abandoned => "abandoned",
        }
    }
}

impl fmt::Display for TradeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Recovery bookkeeping of a disrupted route.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouteRecovery {
    /// Volume just before the current disruption began.
    pub pre_disruption_volume: f64,
    /// Safety just before the current disruption began.
    pub pre_disruption_safety: f64,
    /// Months left before automatic restoration.
    pub months_remaining: u32,
    /// Total months of the current disruption, including extensions.
    pub months_total: u32,
    pub is_recovering: bool,
    /// Share of the countdown elapsed, in [0,1].
    pub progress: f64,
}

/// A trade connection moving one good from source to destination.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TradeRoute {
    pub key: RouteKey,
    pub status: TradeStatus,
    pub route_type: RouteType,
    /// Path length in km.
    pub distance_km: f64,
    /// Regions visited, source first.
    pub waypoints: Vec<RegionId>,
    /// Volume at establishment (units per month).
    pub base_volume: f64,
    /// Current volume (units per month).
    pub current_volume: f64,
    pub source_price: f64,
    pub destination_price: f64,
    pub transport_cost_per_unit: f64,
    /// Safety- and efficiency-weighted margin over source price.
    pub profitability: f64,
    /// In [0,1].
    pub safety_rating: f64,
    /// Safety of the path at establishment; conditions drift back toward it.
    pub path_safety: f64,
    /// In (0, max_efficiency].
    pub efficiency_rating: f64,
    pub seasonal_modifier: f64,
    pub travel_days: f64,
    pub disruption_count: u32,
    pub recovery: RouteRecovery,
    pub lifetime_goods_moved: f64,
    pub lifetime_profit: f64,
    pub established_year: i32,
}

impl TradeRoute {
    pub fn source(&self) -> RegionId {
        self.key.source
    }

    pub fn destination(&self) -> RegionId {
        self.key.destination
    }

    pub fn good(&self) -> TradeGood {
        self.key.good
    }

    /// Volume actually delivered per month; zero unless active.
    pub fn effective_volume(&self) -> f64 {
        if self.status != TradeStatus::Active {
            return 0.0;
        }
        self.current_volume * self.efficiency_rating * self.safety_rating * self.seasonal_modifier
    }

    /// Margin per unit after transport.
    pub fn profit_per_unit(&self) -> f64 {
        self.destination_price - self.source_price - self.transport_cost_per_unit
    }

    /// Monthly profit of the delivered volume.
    pub fn monthly_profit(&self) -> f64 {
        self.effective_volume() * self.profit_per_unit()
    }

    /// Whether an established route still pays its way.
    pub fn is_viable(&self, cfg: &TradeConfig) -> bool {
        self.status == TradeStatus::Active
            && self.profitability > cfg.viability.min_profitability
            && self.safety_rating > cfg.viability.min_safety
            && self.current_volume > cfg.viability.min_volume
    }

    pub fn description(&self) -> String {
        format!(
            "{} {} -> {} ({}, {:.0} km, {})",
            self.key.good,
            self.key.source,
            self.key.destination,
            self.route_type,
            self.distance_km,
            self.status
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn active_route() -> TradeRoute {
        TradeRoute {
            key: RouteKey::new(RegionId(1), RegionId(2), TradeGood::Iron),
            status: TradeStatus::Active,
            current_volume: 100.0,
            efficiency_rating: 1.0,
            safety_rating: 0.8,
            seasonal_modifier: 1.0,
            profitability: 0.2,
            ..Default::default()
        }
    }

    #[test]
    fn effective_volume_is_zero_unless_active() {
        let mut r = active_route();
        assert!((r.effective_volume() - 80.0).abs() < 1e-9);
        r.status = TradeStatus::Disrupted;
        assert_eq!(r.effective_volume(), 0.0);
    }

    #[test]
    fn viability_checks_all_thresholds() {
        let cfg = TradeConfig::default();
        let mut r = active_route();
        assert!(r.is_viable(&cfg));
        r.safety_rating = 0.25;
        assert!(!r.is_viable(&cfg));
        r.safety_rating = 0.8;
        r.profitability = 0.01;
        assert!(!r.is_viable(&cfg));
    }

    #[test]
    fn abandoned_is_terminal() {
        for next in [
            TradeStatus::Active,
            TradeStatus::Disrupted,
            TradeStatus::SeasonalClosed,
            TradeStatus::Abandoned,
        ] {
            assert!(!TradeStatus::Abandoned.can_transition_to(next));
        }
    }

    #[test]
    fn transition_table() {
        use TradeStatus::*;
        assert!(Establishing.can_transition_to(Active));
        assert!(Active.can_transition_to(Disrupted));
        assert!(Disrupted.can_transition_to(Disrupted));
        assert!(Disrupted.can_transition_to(Active));
        assert!(SeasonalClosed.can_transition_to(Disrupted));
        assert!(SeasonalClosed.can_transition_to(Active));
        assert!(Active.can_transition_to(Abandoned));
        assert!(!Establishing.can_transition_to(Disrupted));
        assert!(!Disrupted.can_transition_to(SeasonalClosed));
    }
}
