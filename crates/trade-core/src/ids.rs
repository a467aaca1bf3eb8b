//! Stable identifiers shared by every registry.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Region (province) identifier. Zero is reserved and never names a region.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct RegionId(pub u32);

impl RegionId {
    /// True for the reserved zero id.
    pub fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for RegionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Tradable goods.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum TradeGood {
    /// Grain, fish and other staples.
    #[default]
    Food,
    /// Timber.
    Wood,
    /// Quarried stone.
    Stone,
    /// Iron ore and bar iron.
    Iron,
    /// Bullion.
    Gold,
    /// Salt.
    Salt,
    /// Wine.
    Wine,
    /// Woven cloth.
    Cloth,
    /// Imported spices.
    Spices,
    /// Pelts from northern trappers.
    Furs,
}

impl TradeGood {
    /// Every good, in declaration order.
    pub const ALL: [TradeGood; 10] = [
        TradeGood::Food,
        TradeGood::Wood,
        TradeGood::Stone,
        TradeGood::Iron,
        TradeGood::Gold,
        TradeGood::Salt,
        TradeGood::Wine,
        TradeGood::Cloth,
        TradeGood::Spices,
        TradeGood::Furs,
    ];

    /// Lowercase name used in route ids and logs.
    pub fn name(self) -> &'static str {
        match self {
            TradeGood::Food => "food",
            TradeGood::Wood => "wood",
            TradeGood::Stone => "stone",
            TradeGood::Iron => "iron",
            TradeGood::Gold => "gold",
            TradeGood::Salt => "salt",
            TradeGood::Wine => "wine",
            TradeGood::Cloth => "cloth",
            TradeGood::Spices => "spices",
            TradeGood::Furs => "furs",
        }
    }

    /// Stable index, used when deriving RNG streams.
    pub fn index(self) -> u32 {
        self as u32
    }
}

impl fmt::Display for TradeGood {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Route identity: one route per (source, destination, good).
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct RouteKey {
    /// Exporting region.
    pub source: RegionId,
    /// Importing region.
    pub destination: RegionId,
    /// Good carried.
    pub good: TradeGood,
}

impl RouteKey {
    pub fn new(source: RegionId, destination: RegionId, good: TradeGood) -> Self {
        Self {
            source,
            destination,
            good,
        }
    }

    /// True when `region` is either endpoint.
    pub fn touches(&self, region: RegionId) -> bool {
        self.source == region || self.destination == region
    }

    /// The endpoint opposite `region`, if `region` is an endpoint.
    pub fn counterpart(&self, region: RegionId) -> Option<RegionId> {
        if self.source == region {
            Some(self.destination)
        } else if self.destination == region {
            Some(self.source)
        } else {
            None
        }
    }
}

impl fmt::Display for RouteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "route_{}_{}_{}",
            self.source, self.destination, self.good
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn route_key_display_matches_id_format() {
        let key = RouteKey::new(RegionId(1001), RegionId(1003), TradeGood::Iron);
        assert_eq!(key.to_string(), "route_1001_1003_iron");
    }

    #[test]
    fn counterpart_resolves_both_ends() {
        let key = RouteKey::new(RegionId(1), RegionId(2), TradeGood::Food);
        assert_eq!(key.counterpart(RegionId(1)), Some(RegionId(2)));
        assert_eq!(key.counterpart(RegionId(2)), Some(RegionId(1)));
        assert_eq!(key.counterpart(RegionId(3)), None);
        assert!(key.touches(RegionId(2)));
    }

    #[test]
    fn goods_indices_are_distinct() {
        let mut seen: Vec<u32> = TradeGood::ALL.iter().map(|g| g.index()).collect();
        seen.dedup();
        assert_eq!(seen.len(), TradeGood::ALL.len());
    }
}
