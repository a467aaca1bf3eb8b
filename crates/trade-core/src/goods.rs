//! Static per-good properties and the catalog that holds them.

use crate::config::ConfigError;
use crate::ids::TradeGood;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Static economic properties of a good.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TradeGoodProperties {
    pub good: TradeGood,
    /// Reference price before supply and demand.
    pub base_value: f64,
    /// Transport weight factor.
    pub bulk_factor: f64,
    /// Spoilage per 1000 km, in [0,1].
    pub perishability: f64,
    pub luxury_factor: f64,
    pub demand_elasticity: f64,
    pub supply_elasticity: f64,
    pub volatility: f64,
    /// January first.
    pub seasonal_demand: [f64; 12],
    /// January first.
    pub seasonal_supply: [f64; 12],
    pub available: bool,
    pub introduction_year: i32,
    pub obsolescence_year: i32,
}

impl Default for TradeGoodProperties {
    fn default() -> Self {
        Self {
            good: TradeGood::default(),
            base_value: 1.0,
            bulk_factor: 1.0,
            perishability: 0.0,
            luxury_factor: 0.0,
            demand_elasticity: 1.0,
            supply_elasticity: 1.0,
            volatility: 0.1,
            seasonal_demand: [1.0; 12],
            seasonal_supply: [1.0; 12],
            available: true,
            introduction_year: 1000,
            obsolescence_year: 9999,
        }
    }
}

fn month_index(month: u32) -> Option<usize> {
    (1..=12).contains(&month).then(|| month as usize - 1)
}

impl TradeGoodProperties {
    /// Demand multiplier for `month` (1..=12); 1.0 outside that range.
    pub fn seasonal_demand(&self, month: u32) -> f64 {
        month_index(month).map_or(1.0, |i| self.seasonal_demand[i])
    }

    /// Supply multiplier for `month` (1..=12); 1.0 outside that range.
    pub fn seasonal_supply(&self, month: u32) -> f64 {
        month_index(month).map_or(1.0, |i| self.seasonal_supply[i])
    }

    /// Whether the good can be traded in `year`.
    pub fn is_available(&self, year: i32) -> bool {
        self.available && year >= self.introduction_year && year < self.obsolescence_year
    }
}

/// Read-only lookup of good properties.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TradeGoodCatalog {
    goods: BTreeMap<TradeGood, TradeGoodProperties>,
}

/// Neutral value used for goods missing from the catalog.
pub const DEFAULT_GOOD_VALUE: f64 = 1.0;

impl TradeGoodCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// The stock catalog shipped with the game.
    pub fn standard() -> Self {
        let mut c = Self::new();
        let base = TradeGoodProperties::default;

        let mut food = TradeGoodProperties {
            good: TradeGood::Food,
            base_value: 0.5,
            bulk_factor: 1.5,
            perishability: 0.3,
            demand_elasticity: 0.5,
            supply_elasticity: 0.8,
            ..base()
        };
        // harvest
        food.seasonal_supply = [0.7, 0.7, 0.8, 0.9, 1.0, 1.0, 1.1, 1.3, 1.4, 1.3, 1.0, 0.8];
        food.seasonal_demand = [1.2, 1.2, 1.1, 1.0, 1.0, 0.9, 0.9, 0.9, 1.0, 1.0, 1.1, 1.2];
        c.insert(food);

        let mut wood = TradeGoodProperties {
            good: TradeGood::Wood,
            base_value: 1.0,
            bulk_factor: 2.0,
            demand_elasticity: 1.2,
            ..base()
        };
        wood.seasonal_demand = [1.3, 1.3, 1.1, 1.0, 0.9, 0.9, 0.9, 0.9, 1.0, 1.1, 1.2, 1.3];
        c.insert(wood);

        c.insert(TradeGoodProperties {
            good: TradeGood::Stone,
            base_value: 1.5,
            bulk_factor: 3.5,
            demand_elasticity: 0.8,
            ..base()
        });
        c.insert(TradeGoodProperties {
            good: TradeGood::Iron,
            base_value: 3.0,
            bulk_factor: 3.0,
            demand_elasticity: 1.5,
            ..base()
        });
        c.insert(TradeGoodProperties {
            good: TradeGood::Gold,
            base_value: 10.0,
            bulk_factor: 0.5,
            luxury_factor: 1.0,
            demand_elasticity: 2.0,
            volatility: 0.2,
            ..base()
        });

        let mut salt = TradeGoodProperties {
            good: TradeGood::Salt,
            base_value: 2.0,
            bulk_factor: 1.0,
            demand_elasticity: 0.4,
            ..base()
        };
        salt.seasonal_supply = [0.8, 0.8, 0.9, 1.0, 1.2, 1.3, 1.3, 1.3, 1.1, 1.0, 0.9, 0.8];
        c.insert(salt);

        let mut wine = TradeGoodProperties {
            good: TradeGood::Wine,
            base_value: 4.0,
            bulk_factor: 1.5,
            perishability: 0.1,
            luxury_factor: 0.5,
            demand_elasticity: 1.2,
            ..base()
        };
        wine.seasonal_supply = [0.9, 0.8, 0.8, 0.8, 0.9, 0.9, 1.0, 1.0, 1.5, 1.5, 1.2, 1.0];
        wine.seasonal_demand = [1.1, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.1, 1.3];
        c.insert(wine);

        c.insert(TradeGoodProperties {
            good: TradeGood::Cloth,
            base_value: 5.0,
            bulk_factor: 1.0,
            luxury_factor: 0.3,
            demand_elasticity: 1.3,
            ..base()
        });
        c.insert(TradeGoodProperties {
            good: TradeGood::Spices,
            base_value: 15.0,
            bulk_factor: 0.3,
            perishability: 0.05,
            luxury_factor: 0.9,
            demand_elasticity: 2.5,
            volatility: 0.3,
            introduction_year: 1100,
            ..base()
        });

        let mut furs = TradeGoodProperties {
            good: TradeGood::Furs,
            base_value: 8.0,
            bulk_factor: 0.8,
            perishability: 0.05,
            luxury_factor: 0.7,
            demand_elasticity: 1.4,
            ..base()
        };
        // trapping stops in summer
        furs.seasonal_supply = [1.5, 1.5, 1.2, 0.8, 0.4, 0.3, 0.3, 0.4, 0.8, 1.2, 1.4, 1.5];
        furs.seasonal_demand = [1.4, 1.3, 1.1, 0.9, 0.8, 0.7, 0.7, 0.8, 1.0, 1.2, 1.3, 1.4];
        c.insert(furs);

        c
    }

    /// Parse a YAML list of good properties.
    pub fn from_yaml_str(s: &str) -> Result<Self, ConfigError> {
        let list: Vec<TradeGoodProperties> = serde_yaml::from_str(s)?;
        let mut c = Self::new();
        for p in list {
            c.insert(p);
        }
        Ok(c)
    }

    pub fn insert(&mut self, props: TradeGoodProperties) {
        self.goods.insert(props.good, props);
    }

    pub fn get(&self, good: TradeGood) -> Option<&TradeGoodProperties> {
        self.goods.get(&good)
    }

    pub fn contains(&self, good: TradeGood) -> bool {
        self.goods.contains_key(&good)
    }

    pub fn goods(&self) -> impl Iterator<Item = &TradeGoodProperties> {
        self.goods.values()
    }

    pub fn len(&self) -> usize {
        self.goods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.goods.is_empty()
    }

    /// Base value, or the neutral default when the good is not catalogued.
    pub fn base_value(&self, good: TradeGood) -> f64 {
        self.get(good).map_or(DEFAULT_GOOD_VALUE, |p| p.base_value)
    }

    pub fn bulk_factor(&self, good: TradeGood) -> f64 {
        self.get(good).map_or(1.0, |p| p.bulk_factor)
    }

    pub fn perishability(&self, good: TradeGood) -> f64 {
        self.get(good).map_or(0.0, |p| p.perishability)
    }

    pub fn seasonal_demand(&self, good: TradeGood, month: u32) -> f64 {
        self.get(good).map_or(1.0, |p| p.seasonal_demand(month))
    }

    pub fn seasonal_supply(&self, good: TradeGood, month: u32) -> f64 {
        self.get(good).map_or(1.0, |p| p.seasonal_supply(month))
    }
}
