//! The persisted shape of trade state.

use crate::config::TradeConfig;
use crate::hub::TradeHub;
use crate::market::MarketData;
use crate::route::TradeRoute;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Bumped whenever a field changes meaning.
pub const CURRENT_FORMAT_VERSION: u32 = 1;

/// Year new games start in.
pub const DEFAULT_START_YEAR: i32 = 1200;

/// First day of [`DEFAULT_START_YEAR`].
pub fn default_start_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(DEFAULT_START_YEAR, 1, 1).unwrap_or(NaiveDate::MIN)
}

/// Scalar settings carried with a save.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistedSettings {
    pub max_trade_distance: f64,
    pub min_profitability: f64,
    pub update_frequency: f64,
    pub logging_enabled: bool,
}

impl Default for PersistedSettings {
    fn default() -> Self {
        Self::from_config(&TradeConfig::default())
    }
}

impl PersistedSettings {
    pub fn from_config(cfg: &TradeConfig) -> Self {
        Self {
            max_trade_distance: cfg.viability.max_trade_distance,
            min_profitability: cfg.viability.min_profitability,
            update_frequency: cfg.performance.update_frequency,
            logging_enabled: cfg.performance.logging_enabled,
        }
    }

    /// Write these settings over `cfg`.
    pub fn apply_to(&self, cfg: &mut TradeConfig) {
        cfg.viability.max_trade_distance = self.max_trade_distance;
        cfg.viability.min_profitability = self.min_profitability;
        cfg.performance.update_frequency = self.update_frequency;
        cfg.performance.logging_enabled = self.logging_enabled;
    }
}

/// Everything needed to resume a trade simulation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TradeSnapshot {
    pub format_version: u32,
    /// Calendar date of the last closed month.
    pub date: NaiveDate,
    /// Price ticks elapsed.
    pub tick: u64,
    pub routes: Vec<TradeRoute>,
    pub hubs: Vec<TradeHub>,
    pub markets: Vec<MarketData>,
    pub settings: PersistedSettings,
}

impl Default for TradeSnapshot {
    fn default() -> Self {
        Self {
            format_version: CURRENT_FORMAT_VERSION,
            date: default_start_date(),
            tick: 0,
            routes: Vec::new(),
            hubs: Vec::new(),
            markets: Vec::new(),
            settings: PersistedSettings::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_round_trip_through_config() {
        let mut cfg = TradeConfig::default();
        let s = PersistedSettings {
            max_trade_distance: 900.0,
            min_profitability: 0.2,
            update_frequency: 1.0,
            logging_enabled: false,
        };
        s.apply_to(&mut cfg);
        assert_eq!(PersistedSettings::from_config(&cfg), s);
    }

    #[test]
    fn empty_document_takes_defaults() {
        let snap: TradeSnapshot = serde_json::from_str("{}").unwrap();
        assert_eq!(snap.format_version, CURRENT_FORMAT_VERSION);
        assert_eq!(snap.date, default_start_date());
        assert!(snap.routes.is_empty());
    }
}
