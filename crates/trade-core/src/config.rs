//! Load-time tuning for the trade simulation.
//!
//! Every section is `#[serde(default)]`, so a YAML file only needs to list the
//! values it overrides. [`TradeConfig::validate`] must pass before a config is
//! handed to the runtime.

use crate::route::RouteType;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A value is out of its allowed range.
    #[error("invalid config value `{field}`: {reason}")]
    Invalid {
        field: &'static str,
        reason: String,
    },
    /// The file could not be read.
    #[error("config io error: {0}")]
    Io(#[from] std::io::Error),
    /// The file is not valid YAML for this schema.
    #[error("config parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}

fn check_range(field: &'static str, v: f64, lo: f64, hi: f64) -> Result<(), ConfigError> {
    if !v.is_finite() || v < lo || v > hi {
        return Err(invalid(field, format!("{v} not in [{lo}, {hi}]")));
    }
    Ok(())
}

fn check_positive(field: &'static str, v: f64) -> Result<(), ConfigError> {
    if !v.is_finite() || v <= 0.0 {
        return Err(invalid(field, format!("{v} must be > 0")));
    }
    Ok(())
}

/// One value per route classification.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RouteTypeTable {
    pub land: f64,
    pub river: f64,
    pub coastal: f64,
    pub sea: f64,
    pub overland_long: f64,
}

impl RouteTypeTable {
    pub fn get(&self, route_type: RouteType) -> f64 {
        match route_type {
            RouteType::Land => self.land,
            RouteType::River => self.river,
            RouteType::Coastal => self.coastal,
            RouteType::Sea => self.sea,
            RouteType::OverlandLong => self.overland_long,
        }
    }

    /// Smallest entry; scales the admissible pathfinding heuristic.
    pub fn min(&self) -> f64 {
        [self.land, self.river, self.coastal, self.sea, self.overland_long]
            .into_iter()
            .fold(f64::INFINITY, f64::min)
    }

    fn validate(&self, field: &'static str) -> Result<(), ConfigError> {
        for v in [self.land, self.river, self.coastal, self.sea, self.overland_long] {
            check_positive(field, v)?;
        }
        Ok(())
    }
}

/// Thresholds a route must clear to be established and to stay viable.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViabilityThresholds {
    /// Minimum profitability margin.
    pub min_profitability: f64,
    /// Safety below which an established route counts as unviable.
    pub min_safety: f64,
    /// Volume an established route must exceed.
    pub min_volume: f64,
    /// Path safety a new route must exceed.
    pub establish_min_safety: f64,
    /// Search budget for the pathfinder, in weighted km.
    pub max_trade_distance: f64,
}

impl Default for ViabilityThresholds {
    fn default() -> Self {
        Self {
            min_profitability: 0.05,
            min_safety: 0.3,
            min_volume: 0.0,
            establish_min_safety: 0.2,
            max_trade_distance: 2000.0,
        }
    }
}

/// Price band and shock behaviour.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketThresholds {
    pub min_price: f64,
    pub max_price: f64,
    /// Absolute price force beyond which the trend is rising or falling.
    pub trend_threshold: f64,
    /// Shock magnitude beyond which the trend becomes a shock.
    pub shock_trend_threshold: f64,
    /// Per price tick.
    pub random_shock_probability: f64,
    pub random_shock_magnitude: f64,
    /// Price over trailing average ratio that counts as "above average".
    pub above_average_ratio: f64,
}

impl Default for MarketThresholds {
    fn default() -> Self {
        Self {
            min_price: 0.1,
            max_price: 100.0,
            trend_threshold: 0.1,
            shock_trend_threshold: 0.5,
            random_shock_probability: 0.001,
            random_shock_magnitude: 0.3,
            above_average_ratio: 1.1,
        }
    }
}

/// Hub tier ladder and upgrade scaling.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HubThresholds {
    pub international_port_volume: f64,
    pub international_port_routes: usize,
    pub major_center_volume: f64,
    pub major_center_routes: usize,
    pub crossroads_routes: usize,
    pub regional_hub_volume: f64,
    pub regional_hub_routes: usize,
    pub capacity_per_level: f64,
    pub infrastructure_per_level: f64,
    pub security_per_level: f64,
    pub max_upgrade_level: u8,
    /// Utilization ceiling; hubs may run over capacity up to this ratio.
    pub max_utilization: f64,
    /// Range of the per-region base capacity.
    pub base_capacity_min: f64,
    pub base_capacity_max: f64,
    /// Range of the per-region infrastructure bonus.
    pub infrastructure_min: f64,
    pub infrastructure_max: f64,
    pub initial_security: f64,
    /// Volume cap for a new route when an endpoint has no hub.
    pub default_capacity_ceiling: f64,
}

impl Default for HubThresholds {
    fn default() -> Self {
        Self {
            international_port_volume: 1000.0,
            international_port_routes: 20,
            major_center_volume: 500.0,
            major_center_routes: 10,
            crossroads_routes: 6,
            regional_hub_volume: 100.0,
            regional_hub_routes: 3,
            capacity_per_level: 0.25,
            infrastructure_per_level: 0.15,
            security_per_level: 0.1,
            max_upgrade_level: 5,
            max_utilization: 1.5,
            base_capacity_min: 50.0,
            base_capacity_max: 200.0,
            infrastructure_min: 0.8,
            infrastructure_max: 1.5,
            initial_security: 0.9,
            default_capacity_ceiling: 1000.0,
        }
    }
}

/// Tick cadence and per-tick work caps.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PerformanceSettings {
    /// Route flow updates per second of simulated time.
    pub update_frequency: f64,
    /// Seconds between price updates; each price update closes one month.
    pub price_update_interval_secs: f64,
    pub max_routes_per_tick: usize,
    pub max_hubs_per_tick: usize,
    /// Updates slower than this are logged.
    pub slow_update_warning_ms: f64,
    pub logging_enabled: bool,
}

impl Default for PerformanceSettings {
    fn default() -> Self {
        Self {
            update_frequency: 0.2,
            price_update_interval_secs: 30.0,
            max_routes_per_tick: 25,
            max_hubs_per_tick: 10,
            slow_update_warning_ms: 16.0,
            logging_enabled: true,
        }
    }
}

impl PerformanceSettings {
    /// Seconds between route flow updates.
    pub fn route_update_interval_secs(&self) -> f64 {
        1.0 / self.update_frequency
    }
}

/// Coefficients of the economic formulas.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EconomicParameters {
    pub transport_cost_per_km: f64,
    /// Pathfinding edge cost multiplier per classification.
    pub cost_multipliers: RouteTypeTable,
    /// Route efficiency factor per classification.
    pub efficiency_multipliers: RouteTypeTable,
    pub travel_speed_km_per_day: RouteTypeTable,
    /// Land connections longer than this are long-overland.
    pub long_overland_threshold_km: f64,
    /// Units of supply or demand per 1.0 of market level.
    pub market_depth_units: f64,
    /// Share of the thinner side of the market a route moves.
    pub initial_volume_fraction: f64,
    pub volume_adjustment_rate: f64,
    pub supply_demand_adjustment_rate: f64,
    pub supply_demand_elasticity: f64,
    pub price_stabilization_factor: f64,
    pub volatility_decay: f64,
    pub min_volatility: f64,
    /// Incoming share of effective capacity that specializes a hub in a good.
    pub specialization_threshold: f64,
    pub specialization_bonus: f64,
    /// Seasonal supply multiplier below which routes close for the season.
    pub seasonal_closure_threshold: f64,
}

impl Default for EconomicParameters {
    fn default() -> Self {
        Self {
            transport_cost_per_km: 0.001,
            cost_multipliers: RouteTypeTable {
                land: 1.0,
                river: 0.7,
                coastal: 0.5,
                sea: 0.3,
                overland_long: 1.5,
            },
            efficiency_multipliers: RouteTypeTable {
                land: 0.95,
                river: 1.2,
                coastal: 1.1,
                sea: 1.5,
                overland_long: 0.6,
            },
            travel_speed_km_per_day: RouteTypeTable {
                land: 50.0,
                river: 70.0,
                coastal: 80.0,
                sea: 100.0,
                overland_long: 30.0,
            },
            long_overland_threshold_km: 110.0,
            market_depth_units: 1000.0,
            initial_volume_fraction: 0.1,
            volume_adjustment_rate: 0.1,
            supply_demand_adjustment_rate: 0.1,
            supply_demand_elasticity: 0.5,
            price_stabilization_factor: 0.05,
            volatility_decay: 0.99,
            min_volatility: 0.01,
            specialization_threshold: 0.2,
            specialization_bonus: 1.3,
            seasonal_closure_threshold: 0.5,
        }
    }
}

/// Safety, disruption and recovery coefficients.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SafetyParameters {
    pub min_path_safety: f64,
    pub max_efficiency: f64,
    pub waypoint_safety_min: f64,
    pub waypoint_safety_max: f64,
    pub disruption_volume_factor: f64,
    pub disruption_safety_factor: f64,
    /// Extra cut when an already disrupted route is disrupted again.
    pub repeat_disruption_cut: f64,
    /// Volume floor while disrupted, as a share of the pre-disruption volume.
    pub disrupted_volume_floor: f64,
    pub restoration_volume_fraction: f64,
    pub restoration_safety_multiplier: f64,
    pub min_recovery_months: u32,
    pub max_recovery_months: u32,
    pub bandit_safety_threshold: f64,
    pub bandit_disruption_chance: f64,
    pub bandit_disruption_months: u32,
    /// Per flow tick, share of the gap to path safety that is closed.
    pub safety_recovery_rate: f64,
}

impl Default for SafetyParameters {
    fn default() -> Self {
        Self {
            min_path_safety: 0.1,
            max_efficiency: 2.0,
            waypoint_safety_min: 0.8,
            waypoint_safety_max: 1.0,
            disruption_volume_factor: 0.1,
            disruption_safety_factor: 0.3,
            repeat_disruption_cut: 0.5,
            disrupted_volume_floor: 0.01,
            restoration_volume_fraction: 0.8,
            restoration_safety_multiplier: 2.0,
            min_recovery_months: 1,
            max_recovery_months: 12,
            bandit_safety_threshold: 0.3,
            bandit_disruption_chance: 0.01,
            bandit_disruption_months: 3,
            safety_recovery_rate: 0.1,
        }
    }
}

/// Full trade configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TradeConfig {
    /// Root seed of every deterministic RNG stream.
    pub seed: u64,
    pub viability: ViabilityThresholds,
    pub market: MarketThresholds,
    pub hubs: HubThresholds,
    pub performance: PerformanceSettings,
    pub economic: EconomicParameters,
    pub safety: SafetyParameters,
}

impl Default for TradeConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            viability: ViabilityThresholds::default(),
            market: MarketThresholds::default(),
            hubs: HubThresholds::default(),
            performance: PerformanceSettings::default(),
            economic: EconomicParameters::default(),
            safety: SafetyParameters::default(),
        }
    }
}

impl TradeConfig {
    /// Parse YAML; absent fields take their defaults.
    pub fn from_yaml_str(s: &str) -> Result<Self, ConfigError> {
        let cfg: TradeConfig = serde_yaml::from_str(s)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Read, parse and validate a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let cfg = Self::from_yaml_str(&text)?;
        tracing::debug!(path = %path.as_ref().display(), "loaded trade config");
        Ok(cfg)
    }

    /// Check every value against its allowed range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let v = &self.viability;
        check_range("viability.min_profitability", v.min_profitability, 0.0, 1.0)?;
        check_range("viability.min_safety", v.min_safety, 0.0, 1.0)?;
        check_range("viability.establish_min_safety", v.establish_min_safety, 0.0, 1.0)?;
        if !v.min_volume.is_finite() || v.min_volume < 0.0 {
            return Err(invalid("viability.min_volume", "must be >= 0"));
        }
        check_range("viability.max_trade_distance", v.max_trade_distance, 100.0, 1.0e7)?;

        let m = &self.market;
        check_positive("market.min_price", m.min_price)?;
        if !(m.max_price.is_finite() && m.max_price > m.min_price) {
            return Err(invalid("market.max_price", "must exceed min_price"));
        }
        check_positive("market.trend_threshold", m.trend_threshold)?;
        check_positive("market.shock_trend_threshold", m.shock_trend_threshold)?;
        check_range("market.random_shock_probability", m.random_shock_probability, 0.0, 1.0)?;
        check_range("market.random_shock_magnitude", m.random_shock_magnitude, 0.0, 0.99)?;
        check_positive("market.above_average_ratio", m.above_average_ratio)?;

        let h = &self.hubs;
        if !(h.international_port_volume >= h.major_center_volume
            && h.major_center_volume >= h.regional_hub_volume)
        {
            return Err(invalid("hubs", "volume thresholds must be descending by tier"));
        }
        if !(h.international_port_routes >= h.major_center_routes
            && h.major_center_routes >= h.crossroads_routes
            && h.crossroads_routes >= h.regional_hub_routes)
        {
            return Err(invalid("hubs", "route thresholds must be descending by tier"));
        }
        if h.max_upgrade_level == 0 {
            return Err(invalid("hubs.max_upgrade_level", "must be >= 1"));
        }
        check_range("hubs.max_utilization", h.max_utilization, 1.0, 10.0)?;
        check_positive("hubs.base_capacity_min", h.base_capacity_min)?;
        if h.base_capacity_max < h.base_capacity_min {
            return Err(invalid("hubs.base_capacity_max", "must be >= base_capacity_min"));
        }
        check_positive("hubs.infrastructure_min", h.infrastructure_min)?;
        if h.infrastructure_max < h.infrastructure_min {
            return Err(invalid("hubs.infrastructure_max", "must be >= infrastructure_min"));
        }
        check_range("hubs.initial_security", h.initial_security, 0.0, 1.0)?;
        check_positive("hubs.default_capacity_ceiling", h.default_capacity_ceiling)?;

        let p = &self.performance;
        check_range("performance.update_frequency", p.update_frequency, 0.1, 10.0)?;
        check_positive("performance.price_update_interval_secs", p.price_update_interval_secs)?;
        if p.max_routes_per_tick == 0 || p.max_hubs_per_tick == 0 {
            return Err(invalid("performance", "per-tick caps must be >= 1"));
        }

        let e = &self.economic;
        check_positive("economic.transport_cost_per_km", e.transport_cost_per_km)?;
        e.cost_multipliers.validate("economic.cost_multipliers")?;
        e.efficiency_multipliers.validate("economic.efficiency_multipliers")?;
        e.travel_speed_km_per_day.validate("economic.travel_speed_km_per_day")?;
        check_positive("economic.market_depth_units", e.market_depth_units)?;
        check_range("economic.initial_volume_fraction", e.initial_volume_fraction, 0.0, 1.0)?;
        check_range("economic.volume_adjustment_rate", e.volume_adjustment_rate, 0.0, 1.0)?;
        check_range(
            "economic.supply_demand_adjustment_rate",
            e.supply_demand_adjustment_rate,
            0.0,
            1.0,
        )?;
        check_range("economic.supply_demand_elasticity", e.supply_demand_elasticity, 0.0, 5.0)?;
        check_range("economic.price_stabilization_factor", e.price_stabilization_factor, 0.0, 1.0)?;
        check_range("economic.volatility_decay", e.volatility_decay, 0.0, 1.0)?;
        check_range("economic.min_volatility", e.min_volatility, 0.0, 1.0)?;
        check_range("economic.specialization_threshold", e.specialization_threshold, 0.0, 1.0)?;
        check_positive("economic.specialization_bonus", e.specialization_bonus)?;
        check_range("economic.seasonal_closure_threshold", e.seasonal_closure_threshold, 0.0, 1.0)?;

        let s = &self.safety;
        check_range("safety.min_path_safety", s.min_path_safety, 0.0, 1.0)?;
        check_positive("safety.max_efficiency", s.max_efficiency)?;
        check_range("safety.waypoint_safety_min", s.waypoint_safety_min, 0.0, 1.0)?;
        check_range("safety.waypoint_safety_max", s.waypoint_safety_max, s.waypoint_safety_min, 1.0)?;
        check_range("safety.disruption_volume_factor", s.disruption_volume_factor, 0.0, 1.0)?;
        check_range("safety.disruption_safety_factor", s.disruption_safety_factor, 0.0, 1.0)?;
        check_range("safety.repeat_disruption_cut", s.repeat_disruption_cut, 0.0, 1.0)?;
        check_range("safety.disrupted_volume_floor", s.disrupted_volume_floor, 0.0, 1.0)?;
        check_range("safety.restoration_volume_fraction", s.restoration_volume_fraction, 0.0, 1.0)?;
        check_positive("safety.restoration_safety_multiplier", s.restoration_safety_multiplier)?;
        if s.min_recovery_months == 0 || s.max_recovery_months < s.min_recovery_months {
            return Err(invalid("safety.recovery_months", "need 1 <= min <= max"));
        }
        check_range("safety.bandit_disruption_chance", s.bandit_disruption_chance, 0.0, 1.0)?;
        check_range("safety.safety_recovery_rate", s.safety_recovery_rate, 0.0, 1.0)?;
        Ok(())
    }

    /// Clamp a recovery duration into the configured month range.
    pub fn clamp_recovery_months(&self, months: u32) -> u32 {
        months.clamp(
            self.safety.min_recovery_months,
            self.safety.max_recovery_months,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn defaults_validate() {
        TradeConfig::default().validate().unwrap();
    }

    #[test]
    fn sea_is_cheapest_and_long_overland_dearest() {
        let c = EconomicParameters::default().cost_multipliers;
        assert_eq!(c.min(), c.sea);
        for t in RouteType::ALL {
            assert!(c.get(t) <= c.overland_long);
        }
    }

    #[test]
    fn partial_yaml_keeps_defaults() {
        let cfg = TradeConfig::from_yaml_str(
            "seed: 7\nviability:\n  min_profitability: 0.1\nperformance:\n  max_routes_per_tick: 5\n",
        )
        .unwrap();
        assert_eq!(cfg.seed, 7);
        assert_eq!(cfg.viability.min_profitability, 0.1);
        assert_eq!(cfg.viability.min_safety, 0.3);
        assert_eq!(cfg.performance.max_routes_per_tick, 5);
        assert_eq!(cfg.market, MarketThresholds::default());
    }

    #[test]
    fn inverted_price_band_is_rejected() {
        let mut cfg = TradeConfig::default();
        cfg.market.max_price = 0.05;
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("market.max_price"));
    }

    #[test]
    fn malformed_yaml_is_a_parse_error() {
        let err = TradeConfig::from_yaml_str("viability: [1, 2").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    proptest! {
        #[test]
        fn recovery_clamp_stays_in_range(m in 0u32..1000) {
            let cfg = TradeConfig::default();
            let c = cfg.clamp_recovery_months(m);
            prop_assert!((1..=12).contains(&c));
        }
    }
}
