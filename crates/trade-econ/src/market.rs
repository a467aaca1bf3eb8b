//! Market engine: one price record per (region, good).
//!
//! The engine owns its map behind a single mutex that is never held while
//! acquiring another lock. Events are collected under the lock and published
//! after it is released.

use crate::calculator::{
    clamp_price, market_price, price_force, stabilization_adjustment, trend_for_force,
};
use crate::network::ConnectivityOracle;
use rand::Rng;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use trade_core::config::{EconomicParameters, MarketThresholds};
use trade_core::{
    lock_or_recover, DeterministicRng, EventBus, MarketData, PriceTrend, RegionId, RngCategory,
    TradeConfig, TradeEvent, TradeGood, TradeGoodCatalog,
};

/// Supply level sampling range.
pub const SUPPLY_RANGE: (f64, f64) = (0.5, 2.0);
/// Demand level sampling range.
pub const DEMAND_RANGE: (f64, f64) = (0.6, 1.8);
/// Number of markets returned by [`MarketEngine::find_best_markets`].
pub const BEST_MARKETS_LIMIT: usize = 10;

type MarketKey = (RegionId, TradeGood);

/// Price and levels of a market, whether or not it exists yet.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MarketQuote {
    pub price: f64,
    pub supply_level: f64,
    pub demand_level: f64,
}

/// Counters from one [`MarketEngine::update_all_prices`] pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PriceUpdateReport {
    pub markets_updated: usize,
    pub shocks: usize,
}

/// Owner of every [`MarketData`].
pub struct MarketEngine {
    markets: Mutex<BTreeMap<MarketKey, MarketData>>,
    catalog: Arc<TradeGoodCatalog>,
    thresholds: MarketThresholds,
    economic: EconomicParameters,
    rng: DeterministicRng,
    bus: Arc<dyn EventBus>,
}

fn apply_shock(m: &mut MarketData, magnitude: f64, t: &MarketThresholds) -> (f64, f64) {
    let old = m.current_price;
    m.current_price = (old * (1.0 + magnitude)).max(t.min_price);
    if magnitude > t.shock_trend_threshold {
        m.trend = PriceTrend::ShockUp;
    } else if magnitude < -t.shock_trend_threshold {
        m.trend = PriceTrend::ShockDown;
    }
    m.volatility_index = (m.volatility_index + magnitude.abs()).min(1.0);
    m.price_change_rate = magnitude;
    (old, m.current_price)
}

impl MarketEngine {
    pub fn new(
        catalog: Arc<TradeGoodCatalog>,
        cfg: &TradeConfig,
        rng: DeterministicRng,
        bus: Arc<dyn EventBus>,
    ) -> Self {
        Self {
            markets: Mutex::new(BTreeMap::new()),
            catalog,
            thresholds: cfg.market.clone(),
            economic: cfg.economic.clone(),
            rng,
            bus,
        }
    }

    pub fn catalog(&self) -> &TradeGoodCatalog {
        &self.catalog
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<MarketKey, MarketData>> {
        lock_or_recover(&self.markets, "markets")
    }

    /// Deterministic supply level sample for `tick`.
    pub fn sample_supply(&self, region: RegionId, good: TradeGood, tick: u64) -> f64 {
        self.rng.uniform(
            u64::from(region.0),
            good.index(),
            tick,
            RngCategory::Supply,
            SUPPLY_RANGE.0,
            SUPPLY_RANGE.1,
        )
    }

    /// Deterministic demand level sample for `tick`.
    pub fn sample_demand(&self, region: RegionId, good: TradeGood, tick: u64) -> f64 {
        self.rng.uniform(
            u64::from(region.0),
            good.index(),
            tick,
            RngCategory::Demand,
            DEMAND_RANGE.0,
            DEMAND_RANGE.1,
        )
    }

    fn fresh_market(&self, region: RegionId, good: TradeGood, tick: u64) -> MarketData {
        let base = self.catalog.base_value(good);
        let supply = self.sample_supply(region, good, tick);
        let demand = self.sample_demand(region, good, tick);
        let price = market_price(
            base,
            supply,
            demand,
            self.thresholds.min_price,
            self.thresholds.max_price,
        );
        let mut m = MarketData::new(region, good, base);
        m.supply_level = supply;
        m.demand_level = demand;
        m.current_price = price;
        m.avg_price_12_months = price;
        m.min_price_12_months = price;
        m.max_price_12_months = price;
        m
    }

    /// Current price and levels; a missing market is quoted as it would be created.
    pub fn quote(&self, region: RegionId, good: TradeGood, tick: u64) -> MarketQuote {
        let existing = self.lock().get(&(region, good)).map(|m| MarketQuote {
            price: m.current_price,
            supply_level: m.supply_level,
            demand_level: m.demand_level,
        });
        existing.unwrap_or_else(|| {
            let m = self.fresh_market(region, good, tick);
            MarketQuote {
                price: m.current_price,
                supply_level: m.supply_level,
                demand_level: m.demand_level,
            }
        })
    }

    /// Return the market, creating it from `tick`'s samples if needed.
    pub fn get_or_create_market(&self, region: RegionId, good: TradeGood, tick: u64) -> MarketData {
        let mut markets = self.lock();
        markets
            .entry((region, good))
            .or_insert_with(|| self.fresh_market(region, good, tick))
            .clone()
    }

    pub fn market_data(&self, region: RegionId, good: TradeGood) -> Option<MarketData> {
        self.lock().get(&(region, good)).cloned()
    }

    /// Insert or replace a market record.
    pub fn insert_market(&self, market: MarketData) {
        self.lock().insert((market.region, market.good), market);
    }

    /// Replace every market, e.g. after loading a save.
    pub fn replace_all(&self, markets: Vec<MarketData>) {
        let mut map = self.lock();
        map.clear();
        for m in markets {
            map.insert((m.region, m.good), m);
        }
    }

    /// Snapshot of every market, ordered by (region, good).
    pub fn markets(&self) -> Vec<MarketData> {
        self.lock().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Advance every market one price tick: supply/demand drift, price
    /// forces, stabilization, then possibly one random shock.
    pub fn update_all_prices(&self, tick: u64) -> PriceUpdateReport {
        let mut report = PriceUpdateReport::default();
        let mut events = Vec::new();
        {
            let mut markets = self.lock();
            for (&(region, good), m) in markets.iter_mut() {
                let supply_target = self.sample_supply(region, good, tick);
                let demand_target = self.sample_demand(region, good, tick);
                let rate = self.economic.supply_demand_adjustment_rate;
                let ds = (supply_target - m.supply_level) * rate;
                let dd = (demand_target - m.demand_level) * rate;
                m.supply_level += ds;
                m.demand_level += dd;
                self.apply_market_forces(m, ds, dd);
                self.stabilize(m);
                report.markets_updated += 1;
            }

            let p = self.thresholds.random_shock_probability;
            if !markets.is_empty() && self.rng.chance(0, 0, tick, RngCategory::PriceShock, p) {
                let mut stream = self.rng.stream(1, 0, tick, RngCategory::PriceShock);
                let idx = stream.gen_range(0..markets.len());
                let limit = self.thresholds.random_shock_magnitude;
                let magnitude = if limit > 0.0 {
                    stream.gen_range(-limit..limit)
                } else {
                    0.0
                };
                if let Some(m) = markets.values_mut().nth(idx) {
                    let (old, new) = apply_shock(m, magnitude, &self.thresholds);
                    events.push(TradeEvent::PriceShock {
                        region: m.region,
                        good: m.good,
                        old_price: old,
                        new_price: new,
                        magnitude,
                        cause: "Market volatility".to_string(),
                    });
                    report.shocks += 1;
                }
            }
        }
        for e in events {
            self.bus.publish(e);
        }
        tracing::debug!(
            tick,
            markets = report.markets_updated,
            shocks = report.shocks,
            "market prices updated"
        );
        report
    }

    /// Apply a relative price force from supply/demand changes.
    pub fn apply_market_forces(&self, m: &mut MarketData, supply_change: f64, demand_change: f64) {
        let force = price_force(
            supply_change,
            demand_change,
            self.economic.supply_demand_elasticity,
        );
        m.current_price = clamp_price(
            m.current_price * (1.0 + force),
            self.thresholds.min_price,
            self.thresholds.max_price,
        );
        m.price_change_rate = force;
        m.trend = trend_for_force(force, self.thresholds.trend_threshold);
    }

    fn stabilize(&self, m: &mut MarketData) {
        let adj = stabilization_adjustment(
            m.current_price,
            m.avg_price_12_months,
            self.economic.price_stabilization_factor,
        );
        m.current_price = clamp_price(
            m.current_price + adj,
            self.thresholds.min_price,
            self.thresholds.max_price,
        );
        m.volatility_index =
            (m.volatility_index * self.economic.volatility_decay).max(self.economic.min_volatility);
    }

    /// Pull every price toward its trailing average and decay volatility.
    pub fn process_price_stabilization(&self) {
        let mut markets = self.lock();
        for m in markets.values_mut() {
            self.stabilize(m);
        }
    }

    /// Shock one market by `magnitude` (relative). The price is floored at
    /// the minimum but not capped.
    pub fn apply_price_shock(
        &self,
        region: RegionId,
        good: TradeGood,
        magnitude: f64,
        cause: &str,
        tick: u64,
    ) -> MarketData {
        let (old, after) = {
            let mut markets = self.lock();
            let m = markets
                .entry((region, good))
                .or_insert_with(|| self.fresh_market(region, good, tick));
            let (old, _) = apply_shock(m, magnitude, &self.thresholds);
            (old, m.clone())
        };
        tracing::info!(%region, %good, magnitude, cause, old, new = after.current_price, "price shock");
        self.bus.publish(TradeEvent::PriceShock {
            region,
            good,
            old_price: old,
            new_price: after.current_price,
            magnitude,
            cause: cause.to_string(),
        });
        after
    }

    /// Apply `month`'s (1..=12) seasonal multipliers to every market.
    ///
    /// The monthly drift toward sampled supply and demand pulls levels back,
    /// so repeated months do not run away.
    pub fn process_seasonal_adjustment(&self, month: u32) {
        let mut markets = self.lock();
        for m in markets.values_mut() {
            let Some(props) = self.catalog.get(m.good) else {
                continue;
            };
            self.apply_seasonal_factors(
                m,
                props.seasonal_demand(month),
                props.seasonal_supply(month),
            );
        }
    }

    /// `demand *= d`, `supply *= s`, `price *= d / s`, clamped.
    pub fn apply_seasonal_factors(&self, m: &mut MarketData, demand_factor: f64, supply_factor: f64) {
        if !(demand_factor > 0.0 && supply_factor > 0.0) {
            return;
        }
        m.demand_level *= demand_factor;
        m.supply_level *= supply_factor;
        m.current_price = clamp_price(
            m.current_price * demand_factor / supply_factor,
            self.thresholds.min_price,
            self.thresholds.max_price,
        );
    }

    /// Close the month on every market's trailing price window.
    pub fn record_monthly_close(&self) {
        let mut markets = self.lock();
        for m in markets.values_mut() {
            m.record_monthly_close();
        }
    }

    /// Best markets for `good`: cheapest plentiful ones when `buying`,
    /// dearest hungry ones otherwise.
    pub fn find_best_markets(&self, good: TradeGood, buying: bool) -> Vec<MarketData> {
        let markets = self.lock();
        let mut scored: Vec<(f64, &MarketData)> = markets
            .values()
            .filter(|m| m.good == good)
            .map(|m| {
                let score = if buying {
                    m.supply_level / m.current_price.max(f64::EPSILON)
                } else {
                    m.current_price * m.demand_level
                };
                (score, m)
            })
            .collect();
        scored.sort_by(|a, b| b.0.total_cmp(&a.0).then_with(|| a.1.region.cmp(&b.1.region)));
        scored
            .into_iter()
            .take(BEST_MARKETS_LIMIT)
            .map(|(_, m)| m.clone())
            .collect()
    }

    /// Mean price of `good` over markets within `radius_km` of `center`.
    ///
    /// Falls back to the good's catalog value when no market is in range.
    pub fn regional_average_price(
        &self,
        good: TradeGood,
        center: RegionId,
        radius_km: f64,
        oracle: &dyn ConnectivityOracle,
    ) -> f64 {
        let markets = self.lock();
        let (sum, n) = markets
            .values()
            .filter(|m| m.good == good)
            .filter(|m| m.region == center || oracle.straight_line_km(center, m.region) <= radius_km)
            .fold((0.0, 0usize), |(s, n), m| (s + m.current_price, n + 1));
        if n == 0 {
            return self.catalog.base_value(good);
        }
        sum / n as f64
    }
}
