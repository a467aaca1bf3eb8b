//! Per-(region, good) market records.

use crate::ids::{RegionId, TradeGood};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Months kept in the trailing price window.
pub const PRICE_HISTORY_MONTHS: usize = 12;

/// Direction of the last price movement.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PriceTrend {
    #[default]
    Stable,
    Rising,
    Falling,
    ShockUp,
    ShockDown,
}

impl PriceTrend {
    pub fn is_shock(self) -> bool {
        matches!(self, PriceTrend::ShockUp | PriceTrend::ShockDown)
    }
}

/// Price and supply/demand state of one good in one region.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketData {
    pub region: RegionId,
    pub good: TradeGood,
    pub current_price: f64,
    /// Catalog value at creation.
    pub base_price: f64,
    /// Dimensionless supply level; 1.0 is a normal market.
    pub supply_level: f64,
    /// Dimensionless demand level; 1.0 is a normal market.
    pub demand_level: f64,
    /// Relative price force applied on the last update.
    pub price_change_rate: f64,
    pub trend: PriceTrend,
    /// In [min_volatility, 1].
    pub volatility_index: f64,
    pub avg_price_12_months: f64,
    pub max_price_12_months: f64,
    pub min_price_12_months: f64,
    /// Monthly closing prices, oldest first.
    pub price_history: VecDeque<f64>,
}

impl Default for MarketData {
    fn default() -> Self {
        Self {
            region: RegionId::default(),
            good: TradeGood::default(),
            current_price: 1.0,
            base_price: 1.0,
            supply_level: 1.0,
            demand_level: 1.0,
            price_change_rate: 0.0,
            trend: PriceTrend::Stable,
            volatility_index: 0.1,
            avg_price_12_months: 1.0,
            max_price_12_months: 1.0,
            min_price_12_months: 1.0,
            price_history: VecDeque::new(),
        }
    }
}

impl MarketData {
    /// A fresh market priced at `base_price`.
    pub fn new(region: RegionId, good: TradeGood, base_price: f64) -> Self {
        Self {
            region,
            good,
            current_price: base_price,
            base_price,
            avg_price_12_months: base_price,
            max_price_12_months: base_price,
            min_price_12_months: base_price,
            ..Default::default()
        }
    }

    pub fn is_price_above_average(&self, ratio: f64) -> bool {
        self.current_price > self.avg_price_12_months * ratio
    }

    pub fn is_experiencing_shock(&self) -> bool {
        self.trend.is_shock()
    }

    /// Relative deviation of the current price from the trailing average.
    pub fn price_deviation(&self) -> f64 {
        if self.avg_price_12_months <= 0.0 {
            return 0.0;
        }
        (self.current_price - self.avg_price_12_months) / self.avg_price_12_months
    }

    /// Push the current price as a monthly close and refresh the trailing stats.
    pub fn record_monthly_close(&mut self) {
        self.price_history.push_back(self.current_price);
        while self.price_history.len() > PRICE_HISTORY_MONTHS {
            self.price_history.pop_front();
        }
        let n = self.price_history.len() as f64;
        self.avg_price_12_months = self.price_history.iter().sum::<f64>() / n;
        self.max_price_12_months = self
            .price_history
            .iter()
            .copied()
            .fold(f64::NEG_INFINITY, f64::max);
        self.min_price_12_months = self
            .price_history
            .iter()
            .copied()
            .fold(f64::INFINITY, f64::min);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn new_market_starts_at_base() {
        let m = MarketData::new(RegionId(3), TradeGood::Gold, 10.0);
        assert_eq!(m.current_price, 10.0);
        assert_eq!(m.avg_price_12_months, 10.0);
        assert_eq!(m.price_deviation(), 0.0);
        assert!(!m.is_experiencing_shock());
    }

    #[test]
    fn history_is_bounded_to_twelve_months() {
        let mut m = MarketData::new(RegionId(1), TradeGood::Food, 1.0);
        for i in 0..20 {
            m.current_price = i as f64;
            m.record_monthly_close();
        }
        assert_eq!(m.price_history.len(), PRICE_HISTORY_MONTHS);
        assert_eq!(m.min_price_12_months, 8.0);
        assert_eq!(m.max_price_12_months, 19.0);
        assert!((m.avg_price_12_months - 13.5).abs() < 1e-9);
    }

    proptest! {
        #[test]
        fn average_lies_between_min_and_max(prices in proptest::collection::vec(0.1f64..100.0, 1..30)) {
            let mut m = MarketData::new(RegionId(1), TradeGood::Salt, 1.0);
            for p in prices {
                m.current_price = p;
                m.record_monthly_close();
            }
            prop_assert!(m.avg_price_12_months >= m.min_price_12_months - 1e-9);
            prop_assert!(m.avg_price_12_months <= m.max_price_12_months + 1e-9);
        }
    }
}
