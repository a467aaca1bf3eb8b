//! Pure economic formulas.
//!
//! Every function here is total: inputs outside their natural range are
//! clamped or floored rather than rejected, so callers on the tick path never
//! have to handle an error.

use trade_core::{HubTier, PriceTrend};

/// Floor applied to supply and demand before taking their ratio.
const MIN_LEVEL: f64 = 0.01;

/// Clamp a price into `[min, max]`.
pub fn clamp_price(price: f64, min: f64, max: f64) -> f64 {
    if !price.is_finite() {
        return min;
    }
    price.clamp(min, max)
}

/// Price from base value and the demand/supply ratio, before clamping.
///
/// The ratio is bounded to [0.2, 5] so a collapsed market cannot produce an
/// extreme quote.
pub fn raw_market_price(base_value: f64, supply: f64, demand: f64) -> f64 {
    let s = supply.max(MIN_LEVEL);
    let d = demand.max(MIN_LEVEL);
    base_value * (d / s).clamp(0.2, 5.0)
}

/// Price from base value and supply/demand, clamped into the band.
pub fn market_price(base_value: f64, supply: f64, demand: f64, min: f64, max: f64) -> f64 {
    clamp_price(raw_market_price(base_value, supply, demand), min, max)
}

/// Relative deviation of `price` from `average`; zero for a degenerate average.
pub fn price_deviation(price: f64, average: f64) -> f64 {
    if average <= 0.0 {
        return 0.0;
    }
    (price - average) / average
}

/// Margin over source price, weighted by safety and efficiency. Never negative.
pub fn route_profitability(
    source_price: f64,
    destination_price: f64,
    transport_cost: f64,
    safety: f64,
    efficiency: f64,
) -> f64 {
    if destination_price <= source_price || source_price <= 0.0 {
        return 0.0;
    }
    let margin = (destination_price - source_price - transport_cost) / source_price;
    (margin * safety * efficiency).max(0.0)
}

/// Per-unit transport cost.
///
/// `cost_per_km × bulk` over the distance, inflated by spoilage on long hauls
/// and reduced by route efficiency.
pub fn transport_cost(
    distance_km: f64,
    bulk_factor: f64,
    perishability: f64,
    efficiency: f64,
    cost_per_km: f64,
) -> f64 {
    let eff = efficiency.max(0.01);
    let spoilage = 1.0 + perishability * distance_km / 1000.0;
    (distance_km.max(0.0) * cost_per_km * bulk_factor * spoilage / eff).max(0.0)
}

/// Days to cover `distance_km` at `speed_km_per_day`.
pub fn travel_days(distance_km: f64, speed_km_per_day: f64) -> f64 {
    if speed_km_per_day <= 0.0 {
        return 0.0;
    }
    distance_km.max(0.0) / speed_km_per_day
}

/// Multiplier from an upgrade level: `1 + per_level × (level - 1)`.
pub fn level_factor(level: u8, per_level: f64) -> f64 {
    1.0 + per_level * f64::from(level.max(1) - 1)
}

/// Hub capacity from region base, tier and upgrade level.
pub fn hub_capacity(base: f64, tier: HubTier, level: u8, capacity_per_level: f64) -> f64 {
    base * tier.capacity_multiplier() * level_factor(level, capacity_per_level)
}

/// Throughput over capacity, clamped to `[0, max]`.
pub fn hub_utilization(volume: f64, effective_capacity: f64, max: f64) -> f64 {
    if effective_capacity <= 0.0 {
        return 0.0;
    }
    (volume / effective_capacity).clamp(0.0, max)
}

/// Reputation from utilization, security and infrastructure, in [0.5, 2].
pub fn hub_reputation(utilization: f64, security: f64, infrastructure: f64) -> f64 {
    ((utilization.min(2.0) + security + infrastructure) / 3.0).clamp(0.5, 2.0)
}

/// Relative price force from changes in supply and demand.
pub fn price_force(supply_change: f64, demand_change: f64, elasticity: f64) -> f64 {
    -supply_change * elasticity + demand_change * elasticity
}

/// Trend implied by a price force.
pub fn trend_for_force(force: f64, threshold: f64) -> PriceTrend {
    if force > threshold {
        PriceTrend::Rising
    } else if force < -threshold {
        PriceTrend::Falling
    } else {
        PriceTrend::Stable
    }
}

/// Pull toward the trailing average: `-(price - average) × factor`.
pub fn stabilization_adjustment(price: f64, average: f64, factor: f64) -> f64 {
    -(price - average) * factor
}

/// Delivered volume after efficiency, safety and season.
pub fn effective_volume(base: f64, efficiency: f64, safety: f64, seasonal: f64) -> f64 {
    (base * efficiency * safety * seasonal).max(0.0)
}

/// Volume a route settles toward: a share of the thinner market side, capped.
pub fn optimal_volume(supply_units: f64, demand_units: f64, fraction: f64, ceiling: f64) -> f64 {
    (supply_units.min(demand_units).max(0.0) * fraction).min(ceiling.max(0.0))
}

/// Monthly income of a route; never negative.
pub fn monthly_income(
    volume: f64,
    source_price: f64,
    destination_price: f64,
    transport_cost: f64,
) -> f64 {
    (volume * (destination_price - source_price - transport_cost)).max(0.0)
}

/// Monthly purchase and carriage outlay of a route.
pub fn monthly_expenses(volume: f64, source_price: f64, transport_cost: f64) -> f64 {
    volume.max(0.0) * (source_price + transport_cost)
}

/// Return on investment; zero for a non-positive investment.
pub fn return_on_investment(profit: f64, investment: f64) -> f64 {
    if investment <= 0.0 {
        return 0.0;
    }
    profit / investment
}

/// Percentage change from `old` to `new`; zero when `old` is zero.
pub fn percentage_change(old: f64, new: f64) -> f64 {
    if old == 0.0 {
        return 0.0;
    }
    (new - old) / old * 100.0
}

pub fn lerp(a: f64, b: f64, t: f64) -> f64 {
    a + (b - a) * t.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn balanced_market_prices_at_base() {
        assert!((market_price(3.0, 1.0, 1.0, 0.1, 100.0) - 3.0).abs() < 1e-12);
    }

    #[test]
    fn scarce_supply_raises_price_up_to_ratio_cap() {
        assert!(market_price(1.0, 0.5, 1.0, 0.1, 100.0) > 1.0);
        // ratio capped at 5
        assert!((market_price(1.0, 0.0, 10.0, 0.1, 100.0) - 5.0).abs() < 1e-12);
    }

    #[test]
    fn profitability_is_zero_without_margin() {
        assert_eq!(route_profitability(2.0, 2.0, 0.0, 1.0, 1.0), 0.0);
        assert_eq!(route_profitability(2.0, 1.0, 0.0, 1.0, 1.0), 0.0);
        assert_eq!(route_profitability(1.0, 1.5, 1.0, 1.0, 1.0), 0.0);
    }

    #[test]
    fn profitability_example() {
        // (3 - 2 - 0.5)/2 = 0.25, × 0.8 × 1.0
        let p = route_profitability(2.0, 3.0, 0.5, 0.8, 1.0);
        assert!((p - 0.2).abs() < 1e-12);
    }

    #[test]
    fn transport_cost_grows_with_spoilage() {
        let dry = transport_cost(500.0, 1.0, 0.0, 1.0, 0.001);
        let wet = transport_cost(500.0, 1.0, 0.3, 1.0, 0.001);
        assert!((dry - 0.5).abs() < 1e-12);
        assert!((wet - 0.575).abs() < 1e-12);
    }

    #[test]
    fn hub_capacity_scales_by_tier_and_level() {
        assert_eq!(hub_capacity(100.0, HubTier::LocalMarket, 1, 0.25), 100.0);
        assert_eq!(hub_capacity(100.0, HubTier::InternationalPort, 1, 0.25), 1000.0);
        assert_eq!(hub_capacity(100.0, HubTier::RegionalHub, 3, 0.25), 300.0);
    }

    #[test]
    fn reputation_is_clamped() {
        assert_eq!(hub_reputation(0.0, 0.0, 0.0), 0.5);
        assert_eq!(hub_reputation(5.0, 1.0, 5.0), 2.0);
    }

    #[test]
    fn trend_thresholds() {
        assert_eq!(trend_for_force(0.2, 0.1), PriceTrend::Rising);
        assert_eq!(trend_for_force(-0.2, 0.1), PriceTrend::Falling);
        assert_eq!(trend_for_force(0.05, 0.1), PriceTrend::Stable);
    }

    #[test]
    fn optimal_volume_is_capped() {
        assert_eq!(optimal_volume(2000.0, 800.0, 0.1, 1000.0), 80.0);
        assert_eq!(optimal_volume(20_000.0, 30_000.0, 0.1, 1000.0), 1000.0);
    }

    #[test]
    fn small_helpers() {
        assert_eq!(percentage_change(0.0, 5.0), 0.0);
        assert_eq!(percentage_change(2.0, 3.0), 50.0);
        assert_eq!(return_on_investment(5.0, 0.0), 0.0);
        assert_eq!(lerp(0.0, 10.0, 2.0), 10.0);
        assert_eq!(monthly_income(10.0, 2.0, 1.0, 0.0), 0.0);
        assert_eq!(monthly_expenses(10.0, 2.0, 0.5), 25.0);
    }

    proptest! {
        #[test]
        fn market_price_stays_in_band(base in 0.01f64..50.0, s in 0.0f64..10.0, d in 0.0f64..10.0) {
            let p = market_price(base, s, d, 0.1, 100.0);
            prop_assert!((0.1..=100.0).contains(&p));
        }

        #[test]
        fn profitability_never_negative(
            src in 0.01f64..100.0,
            dst in 0.0f64..100.0,
            cost in 0.0f64..50.0,
            safety in 0.0f64..1.0,
            eff in 0.0f64..2.0,
        ) {
            prop_assert!(route_profitability(src, dst, cost, safety, eff) >= 0.0);
        }

        #[test]
        fn utilization_in_bounds(v in 0.0f64..1e6, cap in 0.0f64..1e4) {
            let u = hub_utilization(v, cap, 1.5);
            prop_assert!((0.0..=1.5).contains(&u));
        }
    }
}
