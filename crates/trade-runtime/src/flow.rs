// Per-route state transitions that do not need a handler: monthly flow,
// condition drift, disruption arithmetic, restoration, recovery countdown and
// seasonal closure.
//
// Everything here mutates one `TradeRoute` in place and returns what changed;
// the caller owns the locks, the aggregates and event publication.
//
// **Critical constraint: determinism.** The only random draw (bandit
// disruption) is keyed by route, good and tick.

use trade_core::config::{EconomicParameters, SafetyParameters};
use trade_core::{
    DeterministicRng, RngCategory, RouteKey, TradeError, TradeGoodCatalog, TradeRoute,
    TradeStatus,
};
use trade_econ::calculator::{optimal_volume, route_profitability, transport_cost};
use trade_econ::MarketEngine;

/// Relative volume change that is reported as a volume-changed event.
pub const VOLUME_EVENT_THRESHOLD: f64 = 0.05;

/// Cause recorded for disruptions raised by [`update_conditions`].
pub const BANDIT_CAUSE: &str = "Bandit activity";

/// RNG entity of a route: source in the high word, destination in the low.
pub fn route_entity(key: &RouteKey) -> u64 {
    (u64::from(key.source.0) << 32) | u64::from(key.destination.0)
}

/// Inputs shared by every route processed in one tick.
pub struct FlowContext<'a> {
    pub economic: &'a EconomicParameters,
    pub safety: &'a SafetyParameters,
    pub catalog: &'a TradeGoodCatalog,
    pub markets: &'a MarketEngine,
    pub rng: DeterministicRng,
    pub tick: u64,
    /// Calendar month, 1..=12.
    pub month: u32,
    /// Share of a month this tick covers.
    pub month_fraction: f64,
}

/// Volume and profit bookkeeping of one route tick.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FlowOutcome {
    pub old_volume: f64,
    pub new_volume: f64,
}

impl FlowOutcome {
    pub fn is_significant(&self) -> bool {
        if self.old_volume <= 0.0 {
            return self.new_volume > 0.0;
        }
        ((self.new_volume - self.old_volume) / self.old_volume).abs() > VOLUME_EVENT_THRESHOLD
    }
}

/// Move an active route's volume toward its optimum and refresh its economics.
///
/// `ceiling` is the capacity cap from the endpoint hubs. Returns `None` for a
/// route that is not active.
pub fn advance_flow(route: &mut TradeRoute, ctx: &FlowContext<'_>, ceiling: f64) -> Option<FlowOutcome> {
    if route.status != TradeStatus::Active {
        return None;
    }
    let key = route.key;
    let src = ctx.markets.quote(key.source, key.good, ctx.tick);
    let dst = ctx.markets.quote(key.destination, key.good, ctx.tick);
    let depth = ctx.economic.market_depth_units;
    let target = optimal_volume(
        src.supply_level * depth,
        dst.demand_level * depth,
        ctx.economic.initial_volume_fraction,
        ceiling,
    );

    let old_volume = route.current_volume;
    let step = ctx.economic.volume_adjustment_rate * ctx.month_fraction.clamp(0.0, 1.0);
    route.current_volume = (old_volume + (target - old_volume) * step).max(0.0);

    route.source_price = src.price;
    route.destination_price = dst.price;
    route.transport_cost_per_unit = transport_cost(
        route.distance_km,
        ctx.catalog.bulk_factor(key.good),
        ctx.catalog.perishability(key.good),
        route.efficiency_rating,
        ctx.economic.transport_cost_per_km,
    );
    route.profitability = route_profitability(
        route.source_price,
        route.destination_price,
        route.transport_cost_per_unit,
        route.safety_rating,
        route.efficiency_rating,
    );

    route.lifetime_goods_moved += route.effective_volume() * ctx.month_fraction;
    route.lifetime_profit += route.monthly_profit() * ctx.month_fraction;

    Some(FlowOutcome {
        old_volume,
        new_volume: route.current_volume,
    })
}

/// Drift safety back toward the path's rating and follow the season.
///
/// Returns true when an unsafe route draws a bandit disruption this tick.
pub fn update_conditions(route: &mut TradeRoute, ctx: &FlowContext<'_>) -> bool {
    if route.status != TradeStatus::Active {
        return false;
    }
    let rate = ctx.safety.safety_recovery_rate * ctx.month_fraction.clamp(0.0, 1.0);
    route.safety_rating =
        (route.safety_rating + (route.path_safety - route.safety_rating) * rate).clamp(0.0, 1.0);
    route.seasonal_modifier = ctx.catalog.seasonal_supply(route.key.good, ctx.month);

    route.safety_rating < ctx.safety.bandit_safety_threshold
        && ctx.rng.chance(
            route_entity(&route.key),
            route.key.good.index(),
            ctx.tick,
            RngCategory::Disruption,
            ctx.safety.bandit_disruption_chance,
        )
}

/// What a disruption did to a route.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DisruptionEffect {
    /// The route was already disrupted and its countdown was extended.
    pub extended: bool,
    pub volume_before: f64,
    pub volume_after: f64,
    pub monthly_profit_before: f64,
    pub monthly_profit_after: f64,
}

/// Disrupt `route` for `months`.
///
/// A fresh disruption snapshots the pre-disruption baseline and applies the
/// volume and safety factors once. Hitting a disrupted route again only
/// extends the countdown and cuts volume further, never below the floor.
pub fn apply_disruption(
    route: &mut TradeRoute,
    months: u32,
    s: &SafetyParameters,
) -> Result<DisruptionEffect, TradeError> {
    if !route.status.can_transition_to(TradeStatus::Disrupted) {
        return Err(TradeError::InvalidTransition {
            key: route.key,
            from: route.status,
            to: TradeStatus::Disrupted,
        });
    }
    let volume_before = route.current_volume;
    let monthly_profit_before = route.monthly_profit();
    let extended = route.status == TradeStatus::Disrupted;

    if extended {
        let floor = route.recovery.pre_disruption_volume * s.disrupted_volume_floor;
        if route.current_volume > floor {
            route.current_volume = (route.current_volume * s.repeat_disruption_cut).max(floor);
        }
        route.recovery.months_remaining += months;
        route.recovery.months_total += months;
    } else {
        route.recovery.pre_disruption_volume = route.current_volume;
        route.recovery.pre_disruption_safety = route.safety_rating;
        route.current_volume *= s.disruption_volume_factor;
        route.safety_rating *= s.disruption_safety_factor;
        route.recovery.months_remaining = months;
        route.recovery.months_total = months;
        route.status = TradeStatus::Disrupted;
    }
    route.recovery.is_recovering = true;
    route.recovery.progress = progress(route);
    route.disruption_count += 1;

    Ok(DisruptionEffect {
        extended,
        volume_before,
        volume_after: route.current_volume,
        monthly_profit_before,
        monthly_profit_after: route.monthly_profit(),
    })
}

fn progress(route: &TradeRoute) -> f64 {
    let total = route.recovery.months_total;
    if total == 0 {
        return 1.0;
    }
    f64::from(total - route.recovery.months_remaining.min(total)) / f64::from(total)
}

/// Return a disrupted route to service.
pub fn restore_route(route: &mut TradeRoute, s: &SafetyParameters) -> Result<(), TradeError> {
    if route.status != TradeStatus::Disrupted {
        return Err(TradeError::InvalidTransition {
            key: route.key,
            from: route.status,
            to: TradeStatus::Active,
        });
    }
    route.current_volume = route.recovery.pre_disruption_volume * s.restoration_volume_fraction;
    route.safety_rating = (route.safety_rating * s.restoration_safety_multiplier).min(1.0);
    route.status = TradeStatus::Active;
    route.recovery.months_remaining = 0;
    route.recovery.is_recovering = false;
    route.recovery.progress = 1.0;
    Ok(())
}

/// Count one month off a disrupted route's recovery.
///
/// Returns true when the countdown has run out and the route is due back.
pub fn recovery_countdown(route: &mut TradeRoute) -> bool {
    if route.status != TradeStatus::Disrupted {
        return false;
    }
    route.recovery.months_remaining = route.recovery.months_remaining.saturating_sub(1);
    route.recovery.progress = progress(route);
    route.recovery.months_remaining == 0
}

/// Close or reopen a route for the season.
///
/// Returns `Some(true)` when it closed and `Some(false)` when it reopened.
pub fn apply_season(
    route: &mut TradeRoute,
    catalog: &TradeGoodCatalog,
    month: u32,
    year: i32,
    closure_threshold: f64,
) -> Option<bool> {
    let good = route.key.good;
    let available = catalog.get(good).map_or(true, |p| p.is_available(year));
    let open = available && catalog.seasonal_supply(good, month) >= closure_threshold;
    match route.status {
        TradeStatus::Active if !open => {
            route.status = TradeStatus::SeasonalClosed;
            Some(true)
        }
        TradeStatus::SeasonalClosed if open => {
            route.status = TradeStatus::Active;
            route.seasonal_modifier = catalog.seasonal_supply(good, month);
            Some(false)
        }
        _ => None,
    }
}
