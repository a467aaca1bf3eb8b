//! Disruption and manual restoration of routes.

use crate::flow;
use crate::routes::{Contribution, RouteDelta};
use crate::system::TradeSystem;
use trade_core::{lock_or_recover, RouteKey, TradeError, TradeEvent, TradeStatus};

/// Request to disrupt a route for a number of months.
#[derive(Clone, Debug, PartialEq)]
pub struct DisruptRoute {
    pub key: RouteKey,
    pub months: u32,
    pub cause: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct DisruptOutcome {
    pub key: RouteKey,
    /// Months after clamping to the configured recovery range.
    pub months: u32,
    pub extended: bool,
    pub volume_before: f64,
    pub volume_after: f64,
    pub months_remaining: u32,
}

impl DisruptRoute {
    pub fn new(key: RouteKey, months: u32, cause: impl Into<String>) -> Self {
        Self {
            key,
            months,
            cause: cause.into(),
        }
    }

    /// The route must exist and accept a disruption.
    pub fn validate(&self, sys: &TradeSystem) -> Result<(), TradeError> {
        let routes = lock_or_recover(&sys.routes, "routes");
        let route = routes
            .get(&self.key)
            .ok_or(TradeError::RouteNotFound(self.key))?;
        if !route.status.can_transition_to(TradeStatus::Disrupted) {
            return Err(TradeError::InvalidTransition {
                key: self.key,
                from: route.status,
                to: TradeStatus::Disrupted,
            });
        }
        Ok(())
    }

    pub fn execute(&self, sys: &TradeSystem) -> Result<DisruptOutcome, TradeError> {
        self.validate(sys)?;
        let months = sys.config.clamp_recovery_months(self.months);

        let (effect, delta, months_remaining) = {
            let mut routes = lock_or_recover(&sys.routes, "routes");
            let route = routes
                .get_mut(&self.key)
                .ok_or(TradeError::RouteNotFound(self.key))?;
            let before = Contribution::of(route);
            let effect = flow::apply_disruption(route, months, &sys.config.safety)?;
            let delta = RouteDelta {
                key: self.key,
                before,
                after: Contribution::of(route),
            };
            (effect, delta, route.recovery.months_remaining)
        };
        sys.apply_deltas(&[delta]);
        sys.cache.invalidate();

        let profit_delta = effect.monthly_profit_after - effect.monthly_profit_before;
        sys.bus.publish(TradeEvent::RouteDisrupted {
            key: self.key,
            cause: self.cause.clone(),
            months,
            volume_before: effect.volume_before,
            volume_after: effect.volume_after,
            monthly_profit_delta: profit_delta,
            total_impact: profit_delta * f64::from(months),
            extended: effect.extended,
        });
        tracing::info!(
            key = %self.key,
            cause = %self.cause,
            months,
            extended = effect.extended,
            volume_before = effect.volume_before,
            volume_after = effect.volume_after,
            "trade route disrupted"
        );
        Ok(DisruptOutcome {
            key: self.key,
            months,
            extended: effect.extended,
            volume_before: effect.volume_before,
            volume_after: effect.volume_after,
            months_remaining,
        })
    }
}

/// Request to bring a disrupted route back before its countdown ends.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RestoreRoute {
    pub key: RouteKey,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RestoreOutcome {
    pub key: RouteKey,
    pub volume: f64,
    pub safety: f64,
}

impl RestoreRoute {
    pub fn new(key: RouteKey) -> Self {
        Self { key }
    }

    pub fn validate(&self, sys: &TradeSystem) -> Result<(), TradeError> {
        let routes = lock_or_recover(&sys.routes, "routes");
        let route = routes
            .get(&self.key)
            .ok_or(TradeError::RouteNotFound(self.key))?;
        if route.status != TradeStatus::Disrupted {
            return Err(TradeError::InvalidTransition {
                key: self.key,
                from: route.status,
                to: TradeStatus::Active,
            });
        }
        Ok(())
    }

    pub fn execute(&self, sys: &TradeSystem) -> Result<RestoreOutcome, TradeError> {
        self.validate(sys)?;
        let (outcome, delta) = {
            let mut routes = lock_or_recover(&sys.routes, "routes");
            let route = routes
                .get_mut(&self.key)
                .ok_or(TradeError::RouteNotFound(self.key))?;
            let before = Contribution::of(route);
            flow::restore_route(route, &sys.config.safety)?;
            (
                RestoreOutcome {
                    key: self.key,
                    volume: route.current_volume,
                    safety: route.safety_rating,
                },
                RouteDelta {
                    key: self.key,
                    before,
                    after: Contribution::of(route),
                },
            )
        };
        sys.apply_deltas(&[delta]);
        sys.cache.invalidate();
        sys.bus.publish(TradeEvent::RouteRecovered {
            key: self.key,
            volume: outcome.volume,
            safety: outcome.safety,
            manual: true,
        });
        tracing::info!(key = %self.key, volume = outcome.volume, safety = outcome.safety, "trade route restored");
        Ok(outcome)
    }
}
