//! Route abandonment. Terminal: the route leaves the registry and both hubs.

use crate::routes::{Contribution, RouteDelta};
use crate::system::TradeSystem;
use trade_core::{lock_or_recover, RouteKey, TradeError, TradeEvent, TradeStatus};

#[derive(Clone, Debug, PartialEq)]
pub struct AbandonRoute {
    pub key: RouteKey,
    pub reason: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct AbandonOutcome {
    pub key: RouteKey,
    pub previous_status: TradeStatus,
    pub lifetime_goods_moved: f64,
    pub lifetime_profit: f64,
}

impl AbandonRoute {
    pub fn new(key: RouteKey, reason: impl Into<String>) -> Self {
        Self {
            key,
            reason: reason.into(),
        }
    }

    pub fn validate(&self, sys: &TradeSystem) -> Result<(), TradeError> {
        let routes = lock_or_recover(&sys.routes, "routes");
        let route = routes
            .get(&self.key)
            .ok_or(TradeError::RouteNotFound(self.key))?;
        if !route.status.can_transition_to(TradeStatus::Abandoned) {
            return Err(TradeError::InvalidTransition {
                key: self.key,
                from: route.status,
                to: TradeStatus::Abandoned,
            });
        }
        Ok(())
    }

    pub fn execute(&self, sys: &TradeSystem) -> Result<AbandonOutcome, TradeError> {
        self.validate(sys)?;
        let (outcome, delta, hub_views) = {
            let mut routes = lock_or_recover(&sys.routes, "routes");
            let mut route = routes
                .remove(&self.key)
                .ok_or(TradeError::RouteNotFound(self.key))?;
            let before = Contribution::of(&route);
            let previous_status = route.status;
            route.status = TradeStatus::Abandoned;

            let mut hubs = lock_or_recover(&sys.hubs, "hubs");
            hubs.detach_route(&self.key);
            for region in [self.key.source, self.key.destination] {
                hubs.update_utilization(region, &routes);
            }
            let views: Vec<_> = [self.key.source, self.key.destination]
                .iter()
                .filter_map(|r| hubs.get(*r).cloned())
                .collect();
            (
                AbandonOutcome {
                    key: self.key,
                    previous_status,
                    lifetime_goods_moved: route.lifetime_goods_moved,
                    lifetime_profit: route.lifetime_profit,
                },
                RouteDelta {
                    key: self.key,
                    before,
                    after: Contribution::of(&route),
                },
                views,
            )
        };
        sys.apply_deltas(&[delta]);
        sys.with_store(|store| store.detach_route(&self.key));
        sys.sync_hub_presence(&hub_views);
        sys.cache.invalidate();

        sys.bus.publish(TradeEvent::RouteAbandoned {
            key: self.key,
            reason: self.reason.clone(),
        });
        tracing::info!(
            key = %self.key,
            reason = %self.reason,
            lifetime_goods = outcome.lifetime_goods_moved,
            "trade route abandoned"
        );
        Ok(outcome)
    }
}
