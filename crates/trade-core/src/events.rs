//! Notifications published after committed state changes.
//!
//! Publishing is fire-and-forget: the bus never feeds back into the
//! simulation, and a missing subscriber is not an error.

use crate::hub::HubTier;
use crate::ids::{RegionId, RouteKey, TradeGood};
use crate::route::RouteType;
use crate::sync::lock_or_recover;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;

/// Something that happened to a route, hub or market.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum TradeEvent {
    RouteEstablished {
        key: RouteKey,
        route_type: RouteType,
        distance_km: f64,
        initial_volume: f64,
        profitability: f64,
    },
    RouteDisrupted {
        key: RouteKey,
        cause: String,
        months: u32,
        volume_before: f64,
        volume_after: f64,
        monthly_profit_delta: f64,
        /// Profit lost over the whole disruption at the current rate.
        total_impact: f64,
        /// True when an already disrupted route was hit again.
        extended: bool,
    },
    RouteRecovered {
        key: RouteKey,
        volume: f64,
        safety: f64,
        /// False when the recovery countdown ran out on its own.
        manual: bool,
    },
    RouteAbandoned {
        key: RouteKey,
        reason: String,
    },
    RouteSeasonChanged {
        key: RouteKey,
        closed: bool,
        month: u32,
    },
    HubEvolved {
        region: RegionId,
        old_tier: HubTier,
        new_tier: HubTier,
        new_capacity: f64,
        specializations: Vec<TradeGood>,
        trigger: String,
    },
    PriceShock {
        region: RegionId,
        good: TradeGood,
        old_price: f64,
        new_price: f64,
        magnitude: f64,
        cause: String,
    },
    VolumeChanged {
        key: RouteKey,
        old_volume: f64,
        new_volume: f64,
    },
}

/// Publish-only sink for [`TradeEvent`]s.
pub trait EventBus: Send + Sync {
    fn publish(&self, event: TradeEvent);
}

/// Drops every event.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullBus;

impl EventBus for NullBus {
    fn publish(&self, _event: TradeEvent) {}
}

/// Keeps events in memory until drained.
#[derive(Debug, Default)]
pub struct EventLog {
    events: Mutex<Vec<TradeEvent>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take every pending event, oldest first.
    pub fn drain(&self) -> Vec<TradeEvent> {
        std::mem::take(&mut *lock_or_recover(&self.events, "event log"))
    }

    pub fn len(&self) -> usize {
        lock_or_recover(&self.events, "event log").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl EventBus for EventLog {
    fn publish(&self, event: TradeEvent) {
        lock_or_recover(&self.events, "event log").push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_drains_in_order() {
        let log = EventLog::new();
        let key = RouteKey::new(RegionId(1), RegionId(2), TradeGood::Salt);
        log.publish(TradeEvent::RouteAbandoned {
            key,
            reason: "a".into(),
        });
        log.publish(TradeEvent::VolumeChanged {
            key,
            old_volume: 1.0,
            new_volume: 2.0,
        });
        assert_eq!(log.len(), 2);
        let events = log.drain();
        assert!(matches!(events[0], TradeEvent::RouteAbandoned { .. }));
        assert!(log.is_empty());
    }

    #[test]
    fn events_serialize() {
        let e = TradeEvent::PriceShock {
            region: RegionId(9),
            good: TradeGood::Gold,
            old_price: 10.0,
            new_price: 16.0,
            magnitude: 0.6,
            cause: "mine collapse".into(),
        };
        let json = serde_json::to_string(&e).unwrap();
        assert!(json.contains("PriceShock"));
    }
}
