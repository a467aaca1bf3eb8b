//! Per-update timing counters.

use serde::Serialize;

/// Timings and counts of the most recent update, plus running totals.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct PerformanceMetrics {
    pub route_update_ms: f64,
    pub hub_update_ms: f64,
    pub price_update_ms: f64,
    pub total_update_ms: f64,
    pub routes_processed: usize,
    pub hubs_processed: usize,
    pub markets_updated: usize,
    pub updates: u64,
    pub slow_updates: u64,
}

/// Measurements of one update.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct UpdateTimings {
    pub route_ms: f64,
    pub hub_ms: f64,
    pub price_ms: f64,
    pub total_ms: f64,
    pub routes: usize,
    pub hubs: usize,
    pub markets: usize,
}

impl PerformanceMetrics {
    /// Fold in one update. Returns true if it was slower than `warn_ms`.
    pub fn record(&mut self, t: &UpdateTimings, warn_ms: f64) -> bool {
        self.route_update_ms = t.route_ms;
        self.hub_update_ms = t.hub_ms;
        self.price_update_ms = t.price_ms;
        self.total_update_ms = t.total_ms;
        self.routes_processed = t.routes;
        self.hubs_processed = t.hubs;
        self.markets_updated = t.markets;
        self.updates += 1;
        let slow = t.total_ms > warn_ms;
        if slow {
            self.slow_updates += 1;
        }
        slow
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_slow_updates() {
        let mut m = PerformanceMetrics::default();
        assert!(!m.record(&UpdateTimings { total_ms: 3.0, ..Default::default() }, 16.0));
        assert!(m.record(&UpdateTimings { total_ms: 20.0, routes: 4, ..Default::default() }, 16.0));
        assert_eq!(m.updates, 2);
        assert_eq!(m.slow_updates, 1);
        assert_eq!(m.routes_processed, 4);
    }

    #[test]
    fn serializes_for_reporting() {
        let mut m = PerformanceMetrics::default();
        m.record(&UpdateTimings { total_ms: 2.5, hubs: 3, ..Default::default() }, 16.0);
        let json = serde_json::to_value(&m).unwrap();
        assert_eq!(json["total_update_ms"], 2.5);
        assert_eq!(json["hubs_processed"], 3);
        assert_eq!(json["updates"], 1);
        assert_eq!(json["slow_updates"], 0);
    }
}
