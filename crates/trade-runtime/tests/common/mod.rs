// Shared fixture: a four-region diamond with one isolated region.
//
//   1 --land 60-- 2
//   |             |
//  sea 150      land 60
//   |             |
//   3 --sea 150-- 4          5 (no connections)
//
// Iron is cheap everywhere except region 4; furs are cheap in 1 and dear in 4.

#![allow(dead_code)]

use std::sync::Arc;
use trade_core::{
    EventBus, EventLog, MarketData, RegionId, RouteKey, RouteType, TradeConfig, TradeGood,
    TradeGoodCatalog,
};
use trade_econ::{RegionSite, TradeNetwork};
use trade_runtime::{RegionStore, TradeSystem};

pub fn network() -> TradeNetwork {
    let mut net = TradeNetwork::new();
    for (id, x, y) in [
        (1, 0.0, 0.0),
        (2, 60.0, 0.0),
        (3, 0.0, 60.0),
        (4, 60.0, 60.0),
        (5, 500.0, 500.0),
    ] {
        net.add_region(RegionSite {
            id: RegionId(id),
            name: format!("R{id}"),
            x_km: x,
            y_km: y,
            ..Default::default()
        })
        .unwrap();
    }
    net.connect(RegionId(1), RegionId(2), RouteType::Land, 60.0).unwrap();
    net.connect(RegionId(2), RegionId(4), RouteType::Land, 60.0).unwrap();
    net.connect(RegionId(1), RegionId(3), RouteType::Sea, 150.0).unwrap();
    net.connect(RegionId(3), RegionId(4), RouteType::Sea, 150.0).unwrap();
    net
}

/// Default configuration without random bandit raids.
pub fn config() -> TradeConfig {
    let mut cfg = TradeConfig::default();
    cfg.safety.bandit_disruption_chance = 0.0;
    cfg
}

pub fn system_with(cfg: TradeConfig, bus: Arc<dyn EventBus>) -> TradeSystem {
    let mut store = RegionStore::new();
    for id in 1..=5 {
        store.spawn_region(RegionId(id), format!("R{id}"));
    }
    let sys = TradeSystem::new(cfg, Arc::new(TradeGoodCatalog::standard()), Arc::new(network()), bus)
        .unwrap()
        .with_region_store(store);
    seed_markets(&sys);
    sys
}

pub fn system() -> TradeSystem {
    system_with(config(), Arc::new(EventLog::new()))
}

pub fn seed_market(sys: &TradeSystem, region: u32, good: TradeGood, price: f64) {
    let mut m = MarketData::new(RegionId(region), good, price);
    m.supply_level = 1.5;
    m.demand_level = 1.5;
    sys.markets().insert_market(m);
}

pub fn seed_markets(sys: &TradeSystem) {
    seed_market(sys, 1, TradeGood::Iron, 1.0);
    seed_market(sys, 2, TradeGood::Iron, 0.5);
    seed_market(sys, 3, TradeGood::Iron, 1.0);
    seed_market(sys, 4, TradeGood::Iron, 6.0);
    seed_market(sys, 1, TradeGood::Furs, 8.0);
    seed_market(sys, 4, TradeGood::Furs, 30.0);
}

pub fn iron(s: u32, d: u32) -> RouteKey {
    RouteKey::new(RegionId(s), RegionId(d), TradeGood::Iron)
}

pub fn furs(s: u32, d: u32) -> RouteKey {
    RouteKey::new(RegionId(s), RegionId(d), TradeGood::Furs)
}

/// Establish the three iron routes into region 4.
pub fn establish_iron_network(sys: &TradeSystem) {
    for s in 1..=3 {
        sys.establish_route(RegionId(s), RegionId(4), TradeGood::Iron).unwrap();
    }
}

pub fn approx(a: f64, b: f64) -> bool {
    (a - b).abs() <= 1e-6 * (1.0 + a.abs().max(b.abs()))
}
