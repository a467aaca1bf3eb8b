// Save a running simulation to JSON, load it into a fresh system and check
// that the loaded state matches and keeps running.

mod common;

use common::*;
use trade_core::{RegionId, TradeStatus, CURRENT_FORMAT_VERSION};

#[test]
fn save_and_load_preserve_state() {
    let sys = system();
    establish_iron_network(&sys);
    sys.establish_route(RegionId(1), RegionId(4), trade_core::TradeGood::Furs).unwrap();
    sys.disrupt_route(iron(3, 4), 4, "Pirates").unwrap();
    sys.update(30.0);
    sys.update(30.0);

    let saved = sys.snapshot();
    assert!(saved.routes.len() >= 3);
    assert!(saved.hubs.len() >= 2);
    assert!(saved.markets.len() >= 5);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("saves").join("campaign.json");
    sys.save_json(&path).unwrap();

    let mut loaded = system();
    loaded.load_json(&path).unwrap();
    let back = loaded.snapshot();

    assert_eq!(back.date, saved.date);
    assert_eq!(back.tick, saved.tick);
    assert_eq!(back.settings, saved.settings);
    // floats survive the JSON text exactly
    assert_eq!(back.routes, saved.routes);
    assert_eq!(back.hubs, saved.hubs);
    assert_eq!(back.markets, saved.markets);
    assert_eq!(back, saved);

    // derived aggregates are rebuilt on load
    for region in 1..=4 {
        let before = sys.region_aggregates(RegionId(region)).unwrap();
        let after = loaded.region_aggregates(RegionId(region)).unwrap();
        assert!(approx(before.volume, after.volume), "region {region}");
        assert!(approx(before.profit, after.profit), "region {region}");
    }

    // the loaded system keeps running
    loaded.restore_route(iron(3, 4)).unwrap();
    assert_eq!(loaded.route(&iron(3, 4)).unwrap().status, TradeStatus::Active);
    loaded.update(30.0);
    assert_eq!(loaded.clock_snapshot().tick, saved.tick + 1);
}

#[test]
fn abandoned_routes_are_not_restored() {
    let sys = system();
    establish_iron_network(&sys);
    let mut snap = sys.snapshot();
    snap.routes[0].status = TradeStatus::Abandoned;
    let gone = snap.routes[0].key;

    let mut loaded = system();
    loaded.restore_snapshot(snap);
    assert_eq!(loaded.route_count(), 2);
    assert!(loaded.route(&gone).is_none());
    // no hub keeps pointing at the dropped route
    for hub in loaded.hubs() {
        assert!(hub.route_keys().all(|k| *k != gone), "hub {}", hub.region);
    }
    for region in [gone.source, gone.destination] {
        if let Some(hub) = loaded.hub(region) {
            assert!(hub.route_keys().all(|k| loaded.route(k).is_some()));
        }
    }
}

#[test]
fn newer_saves_are_rejected_without_side_effects() {
    let sys = system();
    establish_iron_network(&sys);
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("future.json");
    let mut snap = sys.snapshot();
    snap.format_version = CURRENT_FORMAT_VERSION + 1;
    persistence::save_json(&path, &snap).unwrap();

    let mut loaded = system();
    loaded.establish_route(RegionId(1), RegionId(4), trade_core::TradeGood::Iron).unwrap();
    let err = loaded.load_json(&path).unwrap_err();
    assert!(matches!(err, persistence::PersistenceError::UnsupportedVersion { .. }));
    assert_eq!(loaded.route_count(), 1);
}
