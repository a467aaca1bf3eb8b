// Commands from many threads against one shared system.

mod common;

use common::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use trade_core::{RegionId, TradeError, TradeGood};

#[test]
fn racing_establishments_create_one_route() {
    let sys = system();
    let wins = AtomicUsize::new(0);
    std::thread::scope(|s| {
        for _ in 0..8 {
            s.spawn(|| match sys.establish_route(RegionId(1), RegionId(4), TradeGood::Iron) {
                Ok(_) => {
                    wins.fetch_add(1, Ordering::SeqCst);
                }
                Err(TradeError::RouteAlreadyExists(k)) | Err(TradeError::EstablishRace(k)) => {
                    assert_eq!(k, iron(1, 4));
                }
                Err(other) => panic!("unexpected failure: {other}"),
            });
        }
    });
    assert_eq!(wins.load(Ordering::SeqCst), 1);
    assert_eq!(sys.route_count(), 1);
    assert_eq!(sys.hub(RegionId(1)).unwrap().outgoing_routes, vec![iron(1, 4)]);
    assert_eq!(sys.hub(RegionId(4)).unwrap().incoming_routes, vec![iron(1, 4)]);
}

#[test]
fn aggregates_match_rebuild_after_concurrent_work() {
    let sys = system();
    std::thread::scope(|s| {
        for src in 1..=3 {
            let sys = &sys;
            s.spawn(move || {
                sys.establish_route(RegionId(src), RegionId(4), TradeGood::Iron).unwrap();
            });
        }
        // route ticks only; prices stay put until the first full month
        s.spawn(|| {
            for _ in 0..20 {
                sys.update(1.0);
            }
        });
    });
    sys.disrupt_route(iron(2, 4), 2, "Storm").unwrap();
    for _ in 0..3 {
        sys.update(30.0);
    }

    let incremental: Vec<_> = (1..=4)
        .map(|r| sys.region_aggregates(RegionId(r)).unwrap())
        .collect();
    sys.rebuild_region_aggregates();
    for (i, before) in incremental.iter().enumerate() {
        let after = sys.region_aggregates(RegionId(i as u32 + 1)).unwrap();
        assert!(approx(before.volume, after.volume), "volume drift in region {}", i + 1);
        assert!(approx(before.profit, after.profit), "profit drift in region {}", i + 1);
    }
    assert_eq!(sys.hub(RegionId(4)).unwrap().incoming_routes.len(), 3);
}
