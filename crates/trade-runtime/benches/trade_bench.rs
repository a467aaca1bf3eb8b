use criterion::{criterion_group, criterion_main, Criterion};
use std::sync::Arc;
use trade_core::{DeterministicRng, NullBus, RegionId, TradeConfig, TradeGood, TradeGoodCatalog};
use trade_econ::{ConnectivityOracle, NetworkLayout, TradeNetwork};
use trade_runtime::{RegionStore, TradeSystem};

fn world() -> TradeSystem {
    let cfg = TradeConfig::default();
    let layout = NetworkLayout {
        columns: 6,
        rows: 4,
        ..Default::default()
    };
    let net = TradeNetwork::generate(&layout, DeterministicRng::new(cfg.seed), &cfg.economic).unwrap();
    let regions = net.regions();
    let mut store = RegionStore::new();
    for &id in &regions {
        store.spawn_region(id, format!("Region {id}"));
    }
    let sys = TradeSystem::new(
        cfg,
        Arc::new(TradeGoodCatalog::standard()),
        Arc::new(net),
        Arc::new(NullBus),
    )
    .unwrap()
    .with_region_store(store);
    for &s in &regions {
        for &d in &regions {
            for good in TradeGood::ALL {
                let _ = sys.establish_route(s, d, good);
            }
        }
    }
    sys
}

fn bench_ticks(c: &mut Criterion) {
    let sys = world();
    let route_interval = sys.config().performance.route_update_interval_secs();
    c.bench_function("trade_route_tick", |b| {
        b.iter(|| sys.update(route_interval));
    });
    c.bench_function("trade_month_close", |b| {
        b.iter(|| sys.update_market_prices());
    });
}

fn bench_pathfinding(c: &mut Criterion) {
    let sys = world();
    let corner = RegionId(1001);
    let far = RegionId(1001 + 6 * 4 - 1);
    c.bench_function("trade_pathfind_corner_to_corner", |b| {
        b.iter(|| sys.pathfinder().find_optimal_route(corner, far, TradeGood::Iron));
    });
}

criterion_group!(benches, bench_ticks, bench_pathfinding);
criterion_main!(benches);
