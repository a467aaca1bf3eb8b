#![deny(warnings)]

//! Headless CLI: generate a region network, run a trade scenario for some
//! months and print the resulting KPIs.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info, warn, Level};
use tracing_subscriber::EnvFilter;
use trade_core::{
    DeterministicRng, EventLog, HubTier, MarketData, RegionId, TradeConfig, TradeEvent, TradeGood,
    TradeGoodCatalog, TradeStatus,
};
use trade_econ::{ConnectivityOracle, NetworkLayout, TradeNetwork};
use trade_runtime::{CommandOutcome, RegionStore, TradeCommand, TradeSystem};

#[derive(Debug, Default)]
struct Args {
    scenario: Option<String>,
    config: Option<String>,
    months: Option<u32>,
    seed: Option<u64>,
    save: Option<String>,
    load: Option<String>,
}

fn parse_args() -> Args {
    let mut args = Args::default();
    let mut it = std::env::args().skip(1);
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--scenario" => args.scenario = it.next(),
            "--config" => args.config = it.next(),
            "--months" => args.months = it.next().and_then(|s| s.parse().ok()),
            "--seed" => args.seed = it.next().and_then(|s| s.parse().ok()),
            "--save" => args.save = it.next(),
            "--load" => args.load = it.next(),
            other => warn!(arg = other, "ignoring unknown argument"),
        }
    }
    args
}

#[derive(Debug, Deserialize)]
struct HubSeed {
    region: RegionId,
    #[serde(default)]
    tier: HubTier,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MarketSeed {
    region: RegionId,
    good: TradeGood,
    price: f64,
    #[serde(default)]
    supply: Option<f64>,
    #[serde(default)]
    demand: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Scenario {
    seed: Option<u64>,
    layout: NetworkLayout,
    months: u32,
    hubs: Vec<HubSeed>,
    markets: Vec<MarketSeed>,
    commands: Vec<TradeCommand>,
}

fn load_scenario(path: Option<&str>) -> Result<Scenario> {
    match path {
        Some(p) => {
            let text = std::fs::read_to_string(p).with_context(|| format!("reading scenario {p}"))?;
            serde_yaml::from_str(&text).with_context(|| format!("parsing scenario {p}"))
        }
        None => Ok(Scenario {
            months: 12,
            ..Default::default()
        }),
    }
}

/// Without scripted commands, try every good from the first region outward.
fn discovery_commands(regions: &[RegionId]) -> Vec<TradeCommand> {
    let Some((&origin, rest)) = regions.split_first() else {
        return Vec::new();
    };
    rest.iter()
        .flat_map(|&destination| {
            TradeGood::ALL.iter().map(move |&good| TradeCommand::Establish {
                source: origin,
                destination,
                good,
            })
        })
        .collect()
}

fn main() -> Result<()> {
    // Logging setup
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_max_level(Level::INFO)
        .init();

    let args = parse_args();
    info!(
        scenario = ?args.scenario,
        months = ?args.months,
        version = env!("CARGO_PKG_VERSION"),
        "starting trade CLI"
    );

    let scenario = load_scenario(args.scenario.as_deref())?;
    let mut config = match &args.config {
        Some(p) => TradeConfig::load(p).with_context(|| format!("loading config {p}"))?,
        None => TradeConfig::default(),
    };
    if let Some(seed) = args.seed.or(scenario.seed) {
        config.seed = seed;
    }
    let months = args.months.unwrap_or(scenario.months);
    let price_interval = config.performance.price_update_interval_secs;

    let network = TradeNetwork::generate(
        &scenario.layout,
        DeterministicRng::new(config.seed),
        &config.economic,
    )?;
    info!(
        regions = network.region_count(),
        connections = network.connection_count(),
        "network generated"
    );
    let regions = network.regions();
    let mut store = RegionStore::new();
    for &id in &regions {
        let name = network.region_name(id).unwrap_or("unnamed").to_string();
        store.spawn_region(id, name);
    }

    let log = Arc::new(EventLog::new());
    let mut sys = TradeSystem::new(
        config,
        Arc::new(TradeGoodCatalog::standard()),
        Arc::new(network),
        log.clone(),
    )?
    .with_region_store(store);

    if let Some(path) = &args.load {
        sys.load_json(path).with_context(|| format!("loading save {path}"))?;
    } else {
        for m in &scenario.markets {
            let mut market = MarketData::new(m.region, m.good, m.price);
            market.supply_level = m.supply.unwrap_or(1.0);
            market.demand_level = m.demand.unwrap_or(1.0);
            sys.markets().insert_market(market);
        }
        for h in &scenario.hubs {
            let name = h
                .name
                .clone()
                .or_else(|| sys.pathfinder().oracle().region_name(h.region).map(str::to_string))
                .unwrap_or_else(|| format!("Region {}", h.region));
            sys.create_hub(h.region, &name, h.tier);
        }
        let commands = if scenario.commands.is_empty() {
            discovery_commands(&regions)
        } else {
            scenario.commands
        };
        let mut established = 0usize;
        for cmd in &commands {
            match sys.apply(cmd) {
                Ok(CommandOutcome::Established(out)) => {
                    established += 1;
                    debug!(key = %out.key, volume = out.initial_volume, "route established");
                }
                Ok(_) => {}
                Err(e) => debug!(command = cmd.name(), key = %cmd.key(), error = %e, "command rejected"),
            }
        }
        info!(commands = commands.len(), established, "scenario applied");
    }

    let mut disruptions = 0usize;
    let mut recoveries = 0usize;
    for _ in 0..months {
        let report = sys.update(price_interval);
        disruptions += report.disruptions;
        recoveries += report.recoveries;
    }
    let shocks = log
        .drain()
        .iter()
        .filter(|e| matches!(e, TradeEvent::PriceShock { .. }))
        .count();

    let routes = sys.routes();
    let total_profit: f64 = routes.iter().map(|r| r.monthly_profit()).sum();
    let total_volume: f64 = routes.iter().map(|r| r.effective_volume()).sum();
    let clock = sys.clock_snapshot();
    println!(
        "trade-cli {} | date: {} | months run: {}",
        env!("CARGO_PKG_VERSION"),
        clock.date,
        months
    );
    println!(
        "KPI | routes: {} (active {}, disrupted {}, closed {}) | hubs: {} | markets: {} | volume: {:.1} | profit/month: {:.2} | disruptions: {} | recoveries: {} | shocks: {}",
        routes.len(),
        sys.count_with_status(TradeStatus::Active),
        sys.count_with_status(TradeStatus::Disrupted),
        sys.count_with_status(TradeStatus::SeasonalClosed),
        sys.hubs().len(),
        sys.markets().len(),
        total_volume,
        total_profit,
        disruptions,
        recoveries,
        shocks
    );
    for r in sys.most_profitable_routes(5) {
        println!(
            "  {} | {} {:.0}km | vol {:.1} | profit {:.2}",
            r.key,
            r.route_type,
            r.distance_km,
            r.current_volume,
            r.monthly_profit()
        );
    }

    println!("Metrics | {}", serde_json::to_string(&sys.metrics())?);

    if let Some(path) = &args.save {
        sys.save_json(path).with_context(|| format!("writing save {path}"))?;
        println!("Saved to {path}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bundled_scenario_parses() {
        let path = concat!(env!("CARGO_MANIFEST_DIR"), "/../../scenarios/hanse.yaml");
        let scenario = load_scenario(Some(path)).unwrap();
        assert_eq!(scenario.seed, Some(1241));
        assert_eq!(scenario.months, 24);
        assert_eq!(scenario.hubs.len(), 2);
        assert_eq!(scenario.commands.len(), 4);
    }

    #[test]
    fn discovery_fans_out_from_first_region() {
        let regions = [RegionId(1), RegionId(2), RegionId(3)];
        let cmds = discovery_commands(&regions);
        assert_eq!(cmds.len(), 2 * TradeGood::ALL.len());
        assert!(discovery_commands(&[]).is_empty());
    }
}
