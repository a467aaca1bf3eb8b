#![deny(warnings)]

use anyhow::Context;
use chrono::Datelike;
use std::collections::BTreeMap;
use trade_core::TradeStatus;

fn main() -> anyhow::Result<()> {
    let path = std::env::args()
        .nth(1)
        .context("usage: trade-save-inspect <save.json>")?;
    let snap = persistence::load_json(&path).with_context(|| format!("reading {path}"))?;

    println!("Save: {path}");
    println!(
        "Format v{}, date {}-{:02}, tick {}",
        snap.format_version,
        snap.date.year(),
        snap.date.month(),
        snap.tick
    );

    let mut by_status: BTreeMap<String, usize> = BTreeMap::new();
    for r in &snap.routes {
        *by_status.entry(format!("{:?}", r.status)).or_default() += 1;
    }
    println!("Routes: {}", snap.routes.len());
    for (status, n) in &by_status {
        println!("  {status}: {n}");
    }
    let volume: f64 = snap
        .routes
        .iter()
        .filter(|r| r.status == TradeStatus::Active)
        .map(|r| r.current_volume)
        .sum();
    println!("Active volume: {volume:.1}");

    println!("Hubs: {}", snap.hubs.len());
    for h in &snap.hubs {
        println!(
            "  {} ({}) tier={} level={} routes={} util={:.2}",
            h.name,
            h.region,
            h.tier,
            h.upgrade_level,
            h.route_count(),
            h.current_utilization
        );
    }
    println!("Markets: {}", snap.markets.len());
    println!(
        "Settings: max_distance={} min_profitability={} frequency={}",
        snap.settings.max_trade_distance,
        snap.settings.min_profitability,
        snap.settings.update_frequency
    );
    Ok(())
}
