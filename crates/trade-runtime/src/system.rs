// The trade orchestrator: owns every registry and drives the tick loop.
//
// `TradeSystem` is constructed explicitly and shared by reference; there are
// no globals. Route, hub and market maps each sit behind their own mutex.
// Lock order, outermost first:
//
//   efficiency cache → routes → hubs → region store → markets
//
// The market lock is a leaf. The clock and metrics locks are only ever taken
// alone. Writers invalidate the efficiency cache after releasing the route
// lock, and events are published with no lock held.
//
// `update(delta_secs)` accumulates real time. Every route interval
// (1 / update_frequency seconds) one batch of at most `max_routes_per_tick`
// routes and `max_hubs_per_tick` hubs is processed, continuing round-robin
// from where the previous batch stopped. Every price interval the markets are
// updated and one calendar month closes: seasonality, recovery countdowns and
// seasonal closures run over every route.
//
// **Critical constraint: determinism.** Given the same seed, configuration,
// commands and update deltas, two systems produce identical state. All
// iteration is over ordered maps and all randomness is keyed.

use crate::cache::EfficiencyCache;
use crate::clock::TradeClock;
use crate::command::{CommandOutcome, TradeCommand};
use crate::flow::{self, FlowContext};
use crate::handlers::{
    AbandonOutcome, AbandonRoute, DisruptOutcome, DisruptRoute, EstablishOutcome, EstablishRoute,
    RestoreOutcome, RestoreRoute,
};
use crate::hubs::{HubEvolution, HubRegistry};
use crate::metrics::{PerformanceMetrics, UpdateTimings};
use crate::routes::{Contribution, RouteDelta, RouteRegistry};
use crate::store::{HubPresence, RegionStore, RouteLedger, TradeInventory};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;
use trade_core::snapshot::PersistedSettings;
use trade_core::{
    lock_or_recover, ConfigError, DeterministicRng, EventBus, HubTier, MarketData, RegionId,
    RouteKey, TradeConfig, TradeError, TradeEvent, TradeGood, TradeGoodCatalog, TradeHub,
    TradeRoute, TradeSnapshot, TradeStatus, CURRENT_FORMAT_VERSION,
};
use trade_econ::calculator::{monthly_expenses, monthly_income};
use trade_econ::{ConnectivityOracle, MarketEngine, Pathfinder, PathfinderSettings};

/// Number of routes returned by [`TradeSystem::most_profitable_routes`] when
/// callers have no preference.
pub const DEFAULT_TOP_ROUTES: usize = 10;

/// Counters from one [`TradeSystem::update`] call.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct TickReport {
    pub route_ticks: u32,
    pub price_ticks: u32,
    pub routes_processed: usize,
    pub hubs_processed: usize,
    pub markets_updated: usize,
    pub disruptions: usize,
    pub recoveries: usize,
    pub seasonal_changes: usize,
    pub hub_evolutions: usize,
}

impl TickReport {
    fn absorb(&mut self, other: TickReport) {
        self.routes_processed += other.routes_processed;
        self.hubs_processed += other.hubs_processed;
        self.markets_updated += other.markets_updated;
        self.disruptions += other.disruptions;
        self.recoveries += other.recoveries;
        self.seasonal_changes += other.seasonal_changes;
        self.hub_evolutions += other.hub_evolutions;
    }
}

/// Trade simulation state and the operations over it.
pub struct TradeSystem {
    pub(crate) config: TradeConfig,
    pub(crate) catalog: Arc<TradeGoodCatalog>,
    pub(crate) pathfinder: Pathfinder,
    pub(crate) markets: MarketEngine,
    pub(crate) routes: Mutex<RouteRegistry>,
    pub(crate) hubs: Mutex<HubRegistry>,
    pub(crate) store: Option<Mutex<RegionStore>>,
    pub(crate) cache: EfficiencyCache,
    pub(crate) clock: Mutex<TradeClock>,
    pub(crate) metrics: Mutex<PerformanceMetrics>,
    pub(crate) bus: Arc<dyn EventBus>,
    pub(crate) rng: DeterministicRng,
}

impl TradeSystem {
    /// Build a system over `oracle`. The configuration is validated first.
    pub fn new(
        config: TradeConfig,
        catalog: Arc<TradeGoodCatalog>,
        oracle: Arc<dyn ConnectivityOracle>,
        bus: Arc<dyn EventBus>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let rng = DeterministicRng::new(config.seed);
        let pathfinder = Pathfinder::new(
            oracle,
            catalog.clone(),
            PathfinderSettings::from_config(&config),
            rng,
        );
        let markets = MarketEngine::new(catalog.clone(), &config, rng, bus.clone());
        let hubs = HubRegistry::new(config.hubs.clone(), config.economic.clone(), rng);
        tracing::info!(
            seed = config.seed,
            regions = pathfinder.oracle().regions().len(),
            goods = catalog.len(),
            "trade system initialized"
        );
        Ok(Self {
            config,
            catalog,
            pathfinder,
            markets,
            routes: Mutex::new(RouteRegistry::new()),
            hubs: Mutex::new(hubs),
            store: None,
            cache: EfficiencyCache::new(),
            clock: Mutex::new(TradeClock::default()),
            metrics: Mutex::new(PerformanceMetrics::default()),
            bus,
            rng,
        })
    }

    /// Attach a region store; aggregates are rebuilt into it immediately.
    pub fn with_region_store(mut self, store: RegionStore) -> Self {
        self.store = Some(Mutex::new(store));
        self.rebuild_region_aggregates();
        self
    }

    pub fn config(&self) -> &TradeConfig {
        &self.config
    }

    pub fn catalog(&self) -> &TradeGoodCatalog {
        &self.catalog
    }

    pub fn markets(&self) -> &MarketEngine {
        &self.markets
    }

    pub fn pathfinder(&self) -> &Pathfinder {
        &self.pathfinder
    }

    pub fn rng(&self) -> DeterministicRng {
        self.rng
    }

    pub fn has_region_store(&self) -> bool {
        self.store.is_some()
    }

    /// Copy of the calendar and tick counters.
    pub fn clock_snapshot(&self) -> TradeClock {
        lock_or_recover(&self.clock, "clock").clone()
    }

    pub fn metrics(&self) -> PerformanceMetrics {
        lock_or_recover(&self.metrics, "metrics").clone()
    }

    fn routes_lock(&self) -> MutexGuard<'_, RouteRegistry> {
        lock_or_recover(&self.routes, "routes")
    }

    fn hubs_lock(&self) -> MutexGuard<'_, HubRegistry> {
        lock_or_recover(&self.hubs, "hubs")
    }

    /// Run `f` against the region store, or warn and skip when there is none.
    pub(crate) fn with_store<R>(&self, f: impl FnOnce(&mut RegionStore) -> R) -> Option<R> {
        match &self.store {
            Some(store) => {
                let mut guard = lock_or_recover(store, "region store");
                Some(f(&mut *guard))
            }
            None => {
                tracing::warn!("no region store attached; aggregate update skipped");
                None
            }
        }
    }

    /// Shift per-region aggregates by each route's contribution change.
    pub(crate) fn apply_deltas(&self, deltas: &[RouteDelta]) {
        let deltas: Vec<&RouteDelta> = deltas.iter().filter(|d| !d.is_zero()).collect();
        if deltas.is_empty() {
            return;
        }
        self.with_store(|store| {
            for d in deltas {
                store.apply_route_delta(
                    &d.key,
                    d.after.volume - d.before.volume,
                    d.after.profit - d.before.profit,
                );
            }
        });
    }

    /// Mirror hub tier and load onto the region entities.
    pub(crate) fn sync_hub_presence(&self, hubs: &[TradeHub]) {
        if hubs.is_empty() || self.store.is_none() {
            return;
        }
        self.with_store(|store| {
            for hub in hubs {
                store.spawn_region(hub.region, hub.name.clone());
                store.insert(
                    hub.region,
                    HubPresence {
                        tier: hub.tier,
                        monthly_throughput: hub.current_utilization * hub.effective_capacity(),
                        utilization: hub.current_utilization,
                    },
                );
            }
        });
    }

    /// Capacity cap for a new or flowing route: the smaller endpoint hub
    /// capacity, or the configured default for an endpoint without a hub.
    pub(crate) fn capacity_ceiling(&self, key: &RouteKey) -> f64 {
        let hubs = self.hubs_lock();
        ceiling_from(&hubs, key, self.config.hubs.default_capacity_ceiling)
    }

    // ------------------------------------------------------------------
    // Commands
    // ------------------------------------------------------------------

    pub fn apply(&self, command: &TradeCommand) -> Result<CommandOutcome, TradeError> {
        let result = command.execute(self);
        if let Err(e) = &result {
            tracing::warn!(command = command.name(), key = %command.key(), error = %e, kind = ?e.kind(), "trade command failed");
        }
        result
    }

    pub fn establish_route(
        &self,
        source: RegionId,
        destination: RegionId,
        good: TradeGood,
    ) -> Result<EstablishOutcome, TradeError> {
        EstablishRoute::new(source, destination, good).execute(self)
    }

    pub fn disrupt_route(
        &self,
        key: RouteKey,
        months: u32,
        cause: &str,
    ) -> Result<DisruptOutcome, TradeError> {
        DisruptRoute::new(key, months, cause).execute(self)
    }

    pub fn restore_route(&self, key: RouteKey) -> Result<RestoreOutcome, TradeError> {
        RestoreRoute::new(key).execute(self)
    }

    pub fn abandon_route(&self, key: RouteKey, reason: &str) -> Result<AbandonOutcome, TradeError> {
        AbandonRoute::new(key, reason).execute(self)
    }

    /// Create a hub. Returns false if the region already has one.
    pub fn create_hub(&self, region: RegionId, name: &str, tier: HubTier) -> bool {
        let year = self.clock_snapshot().year();
        let created = self.hubs_lock().create_hub(region, name, tier, year);
        if created {
            if let Some(hub) = self.hub(region) {
                self.with_store(|store| store.ensure_trade_components(region, name));
                self.sync_hub_presence(&[hub]);
            }
        }
        created
    }

    /// Re-tier a hub from its current traffic. Returns true on a tier change.
    pub fn evolve_hub(&self, region: RegionId) -> bool {
        let evolution = {
            let routes = self.routes_lock();
            let mut hubs = self.hubs_lock();
            hubs.evolve_hub(region, &routes)
        };
        match evolution {
            Some(ev) => {
                self.publish_evolution(&ev, "manual review");
                true
            }
            None => false,
        }
    }

    pub fn upgrade_hub(&self, region: RegionId, level: u8) -> Result<bool, TradeError> {
        let upgraded = self.hubs_lock().upgrade_hub(region, level)?;
        if upgraded {
            if let Some(hub) = self.hub(region) {
                self.sync_hub_presence(&[hub]);
            }
        }
        Ok(upgraded)
    }

    fn publish_evolution(&self, ev: &HubEvolution, trigger: &str) {
        if let Some(hub) = self.hub(ev.region) {
            self.sync_hub_presence(&[hub]);
        }
        self.bus.publish(TradeEvent::HubEvolved {
            region: ev.region,
            old_tier: ev.old_tier,
            new_tier: ev.new_tier,
            new_capacity: ev.new_capacity,
            specializations: ev.specializations.clone(),
            trigger: trigger.to_string(),
        });
    }

    /// Shock one market's price by a relative `magnitude`.
    pub fn apply_price_shock(
        &self,
        region: RegionId,
        good: TradeGood,
        magnitude: f64,
        cause: &str,
    ) -> MarketData {
        let tick = self.clock_snapshot().tick;
        self.markets.apply_price_shock(region, good, magnitude, cause, tick)
    }

    // ------------------------------------------------------------------
    // Tick loop
    // ------------------------------------------------------------------

    /// Advance the simulation by `delta_secs` of real time.
    pub fn update(&self, delta_secs: f64) -> TickReport {
        let started = Instant::now();
        let perf = &self.config.performance;
        let route_interval = perf.route_update_interval_secs();
        let price_interval = perf.price_update_interval_secs;
        let (route_ticks, price_ticks) = {
            let mut clock = lock_or_recover(&self.clock, "clock");
            (
                clock.take_route_ticks(delta_secs, route_interval),
                clock.take_price_ticks(delta_secs, price_interval),
            )
        };
        let month_fraction = (route_interval / price_interval).min(1.0);

        let mut report = TickReport {
            route_ticks,
            price_ticks,
            ..Default::default()
        };
        let mut timings = UpdateTimings::default();

        for _ in 0..route_ticks {
            let t = Instant::now();
            report.absorb(self.process_route_batch(month_fraction));
            timings.route_ms += t.elapsed().as_secs_f64() * 1000.0;

            let t = Instant::now();
            report.absorb(self.process_hub_batch());
            timings.hub_ms += t.elapsed().as_secs_f64() * 1000.0;
        }
        for _ in 0..price_ticks {
            let t = Instant::now();
            report.absorb(self.close_month());
            timings.price_ms += t.elapsed().as_secs_f64() * 1000.0;
        }

        timings.total_ms = started.elapsed().as_secs_f64() * 1000.0;
        timings.routes = report.routes_processed;
        timings.hubs = report.hubs_processed;
        timings.markets = report.markets_updated;
        let slow = lock_or_recover(&self.metrics, "metrics").record(&timings, perf.slow_update_warning_ms);
        if slow && perf.logging_enabled {
            tracing::warn!(
                total_ms = timings.total_ms,
                routes = timings.routes,
                hubs = timings.hubs,
                "slow trade update"
            );
        }
        report
    }

    fn flow_context(&self, clock: &TradeClock, month_fraction: f64) -> FlowContext<'_> {
        FlowContext {
            economic: &self.config.economic,
            safety: &self.config.safety,
            catalog: &self.catalog,
            markets: &self.markets,
            rng: self.rng,
            tick: clock.flow_ticks,
            month: clock.month(),
            month_fraction,
        }
    }

    /// One route tick over the next batch of routes.
    fn process_route_batch(&self, month_fraction: f64) -> TickReport {
        let clock = self.clock_snapshot();
        let ctx = self.flow_context(&clock, month_fraction);
        let max = self.config.performance.max_routes_per_tick;
        let bandit_months = self
            .config
            .clamp_recovery_months(self.config.safety.bandit_disruption_months);
        let mut report = TickReport::default();
        let mut deltas = Vec::new();
        let mut events = Vec::new();

        let last = {
            let mut routes = self.routes_lock();
            let hubs = self.hubs_lock();
            let batch = routes.batch_after(clock.route_cursor, max);
            for key in &batch {
                let ceiling = ceiling_from(&hubs, key, self.config.hubs.default_capacity_ceiling);
                let Some(route) = routes.get_mut(key) else {
                    continue;
                };
                let before = Contribution::of(route);
                if let Some(moved) = flow::advance_flow(route, &ctx, ceiling) {
                    if moved.is_significant() {
                        events.push(TradeEvent::VolumeChanged {
                            key: *key,
                            old_volume: moved.old_volume,
                            new_volume: moved.new_volume,
                        });
                    }
                }
                if flow::update_conditions(route, &ctx) {
                    if let Ok(effect) = flow::apply_disruption(route, bandit_months, &self.config.safety) {
                        let profit_delta = effect.monthly_profit_after - effect.monthly_profit_before;
                        events.push(TradeEvent::RouteDisrupted {
                            key: *key,
                            cause: flow::BANDIT_CAUSE.to_string(),
                            months: bandit_months,
                            volume_before: effect.volume_before,
                            volume_after: effect.volume_after,
                            monthly_profit_delta: profit_delta,
                            total_impact: profit_delta * f64::from(bandit_months),
                            extended: effect.extended,
                        });
                        report.disruptions += 1;
                        tracing::info!(key = %key, months = bandit_months, "bandits disrupted trade route");
                    }
                }
                deltas.push(RouteDelta {
                    key: *key,
                    before,
                    after: Contribution::of(route),
                });
                report.routes_processed += 1;
            }
            batch.last().copied()
        };

        {
            let mut clock = lock_or_recover(&self.clock, "clock");
            clock.route_cursor = last.or(clock.route_cursor);
            clock.flow_ticks += 1;
        }
        self.apply_deltas(&deltas);
        if report.routes_processed > 0 {
            self.cache.invalidate();
        }
        for e in events {
            self.bus.publish(e);
        }
        report
    }

    /// Utilization and tier review over the next batch of hubs.
    fn process_hub_batch(&self) -> TickReport {
        let cursor = self.clock_snapshot().hub_cursor;
        let max = self.config.performance.max_hubs_per_tick;
        let mut report = TickReport::default();
        let (last, evolutions, views) = {
            let routes = self.routes_lock();
            let mut hubs = self.hubs_lock();
            let batch = hubs.batch_after(cursor, max);
            let mut evolutions = Vec::new();
            for region in &batch {
                hubs.update_utilization(*region, &routes);
                hubs.update_specializations(*region, &routes);
                if let Some(ev) = hubs.evolve_hub(*region, &routes) {
                    evolutions.push(ev);
                }
                report.hubs_processed += 1;
            }
            let views: Vec<TradeHub> = batch.iter().filter_map(|r| hubs.get(*r).cloned()).collect();
            (batch.last().copied(), evolutions, views)
        };
        {
            let mut clock = lock_or_recover(&self.clock, "clock");
            clock.hub_cursor = last.or(clock.hub_cursor);
        }
        self.sync_hub_presence(&views);
        report.hub_evolutions = evolutions.len();
        for ev in &evolutions {
            self.publish_evolution(ev, "trade volume");
        }
        report
    }

    /// Price tick: update markets, close the month, then run the monthly
    /// route pass for the new month.
    fn close_month(&self) -> TickReport {
        let tick = self.clock_snapshot().tick;
        let prices = self.markets.update_all_prices(tick);
        self.markets.record_monthly_close();
        let clock = {
            let mut clock = lock_or_recover(&self.clock, "clock");
            clock.advance_month();
            clock.clone()
        };
        let month = clock.month();
        self.markets.process_seasonal_adjustment(month);

        let mut report = TickReport {
            markets_updated: prices.markets_updated,
            ..Default::default()
        };
        let mut deltas = Vec::new();
        let mut events = Vec::new();
        {
            let mut routes = self.routes_lock();
            let keys: Vec<RouteKey> = routes.keys().copied().collect();
            for key in keys {
                let Some(route) = routes.get_mut(&key) else {
                    continue;
                };
                let before = Contribution::of(route);
                if flow::recovery_countdown(route) && flow::restore_route(route, &self.config.safety).is_ok() {
                    events.push(TradeEvent::RouteRecovered {
                        key,
                        volume: route.current_volume,
                        safety: route.safety_rating,
                        manual: false,
                    });
                    report.recoveries += 1;
                    tracing::info!(%key, volume = route.current_volume, "trade route recovered");
                }
                if let Some(closed) = flow::apply_season(
                    route,
                    &self.catalog,
                    month,
                    clock.year(),
                    self.config.economic.seasonal_closure_threshold,
                ) {
                    events.push(TradeEvent::RouteSeasonChanged { key, closed, month });
                    report.seasonal_changes += 1;
                    tracing::debug!(%key, closed, month, "seasonal route status changed");
                }
                deltas.push(RouteDelta {
                    key,
                    before,
                    after: Contribution::of(route),
                });
            }
        }
        self.apply_deltas(&deltas);
        self.cache.invalidate();
        for e in events {
            self.bus.publish(e);
        }
        if self.config.performance.logging_enabled {
            tracing::info!(
                date = %clock.date,
                markets = prices.markets_updated,
                shocks = prices.shocks,
                recoveries = report.recoveries,
                seasonal = report.seasonal_changes,
                "trade month closed"
            );
        }
        report
    }

    /// Run the market update and month close immediately.
    pub fn update_market_prices(&self) -> TickReport {
        self.close_month()
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    pub fn route(&self, key: &RouteKey) -> Option<TradeRoute> {
        self.routes_lock().get(key).cloned()
    }

    pub fn routes(&self) -> Vec<TradeRoute> {
        self.routes_lock().values().cloned().collect()
    }

    pub fn route_count(&self) -> usize {
        self.routes_lock().len()
    }

    pub fn count_with_status(&self, status: TradeStatus) -> usize {
        self.routes_lock().count_with_status(status)
    }

    pub fn routes_from(&self, region: RegionId) -> Vec<TradeRoute> {
        self.routes_lock().from_region(region).into_iter().cloned().collect()
    }

    pub fn routes_to(&self, region: RegionId) -> Vec<TradeRoute> {
        self.routes_lock().to_region(region).into_iter().cloned().collect()
    }

    pub fn routes_for_good(&self, good: TradeGood) -> Vec<TradeRoute> {
        self.routes_lock().for_good(good).into_iter().cloned().collect()
    }

    /// Active routes with the highest monthly profit, best first.
    pub fn most_profitable_routes(&self, n: usize) -> Vec<TradeRoute> {
        let routes = self.routes_lock();
        let mut active: Vec<&TradeRoute> = routes
            .values()
            .filter(|r| r.status == TradeStatus::Active)
            .collect();
        active.sort_by(|a, b| {
            b.monthly_profit()
                .total_cmp(&a.monthly_profit())
                .then_with(|| a.key.cmp(&b.key))
        });
        active.into_iter().take(n).cloned().collect()
    }

    pub fn hub(&self, region: RegionId) -> Option<TradeHub> {
        self.hubs_lock().get(region).cloned()
    }

    pub fn hubs(&self) -> Vec<TradeHub> {
        self.hubs_lock().values().cloned().collect()
    }

    pub fn trading_partners(&self, region: RegionId) -> Vec<RegionId> {
        self.hubs_lock().trading_partners(region)
    }

    /// Effective volume of every route touching `region`.
    pub fn total_volume(&self, region: RegionId) -> f64 {
        self.routes_lock()
            .touching(region)
            .map(TradeRoute::effective_volume)
            .sum()
    }

    pub fn volume_for_good(&self, region: RegionId, good: TradeGood) -> f64 {
        self.routes_lock()
            .touching(region)
            .filter(|r| r.key.good == good)
            .map(TradeRoute::effective_volume)
            .sum()
    }

    /// Monthly margin earned on goods `region` exports.
    pub fn region_income(&self, region: RegionId) -> f64 {
        self.routes_lock()
            .values()
            .filter(|r| r.key.source == region)
            .map(|r| {
                monthly_income(
                    r.effective_volume(),
                    r.source_price,
                    r.destination_price,
                    r.transport_cost_per_unit,
                )
            })
            .sum()
    }

    /// Monthly cost of goods `region` imports plus carriage on its exports.
    pub fn region_expenses(&self, region: RegionId) -> f64 {
        self.routes_lock()
            .values()
            .map(|r| {
                let v = r.effective_volume();
                let mut cost = 0.0;
                if r.key.destination == region {
                    cost += monthly_expenses(v, r.source_price, r.transport_cost_per_unit);
                }
                if r.key.source == region {
                    cost += v * r.transport_cost_per_unit;
                }
                cost
            })
            .sum()
    }

    pub fn net_trade_balance(&self, region: RegionId) -> f64 {
        self.region_income(region) - self.region_expenses(region)
    }

    /// Mean efficiency of active routes touching `region`, cached.
    pub fn region_efficiency(&self, region: RegionId) -> f64 {
        self.cache.get_or_recompute(region, || {
            let routes = self.routes_lock();
            let mut sums: BTreeMap<RegionId, (f64, usize)> = BTreeMap::new();
            for r in routes.values().filter(|r| r.status == TradeStatus::Active) {
                for endpoint in [r.key.source, r.key.destination] {
                    let e = sums.entry(endpoint).or_default();
                    e.0 += r.efficiency_rating;
                    e.1 += 1;
                }
            }
            sums.into_iter()
                .map(|(region, (sum, n))| (region, sum / n as f64))
                .collect()
        })
    }

    pub fn efficiency_recomputations(&self) -> u64 {
        self.cache.recomputations()
    }

    /// Cached per-region ledger totals, if a store is attached.
    pub fn region_aggregates(&self, region: RegionId) -> Option<Contribution> {
        let store = self.store.as_ref()?;
        let store = lock_or_recover(store, "region store");
        store.get::<RouteLedger>(region).map(|l| Contribution {
            volume: l.total_monthly_volume,
            profit: l.total_monthly_profit,
        })
    }

    /// Recompute every region aggregate from the route registry.
    pub fn rebuild_region_aggregates(&self) {
        if self.store.is_none() {
            return;
        }
        let (totals, outbound, names) = {
            let routes = self.routes_lock();
            let hubs = self.hubs_lock();
            let outbound: Vec<(RouteKey, f64)> = routes
                .values()
                .map(|r| (r.key, r.effective_volume()))
                .collect();
            let names: BTreeMap<RegionId, String> =
                hubs.values().map(|h| (h.region, h.name.clone())).collect();
            (routes.region_totals(), outbound, names)
        };
        let oracle = self.pathfinder.oracle();
        self.with_store(|store| {
            store.clear_totals();
            for (key, _) in &outbound {
                for region in [key.source, key.destination] {
                    if !store.has::<RouteLedger>(region) {
                        let name = names
                            .get(&region)
                            .cloned()
                            .or_else(|| oracle.region_name(region).map(str::to_string))
                            .unwrap_or_else(|| format!("Region {region}"));
                        store.ensure_trade_components(region, &name);
                    }
                }
                store.attach_route(*key);
            }
            for (region, c) in &totals {
                store.update::<RouteLedger>(*region, |l| {
                    l.total_monthly_volume = c.volume;
                    l.total_monthly_profit = c.profit;
                });
            }
            for (key, volume) in &outbound {
                store.update::<TradeInventory>(key.source, |inv| {
                    *inv.in_transit.entry(key.good).or_default() += volume;
                    inv.refresh_utilization();
                });
            }
        });
        let hubs = self.hubs();
        self.sync_hub_presence(&hubs);
        tracing::debug!(regions = totals.len(), routes = outbound.len(), "region aggregates rebuilt");
    }

    // ------------------------------------------------------------------
    // Maintenance
    // ------------------------------------------------------------------

    /// Abandon active routes whose profitability fell below the minimum.
    /// Returns the keys removed.
    pub fn cleanup_unprofitable_routes(&self) -> Vec<RouteKey> {
        let min = self.config.viability.min_profitability;
        let doomed: Vec<RouteKey> = self
            .routes_lock()
            .values()
            .filter(|r| r.status == TradeStatus::Active && r.profitability < min)
            .map(|r| r.key)
            .collect();
        let mut removed = Vec::new();
        for key in doomed {
            match self.abandon_route(key, "Unprofitable") {
                Ok(_) => removed.push(key),
                Err(e) => tracing::debug!(%key, error = %e, "cleanup skipped route"),
            }
        }
        if !removed.is_empty() {
            tracing::info!(count = removed.len(), "unprofitable routes abandoned");
        }
        removed
    }

    // ------------------------------------------------------------------
    // Settings
    // ------------------------------------------------------------------

    /// Route updates per second, clamped to [0.1, 10].
    pub fn set_update_frequency(&mut self, frequency: f64) {
        self.config.performance.update_frequency = clamp_or(frequency, 0.1, 10.0, 0.2);
    }

    /// Maximum trade distance in km, at least 100.
    pub fn set_max_trade_distance(&mut self, distance: f64) {
        let d = if distance.is_finite() { distance.max(100.0) } else { 100.0 };
        self.config.viability.max_trade_distance = d;
        self.pathfinder.set_max_search_distance(d);
    }

    /// Minimum profitability, clamped to [0, 0.5].
    pub fn set_min_profitability(&mut self, value: f64) {
        self.config.viability.min_profitability = clamp_or(value, 0.0, 0.5, 0.05);
    }

    pub fn set_logging_enabled(&mut self, enabled: bool) {
        self.config.performance.logging_enabled = enabled;
    }

    // ------------------------------------------------------------------
    // Persistence
    // ------------------------------------------------------------------

    pub fn snapshot(&self) -> TradeSnapshot {
        let clock = self.clock_snapshot();
        TradeSnapshot {
            format_version: CURRENT_FORMAT_VERSION,
            date: clock.date,
            tick: clock.tick,
            routes: self.routes(),
            hubs: self.hubs(),
            markets: self.markets.markets(),
            settings: PersistedSettings::from_config(&self.config),
        }
    }

    /// Replace all state with `snap`. Derived data is rebuilt.
    pub fn restore_snapshot(&mut self, snap: TradeSnapshot) {
        let mut cfg = self.config.clone();
        snap.settings.apply_to(&mut cfg);
        self.set_update_frequency(cfg.performance.update_frequency);
        self.set_max_trade_distance(cfg.viability.max_trade_distance);
        self.set_min_profitability(cfg.viability.min_profitability);
        self.set_logging_enabled(cfg.performance.logging_enabled);

        let route_count = snap.routes.len();
        {
            let mut routes = self.routes_lock();
            routes.clear();
            for r in snap.routes {
                if r.status == TradeStatus::Abandoned {
                    continue;
                }
                routes.insert(r);
            }
        }
        {
            let routes = self.routes_lock();
            let mut hubs = self.hubs_lock();
            hubs.replace_all(snap.hubs);
            let pruned = hubs.prune_routes(&routes);
            if pruned > 0 {
                tracing::debug!(pruned, "dropped hub references to unrestored routes");
            }
        }
        self.markets.replace_all(snap.markets);
        *lock_or_recover(&self.clock, "clock") = TradeClock {
            tick: snap.tick,
            ..TradeClock::new(snap.date)
        };
        self.cache.invalidate();
        self.rebuild_region_aggregates();
        tracing::info!(
            date = %snap.date,
            routes = route_count,
            hubs = self.hubs_lock().len(),
            markets = self.markets.len(),
            "trade state restored"
        );
    }

    pub fn save_json(&self, path: impl AsRef<Path>) -> Result<(), persistence::PersistenceError> {
        persistence::save_json(path, &self.snapshot())
    }

    pub fn load_json(&mut self, path: impl AsRef<Path>) -> Result<(), persistence::PersistenceError> {
        let snap = persistence::load_json(path)?;
        self.restore_snapshot(snap);
        Ok(())
    }
}

fn ceiling_from(hubs: &HubRegistry, key: &RouteKey, default: f64) -> f64 {
    [key.source, key.destination]
        .iter()
        .map(|r| hubs.get(*r).map_or(default, TradeHub::effective_capacity))
        .fold(f64::INFINITY, f64::min)
}

fn clamp_or(value: f64, lo: f64, hi: f64, fallback: f64) -> f64 {
    if value.is_finite() {
        value.clamp(lo, hi)
    } else {
        fallback
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trade_core::{EventLog, FailureKind, RouteType};
    use trade_econ::{RegionSite, TradeNetwork};

    // Diamond: 1-2-4 overland (cheap on distance, dear per km), 1-3-4 by sea.
    fn network() -> TradeNetwork {
        let mut net = TradeNetwork::new();
        for (id, x, y) in [(1, 0.0, 0.0), (2, 60.0, 0.0), (3, 0.0, 60.0), (4, 60.0, 60.0), (5, 500.0, 500.0)] {
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

    fn system_with(bus: Arc<dyn EventBus>) -> TradeSystem {
        let sys = TradeSystem::new(
            TradeConfig::default(),
            Arc::new(TradeGoodCatalog::standard()),
            Arc::new(network()),
            bus,
        )
        .unwrap()
        .with_region_store(RegionStore::new());
        for region in 1..=4 {
            seed_market(&sys, region, TradeGood::Iron, 1.0);
        }
        seed_market(&sys, 4, TradeGood::Iron, 6.0);
        sys
    }

    fn system() -> TradeSystem {
        system_with(Arc::new(EventLog::new()))
    }

    fn seed_market(sys: &TradeSystem, region: u32, good: TradeGood, price: f64) {
        let mut m = MarketData::new(RegionId(region), good, price);
        m.current_price = price;
        m.supply_level = 1.5;
        m.demand_level = 1.5;
        m.avg_price_12_months = price;
        sys.markets().insert_market(m);
    }

    fn key(s: u32, d: u32) -> RouteKey {
        RouteKey::new(RegionId(s), RegionId(d), TradeGood::Iron)
    }

    #[test]
    fn establishment_is_idempotent() {
        let sys = system();
        let out = sys.establish_route(RegionId(1), RegionId(4), TradeGood::Iron).unwrap();
        assert_eq!(out.hubs_created, vec![RegionId(1), RegionId(4)]);
        let again = sys.establish_route(RegionId(1), RegionId(4), TradeGood::Iron);
        assert_eq!(again, Err(TradeError::RouteAlreadyExists(key(1, 4))));
        assert_eq!(sys.route_count(), 1);
        let hub = sys.hub(RegionId(4)).unwrap();
        assert_eq!(hub.incoming_routes, vec![key(1, 4)]);
    }

    #[test]
    fn validation_failures() {
        let sys = system();
        let self_loop = sys.establish_route(RegionId(1), RegionId(1), TradeGood::Iron);
        assert_eq!(self_loop, Err(TradeError::SelfLoop(RegionId(1))));
        let unknown = sys.establish_route(RegionId(1), RegionId(99), TradeGood::Iron);
        assert_eq!(unknown, Err(TradeError::UnknownRegion(RegionId(99))));
        let null = sys.establish_route(RegionId(0), RegionId(1), TradeGood::Iron);
        assert_eq!(null.unwrap_err().kind(), FailureKind::Validation);
        // region 5 is isolated
        let no_path = sys.establish_route(RegionId(1), RegionId(5), TradeGood::Iron);
        assert_eq!(no_path.unwrap_err().kind(), FailureKind::NoViablePath);
        // prices are flat between 1 and 2
        let flat = sys.establish_route(RegionId(1), RegionId(2), TradeGood::Iron);
        assert_eq!(flat.unwrap_err().kind(), FailureKind::NotViable);
        assert_eq!(sys.route_count(), 0);
        assert!(sys.hubs().is_empty());
    }

    #[test]
    fn commit_rejects_race() {
        let sys = system();
        let a = EstablishRoute::new(RegionId(1), RegionId(4), TradeGood::Iron);
        a.validate(&sys).unwrap();
        let first = a.prepare(&sys).unwrap();
        let second = a.prepare(&sys).unwrap();
        a.commit(&sys, first).unwrap();
        let lost = a.commit(&sys, second).unwrap_err();
        assert_eq!(lost, TradeError::EstablishRace(key(1, 4)));
        assert_eq!(lost.kind(), FailureKind::RaceDetected);
        assert_eq!(sys.route_count(), 1);
        assert_eq!(sys.hub(RegionId(1)).unwrap().outgoing_routes.len(), 1);
    }

    #[test]
    fn disruption_arithmetic_applies_once() {
        let sys = system();
        sys.establish_route(RegionId(1), RegionId(4), TradeGood::Iron).unwrap();
        let before = sys.route(&key(1, 4)).unwrap();
        let out = sys.disrupt_route(key(1, 4), 3, "flood").unwrap();
        assert!(!out.extended);
        let after = sys.route(&key(1, 4)).unwrap();
        assert!((after.current_volume - before.current_volume * 0.1).abs() < 1e-9);
        assert!((after.safety_rating - before.safety_rating * 0.3).abs() < 1e-9);

        let again = sys.disrupt_route(key(1, 4), 2, "flood").unwrap();
        assert!(again.extended);
        assert_eq!(again.months_remaining, 5);
        let twice = sys.route(&key(1, 4)).unwrap();
        assert!((twice.safety_rating - before.safety_rating * 0.3).abs() < 1e-9);
        assert!((twice.current_volume - before.current_volume * 0.05).abs() < 1e-9);
    }

    #[test]
    fn restore_requires_disruption() {
        let sys = system();
        sys.establish_route(RegionId(1), RegionId(4), TradeGood::Iron).unwrap();
        let err = sys.restore_route(key(1, 4)).unwrap_err();
        assert!(matches!(err, TradeError::InvalidTransition { .. }));
        sys.disrupt_route(key(1, 4), 3, "war").unwrap();
        let out = sys.restore_route(key(1, 4)).unwrap();
        let r = sys.route(&key(1, 4)).unwrap();
        assert_eq!(r.status, TradeStatus::Active);
        assert_eq!(r.disruption_count, 1);
        assert!((out.volume - r.recovery.pre_disruption_volume * 0.8).abs() < 1e-9);
    }

    #[test]
    fn abandonment_cleans_up() {
        let log = Arc::new(EventLog::new());
        let sys = system_with(log.clone());
        sys.establish_route(RegionId(1), RegionId(4), TradeGood::Iron).unwrap();
        sys.abandon_route(key(1, 4), "war").unwrap();
        assert!(sys.route(&key(1, 4)).is_none());
        assert_eq!(sys.hub(RegionId(1)).unwrap().route_count(), 0);
        assert_eq!(sys.hub(RegionId(4)).unwrap().route_count(), 0);
        let err = sys.disrupt_route(key(1, 4), 3, "late").unwrap_err();
        assert_eq!(err, TradeError::RouteNotFound(key(1, 4)));
        assert_eq!(err.kind(), FailureKind::Validation);
        let agg = sys.region_aggregates(RegionId(1)).unwrap();
        assert!(agg.volume.abs() < 1e-9);
        let events = log.drain();
        assert!(matches!(events.last(), Some(TradeEvent::RouteAbandoned { .. })));
    }

    #[test]
    fn establishment_updates_store() {
        let sys = system();
        let out = sys.establish_route(RegionId(1), RegionId(4), TradeGood::Iron).unwrap();
        let agg = sys.region_aggregates(RegionId(4)).unwrap();
        let r = sys.route(&key(1, 4)).unwrap();
        assert!((agg.volume - r.effective_volume()).abs() < 1e-9);
        assert!(out.initial_volume > 0.0);
        let store = sys.store.as_ref().unwrap();
        let store = lock_or_recover(store, "region store");
        let inv = store.get::<TradeInventory>(RegionId(1)).unwrap();
        assert!((inv.in_transit[&TradeGood::Iron] - r.effective_volume()).abs() < 1e-9);
        assert!(store.has::<HubPresence>(RegionId(4)));
    }

    #[test]
    fn queries_cover_both_endpoints() {
        let sys = system();
        sys.establish_route(RegionId(1), RegionId(4), TradeGood::Iron).unwrap();
        seed_market(&sys, 2, TradeGood::Iron, 0.5);
        sys.establish_route(RegionId(2), RegionId(4), TradeGood::Iron).unwrap();
        assert_eq!(sys.routes_to(RegionId(4)).len(), 2);
        assert_eq!(sys.routes_from(RegionId(1)).len(), 1);
        assert_eq!(sys.routes_for_good(TradeGood::Iron).len(), 2);
        assert_eq!(sys.trading_partners(RegionId(4)), vec![RegionId(1), RegionId(2)]);
        assert!(sys.total_volume(RegionId(4)) > sys.total_volume(RegionId(1)));
        assert_eq!(sys.volume_for_good(RegionId(4), TradeGood::Wine), 0.0);
        assert!(sys.region_income(RegionId(1)) > 0.0);
        assert!(sys.region_expenses(RegionId(4)) > 0.0);
        let top = sys.most_profitable_routes(1);
        assert_eq!(top.len(), 1);
        assert!(sys
            .routes()
            .iter()
            .all(|r| r.monthly_profit() <= top[0].monthly_profit()));
    }

    #[test]
    fn net_balance_is_income_less_expenses() {
        let sys = system();
        assert_eq!(sys.net_trade_balance(RegionId(1)), 0.0);
        sys.establish_route(RegionId(1), RegionId(4), TradeGood::Iron).unwrap();
        for region in [RegionId(1), RegionId(4)] {
            let net = sys.net_trade_balance(region);
            assert!((net - (sys.region_income(region) - sys.region_expenses(region))).abs() < 1e-9);
        }
        // the importer pays for the goods and earns nothing
        assert!(sys.net_trade_balance(RegionId(4)) < 0.0);
        assert!(sys.net_trade_balance(RegionId(1)) > sys.net_trade_balance(RegionId(4)));
    }

    #[test]
    fn hub_batch_refreshes_specializations_without_tier_change() {
        let sys = system();
        sys.create_hub(RegionId(1), "R1", HubTier::RegionalHub);
        sys.create_hub(RegionId(4), "R4", HubTier::RegionalHub);
        sys.establish_route(RegionId(1), RegionId(4), TradeGood::Iron).unwrap();
        assert!(!sys.hub(RegionId(4)).unwrap().is_specialized_in(TradeGood::Iron));
        for _ in 0..3 {
            sys.update(5.0);
        }
        let hub = sys.hub(RegionId(4)).unwrap();
        assert_eq!(hub.tier, HubTier::RegionalHub);
        assert!(hub.is_specialized_in(TradeGood::Iron));
        assert_eq!(hub.handling_efficiency_for(TradeGood::Iron), 1.3);
        // only incoming traffic counts
        assert!(sys.hub(RegionId(1)).unwrap().specialized_goods.is_empty());
    }

    #[test]
    fn efficiency_cache_recomputes_once() {
        let sys = system();
        sys.establish_route(RegionId(1), RegionId(4), TradeGood::Iron).unwrap();
        let before = sys.efficiency_recomputations();
        let e = sys.region_efficiency(RegionId(1));
        sys.region_efficiency(RegionId(4));
        sys.region_efficiency(RegionId(3));
        assert_eq!(sys.efficiency_recomputations(), before + 1);
        let r = sys.route(&key(1, 4)).unwrap();
        assert!((e - r.efficiency_rating).abs() < 1e-12);
        assert_eq!(sys.region_efficiency(RegionId(3)), 1.0);
    }

    #[test]
    fn setters_clamp() {
        let mut sys = system();
        sys.set_update_frequency(50.0);
        assert_eq!(sys.config().performance.update_frequency, 10.0);
        sys.set_max_trade_distance(5.0);
        assert_eq!(sys.pathfinder().max_search_distance(), 100.0);
        sys.set_min_profitability(0.9);
        assert_eq!(sys.config().viability.min_profitability, 0.5);
    }

    #[test]
    fn cleanup_abandons_unprofitable() {
        let sys = system();
        sys.establish_route(RegionId(1), RegionId(4), TradeGood::Iron).unwrap();
        sys.routes_lock().get_mut(&key(1, 4)).unwrap().profitability = 0.0;
        assert_eq!(sys.cleanup_unprofitable_routes(), vec![key(1, 4)]);
        assert_eq!(sys.route_count(), 0);
    }

    #[test]
    fn months_advance_with_price_ticks() {
        let sys = system();
        let report = sys.update(90.0);
        assert_eq!(report.price_ticks, 3);
        assert_eq!(sys.clock_snapshot().month(), 4);
        assert_eq!(report.route_ticks, crate::clock::MAX_ROUTE_CATCH_UP);
        assert_eq!(sys.metrics().updates, 1);
        // a long stall closes at most a year
        let report = sys.update(30.0 * 100.0);
        assert_eq!(report.price_ticks, crate::clock::MAX_MONTH_CATCH_UP);
        assert_eq!(sys.clock_snapshot().month(), 4);
        assert_eq!(sys.clock_snapshot().tick, 3 + 12);
    }
}
