// Route establishment: validate → pathfind → compute → viability → commit.
//
// Only the duplicate pre-check and the commit take locks. Pathfinding and
// the economic computation run with every lock released, so two callers may
// prepare the same key concurrently; the commit re-checks the registry under
// the route lock and the loser gets `TradeError::EstablishRace`.
//
// See also: `trade_econ::pathfinding` for the search, `crate::system` for the
// aggregate and cache bookkeeping shared with the other handlers.

use crate::routes::{Contribution, RouteDelta};
use crate::system::TradeSystem;
use trade_core::{
    lock_or_recover, HubTier, RegionId, RouteKey, RouteType, TradeError, TradeEvent, TradeGood,
    TradeRoute, TradeStatus,
};
use trade_econ::calculator::{optimal_volume, route_profitability, transport_cost};

/// Request to open a route.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EstablishRoute {
    pub source: RegionId,
    pub destination: RegionId,
    pub good: TradeGood,
}

/// A fully computed route that passed the viability gate but is not yet
/// visible to anyone.
#[derive(Clone, Debug, PartialEq)]
pub struct PreparedRoute {
    route: TradeRoute,
}

impl PreparedRoute {
    pub fn route(&self) -> &TradeRoute {
        &self.route
    }
}

/// Result of a committed establishment.
#[derive(Clone, Debug, PartialEq)]
pub struct EstablishOutcome {
    pub key: RouteKey,
    pub route_type: RouteType,
    pub distance_km: f64,
    pub initial_volume: f64,
    pub profitability: f64,
    /// Endpoints that received a new local-market hub.
    pub hubs_created: Vec<RegionId>,
}

impl EstablishRoute {
    pub fn new(source: RegionId, destination: RegionId, good: TradeGood) -> Self {
        Self {
            source,
            destination,
            good,
        }
    }

    pub fn key(&self) -> RouteKey {
        RouteKey::new(self.source, self.destination, self.good)
    }

    /// Cheap checks; the registry lock is held only for the duplicate check.
    pub fn validate(&self, sys: &TradeSystem) -> Result<(), TradeError> {
        if self.source == self.destination {
            return Err(TradeError::SelfLoop(self.source));
        }
        let oracle = sys.pathfinder.oracle();
        for region in [self.source, self.destination] {
            if region.is_null() || !oracle.contains(region) {
                return Err(TradeError::UnknownRegion(region));
            }
        }
        let Some(props) = sys.catalog.get(self.good) else {
            return Err(TradeError::UnknownGood(self.good));
        };
        let year = sys.clock_snapshot().year();
        if !props.is_available(year) {
            return Err(TradeError::GoodUnavailable {
                good: self.good,
                year,
            });
        }
        let key = self.key();
        if lock_or_recover(&sys.routes, "routes").contains(&key) {
            return Err(TradeError::RouteAlreadyExists(key));
        }
        Ok(())
    }

    /// Pathfind, price and size the route, then apply the viability gate.
    ///
    /// Touches no shared state except short reads of hubs and markets.
    pub fn prepare(&self, sys: &TradeSystem) -> Result<PreparedRoute, TradeError> {
        let key = self.key();
        let clock = sys.clock_snapshot();
        let path = sys
            .pathfinder
            .find_optimal_route(self.source, self.destination, self.good)
            .ok_or(TradeError::NoPath {
                from: self.source,
                to: self.destination,
                max_distance: sys.pathfinder.max_search_distance(),
            })?;

        let cfg = &sys.config;
        let src = sys.markets.quote(self.source, self.good, clock.tick);
        let dst = sys.markets.quote(self.destination, self.good, clock.tick);
        let transport = transport_cost(
            path.total_distance_km,
            sys.catalog.bulk_factor(self.good),
            sys.catalog.perishability(self.good),
            path.efficiency,
            cfg.economic.transport_cost_per_km,
        );
        let profitability =
            route_profitability(src.price, dst.price, transport, path.safety, path.efficiency);
        let ceiling = sys.capacity_ceiling(&key);
        let depth = cfg.economic.market_depth_units;
        let volume = optimal_volume(
            src.supply_level * depth,
            dst.demand_level * depth,
            cfg.economic.initial_volume_fraction,
            ceiling,
        );

        let v = &cfg.viability;
        if profitability < v.min_profitability {
            return Err(TradeError::NotViable(format!(
                "profitability {profitability:.3} below minimum {:.3}",
                v.min_profitability
            )));
        }
        if path.safety <= v.establish_min_safety {
            return Err(TradeError::NotViable(format!(
                "path safety {:.3} at or below {:.3}",
                path.safety, v.establish_min_safety
            )));
        }
        if volume <= 0.0 {
            return Err(TradeError::NotViable("no tradable volume".to_string()));
        }
        if path.total_distance_km > v.max_trade_distance {
            return Err(TradeError::NotViable(format!(
                "distance {:.0} km exceeds {:.0} km",
                path.total_distance_km, v.max_trade_distance
            )));
        }

        Ok(PreparedRoute {
            route: TradeRoute {
                key,
                status: TradeStatus::Establishing,
                route_type: path.dominant_type,
                distance_km: path.total_distance_km,
                waypoints: path.waypoints,
                base_volume: volume,
                current_volume: volume,
                source_price: src.price,
                destination_price: dst.price,
                transport_cost_per_unit: transport,
                profitability,
                safety_rating: path.safety,
                path_safety: path.safety,
                efficiency_rating: path.efficiency,
                seasonal_modifier: sys.catalog.seasonal_supply(self.good, clock.month()),
                travel_days: path.travel_days,
                established_year: clock.year(),
                ..Default::default()
            },
        })
    }

    /// Publish a prepared route. Fails with [`TradeError::EstablishRace`] if
    /// the key was committed since validation.
    pub fn commit(&self, sys: &TradeSystem, prepared: PreparedRoute) -> Result<EstablishOutcome, TradeError> {
        let mut route = prepared.route;
        let key = route.key;
        if !route.status.can_transition_to(TradeStatus::Active) {
            return Err(TradeError::InvalidTransition {
                key,
                from: route.status,
                to: TradeStatus::Active,
            });
        }
        route.status = TradeStatus::Active;
        let clock = sys.clock_snapshot();
        let contribution = Contribution::of(&route);
        let outcome = EstablishOutcome {
            key,
            route_type: route.route_type,
            distance_km: route.distance_km,
            initial_volume: route.current_volume,
            profitability: route.profitability,
            hubs_created: Vec::new(),
        };

        let (outcome, hub_views) = {
            let mut routes = lock_or_recover(&sys.routes, "routes");
            if !routes.insert(route) {
                tracing::debug!(%key, "establishment lost commit race");
                return Err(TradeError::EstablishRace(key));
            }
            let mut hubs = lock_or_recover(&sys.hubs, "hubs");
            let mut hubs_created = Vec::new();
            for region in [key.source, key.destination] {
                let name = sys
                    .pathfinder
                    .oracle()
                    .region_name(region)
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("Region {region}"));
                if hubs.create_hub(region, &name, HubTier::LocalMarket, clock.year()) {
                    hubs_created.push(region);
                }
            }
            hubs.attach_route(key);
            for region in [key.source, key.destination] {
                hubs.update_utilization(region, &routes);
            }
            let views: Vec<_> = [key.source, key.destination]
                .iter()
                .filter_map(|r| hubs.get(*r).cloned())
                .collect();
            (
                EstablishOutcome {
                    hubs_created,
                    ..outcome
                },
                views,
            )
        };

        sys.markets.get_or_create_market(key.source, key.good, clock.tick);
        sys.markets.get_or_create_market(key.destination, key.good, clock.tick);
        sys.with_store(|store| {
            for hub in &hub_views {
                store.ensure_trade_components(hub.region, &hub.name);
            }
            store.attach_route(key);
        });
        sys.apply_deltas(&[RouteDelta {
            key,
            before: Contribution::default(),
            after: contribution,
        }]);
        sys.sync_hub_presence(&hub_views);
        sys.cache.invalidate();

        sys.bus.publish(TradeEvent::RouteEstablished {
            key,
            route_type: outcome.route_type,
            distance_km: outcome.distance_km,
            initial_volume: outcome.initial_volume,
            profitability: outcome.profitability,
        });
        tracing::info!(
            %key,
            route_type = %outcome.route_type,
            distance_km = outcome.distance_km,
            volume = outcome.initial_volume,
            profitability = outcome.profitability,
            "trade route established"
        );
        Ok(outcome)
    }

    pub fn execute(&self, sys: &TradeSystem) -> Result<EstablishOutcome, TradeError> {
        self.validate(sys)?;
        let prepared = self.prepare(sys)?;
        self.commit(sys, prepared)
    }
}
