// A* route search over the region connectivity graph.
//
// The open set is a `BinaryHeap` with reversed ordering (min-heap on
// f-score, ties broken by region id). Scores and back-pointers live in
// `BTreeMap`s keyed by `RegionId`, so iteration order never depends on
// hashing.
//
// Edge cost is segment distance times the per-classification cost multiplier,
// inflated for perishable goods on slow segments. The heuristic is the
// straight-line distance times the cheapest multiplier; since network edges
// are never shorter than the straight line and the perishability factor is
// at least 1, it never overestimates.
//
// See also: `network.rs` for the graph, `trade_runtime::handlers::establish`
// which calls the pathfinder between its validation and compute phases.
//
// **Critical constraint: determinism.** The search is a pure function of the
// graph and endpoints. Path safety draws one keyed sample per waypoint, so a
// given path always gets the same rating.

use crate::network::{Connection, ConnectivityOracle};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, BinaryHeap};
use std::sync::Arc;
use trade_core::{
    DeterministicRng, RegionId, RngCategory, RouteType, RouteTypeTable, TradeConfig,
    TradeGood, TradeGoodCatalog,
};

/// Smallest search budget accepted by [`Pathfinder::set_max_search_distance`].
pub const MIN_SEARCH_DISTANCE: f64 = 100.0;

/// One hop of a path.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PathSegment {
    pub from: RegionId,
    pub to: RegionId,
    pub route_type: RouteType,
    pub distance_km: f64,
}

/// A found route with its derived ratings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RoutePath {
    /// Source first, destination last.
    pub waypoints: Vec<RegionId>,
    pub segments: Vec<PathSegment>,
    pub total_distance_km: f64,
    /// Weighted search cost.
    pub total_cost: f64,
    pub travel_days: f64,
    /// Product of waypoint safety samples, floored.
    pub safety: f64,
    /// Product of segment efficiency factors, capped.
    pub efficiency: f64,
    /// Classification covering the most distance.
    pub dominant_type: RouteType,
}

impl RoutePath {
    pub fn is_trivial(&self) -> bool {
        self.segments.is_empty()
    }
}

/// Tunables the search reads from [`TradeConfig`].
#[derive(Clone, Debug, PartialEq)]
pub struct PathfinderSettings {
    pub cost_multipliers: RouteTypeTable,
    pub efficiency_multipliers: RouteTypeTable,
    pub travel_speed_km_per_day: RouteTypeTable,
    pub max_search_distance: f64,
    pub min_path_safety: f64,
    pub max_efficiency: f64,
    pub waypoint_safety_min: f64,
    pub waypoint_safety_max: f64,
}

impl PathfinderSettings {
    pub fn from_config(cfg: &TradeConfig) -> Self {
        Self {
            cost_multipliers: cfg.economic.cost_multipliers,
            efficiency_multipliers: cfg.economic.efficiency_multipliers,
            travel_speed_km_per_day: cfg.economic.travel_speed_km_per_day,
            max_search_distance: cfg.viability.max_trade_distance.max(MIN_SEARCH_DISTANCE),
            min_path_safety: cfg.safety.min_path_safety,
            max_efficiency: cfg.safety.max_efficiency,
            waypoint_safety_min: cfg.safety.waypoint_safety_min,
            waypoint_safety_max: cfg.safety.waypoint_safety_max,
        }
    }
}

/// Entry in the A* open set (min-heap via reversed ordering).
struct OpenEntry {
    node: RegionId,
    f_score: f64,
}

impl PartialEq for OpenEntry {
    fn eq(&self, other: &Self) -> bool {
        self.f_score.total_cmp(&other.f_score) == Ordering::Equal && self.node == other.node
    }
}

impl Eq for OpenEntry {}

impl PartialOrd for OpenEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OpenEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed for min-heap: smallest f_score is "greatest".
        other
            .f_score
            .total_cmp(&self.f_score)
            .then_with(|| other.node.0.cmp(&self.node.0))
    }
}

/// Route search over a shared connectivity oracle.
#[derive(Clone)]
pub struct Pathfinder {
    oracle: Arc<dyn ConnectivityOracle>,
    catalog: Arc<TradeGoodCatalog>,
    settings: PathfinderSettings,
    rng: DeterministicRng,
}

impl Pathfinder {
    pub fn new(
        oracle: Arc<dyn ConnectivityOracle>,
        catalog: Arc<TradeGoodCatalog>,
        settings: PathfinderSettings,
        rng: DeterministicRng,
    ) -> Self {
        Self {
            oracle,
            catalog,
            settings,
            rng,
        }
    }

    pub fn oracle(&self) -> &dyn ConnectivityOracle {
        self.oracle.as_ref()
    }

    pub fn settings(&self) -> &PathfinderSettings {
        &self.settings
    }

    pub fn max_search_distance(&self) -> f64 {
        self.settings.max_search_distance
    }

    /// Set the search budget; values under [`MIN_SEARCH_DISTANCE`] are raised.
    pub fn set_max_search_distance(&mut self, distance: f64) {
        self.settings.max_search_distance = if distance.is_finite() {
            distance.max(MIN_SEARCH_DISTANCE)
        } else {
            MIN_SEARCH_DISTANCE
        };
    }

    fn segment_cost(&self, conn: &Connection, perishability: f64) -> f64 {
        let speed = self.settings.travel_speed_km_per_day.get(conn.route_type);
        let days = if speed > 0.0 { conn.distance_km / speed } else { 0.0 };
        conn.distance_km
            * self.settings.cost_multipliers.get(conn.route_type)
            * (1.0 + perishability * days / 30.0)
    }

    fn heuristic(&self, from: RegionId, to: RegionId) -> f64 {
        self.oracle.straight_line_km(from, to) * self.settings.cost_multipliers.min()
    }

    /// Cheapest path from `source` to `destination` for `good`.
    ///
    /// Returns `None` when either endpoint is unknown, or when every path costs
    /// more than the search budget. A self-loop yields a trivial one-waypoint
    /// path.
    pub fn find_optimal_route(
        &self,
        source: RegionId,
        destination: RegionId,
        good: TradeGood,
    ) -> Option<RoutePath> {
        if !self.oracle.contains(source) || !self.oracle.contains(destination) {
            return None;
        }
        if source == destination {
            return Some(self.build_path(vec![source], Vec::new(), 0.0));
        }

        let perishability = self.catalog.perishability(good);
        let budget = self.settings.max_search_distance;
        let mut open = BinaryHeap::new();
        let mut g_score: BTreeMap<RegionId, f64> = BTreeMap::new();
        let mut came_from: BTreeMap<RegionId, Connection> = BTreeMap::new();
        let mut predecessor: BTreeMap<RegionId, RegionId> = BTreeMap::new();
        let mut closed: BTreeSet<RegionId> = BTreeSet::new();

        g_score.insert(source, 0.0);
        open.push(OpenEntry {
            node: source,
            f_score: self.heuristic(source, destination),
        });

        while let Some(OpenEntry { node, .. }) = open.pop() {
            if node == destination {
                let total_cost = g_score.get(&node).copied().unwrap_or(0.0);
                let (waypoints, segments) =
                    reconstruct_path(&came_from, &predecessor, source, destination);
                let path = self.build_path(waypoints, segments, total_cost);
                tracing::debug!(
                    %source,
                    %destination,
                    %good,
                    hops = path.segments.len(),
                    cost = path.total_cost,
                    "route found"
                );
                return Some(path);
            }
            if !closed.insert(node) {
                continue;
            }
            let current_g = g_score.get(&node).copied().unwrap_or(f64::INFINITY);

            for conn in self.oracle.connections(node) {
                if closed.contains(&conn.to) {
                    continue;
                }
                let tentative = current_g + self.segment_cost(conn, perishability);
                if tentative > budget {
                    continue;
                }
                let best = g_score.get(&conn.to).copied().unwrap_or(f64::INFINITY);
                if tentative < best {
                    g_score.insert(conn.to, tentative);
                    came_from.insert(conn.to, *conn);
                    predecessor.insert(conn.to, node);
                    open.push(OpenEntry {
                        node: conn.to,
                        f_score: tentative + self.heuristic(conn.to, destination),
                    });
                }
            }
        }

        tracing::debug!(%source, %destination, %good, budget, "no route within search budget");
        None
    }

    /// Alternative routes, best first. Only the optimal route is produced.
    pub fn find_alternative_routes(
        &self,
        source: RegionId,
        destination: RegionId,
        good: TradeGood,
        max_routes: usize,
    ) -> Vec<RoutePath> {
        if max_routes == 0 {
            return Vec::new();
        }
        self.find_optimal_route(source, destination, good)
            .into_iter()
            .collect()
    }

    /// Cost of carrying `good` along `path`, scaled by its bulk.
    pub fn route_cost(&self, path: &RoutePath, good: TradeGood) -> f64 {
        let bulk = self.catalog.bulk_factor(good);
        path.segments
            .iter()
            .map(|s| s.distance_km * self.settings.cost_multipliers.get(s.route_type) * bulk)
            .sum()
    }

    /// Whether some path between the two regions is no longer than `max_distance` km.
    pub fn is_route_viable(&self, source: RegionId, destination: RegionId, max_distance: f64) -> bool {
        self.find_optimal_route(source, destination, TradeGood::Stone)
            .is_some_and(|p| p.total_distance_km <= max_distance)
    }

    /// Floored product of per-waypoint safety samples.
    pub fn route_safety(&self, waypoints: &[RegionId]) -> f64 {
        let product: f64 = waypoints
            .iter()
            .map(|w| {
                self.rng.uniform(
                    u64::from(w.0),
                    0,
                    0,
                    RngCategory::WaypointSafety,
                    self.settings.waypoint_safety_min,
                    self.settings.waypoint_safety_max,
                )
            })
            .product();
        product.max(self.settings.min_path_safety).min(1.0)
    }

    /// Capped product of per-segment efficiency factors.
    pub fn route_efficiency(&self, segments: &[PathSegment]) -> f64 {
        let product: f64 = segments
            .iter()
            .map(|s| self.settings.efficiency_multipliers.get(s.route_type))
            .product();
        product.min(self.settings.max_efficiency)
    }

    fn build_path(
        &self,
        waypoints: Vec<RegionId>,
        segments: Vec<PathSegment>,
        total_cost: f64,
    ) -> RoutePath {
        let mut by_type: BTreeMap<RouteType, f64> = BTreeMap::new();
        let mut travel_days = 0.0;
        for s in &segments {
            *by_type.entry(s.route_type).or_default() += s.distance_km;
            let speed = self.settings.travel_speed_km_per_day.get(s.route_type);
            if speed > 0.0 {
                travel_days += s.distance_km / speed;
            }
        }
        let dominant_type = by_type
            .iter()
            .fold(None::<(RouteType, f64)>, |best, (&t, &d)| match best {
                Some((_, bd)) if bd >= d => best,
                _ => Some((t, d)),
            })
            .map_or(RouteType::Land, |(t, _)| t);
        RoutePath {
            total_distance_km: by_type.values().sum(),
            safety: self.route_safety(&waypoints),
            efficiency: self.route_efficiency(&segments),
            waypoints,
            segments,
            total_cost,
            travel_days,
            dominant_type,
        }
    }
}

fn reconstruct_path(
    came_from: &BTreeMap<RegionId, Connection>,
    predecessor: &BTreeMap<RegionId, RegionId>,
    source: RegionId,
    destination: RegionId,
) -> (Vec<RegionId>, Vec<PathSegment>) {
    let mut waypoints = vec![destination];
    let mut segments = Vec::new();
    let mut current = destination;
    while current != source {
        let (Some(conn), Some(&prev)) = (came_from.get(&current), predecessor.get(&current)) else {
            break;
        };
        segments.push(PathSegment {
            from: prev,
            to: current,
            route_type: conn.route_type,
            distance_km: conn.distance_km,
        });
        waypoints.push(prev);
        current = prev;
    }
    waypoints.reverse();
    segments.reverse();
    (waypoints, segments)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::{RegionSite, TradeNetwork};

    fn r(id: u32) -> RegionId {
        RegionId(id)
    }

    fn site(id: u32, x: f64, y: f64) -> RegionSite {
        RegionSite {
            id: r(id),
            name: format!("R{id}"),
            x_km: x,
            y_km: y,
            ..Default::default()
        }
    }

    /// Diamond: 1 -> 2 -> 4 over land (100 + 100) and 1 -> 3 -> 4 by sea
    /// (150 + 150). Sea is cheaper per km, so the longer path wins.
    fn diamond() -> TradeNetwork {
        let mut net = TradeNetwork::new();
        net.add_region(site(1, 0.0, 0.0)).unwrap();
        net.add_region(site(2, 50.0, 50.0)).unwrap();
        net.add_region(site(3, 50.0, -50.0)).unwrap();
        net.add_region(site(4, 100.0, 0.0)).unwrap();
        net.connect(r(1), r(2), RouteType::Land, 100.0).unwrap();
        net.connect(r(2), r(4), RouteType::Land, 100.0).unwrap();
        net.connect(r(1), r(3), RouteType::Sea, 150.0).unwrap();
        net.connect(r(3), r(4), RouteType::Sea, 150.0).unwrap();
        net
    }

    fn finder(net: TradeNetwork) -> Pathfinder {
        let cfg = TradeConfig::default();
        Pathfinder::new(
            Arc::new(net),
            Arc::new(TradeGoodCatalog::standard()),
            PathfinderSettings::from_config(&cfg),
            DeterministicRng::new(cfg.seed),
        )
    }

    #[test]
    fn picks_cheapest_not_shortest() {
        let pf = finder(diamond());
        let path = pf.find_optimal_route(r(1), r(4), TradeGood::Iron).unwrap();
        assert_eq!(path.waypoints, vec![r(1), r(3), r(4)]);
        assert!((path.total_distance_km - 300.0).abs() < 1e-9);
        // 300 km × 0.3
        assert!((path.total_cost - 90.0).abs() < 1e-9);
        assert_eq!(path.dominant_type, RouteType::Sea);
        assert!((path.travel_days - 3.0).abs() < 1e-9);
    }

    #[test]
    fn self_loop_is_trivial() {
        let pf = finder(diamond());
        let path = pf.find_optimal_route(r(2), r(2), TradeGood::Food).unwrap();
        assert!(path.is_trivial());
        assert_eq!(path.waypoints, vec![r(2)]);
        assert_eq!(path.total_distance_km, 0.0);
        assert_eq!(path.total_cost, 0.0);
    }

    #[test]
    fn unknown_endpoint_has_no_route() {
        let pf = finder(diamond());
        assert!(pf.find_optimal_route(r(1), r(99), TradeGood::Food).is_none());
    }

    #[test]
    fn budget_aborts_search() {
        let mut pf = finder(diamond());
        pf.set_max_search_distance(10.0);
        assert_eq!(pf.max_search_distance(), MIN_SEARCH_DISTANCE);
        // cheapest path costs 90, land legs cost 100 each: 90 fits
        assert!(pf.find_optimal_route(r(1), r(4), TradeGood::Iron).is_some());

        let mut net = TradeNetwork::new();
        net.add_region(site(1, 0.0, 0.0)).unwrap();
        net.add_region(site(2, 500.0, 0.0)).unwrap();
        net.connect(r(1), r(2), RouteType::Land, 500.0).unwrap();
        let mut pf = finder(net);
        pf.set_max_search_distance(400.0);
        assert!(pf.find_optimal_route(r(1), r(2), TradeGood::Iron).is_none());
        assert!(!pf.is_route_viable(r(1), r(2), 1000.0));
    }

    #[test]
    fn safety_and_efficiency_bounds() {
        let pf = finder(diamond());
        let path = pf.find_optimal_route(r(1), r(4), TradeGood::Iron).unwrap();
        // three waypoints sampled in [0.8, 1.0]
        assert!(path.safety >= 0.8f64.powi(3) - 1e-9 && path.safety <= 1.0);
        // sea 1.5 × 1.5 = 2.25 capped at 2.0
        assert_eq!(path.efficiency, 2.0);

        let long: Vec<RegionId> = (1..=40).map(r).collect();
        assert_eq!(pf.route_safety(&long), 0.1);
    }

    #[test]
    fn safety_is_deterministic_per_path() {
        let a = finder(diamond())
            .find_optimal_route(r(1), r(4), TradeGood::Iron)
            .unwrap();
        let b = finder(diamond())
            .find_optimal_route(r(1), r(4), TradeGood::Iron)
            .unwrap();
        assert_eq!(a.safety, b.safety);
    }

    #[test]
    fn alternatives_degrade_to_optimal() {
        let pf = finder(diamond());
        let alts = pf.find_alternative_routes(r(1), r(4), TradeGood::Iron, 3);
        assert_eq!(alts.len(), 1);
        assert_eq!(alts[0].waypoints, vec![r(1), r(3), r(4)]);
        assert!(pf.find_alternative_routes(r(1), r(4), TradeGood::Iron, 0).is_empty());
    }

    #[test]
    fn route_cost_scales_with_bulk() {
        let pf = finder(diamond());
        let path = pf.find_optimal_route(r(1), r(4), TradeGood::Iron).unwrap();
        // 90 × iron bulk 3.0
        assert!((pf.route_cost(&path, TradeGood::Iron) - 270.0).abs() < 1e-9);
    }
}
