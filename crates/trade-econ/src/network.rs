// Region connectivity graph and the oracle trait the pathfinder searches over.
//
// A `TradeNetwork` holds region sites (planar positions in km plus terrain
// flags) and undirected classified connections. Edge distances are never
// shorter than the straight line between their endpoints, which keeps the
// pathfinding heuristic admissible.
//
// **Critical constraint: determinism.** `TradeNetwork::generate` draws every
// jitter and distance from keyed RNG streams, so the same seed and layout
// always yields the same graph regardless of construction order.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use trade_core::config::EconomicParameters;
use trade_core::{DeterministicRng, RegionId, RngCategory, RouteType};

/// Errors raised while building a network.
#[derive(Debug, Error, PartialEq)]
pub enum NetworkError {
    #[error("unknown region {0}")]
    UnknownRegion(RegionId),
    #[error("region {0} cannot connect to itself")]
    SelfLoop(RegionId),
    #[error("region {0} already exists")]
    DuplicateRegion(RegionId),
    #[error("invalid distance {0}")]
    InvalidDistance(f64),
}

/// One classified, weighted edge out of a region.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Connection {
    pub to: RegionId,
    pub route_type: RouteType,
    pub distance_km: f64,
}

/// Read-only view of region connectivity.
pub trait ConnectivityOracle: Send + Sync {
    fn contains(&self, region: RegionId) -> bool;

    /// Outgoing connections of `region`; empty for an unknown region.
    fn connections(&self, region: RegionId) -> &[Connection];

    /// Straight-line distance in km; a lower bound on any path length.
    fn straight_line_km(&self, from: RegionId, to: RegionId) -> f64;

    fn regions(&self) -> Vec<RegionId>;

    fn region_name(&self, region: RegionId) -> Option<&str>;

    fn connection(&self, from: RegionId, to: RegionId) -> Option<Connection> {
        self.connections(from).iter().copied().find(|c| c.to == to)
    }
}

/// A region's position and terrain.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RegionSite {
    pub id: RegionId,
    pub name: String,
    pub x_km: f64,
    pub y_km: f64,
    pub coastal: bool,
    pub river: bool,
}

/// Grid layout for [`TradeNetwork::generate`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkLayout {
    pub columns: u32,
    pub rows: u32,
    pub spacing_km: f64,
    /// Id of the region in the top-left corner; ids increase row-major.
    pub first_id: u32,
    /// Coastal regions this many columns apart get a sea lane.
    pub sea_lane_stride: u32,
}

impl Default for NetworkLayout {
    fn default() -> Self {
        Self {
            columns: 4,
            rows: 2,
            spacing_km: 90.0,
            first_id: 1001,
            sea_lane_stride: 2,
        }
    }
}

const SITE_NAMES: [&str; 20] = [
    "London",
    "Paris",
    "Venice",
    "Constantinople",
    "Cologne",
    "Novgorod",
    "Barcelona",
    "Genoa",
    "Lubeck",
    "Bruges",
    "Florence",
    "Vienna",
    "Prague",
    "Krakow",
    "Lisbon",
    "Seville",
    "Marseille",
    "Naples",
    "Milan",
    "Antwerp",
];

fn pair_entity(a: RegionId, b: RegionId) -> u64 {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    (u64::from(lo.0) << 32) | u64::from(hi.0)
}

/// Explicit region graph.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TradeNetwork {
    sites: BTreeMap<RegionId, RegionSite>,
    edges: BTreeMap<RegionId, Vec<Connection>>,
}

impl TradeNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_region(&mut self, site: RegionSite) -> Result<(), NetworkError> {
        if site.id.is_null() {
            return Err(NetworkError::UnknownRegion(site.id));
        }
        if self.sites.contains_key(&site.id) {
            return Err(NetworkError::DuplicateRegion(site.id));
        }
        self.edges.entry(site.id).or_default();
        self.sites.insert(site.id, site);
        Ok(())
    }

    /// Add or replace an undirected connection.
    ///
    /// A distance shorter than the straight line is raised to it.
    pub fn connect(
        &mut self,
        a: RegionId,
        b: RegionId,
        route_type: RouteType,
        distance_km: f64,
    ) -> Result<(), NetworkError> {
        if a == b {
            return Err(NetworkError::SelfLoop(a));
        }
        for r in [a, b] {
            if !self.sites.contains_key(&r) {
                return Err(NetworkError::UnknownRegion(r));
            }
        }
        if !distance_km.is_finite() || distance_km < 0.0 {
            return Err(NetworkError::InvalidDistance(distance_km));
        }
        let distance_km = distance_km.max(self.straight_line_km(a, b));
        for (from, to) in [(a, b), (b, a)] {
            let list = self.edges.entry(from).or_default();
            list.retain(|c| c.to != to);
            list.push(Connection {
                to,
                route_type,
                distance_km,
            });
        }
        Ok(())
    }

    pub fn site(&self, region: RegionId) -> Option<&RegionSite> {
        self.sites.get(&region)
    }

    pub fn region_count(&self) -> usize {
        self.sites.len()
    }

    pub fn connection_count(&self) -> usize {
        self.edges.values().map(Vec::len).sum::<usize>() / 2
    }

    /// Build a jittered grid with coast, river and sea lanes.
    pub fn generate(
        layout: &NetworkLayout,
        rng: DeterministicRng,
        econ: &EconomicParameters,
    ) -> Result<Self, NetworkError> {
        let mut net = Self::new();
        let id_at = |col: u32, row: u32| RegionId(layout.first_id + row * layout.columns + col);
        let jitter = layout.spacing_km * 0.2;

        for row in 0..layout.rows {
            for col in 0..layout.columns {
                let id = id_at(col, row);
                let idx = (row * layout.columns + col) as usize;
                let name = SITE_NAMES
                    .get(idx)
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| format!("Region {id}"));
                let e = u64::from(id.0);
                net.add_region(RegionSite {
                    id,
                    name,
                    x_km: f64::from(col) * layout.spacing_km
                        + rng.uniform(e, 0, 0, RngCategory::Distance, -jitter, jitter),
                    y_km: f64::from(row) * layout.spacing_km
                        + rng.uniform(e, 1, 0, RngCategory::Distance, -jitter, jitter),
                    coastal: row == 0,
                    river: col == layout.columns / 2,
                })?;
            }
        }

        for row in 0..layout.rows {
            for col in 0..layout.columns {
                let a = id_at(col, row);
                let mut neighbours = Vec::new();
                if col + 1 < layout.columns {
                    neighbours.push(id_at(col + 1, row));
                }
                if row + 1 < layout.rows {
                    neighbours.push(id_at(col, row + 1));
                }
                for b in neighbours {
                    let straight = net.straight_line_km(a, b);
                    let distance = straight
                        * rng.uniform(pair_entity(a, b), 0, 0, RngCategory::Connectivity, 1.0, 1.25);
                    let route_type = net.classify(a, b, distance, econ);
                    net.connect(a, b, route_type, distance)?;
                }
            }
        }

        let stride = layout.sea_lane_stride.max(2);
        let mut col = 0;
        while col + stride < layout.columns {
            let a = id_at(col, 0);
            let b = id_at(col + stride, 0);
            let distance = net.straight_line_km(a, b) * 1.05;
            net.connect(a, b, RouteType::Sea, distance)?;
            col += stride;
        }

        tracing::debug!(
            regions = net.region_count(),
            connections = net.connection_count(),
            seed = rng.seed(),
            "generated trade network"
        );
        Ok(net)
    }

    fn classify(
        &self,
        a: RegionId,
        b: RegionId,
        distance_km: f64,
        econ: &EconomicParameters,
    ) -> RouteType {
        let (Some(sa), Some(sb)) = (self.sites.get(&a), self.sites.get(&b)) else {
            return RouteType::Land;
        };
        if sa.coastal && sb.coastal {
            RouteType::Coastal
        } else if sa.river && sb.river {
            RouteType::River
        } else if distance_km > econ.long_overland_threshold_km {
            RouteType::OverlandLong
        } else {
            RouteType::Land
        }
    }
}

impl ConnectivityOracle for TradeNetwork {
    fn contains(&self, region: RegionId) -> bool {
        self.sites.contains_key(&region)
    }

    fn connections(&self, region: RegionId) -> &[Connection] {
        self.edges.get(&region).map(Vec::as_slice).unwrap_or(&[])
    }

    fn straight_line_km(&self, from: RegionId, to: RegionId) -> f64 {
        match (self.sites.get(&from), self.sites.get(&to)) {
            (Some(a), Some(b)) => ((a.x_km - b.x_km).powi(2) + (a.y_km - b.y_km).powi(2)).sqrt(),
            _ => 0.0,
        }
    }

    fn regions(&self) -> Vec<RegionId> {
        self.sites.keys().copied().collect()
    }

    fn region_name(&self, region: RegionId) -> Option<&str> {
        self.sites.get(&region).map(|s| s.name.as_str())
    }
}
