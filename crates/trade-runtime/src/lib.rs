#![deny(warnings)]

//! Trade simulation runtime.
//!
//! [`TradeSystem`] owns the route and hub registries, the market engine and
//! an optional `bevy_ecs` region store, and advances them on a fixed-rate
//! tick. Route commands go through phased handlers that release every lock
//! while pathfinding.

pub mod cache;
pub mod clock;
pub mod command;
pub mod flow;
pub mod handlers;
pub mod hubs;
pub mod metrics;
pub mod routes;
pub mod store;
pub mod system;

pub use clock::TradeClock;
pub use command::{CommandOutcome, TradeCommand};
pub use handlers::{
    AbandonOutcome, AbandonRoute, DisruptOutcome, DisruptRoute, EstablishOutcome, EstablishRoute,
    PreparedRoute, RestoreOutcome, RestoreRoute,
};
pub use hubs::{HubEvolution, HubRegistry};
pub use metrics::PerformanceMetrics;
pub use routes::{Contribution, RouteDelta, RouteRegistry};
pub use store::{HubPresence, Region, RegionStore, RouteLedger, TradeInventory};
pub use system::{TickReport, TradeSystem};
