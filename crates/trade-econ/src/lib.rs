#![deny(warnings)]

//! Economic engines for the trade simulation.
//!
//! This crate provides:
//! - Pure price, cost, capacity and volume formulas ([`calculator`])
//! - The region connectivity graph and its oracle trait ([`network`])
//! - A* route search with derived safety and efficiency ([`pathfinding`])
//! - The market engine owning every (region, good) price ([`market`])

pub mod calculator;
pub mod market;
pub mod network;
pub mod pathfinding;

pub use market::{MarketEngine, MarketQuote, PriceUpdateReport};
pub use network::{
    Connection, ConnectivityOracle, NetworkError, NetworkLayout, RegionSite, TradeNetwork,
};
pub use pathfinding::{PathSegment, Pathfinder, PathfinderSettings, RoutePath};
