#![deny(warnings)]

//! Core trade domain model.
//!
//! This crate defines the serializable records shared by the trade
//! simulation: routes, hubs, markets and good properties, together with the
//! configuration, error, event and deterministic RNG types every other crate
//! builds on. It holds no simulation logic beyond per-record helpers.

pub mod config;
pub mod error;
pub mod events;
pub mod goods;
pub mod hub;
pub mod ids;
pub mod market;
pub mod rng;
pub mod route;
pub mod snapshot;
pub mod sync;

pub use config::{ConfigError, RouteTypeTable, TradeConfig};
pub use error::{FailureKind, TradeError};
pub use events::{EventBus, EventLog, NullBus, TradeEvent};
pub use goods::{TradeGoodCatalog, TradeGoodProperties, DEFAULT_GOOD_VALUE};
pub use hub::{HubTier, TradeHub};
pub use ids::{RegionId, RouteKey, TradeGood};
pub use market::{MarketData, PriceTrend};
pub use rng::{DeterministicRng, RngCategory};
pub use route::{RouteRecovery, RouteType, TradeRoute, TradeStatus};
pub use snapshot::{PersistedSettings, TradeSnapshot, CURRENT_FORMAT_VERSION};
pub use sync::lock_or_recover;
