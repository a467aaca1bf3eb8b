//! Command handlers. Each runs validate → compute → commit against a
//! [`TradeSystem`](crate::system::TradeSystem), holding locks only for the
//! short validation reads and the commit.

pub mod abandon;
pub mod disrupt;
pub mod establish;

pub use abandon::{AbandonOutcome, AbandonRoute};
pub use disrupt::{DisruptOutcome, DisruptRoute, RestoreOutcome, RestoreRoute};
pub use establish::{EstablishOutcome, EstablishRoute, PreparedRoute};
