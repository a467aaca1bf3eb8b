//! Failure results of trade operations. None of these are fatal.

use crate::ids::{RegionId, RouteKey, TradeGood};
use crate::route::TradeStatus;
use thiserror::Error;

/// Coarse classification of a [`TradeError`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// Rejected before any work was done.
    Validation,
    /// The pathfinder found no route within budget.
    NoViablePath,
    /// A route exists but does not pay or is unsafe.
    NotViable,
    /// Another writer committed the same key first.
    RaceDetected,
}

/// Errors returned by route and hub operations.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum TradeError {
    #[error("source and destination are the same region ({0})")]
    SelfLoop(RegionId),
    #[error("unknown region {0}")]
    UnknownRegion(RegionId),
    #[error("unknown good {0}")]
    UnknownGood(TradeGood),
    #[error("{good} is not tradable in year {year}")]
    GoodUnavailable { good: TradeGood, year: i32 },
    #[error("route {0} already exists")]
    RouteAlreadyExists(RouteKey),
    #[error("route {0} not found")]
    RouteNotFound(RouteKey),
    #[error("hub for region {0} not found")]
    HubNotFound(RegionId),
    #[error("route {key} cannot go from {from} to {to}")]
    InvalidTransition {
        key: RouteKey,
        from: TradeStatus,
        to: TradeStatus,
    },
    #[error("no path from {from} to {to} within {max_distance} km")]
    NoPath {
        from: RegionId,
        to: RegionId,
        max_distance: f64,
    },
    #[error("route not viable: {0}")]
    NotViable(String),
    #[error("route {0} was established concurrently")]
    EstablishRace(RouteKey),
}

impl TradeError {
    pub fn kind(&self) -> FailureKind {
        match self {
            TradeError::SelfLoop(_)
            | TradeError::UnknownRegion(_)
            | TradeError::UnknownGood(_)
            | TradeError::GoodUnavailable { .. }
            | TradeError::RouteAlreadyExists(_)
            | TradeError::RouteNotFound(_)
            | TradeError::HubNotFound(_)
            | TradeError::InvalidTransition { .. } => FailureKind::Validation,
            TradeError::NoPath { .. } => FailureKind::NoViablePath,
            TradeError::NotViable(_) => FailureKind::NotViable,
            TradeError::EstablishRace(_) => FailureKind::RaceDetected,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_follow_taxonomy() {
        let key = RouteKey::new(RegionId(1), RegionId(2), TradeGood::Food);
        assert_eq!(TradeError::SelfLoop(RegionId(1)).kind(), FailureKind::Validation);
        assert_eq!(TradeError::RouteAlreadyExists(key).kind(), FailureKind::Validation);
        assert_eq!(TradeError::EstablishRace(key).kind(), FailureKind::RaceDetected);
        assert_eq!(TradeError::NotViable("x".into()).kind(), FailureKind::NotViable);
        let e = TradeError::NoPath {
            from: RegionId(1),
            to: RegionId(2),
            max_distance: 2000.0,
        };
        assert_eq!(e.kind(), FailureKind::NoViablePath);
    }

    #[test]
    fn reason_strings_name_the_route() {
        let key = RouteKey::new(RegionId(4), RegionId(5), TradeGood::Wine);
        assert_eq!(
            TradeError::RouteAlreadyExists(key).to_string(),
            "route route_4_5_wine already exists"
        );
    }
}
