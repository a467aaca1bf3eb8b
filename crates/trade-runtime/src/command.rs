//! Serializable commands, as read from scenario files or sent by callers.

use crate::handlers::{
    AbandonOutcome, AbandonRoute, DisruptOutcome, DisruptRoute, EstablishOutcome, EstablishRoute,
    RestoreOutcome, RestoreRoute,
};
use crate::system::TradeSystem;
use serde::{Deserialize, Serialize};
use trade_core::{RegionId, RouteKey, TradeError, TradeGood};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TradeCommand {
    Establish {
        source: RegionId,
        destination: RegionId,
        good: TradeGood,
    },
    Disrupt {
        source: RegionId,
        destination: RegionId,
        good: TradeGood,
        months: u32,
        #[serde(default)]
        cause: Option<String>,
    },
    Restore {
        source: RegionId,
        destination: RegionId,
        good: TradeGood,
    },
    Abandon {
        source: RegionId,
        destination: RegionId,
        good: TradeGood,
        #[serde(default)]
        reason: Option<String>,
    },
}

impl TradeCommand {
    /// Key of the route the command acts on.
    pub fn key(&self) -> RouteKey {
        match *self {
            TradeCommand::Establish {
                source,
                destination,
                good,
            }
            | TradeCommand::Disrupt {
                source,
                destination,
                good,
                ..
            }
            | TradeCommand::Restore {
                source,
                destination,
                good,
            }
            | TradeCommand::Abandon {
                source,
                destination,
                good,
                ..
            } => RouteKey::new(source, destination, good),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            TradeCommand::Establish { .. } => "establish",
            TradeCommand::Disrupt { .. } => "disrupt",
            TradeCommand::Restore { .. } => "restore",
            TradeCommand::Abandon { .. } => "abandon",
        }
    }

    pub fn execute(&self, sys: &TradeSystem) -> Result<CommandOutcome, TradeError> {
        let key = self.key();
        match self {
            TradeCommand::Establish { .. } => {
                EstablishRoute::new(key.source, key.destination, key.good)
                    .execute(sys)
                    .map(CommandOutcome::Established)
            }
            TradeCommand::Disrupt { months, cause, .. } => DisruptRoute::new(
                key,
                *months,
                cause.as_deref().unwrap_or("Manual disruption"),
            )
            .execute(sys)
            .map(CommandOutcome::Disrupted),
            TradeCommand::Restore { .. } => RestoreRoute::new(key)
                .execute(sys)
                .map(CommandOutcome::Restored),
            TradeCommand::Abandon { reason, .. } => {
                AbandonRoute::new(key, reason.as_deref().unwrap_or("Manual abandonment"))
                    .execute(sys)
                    .map(CommandOutcome::Abandoned)
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum CommandOutcome {
    Established(EstablishOutcome),
    Disrupted(DisruptOutcome),
    Restored(RestoreOutcome),
    Abandoned(AbandonOutcome),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commands_read_from_yaml() {
        let yaml = r#"
- type: establish
  source: 1001
  destination: 1002
  good: Iron
- type: disrupt
  source: 1001
  destination: 1002
  good: Iron
  months: 3
"#;
        let cmds: Vec<TradeCommand> = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(cmds.len(), 2);
        assert_eq!(cmds[1].name(), "disrupt");
        assert_eq!(
            cmds[1].key(),
            RouteKey::new(RegionId(1001), RegionId(1002), TradeGood::Iron)
        );
        assert!(matches!(cmds[1], TradeCommand::Disrupt { cause: None, months: 3, .. }));
    }
}
