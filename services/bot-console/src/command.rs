//! In-flight command tracking for optimistic start/stop
//!
//! A command applies a tentative transition when issued and is resolved by
//! exactly one of two reducers: `confirm` or `rollback`.

use std::time::Instant;
use uuid::Uuid;

use crate::config::BotConfig;
use crate::types::LifecycleState;

/// What the operator asked for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    Start { config: BotConfig },
    Stop,
}

impl CommandKind {
    pub fn name(&self) -> &'static str {
        match self {
            CommandKind::Start { .. } => "start",
            CommandKind::Stop => "stop",
        }
    }

    /// State shown while the command awaits the server
    pub fn optimistic_state(&self) -> LifecycleState {
        match self {
            CommandKind::Start { .. } => LifecycleState::Starting,
            CommandKind::Stop => LifecycleState::Stopping,
        }
    }
}

/// Session state captured immediately before a command was issued
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PriorState {
    pub state: LifecycleState,
    pub config: Option<BotConfig>,
}

/// A start/stop awaiting its server round-trip
#[derive(Debug, Clone, PartialEq)]
pub struct PendingCommand {
    pub id: Uuid,
    pub kind: CommandKind,
    pub prior: PriorState,
    pub issued_at: Instant,
}

/// How a pending command resolved
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    /// Server accepted; for starts, the config the server confirmed
    Confirmed { config: Option<BotConfig> },
    /// Server rejected or the request never completed
    Failed { message: String },
}

impl PendingCommand {
    pub fn new(kind: CommandKind, prior: PriorState) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            prior,
            issued_at: Instant::now(),
        }
    }

    /// Confirm reducer
    pub fn confirm(&self, confirmed: Option<BotConfig>) -> PriorState {
        match self.kind {
            CommandKind::Start { config } => PriorState {
                state: LifecycleState::Running,
                config: Some(confirmed.unwrap_or(config)),
            },
            CommandKind::Stop => PriorState {
                state: LifecycleState::Idle,
                config: None,
            },
        }
    }

    /// Rollback reducer: exactly the state before the command
    pub fn rollback(&self) -> PriorState {
        self.prior
    }

    /// Resolve to the state the session should land in
    pub fn resolve(&self, outcome: &CommandOutcome) -> PriorState {
        match outcome {
            CommandOutcome::Confirmed { config } => self.confirm(*config),
            CommandOutcome::Failed { .. } => self.rollback(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn cfg(size: i64) -> BotConfig {
        BotConfig::new(Decimal::from(size), Decimal::from(5), Decimal::from(3)).unwrap()
    }

    #[test]
    fn test_start_confirm_prefers_server_config() {
        let cmd = PendingCommand::new(CommandKind::Start { config: cfg(1) }, PriorState::default());
        assert_eq!(cmd.kind.optimistic_state(), LifecycleState::Starting);

        let landed = cmd.confirm(None);
        assert_eq!(landed.state, LifecycleState::Running);
        assert_eq!(landed.config, Some(cfg(1)));

        let landed = cmd.confirm(Some(cfg(4)));
        assert_eq!(landed.config, Some(cfg(4)));
    }

    #[test]
    fn test_stop_confirm_discards_config() {
        let prior = PriorState {
            state: LifecycleState::Running,
            config: Some(cfg(2)),
        };
        let cmd = PendingCommand::new(CommandKind::Stop, prior);
        let landed = cmd.resolve(&CommandOutcome::Confirmed { config: None });
        assert_eq!(landed, PriorState::default());
    }

    #[test]
    fn test_rollback_restores_prior_exactly() {
        let prior = PriorState {
            state: LifecycleState::Running,
            config: Some(cfg(2)),
        };
        let restart = PendingCommand::new(CommandKind::Start { config: cfg(9) }, prior);
        let landed = restart.resolve(&CommandOutcome::Failed {
            message: "market closed".to_string(),
        });
        assert_eq!(landed, prior);

        let stop = PendingCommand::new(CommandKind::Stop, prior);
        assert_eq!(stop.rollback(), prior);
    }

    #[test]
    fn test_command_ids_are_unique() {
        let a = PendingCommand::new(CommandKind::Stop, PriorState::default());
        let b = PendingCommand::new(CommandKind::Stop, PriorState::default());
        assert_ne!(a.id, b.id);
    }
}
