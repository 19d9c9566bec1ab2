//! Command Executor - optimistic start/stop with rollback

use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::client::BotService;
use crate::command::{CommandKind, CommandOutcome};
use crate::config::{BotConfig, ValidationError};
use crate::draft::DraftConfig;
use crate::notice::{NoticeBoard, NoticeKind};
use crate::state::SessionStore;
use crate::types::MarketId;

/// Shown when the server fails a start without saying why
pub const START_FALLBACK_MESSAGE: &str = "Failed to start bot";
/// Shown when the server fails a stop without saying why
pub const STOP_FALLBACK_MESSAGE: &str = "Failed to stop bot";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("A {pending} is already in progress for market {market_id}")]
    Conflict {
        market_id: MarketId,
        pending: &'static str,
    },

    #[error("{message}")]
    Failed { market_id: MarketId, message: String },
}

/// Runs start/stop against the bot service
///
/// At most one command per market is in flight; the session shows
/// Starting/Stopping until the server answers, then lands on the confirmed
/// state or rolls back to exactly what it was before.
#[derive(Clone)]
pub struct CommandExecutor {
    service: Arc<dyn BotService>,
    store: SessionStore,
    notices: NoticeBoard,
}

impl CommandExecutor {
    pub fn new(service: Arc<dyn BotService>, store: SessionStore, notices: NoticeBoard) -> Self {
        Self {
            service,
            store,
            notices,
        }
    }

    /// Start a bot on `market_id`, returning the confirmed config
    pub async fn start(
        &self,
        market_id: &MarketId,
        config: BotConfig,
    ) -> Result<BotConfig, CommandError> {
        if let Err(e) = config.validate() {
            self.notices
                .raise(NoticeKind::Validation, Some(market_id), e.to_string());
            return Err(e.into());
        }

        let mut pending = self.begin(market_id, CommandKind::Start { config })?;
        info!(
            "Starting bot on market {} (size {}, up {}, down {})",
            market_id, config.size, config.up_threshold, config.down_threshold
        );

        match self.service.start_bot(market_id, &config).await {
            Ok(resp) => {
                let confirmed = resp.confirmed_config().unwrap_or(config);
                pending.finish(CommandOutcome::Confirmed {
                    config: Some(confirmed),
                });
                info!("✓ Bot running on market {}", market_id);
                Ok(confirmed)
            }
            Err(e) => {
                let message = e.operator_message(START_FALLBACK_MESSAGE);
                warn!("Start failed for market {}, rolling back: {}", market_id, e);
                pending.finish(CommandOutcome::Failed {
                    message: message.clone(),
                });
                self.notices
                    .raise(NoticeKind::CommandFailed, Some(market_id), message.clone());
                Err(CommandError::Failed {
                    market_id: market_id.clone(),
                    message,
                })
            }
        }
    }

    /// Stop the bot on `market_id`
    pub async fn stop(&self, market_id: &MarketId) -> Result<(), CommandError> {
        let mut pending = self.begin(market_id, CommandKind::Stop)?;
        info!("Stopping bot on market {}", market_id);

        match self.service.stop_bot(market_id).await {
            Ok(_) => {
                pending.finish(CommandOutcome::Confirmed { config: None });
                info!("✓ Bot stopped on market {}", market_id);
                Ok(())
            }
            Err(e) => {
                let message = e.operator_message(STOP_FALLBACK_MESSAGE);
                warn!("Stop failed for market {}, rolling back: {}", market_id, e);
                pending.finish(CommandOutcome::Failed {
                    message: message.clone(),
                });
                self.notices
                    .raise(NoticeKind::CommandFailed, Some(market_id), message.clone());
                Err(CommandError::Failed {
                    market_id: market_id.clone(),
                    message,
                })
            }
        }
    }

    /// Start the selected market with the drafted values
    ///
    /// The draft is discarded only once the start is confirmed.
    pub async fn start_from_draft(&self, draft: &mut DraftConfig) -> Result<BotConfig, CommandError> {
        let market_id = match draft.selected() {
            Some(id) => id.clone(),
            None => {
                let e = ValidationError::NoMarketSelected;
                self.notices.raise(NoticeKind::Validation, None, e.to_string());
                return Err(e.into());
            }
        };

        let config = match draft.build() {
            Ok(config) => config,
            Err(e) => {
                self.notices
                    .raise(NoticeKind::Validation, Some(&market_id), e.to_string());
                return Err(e.into());
            }
        };

        let confirmed = self.start(&market_id, config).await?;
        draft.discard_values_for(&market_id);
        Ok(confirmed)
    }

    /// Claim the market and apply the optimistic state
    fn begin(&self, market_id: &MarketId, kind: CommandKind) -> Result<PendingGuard<'_>, CommandError> {
        match self.store.begin_command(market_id, kind) {
            Ok(command_id) => {
                self.notices.dismiss();
                Ok(PendingGuard {
                    store: &self.store,
                    market_id: market_id.clone(),
                    command_id,
                    finished: false,
                })
            }
            Err(in_flight) => {
                let err = CommandError::Conflict {
                    market_id: in_flight.market_id,
                    pending: in_flight.pending,
                };
                warn!("Rejected {} for market {}: {}", kind.name(), market_id, err);
                self.notices
                    .raise(NoticeKind::Conflict, Some(market_id), err.to_string());
                Err(err)
            }
        }
    }
}

/// Resolves an in-flight command exactly once
///
/// If the command future is dropped before the server answers, the session
/// is rolled back rather than left in Starting/Stopping.
struct PendingGuard<'a> {
    store: &'a SessionStore,
    market_id: MarketId,
    command_id: Uuid,
    finished: bool,
}

impl PendingGuard<'_> {
    fn finish(&mut self, outcome: CommandOutcome) {
        self.finished = true;
        // Only fails if the marker was already cleared, which nothing else does
        let _ = self
            .store
            .finish_command(&self.market_id, self.command_id, &outcome);
    }
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        if !self.finished {
            warn!(
                "Command {} for market {} abandoned before completion, rolling back",
                self.command_id, self.market_id
            );
            let _ = self.store.finish_command(
                &self.market_id,
                self.command_id,
                &CommandOutcome::Failed {
                    message: "command cancelled".to_string(),
                },
            );
        }
    }
}
