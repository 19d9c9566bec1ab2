//! Bot Console Library
//!
//! Client-side session sync for market bots: polls the bot service, keeps a
//! local view of every bot's lifecycle, and runs optimistic start/stop
//! commands against it.

pub mod client;
pub mod command;
pub mod config;
pub mod draft;
pub mod executor;
pub mod normalizer;
pub mod notice;
pub mod poller;
pub mod reconciler;
pub mod state;
pub mod types;

#[cfg(test)]
mod tests;

// Re-export main types for convenience
pub use client::{BotService, BotServiceClient, ClientError};
pub use config::{BotConfig, Config, ValidationError};
pub use draft::{DraftConfig, DraftField};
pub use executor::{CommandError, CommandExecutor};
pub use normalizer::normalize;
pub use notice::{Notice, NoticeBoard, NoticeKind};
pub use poller::{PollStatus, Poller, PollerHandle};
pub use reconciler::{Reconciler, ReconciliationResult};
pub use state::{SessionStore, SessionView};
pub use types::{BotSession, LifecycleState, MarketId, MarketStatus, PollSnapshot};
