//! Core session types
//!
//! These types define the local view of which markets have a bot, as seen by
//! the store, the reconciler and the command executor.

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::collections::BTreeMap;

use crate::command::PendingCommand;
use crate::config::BotConfig;

/// Opaque market identifier, the key for all session state
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MarketId(String);

impl MarketId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for MarketId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MarketId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for MarketId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl Borrow<str> for MarketId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Lifecycle of a bot session as seen by this client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    #[default]
    Idle,
    Starting,
    Running,
    Stopping,
}

impl LifecycleState {
    /// Starting and Stopping only exist while a command is awaiting the server
    pub fn is_in_flight(&self) -> bool {
        matches!(self, LifecycleState::Starting | LifecycleState::Stopping)
    }
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LifecycleState::Idle => write!(f, "idle"),
            LifecycleState::Starting => write!(f, "starting"),
            LifecycleState::Running => write!(f, "running"),
            LifecycleState::Stopping => write!(f, "stopping"),
        }
    }
}

/// Per-market bot session
#[derive(Debug, Clone, PartialEq)]
pub struct BotSession {
    pub market_id: MarketId,
    pub state: LifecycleState,
    /// Last known config; legacy status payloads may leave this unknown
    pub config: Option<BotConfig>,
    /// In-flight start/stop, if any
    pub pending: Option<PendingCommand>,
}

impl BotSession {
    pub fn new(market_id: MarketId) -> Self {
        Self {
            market_id,
            state: LifecycleState::Idle,
            config: None,
            pending: None,
        }
    }

    pub fn running(market_id: MarketId, config: Option<BotConfig>) -> Self {
        Self {
            market_id,
            state: LifecycleState::Running,
            config,
            pending: None,
        }
    }

    pub fn is_in_flight(&self) -> bool {
        self.pending.is_some()
    }

    /// Idle sessions with nothing to retain are dropped from tracking
    pub fn is_evictable(&self) -> bool {
        self.state == LifecycleState::Idle && self.pending.is_none() && self.config.is_none()
    }
}

/// Server-reported status of one market
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarketStatus {
    pub running: bool,
    pub config: Option<BotConfig>,
}

/// Normalized point-in-time view of all bots as reported by the server
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollSnapshot {
    bots: BTreeMap<MarketId, MarketStatus>,
}

impl PollSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, market_id: MarketId, status: MarketStatus) {
        self.bots.insert(market_id, status);
    }

    pub fn get(&self, market_id: &str) -> Option<&MarketStatus> {
        self.bots.get(market_id)
    }

    pub fn contains(&self, market_id: &str) -> bool {
        self.bots.contains_key(market_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&MarketId, &MarketStatus)> {
        self.bots.iter()
    }

    pub fn len(&self) -> usize {
        self.bots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bots.is_empty()
    }

    /// Markets the server reports as running
    pub fn running_count(&self) -> usize {
        self.bots.values().filter(|s| s.running).count()
    }
}

impl FromIterator<(MarketId, MarketStatus)> for PollSnapshot {
    fn from_iter<I: IntoIterator<Item = (MarketId, MarketStatus)>>(iter: I) -> Self {
        Self {
            bots: iter.into_iter().collect(),
        }
    }
}
