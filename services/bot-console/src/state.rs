//! Session store - the single owner of bot session state
//!
//! State is published through a `watch` channel: every write replaces the
//! whole view under one lock, so readers never observe a half-applied poll
//! or command completion.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::command::{CommandKind, CommandOutcome, PendingCommand, PriorState};
use crate::config::BotConfig;
use crate::types::{BotSession, LifecycleState, MarketId};

/// Immutable view of every tracked session
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionView {
    pub sessions: BTreeMap<MarketId, BotSession>,
    /// When a poll result was last reconciled
    pub last_synced_at: Option<DateTime<Utc>>,
}

impl SessionView {
    pub fn session(&self, market_id: &str) -> Option<&BotSession> {
        self.sessions.get(market_id)
    }

    /// Untracked markets are Idle
    pub fn state_of(&self, market_id: &str) -> LifecycleState {
        self.session(market_id)
            .map(|s| s.state)
            .unwrap_or(LifecycleState::Idle)
    }

    pub fn config_of(&self, market_id: &str) -> Option<BotConfig> {
        self.session(market_id).and_then(|s| s.config)
    }

    pub fn is_in_flight(&self, market_id: &str) -> bool {
        self.session(market_id)
            .map(BotSession::is_in_flight)
            .unwrap_or(false)
    }

    /// Sessions with an active or transitioning bot, ordered by market id
    pub fn bots(&self) -> impl Iterator<Item = &BotSession> {
        self.sessions
            .values()
            .filter(|s| s.state != LifecycleState::Idle)
    }

    /// Count for the "Active" badge: running plus stopping bots
    pub fn active_count(&self) -> usize {
        self.sessions
            .values()
            .filter(|s| matches!(s.state, LifecycleState::Running | LifecycleState::Stopping))
            .count()
    }

    pub fn in_flight_count(&self) -> usize {
        self.sessions.values().filter(|s| s.is_in_flight()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub(crate) fn evict_idle(&mut self) {
        self.sessions.retain(|_, s| !s.is_evictable());
    }
}

/// Rejection when a market already has a command awaiting the server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InFlight {
    pub market_id: MarketId,
    pub pending: &'static str,
}

/// A command resolution that no longer matches the market's pending command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotPending;

/// Owned, cloneable handle to the session state
///
/// Readers use `view`/`subscribe`; writes go through the reconciler and the
/// command executor only.
#[derive(Clone)]
pub struct SessionStore {
    tx: Arc<watch::Sender<SessionView>>,
}

impl SessionStore {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(SessionView::default());
        Self { tx: Arc::new(tx) }
    }

    /// Latest committed view
    pub fn view(&self) -> SessionView {
        self.tx.borrow().clone()
    }

    /// Observe changes; each notification is one committed transition
    pub fn subscribe(&self) -> watch::Receiver<SessionView> {
        self.tx.subscribe()
    }

    pub fn session(&self, market_id: &str) -> Option<BotSession> {
        self.tx.borrow().session(market_id).cloned()
    }

    pub fn state_of(&self, market_id: &str) -> LifecycleState {
        self.tx.borrow().state_of(market_id)
    }

    /// Apply a mutation atomically, publishing only if it changed something
    pub(crate) fn update<R>(&self, f: impl FnOnce(&mut SessionView) -> R) -> R {
        let mut out = None;
        self.tx.send_if_modified(|view| {
            let before = view.clone();
            out = Some(f(view));
            view.evict_idle();
            *view != before
        });
        // send_if_modified always runs the closure
        out.unwrap_or_else(|| unreachable!("store update closure did not run"))
    }

    /// Like `update`, but only while `gate` is set
    ///
    /// The gate is read under the store lock, so once the gate is cleared
    /// and `barrier` returns no gated write can land.
    pub(crate) fn update_if<R>(
        &self,
        gate: &AtomicBool,
        f: impl FnOnce(&mut SessionView) -> R,
    ) -> Option<R> {
        let mut out = None;
        self.tx.send_if_modified(|view| {
            if !gate.load(Ordering::SeqCst) {
                return false;
            }
            let before = view.clone();
            out = Some(f(view));
            view.evict_idle();
            *view != before
        });
        out
    }

    /// Wait for any in-progress write to finish
    pub(crate) fn barrier(&self) {
        self.tx.send_if_modified(|_| false);
    }

    /// Record an in-flight command and apply its optimistic state
    pub(crate) fn begin_command(
        &self,
        market_id: &MarketId,
        kind: CommandKind,
    ) -> Result<Uuid, InFlight> {
        self.update(|view| {
            let session = view
                .sessions
                .entry(market_id.clone())
                .or_insert_with(|| BotSession::new(market_id.clone()));

            if let Some(pending) = &session.pending {
                return Err(InFlight {
                    market_id: market_id.clone(),
                    pending: pending.kind.name(),
                });
            }

            let prior = PriorState {
                state: session.state,
                config: session.config,
            };
            let command = PendingCommand::new(kind, prior);
            let id = command.id;

            debug!(
                "Market {} {} -> {} ({} command {})",
                market_id,
                session.state,
                kind.optimistic_state(),
                kind.name(),
                id
            );
            session.state = kind.optimistic_state();
            session.pending = Some(command);
            Ok(id)
        })
    }

    /// Resolve an in-flight command and clear its marker in the same write
    ///
    /// Returns the resulting session (None if it was evicted) or `Err` if
    /// the command is not the one currently pending for the market.
    pub(crate) fn finish_command(
        &self,
        market_id: &MarketId,
        command_id: Uuid,
        outcome: &CommandOutcome,
    ) -> Result<Option<BotSession>, NotPending> {
        self.update(|view| {
            let Some(session) = view.sessions.get_mut(market_id.as_str()) else {
                warn!("Command {} resolved for untracked market {}", command_id, market_id);
                return Err(NotPending);
            };

            match &session.pending {
                Some(pending) if pending.id == command_id => {
                    let landed = pending.resolve(outcome);
                    debug!(
                        "Market {} {} -> {} ({} command {})",
                        market_id,
                        session.state,
                        landed.state,
                        pending.kind.name(),
                        command_id
                    );
                    session.state = landed.state;
                    session.config = landed.config;
                    session.pending = None;
                }
                _ => {
                    warn!(
                        "Command {} is not pending for market {}, ignoring resolution",
                        command_id, market_id
                    );
                    return Err(NotPending);
                }
            }

            let session = session.clone();
            Ok((!session.is_evictable()).then_some(session))
        })
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}
