//! Session reconciliation - merge server snapshots into the session store

use chrono::{DateTime, Utc};
use std::sync::atomic::AtomicBool;
use tracing::{debug, info};

use crate::config::BotConfig;
use crate::state::{SessionStore, SessionView};
use crate::types::{BotSession, LifecycleState, MarketId, PollSnapshot};

/// Applies poll snapshots to the store
///
/// Markets with an in-flight command are never touched: the operator's
/// latest intent wins over a poll that may have raced it.
#[derive(Clone)]
pub struct Reconciler {
    store: SessionStore,
}

/// Differences between the server snapshot and the local sessions
#[derive(Debug, Clone, PartialEq)]
pub struct ReconciliationResult {
    pub timestamp: DateTime<Utc>,
    pub discovered: Vec<DiscoveredBot>,
    pub config_updates: Vec<ConfigUpdate>,
    pub stopped: Vec<StoppedBot>,
    pub held: Vec<HeldMarket>,
    pub unchanged: usize,
}

/// Running on the server, not running locally
#[derive(Debug, Clone, PartialEq)]
pub struct DiscoveredBot {
    pub market_id: MarketId,
    pub config: Option<BotConfig>,
}

/// Running in both, but the known config moved
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigUpdate {
    pub market_id: MarketId,
    pub previous: Option<BotConfig>,
    pub current: Option<BotConfig>,
}

/// Running locally, not running (or not reported) by the server
#[derive(Debug, Clone, PartialEq)]
pub struct StoppedBot {
    pub market_id: MarketId,
    pub last_config: Option<BotConfig>,
}

/// Left alone because a command is awaiting the server
#[derive(Debug, Clone, PartialEq)]
pub struct HeldMarket {
    pub market_id: MarketId,
    pub local_state: LifecycleState,
    pub reported_running: Option<bool>,
}

impl ReconciliationResult {
    /// True if applying the result changes no session
    pub fn is_noop(&self) -> bool {
        self.discovered.is_empty() && self.config_updates.is_empty() && self.stopped.is_empty()
    }
}

impl Reconciler {
    pub fn new(store: SessionStore) -> Self {
        Self { store }
    }

    /// Reconcile a snapshot as one atomic store transition
    pub fn apply(&self, snapshot: &PollSnapshot) -> ReconciliationResult {
        let result = self.store.update(|view| reconcile(view, snapshot));
        log_result(&result);
        result
    }

    /// Reconcile only while `active` is set; a cleared flag discards the snapshot
    pub(crate) fn apply_if_active(
        &self,
        active: &AtomicBool,
        snapshot: &PollSnapshot,
    ) -> Option<ReconciliationResult> {
        let result = self
            .store
            .update_if(active, |view| reconcile(view, snapshot))?;
        log_result(&result);
        Some(result)
    }
}

/// Compare then apply, in place
pub fn reconcile(view: &mut SessionView, snapshot: &PollSnapshot) -> ReconciliationResult {
    let result = compare_sessions(view, snapshot);
    apply_to_view(&result, view);
    result
}

/// Compare local sessions with a server snapshot
pub fn compare_sessions(view: &SessionView, snapshot: &PollSnapshot) -> ReconciliationResult {
    let mut discovered = Vec::new();
    let mut config_updates = Vec::new();
    let mut stopped = Vec::new();
    let mut held = Vec::new();
    let mut unchanged = 0;

    // Markets the server reports on
    for (market_id, status) in snapshot.iter() {
        match view.session(market_id.as_str()) {
            Some(session) if session.is_in_flight() => {
                held.push(HeldMarket {
                    market_id: market_id.clone(),
                    local_state: session.state,
                    reported_running: Some(status.running),
                });
            }
            Some(session) if status.running => {
                // Config never regresses to unknown once known
                let merged = status.config.or(session.config);
                if session.state != LifecycleState::Running {
                    discovered.push(DiscoveredBot {
                        market_id: market_id.clone(),
                        config: merged,
                    });
                } else if merged != session.config {
                    config_updates.push(ConfigUpdate {
                        market_id: market_id.clone(),
                        previous: session.config,
                        current: merged,
                    });
                } else {
                    unchanged += 1;
                }
            }
            Some(session) => {
                if session.state == LifecycleState::Idle && session.config.is_none() {
                    unchanged += 1;
                } else {
                    stopped.push(StoppedBot {
                        market_id: market_id.clone(),
                        last_config: session.config,
                    });
                }
            }
            None if status.running => {
                discovered.push(DiscoveredBot {
                    market_id: market_id.clone(),
                    config: status.config,
                });
            }
            None => {}
        }
    }

    // Tracked locally but missing from the snapshot
    for (market_id, session) in &view.sessions {
        if snapshot.contains(market_id.as_str()) {
            continue;
        }
        if session.is_in_flight() {
            held.push(HeldMarket {
                market_id: market_id.clone(),
                local_state: session.state,
                reported_running: None,
            });
        } else if session.state != LifecycleState::Idle || session.config.is_some() {
            stopped.push(StoppedBot {
                market_id: market_id.clone(),
                last_config: session.config,
            });
        }
    }

    ReconciliationResult {
        timestamp: Utc::now(),
        discovered,
        config_updates,
        stopped,
        held,
        unchanged,
    }
}

/// Apply reconciliation results so the view matches the server
pub fn apply_to_view(result: &ReconciliationResult, view: &mut SessionView) {
    for bot in &result.discovered {
        view.sessions.insert(
            bot.market_id.clone(),
            BotSession::running(bot.market_id.clone(), bot.config),
        );
    }

    for update in &result.config_updates {
        if let Some(session) = view.sessions.get_mut(update.market_id.as_str()) {
            session.config = update.current;
        }
    }

    for bot in &result.stopped {
        if let Some(session) = view.sessions.get_mut(bot.market_id.as_str()) {
            session.state = LifecycleState::Idle;
            session.config = None;
        }
    }

    view.last_synced_at = Some(result.timestamp);
}

fn log_result(result: &ReconciliationResult) {
    for bot in &result.discovered {
        info!("Bot discovered running on market {}", bot.market_id);
    }
    for bot in &result.stopped {
        info!("Bot on market {} no longer running", bot.market_id);
    }
    for held in &result.held {
        debug!(
            "Market {} held at {} (server running: {:?})",
            held.market_id, held.local_state, held.reported_running
        );
    }
    debug!(
        "Reconciliation complete: {} discovered, {} config updates, {} stopped, {} held, {} unchanged",
        result.discovered.len(),
        result.config_updates.len(),
        result.stopped.len(),
        result.held.len(),
        result.unchanged
    );
}
