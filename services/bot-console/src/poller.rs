//! Status Poller - periodic bot status sync
//!
//! Fetches immediately on activation, then on every interval tick. Each
//! fetch runs as its own task so a slow response never delays the next tick.

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::client::BotService;
use crate::normalizer::normalize;
use crate::notice::{NoticeBoard, NoticeKind};
use crate::reconciler::Reconciler;
use crate::state::SessionStore;
use crate::types::MarketId;

/// Default poll cadence
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Shown when a poll fails without a server message
pub const POLL_FALLBACK_MESSAGE: &str = "Failed to load running bots";

/// Poll activity, for a "Refreshing…" indicator
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PollStatus {
    /// Fetches issued but not yet answered
    pub outstanding: usize,
    pub polls_completed: u64,
    pub last_success_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl PollStatus {
    pub fn is_refreshing(&self) -> bool {
        self.outstanding > 0
    }
}

/// Poller configuration; `activate` starts it
pub struct Poller {
    service: Arc<dyn BotService>,
    store: SessionStore,
    notices: NoticeBoard,
    interval: Duration,
    market_filter: Option<MarketId>,
}

impl Poller {
    pub fn new(service: Arc<dyn BotService>, store: SessionStore, notices: NoticeBoard) -> Self {
        Self {
            service,
            store,
            notices,
            interval: DEFAULT_POLL_INTERVAL,
            market_filter: None,
        }
    }

    /// Set poll interval
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Only ask the server about one market
    pub fn with_market_filter(mut self, market_id: MarketId) -> Self {
        self.market_filter = Some(market_id);
        self
    }

    /// Start polling; the returned handle owns the polling lifetime
    pub fn activate(self) -> PollerHandle {
        let active = Arc::new(AtomicBool::new(true));
        let (status_tx, status_rx) = watch::channel(PollStatus::default());

        let fetch = FetchContext {
            service: self.service,
            reconciler: Reconciler::new(self.store.clone()),
            notices: self.notices.clone(),
            status: Arc::new(status_tx),
            active: Arc::clone(&active),
            market_filter: self.market_filter,
        };

        info!("Status poller activated (every {:?})", self.interval);
        let ticker = tokio::spawn(run_ticker(fetch, self.interval));

        PollerHandle {
            active,
            ticker,
            store: self.store,
            notices: self.notices,
            status: status_rx,
        }
    }
}

/// Handle to an active poller
///
/// Deactivating (or dropping) the handle guarantees that no fetch issued
/// before it lands in the store or raises a notice; requests already on the
/// wire may still complete, their results are discarded.
pub struct PollerHandle {
    active: Arc<AtomicBool>,
    ticker: JoinHandle<()>,
    store: SessionStore,
    notices: NoticeBoard,
    status: watch::Receiver<PollStatus>,
}

impl PollerHandle {
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub fn status(&self) -> PollStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<PollStatus> {
        self.status.clone()
    }

    /// Stop polling
    pub fn deactivate(self) {
        // Drop does the work
    }

    fn shutdown(&self) {
        if self.active.swap(false, Ordering::SeqCst) {
            self.ticker.abort();
            // Let a write that read the flag before the swap finish
            self.store.barrier();
            self.notices.barrier();
            info!("Status poller deactivated");
        }
    }
}

impl Drop for PollerHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[derive(Clone)]
struct FetchContext {
    service: Arc<dyn BotService>,
    reconciler: Reconciler,
    notices: NoticeBoard,
    status: Arc<watch::Sender<PollStatus>>,
    active: Arc<AtomicBool>,
    market_filter: Option<MarketId>,
}

async fn run_ticker(fetch: FetchContext, period: Duration) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        // First tick completes immediately
        ticker.tick().await;
        if !fetch.active.load(Ordering::SeqCst) {
            break;
        }
        tokio::spawn(fetch.clone().run());
    }
}

impl FetchContext {
    async fn run(self) {
        self.status.send_modify(|s| s.outstanding += 1);
        let result = self.service.fetch_status(self.market_filter.as_ref()).await;
        self.status
            .send_modify(|s| s.outstanding = s.outstanding.saturating_sub(1));

        match result {
            Ok(payload) => {
                let snapshot = normalize(&payload);
                match self.reconciler.apply_if_active(&self.active, &snapshot) {
                    Some(_) => {
                        self.status.send_modify(|s| {
                            s.polls_completed += 1;
                            s.last_success_at = Some(Utc::now());
                            s.last_error = None;
                        });
                        // A stale failure notice goes with `last_error`
                        self.notices.dismiss_kind(NoticeKind::PollFailed);
                    }
                    None => debug!("Discarding status result that arrived after deactivation"),
                }
            }
            Err(e) => {
                let message = e.operator_message(POLL_FALLBACK_MESSAGE);
                let raised = self.notices.raise_if(
                    &self.active,
                    NoticeKind::PollFailed,
                    None,
                    message.clone(),
                );
                if raised.is_none() {
                    debug!("Ignoring status failure after deactivation: {}", e);
                    return;
                }
                if e.is_timeout() {
                    warn!("Status poll timed out: {}", e);
                } else {
                    warn!("Status poll failed: {}", e);
                }
                self.status.send_modify(|s| s.last_error = Some(message));
            }
        }
    }
}
