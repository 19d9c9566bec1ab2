//! Operator notices - the side channel for errors shown above the bot list

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use uuid::Uuid;

use crate::types::MarketId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeKind {
    PollFailed,
    CommandFailed,
    Validation,
    Conflict,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notice {
    pub id: Uuid,
    pub kind: NoticeKind,
    pub market_id: Option<MarketId>,
    pub message: String,
    pub raised_at: DateTime<Utc>,
}

/// Holds at most one notice; a newer one replaces the older
#[derive(Clone)]
pub struct NoticeBoard {
    tx: Arc<watch::Sender<Option<Notice>>>,
}

impl NoticeBoard {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    pub fn raise(
        &self,
        kind: NoticeKind,
        market_id: Option<&MarketId>,
        message: impl Into<String>,
    ) -> Notice {
        let notice = Notice {
            id: Uuid::new_v4(),
            kind,
            market_id: market_id.cloned(),
            message: message.into(),
            raised_at: Utc::now(),
        };
        self.tx.send_replace(Some(notice.clone()));
        notice
    }

    /// Raise only while `gate` is set
    ///
    /// The gate is read under the board's lock, so once it is cleared and
    /// `barrier` returns no gated notice can appear.
    pub fn raise_if(
        &self,
        gate: &AtomicBool,
        kind: NoticeKind,
        market_id: Option<&MarketId>,
        message: impl Into<String>,
    ) -> Option<Notice> {
        let mut raised = None;
        self.tx.send_if_modified(|current| {
            if !gate.load(Ordering::SeqCst) {
                return false;
            }
            let notice = Notice {
                id: Uuid::new_v4(),
                kind,
                market_id: market_id.cloned(),
                message: message.into(),
                raised_at: Utc::now(),
            };
            *current = Some(notice.clone());
            raised = Some(notice);
            true
        });
        raised
    }

    /// Wait for any in-progress raise to finish
    pub fn barrier(&self) {
        self.tx.send_if_modified(|_| false);
    }

    pub fn current(&self) -> Option<Notice> {
        self.tx.borrow().clone()
    }

    pub fn dismiss(&self) {
        self.tx.send_if_modified(|current| current.take().is_some());
    }

    /// Dismiss the current notice if it is of `kind`
    pub fn dismiss_kind(&self, kind: NoticeKind) -> bool {
        self.tx.send_if_modified(|current| {
            if current.as_ref().map(|n| n.kind) == Some(kind) {
                *current = None;
                true
            } else {
                false
            }
        })
    }

    /// Dismiss only if `id` is still the current notice
    pub fn dismiss_if(&self, id: Uuid) -> bool {
        self.tx.send_if_modified(|current| {
            if current.as_ref().map(|n| n.id) == Some(id) {
                *current = None;
                true
            } else {
                false
            }
        })
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<Notice>> {
        self.tx.subscribe()
    }
}

impl Default for NoticeBoard {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_newer_notice_replaces_older() {
        let board = NoticeBoard::new();
        let first = board.raise(NoticeKind::PollFailed, None, "Failed to load running bots");
        let market = MarketId::from("1.45");
        let second = board.raise(NoticeKind::CommandFailed, Some(&market), "Market suspended");

        let current = board.current().unwrap();
        assert_eq!(current.id, second.id);
        assert_eq!(current.market_id, Some(market));

        assert!(!board.dismiss_if(first.id));
        assert!(board.dismiss_if(second.id));
        assert!(board.current().is_none());
    }

    #[test]
    fn test_dismiss_without_notice_does_not_notify() {
        let board = NoticeBoard::new();
        let mut rx = board.subscribe();
        board.dismiss();
        assert!(!rx.has_changed().unwrap());

        board.raise(NoticeKind::Validation, None, "size must be a positive number");
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().as_ref().unwrap().kind, NoticeKind::Validation);
    }

    #[test]
    fn test_cleared_gate_blocks_raise() {
        let board = NoticeBoard::new();
        let gate = AtomicBool::new(true);
        assert!(board
            .raise_if(&gate, NoticeKind::PollFailed, None, "Failed to load running bots")
            .is_some());
        board.dismiss();

        gate.store(false, Ordering::SeqCst);
        board.barrier();
        assert!(board
            .raise_if(&gate, NoticeKind::PollFailed, None, "Failed to load running bots")
            .is_none());
        assert!(board.current().is_none());
    }

    #[test]
    fn test_dismiss_kind_leaves_other_notices() {
        let board = NoticeBoard::new();
        let market = MarketId::from("1.45");
        board.raise(NoticeKind::CommandFailed, Some(&market), "Market suspended");
        assert!(!board.dismiss_kind(NoticeKind::PollFailed));
        assert!(board.current().is_some());

        board.raise(NoticeKind::PollFailed, None, "Failed to load running bots");
        assert!(board.dismiss_kind(NoticeKind::PollFailed));
        assert!(board.current().is_none());
    }
}
