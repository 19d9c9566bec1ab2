//! Cross-module tests: store, reconciler and command lifecycle together

use rust_decimal::Decimal;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::command::{CommandKind, CommandOutcome};
use crate::config::BotConfig;
use crate::normalizer::normalize;
use crate::reconciler::Reconciler;
use crate::state::SessionStore;
use crate::types::{LifecycleState, MarketId};

fn cfg(size: i64, up: i64, down: i64) -> BotConfig {
    BotConfig::new(Decimal::from(size), Decimal::from(up), Decimal::from(down)).unwrap()
}

#[test]
fn test_poll_during_start_does_not_clobber_optimistic_state() {
    let store = SessionStore::new();
    let reconciler = Reconciler::new(store.clone());
    let market = MarketId::from("1.45");

    let id = store
        .begin_command(&market, CommandKind::Start { config: cfg(1, 5, 3) })
        .unwrap();
    assert_eq!(store.state_of("1.45"), LifecycleState::Starting);

    // Server hasn't seen the start yet
    reconciler.apply(&normalize(&serde_json::json!({ "activeBots": {} })));
    assert_eq!(store.state_of("1.45"), LifecycleState::Starting);

    let session = store
        .finish_command(&market, id, &CommandOutcome::Confirmed { config: None })
        .unwrap()
        .unwrap();
    assert_eq!(session.state, LifecycleState::Running);
    assert_eq!(session.config, Some(cfg(1, 5, 3)));
    assert!(session.pending.is_none());

    // Next poll reports it running: no change
    let result = reconciler.apply(&normalize(&serde_json::json!({
        "activeBots": { "1.45": { "running": true, "config": { "size": 1, "upThreshold": 5, "downThreshold": 3 } } }
    })));
    assert!(result.is_noop());
    assert_eq!(store.state_of("1.45"), LifecycleState::Running);
}

#[test]
fn test_failed_stop_restores_running_with_config() {
    let store = SessionStore::new();
    let reconciler = Reconciler::new(store.clone());
    let market = MarketId::from("1.50");

    reconciler.apply(&normalize(&serde_json::json!({
        "activeBots": { "1.50": { "running": true, "config": { "size": 2, "upThreshold": 5, "downThreshold": 3 } } }
    })));
    let before = store.session("1.50").unwrap();

    let id = store.begin_command(&market, CommandKind::Stop).unwrap();
    assert_eq!(store.state_of("1.50"), LifecycleState::Stopping);
    assert_eq!(store.view().active_count(), 1);

    let after = store
        .finish_command(
            &market,
            id,
            &CommandOutcome::Failed {
                message: "Market is suspended".to_string(),
            },
        )
        .unwrap()
        .unwrap();
    assert_eq!(after, before);
}

#[test]
fn test_legacy_poll_then_canonical_poll_fills_config() {
    let store = SessionStore::new();
    let reconciler = Reconciler::new(store.clone());

    reconciler.apply(&normalize(&serde_json::json!({ "activeMarkets": ["1.23"] })));
    let session = store.session("1.23").unwrap();
    assert_eq!(session.state, LifecycleState::Running);
    assert_eq!(session.config, None);

    reconciler.apply(&normalize(&serde_json::json!({
        "activeBots": { "1.23": { "running": true, "config": { "size": 2, "upThreshold": 5, "downThreshold": 3 } } }
    })));
    assert_eq!(store.view().config_of("1.23"), Some(cfg(2, 5, 3)));

    // Back to legacy shape: config stays known
    reconciler.apply(&normalize(&serde_json::json!({ "activeMarkets": ["1.23"] })));
    assert_eq!(store.view().config_of("1.23"), Some(cfg(2, 5, 3)));
}

#[test]
fn test_cleared_gate_blocks_reconciliation() {
    let store = SessionStore::new();
    let reconciler = Reconciler::new(store.clone());
    let active = AtomicBool::new(true);
    let snapshot = normalize(&serde_json::json!({ "activeMarkets": ["1.23"] }));

    assert!(reconciler.apply_if_active(&active, &snapshot).is_some());
    assert_eq!(store.view().active_count(), 1);

    active.store(false, Ordering::SeqCst);
    store.barrier();
    let cleared = normalize(&serde_json::json!({ "activeMarkets": [] }));
    assert!(reconciler.apply_if_active(&active, &cleared).is_none());
    assert_eq!(store.view().active_count(), 1);
}

#[test]
fn test_second_command_rejected_while_first_pending() {
    let store = SessionStore::new();
    let market = MarketId::from("1.45");

    let first = store
        .begin_command(&market, CommandKind::Start { config: cfg(1, 5, 3) })
        .unwrap();
    let err = store.begin_command(&market, CommandKind::Stop).unwrap_err();
    assert_eq!(err.pending, "start");
    assert_eq!(store.state_of("1.45"), LifecycleState::Starting);

    // Other markets are independent
    assert!(store
        .begin_command(&MarketId::from("1.46"), CommandKind::Start { config: cfg(1, 5, 3) })
        .is_ok());

    // Stale command id never resolves the market
    assert!(store
        .finish_command(&market, uuid::Uuid::new_v4(), &CommandOutcome::Confirmed { config: None })
        .is_err());
    assert!(store
        .finish_command(&market, first, &CommandOutcome::Confirmed { config: None })
        .is_ok());
}
