//! Status normalization
//!
//! The bot service has answered `/bot/status` in two shapes over time:
//!
//! - current: `{ activeBots: { <marketId>: { running, config } }, activeMarkets, count }`
//! - legacy:  `{ activeMarkets: [<marketId>, ...] }`
//!
//! Both are folded into one `PollSnapshot` here so nothing downstream has to
//! care which server version answered.

use serde_json::{Map, Value};
use tracing::debug;

use crate::config::BotConfig;
use crate::types::{MarketId, MarketStatus, PollSnapshot};

/// Status payload classified by shape
#[derive(Debug, Clone, PartialEq)]
pub enum StatusPayload<'a> {
    /// Map keyed by market id with `{ running, config }` entries
    ActiveBots(&'a Map<String, Value>),
    /// Plain list of market ids, all implicitly running
    ActiveMarkets(&'a [Value]),
    /// Neither field present; nothing is known
    Unrecognized,
}

impl<'a> StatusPayload<'a> {
    pub fn classify(payload: &'a Value) -> Self {
        if let Some(bots) = payload.get("activeBots").and_then(Value::as_object) {
            return StatusPayload::ActiveBots(bots);
        }
        if let Some(markets) = payload.get("activeMarkets").and_then(Value::as_array) {
            return StatusPayload::ActiveMarkets(markets);
        }
        StatusPayload::Unrecognized
    }

    pub fn into_snapshot(self) -> PollSnapshot {
        match self {
            StatusPayload::ActiveBots(bots) => bots
                .iter()
                .map(|(market_id, entry)| {
                    let status = MarketStatus {
                        running: entry.get("running").and_then(Value::as_bool).unwrap_or(false),
                        config: entry.get("config").and_then(BotConfig::from_value),
                    };
                    (MarketId::from(market_id.as_str()), status)
                })
                .collect(),
            StatusPayload::ActiveMarkets(markets) => markets
                .iter()
                .filter_map(market_id_of)
                .map(|market_id| {
                    (
                        market_id,
                        MarketStatus {
                            running: true,
                            config: None,
                        },
                    )
                })
                .collect(),
            StatusPayload::Unrecognized => PollSnapshot::new(),
        }
    }
}

/// Normalize a raw status payload; never fails
pub fn normalize(payload: &Value) -> PollSnapshot {
    let shape = StatusPayload::classify(payload);
    let label = match &shape {
        StatusPayload::ActiveBots(_) => "activeBots",
        StatusPayload::ActiveMarkets(_) => "activeMarkets",
        StatusPayload::Unrecognized => "unrecognized",
    };
    let snapshot = shape.into_snapshot();
    debug!(
        "Normalized {} status payload: {} markets ({} running)",
        label,
        snapshot.len(),
        snapshot.running_count()
    );
    snapshot
}

// Market ids are strings, but numeric ids are tolerated
fn market_id_of(value: &Value) -> Option<MarketId> {
    match value {
        Value::String(s) if !s.is_empty() => Some(MarketId::from(s.as_str())),
        Value::Number(n) => Some(MarketId::from(n.to_string())),
        _ => None,
    }
}
