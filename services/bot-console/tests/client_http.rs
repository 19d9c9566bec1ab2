//! HTTP client tests against a local mock server

use bot_console::client::AUTH_HEADER;
use bot_console::{
    BotConfig, BotService, BotServiceClient, ClientError, CommandExecutor, MarketId, NoticeBoard,
    SessionStore,
};
use rust_decimal::Decimal;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TOKEN: &str = "session-token-123";

fn client(server: &MockServer) -> BotServiceClient {
    BotServiceClient::new(&server.uri(), Some(TOKEN), Duration::from_secs(5)).unwrap()
}

fn cfg() -> BotConfig {
    BotConfig::new(Decimal::from(2), Decimal::from(5), Decimal::new(35, 1)).unwrap()
}

#[tokio::test]
async fn test_fetch_status_sends_session_token() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/bot/status"))
        .and(header(AUTH_HEADER, TOKEN))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "activeMarkets": ["1.23"] })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let payload = client(&server).fetch_status(None).await.unwrap();
    assert_eq!(payload, json!({ "activeMarkets": ["1.23"] }));
}

#[tokio::test]
async fn test_fetch_status_with_market_filter() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/bot/status"))
        .and(query_param("marketId", "1.23"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "activeBots": {} })))
        .expect(1)
        .mount(&server)
        .await;

    client(&server)
        .fetch_status(Some(&MarketId::from("1.23")))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_fetch_status_rejects_non_json_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/bot/status"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
        .mount(&server)
        .await;

    let err = client(&server).fetch_status(None).await.unwrap_err();
    assert!(matches!(err, ClientError::InvalidResponse(_)));
    assert_eq!(
        err.operator_message("Failed to load running bots"),
        "Failed to load running bots"
    );
}

#[tokio::test]
async fn test_start_posts_market_and_config() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/bot/start"))
        .and(header(AUTH_HEADER, TOKEN))
        .and(body_json(json!({
            "marketId": "1.23",
            "size": 2.0,
            "upThreshold": 5.0,
            "downThreshold": 3.5
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ok": true,
            "marketId": "1.23",
            "config": { "size": 2, "upThreshold": 5, "downThreshold": 3.5 }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let resp = client(&server)
        .start_bot(&MarketId::from("1.23"), &cfg())
        .await
        .unwrap();
    assert!(resp.ok);
    assert_eq!(resp.confirmed_config(), Some(cfg()));
}

#[tokio::test]
async fn test_start_error_body_is_surfaced_verbatim() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/bot/start"))
        .respond_with(
            ResponseTemplate::new(400).set_body_json(json!({ "error": "Bot already running" })),
        )
        .mount(&server)
        .await;

    let err = client(&server)
        .start_bot(&MarketId::from("1.23"), &cfg())
        .await
        .unwrap_err();
    match &err {
        ClientError::Api { status, message } => {
            assert_eq!(*status, 400);
            assert_eq!(message.as_deref(), Some("Bot already running"));
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(err.operator_message("Failed to start bot"), "Bot already running");
}

#[tokio::test]
async fn test_stop_tolerates_empty_success_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/bot/stop"))
        .and(body_json(json!({ "marketId": "1.23" })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let resp = client(&server)
        .stop_bot(&MarketId::from("1.23"))
        .await
        .unwrap();
    assert!(!resp.ok);
}

#[tokio::test]
async fn test_nested_error_reaches_operator_notice() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/bot/stop"))
        .respond_with(ResponseTemplate::new(502).set_body_json(json!({
            "error": { "error": "INVALID_SESSION_INFORMATION" }
        })))
        .mount(&server)
        .await;

    let store = SessionStore::new();
    let notices = NoticeBoard::new();
    let service: Arc<dyn BotService> = Arc::new(client(&server));
    let executor = CommandExecutor::new(service, store.clone(), notices.clone());

    assert!(executor.stop(&MarketId::from("1.23")).await.is_err());
    assert_eq!(
        notices.current().unwrap().message,
        "INVALID_SESSION_INFORMATION"
    );
    assert!(store.view().is_empty());
}
