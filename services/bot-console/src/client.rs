//! Bot Service API Client

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

use crate::config::{BotConfig, Config};
use crate::types::MarketId;

/// Header carrying the operator's session token on every call
pub const AUTH_HEADER: &str = "X-Authentication";

/// Errors talking to the bot service
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("Missing session token. Please log in first.")]
    MissingToken,

    #[error("HTTP request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("API error: {status} - {}", .message.as_deref().unwrap_or("no error message"))]
    Api { status: u16, message: Option<String> },

    #[error("Invalid response format: {0}")]
    InvalidResponse(String),
}

impl ClientError {
    /// Message for the operator: the server's own text verbatim, else `fallback`
    pub fn operator_message(&self, fallback: &str) -> String {
        match self {
            ClientError::Api {
                message: Some(message),
                ..
            } => message.clone(),
            ClientError::MissingToken => self.to_string(),
            _ => fallback.to_string(),
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, ClientError::Transport(e) if e.is_timeout())
    }
}

/// Bot lifecycle operations offered by the backend
#[async_trait]
pub trait BotService: Send + Sync {
    /// Raw status payload; shape is sorted out by the normalizer
    async fn fetch_status(
        &self,
        market_id: Option<&MarketId>,
    ) -> Result<serde_json::Value, ClientError>;

    async fn start_bot(
        &self,
        market_id: &MarketId,
        config: &BotConfig,
    ) -> Result<StartBotResponse, ClientError>;

    async fn stop_bot(&self, market_id: &MarketId) -> Result<StopBotResponse, ClientError>;
}

/// HTTP client for the bot service
pub struct BotServiceClient {
    client: Client,
    base_url: String,
    session_token: String,
}

impl BotServiceClient {
    /// Create new bot service client
    pub fn new(
        base_url: &str,
        session_token: Option<&str>,
        timeout: Duration,
    ) -> Result<Self, ClientError> {
        let session_token = session_token
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(ClientError::MissingToken)?
            .to_string();

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            session_token,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, ClientError> {
        Self::new(
            &config.api_base_url,
            config.session_token.as_deref(),
            config.request_timeout(),
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

#[async_trait]
impl BotService for BotServiceClient {
    async fn fetch_status(
        &self,
        market_id: Option<&MarketId>,
    ) -> Result<serde_json::Value, ClientError> {
        let url = self.url("/bot/status");
        debug!("Polling bot status from {}", url);

        let mut request = self
            .client
            .get(&url)
            .header(AUTH_HEADER, &self.session_token);
        if let Some(market_id) = market_id {
            request = request.query(&[("marketId", market_id.as_str())]);
        }

        let response = ensure_success(request.send().await?).await?;
        response
            .json::<serde_json::Value>()
            .await
            .map_err(|e| ClientError::InvalidResponse(e.to_string()))
    }

    async fn start_bot(
        &self,
        market_id: &MarketId,
        config: &BotConfig,
    ) -> Result<StartBotResponse, ClientError> {
        let url = self.url("/bot/start");
        let req = StartBotRequest {
            market_id,
            config: *config,
        };

        let response = self
            .client
            .post(&url)
            .header(AUTH_HEADER, &self.session_token)
            .json(&req)
            .send()
            .await?;

        let text = ensure_success(response).await?.text().await?;
        let resp: StartBotResponse = serde_json::from_str(&text).unwrap_or_else(|e| {
            debug!("Unparsed start response for {}: {}", market_id, e);
            StartBotResponse::default()
        });
        info!("✓ Bot start accepted for market {}", market_id);
        Ok(resp)
    }

    async fn stop_bot(&self, market_id: &MarketId) -> Result<StopBotResponse, ClientError> {
        let url = self.url("/bot/stop");
        let req = StopBotRequest { market_id };

        let response = self
            .client
            .post(&url)
            .header(AUTH_HEADER, &self.session_token)
            .json(&req)
            .send()
            .await?;

        let text = ensure_success(response).await?.text().await?;
        let resp: StopBotResponse = serde_json::from_str(&text).unwrap_or_else(|e| {
            debug!("Unparsed stop response for {}: {}", market_id, e);
            StopBotResponse::default()
        });
        info!("✓ Bot stop accepted for market {}", market_id);
        Ok(resp)
    }
}

/// Turn non-2xx responses into `ClientError::Api` with the body's error text
async fn ensure_success(response: Response) -> Result<Response, ClientError> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status().as_u16();
    let text = response.text().await.unwrap_or_default();
    Err(ClientError::Api {
        status,
        message: extract_error_message(&text),
    })
}

/// Pull `error` out of `{ "error": "..." }` (or `{ "error": { "error": "..." } }`)
pub fn extract_error_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    let error = value.get("error")?;
    let message = match error {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Object(_) => error.get("error")?.as_str()?.to_string(),
        _ => return None,
    };
    let message = message.trim().to_string();
    (!message.is_empty()).then_some(message)
}

// Request/Response types

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct StartBotRequest<'a> {
    market_id: &'a MarketId,
    #[serde(flatten)]
    config: BotConfig,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct StopBotRequest<'a> {
    market_id: &'a MarketId,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartBotResponse {
    #[serde(default)]
    pub ok: bool,
    #[serde(default)]
    pub market_id: Option<String>,
    #[serde(default)]
    pub config: Option<serde_json::Value>,
}

impl StartBotResponse {
    /// The config the server says it started with, if it sent a usable one
    pub fn confirmed_config(&self) -> Option<BotConfig> {
        self.config.as_ref().and_then(BotConfig::from_value)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StopBotResponse {
    #[serde(default)]
    pub ok: bool,
    #[serde(default)]
    pub market_id: Option<String>,
}
