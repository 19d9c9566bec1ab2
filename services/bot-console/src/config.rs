//! Bot and console configuration

use anyhow::Context;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Environment variable pointing at an explicit console config file
pub const CONFIG_PATH_ENV: &str = "BOT_CONSOLE_CONFIG";

/// Prefix for environment overrides, e.g. `BOT_CONSOLE_API_BASE_URL`
pub const ENV_PREFIX: &str = "BOT_CONSOLE";

/// Fallback token variable, same name the web dashboard persisted it under
pub const SESSION_TOKEN_ENV: &str = "BETFAIR_SESSION_TOKEN";

/// Bot trading configuration for one market
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BotConfig {
    /// Bet size (GBP)
    #[serde(with = "rust_decimal::serde::float")]
    pub size: Decimal,
    /// UP threshold (BACK/UNDER)
    #[serde(with = "rust_decimal::serde::float")]
    pub up_threshold: Decimal,
    /// DOWN threshold (LAY/OVER)
    #[serde(with = "rust_decimal::serde::float")]
    pub down_threshold: Decimal,
}

impl BotConfig {
    /// Build a config, rejecting non-positive values
    pub fn new(
        size: Decimal,
        up_threshold: Decimal,
        down_threshold: Decimal,
    ) -> Result<Self, ValidationError> {
        let config = Self {
            size,
            up_threshold,
            down_threshold,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        for (field, value) in [
            ("size", self.size),
            ("upThreshold", self.up_threshold),
            ("downThreshold", self.down_threshold),
        ] {
            if value <= Decimal::ZERO {
                return Err(ValidationError::NotPositive { field, value });
            }
        }
        Ok(())
    }

    /// Parse a config reported by the server
    ///
    /// Accepts numbers or numeric strings. Anything incomplete or
    /// non-positive yields `None` so it is treated as unknown.
    pub fn from_value(value: &serde_json::Value) -> Option<Self> {
        let size = decimal_field(value, "size")?;
        let up_threshold = decimal_field(value, "upThreshold")?;
        let down_threshold = decimal_field(value, "downThreshold")?;
        Self::new(size, up_threshold, down_threshold).ok()
    }
}

fn decimal_field(value: &serde_json::Value, key: &str) -> Option<Decimal> {
    match &value[key] {
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(Decimal::from(i))
            } else {
                n.as_f64().and_then(|f| Decimal::try_from(f).ok())
            }
        }
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Local validation failures; these never reach the network
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("{field} must be a positive number (got {value})")]
    NotPositive { field: &'static str, value: Decimal },

    #[error("{field} is required")]
    Missing { field: &'static str },

    #[error("{field} is not a number: {input:?}")]
    NotANumber { field: &'static str, input: String },

    #[error("No market selected")]
    NoMarketSelected,
}

/// Console settings, layered from defaults, an optional file and the environment
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub api_base_url: String,
    pub session_token: Option<String>,
    pub poll_interval_secs: u64,
    pub request_timeout_secs: u64,
    pub log_level: String,
}

impl Config {
    /// Load from the default locations
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(config_file_path())
    }

    /// Load with an explicit config file (missing files are fine)
    pub fn load_from(path: Option<PathBuf>) -> anyhow::Result<Self> {
        let mut builder = config::Config::builder()
            .set_default("api_base_url", "http://localhost:3000")?
            .set_default("poll_interval_secs", 5_i64)?
            .set_default("request_timeout_secs", 30_i64)?
            .set_default("log_level", "info")?;

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(false));
        }

        let settings = builder
            .add_source(config::Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()
            .context("Failed to build console configuration")?;

        let mut config: Config = settings
            .try_deserialize()
            .context("Invalid console configuration")?;

        if config.session_token.is_none() {
            config.session_token = std::env::var(SESSION_TOKEN_ENV).ok();
        }
        config.session_token = config
            .session_token
            .take()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());

        if config.poll_interval_secs == 0 {
            anyhow::bail!("poll_interval_secs must be at least 1");
        }
        if config.request_timeout_secs == 0 {
            anyhow::bail!("request_timeout_secs must be at least 1");
        }

        Ok(config)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Tracing level from `log_level`, defaulting to INFO
    pub fn tracing_level(&self) -> tracing::Level {
        self.log_level.parse().unwrap_or(tracing::Level::INFO)
    }
}

/// `$BOT_CONSOLE_CONFIG`, else `<config dir>/bot-console/console.toml`
pub fn config_file_path() -> Option<PathBuf> {
    std::env::var(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .ok()
        .or_else(|| dirs::config_dir().map(|d| d.join("bot-console").join("console.toml")))
}
