//! Draft bot configuration for the selected market

use rust_decimal::Decimal;
use std::str::FromStr;

use crate::config::{BotConfig, ValidationError};
use crate::types::MarketId;

/// Editable draft field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DraftField {
    Size,
    UpThreshold,
    DownThreshold,
}

impl DraftField {
    pub fn name(&self) -> &'static str {
        match self {
            DraftField::Size => "size",
            DraftField::UpThreshold => "upThreshold",
            DraftField::DownThreshold => "downThreshold",
        }
    }
}

impl FromStr for DraftField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "size" => Ok(DraftField::Size),
            "up" | "upthreshold" => Ok(DraftField::UpThreshold),
            "down" | "downthreshold" => Ok(DraftField::DownThreshold),
            other => Err(format!("unknown field: {}", other)),
        }
    }
}

/// Values typed by the operator before a start, tied to one selected market
///
/// Inputs stay as entered until `build`, so a half-typed value is kept
/// rather than rejected on every keystroke.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DraftConfig {
    selected: Option<MarketId>,
    size: Option<String>,
    up_threshold: Option<String>,
    down_threshold: Option<String>,
}

impl DraftConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn selected(&self) -> Option<&MarketId> {
        self.selected.as_ref()
    }

    /// Select a market; switching markets discards the previous draft
    pub fn select(&mut self, market_id: MarketId) {
        if self.selected.as_ref() != Some(&market_id) {
            *self = Self {
                selected: Some(market_id),
                ..Self::default()
            };
        }
    }

    pub fn deselect(&mut self) {
        *self = Self::default();
    }

    pub fn set(&mut self, field: DraftField, input: impl Into<String>) {
        let input = Some(input.into());
        match field {
            DraftField::Size => self.size = input,
            DraftField::UpThreshold => self.up_threshold = input,
            DraftField::DownThreshold => self.down_threshold = input,
        }
    }

    pub fn value(&self, field: DraftField) -> Option<&str> {
        match field {
            DraftField::Size => self.size.as_deref(),
            DraftField::UpThreshold => self.up_threshold.as_deref(),
            DraftField::DownThreshold => self.down_threshold.as_deref(),
        }
    }

    /// Validate the inputs into a config
    pub fn build(&self) -> Result<BotConfig, ValidationError> {
        BotConfig::new(
            self.parse(DraftField::Size)?,
            self.parse(DraftField::UpThreshold)?,
            self.parse(DraftField::DownThreshold)?,
        )
    }

    /// Drop the entered values after a confirmed start, keeping the selection
    pub fn discard_values_for(&mut self, market_id: &MarketId) {
        if self.selected.as_ref() == Some(market_id) {
            self.size = None;
            self.up_threshold = None;
            self.down_threshold = None;
        }
    }

    pub fn is_empty(&self) -> bool {
        self.size.is_none() && self.up_threshold.is_none() && self.down_threshold.is_none()
    }

    fn parse(&self, field: DraftField) -> Result<Decimal, ValidationError> {
        let input = self
            .value(field)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or(ValidationError::Missing {
                field: field.name(),
            })?;
        Decimal::from_str(input).map_err(|_| ValidationError::NotANumber {
            field: field.name(),
            input: input.to_string(),
        })
    }
}
