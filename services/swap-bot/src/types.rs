//! Core domain types shared between the manager, strategies and the store

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::{StrategyConfig, StrategyKind};
use crate::strategy::StrategyStats;

/// A user-defined trading bot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bot {
    /// Immutable once created
    pub id: String,
    pub name: String,
    pub strategy_kind: StrategyKind,
    pub config: StrategyConfig,
    /// Token the strategy accumulates and sells
    pub base_token: String,
    /// Token prices and amounts are denominated in
    pub quote_token: String,
    pub running: bool,
    /// Last stats snapshot synced from the strategy
    #[serde(default)]
    pub stats: Option<StrategyStats>,
    pub created_at: DateTime<Utc>,
}

impl Bot {
    pub fn new(name: &str, config: StrategyConfig, base_token: &str, quote_token: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            strategy_kind: config.kind(),
            config,
            base_token: base_token.to_string(),
            quote_token: quote_token.to_string(),
            running: false,
            stats: None,
            created_at: Utc::now(),
        }
    }
}

/// Trade direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeType {
    Buy,
    Sell,
}

impl std::fmt::Display for TradeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TradeType::Buy => write!(f, "BUY"),
            TradeType::Sell => write!(f, "SELL"),
        }
    }
}

/// Who initiated a trade
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeSource {
    Bot,
    Manual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeStatus {
    Success,
    Failed,
}

/// One completed swap attempt, appended to trade history
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeRecord {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub trade_type: TradeType,
    pub source: TradeSource,
    pub bot_id: Option<String>,
    pub strategy_kind: Option<StrategyKind>,
    pub token_from: String,
    pub token_to: String,
    pub amount_in: Decimal,
    pub amount_out: Decimal,
    pub price: Decimal,
    pub tx_ref: Option<String>,
    pub status: TradeStatus,
    #[serde(default)]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Result of a successful swap as seen by a strategy
#[derive(Debug, Clone)]
pub struct Fill {
    pub trade_type: TradeType,
    pub amount_in: Decimal,
    pub amount_out: Decimal,
    /// Quote per base at which the trade was evaluated
    pub price: Decimal,
    pub tx_ref: String,
    pub fee_paid: Decimal,
}
