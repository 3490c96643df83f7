//! Application and strategy configuration

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::StrategyError;

/// Smallest per-level investment a grid will accept, in quote currency
pub const MIN_GRID_TRADE_AMOUNT: Decimal = Decimal::ONE;

/// Process configuration, loaded from `swap-bot.toml` and `SWAP_BOT__*` env vars
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    /// JSON-RPC endpoint of the chain node
    pub rpc_url: String,
    /// AMM gateway that quotes prices and builds/signs router swaps
    pub gateway_url: String,
    /// Uniswap-V2-style router the gateway routes through
    pub router_address: String,
    /// Wallet the bots trade from
    pub wallet_address: String,
    pub chain_mode: ChainMode,
    /// Default trading pair for new bots
    pub base_token: String,
    pub quote_token: String,
    /// Where the file store keeps its JSON documents (default ~/.swap-bot)
    pub data_dir: Option<PathBuf>,
    pub log_level: String,
    /// How often the runner syncs bot stats to the store
    pub stats_interval_secs: u64,
    /// Entries kept per log channel
    pub log_retention: usize,
    /// Trade records kept in history
    pub trade_history_retention: usize,
    pub execution: ExecutionConfig,
    pub paper: PaperConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            rpc_url: "https://bsc-dataseed.binance.org".to_string(),
            gateway_url: "http://localhost:8080".to_string(),
            router_address: "0x10ED43C718714eb63d5aA57B78B54704E256024E".to_string(),
            wallet_address: "0x0000000000000000000000000000000000000000".to_string(),
            chain_mode: ChainMode::default(),
            base_token: "WBNB".to_string(),
            quote_token: "USDT".to_string(),
            data_dir: None,
            log_level: "info".to_string(),
            stats_interval_secs: 10,
            log_retention: 500,
            trade_history_retention: 1000,
            execution: ExecutionConfig::default(),
            paper: PaperConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load from an optional explicit file, `swap-bot.toml` in the working
    /// directory, and environment overrides, in increasing precedence
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut builder = config::Config::builder()
            .add_source(config::File::with_name("swap-bot").required(false));

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }

        let settings = builder
            .add_source(config::Environment::with_prefix("SWAP_BOT").separator("__"))
            .build()?;

        let config: AppConfig = settings.try_deserialize()?;
        Ok(config)
    }

    pub fn data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".swap-bot")
        })
    }

    pub fn stats_interval(&self) -> Duration {
        Duration::from_secs(self.stats_interval_secs.max(1))
    }

    pub fn tracing_level(&self) -> tracing::Level {
        self.log_level.parse().unwrap_or(tracing::Level::INFO)
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ChainMode {
    /// Simulated fills against an in-process price feed
    #[default]
    Paper,
    /// Real swaps through the AMM gateway
    Live,
}

/// Execution configuration (slippage, confirmation)
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq)]
pub struct ExecutionConfig {
    /// Default slippage tolerance in percent (e.g., 1.0 for 1%)
    #[serde(default = "default_slippage_pct")]
    pub slippage_pct: Decimal,
    /// Confirmation timeout in seconds
    #[serde(default = "default_confirm_timeout_secs")]
    pub confirm_timeout_secs: u64,
    /// Receipt polling interval in milliseconds
    #[serde(default = "default_receipt_poll_ms")]
    pub receipt_poll_ms: u64,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            slippage_pct: default_slippage_pct(),
            confirm_timeout_secs: default_confirm_timeout_secs(),
            receipt_poll_ms: default_receipt_poll_ms(),
        }
    }
}

fn default_slippage_pct() -> Decimal { Decimal::ONE }
fn default_confirm_timeout_secs() -> u64 { 60 }
fn default_receipt_poll_ms() -> u64 { 1500 }

/// Paper chain simulation parameters
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct PaperConfig {
    /// Starting spot price of base in quote
    pub initial_price: Decimal,
    /// Max random walk per price read, in percent
    pub volatility_pct: Decimal,
    pub initial_quote_balance: Decimal,
    pub initial_base_balance: Decimal,
}

impl Default for PaperConfig {
    fn default() -> Self {
        Self {
            initial_price: Decimal::from(600),
            volatility_pct: Decimal::new(5, 1),
            initial_quote_balance: Decimal::from(1000),
            initial_base_balance: Decimal::ZERO,
        }
    }
}

/// Strategy discriminant
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    Threshold,
    Dca,
    Grid,
}

impl std::fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StrategyKind::Threshold => write!(f, "threshold"),
            StrategyKind::Dca => write!(f, "dca"),
            StrategyKind::Grid => write!(f, "grid"),
        }
    }
}

/// Variant-specific strategy parameters
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StrategyConfig {
    Threshold(ThresholdConfig),
    Dca(DcaConfig),
    Grid(GridConfig),
}

impl StrategyConfig {
    pub fn kind(&self) -> StrategyKind {
        match self {
            StrategyConfig::Threshold(_) => StrategyKind::Threshold,
            StrategyConfig::Dca(_) => StrategyKind::Dca,
            StrategyConfig::Grid(_) => StrategyKind::Grid,
        }
    }

    pub fn validate(&self) -> Result<(), StrategyError> {
        match self {
            StrategyConfig::Threshold(c) => c.validate(),
            StrategyConfig::Dca(c) => c.validate(),
            StrategyConfig::Grid(c) => c.validate(),
        }
    }

    /// Per-bot slippage override
    pub fn slippage_pct(&self) -> Option<Decimal> {
        match self {
            StrategyConfig::Threshold(c) => c.slippage_pct,
            StrategyConfig::Dca(c) => c.slippage_pct,
            StrategyConfig::Grid(c) => c.slippage_pct,
        }
    }
}

/// Buy-low / sell-high parameters
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ThresholdConfig {
    pub buy_threshold: Decimal,
    pub sell_threshold: Decimal,
    /// Quote currency spent per buy, and targeted per sell
    pub trade_amount: Decimal,
    #[serde(default = "default_check_interval_secs")]
    pub check_interval_secs: u64,
    #[serde(default)]
    pub slippage_pct: Option<Decimal>,
}

impl ThresholdConfig {
    pub fn validate(&self) -> Result<(), StrategyError> {
        if self.buy_threshold <= Decimal::ZERO || self.sell_threshold <= Decimal::ZERO {
            return Err(StrategyError::InvalidConfig(
                "thresholds must be positive".to_string(),
            ));
        }
        if self.trade_amount <= Decimal::ZERO {
            return Err(StrategyError::InvalidConfig(
                "trade amount must be positive".to_string(),
            ));
        }
        validate_interval(self.check_interval_secs)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs)
    }
}

/// Dollar-cost-averaging parameters
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct DcaConfig {
    /// Quote currency spent per tick
    pub amount: Decimal,
    #[serde(default = "default_dca_interval_secs")]
    pub interval_secs: u64,
    pub total_budget: Decimal,
    /// Skip buys while the price is above this
    #[serde(default)]
    pub max_price: Option<Decimal>,
    #[serde(default)]
    pub slippage_pct: Option<Decimal>,
}

impl DcaConfig {
    pub fn validate(&self) -> Result<(), StrategyError> {
        if self.amount <= Decimal::ZERO {
            return Err(StrategyError::InvalidConfig(
                "DCA amount must be positive".to_string(),
            ));
        }
        if self.total_budget <= Decimal::ZERO {
            return Err(StrategyError::InvalidConfig(
                "DCA total budget must be positive".to_string(),
            ));
        }
        if matches!(self.max_price, Some(p) if p <= Decimal::ZERO) {
            return Err(StrategyError::InvalidConfig(
                "DCA max price must be positive".to_string(),
            ));
        }
        validate_interval(self.interval_secs)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum GridType {
    #[default]
    Arithmetic,
    Geometric,
}

/// Ranged grid parameters
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct GridConfig {
    pub lower_price: Decimal,
    pub upper_price: Decimal,
    pub grid_count: u32,
    pub total_investment: Decimal,
    #[serde(default)]
    pub grid_type: GridType,
    #[serde(default = "default_check_interval_secs")]
    pub check_interval_secs: u64,
    /// Delay before a sold level is re-armed for buying
    #[serde(default = "default_rearm_cooldown_secs")]
    pub rearm_cooldown_secs: u64,
    #[serde(default)]
    pub slippage_pct: Option<Decimal>,
}

impl GridConfig {
    pub fn validate(&self) -> Result<(), StrategyError> {
        if self.lower_price <= Decimal::ZERO || self.upper_price <= self.lower_price {
            return Err(StrategyError::InvalidConfig(format!(
                "grid range must satisfy 0 < lower ({}) < upper ({})",
                self.lower_price, self.upper_price
            )));
        }
        if self.grid_count == 0 {
            return Err(StrategyError::InvalidConfig(
                "grid count must be at least 1".to_string(),
            ));
        }
        let per_grid = self.amount_per_grid();
        if per_grid < MIN_GRID_TRADE_AMOUNT {
            return Err(StrategyError::InvalidConfig(format!(
                "amount per grid {} is below the minimum trade size {}",
                per_grid, MIN_GRID_TRADE_AMOUNT
            )));
        }
        validate_interval(self.check_interval_secs)
    }

    pub fn amount_per_grid(&self) -> Decimal {
        if self.grid_count == 0 {
            return Decimal::ZERO;
        }
        self.total_investment / Decimal::from(self.grid_count)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs)
    }

    pub fn rearm_cooldown(&self) -> Duration {
        Duration::from_secs(self.rearm_cooldown_secs)
    }
}

fn validate_interval(secs: u64) -> Result<(), StrategyError> {
    if secs == 0 {
        return Err(StrategyError::InvalidConfig(
            "check interval must be at least one second".to_string(),
        ));
    }
    Ok(())
}

fn default_check_interval_secs() -> u64 { 30 }
fn default_dca_interval_secs() -> u64 { 3600 }
fn default_rearm_cooldown_secs() -> u64 { 5 }
