//! Swap Bot Library
//!
//! Strategy execution engine for token swaps on a Uniswap-V2-style AMM.

pub mod amount;
pub mod chain;
pub mod config;
pub mod error;
pub mod executor;
pub mod logs;
pub mod manager;
pub mod runner;
pub mod store;
pub mod strategy;
pub mod types;

// Re-export main types for convenience
pub use chain::{ChainClient, HttpChainClient, PaperChainClient, SignerHandle, TradePair};
pub use config::{
    AppConfig, ChainMode, DcaConfig, ExecutionConfig, GridConfig, GridType, PaperConfig,
    StrategyConfig, StrategyKind, ThresholdConfig,
};
pub use error::{ChainError, StrategyError};
pub use executor::{SwapOrder, TradeExecutor};
pub use logs::{LogChannel, LogEntry, LogLevel, LogSink};
pub use manager::BotManager;
pub use runner::StrategyRunner;
pub use store::{FileStore, KeyValueStore, MemoryStore, Persistence, TradeJournal};
pub use strategy::{Strategy, StrategyContext, StrategyStats, StrategyStatus};
pub use types::{Bot, Fill, TradeRecord, TradeSource, TradeStatus, TradeType};
