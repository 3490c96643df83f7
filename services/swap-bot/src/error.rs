//! Error types for chain access and strategy lifecycle

use rust_decimal::Decimal;

/// Errors raised by a [`crate::chain::ChainClient`]
#[derive(Debug, Clone, thiserror::Error)]
pub enum ChainError {
    #[error("RPC request failed: {0}")]
    Rpc(String),

    #[error("Insufficient funds: {0}")]
    InsufficientFunds(String),

    #[error("Transaction {tx_ref} reverted")]
    Reverted { tx_ref: String },

    #[error("Timed out waiting for confirmation of {tx_ref}")]
    ConfirmationTimeout { tx_ref: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Invalid price {price} for {pair}")]
    InvalidPrice { pair: String, price: Decimal },

    /// Amount cannot be expressed in the token's base units
    #[error("Invalid amount {0}")]
    InvalidAmount(String),
}

impl ChainError {
    /// Insufficient balance or output amount; recoverable once the wallet is topped up
    pub fn is_insufficient_funds(&self) -> bool {
        matches!(self, ChainError::InsufficientFunds(_))
    }

    /// Classify a raw error message from the gateway or node
    pub fn from_message(message: impl Into<String>) -> Self {
        let message = message.into();
        if looks_like_insufficient_funds(&message) {
            ChainError::InsufficientFunds(message)
        } else {
            ChainError::Rpc(message)
        }
    }
}

fn looks_like_insufficient_funds(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("insufficient funds")
        || lower.contains("insufficient_output_amount")
        || lower.contains("insufficient_input_amount")
        || lower.contains("insufficient balance")
        || lower.contains("transfer amount exceeds balance")
}

impl From<reqwest::Error> for ChainError {
    fn from(err: reqwest::Error) -> Self {
        ChainError::Rpc(err.to_string())
    }
}

/// Errors raised by strategies, the runner and the bot manager
#[derive(Debug, thiserror::Error)]
pub enum StrategyError {
    #[error("Strategy {0} is already running")]
    AlreadyRunning(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Bot not found: {0}")]
    NotFound(String),

    #[error("Bot {0} is running; stop it first")]
    Running(String),

    #[error("No async runtime available to schedule {0}")]
    NoRuntime(String),

    #[error(transparent)]
    Chain(#[from] ChainError),
}

impl StrategyError {
    pub fn is_insufficient_funds(&self) -> bool {
        matches!(self, StrategyError::Chain(e) if e.is_insufficient_funds())
    }
}

/// Result type for strategy operations
pub type Result<T> = std::result::Result<T, StrategyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_classification() {
        assert!(ChainError::from_message("execution reverted: UniswapV2Router: INSUFFICIENT_OUTPUT_AMOUNT")
            .is_insufficient_funds());
        assert!(ChainError::from_message("insufficient funds for gas * price + value")
            .is_insufficient_funds());
        assert!(ChainError::from_message("BEP20: transfer amount exceeds balance")
            .is_insufficient_funds());
        assert!(!ChainError::from_message("connection reset by peer").is_insufficient_funds());
    }

    #[test]
    fn test_strategy_error_passthrough() {
        let err: StrategyError = ChainError::InsufficientFunds("USDT".to_string()).into();
        assert!(err.is_insufficient_funds());

        let err: StrategyError = ChainError::Rpc("timeout".to_string()).into();
        assert!(!err.is_insufficient_funds());
    }
}
