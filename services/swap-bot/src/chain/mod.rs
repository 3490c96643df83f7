//! Chain client - prices, swaps and receipts from the external AMM
//!
//! Strategies only ever see the [`ChainClient`] trait. Two implementations
//! ship with the crate: [`HttpChainClient`] talks to a swap gateway and the
//! node's JSON-RPC, [`PaperChainClient`] simulates fills in-process.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::amount::{resolve_token, TokenInfo};
use crate::error::ChainError;

pub mod http;
pub mod paper;

pub use http::HttpChainClient;
pub use paper::PaperChainClient;

/// Result type for chain operations
pub type Result<T> = std::result::Result<T, ChainError>;

/// Read-only wallet identity shared by every strategy of a bot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignerHandle {
    pub address: String,
    pub label: String,
}

impl SignerHandle {
    pub fn new(address: &str, label: &str) -> Self {
        Self {
            address: address.to_string(),
            label: label.to_string(),
        }
    }
}

/// Base/quote pair a strategy trades
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradePair {
    pub base: TokenInfo,
    pub quote: TokenInfo,
}

impl TradePair {
    pub fn new(base: TokenInfo, quote: TokenInfo) -> Self {
        Self { base, quote }
    }

    /// Resolve both sides from symbols or addresses
    pub fn resolve(base: &str, quote: &str) -> anyhow::Result<Self> {
        Ok(Self {
            base: resolve_token(base)?,
            quote: resolve_token(quote)?,
        })
    }

    pub fn label(&self) -> String {
        format!("{}/{}", self.base.symbol, self.quote.symbol)
    }
}

/// Swap accepted by the network
#[derive(Debug, Clone, PartialEq)]
pub struct SwapSubmission {
    pub tx_ref: String,
    /// Quoted output at submission time, if the backend reports one
    pub expected_out: Option<Decimal>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxStatus {
    Success,
    Reverted,
}

/// Mined transaction outcome
#[derive(Debug, Clone, PartialEq)]
pub struct TxReceipt {
    pub status: TxStatus,
    pub block_ref: Option<u64>,
    /// Gas cost in the native token
    pub fee_paid: Decimal,
    /// Actual output amount, when the backend can decode it
    pub amount_out: Option<Decimal>,
}

/// Access to the AMM and the chain underneath it
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Units of `token_out` per one unit of `token_in` at spot
    async fn get_price(&self, token_in: &TokenInfo, token_out: &TokenInfo) -> Result<Decimal>;

    /// Submit an exact-input swap through the router
    async fn swap(
        &self,
        signer: &SignerHandle,
        token_in: &TokenInfo,
        token_out: &TokenInfo,
        amount_in: Decimal,
        slippage_pct: Decimal,
    ) -> Result<SwapSubmission>;

    /// Wait until the transaction is mined
    async fn wait_for_confirmation(&self, tx_ref: &str) -> Result<TxReceipt>;

    /// Token balance of the signer
    async fn get_balance(&self, signer: &SignerHandle, token: &TokenInfo) -> Result<Decimal>;

    fn name(&self) -> &str;
}
