//! Trade Executor - Fetches prices, submits swaps and journals the outcome

use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::chain::{ChainClient, SignerHandle, TradePair, TxStatus};
use crate::config::StrategyKind;
use crate::error::ChainError;
use crate::store::TradeJournal;
use crate::types::{Fill, TradeRecord, TradeSource, TradeStatus, TradeType};

/// A swap to perform against the pair
#[derive(Debug, Clone)]
pub struct SwapOrder {
    pub trade_type: TradeType,
    /// Quote currency for buys, base currency for sells
    pub amount_in: Decimal,
    /// Spot price the decision was made at
    pub price: Decimal,
    pub source: TradeSource,
    pub bot_id: Option<String>,
    pub strategy_kind: Option<StrategyKind>,
}

impl SwapOrder {
    pub fn buy(quote_amount: Decimal, price: Decimal) -> Self {
        Self {
            trade_type: TradeType::Buy,
            amount_in: quote_amount,
            price,
            source: TradeSource::Bot,
            bot_id: None,
            strategy_kind: None,
        }
    }

    pub fn sell(base_amount: Decimal, price: Decimal) -> Self {
        Self {
            trade_type: TradeType::Sell,
            amount_in: base_amount,
            price,
            source: TradeSource::Bot,
            bot_id: None,
            strategy_kind: None,
        }
    }

    pub fn from_bot(mut self, bot_id: &str, kind: StrategyKind) -> Self {
        self.bot_id = Some(bot_id.to_string());
        self.strategy_kind = Some(kind);
        self
    }

    pub fn manual(mut self) -> Self {
        self.source = TradeSource::Manual;
        self
    }

    /// Output implied by the decision price
    pub fn nominal_out(&self) -> Decimal {
        match self.trade_type {
            TradeType::Buy => self.amount_in / self.price,
            TradeType::Sell => self.amount_in * self.price,
        }
    }
}

/// Executes swaps for one wallet on one pair
#[derive(Clone)]
pub struct TradeExecutor {
    chain: Arc<dyn ChainClient>,
    signer: SignerHandle,
    pair: TradePair,
    journal: TradeJournal,
    slippage_pct: Decimal,
}

impl TradeExecutor {
    /// Create new trade executor
    pub fn new(
        chain: Arc<dyn ChainClient>,
        signer: SignerHandle,
        pair: TradePair,
        journal: TradeJournal,
        slippage_pct: Decimal,
    ) -> Self {
        Self {
            chain,
            signer,
            pair,
            journal,
            slippage_pct,
        }
    }

    pub fn pair(&self) -> &TradePair {
        &self.pair
    }

    /// Spot price of base, in quote
    pub async fn fetch_price(&self) -> Result<Decimal, ChainError> {
        let price = self.chain.get_price(&self.pair.base, &self.pair.quote).await?;
        if price <= Decimal::ZERO {
            return Err(ChainError::InvalidPrice {
                pair: self.pair.label(),
                price,
            });
        }
        Ok(price)
    }

    /// Swap, wait for the receipt, and append one trade record either way
    pub async fn execute(&self, order: &SwapOrder) -> Result<Fill, ChainError> {
        if order.price <= Decimal::ZERO {
            return Err(ChainError::InvalidPrice {
                pair: self.pair.label(),
                price: order.price,
            });
        }

        let (token_in, token_out) = match order.trade_type {
            TradeType::Buy => (&self.pair.quote, &self.pair.base),
            TradeType::Sell => (&self.pair.base, &self.pair.quote),
        };

        debug!(
            "{} {} {} -> {} at {} (slippage {}%)",
            order.trade_type, order.amount_in, token_in.symbol, token_out.symbol, order.price, self.slippage_pct
        );

        let submission = match self
            .chain
            .swap(&self.signer, token_in, token_out, order.amount_in, self.slippage_pct)
            .await
        {
            Ok(submission) => submission,
            Err(e) => {
                self.record(order, None, Decimal::ZERO, Some(&e)).await;
                return Err(e);
            }
        };

        let receipt = match self.chain.wait_for_confirmation(&submission.tx_ref).await {
            Ok(receipt) => receipt,
            Err(e) => {
                self.record(order, Some(&submission.tx_ref), Decimal::ZERO, Some(&e)).await;
                return Err(e);
            }
        };

        if receipt.status == TxStatus::Reverted {
            let err = ChainError::Reverted {
                tx_ref: submission.tx_ref.clone(),
            };
            warn!("Swap {} reverted in block {:?}", submission.tx_ref, receipt.block_ref);
            self.record(order, Some(&submission.tx_ref), Decimal::ZERO, Some(&err)).await;
            return Err(err);
        }

        let amount_out = receipt
            .amount_out
            .or(submission.expected_out)
            .unwrap_or_else(|| order.nominal_out());

        self.record(order, Some(&submission.tx_ref), amount_out, None).await;

        info!(
            "✓ {} confirmed: {} {} -> {} {} | tx {} | fee {}",
            order.trade_type,
            order.amount_in,
            token_in.symbol,
            amount_out,
            token_out.symbol,
            submission.tx_ref,
            receipt.fee_paid
        );

        Ok(Fill {
            trade_type: order.trade_type,
            amount_in: order.amount_in,
            amount_out,
            price: order.price,
            tx_ref: submission.tx_ref,
            fee_paid: receipt.fee_paid,
        })
    }

    async fn record(
        &self,
        order: &SwapOrder,
        tx_ref: Option<&str>,
        amount_out: Decimal,
        error: Option<&ChainError>,
    ) {
        let (token_from, token_to) = match order.trade_type {
            TradeType::Buy => (&self.pair.quote, &self.pair.base),
            TradeType::Sell => (&self.pair.base, &self.pair.quote),
        };

        let record = TradeRecord {
            id: Uuid::new_v4(),
            trade_type: order.trade_type,
            source: order.source,
            bot_id: order.bot_id.clone(),
            strategy_kind: order.strategy_kind,
            token_from: token_from.symbol.clone(),
            token_to: token_to.symbol.clone(),
            amount_in: order.amount_in,
            amount_out,
            price: order.price,
            tx_ref: tx_ref.map(str::to_string),
            status: if error.is_some() {
                TradeStatus::Failed
            } else {
                TradeStatus::Success
            },
            error: error.map(|e| e.to_string()),
            timestamp: Utc::now(),
        };

        self.journal.append(record).await;
    }
}
