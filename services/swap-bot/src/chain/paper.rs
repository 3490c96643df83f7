//! Paper trading chain - simulated prices, balances and fills

use async_trait::async_trait;
use rand::Rng;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use super::{ChainClient, Result, SignerHandle, SwapSubmission, TradePair, TxReceipt, TxStatus};
use crate::amount::TokenInfo;
use crate::config::PaperConfig;
use crate::error::ChainError;

/// Flat simulated gas cost per swap, in native token
fn paper_fee() -> Decimal {
    Decimal::new(5, 4)
}

/// In-process chain for dry runs
///
/// Tracks a single pair. Each price read takes a bounded random walk step,
/// and fills land between the spot price and the slippage tolerance.
pub struct PaperChainClient {
    pair: TradePair,
    volatility_pct: Decimal,
    state: Mutex<PaperState>,
}

struct PaperState {
    price: Decimal,
    /// (owner, token address) -> balance
    balances: HashMap<(String, String), Decimal>,
    receipts: HashMap<String, TxReceipt>,
    block: u64,
}

impl PaperChainClient {
    pub fn new(pair: TradePair, config: PaperConfig) -> Self {
        Self {
            pair,
            volatility_pct: config.volatility_pct,
            state: Mutex::new(PaperState {
                price: config.initial_price,
                balances: HashMap::new(),
                receipts: HashMap::new(),
                block: 1,
            }),
        }
    }

    /// Seed a wallet with balances
    pub fn fund(&self, signer: &SignerHandle, token: &TokenInfo, amount: Decimal) {
        let mut state = self.lock();
        *state
            .balances
            .entry(balance_key(signer, token))
            .or_insert(Decimal::ZERO) += amount;
    }

    /// Pin the spot price; subsequent reads walk from here
    pub fn set_price(&self, price: Decimal) {
        self.lock().price = price;
    }

    pub fn price(&self) -> Decimal {
        self.lock().price
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, PaperState> {
        // State stays consistent even if a holder panicked
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn random_fraction(max_pct: Decimal) -> Decimal {
        if max_pct <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        let r: f64 = rand::thread_rng().gen_range(0.0..1.0);
        Decimal::from_f64(r).unwrap_or(Decimal::ZERO) * max_pct / Decimal::ONE_HUNDRED
    }

    fn is_forward(&self, token_in: &TokenInfo, token_out: &TokenInfo) -> Result<bool> {
        if token_in.address == self.pair.base.address && token_out.address == self.pair.quote.address {
            Ok(true)
        } else if token_in.address == self.pair.quote.address
            && token_out.address == self.pair.base.address
        {
            Ok(false)
        } else {
            Err(ChainError::InvalidResponse(format!(
                "paper chain only quotes {}",
                self.pair.label()
            )))
        }
    }
}

fn balance_key(signer: &SignerHandle, token: &TokenInfo) -> (String, String) {
    (signer.address.to_lowercase(), token.address.to_lowercase())
}

#[async_trait]
impl ChainClient for PaperChainClient {
    async fn get_price(&self, token_in: &TokenInfo, token_out: &TokenInfo) -> Result<Decimal> {
        let forward = self.is_forward(token_in, token_out)?;

        let step = Self::random_fraction(self.volatility_pct * Decimal::TWO)
            - self.volatility_pct / Decimal::ONE_HUNDRED;
        let mut state = self.lock();
        let walked = state.price * (Decimal::ONE + step);
        if walked > Decimal::ZERO {
            state.price = walked;
        }
        let price = state.price;
        debug!("Paper price {}: {}", self.pair.label(), price);

        if forward {
            Ok(price)
        } else {
            Ok(Decimal::ONE / price)
        }
    }

    async fn swap(
        &self,
        signer: &SignerHandle,
        token_in: &TokenInfo,
        token_out: &TokenInfo,
        amount_in: Decimal,
        slippage_pct: Decimal,
    ) -> Result<SwapSubmission> {
        let forward = self.is_forward(token_in, token_out)?;
        let slip = Self::random_fraction(slippage_pct);

        let mut state = self.lock();
        let in_key = balance_key(signer, token_in);
        let available = state.balances.get(&in_key).copied().unwrap_or(Decimal::ZERO);
        if available < amount_in {
            return Err(ChainError::InsufficientFunds(format!(
                "{} balance {} below {}",
                token_in.symbol, available, amount_in
            )));
        }

        let gross_out = if forward {
            amount_in * state.price
        } else {
            amount_in / state.price
        };
        let amount_out = gross_out * (Decimal::ONE - slip);

        state.balances.insert(in_key, available - amount_in);
        *state
            .balances
            .entry(balance_key(signer, token_out))
            .or_insert(Decimal::ZERO) += amount_out;

        state.block += 1;
        let tx_ref = format!("0x{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple());
        let receipt = TxReceipt {
            status: TxStatus::Success,
            block_ref: Some(state.block),
            fee_paid: paper_fee(),
            amount_out: Some(amount_out),
        };
        state.receipts.insert(tx_ref.clone(), receipt);

        info!(
            "📝 Paper swap {} {} -> {} {} | tx {}",
            amount_in, token_in.symbol, amount_out, token_out.symbol, tx_ref
        );

        Ok(SwapSubmission {
            tx_ref,
            expected_out: Some(gross_out),
        })
    }

    async fn wait_for_confirmation(&self, tx_ref: &str) -> Result<TxReceipt> {
        self.lock()
            .receipts
            .get(tx_ref)
            .cloned()
            .ok_or_else(|| ChainError::ConfirmationTimeout {
                tx_ref: tx_ref.to_string(),
            })
    }

    async fn get_balance(&self, signer: &SignerHandle, token: &TokenInfo) -> Result<Decimal> {
        Ok(self
            .lock()
            .balances
            .get(&balance_key(signer, token))
            .copied()
            .unwrap_or(Decimal::ZERO))
    }

    fn name(&self) -> &str {
        "paper"
    }
}
