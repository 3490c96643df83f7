//! Scripted ChainClient for testing strategies without a network

#![allow(dead_code)]

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use swap_bot::amount::TokenInfo;
use swap_bot::chain::{ChainClient, SignerHandle, SwapSubmission, TradePair, TxReceipt, TxStatus};
use swap_bot::error::ChainError;

/// One swap seen by the mock
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedSwap {
    pub token_in: String,
    pub token_out: String,
    pub amount_in: Decimal,
    /// Spot price of base in quote when the swap was submitted
    pub price: Decimal,
}

/// Chain whose price follows a script and whose swaps always fill at spot
///
/// Once the script runs out, the last price repeats.
pub struct MockChainClient {
    pair: TradePair,
    script: Mutex<VecDeque<Decimal>>,
    last_price: Mutex<Decimal>,
    swaps: Mutex<Vec<RecordedSwap>>,
    receipts: Mutex<HashMap<String, TxReceipt>>,
    simulate_failure: Mutex<Option<fn() -> ChainError>>,
    confirmation_delay: Duration,
}

impl MockChainClient {
    pub fn new(prices: &[Decimal]) -> Self {
        let pair = TradePair::resolve("WBNB", "USDT").expect("known tokens");
        let first = prices.first().copied().unwrap_or(Decimal::ONE);
        Self {
            pair,
            script: Mutex::new(prices.iter().copied().collect()),
            last_price: Mutex::new(first),
            swaps: Mutex::new(Vec::new()),
            receipts: Mutex::new(HashMap::new()),
            simulate_failure: Mutex::new(None),
            confirmation_delay: Duration::ZERO,
        }
    }

    pub fn with_confirmation_delay(mut self, delay: Duration) -> Self {
        self.confirmation_delay = delay;
        self
    }

    pub fn pair(&self) -> TradePair {
        self.pair.clone()
    }

    /// Fail every swap with the given error until cleared
    pub fn set_failure(&self, f: Option<fn() -> ChainError>) {
        *self.simulate_failure.lock().unwrap() = f;
    }

    pub fn swaps(&self) -> Vec<RecordedSwap> {
        self.swaps.lock().unwrap().clone()
    }

    fn current_price(&self) -> Decimal {
        *self.last_price.lock().unwrap()
    }
}

#[async_trait]
impl ChainClient for MockChainClient {
    async fn get_price(&self, token_in: &TokenInfo, _token_out: &TokenInfo) -> Result<Decimal, ChainError> {
        let next = self.script.lock().unwrap().pop_front();
        let price = match next {
            Some(price) => {
                *self.last_price.lock().unwrap() = price;
                price
            }
            None => self.current_price(),
        };

        if token_in.address == self.pair.base.address {
            Ok(price)
        } else {
            Ok(Decimal::ONE / price)
        }
    }

    async fn swap(
        &self,
        _signer: &SignerHandle,
        token_in: &TokenInfo,
        token_out: &TokenInfo,
        amount_in: Decimal,
        _slippage_pct: Decimal,
    ) -> Result<SwapSubmission, ChainError> {
        if let Some(fail) = *self.simulate_failure.lock().unwrap() {
            return Err(fail());
        }

        let price = self.current_price();
        let amount_out = if token_in.address == self.pair.base.address {
            amount_in * price
        } else {
            amount_in / price
        };

        let mut swaps = self.swaps.lock().unwrap();
        swaps.push(RecordedSwap {
            token_in: token_in.symbol.clone(),
            token_out: token_out.symbol.clone(),
            amount_in,
            price,
        });
        let tx_ref = format!("0xmock{}", swaps.len());
        drop(swaps);

        self.receipts.lock().unwrap().insert(
            tx_ref.clone(),
            TxReceipt {
                status: TxStatus::Success,
                block_ref: Some(1),
                fee_paid: Decimal::ZERO,
                amount_out: Some(amount_out),
            },
        );

        Ok(SwapSubmission {
            tx_ref,
            expected_out: Some(amount_out),
        })
    }

    async fn wait_for_confirmation(&self, tx_ref: &str) -> Result<TxReceipt, ChainError> {
        if !self.confirmation_delay.is_zero() {
            tokio::time::sleep(self.confirmation_delay).await;
        }
        self.receipts
            .lock()
            .unwrap()
            .get(tx_ref)
            .cloned()
            .ok_or_else(|| ChainError::ConfirmationTimeout {
                tx_ref: tx_ref.to_string(),
            })
    }

    async fn get_balance(&self, _signer: &SignerHandle, _token: &TokenInfo) -> Result<Decimal, ChainError> {
        Ok(Decimal::from(1_000_000))
    }

    fn name(&self) -> &str {
        "mock"
    }
}
