//! Live chain client backed by a swap gateway and the node's JSON-RPC

use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{ChainClient, Result, SignerHandle, SwapSubmission, TxReceipt, TxStatus};
use crate::amount::{from_raw_amount, to_raw_amount, TokenInfo};
use crate::config::ExecutionConfig;
use crate::error::ChainError;

/// Native token decimals, used for gas fees
const NATIVE_DECIMALS: u8 = 18;

/// Client for the AMM swap gateway and chain RPC
pub struct HttpChainClient {
    client: Client,
    gateway_url: String,
    rpc_url: String,
    router_address: String,
    execution: ExecutionConfig,
}

impl HttpChainClient {
    /// Create new chain client
    pub fn new(
        gateway_url: &str,
        rpc_url: &str,
        router_address: &str,
        execution: ExecutionConfig,
    ) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            gateway_url: gateway_url.trim_end_matches('/').to_string(),
            rpc_url: rpc_url.to_string(),
            router_address: router_address.to_string(),
            execution,
        })
    }

    async fn gateway_error(response: reqwest::Response) -> ChainError {
        let status = response.status();
        let text = response.text().await.unwrap_or_default();

        match serde_json::from_str::<GatewayError>(&text) {
            Ok(err) if err.code.starts_with("INSUFFICIENT") => {
                ChainError::InsufficientFunds(err.message)
            }
            Ok(err) => ChainError::from_message(format!("{} ({}): {}", status, err.code, err.message)),
            Err(_) => ChainError::from_message(format!("{} - {}", status, text)),
        }
    }

    async fn fetch_receipt(&self, tx_ref: &str) -> Result<Option<RpcReceipt>> {
        let req = RpcRequest {
            jsonrpc: "2.0",
            id: 1,
            method: "eth_getTransactionReceipt",
            params: vec![tx_ref.to_string()],
        };

        let response = self.client.post(&self.rpc_url).json(&req).send().await?;
        if !response.status().is_success() {
            return Err(ChainError::Rpc(format!(
                "Receipt request failed: {}",
                response.status()
            )));
        }

        let body: RpcResponse<RpcReceipt> = response
            .json()
            .await
            .map_err(|e| ChainError::InvalidResponse(e.to_string()))?;

        if let Some(err) = body.error {
            return Err(ChainError::from_message(err.message));
        }
        Ok(body.result)
    }
}

#[async_trait]
impl ChainClient for HttpChainClient {
    async fn get_price(&self, token_in: &TokenInfo, token_out: &TokenInfo) -> Result<Decimal> {
        let url = format!("{}/price", self.gateway_url);
        debug!("Fetching price {}->{} from {}", token_in.symbol, token_out.symbol, url);

        let response = self
            .client
            .get(&url)
            .query(&[
                ("tokenIn", token_in.address.as_str()),
                ("tokenOut", token_out.address.as_str()),
                ("router", self.router_address.as_str()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::gateway_error(response).await);
        }

        let data: PriceResponse = response
            .json()
            .await
            .map_err(|e| ChainError::InvalidResponse(e.to_string()))?;

        let price: Decimal = data
            .price
            .parse()
            .map_err(|e| ChainError::InvalidResponse(format!("price {:?}: {}", data.price, e)))?;

        if price <= Decimal::ZERO {
            return Err(ChainError::InvalidPrice {
                pair: format!("{}/{}", token_in.symbol, token_out.symbol),
                price,
            });
        }
        Ok(price)
    }

    async fn swap(
        &self,
        signer: &SignerHandle,
        token_in: &TokenInfo,
        token_out: &TokenInfo,
        amount_in: Decimal,
        slippage_pct: Decimal,
    ) -> Result<SwapSubmission> {
        let raw_in = to_raw_amount(amount_in, token_in.decimals)
            .map_err(|e| ChainError::InvalidAmount(format!("{} {}: {}", amount_in, token_in.symbol, e)))?;

        let req = SwapRequest {
            from: signer.address.clone(),
            router: self.router_address.clone(),
            token_in: token_in.address.clone(),
            token_out: token_out.address.clone(),
            amount_in: raw_in.to_string(),
            slippage_pct: slippage_pct.to_string(),
        };

        let url = format!("{}/swap", self.gateway_url);
        let response = self.client.post(&url).json(&req).send().await?;

        if !response.status().is_success() {
            let err = Self::gateway_error(response).await;
            warn!("Swap {} {} -> {} rejected: {}", amount_in, token_in.symbol, token_out.symbol, err);
            return Err(err);
        }

        let data: SwapResponse = response
            .json()
            .await
            .map_err(|e| ChainError::InvalidResponse(e.to_string()))?;

        let expected_out = match data.expected_out {
            Some(raw) => {
                let raw: u128 = raw
                    .parse()
                    .map_err(|e| ChainError::InvalidResponse(format!("expectedOut: {}", e)))?;
                from_raw_amount(raw, token_out.decimals).ok()
            }
            None => None,
        };

        info!(
            "Swap submitted: {} {} -> {} | tx {}",
            amount_in, token_in.symbol, token_out.symbol, data.tx_hash
        );

        Ok(SwapSubmission {
            tx_ref: data.tx_hash,
            expected_out,
        })
    }

    async fn wait_for_confirmation(&self, tx_ref: &str) -> Result<TxReceipt> {
        let deadline = tokio::time::Instant::now()
            + Duration::from_secs(self.execution.confirm_timeout_secs);
        let poll = Duration::from_millis(self.execution.receipt_poll_ms.max(100));

        loop {
            match self.fetch_receipt(tx_ref).await {
                Ok(Some(receipt)) => return receipt.into_receipt(),
                Ok(None) => debug!("Receipt for {} not yet available", tx_ref),
                // Node hiccups while polling are not fatal until the deadline
                Err(ChainError::Rpc(e)) => warn!("Receipt poll for {} failed: {}", tx_ref, e),
                Err(e) => return Err(e),
            }

            if tokio::time::Instant::now() + poll > deadline {
                return Err(ChainError::ConfirmationTimeout {
                    tx_ref: tx_ref.to_string(),
                });
            }
            tokio::time::sleep(poll).await;
        }
    }

    async fn get_balance(&self, signer: &SignerHandle, token: &TokenInfo) -> Result<Decimal> {
        let url = format!("{}/balance", self.gateway_url);
        let response = self
            .client
            .get(&url)
            .query(&[
                ("owner", signer.address.as_str()),
                ("token", token.address.as_str()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::gateway_error(response).await);
        }

        let data: BalanceResponse = response
            .json()
            .await
            .map_err(|e| ChainError::InvalidResponse(e.to_string()))?;
        let raw: u128 = data
            .balance
            .parse()
            .map_err(|e| ChainError::InvalidResponse(format!("balance: {}", e)))?;

        from_raw_amount(raw, token.decimals).map_err(|e| ChainError::InvalidResponse(e.to_string()))
    }

    fn name(&self) -> &str {
        "http"
    }
}

#[derive(Debug, Deserialize)]
struct PriceResponse {
    price: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SwapRequest {
    from: String,
    router: String,
    token_in: String,
    token_out: String,
    /// Raw integer amount as a decimal string
    amount_in: String,
    slippage_pct: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SwapResponse {
    tx_hash: String,
    #[serde(default)]
    expected_out: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BalanceResponse {
    balance: String,
}

#[derive(Debug, Deserialize)]
struct GatewayError {
    code: String,
    message: String,
}

#[derive(Debug, Serialize)]
struct RpcRequest {
    jsonrpc: &'static str,
    id: u64,
    method: &'static str,
    params: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcReceipt {
    status: String,
    block_number: Option<String>,
    gas_used: Option<String>,
    effective_gas_price: Option<String>,
}

impl RpcReceipt {
    fn into_receipt(self) -> Result<TxReceipt> {
        let status = match parse_hex(&self.status)? {
            1 => TxStatus::Success,
            _ => TxStatus::Reverted,
        };
        let block_ref = self
            .block_number
            .as_deref()
            .map(parse_hex)
            .transpose()?
            .map(|b| b as u64);

        let gas_used = self.gas_used.as_deref().map(parse_hex).transpose()?.unwrap_or(0);
        let gas_price = self
            .effective_gas_price
            .as_deref()
            .map(parse_hex)
            .transpose()?
            .unwrap_or(0);
        let fee_paid = from_raw_amount(gas_used.saturating_mul(gas_price), NATIVE_DECIMALS)
            .unwrap_or(Decimal::ZERO);

        Ok(TxReceipt {
            status,
            block_ref,
            fee_paid,
            amount_out: None,
        })
    }
}

fn parse_hex(value: &str) -> Result<u128> {
    let digits = value.trim_start_matches("0x");
    if digits.is_empty() {
        return Ok(0);
    }
    u128::from_str_radix(digits, 16)
        .map_err(|e| ChainError::InvalidResponse(format!("hex quantity {:?}: {}", value, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hex() {
        assert_eq!(parse_hex("0x1").unwrap(), 1);
        assert_eq!(parse_hex("0x").unwrap(), 0);
        assert_eq!(parse_hex("0x2a").unwrap(), 42);
        assert!(parse_hex("0xzz").is_err());
    }

    #[test]
    fn test_receipt_conversion() {
        let receipt = RpcReceipt {
            status: "0x1".to_string(),
            block_number: Some("0x10".to_string()),
            // 100_000 gas at 3 gwei
            gas_used: Some("0x186a0".to_string()),
            effective_gas_price: Some("0xb2d05e00".to_string()),
        }
        .into_receipt()
        .unwrap();

        assert_eq!(receipt.status, TxStatus::Success);
        assert_eq!(receipt.block_ref, Some(16));
        assert_eq!(receipt.fee_paid, Decimal::from_str_exact("0.0003").unwrap());

        let reverted = RpcReceipt {
            status: "0x0".to_string(),
            block_number: None,
            gas_used: None,
            effective_gas_price: None,
        }
        .into_receipt()
        .unwrap();
        assert_eq!(reverted.status, TxStatus::Reverted);
    }

    #[test]
    fn test_rpc_response_optional_fields() {
        let pending: RpcResponse<RpcReceipt> =
            serde_json::from_str(r#"{"jsonrpc":"2.0","id":1}"#).unwrap();
        assert!(pending.result.is_none());
        assert!(pending.error.is_none());

        let failed: RpcResponse<RpcReceipt> = serde_json::from_str(
            r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32000,"message":"header not found"}}"#,
        )
        .unwrap();
        assert_eq!(failed.error.unwrap().message, "header not found");
    }
}
