//! Amount handling utilities for ERC-20 token decimals

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Token metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenInfo {
    pub address: String,
    pub symbol: String,
    pub decimals: u8,
}

impl TokenInfo {
    pub fn new(symbol: &str, address: &str, decimals: u8) -> Self {
        Self {
            address: address.to_string(),
            symbol: symbol.to_string(),
            decimals,
        }
    }
}

/// Convert UI amount (human readable) to raw integer amount
///
/// Fractions below the token's smallest unit are truncated.
pub fn to_raw_amount(ui_amount: Decimal, decimals: u8) -> anyhow::Result<u128> {
    if ui_amount < Decimal::ZERO {
        return Err(anyhow::anyhow!("Amount cannot be negative: {}", ui_amount));
    }

    let multiplier = Decimal::from(10u64.pow(decimals as u32));
    let raw = ui_amount
        .checked_mul(multiplier)
        .and_then(|r| r.trunc().to_u128())
        .ok_or_else(|| {
            anyhow::anyhow!("Amount {} with {} decimals overflows", ui_amount, decimals)
        })?;

    if raw == 0 && ui_amount > Decimal::ZERO {
        return Err(anyhow::anyhow!(
            "Amount {} too small for {} decimals (rounds to 0)",
            ui_amount,
            decimals
        ));
    }

    Ok(raw)
}

/// Convert raw integer amount to UI amount (human readable)
pub fn from_raw_amount(raw_amount: u128, decimals: u8) -> anyhow::Result<Decimal> {
    let raw = i128::try_from(raw_amount)
        .map_err(|_| anyhow::anyhow!("Raw amount {} out of range", raw_amount))?;
    Decimal::try_from_i128_with_scale(raw, decimals as u32)
        .map(|d| d.normalize())
        .map_err(|e| anyhow::anyhow!("Raw amount {} not representable: {}", raw_amount, e))
}

/// Look up a well-known token on the target chain by symbol or address
pub fn get_token_info(symbol_or_address: &str) -> Option<TokenInfo> {
    let key = symbol_or_address.to_lowercase();
    let info = match key.as_str() {
        "wbnb" | "bnb" | "0xbb4cdb9cbd36b01bd1cbaebf2de08d9173bc095c" => TokenInfo::new(
            "WBNB",
            "0xbb4CdB9CBd36B01bD1cBaEBF2De08d9173bc095c",
            18,
        ),
        "usdt" | "0x55d398326f99059ff775485246999027b3197955" => TokenInfo::new(
            "USDT",
            "0x55d398326f99059fF775485246999027B3197955",
            18,
        ),
        "usdc" | "0x8ac76a51cc950d9822d68b83fe1ad97b32cd580d" => TokenInfo::new(
            "USDC",
            "0x8AC76a51cc950d9822D68b83fE1Ad97B32Cd580d",
            18,
        ),
        "busd" | "0xe9e7cea3dedca5984780bafc599bd69add087d56" => TokenInfo::new(
            "BUSD",
            "0xe9e7CEA3DedcA5984780Bafc599bD69ADd087D56",
            18,
        ),
        "cake" | "0x0e09fabb73bd3ade0a17ecc321fd13a19e81ce82" => TokenInfo::new(
            "CAKE",
            "0x0E09FaBB73Bd3Ade0a17ECC321fD13a19e81cE82",
            18,
        ),
        _ => return None,
    };

    Some(info)
}

/// Whether the string is a 20-byte hex address
pub fn is_address(s: &str) -> bool {
    s.len() == 42 && s.starts_with("0x") && s[2..].chars().all(|c| c.is_ascii_hexdigit())
}

/// Resolve a symbol or address into token metadata
///
/// Unknown addresses are accepted with 18 decimals.
pub fn resolve_token(symbol_or_address: &str) -> anyhow::Result<TokenInfo> {
    if let Some(info) = get_token_info(symbol_or_address) {
        Ok(info)
    } else if is_address(symbol_or_address) {
        Ok(TokenInfo::new(symbol_or_address, symbol_or_address, 18))
    } else {
        Err(anyhow::anyhow!(
            "Unknown symbol or invalid address: {}",
            symbol_or_address
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_raw_amount() {
        let one = Decimal::from(1);
        assert_eq!(to_raw_amount(one, 18).unwrap(), 1_000_000_000_000_000_000);
        assert_eq!(to_raw_amount(one, 6).unwrap(), 1_000_000);

        let half = Decimal::from_str_exact("0.5").unwrap();
        assert_eq!(to_raw_amount(half, 18).unwrap(), 500_000_000_000_000_000);

        // Too small (rounds to 0)
        let tiny = Decimal::from_str_exact("0.0000001").unwrap();
        assert!(to_raw_amount(tiny, 6).is_err());

        assert!(to_raw_amount(Decimal::from(-1), 6).is_err());
    }

    #[test]
    fn test_from_raw_amount() {
        assert_eq!(
            from_raw_amount(1_000_000_000_000_000_000, 18).unwrap(),
            Decimal::from(1)
        );
        assert_eq!(
            from_raw_amount(6_250_000_000_000_000_000, 18).unwrap(),
            Decimal::from_str_exact("6.25").unwrap()
        );
    }

    #[test]
    fn test_token_lookup() {
        let usdt = get_token_info("USDT").unwrap();
        assert_eq!(usdt.decimals, 18);
        let by_addr = get_token_info("0x55d398326f99059fF775485246999027B3197955").unwrap();
        assert_eq!(by_addr.symbol, "USDT");

        assert!(resolve_token("0x0000000000000000000000000000000000000001").is_ok());
        assert!(resolve_token("NOPE").is_err());
    }
}
