//! Static USD Quote Table
//!
//! Maps token addresses to symbols and symbols to USD quotes for threshold
//! comparisons (liquidity floors, profit gates, gas pricing). This is pure
//! configuration — an oracle collaborator may replace the table without
//! touching any consumer. All conversions assume 18 decimals unless the
//! universe file carries a per-token override.

use crate::types::TokenInfo;
use alloy::primitives::{Address, U256};
use once_cell::sync::Lazy;
use std::collections::HashMap;

/// Built-in quotes for the common BSC universe. Overridden by the
/// `[prices]` table in the universe file and by `USD_PRICE_MAP`.
pub static DEFAULT_USD_PRICES: Lazy<HashMap<&'static str, f64>> = Lazy::new(|| {
    HashMap::from([
        ("WBNB", 580.0),
        ("BUSD", 1.0),
        ("USDT", 1.0),
        ("USDC", 1.0),
        ("DAI", 1.0),
        ("ETH", 3300.0),
        ("BTCB", 97_000.0),
        ("CAKE", 2.4),
    ])
});

const DEFAULT_DECIMALS: u8 = 18;

/// Address → symbol → USD lookup used by every USD-denominated gate.
#[derive(Debug, Clone, Default)]
pub struct UsdQuoteTable {
    prices_by_symbol: HashMap<String, f64>,
    symbol_by_addr: HashMap<Address, String>,
    decimals_by_addr: HashMap<Address, u8>,
}

impl UsdQuoteTable {
    /// Build the table from universe tokens plus a symbol→USD price map.
    /// Prices missing from `prices` fall back to the built-in defaults.
    pub fn new(tokens: &[TokenInfo], prices: HashMap<String, f64>) -> Self {
        let mut prices_by_symbol: HashMap<String, f64> = DEFAULT_USD_PRICES
            .iter()
            .map(|(sym, price)| (sym.to_string(), *price))
            .collect();
        prices_by_symbol.extend(prices);

        let mut symbol_by_addr = HashMap::new();
        let mut decimals_by_addr = HashMap::new();
        for token in tokens {
            symbol_by_addr.insert(token.address, token.symbol.clone());
            if let Some(decimals) = token.decimals {
                decimals_by_addr.insert(token.address, decimals);
            }
        }

        Self {
            prices_by_symbol,
            symbol_by_addr,
            decimals_by_addr,
        }
    }

    pub fn symbol(&self, token: &Address) -> Option<&str> {
        self.symbol_by_addr.get(token).map(String::as_str)
    }

    pub fn decimals(&self, token: &Address) -> u8 {
        self.decimals_by_addr
            .get(token)
            .copied()
            .unwrap_or(DEFAULT_DECIMALS)
    }

    pub fn price_of_symbol(&self, symbol: &str) -> Option<f64> {
        self.prices_by_symbol.get(symbol).copied()
    }

    /// USD price of one whole token, or None for tokens outside the table.
    pub fn price_of(&self, token: &Address) -> Option<f64> {
        self.symbol(token)
            .and_then(|symbol| self.price_of_symbol(symbol))
    }

    pub fn has_price(&self, token: &Address) -> bool {
        self.price_of(token).is_some()
    }

    /// USD value of `amount` base units of `token`. Unknown tokens are
    /// worth $0 — they simply fail any liquidity or profit floor.
    pub fn usd_value(&self, amount: U256, token: &Address) -> f64 {
        let Some(price) = self.price_of(token) else {
            return 0.0;
        };
        let scale = 10f64.powi(self.decimals(token) as i32);
        u256_to_f64(amount) / scale * price
    }

    /// USD value of a native-token wei amount (gas costs). The native
    /// token is addressed by quote-table symbol, always 18 decimals.
    pub fn usd_of_native(&self, wei: u128, symbol: &str) -> f64 {
        let price = self.price_of_symbol(symbol).unwrap_or(0.0);
        wei as f64 / 1e18 * price
    }

    /// Convert a USD amount into base units of `token` (for on-chain
    /// minimum-profit thresholds). Zero for unpriced tokens.
    pub fn usd_to_units(&self, usd: f64, token: &Address) -> U256 {
        let Some(price) = self.price_of(token) else {
            return U256::ZERO;
        };
        if price <= 0.0 || usd <= 0.0 {
            return U256::ZERO;
        }
        let scale = 10f64.powi(self.decimals(token) as i32);
        f64_to_u256(usd / price * scale)
    }
}

/// Lossy but total U256 → f64 conversion (threshold math only).
pub fn u256_to_f64(value: U256) -> f64 {
    value
        .into_limbs()
        .iter()
        .enumerate()
        .map(|(i, limb)| *limb as f64 * 2f64.powi(64 * i as i32))
        .sum()
}

fn f64_to_u256(value: f64) -> U256 {
    if !value.is_finite() || value <= 0.0 {
        return U256::ZERO;
    }
    // u128 covers every realistic threshold (< 3.4e38 base units).
    U256::from(value as u128)
}
