//! Configuration management
//!
//! Runtime knobs and secrets come from the environment (`.env`
//! supported); the trading universe — venues, seed tokens, and the USD
//! quote table — comes from a TOML file. `USD_PRICE_MAP` (JSON) wins
//! over both the file and the built-in defaults.

use crate::types::{TokenInfo, Venue, DEFAULT_FEE_NUM};
use alloy::primitives::{Address, U256};
use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt::Display;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

/// Startup failures that map to documented process exit codes.
#[derive(Debug, Error)]
pub enum FatalError {
    /// Exit 1: the RPC endpoint is unreachable at startup.
    #[error("cannot reach RPC endpoint: {0}")]
    RpcConnect(String),
    /// Exit 2: execution is enabled but a required key is missing.
    #[error("execution enabled but {0} is not configured")]
    MissingExecutionConfig(&'static str),
}

impl FatalError {
    pub fn exit_code(&self) -> i32 {
        match self {
            FatalError::RpcConnect(_) => 1,
            FatalError::MissingExecutionConfig(_) => 2,
        }
    }
}

/// Keys that only matter when live execution is switched on.
#[derive(Debug, Clone)]
pub struct ExecutionKeys {
    pub private_key: String,
    pub executor: Address,
    pub beneficiary: Address,
}

/// Bot configuration
#[derive(Debug, Clone)]
pub struct BotConfig {
    // Network
    pub rpc_url: String,

    // Wallet / executor (present only when configured)
    pub private_key: Option<String>,
    pub arb_contract: Option<Address>,
    pub beneficiary: Option<Address>,

    // Live execution gate (false = detection only)
    pub enable_execution: bool,

    // Scan loop
    pub scan_interval_ms: u64,
    pub rpc_batch: usize,

    // Pool filters
    pub min_liquidity_usd: f64,
    pub stale_seconds: u64,

    // Execution gates
    pub max_slippage_bps: u64,
    pub min_profit_usd: f64,
    pub gas_risk_multiplier: f64,
    pub default_gas_limit: u64,
    pub max_gas_price_gwei: u64,
    pub min_exec_spread_pct: f64,

    // Simulation
    pub loan_amount: U256,
    pub fee_num: u32,
    pub max_tokens: usize,

    // Pricing
    pub gas_token: String,
    pub usd_prices: HashMap<String, f64>,

    // Dashboard feed (disabled when unset)
    pub ws_listen_addr: Option<String>,

    // Universe
    pub venues: Vec<Venue>,
    pub tokens: Vec<TokenInfo>,
}

impl BotConfig {
    /// Stage-A spread floor in basis points.
    pub fn min_exec_spread_bps(&self) -> u64 {
        pct_to_bps(self.min_exec_spread_pct)
    }

    /// Seed token addresses for getPair-mode discovery.
    pub fn seed_token_addresses(&self) -> Vec<Address> {
        self.tokens.iter().map(|t| t.address).collect()
    }

    /// Check the keys live execution needs; callers exit 2 on failure.
    pub fn require_execution_keys(&self) -> Result<ExecutionKeys, FatalError> {
        let private_key = self
            .private_key
            .clone()
            .ok_or(FatalError::MissingExecutionConfig("PRIVATE_KEY"))?;
        let executor = self
            .arb_contract
            .ok_or(FatalError::MissingExecutionConfig("ARB_CONTRACT"))?;
        let beneficiary = self
            .beneficiary
            .ok_or(FatalError::MissingExecutionConfig("BENEFICIARY"))?;
        Ok(ExecutionKeys {
            private_key,
            executor,
            beneficiary,
        })
    }
}

/// Percent → basis points (0.2% → 20 bps).
pub fn pct_to_bps(pct: f64) -> u64 {
    (pct * 100.0).round() as u64
}

/// Universe file layout: `[[venue]]`, `[[token]]`, `[prices]`.
#[derive(Debug, Deserialize)]
struct UniverseFile {
    #[serde(rename = "venue")]
    venues: Vec<Venue>,
    #[serde(rename = "token", default)]
    tokens: Vec<TokenInfo>,
    #[serde(default)]
    prices: HashMap<String, f64>,
}

pub fn load_config(universe_path: &Path) -> Result<BotConfig> {
    let universe_text = std::fs::read_to_string(universe_path)
        .with_context(|| format!("failed to read universe file: {}", universe_path.display()))?;
    let universe: UniverseFile =
        toml::from_str(&universe_text).context("failed to parse universe TOML")?;
    if universe.venues.is_empty() {
        return Err(anyhow!("universe file declares no venues"));
    }

    // Price precedence: built-in defaults < [prices] < USD_PRICE_MAP.
    let mut usd_prices = universe.prices;
    if let Ok(raw) = std::env::var("USD_PRICE_MAP") {
        let overrides: HashMap<String, f64> =
            serde_json::from_str(&raw).context("USD_PRICE_MAP is not a JSON object of numbers")?;
        usd_prices.extend(overrides);
    }

    Ok(BotConfig {
        rpc_url: std::env::var("RPC_URL").context("RPC_URL not set")?,

        private_key: std::env::var("PRIVATE_KEY").ok(),
        arb_contract: env_address("ARB_CONTRACT")?,
        beneficiary: env_address("BENEFICIARY")?,
        enable_execution: env_parse("ENABLE_EXECUTION", false)?,

        scan_interval_ms: env_parse("SCAN_INTERVAL_MS", 6_000)?,
        rpc_batch: env_parse("RPC_BATCH", 50)?,

        min_liquidity_usd: env_parse("MIN_LIQ_USD", 20_000.0)?,
        stale_seconds: env_parse("STALE_SECONDS", 600)?,

        max_slippage_bps: env_parse("MAX_SLIPPAGE_BPS", 50)?,
        min_profit_usd: env_parse("MIN_PROFIT_USD", 1.0)?,
        gas_risk_multiplier: env_parse("GAS_RISK_MULTIPLIER", 1.20)?,
        default_gas_limit: env_parse("DEFAULT_GAS_LIMIT", 450_000)?,
        max_gas_price_gwei: env_parse("MAX_GAS_PRICE_GWEI", 8)?,
        min_exec_spread_pct: env_parse("MIN_EXEC_SPREAD_PCT", 0.2)?,

        loan_amount: env_parse("LOAN_AMOUNT", U256::from(10u64).pow(U256::from(18u8)))?,
        fee_num: env_parse("FEE_NUM", DEFAULT_FEE_NUM)?,
        max_tokens: env_parse("MAX_TOKENS", 200)?,

        gas_token: std::env::var("GAS_TOKEN").unwrap_or_else(|_| "WBNB".to_string()),
        usd_prices,

        ws_listen_addr: std::env::var("WS_LISTEN_ADDR").ok(),

        venues: universe.venues,
        tokens: universe.tokens,
    })
}

fn env_parse<T: FromStr>(key: &str, default: T) -> Result<T>
where
    T::Err: Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .parse()
            .map_err(|e| anyhow!("invalid {}={:?}: {}", key, raw, e)),
        Err(_) => Ok(default),
    }
}

fn env_address(key: &str) -> Result<Option<Address>> {
    match std::env::var(key) {
        Ok(raw) => Address::from_str(raw.trim())
            .map(Some)
            .map_err(|e| anyhow!("invalid {}={:?}: {}", key, raw, e)),
        Err(_) => Ok(None),
    }
}
