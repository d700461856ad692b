// Core data structures for the scan → detect → execute pipeline.

use alloy::primitives::{Address, U256};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Constant-product fee numerator over [`FEE_DENOM`].
/// 9975/10000 = 0.25% swap fee (PancakeSwap-style V2 forks).
/// Overridable globally via config and per venue in the universe file.
pub const DEFAULT_FEE_NUM: u32 = 9975;

/// Fee denominator for the constant-product formula.
pub const FEE_DENOM: u32 = 10_000;

/// A DEX deployment we scan: one router + one factory.
/// Immutable, loaded from the universe file at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Venue {
    pub name: String,
    pub router: Address,
    pub factory: Address,
    /// Per-venue swap fee numerator; falls back to the configured default.
    pub fee_num: Option<u32>,
}

impl Venue {
    pub fn fee_num_or(&self, default: u32) -> u32 {
        self.fee_num.unwrap_or(default)
    }
}

/// Token universe entry (static seed or dynamically discovered).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenInfo {
    pub symbol: String,
    pub address: Address,
    /// ERC-20 decimals override; 18 assumed when absent.
    pub decimals: Option<u8>,
}

/// A pair address enumerated from a factory, before metadata is known.
#[derive(Debug, Clone)]
pub struct RawPair {
    pub venue_index: usize,
    pub address: Address,
}

/// One physical pool on one venue, oriented to its parent [`Pool`]'s
/// canonical `(token_a, token_b)` order.
#[derive(Debug, Clone, Serialize)]
pub struct PoolLeg {
    pub venue: String,
    pub router: Address,
    pub pair: Address,
    pub fee_num: u32,
    pub reserve_a: U256,
    pub reserve_b: U256,
    /// Spot price token_b per token_a (raw reserve ratio, ranking only).
    pub price_ab: f64,
    pub liquidity_usd: f64,
    pub last_update_ts: u32,
}

/// All legs for one canonical token pair. Invariant: `token_a < token_b`
/// (byte order == lowercased-hex lexicographic order) and every leg's
/// reserves are oriented to match.
#[derive(Debug, Clone, Serialize)]
pub struct Pool {
    pub token_a: Address,
    pub token_b: Address,
    pub legs: Vec<PoolLeg>,
}

impl Pool {
    pub fn key(&self) -> (Address, Address) {
        (self.token_a, self.token_b)
    }
}

/// Directed edge in the token graph. Two edges per leg, one per direction.
/// Edges snapshot reserve values; nothing is shared across scans.
#[derive(Debug, Clone)]
pub struct Edge {
    pub token_in: Address,
    pub token_out: Address,
    pub venue: String,
    pub router: Address,
    pub pair: Address,
    pub fee_num: u32,
    pub reserve_in: U256,
    pub reserve_out: U256,
}

/// A simple path through the token graph. Invariant:
/// `edges[i].token_in == tokens[i] && edges[i].token_out == tokens[i+1]`.
#[derive(Debug, Clone)]
pub struct Path {
    pub tokens: Vec<Address>,
    pub edges: Vec<Edge>,
}

impl Path {
    /// A cycle starts and ends on the same token with at least 2 edges.
    pub fn is_cycle(&self) -> bool {
        self.edges.len() >= 2 && self.tokens.first() == self.tokens.last()
    }

    /// Number of distinct venues traversed.
    pub fn venue_count(&self) -> usize {
        let mut venues: Vec<&str> = self.edges.iter().map(|e| e.venue.as_str()).collect();
        venues.sort_unstable();
        venues.dedup();
        venues.len()
    }
}

/// A detected arbitrage opportunity. The set of kinds is closed — every
/// consumer (plan builder, scorer, logger) branches on the tag.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Opportunity {
    /// Two legs of the same pool on different venues: buy A→B cheap,
    /// sell B→A expensive.
    Direct {
        token_a: Address,
        token_b: Address,
        buy_leg: PoolLeg,
        sell_leg: PoolLeg,
        amount_in: U256,
        amount_out: U256,
        profit: U256,
        profit_pct: f64,
    },
    /// Closed cycle of 2–3 hops across at least two venues, starting and
    /// ending on the loan token.
    Triangular {
        tokens: Vec<Address>,
        venues: Vec<String>,
        routers: Vec<Address>,
        pairs: Vec<Address>,
        amount_in: U256,
        amount_out: U256,
        profit: U256,
        profit_pct: f64,
    },
}

impl Opportunity {
    pub fn profit(&self) -> U256 {
        match self {
            Opportunity::Direct { profit, .. } => *profit,
            Opportunity::Triangular { profit, .. } => *profit,
        }
    }

    /// Profit as a fraction of the loan (f64 for ranking only — every
    /// gate re-derives the exact integer ratio).
    pub fn profit_pct(&self) -> f64 {
        match self {
            Opportunity::Direct { profit_pct, .. } => *profit_pct,
            Opportunity::Triangular { profit_pct, .. } => *profit_pct,
        }
    }

    pub fn amount_in(&self) -> U256 {
        match self {
            Opportunity::Direct { amount_in, .. } => *amount_in,
            Opportunity::Triangular { amount_in, .. } => *amount_in,
        }
    }

    /// The token borrowed at cycle start (and returned at cycle end).
    pub fn loan_token(&self) -> Address {
        match self {
            Opportunity::Direct { token_a, .. } => *token_a,
            Opportunity::Triangular { tokens, .. } => tokens[0],
        }
    }

    /// Number of swap hops required to realize the opportunity.
    pub fn hop_count(&self) -> usize {
        match self {
            Opportunity::Direct { .. } => 2,
            Opportunity::Triangular { routers, .. } => routers.len(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Opportunity::Direct { .. } => "direct",
            Opportunity::Triangular { .. } => "triangular",
        }
    }
}

impl fmt::Display for Opportunity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Opportunity::Direct {
                buy_leg, sell_leg, profit, profit_pct, ..
            } => write!(
                f,
                "direct {}→{} profit={} ({:.4}%)",
                buy_leg.venue,
                sell_leg.venue,
                profit,
                profit_pct * 100.0
            ),
            Opportunity::Triangular {
                venues, profit, profit_pct, ..
            } => write!(
                f,
                "triangular {} profit={} ({:.4}%)",
                venues.join("→"),
                profit,
                profit_pct * 100.0
            ),
        }
    }
}

/// One swap hop of an execution plan. `amount_in == 0` on steps after the
/// first tells the executor contract to spend its full intermediate balance.
#[derive(Debug, Clone, Serialize)]
pub struct SwapAction {
    pub router: Address,
    pub path: Vec<Address>,
    pub amount_in: U256,
    pub min_out: U256,
}

/// Multi-hop plan submitted to the executor contract.
#[derive(Debug, Clone, Serialize)]
pub struct ArbPlan {
    pub loan_token: Address,
    pub loan_amount: U256,
    pub min_profit: U256,
    pub beneficiary: Address,
    pub steps: Vec<SwapAction>,
}

/// Outcome of one execution attempt, for logging and the dashboard feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeResult {
    pub opportunity: String,
    pub tx_hash: Option<String>,
    pub block_number: Option<u64>,
    pub success: bool,
    pub profit_usd: f64,
    pub gas_cost_usd: f64,
    pub net_profit_usd: f64,
    pub execution_time_ms: u64,
    pub error: Option<String>,
}
