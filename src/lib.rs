//! DEX Cycle Arbitrage Engine Library
//!
//! Components for detecting and executing constant-product arbitrage
//! cycles across Uniswap-V2-style venues on one EVM chain: pool
//! scanning, cycle search, live-quote validation, and nonce-managed
//! submission to a deployed executor contract.

pub mod amm;
pub mod arbitrage;
pub mod broadcast;
pub mod config;
pub mod contracts;
pub mod engine;
pub mod metrics;
pub mod pool;
pub mod pricing;
pub mod rpc;
pub mod types;

// Re-export commonly used types
pub use arbitrage::{ExecutionGuard, ExecutionPipeline, OpportunityFinder};
pub use config::{load_config, BotConfig};
pub use engine::{EngineSettings, ScanEngine};
pub use metrics::EngineMetrics;
pub use pool::{PoolScanner, ScannerSettings, TokenGraph};
pub use pricing::UsdQuoteTable;
pub use types::{ArbPlan, Opportunity, Pool, PoolLeg, TradeResult, Venue};
