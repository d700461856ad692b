//! Pool Scanner
//!
//! Discovers V2 pairs across the configured venues, reads their reserves
//! in batches, and filters the result down to fresh, liquid pools grouped
//! by canonical token pair.
//!
//! Two discovery modes:
//! - Seed-token mode (a token universe is configured): `getPair(A, B)`
//!   for every unordered token pair on every factory, zero addresses
//!   discarded.
//! - Factory enumeration (no seeds): `allPairsLength` + `allPairs(i)`.
//!   Tokens discovered this way join the universe, deduplicated by
//!   address and capped.
//!
//! Failure semantics: a factory that will not answer drops that venue for
//! the cycle with a warning; a pair that will not decode drops that pair
//! only. The scan itself never aborts the cycle.

use crate::contracts::{IUniswapV2Factory, IUniswapV2Pair};
use crate::pricing::{u256_to_f64, UsdQuoteTable};
use crate::rpc::{BatchCaller, CallRequest};
use crate::types::{Pool, PoolLeg, RawPair, Venue};
use alloy::primitives::{Address, U256};
use alloy::providers::Provider;
use alloy::rpc::types::BlockNumberOrTag;
use alloy::sol_types::SolCall;
use anyhow::{Context, Result};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct ScannerSettings {
    pub rpc_batch: usize,
    pub min_liquidity_usd: f64,
    pub stale_seconds: u64,
    pub max_tokens: usize,
    pub default_fee_num: u32,
}

pub struct PoolScanner<P> {
    provider: P,
    batch: BatchCaller<P>,
    venues: Vec<Venue>,
    quotes: Arc<UsdQuoteTable>,
    settings: ScannerSettings,
    /// Hybrid token universe: configured seeds plus factory discoveries,
    /// deduplicated by address, insertion-ordered, capped.
    known_tokens: Vec<Address>,
    token_set: HashSet<Address>,
    /// getPair mode when seeds were configured, enumeration otherwise.
    seed_mode: bool,
}

impl<P: Provider + Clone> PoolScanner<P> {
    pub fn new(
        provider: P,
        venues: Vec<Venue>,
        seed_tokens: Vec<Address>,
        quotes: Arc<UsdQuoteTable>,
        settings: ScannerSettings,
    ) -> Self {
        let batch = BatchCaller::new(provider.clone(), settings.rpc_batch);
        let seed_mode = !seed_tokens.is_empty();
        let mut scanner = Self {
            provider,
            batch,
            venues,
            quotes,
            settings,
            known_tokens: Vec::new(),
            token_set: HashSet::new(),
            seed_mode,
        };
        for token in seed_tokens {
            scanner.register_token(token);
        }
        scanner
    }

    pub fn token_universe(&self) -> &[Address] {
        &self.known_tokens
    }

    fn register_token(&mut self, token: Address) {
        if self.known_tokens.len() >= self.settings.max_tokens {
            return;
        }
        if self.token_set.insert(token) {
            self.known_tokens.push(token);
        }
    }

    /// One full scan: discover pairs, read metadata + reserves in
    /// batches, filter by freshness and liquidity, group into pools.
    pub async fn scan(&mut self) -> Result<Vec<Pool>> {
        let raw_pairs = self.enumerate_pairs().await;
        if raw_pairs.is_empty() {
            warn!("scan found no candidate pairs across {} venues", self.venues.len());
            return Ok(Vec::new());
        }
        debug!("scanning {} candidate pairs", raw_pairs.len());

        // Three parallel request sets over the same pair list.
        let token0_calls: Vec<CallRequest> = raw_pairs
            .iter()
            .map(|p| CallRequest::new(p.address, IUniswapV2Pair::token0Call {}.abi_encode()))
            .collect();
        let token1_calls: Vec<CallRequest> = raw_pairs
            .iter()
            .map(|p| CallRequest::new(p.address, IUniswapV2Pair::token1Call {}.abi_encode()))
            .collect();
        let reserve_calls: Vec<CallRequest> = raw_pairs
            .iter()
            .map(|p| CallRequest::new(p.address, IUniswapV2Pair::getReservesCall {}.abi_encode()))
            .collect();

        let token0_results = self.batch.batch_call(&token0_calls).await;
        let token1_results = self.batch.batch_call(&token1_calls).await;
        let reserve_results = self.batch.batch_call(&reserve_calls).await;

        let latest_ts = self.latest_block_timestamp().await?;
        let stale_cutoff = latest_ts.saturating_sub(self.settings.stale_seconds);

        let mut pools: Vec<Pool> = Vec::new();
        let mut pool_index: HashMap<(Address, Address), usize> = HashMap::new();
        let mut skipped = 0usize;
        let mut discovered: Vec<Address> = Vec::new();

        for (i, raw) in raw_pairs.iter().enumerate() {
            let (Some(t0_bytes), Some(t1_bytes), Some(r_bytes)) =
                (&token0_results[i], &token1_results[i], &reserve_results[i])
            else {
                skipped += 1;
                continue;
            };

            let Ok(token0) = IUniswapV2Pair::token0Call::abi_decode_returns(t0_bytes) else {
                skipped += 1;
                continue;
            };
            let Ok(token1) = IUniswapV2Pair::token1Call::abi_decode_returns(t1_bytes) else {
                skipped += 1;
                continue;
            };
            let Ok(reserves) = IUniswapV2Pair::getReservesCall::abi_decode_returns(r_bytes) else {
                skipped += 1;
                continue;
            };

            if !is_fresh(reserves.blockTimestampLast, stale_cutoff) {
                skipped += 1;
                continue;
            }

            let reserve0 = U256::from(reserves.reserve0);
            let reserve1 = U256::from(reserves.reserve1);
            if reserve0.is_zero() || reserve1.is_zero() {
                skipped += 1;
                continue;
            }

            let (token_a, token_b, reserve_a, reserve_b) =
                canonicalize(token0, token1, reserve0, reserve1);

            if !self.seed_mode {
                discovered.push(token_a);
                discovered.push(token_b);
            }

            let liquidity_usd = self.quotes.usd_value(reserve_a, &token_a)
                + self.quotes.usd_value(reserve_b, &token_b);
            if liquidity_usd < self.settings.min_liquidity_usd {
                skipped += 1;
                continue;
            }

            let venue = &self.venues[raw.venue_index];
            let leg = PoolLeg {
                venue: venue.name.clone(),
                router: venue.router,
                pair: raw.address,
                fee_num: venue.fee_num_or(self.settings.default_fee_num),
                reserve_a,
                reserve_b,
                price_ab: u256_to_f64(reserve_b) / u256_to_f64(reserve_a),
                liquidity_usd,
                last_update_ts: reserves.blockTimestampLast,
            };

            match pool_index.get(&(token_a, token_b)) {
                Some(&idx) => pools[idx].legs.push(leg),
                None => {
                    pool_index.insert((token_a, token_b), pools.len());
                    pools.push(Pool {
                        token_a,
                        token_b,
                        legs: vec![leg],
                    });
                }
            }
        }

        for token in discovered {
            self.register_token(token);
        }

        info!(
            "scan complete: {} pools ({} legs) from {} pairs, {} skipped",
            pools.len(),
            pools.iter().map(|p| p.legs.len()).sum::<usize>(),
            raw_pairs.len(),
            skipped
        );

        Ok(pools)
    }

    async fn enumerate_pairs(&self) -> Vec<RawPair> {
        if self.seed_mode {
            self.pairs_from_seed_tokens().await
        } else {
            let mut all = Vec::new();
            for venue_index in 0..self.venues.len() {
                match self.enumerate_factory(venue_index).await {
                    Ok(mut pairs) => all.append(&mut pairs),
                    Err(e) => {
                        warn!(
                            "skipping venue {} this cycle: {}",
                            self.venues[venue_index].name, e
                        );
                    }
                }
            }
            all
        }
    }

    /// Factory enumeration mode: read the pair count, then batch
    /// `allPairs(i)` for every index.
    async fn enumerate_factory(&self, venue_index: usize) -> Result<Vec<RawPair>> {
        let venue = &self.venues[venue_index];
        let factory = IUniswapV2Factory::new(venue.factory, self.provider.clone());

        let count = factory
            .allPairsLength()
            .call()
            .await
            .with_context(|| format!("allPairsLength failed for {}", venue.name))?;
        let count = count.min(U256::from(u64::MAX)).to::<u64>();
        debug!("{}: {} pairs registered on factory", venue.name, count);

        let calls: Vec<CallRequest> = (0..count)
            .map(|i| {
                CallRequest::new(
                    venue.factory,
                    IUniswapV2Factory::allPairsCall { index: U256::from(i) }.abi_encode(),
                )
            })
            .collect();

        let results = self.batch.batch_call(&calls).await;
        let pairs = results
            .iter()
            .filter_map(|bytes| {
                let bytes = bytes.as_ref()?;
                IUniswapV2Factory::allPairsCall::abi_decode_returns(bytes).ok()
            })
            .filter(|addr| *addr != Address::ZERO)
            .map(|address| RawPair { venue_index, address })
            .collect();

        Ok(pairs)
    }

    /// Seed-token mode: `getPair(A, B)` for every unordered token pair
    /// on every venue; zero address means the pair does not exist there.
    async fn pairs_from_seed_tokens(&self) -> Vec<RawPair> {
        let tokens = &self.known_tokens;
        let mut all = Vec::new();

        for (venue_index, venue) in self.venues.iter().enumerate() {
            let mut calls = Vec::new();
            for i in 0..tokens.len() {
                for j in (i + 1)..tokens.len() {
                    calls.push(CallRequest::new(
                        venue.factory,
                        IUniswapV2Factory::getPairCall {
                            tokenA: tokens[i],
                            tokenB: tokens[j],
                        }
                        .abi_encode(),
                    ));
                }
            }

            let results = self.batch.batch_call(&calls).await;
            let found = results
                .iter()
                .filter_map(|bytes| {
                    let bytes = bytes.as_ref()?;
                    IUniswapV2Factory::getPairCall::abi_decode_returns(bytes).ok()
                })
                .filter(|addr| *addr != Address::ZERO)
                .map(|address| RawPair { venue_index, address });
            let before = all.len();
            all.extend(found);
            debug!("{}: {} pairs via getPair", venue.name, all.len() - before);
        }

        all
    }

    async fn latest_block_timestamp(&self) -> Result<u64> {
        let block = self
            .provider
            .get_block_by_number(BlockNumberOrTag::Latest)
            .await
            .context("failed to fetch latest block")?
            .context("provider returned no latest block")?;
        Ok(block.header.timestamp)
    }
}

/// Order a pair so `token_a` is the smaller address (byte order equals
/// lowercased-hex lexicographic order) and orient reserves to match.
pub fn canonicalize(
    token0: Address,
    token1: Address,
    reserve0: U256,
    reserve1: U256,
) -> (Address, Address, U256, U256) {
    if token0 <= token1 {
        (token0, token1, reserve0, reserve1)
    } else {
        (token1, token0, reserve1, reserve0)
    }
}

/// A pool is fresh when its last reserve update is recent enough.
/// A zero timestamp means the pair never synced — treat as stale.
pub fn is_fresh(block_timestamp_last: u32, stale_cutoff: u64) -> bool {
    block_timestamp_last != 0 && block_timestamp_last as u64 >= stale_cutoff
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(byte: u8) -> Address {
        Address::repeat_byte(byte)
    }

    #[test]
    fn test_canonicalize_keeps_sorted_order() {
        let (a, b, ra, rb) = canonicalize(
            addr(0x01),
            addr(0x02),
            U256::from(100u64),
            U256::from(200u64),
        );
        assert_eq!(a, addr(0x01));
        assert_eq!(b, addr(0x02));
        assert_eq!(ra, U256::from(100u64));
        assert_eq!(rb, U256::from(200u64));
    }

    #[test]
    fn test_canonicalize_swaps_reversed_order() {
        let (a, b, ra, rb) = canonicalize(
            addr(0x05),
            addr(0x03),
            U256::from(100u64),
            U256::from(200u64),
        );
        assert_eq!(a, addr(0x03));
        assert_eq!(b, addr(0x05));
        // Reserves follow their tokens.
        assert_eq!(ra, U256::from(200u64));
        assert_eq!(rb, U256::from(100u64));
    }

    #[test]
    fn test_freshness_window() {
        // latest_ts = 1_000_000, STALE_SECONDS = 600 → cutoff 999_400.
        let cutoff = 1_000_000u64 - 600;
        assert!(is_fresh(999_400, cutoff));
        assert!(is_fresh(1_000_000, cutoff));
        assert!(!is_fresh(999_000, cutoff)); // 1000s old
        assert!(!is_fresh(0, cutoff)); // never synced
    }

    #[test]
    fn test_freshness_zero_cutoff() {
        // stale_seconds larger than chain age: everything non-zero passes.
        assert!(is_fresh(1, 0));
        assert!(!is_fresh(0, 0));
    }
}
