//! Nonce Manager
//!
//! Owns the nonce sequence for one signer. Every request reconciles the
//! local counter against the network's pending count and takes the max,
//! so the sequence is monotonic across the process lifetime and survives
//! restarts, dropped transactions, and out-of-band sends from the same
//! key. Callers serialize access — the scan loop holds at most one
//! in-flight trade, so there is no contention to manage here.

use alloy::primitives::Address;
use alloy::providers::Provider;
use anyhow::{Context, Result};
use tracing::debug;

pub struct NonceManager<P> {
    provider: P,
    signer: Address,
    /// Next nonce to hand out, if we have handed out any before.
    cached: Option<u64>,
}

impl<P: Provider> NonceManager<P> {
    pub fn new(provider: P, signer: Address) -> Self {
        Self {
            provider,
            signer,
            cached: None,
        }
    }

    pub fn signer(&self) -> Address {
        self.signer
    }

    /// Reserve the next nonce. Queries the network's pending count and
    /// reconciles with the local sequence; never returns the same value
    /// twice in one process lifetime.
    pub async fn next_nonce(&mut self) -> Result<u64> {
        let network = self
            .provider
            .get_transaction_count(self.signer)
            .pending()
            .await
            .context("getTransactionCount(pending) failed")?;

        let nonce = reconcile(self.cached, network);
        self.cached = Some(nonce + 1);
        debug!("nonce {} reserved (network pending {})", nonce, network);
        Ok(nonce)
    }
}

/// Pick the nonce to use given the local sequence and the network's
/// pending count. The local counter wins when it is ahead (our last send
/// has not reached the pool yet); the network wins after restarts or
/// external sends.
fn reconcile(cached: Option<u64>, network: u64) -> u64 {
    match cached {
        Some(next) => next.max(network),
        None => network,
    }
}
