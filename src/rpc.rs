//! Batched eth_call Dispatch
//!
//! Fans a list of read-only calls out in bounded-parallel chunks so one
//! scan can read hundreds of pairs without serializing round-trips or
//! tripping provider rate limits. One bad call never fails its neighbors:
//! the result vector always has exactly one slot per request, `None`
//! marking the individual failures.
//!
//! Rate-limited calls (code -32005/-32000 or a "rate limit" message) are
//! retried with linear backoff plus jitter; any other error gives up the
//! slot immediately and scanning moves on.

use alloy::primitives::{Address, Bytes};
use alloy::providers::Provider;
use alloy::rpc::types::TransactionRequest;
use futures::future::join_all;
use tracing::{debug, warn};

/// Retries per call before the slot becomes `None`.
const MAX_RETRIES: u32 = 5;

/// Base backoff unit; attempt N sleeps `N * BASE_DELAY_MS * (1 + rand)`.
const BASE_DELAY_MS: u64 = 150;

/// One read-only call: target contract + ABI-encoded calldata.
#[derive(Debug, Clone)]
pub struct CallRequest {
    pub to: Address,
    pub data: Bytes,
}

impl CallRequest {
    pub fn new(to: Address, data: impl Into<Bytes>) -> Self {
        Self { to, data: data.into() }
    }
}

/// Chunked eth_call dispatcher. At most `batch_size` calls in flight.
#[derive(Debug, Clone)]
pub struct BatchCaller<P> {
    provider: P,
    batch_size: usize,
}

impl<P: Provider + Clone> BatchCaller<P> {
    pub fn new(provider: P, batch_size: usize) -> Self {
        Self {
            provider,
            batch_size: batch_size.max(1),
        }
    }

    /// Execute every call, preserving input order. The output always has
    /// `calls.len()` entries; failed calls become `None`.
    pub async fn batch_call(&self, calls: &[CallRequest]) -> Vec<Option<Bytes>> {
        let mut results = Vec::with_capacity(calls.len());

        for chunk in calls.chunks(self.batch_size) {
            let chunk_results =
                join_all(chunk.iter().map(|call| self.call_with_retry(call))).await;
            results.extend(chunk_results);
        }

        results
    }

    async fn call_with_retry(&self, call: &CallRequest) -> Option<Bytes> {
        let tx = TransactionRequest::default()
            .to(call.to)
            .input(call.data.clone().into());

        for attempt in 1..=MAX_RETRIES {
            match self.provider.call(tx.clone()).await {
                Ok(bytes) => return Some(bytes),
                Err(e) => {
                    let message = e.to_string();
                    if !is_rate_limited(&message) {
                        debug!("eth_call to {:?} failed: {}", call.to, message);
                        return None;
                    }
                    if attempt == MAX_RETRIES {
                        warn!(
                            "eth_call to {:?} rate-limited after {} attempts",
                            call.to, MAX_RETRIES
                        );
                        return None;
                    }
                    let delay = backoff_delay_ms(attempt, rand::random::<f64>());
                    debug!(
                        "rate limited (attempt {}/{}), backing off {}ms",
                        attempt, MAX_RETRIES, delay
                    );
                    tokio::time::sleep(tokio::time::Duration::from_millis(delay)).await;
                }
            }
        }

        None
    }
}

/// Provider rate-limit detection: JSON-RPC codes -32005/-32000 or an
/// explicit "rate limit" message, matched case-insensitively.
pub fn is_rate_limited(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("rate limit") || lower.contains("-32005") || lower.contains("-32000")
}

/// Backoff for retry `attempt` (1-based) with `jitter` in [0, 1).
fn backoff_delay_ms(attempt: u32, jitter: f64) -> u64 {
    let base = BASE_DELAY_MS * attempt as u64;
    (base as f64 * (1.0 + jitter)) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limit_detection() {
        assert!(is_rate_limited("Rate Limit exceeded"));
        assert!(is_rate_limited("server returned an error response: error code -32005"));
        assert!(is_rate_limited("error code -32000: header not found"));
        assert!(!is_rate_limited("execution reverted"));
        assert!(!is_rate_limited("connection refused"));
    }

    #[test]
    fn test_backoff_scales_with_attempt() {
        assert_eq!(backoff_delay_ms(1, 0.0), 150);
        assert_eq!(backoff_delay_ms(3, 0.0), 450);
        // Full jitter doubles the delay.
        assert_eq!(backoff_delay_ms(2, 0.999), (300.0 * 1.999) as u64);
    }

    #[test]
    fn test_backoff_bounds() {
        for attempt in 1..=MAX_RETRIES {
            let jitter = 0.5;
            let delay = backoff_delay_ms(attempt, jitter);
            let base = BASE_DELAY_MS * attempt as u64;
            assert!(delay >= base);
            assert!(delay < base * 2);
        }
    }
}
