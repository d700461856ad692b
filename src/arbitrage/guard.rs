//! Execution Guard — error classification and per-router blacklisting
//!
//! Submission and quote errors are classified into a fixed set of kinds
//! and counted against the router that produced them. A router that fails
//! three times inside a five-minute window is blacklisted for the rest of
//! that window; expired records clear themselves on the next lookup.
//!
//! Time is passed in (`now_ms`) rather than read inside, the same way the
//! route cooldown tracker takes the current block.

use dashmap::DashMap;
use serde::Serialize;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Wall-clock milliseconds for failure windows.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_millis() as u64
}

/// Failures inside the window before a router is blacklisted.
pub const FAILURE_LIMIT: u32 = 3;

/// Blacklist window in milliseconds (5 minutes).
pub const BLACKLIST_WINDOW_MS: u64 = 300_000;

/// Classified execution error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    NoLiquidity,
    Revert,
    NonceError,
    ReplacementUnderpriced,
    RateLimit,
    OutOfGas,
    Unknown,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::NoLiquidity => "NO_LIQUIDITY",
            ErrorKind::Revert => "REVERT",
            ErrorKind::NonceError => "NONCE_ERROR",
            ErrorKind::ReplacementUnderpriced => "REPLACEMENT_UNDERPRICED",
            ErrorKind::RateLimit => "RATE_LIMIT",
            ErrorKind::OutOfGas => "OUT_OF_GAS",
            ErrorKind::Unknown => "UNKNOWN",
        };
        write!(f, "{}", s)
    }
}

/// Map an error message (and any embedded JSON-RPC code) to a kind.
/// Tokens are matched case-insensitively.
pub fn classify_error(message: &str) -> ErrorKind {
    let lower = message.to_lowercase();

    if lower.contains("insufficient liquidity") {
        ErrorKind::NoLiquidity
    } else if lower.contains("execution reverted") {
        ErrorKind::Revert
    } else if lower.contains("nonce") {
        ErrorKind::NonceError
    } else if lower.contains("underpriced") {
        ErrorKind::ReplacementUnderpriced
    } else if lower.contains("rate limit") || lower.contains("-32005") || lower.contains("-32000")
    {
        ErrorKind::RateLimit
    } else if lower.contains("intrinsic gas") {
        ErrorKind::OutOfGas
    } else {
        ErrorKind::Unknown
    }
}

/// Failure history for one router.
#[derive(Debug, Clone)]
pub struct GuardRecord {
    pub failures: u32,
    pub last_failure_ms: u64,
}

/// Per-router failure tracker. Keys are lowercased hex addresses so the
/// same router never splits across checksum variants.
#[derive(Debug, Default)]
pub struct ExecutionGuard {
    records: DashMap<String, GuardRecord>,
}

impl ExecutionGuard {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(router: &alloy::primitives::Address) -> String {
        format!("{router:?}").to_lowercase()
    }

    /// Count one failure against a router.
    pub fn record_router_failure(&self, router: &alloy::primitives::Address, now_ms: u64) {
        let key = Self::key(router);
        let mut entry = self.records.entry(key).or_insert(GuardRecord {
            failures: 0,
            last_failure_ms: now_ms,
        });
        entry.failures += 1;
        entry.last_failure_ms = now_ms;
    }

    /// True while the router sits inside an active blacklist window.
    /// A record whose window has lapsed is dropped on lookup and the
    /// router is immediately usable again with a clean slate.
    pub fn should_block_router(&self, router: &alloy::primitives::Address, now_ms: u64) -> bool {
        let key = Self::key(router);
        let Some(record) = self.records.get(&key) else {
            return false;
        };

        let in_window = now_ms.saturating_sub(record.last_failure_ms) <= BLACKLIST_WINDOW_MS;
        let blocked = in_window && record.failures >= FAILURE_LIMIT;
        drop(record);

        if !in_window {
            self.records.remove(&key);
        }

        blocked
    }

    /// Drop every record whose window has lapsed. Bounds the map between
    /// lookups of routers that never come back.
    pub fn cleanup(&self, now_ms: u64) {
        self.records
            .retain(|_, record| now_ms.saturating_sub(record.last_failure_ms) <= BLACKLIST_WINDOW_MS);
    }

    pub fn active_count(&self) -> usize {
        self.records.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::Address;

    #[test]
    fn test_classify_all_kinds() {
        assert_eq!(classify_error("UniswapV2: INSUFFICIENT LIQUIDITY burned"), ErrorKind::NoLiquidity);
        assert_eq!(classify_error("Execution reverted: K"), ErrorKind::Revert);
        assert_eq!(classify_error("Nonce too low"), ErrorKind::NonceError);
        assert_eq!(classify_error("replacement transaction underpriced"), ErrorKind::ReplacementUnderpriced);
        assert_eq!(classify_error("rate limit exceeded, slow down"), ErrorKind::RateLimit);
        assert_eq!(classify_error("error code -32005"), ErrorKind::RateLimit);
        assert_eq!(classify_error("error code -32000: already known"), ErrorKind::RateLimit);
        assert_eq!(classify_error("intrinsic gas too low"), ErrorKind::OutOfGas);
        assert_eq!(classify_error("something entirely else"), ErrorKind::Unknown);
    }

    #[test]
    fn test_not_blocked_before_limit() {
        let guard = ExecutionGuard::new();
        let router = Address::repeat_byte(0x11);

        guard.record_router_failure(&router, 1_000);
        guard.record_router_failure(&router, 2_000);
        assert!(!guard.should_block_router(&router, 3_000));
    }

    #[test]
    fn test_blocked_at_limit_inside_window() {
        let guard = ExecutionGuard::new();
        let router = Address::repeat_byte(0x11);

        for t in [1_000u64, 2_000, 3_000] {
            guard.record_router_failure(&router, t);
        }
        // Three failures in the last 4 minutes → blocked.
        assert!(guard.should_block_router(&router, 3_000 + 240_000));
    }

    #[test]
    fn test_window_expiry_clears_record() {
        let guard = ExecutionGuard::new();
        let router = Address::repeat_byte(0x22);

        for t in [1_000u64, 2_000, 3_000] {
            guard.record_router_failure(&router, t);
        }
        assert!(guard.should_block_router(&router, 3_000 + BLACKLIST_WINDOW_MS));

        // One ms past the window: unblocked and forgotten.
        assert!(!guard.should_block_router(&router, 3_000 + BLACKLIST_WINDOW_MS + 1));
        assert_eq!(guard.active_count(), 0);

        // Fresh failures start a fresh count.
        guard.record_router_failure(&router, 700_000);
        assert!(!guard.should_block_router(&router, 700_001));
    }

    #[test]
    fn test_routers_tracked_independently() {
        let guard = ExecutionGuard::new();
        let bad = Address::repeat_byte(0x33);
        let good = Address::repeat_byte(0x44);

        for t in [1_000u64, 2_000, 3_000] {
            guard.record_router_failure(&bad, t);
        }
        assert!(guard.should_block_router(&bad, 4_000));
        assert!(!guard.should_block_router(&good, 4_000));
    }

    #[test]
    fn test_cleanup_drops_expired_only() {
        let guard = ExecutionGuard::new();
        let old = Address::repeat_byte(0x55);
        let recent = Address::repeat_byte(0x66);

        guard.record_router_failure(&old, 1_000);
        guard.record_router_failure(&recent, 400_000);
        assert_eq!(guard.active_count(), 2);

        guard.cleanup(400_001);
        assert_eq!(guard.active_count(), 1);
    }

    #[test]
    fn test_error_kind_display() {
        assert_eq!(ErrorKind::NoLiquidity.to_string(), "NO_LIQUIDITY");
        assert_eq!(ErrorKind::ReplacementUnderpriced.to_string(), "REPLACEMENT_UNDERPRICED");
        assert_eq!(ErrorKind::Unknown.to_string(), "UNKNOWN");
    }
}
