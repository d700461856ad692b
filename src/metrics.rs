//! Engine Metrics
//!
//! Process-lifetime counters for scans, detections, and execution
//! outcomes. Owned and mutated by the scan-loop task only; consumers get
//! deep-copied snapshots over the broadcast channel. Counters accumulate
//! for the life of the run and are never reset.

use crate::arbitrage::guard::ErrorKind;
use serde::Serialize;

/// Why the execution pipeline dropped an opportunity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SkipReason {
    Validation,
    Gas,
    FinalCheck,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct EngineMetrics {
    pub scan_count: u64,
    pub last_scan_ms: u64,

    pub opps_total: u64,
    pub opps_direct: u64,
    pub opps_tri: u64,

    pub exec_attempted: u64,
    pub exec_succeeded: u64,
    pub exec_failed: u64,

    pub skipped_validation: u64,
    pub skipped_gas: u64,
    pub skipped_final_check: u64,

    pub last_error_kind: Option<ErrorKind>,
    pub net_profit_usd: f64,
}

impl EngineMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_scan(&mut self, duration_ms: u64, opps_direct: u64, opps_tri: u64) {
        self.scan_count += 1;
        self.last_scan_ms = duration_ms;
        self.opps_direct += opps_direct;
        self.opps_tri += opps_tri;
        self.opps_total += opps_direct + opps_tri;
    }

    pub fn record_execution_skip(&mut self, reason: SkipReason) {
        match reason {
            SkipReason::Validation => self.skipped_validation += 1,
            SkipReason::Gas => self.skipped_gas += 1,
            SkipReason::FinalCheck => self.skipped_final_check += 1,
        }
    }

    pub fn record_execution_attempt(&mut self) {
        self.exec_attempted += 1;
    }

    pub fn record_execution_success(&mut self, net_profit_usd: f64) {
        self.exec_succeeded += 1;
        self.net_profit_usd += net_profit_usd;
    }

    pub fn record_execution_failure(&mut self, kind: ErrorKind) {
        self.exec_failed += 1;
        self.last_error_kind = Some(kind);
    }

    /// Deep copy, safe to hand to the broadcast channel.
    pub fn snapshot(&self) -> EngineMetrics {
        self.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_accumulates() {
        let mut metrics = EngineMetrics::new();
        metrics.record_scan(120, 3, 1);
        metrics.record_scan(95, 0, 2);

        assert_eq!(metrics.scan_count, 2);
        assert_eq!(metrics.last_scan_ms, 95);
        assert_eq!(metrics.opps_direct, 3);
        assert_eq!(metrics.opps_tri, 3);
        assert_eq!(metrics.opps_total, 6);
    }

    #[test]
    fn test_skip_counters_are_separate() {
        let mut metrics = EngineMetrics::new();
        metrics.record_execution_skip(SkipReason::Validation);
        metrics.record_execution_skip(SkipReason::Validation);
        metrics.record_execution_skip(SkipReason::Gas);
        metrics.record_execution_skip(SkipReason::FinalCheck);

        assert_eq!(metrics.skipped_validation, 2);
        assert_eq!(metrics.skipped_gas, 1);
        assert_eq!(metrics.skipped_final_check, 1);
    }

    #[test]
    fn test_execution_outcomes() {
        let mut metrics = EngineMetrics::new();
        metrics.record_execution_attempt();
        metrics.record_execution_success(12.5);
        metrics.record_execution_attempt();
        metrics.record_execution_failure(ErrorKind::Revert);
        metrics.record_execution_attempt();
        metrics.record_execution_success(3.25);

        assert_eq!(metrics.exec_attempted, 3);
        assert_eq!(metrics.exec_succeeded, 2);
        assert_eq!(metrics.exec_failed, 1);
        assert_eq!(metrics.last_error_kind, Some(ErrorKind::Revert));
        assert!((metrics.net_profit_usd - 15.75).abs() < 1e-9);
    }

    #[test]
    fn test_snapshot_is_independent() {
        let mut metrics = EngineMetrics::new();
        metrics.record_scan(50, 1, 0);

        let snapshot = metrics.snapshot();
        metrics.record_scan(60, 1, 0);

        assert_eq!(snapshot.scan_count, 1);
        assert_eq!(metrics.scan_count, 2);
    }
}
