//! Scan Loop
//!
//! The periodic driver that owns the whole pipeline: scan pools, find
//! opportunities, record metrics, broadcast, and — when live execution
//! is enabled — hand the ranked list to the execution pipeline. One
//! cycle runs at a time; an execution in flight finishes before the
//! loop sleeps, and a cycle that overruns the interval starts the next
//! one immediately.

use crate::arbitrage::guard::now_ms;
use crate::arbitrage::{ExecutionGuard, ExecutionPipeline, OpportunityFinder};
use crate::broadcast::BroadcastBus;
use crate::metrics::EngineMetrics;
use crate::pool::PoolScanner;
use crate::pricing::UsdQuoteTable;
use alloy::providers::Provider;
use anyhow::Result;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub scan_interval_ms: u64,
    pub execution_enabled: bool,
}

pub struct ScanEngine<P> {
    scanner: PoolScanner<P>,
    finder: OpportunityFinder,
    pipeline: Option<ExecutionPipeline<P>>,
    guard: Arc<ExecutionGuard>,
    quotes: Arc<UsdQuoteTable>,
    metrics: EngineMetrics,
    bus: BroadcastBus,
    settings: EngineSettings,
}

impl<P: Provider + Clone> ScanEngine<P> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        scanner: PoolScanner<P>,
        finder: OpportunityFinder,
        pipeline: Option<ExecutionPipeline<P>>,
        guard: Arc<ExecutionGuard>,
        quotes: Arc<UsdQuoteTable>,
        bus: BroadcastBus,
        settings: EngineSettings,
    ) -> Self {
        Self {
            scanner,
            finder,
            pipeline,
            guard,
            quotes,
            metrics: EngineMetrics::new(),
            bus,
            settings,
        }
    }

    /// Drive scan cycles until a shutdown signal arrives.
    pub async fn run(mut self, mut shutdown: mpsc::Receiver<()>) -> Result<()> {
        info!(
            "scan loop starting: interval {}ms, execution {}",
            self.settings.scan_interval_ms,
            if self.settings.execution_enabled { "LIVE" } else { "off" }
        );

        loop {
            let started = Instant::now();

            if let Err(e) = self.run_cycle().await {
                warn!("scan cycle failed: {e:#}");
            }

            self.guard.cleanup(now_ms());

            let elapsed = started.elapsed().as_millis() as u64;
            let pause = next_sleep_ms(elapsed, self.settings.scan_interval_ms);

            tokio::select! {
                _ = shutdown.recv() => {
                    info!("shutdown signal received, stopping scan loop");
                    break;
                }
                _ = tokio::time::sleep(Duration::from_millis(pause)) => {}
            }
        }

        Ok(())
    }

    async fn run_cycle(&mut self) -> Result<()> {
        let scan_started = Instant::now();

        let pools = self.scanner.scan().await?;
        let opportunities = self.finder.find(&pools, &self.quotes);

        let direct = opportunities
            .iter()
            .filter(|o| o.kind() == "direct")
            .count() as u64;
        let tri = opportunities.len() as u64 - direct;
        let duration_ms = scan_started.elapsed().as_millis() as u64;
        self.metrics.record_scan(duration_ms, direct, tri);

        info!(
            "cycle #{}: {} pools, {} opportunities ({} direct, {} triangular) in {}ms",
            self.metrics.scan_count,
            pools.len(),
            opportunities.len(),
            direct,
            tri,
            duration_ms
        );
        if let Some(best) = opportunities.first() {
            info!("best: {}", best);
        }

        self.bus.publish("opportunities", &opportunities);
        self.bus.publish("metrics", self.metrics.snapshot());
        self.bus.publish(
            "log",
            serde_json::json!({
                "message": format!(
                    "scan #{}: {} pools, {} opportunities in {}ms",
                    self.metrics.scan_count, pools.len(), opportunities.len(), duration_ms
                ),
            }),
        );

        if self.settings.execution_enabled && !opportunities.is_empty() {
            if let Some(pipeline) = self.pipeline.as_mut() {
                if let Some(result) = pipeline.run(&opportunities, &mut self.metrics).await {
                    self.bus.publish("execution", &result);
                }
            }
        }

        Ok(())
    }
}

/// Time left in the interval; zero when the cycle overran, so the next
/// scan starts immediately.
pub fn next_sleep_ms(elapsed_ms: u64, interval_ms: u64) -> u64 {
    interval_ms.saturating_sub(elapsed_ms)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sleep_clamps_to_zero() {
        assert_eq!(next_sleep_ms(1_000, 6_000), 5_000);
        assert_eq!(next_sleep_ms(6_000, 6_000), 0);
        assert_eq!(next_sleep_ms(9_500, 6_000), 0);
    }
}
