//! Execution Pipeline
//!
//! Takes the ranked opportunity list and tries to turn the best entry
//! into a confirmed transaction, in stages:
//!
//!   select → build plan → validate (live router quotes, slippage fill)
//!          → gas model → final re-validation → submit → settle
//!
//! An opportunity never bypasses an earlier stage. Each gate that drops
//! it bumps its own skip counter; submission failures are classified and
//! fed back into the per-router blacklist. At most one trade is in
//! flight per signer — the scan loop waits for settlement before the
//! next cycle.

use crate::arbitrage::guard::{classify_error, now_ms, ErrorKind, ExecutionGuard};
use crate::arbitrage::nonce::NonceManager;
use crate::contracts::{IArbExecutor, IUniswapV2Router02};
use crate::metrics::{EngineMetrics, SkipReason};
use crate::pricing::UsdQuoteTable;
use crate::types::{ArbPlan, Opportunity, SwapAction, TradeResult};
use alloy::primitives::{Address, U256};
use alloy::providers::Provider;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Default gwei fallback when the provider reports no gas price.
const FALLBACK_GAS_PRICE_WEI: u128 = 3_000_000_000;

/// Headroom multiplier applied to gas estimates (×1.25).
const GAS_PAD_NUM: u64 = 125;
const GAS_PAD_DEN: u64 = 100;

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Stage-A floor on profit/loan, in basis points.
    pub min_exec_spread_bps: u64,
    /// Per-hop slippage allowance applied to quoted outputs.
    pub max_slippage_bps: u64,
    /// Validation floor on USD profit.
    pub min_profit_usd: f64,
    /// Required profit/gas-cost ratio.
    pub gas_risk_multiplier: f64,
    /// Used when estimateGas fails.
    pub default_gas_limit: u64,
    /// Gas price ceiling.
    pub max_gas_price_gwei: u64,
    /// Quote-table symbol of the chain's native token.
    pub gas_token: String,
}

struct Validated {
    final_out: U256,
    profit_usd: f64,
}

pub struct ExecutionPipeline<P> {
    provider: P,
    executor: Address,
    beneficiary: Address,
    sender: Address,
    settings: PipelineSettings,
    quotes: Arc<UsdQuoteTable>,
    guard: Arc<ExecutionGuard>,
    nonce: NonceManager<P>,
}

impl<P: Provider + Clone> ExecutionPipeline<P> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        provider: P,
        executor: Address,
        beneficiary: Address,
        sender: Address,
        settings: PipelineSettings,
        quotes: Arc<UsdQuoteTable>,
        guard: Arc<ExecutionGuard>,
    ) -> Self {
        let nonce = NonceManager::new(provider.clone(), sender);
        Self {
            provider,
            executor,
            beneficiary,
            sender,
            settings,
            quotes,
            guard,
            nonce,
        }
    }

    /// Run the full pipeline against a ranked opportunity list.
    /// Returns the trade result when a transaction was submitted (win or
    /// on-chain revert); `None` when a gate dropped the attempt or
    /// submission failed before landing.
    pub async fn run(
        &mut self,
        opportunities: &[Opportunity],
        metrics: &mut EngineMetrics,
    ) -> Option<TradeResult> {
        let opp = opportunities.first()?;

        if !meets_spread_floor(
            opp.profit(),
            opp.amount_in(),
            self.settings.min_exec_spread_bps,
        ) {
            debug!("best opportunity below execution spread floor: {}", opp);
            return None;
        }

        let started = Instant::now();
        let min_profit = self
            .quotes
            .usd_to_units(self.settings.min_profit_usd, &opp.loan_token());
        let mut plan = build_plan(opp, min_profit, self.beneficiary);

        // Validate against live router quotes, filling min_out per hop.
        let Some(validated) = self.validate_plan(&mut plan).await else {
            metrics.record_execution_skip(SkipReason::Validation);
            return None;
        };
        debug!(
            "validated: {} in → {} out (${:.2})",
            plan.loan_amount, validated.final_out, validated.profit_usd
        );

        // Price the gas and demand the profit covers it with margin.
        let (gas_limit, gas_price, gas_cost_usd) = self.gas_model(&plan).await;
        if !clears_gas_gate(
            validated.profit_usd,
            gas_cost_usd,
            self.settings.gas_risk_multiplier,
        ) {
            debug!(
                "gas gate: profit ${:.2} < ${:.2} × {:.2}",
                validated.profit_usd, gas_cost_usd, self.settings.gas_risk_multiplier
            );
            metrics.record_execution_skip(SkipReason::Gas);
            return None;
        }

        // Quotes decay between detection and submission — re-walk the
        // plan and demand the edge held up.
        let Some(fresh_out) = self.quote_walk(&plan).await else {
            metrics.record_execution_skip(SkipReason::FinalCheck);
            return None;
        };
        if fresh_out <= plan.loan_amount {
            metrics.record_execution_skip(SkipReason::FinalCheck);
            return None;
        }
        let fresh_profit_usd = self
            .quotes
            .usd_value(fresh_out - plan.loan_amount, &plan.loan_token);
        if !clears_gas_gate(fresh_profit_usd, gas_cost_usd, self.settings.gas_risk_multiplier)
            || !retains_enough(fresh_profit_usd, validated.profit_usd)
        {
            debug!(
                "final check: fresh ${:.2} vs validated ${:.2}",
                fresh_profit_usd, validated.profit_usd
            );
            metrics.record_execution_skip(SkipReason::FinalCheck);
            return None;
        }

        // Submit and settle.
        match self
            .submit(&plan, gas_limit, gas_price, metrics)
            .await
        {
            Ok((tx_hash, block_number, confirmed)) => {
                let execution_time_ms = started.elapsed().as_millis() as u64;
                if confirmed {
                    let net_profit_usd = fresh_profit_usd - gas_cost_usd;
                    metrics.record_execution_success(net_profit_usd);
                    info!(
                        "trade confirmed {} | gross ${:.2} gas ${:.2} net ${:.2}",
                        tx_hash, fresh_profit_usd, gas_cost_usd, net_profit_usd
                    );
                    Some(TradeResult {
                        opportunity: opp.to_string(),
                        tx_hash: Some(tx_hash),
                        block_number,
                        success: true,
                        profit_usd: fresh_profit_usd,
                        gas_cost_usd,
                        net_profit_usd,
                        execution_time_ms,
                        error: None,
                    })
                } else {
                    warn!("trade reverted on-chain: {}", tx_hash);
                    metrics.record_execution_failure(ErrorKind::Revert);
                    self.penalize_routers(&plan);
                    Some(TradeResult {
                        opportunity: opp.to_string(),
                        tx_hash: Some(tx_hash),
                        block_number,
                        success: false,
                        profit_usd: 0.0,
                        gas_cost_usd,
                        net_profit_usd: -gas_cost_usd,
                        execution_time_ms,
                        error: Some("transaction reverted".to_string()),
                    })
                }
            }
            Err(e) => {
                let kind = classify_error(&e.to_string());
                warn!("submission failed ({}): {}", kind, e);
                metrics.record_execution_failure(kind);
                self.penalize_routers(&plan);
                None
            }
        }
    }

    /// Walk the plan against live quotes and fill per-hop `min_out`.
    async fn validate_plan(&self, plan: &mut ArbPlan) -> Option<Validated> {
        let outs = self.walk_quotes(&plan.steps, plan.loan_amount).await?;

        for (step, expected) in plan.steps.iter_mut().zip(&outs) {
            step.min_out = apply_slippage(*expected, self.settings.max_slippage_bps);
        }

        let final_out = *outs.last()?;
        if final_out <= plan.loan_amount {
            debug!("validation: cycle no longer closes above the loan");
            return None;
        }
        let profit_usd = self
            .quotes
            .usd_value(final_out - plan.loan_amount, &plan.loan_token);
        if profit_usd < self.settings.min_profit_usd {
            debug!(
                "validation: ${:.2} under the ${:.2} floor",
                profit_usd, self.settings.min_profit_usd
            );
            return None;
        }

        Some(Validated { final_out, profit_usd })
    }

    /// Re-run the quote walk without touching the plan.
    async fn quote_walk(&self, plan: &ArbPlan) -> Option<U256> {
        let outs = self.walk_quotes(&plan.steps, plan.loan_amount).await?;
        outs.last().copied()
    }

    /// Quote each hop via its router's `getAmountsOut`, feeding each
    /// output into the next hop. Blacklisted routers abort the walk;
    /// quote failures count against the router that produced them.
    async fn walk_quotes(&self, steps: &[SwapAction], loan: U256) -> Option<Vec<U256>> {
        let mut amount = loan;
        let mut outs = Vec::with_capacity(steps.len());

        for step in steps {
            if self.guard.should_block_router(&step.router, now_ms()) {
                debug!("router {:?} is blacklisted, dropping plan", step.router);
                return None;
            }

            let router = IUniswapV2Router02::new(step.router, self.provider.clone());
            let amounts = match router.getAmountsOut(amount, step.path.clone()).call().await {
                Ok(amounts) => amounts,
                Err(e) => {
                    warn!("getAmountsOut failed on {:?}: {}", step.router, e);
                    self.guard.record_router_failure(&step.router, now_ms());
                    return None;
                }
            };
            amount = *amounts.last()?;
            outs.push(amount);
        }

        Some(outs)
    }

    /// Estimate gas with headroom and cap the gas price.
    async fn gas_model(&self, plan: &ArbPlan) -> (u64, u128, f64) {
        let contract = IArbExecutor::new(self.executor, self.provider.clone());
        let call = contract.executeArb(to_contract_plan(plan)).from(self.sender);

        let gas_limit = match call.estimate_gas().await {
            Ok(estimate) => padded_gas_limit(estimate),
            Err(e) => {
                debug!("estimateGas failed, falling back: {}", e);
                self.settings.default_gas_limit
            }
        };

        let network_price = match self.provider.get_gas_price().await {
            Ok(price) => price,
            Err(e) => {
                debug!("gas price fetch failed, assuming 3 gwei: {}", e);
                FALLBACK_GAS_PRICE_WEI
            }
        };
        let gas_price = capped_gas_price(network_price, self.settings.max_gas_price_gwei);

        let gas_cost_wei = gas_limit as u128 * gas_price;
        let gas_cost_usd = self
            .quotes
            .usd_of_native(gas_cost_wei, &self.settings.gas_token);

        (gas_limit, gas_price, gas_cost_usd)
    }

    /// Send the transaction with a managed nonce and wait for a receipt.
    /// Returns `(tx_hash, block_number, status)`.
    async fn submit(
        &mut self,
        plan: &ArbPlan,
        gas_limit: u64,
        gas_price: u128,
        metrics: &mut EngineMetrics,
    ) -> anyhow::Result<(String, Option<u64>, bool)> {
        let nonce = self.nonce.next_nonce().await?;
        let contract = IArbExecutor::new(self.executor, self.provider.clone());

        metrics.record_execution_attempt();
        info!(
            "submitting plan: {} steps, loan {}, nonce {}, gas {}@{}wei",
            plan.steps.len(),
            plan.loan_amount,
            nonce,
            gas_limit,
            gas_price
        );

        let pending = contract
            .executeArb(to_contract_plan(plan))
            .from(self.sender)
            .nonce(nonce)
            .gas(gas_limit)
            .gas_price(gas_price)
            .send()
            .await?;

        let tx_hash = format!("{:?}", pending.tx_hash());
        let receipt = pending.get_receipt().await?;

        Ok((tx_hash, receipt.block_number, receipt.status()))
    }

    /// Count one failure against every router the plan touched.
    fn penalize_routers(&self, plan: &ArbPlan) {
        let now = now_ms();
        for step in &plan.steps {
            self.guard.record_router_failure(&step.router, now);
        }
    }
}

/// Build the executor-contract plan for an opportunity. The first hop
/// carries the loan; later hops carry zero so the executor forwards its
/// full intermediate balance. `min_out` starts as a placeholder and is
/// filled from live quotes during validation.
pub fn build_plan(opp: &Opportunity, min_profit: U256, beneficiary: Address) -> ArbPlan {
    match opp {
        Opportunity::Direct {
            token_a,
            token_b,
            buy_leg,
            sell_leg,
            amount_in,
            ..
        } => ArbPlan {
            loan_token: *token_a,
            loan_amount: *amount_in,
            min_profit,
            beneficiary,
            steps: vec![
                SwapAction {
                    router: buy_leg.router,
                    path: vec![*token_a, *token_b],
                    amount_in: *amount_in,
                    min_out: U256::from(1),
                },
                SwapAction {
                    router: sell_leg.router,
                    path: vec![*token_b, *token_a],
                    amount_in: U256::ZERO,
                    min_out: U256::from(1),
                },
            ],
        },
        Opportunity::Triangular {
            tokens,
            routers,
            amount_in,
            ..
        } => ArbPlan {
            loan_token: tokens[0],
            loan_amount: *amount_in,
            min_profit,
            beneficiary,
            steps: routers
                .iter()
                .enumerate()
                .map(|(i, router)| SwapAction {
                    router: *router,
                    path: vec![tokens[i], tokens[i + 1]],
                    amount_in: if i == 0 { *amount_in } else { U256::ZERO },
                    min_out: U256::from(1),
                })
                .collect(),
        },
    }
}

fn to_contract_plan(plan: &ArbPlan) -> IArbExecutor::ArbPlan {
    IArbExecutor::ArbPlan {
        loanToken: plan.loan_token,
        loanAmount: plan.loan_amount,
        steps: plan
            .steps
            .iter()
            .map(|step| IArbExecutor::SwapAction {
                router: step.router,
                path: step.path.clone(),
                amountIn: step.amount_in,
                minOut: step.min_out,
            })
            .collect(),
        minProfit: plan.min_profit,
        beneficiary: plan.beneficiary,
    }
}

/// `expected − ⌊expected · bps / 10_000⌋`.
pub fn apply_slippage(expected: U256, max_slippage_bps: u64) -> U256 {
    expected - expected * U256::from(max_slippage_bps) / U256::from(10_000u64)
}

/// Exact-integer form of `profit / amount_in ≥ bps / 10_000`.
pub fn meets_spread_floor(profit: U256, amount_in: U256, min_spread_bps: u64) -> bool {
    profit * U256::from(10_000u64) >= amount_in * U256::from(min_spread_bps)
}

/// Profit must cover the modeled gas cost with margin.
pub fn clears_gas_gate(profit_usd: f64, gas_cost_usd: f64, multiplier: f64) -> bool {
    profit_usd >= gas_cost_usd * multiplier
}

/// Profit-retention guard: the re-validated profit must hold at least
/// half of what validation saw. Exactly half still passes.
pub fn retains_enough(fresh_profit_usd: f64, validated_profit_usd: f64) -> bool {
    fresh_profit_usd >= 0.5 * validated_profit_usd
}

fn padded_gas_limit(estimate: u64) -> u64 {
    estimate * GAS_PAD_NUM / GAS_PAD_DEN
}

fn capped_gas_price(network_wei: u128, max_gwei: u64) -> u128 {
    network_wei.min(max_gwei as u128 * 1_000_000_000)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{PoolLeg, DEFAULT_FEE_NUM};

    fn addr(byte: u8) -> Address {
        Address::repeat_byte(byte)
    }

    fn leg(venue: &str, router: u8) -> PoolLeg {
        PoolLeg {
            venue: venue.to_string(),
            router: addr(router),
            pair: addr(0xcc),
            fee_num: DEFAULT_FEE_NUM,
            reserve_a: U256::from(1_000_000u64),
            reserve_b: U256::from(1_050_000u64),
            price_ab: 1.05,
            liquidity_usd: 500_000.0,
            last_update_ts: 1_000_000,
        }
    }

    #[test]
    fn test_build_plan_direct_shape() {
        let token_a = addr(0x01);
        let token_b = addr(0x02);
        let loan = U256::from(100_000u64);
        let opp = Opportunity::Direct {
            token_a,
            token_b,
            buy_leg: leg("pancake", 0x10),
            sell_leg: leg("biswap", 0x20),
            amount_in: loan,
            amount_out: U256::from(101_000u64),
            profit: U256::from(1_000u64),
            profit_pct: 0.01,
        };

        let plan = build_plan(&opp, U256::from(50u64), addr(0xfe));

        assert_eq!(plan.loan_token, token_a);
        assert_eq!(plan.loan_amount, loan);
        assert_eq!(plan.min_profit, U256::from(50u64));
        assert_eq!(plan.beneficiary, addr(0xfe));
        assert_eq!(plan.steps.len(), 2);

        assert_eq!(plan.steps[0].router, addr(0x10));
        assert_eq!(plan.steps[0].path, vec![token_a, token_b]);
        assert_eq!(plan.steps[0].amount_in, loan);
        assert_eq!(plan.steps[0].min_out, U256::from(1u64));

        // Later hops spend the executor's full intermediate balance.
        assert_eq!(plan.steps[1].router, addr(0x20));
        assert_eq!(plan.steps[1].path, vec![token_b, token_a]);
        assert_eq!(plan.steps[1].amount_in, U256::ZERO);
    }

    #[test]
    fn test_build_plan_triangular_shape() {
        let tokens = vec![addr(0x01), addr(0x02), addr(0x03), addr(0x01)];
        let routers = vec![addr(0x10), addr(0x20), addr(0x10)];
        let loan = U256::from(5_000u64);
        let opp = Opportunity::Triangular {
            tokens: tokens.clone(),
            venues: vec!["pancake".into(), "biswap".into(), "pancake".into()],
            routers: routers.clone(),
            pairs: vec![addr(0xc1), addr(0xc2), addr(0xc3)],
            amount_in: loan,
            amount_out: U256::from(5_100u64),
            profit: U256::from(100u64),
            profit_pct: 0.02,
        };

        let plan = build_plan(&opp, U256::ZERO, addr(0xfe));

        assert_eq!(plan.loan_token, addr(0x01));
        assert_eq!(plan.steps.len(), 3);
        for (i, step) in plan.steps.iter().enumerate() {
            assert_eq!(step.router, routers[i]);
            assert_eq!(step.path, vec![tokens[i], tokens[i + 1]]);
            if i == 0 {
                assert_eq!(step.amount_in, loan);
            } else {
                assert_eq!(step.amount_in, U256::ZERO);
            }
        }
    }

    #[test]
    fn test_apply_slippage_bound() {
        // 50 bps on 1e18: min_out keeps ≥ 99.5% of the quote, and the
        // haircut never exceeds bps/10_000 by more than one unit.
        let expected = U256::from(1_000_000_000_000_000_000u128);
        let min_out = apply_slippage(expected, 50);
        assert_eq!(min_out, U256::from(995_000_000_000_000_000u128));
        assert!(min_out <= expected);

        let haircut = expected - min_out;
        assert!(haircut * U256::from(10_000u64) <= expected * U256::from(50u64) + expected);
    }

    #[test]
    fn test_apply_slippage_small_amounts() {
        // Tiny quotes round the haircut down to zero.
        assert_eq!(apply_slippage(U256::from(3u64), 50), U256::from(3u64));
        assert_eq!(apply_slippage(U256::ZERO, 50), U256::ZERO);
    }

    #[test]
    fn test_spread_floor_boundary() {
        let amount_in = U256::from(1_000_000u64);
        // 20 bps floor: exactly 0.2% passes, one unit under fails.
        assert!(meets_spread_floor(U256::from(2_000u64), amount_in, 20));
        assert!(!meets_spread_floor(U256::from(1_999u64), amount_in, 20));
        // Zero floor lets anything through.
        assert!(meets_spread_floor(U256::ZERO, amount_in, 0));
    }

    #[test]
    fn test_gas_gate_boundary() {
        // $2 gas at 1.2× needs $2.40 of profit.
        assert!(clears_gas_gate(2.40, 2.0, 1.2));
        assert!(!clears_gas_gate(2.39, 2.0, 1.2));
    }

    #[test]
    fn test_retention_boundary() {
        // Validation saw $10: $5.00 exactly passes, $4.90 does not.
        assert!(retains_enough(5.0, 10.0));
        assert!(!retains_enough(4.9, 10.0));
        assert!(retains_enough(10.0, 10.0));
    }

    #[test]
    fn test_padded_gas_limit() {
        assert_eq!(padded_gas_limit(400_000), 500_000);
        assert_eq!(padded_gas_limit(100), 125);
    }

    #[test]
    fn test_capped_gas_price() {
        // 8 gwei ceiling.
        assert_eq!(capped_gas_price(5_000_000_000, 8), 5_000_000_000);
        assert_eq!(capped_gas_price(12_000_000_000, 8), 8_000_000_000);
    }

    #[test]
    fn test_contract_plan_mirrors_domain_plan() {
        let plan = ArbPlan {
            loan_token: addr(0x01),
            loan_amount: U256::from(77u64),
            min_profit: U256::from(3u64),
            beneficiary: addr(0xfe),
            steps: vec![SwapAction {
                router: addr(0x10),
                path: vec![addr(0x01), addr(0x02)],
                amount_in: U256::from(77u64),
                min_out: U256::from(70u64),
            }],
        };

        let sol_plan = to_contract_plan(&plan);
        assert_eq!(sol_plan.loanToken, plan.loan_token);
        assert_eq!(sol_plan.loanAmount, plan.loan_amount);
        assert_eq!(sol_plan.minProfit, plan.min_profit);
        assert_eq!(sol_plan.beneficiary, plan.beneficiary);
        assert_eq!(sol_plan.steps.len(), 1);
        assert_eq!(sol_plan.steps[0].router, plan.steps[0].router);
        assert_eq!(sol_plan.steps[0].amountIn, plan.steps[0].amount_in);
        assert_eq!(sol_plan.steps[0].minOut, plan.steps[0].min_out);
    }
}
