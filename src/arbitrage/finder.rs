//! Opportunity Finder
//!
//! Simulates candidate cycles against the current pool snapshot and
//! ranks the survivors by integer profit.
//!
//! Direct search: for every pool quoted on two or more venues, push the
//! loan through each ordered pair of legs (A→B on one, B→A on the other)
//! and keep the directions that come back with more than went in.
//! Cross-checking all ordered pairs means the profitable direction is
//! found without reasoning about which leg is "cheap".
//!
//! Triangular search: walk 3-hop cycles from every priced token through
//! the token graph, requiring at least two distinct venues, and keep
//! cycles whose simulated output clears the loan plus the minimum profit.

use crate::amm::get_amount_out;
use crate::pool::TokenGraph;
use crate::pricing::{u256_to_f64, UsdQuoteTable};
use crate::types::{Edge, Opportunity, Pool};
use alloy::primitives::U256;
use std::cmp::Ordering;
use tracing::debug;

pub struct OpportunityFinder {
    loan_amount: U256,
    min_profit_usd: f64,
    max_tokens: usize,
}

impl OpportunityFinder {
    pub fn new(loan_amount: U256, min_profit_usd: f64, max_tokens: usize) -> Self {
        Self {
            loan_amount,
            min_profit_usd,
            max_tokens,
        }
    }

    /// Find every profitable cycle in the snapshot, best first.
    pub fn find(&self, pools: &[Pool], quotes: &UsdQuoteTable) -> Vec<Opportunity> {
        let mut opportunities = self.direct_opportunities(pools);
        opportunities.extend(self.triangular_opportunities(pools, quotes));
        sort_opportunities(&mut opportunities);
        opportunities
    }

    fn direct_opportunities(&self, pools: &[Pool]) -> Vec<Opportunity> {
        let mut found = Vec::new();

        for pool in pools {
            if pool.legs.len() < 2 {
                continue;
            }

            for (i, buy_leg) in pool.legs.iter().enumerate() {
                for (j, sell_leg) in pool.legs.iter().enumerate() {
                    if i == j {
                        continue;
                    }

                    // Loan token_a → token_b on the buy leg, back on the
                    // sell leg.
                    let mid = get_amount_out(
                        self.loan_amount,
                        buy_leg.reserve_a,
                        buy_leg.reserve_b,
                        buy_leg.fee_num,
                    );
                    let out = get_amount_out(
                        mid,
                        sell_leg.reserve_b,
                        sell_leg.reserve_a,
                        sell_leg.fee_num,
                    );

                    if out <= self.loan_amount {
                        continue;
                    }
                    let profit = out - self.loan_amount;

                    debug!(
                        "direct candidate {}→{} pair {:?}: profit {}",
                        buy_leg.venue, sell_leg.venue, pool.token_a, profit
                    );

                    found.push(Opportunity::Direct {
                        token_a: pool.token_a,
                        token_b: pool.token_b,
                        buy_leg: buy_leg.clone(),
                        sell_leg: sell_leg.clone(),
                        amount_in: self.loan_amount,
                        amount_out: out,
                        profit,
                        profit_pct: profit_fraction(profit, self.loan_amount),
                    });
                }
            }
        }

        found
    }

    fn triangular_opportunities(&self, pools: &[Pool], quotes: &UsdQuoteTable) -> Vec<Opportunity> {
        let graph = TokenGraph::from_pools(pools);
        let mut found = Vec::new();

        let starts: Vec<_> = graph
            .tokens()
            .iter()
            .take(self.max_tokens)
            .filter(|token| quotes.has_price(token))
            .copied()
            .collect();

        for start in starts {
            let min_profit = quotes.usd_to_units(self.min_profit_usd, &start);

            for cycle in graph.find_cycles(start, 3) {
                // Direct search already covers two-venue round trips on a
                // single pair; triangular keeps the three-hop cycles.
                if cycle.edges.len() < 3 {
                    continue;
                }
                if cycle.venue_count() < 2 {
                    continue;
                }

                let out = simulate_path(&cycle.edges, self.loan_amount);
                if out <= self.loan_amount {
                    continue;
                }
                let profit = out - self.loan_amount;
                if profit < min_profit {
                    continue;
                }

                debug!(
                    "triangular candidate via {:?}: profit {}",
                    cycle.tokens, profit
                );

                found.push(Opportunity::Triangular {
                    tokens: cycle.tokens.clone(),
                    venues: cycle.edges.iter().map(|e| e.venue.clone()).collect(),
                    routers: cycle.edges.iter().map(|e| e.router).collect(),
                    pairs: cycle.edges.iter().map(|e| e.pair).collect(),
                    amount_in: self.loan_amount,
                    amount_out: out,
                    profit,
                    profit_pct: profit_fraction(profit, self.loan_amount),
                });
            }
        }

        found
    }
}

/// Push an amount through consecutive edges of a path.
pub fn simulate_path(edges: &[Edge], amount_in: U256) -> U256 {
    edges.iter().fold(amount_in, |amount, edge| {
        get_amount_out(amount, edge.reserve_in, edge.reserve_out, edge.fee_num)
    })
}

/// profit / amount_in as a fraction, for ranking and display only.
fn profit_fraction(profit: U256, amount_in: U256) -> f64 {
    if amount_in.is_zero() {
        return 0.0;
    }
    u256_to_f64(profit) / u256_to_f64(amount_in)
}

/// Profit descending, ties broken by profit fraction descending, then by
/// hop count ascending. Integer profit drives the order — the f64 only
/// ever separates equal-profit entries.
pub fn sort_opportunities(opportunities: &mut [Opportunity]) {
    opportunities.sort_by(|a, b| {
        b.profit()
            .cmp(&a.profit())
            .then_with(|| {
                b.profit_pct()
                    .partial_cmp(&a.profit_pct())
                    .unwrap_or(Ordering::Equal)
            })
            .then_with(|| a.hop_count().cmp(&b.hop_count()))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{PoolLeg, DEFAULT_FEE_NUM};
    use alloy::primitives::Address;
    use std::collections::HashMap;

    fn addr(byte: u8) -> Address {
        Address::repeat_byte(byte)
    }

    fn e18(n: u64) -> U256 {
        U256::from(n) * U256::from(10u64).pow(U256::from(18u8))
    }

    fn leg(venue: &str, reserve_a: U256, reserve_b: U256) -> PoolLeg {
        PoolLeg {
            venue: venue.to_string(),
            router: addr(0xaa),
            pair: addr(0xbb),
            fee_num: DEFAULT_FEE_NUM,
            reserve_a,
            reserve_b,
            price_ab: u256_to_f64(reserve_b) / u256_to_f64(reserve_a),
            liquidity_usd: 1_000_000.0,
            last_update_ts: 1_000_000,
        }
    }

    fn quotes() -> UsdQuoteTable {
        use crate::types::TokenInfo;
        let tokens = vec![TokenInfo {
            symbol: "WBNB".into(),
            address: addr(0x01),
            decimals: None,
        }];
        UsdQuoteTable::new(&tokens, HashMap::new())
    }

    #[test]
    fn test_direct_two_leg_pool() {
        // Same pair on two venues with a ~10% price gap.
        let l1 = leg("pancake", e18(1_000_000), e18(1_050_000));
        let l2 = leg("biswap", e18(1_000_000), e18(950_000));
        let pools = vec![Pool {
            token_a: addr(0x01),
            token_b: addr(0x02),
            legs: vec![l1, l2],
        }];

        let loan = e18(100);
        let finder = OpportunityFinder::new(loan, 0.0, 200);
        let opportunities = finder.find(&pools, &quotes());

        assert_eq!(opportunities.len(), 1);
        let Opportunity::Direct {
            buy_leg,
            sell_leg,
            amount_out,
            profit,
            ..
        } = &opportunities[0]
        else {
            panic!("expected a direct opportunity");
        };

        // The profitable direction buys B where it is plentiful (more B
        // per A) and sells it back where it is scarce.
        assert_eq!(buy_leg.venue, "pancake");
        assert_eq!(sell_leg.venue, "biswap");

        // Emitted numbers replay exactly through the swap formula.
        let mid = get_amount_out(loan, buy_leg.reserve_a, buy_leg.reserve_b, DEFAULT_FEE_NUM);
        let out = get_amount_out(mid, sell_leg.reserve_b, sell_leg.reserve_a, DEFAULT_FEE_NUM);
        assert_eq!(*amount_out, out);
        assert!(out > loan);
        assert_eq!(*profit, out - loan);
    }

    #[test]
    fn test_single_leg_pool_yields_nothing() {
        let pools = vec![Pool {
            token_a: addr(0x01),
            token_b: addr(0x02),
            legs: vec![leg("pancake", e18(1_000_000), e18(1_050_000))],
        }];

        let finder = OpportunityFinder::new(e18(100), 0.0, 200);
        assert!(finder.find(&pools, &quotes()).is_empty());
    }

    #[test]
    fn test_balanced_legs_yield_nothing() {
        // Identical reserves on both venues: fees eat the round trip.
        let pools = vec![Pool {
            token_a: addr(0x01),
            token_b: addr(0x02),
            legs: vec![
                leg("pancake", e18(1_000_000), e18(1_000_000)),
                leg("biswap", e18(1_000_000), e18(1_000_000)),
            ],
        }];

        let finder = OpportunityFinder::new(e18(100), 0.0, 200);
        assert!(finder.find(&pools, &quotes()).is_empty());
    }

    #[test]
    fn test_triangular_cycle_detected() {
        // WBNB→X cheap on pancake, X→Y flat on biswap, Y→WBNB generous
        // on pancake: a profitable 3-hop loop.
        let pools = vec![
            Pool {
                token_a: addr(0x01), // WBNB (priced)
                token_b: addr(0x02),
                legs: vec![leg("pancake", e18(1_000_000), e18(1_100_000))],
            },
            Pool {
                token_a: addr(0x02),
                token_b: addr(0x03),
                legs: vec![leg("biswap", e18(1_000_000), e18(1_000_000))],
            },
            Pool {
                token_a: addr(0x01),
                token_b: addr(0x03),
                legs: vec![leg("pancake", e18(1_000_000), e18(1_000_000))],
            },
        ];

        let loan = e18(100);
        let finder = OpportunityFinder::new(loan, 0.0, 200);
        let opportunities = finder.find(&pools, &quotes());

        let triangular: Vec<_> = opportunities
            .iter()
            .filter(|o| o.kind() == "triangular")
            .collect();
        assert!(!triangular.is_empty());

        let Opportunity::Triangular {
            tokens, amount_out, profit, ..
        } = triangular[0]
        else {
            unreachable!();
        };
        assert_eq!(tokens.first(), tokens.last());
        assert_eq!(tokens[0], addr(0x01));
        assert!(*amount_out > loan);
        assert_eq!(*profit, *amount_out - loan);
    }

    #[test]
    fn test_triangular_simulation_replays_exactly() {
        let pools = vec![
            Pool {
                token_a: addr(0x01),
                token_b: addr(0x02),
                legs: vec![leg("pancake", e18(1_000_000), e18(1_100_000))],
            },
            Pool {
                token_a: addr(0x02),
                token_b: addr(0x03),
                legs: vec![leg("biswap", e18(1_000_000), e18(1_000_000))],
            },
            Pool {
                token_a: addr(0x01),
                token_b: addr(0x03),
                legs: vec![leg("pancake", e18(1_000_000), e18(1_000_000))],
            },
        ];

        let loan = e18(100);
        let finder = OpportunityFinder::new(loan, 0.0, 200);
        let graph = TokenGraph::from_pools(&pools);

        for opp in finder.find(&pools, &quotes()) {
            if let Opportunity::Triangular { tokens, amount_out, .. } = &opp {
                // Re-walk the same cycle through the graph and replay it.
                let cycle = graph
                    .find_cycles(tokens[0], 3)
                    .into_iter()
                    .find(|c| &c.tokens == tokens)
                    .expect("emitted cycle must exist in the graph");
                assert_eq!(simulate_path(&cycle.edges, loan), *amount_out);
            }
        }
    }

    #[test]
    fn test_single_venue_cycles_rejected() {
        // All three hops on the same venue: no cross-venue imbalance to
        // capture, and the venue filter drops the cycle outright.
        let pools = vec![
            Pool {
                token_a: addr(0x01),
                token_b: addr(0x02),
                legs: vec![leg("pancake", e18(1_000_000), e18(1_100_000))],
            },
            Pool {
                token_a: addr(0x02),
                token_b: addr(0x03),
                legs: vec![leg("pancake", e18(1_000_000), e18(1_000_000))],
            },
            Pool {
                token_a: addr(0x01),
                token_b: addr(0x03),
                legs: vec![leg("pancake", e18(1_000_000), e18(1_000_000))],
            },
        ];

        let finder = OpportunityFinder::new(e18(100), 0.0, 200);
        let triangular_count = finder
            .find(&pools, &quotes())
            .iter()
            .filter(|o| o.kind() == "triangular")
            .count();
        assert_eq!(triangular_count, 0);
    }

    #[test]
    fn test_min_profit_floor_applies_to_triangular() {
        let pools = vec![
            Pool {
                token_a: addr(0x01),
                token_b: addr(0x02),
                legs: vec![leg("pancake", e18(1_000_000), e18(1_010_000))],
            },
            Pool {
                token_a: addr(0x02),
                token_b: addr(0x03),
                legs: vec![leg("biswap", e18(1_000_000), e18(1_000_000))],
            },
            Pool {
                token_a: addr(0x01),
                token_b: addr(0x03),
                legs: vec![leg("pancake", e18(1_000_000), e18(1_000_000))],
            },
        ];

        // WBNB is $580 by default; demanding $1M profit filters a
        // fraction-of-a-token edge out.
        let permissive = OpportunityFinder::new(e18(100), 0.0, 200);
        let strict = OpportunityFinder::new(e18(100), 1_000_000.0, 200);

        let lax_count = permissive
            .find(&pools, &quotes())
            .iter()
            .filter(|o| o.kind() == "triangular")
            .count();
        let strict_count = strict
            .find(&pools, &quotes())
            .iter()
            .filter(|o| o.kind() == "triangular")
            .count();

        assert!(lax_count >= 1);
        assert_eq!(strict_count, 0);
    }

    #[test]
    fn test_sort_order() {
        let make = |profit: u64, amount_in: u64| Opportunity::Direct {
            token_a: addr(0x01),
            token_b: addr(0x02),
            buy_leg: leg("a", e18(1), e18(1)),
            sell_leg: leg("b", e18(1), e18(1)),
            amount_in: U256::from(amount_in),
            amount_out: U256::from(amount_in + profit),
            profit: U256::from(profit),
            profit_pct: profit as f64 / amount_in as f64,
        };

        let mut opportunities = vec![make(5, 1_000), make(20, 1_000), make(5, 100)];
        sort_opportunities(&mut opportunities);

        // Highest profit first.
        assert_eq!(opportunities[0].profit(), U256::from(20u64));
        // Equal profit: larger fraction (smaller loan) wins.
        assert_eq!(opportunities[1].amount_in(), U256::from(100u64));
        assert_eq!(opportunities[2].amount_in(), U256::from(1_000u64));
    }

    #[test]
    fn test_determinism() {
        let pools = vec![
            Pool {
                token_a: addr(0x01),
                token_b: addr(0x02),
                legs: vec![
                    leg("pancake", e18(1_000_000), e18(1_050_000)),
                    leg("biswap", e18(1_000_000), e18(950_000)),
                ],
            },
            Pool {
                token_a: addr(0x02),
                token_b: addr(0x03),
                legs: vec![leg("biswap", e18(1_000_000), e18(1_000_000))],
            },
            Pool {
                token_a: addr(0x01),
                token_b: addr(0x03),
                legs: vec![leg("pancake", e18(1_000_000), e18(1_000_000))],
            },
        ];

        let finder = OpportunityFinder::new(e18(100), 0.0, 200);
        let first: Vec<String> = finder
            .find(&pools, &quotes())
            .iter()
            .map(|o| o.to_string())
            .collect();
        let second: Vec<String> = finder
            .find(&pools, &quotes())
            .iter()
            .map(|o| o.to_string())
            .collect();
        assert_eq!(first, second);
    }
}
