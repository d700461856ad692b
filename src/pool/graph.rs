//! Token Graph and Cycle Search
//!
//! Builds a directed multigraph over the scanned pools (two edges per
//! pool leg, one per swap direction) and enumerates simple cycles with a
//! depth-limited DFS. Edges snapshot reserves by value; the graph is
//! rebuilt from scratch every scan and shares nothing with the previous
//! one.
//!
//! Iteration is insertion-ordered everywhere (vertex list and per-vertex
//! adjacency), so identical pool snapshots always produce identical
//! search results.

use crate::types::{Edge, Path, Pool};
use alloy::primitives::Address;
use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct TokenGraph {
    tokens: Vec<Address>,
    index: HashMap<Address, usize>,
    adjacency: Vec<Vec<Edge>>,
}

impl TokenGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the graph from one scan's pool snapshot. Every leg yields
    /// an A→B and a B→A edge with reserves oriented per direction.
    pub fn from_pools(pools: &[Pool]) -> Self {
        let mut graph = Self::new();

        for pool in pools {
            for leg in &pool.legs {
                graph.add_edge(Edge {
                    token_in: pool.token_a,
                    token_out: pool.token_b,
                    venue: leg.venue.clone(),
                    router: leg.router,
                    pair: leg.pair,
                    fee_num: leg.fee_num,
                    reserve_in: leg.reserve_a,
                    reserve_out: leg.reserve_b,
                });
                graph.add_edge(Edge {
                    token_in: pool.token_b,
                    token_out: pool.token_a,
                    venue: leg.venue.clone(),
                    router: leg.router,
                    pair: leg.pair,
                    fee_num: leg.fee_num,
                    reserve_in: leg.reserve_b,
                    reserve_out: leg.reserve_a,
                });
            }
        }

        graph
    }

    pub fn add_edge(&mut self, edge: Edge) {
        // Register both endpoints so sink tokens have an out-degree of 0
        // rather than being absent.
        self.vertex_index(edge.token_out);
        let from = self.vertex_index(edge.token_in);
        self.adjacency[from].push(edge);
    }

    fn vertex_index(&mut self, token: Address) -> usize {
        if let Some(&i) = self.index.get(&token) {
            return i;
        }
        let i = self.tokens.len();
        self.tokens.push(token);
        self.index.insert(token, i);
        self.adjacency.push(Vec::new());
        i
    }

    /// Tokens in first-seen order.
    pub fn tokens(&self) -> &[Address] {
        &self.tokens
    }

    pub fn out_degree(&self, token: &Address) -> usize {
        self.index
            .get(token)
            .map(|&i| self.adjacency[i].len())
            .unwrap_or(0)
    }

    pub fn edges_from(&self, token: &Address) -> &[Edge] {
        self.index
            .get(token)
            .map(|&i| self.adjacency[i].as_slice())
            .unwrap_or(&[])
    }

    /// Enumerate simple cycles from `start`: no token repeats except the
    /// start itself as the final vertex, between 2 and `max_hops` edges.
    pub fn find_cycles(&self, start: Address, max_hops: usize) -> Vec<Path> {
        let mut cycles = Vec::new();
        if max_hops < 2 || self.out_degree(&start) == 0 {
            return cycles;
        }

        let mut edges = Vec::with_capacity(max_hops);
        let mut visited = vec![start];
        self.dfs(start, start, max_hops, &mut edges, &mut visited, &mut cycles);
        cycles
    }

    fn dfs(
        &self,
        start: Address,
        current: Address,
        max_hops: usize,
        edges: &mut Vec<Edge>,
        visited: &mut Vec<Address>,
        cycles: &mut Vec<Path>,
    ) {
        for edge in self.edges_from(&current) {
            if edge.token_out == start {
                // Closing the cycle needs at least one prior hop.
                if !edges.is_empty() {
                    edges.push(edge.clone());
                    cycles.push(self.path_from(edges, start));
                    edges.pop();
                }
                continue;
            }

            if edges.len() + 1 >= max_hops {
                continue; // The next hop could no longer reach back to start.
            }
            if visited.contains(&edge.token_out) {
                continue;
            }
            if self.out_degree(&edge.token_out) == 0 {
                continue; // Dead end — nothing routes out of this token.
            }

            edges.push(edge.clone());
            visited.push(edge.token_out);
            self.dfs(start, edge.token_out, max_hops, edges, visited, cycles);
            visited.pop();
            edges.pop();
        }
    }

    fn path_from(&self, edges: &[Edge], start: Address) -> Path {
        let mut tokens = Vec::with_capacity(edges.len() + 1);
        tokens.push(start);
        for edge in edges {
            tokens.push(edge.token_out);
        }
        Path {
            tokens,
            edges: edges.to_vec(),
        }
    }
}
