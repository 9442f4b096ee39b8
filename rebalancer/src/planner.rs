//! Routing planner: `rebalance_orders` — route each currency's surplus to
//! currencies needing more along the cheapest fee path.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use rust_decimal::Decimal;
use rustc_hash::FxHashMap;

use crate::currency::{Currency, Product};
use crate::types::{Transfer, Weights};

/// `edge_fees` maps a listed product to `1 - total_fee` for that product
/// (higher is cheaper). An edge exists in both directions between a
/// product's commodity and base, since a trade can run either way.
pub fn rebalance_orders(
    initial: &Weights,
    final_weights: &Weights,
    edge_fees: &FxHashMap<Product, Decimal>,
) -> Vec<Transfer> {
    let mut currencies: Vec<Currency> = initial.keys().chain(final_weights.keys()).cloned().collect();
    currencies.sort();
    currencies.dedup();

    let mut delta: FxHashMap<Currency, Decimal> = FxHashMap::default();
    for c in &currencies {
        let i = initial.get(c).copied().unwrap_or(Decimal::ZERO);
        let f = final_weights.get(c).copied().unwrap_or(Decimal::ZERO);
        delta.insert(c.clone(), f - i);
    }

    let mut sources: Vec<Currency> = delta
        .iter()
        .filter(|(_, d)| **d < Decimal::ZERO)
        .map(|(c, _)| c.clone())
        .collect();
    sources.sort();

    let mut surplus: FxHashMap<Currency, Decimal> = delta
        .iter()
        .filter(|(_, d)| **d < Decimal::ZERO)
        .map(|(c, d)| (c.clone(), -*d))
        .collect();
    let mut deficit: FxHashMap<Currency, Decimal> = delta
        .iter()
        .filter(|(_, d)| **d > Decimal::ZERO)
        .map(|(c, d)| (c.clone(), *d))
        .collect();

    let graph = RoutingGraph::build(edge_fees);

    // Accumulate flow per edge so multiple sources routing through the same
    // edge are emitted as a single aggregated transfer.
    let mut edge_amounts: FxHashMap<(Currency, Currency), Decimal> = FxHashMap::default();

    for source in &sources {
        let mut remaining = match surplus.get(source).copied() {
            Some(s) if s > Decimal::ZERO => s,
            _ => continue,
        };
        if remaining <= Decimal::ZERO {
            continue;
        }

        let paths = graph.shortest_paths_from(source);

        let mut sinks: Vec<&Currency> = deficit
            .iter()
            .filter(|(c, d)| **d > Decimal::ZERO && paths.contains(c))
            .map(|(c, _)| c)
            .collect();
        sinks.sort_by(|a, b| {
            let (cost_a, hop_a) = paths.cost_and_first_hop(a);
            let (cost_b, hop_b) = paths.cost_and_first_hop(b);
            cost_a
                .partial_cmp(&cost_b)
                .unwrap_or(Ordering::Equal)
                .then_with(|| hop_a.cmp(&hop_b))
                .then_with(|| (*a).cmp(*b))
        });

        for sink in sinks {
            if remaining <= Decimal::ZERO {
                break;
            }
            let sink_deficit = match deficit.get(sink).copied() {
                Some(d) if d > Decimal::ZERO => d,
                _ => continue,
            };
            let flow = remaining.min(sink_deficit);
            if flow <= Decimal::ZERO {
                continue;
            }
            let Some(path) = paths.path_to(sink) else {
                continue;
            };
            for hop in path.windows(2) {
                let from = hop[0].clone();
                let to = hop[1].clone();
                *edge_amounts.entry((from, to)).or_insert(Decimal::ZERO) += flow;
            }
            remaining -= flow;
            deficit.insert(sink.clone(), sink_deficit - flow);
        }
        surplus.insert(source.clone(), remaining);
    }

    edge_amounts
        .into_iter()
        .map(|((from, to), amount)| Transfer::new(from, to, amount))
        .collect()
}

/// A directed graph over currencies weighted by `-ln(edge_fee)` (lower is
/// cheaper), supporting single-source shortest-path queries with
/// lexicographic tie-breaking on the first hop.
struct RoutingGraph {
    edges: FxHashMap<Currency, Vec<(Currency, f64)>>,
}

impl RoutingGraph {
    fn build(edge_fees: &FxHashMap<Product, Decimal>) -> Self {
        let mut edges: FxHashMap<Currency, Vec<(Currency, f64)>> = FxHashMap::default();
        for (product, fee) in edge_fees {
            let weight = -fee
                .to_string()
                .parse::<f64>()
                .unwrap_or(1.0)
                .ln();
            edges
                .entry(product.commodity.clone())
                .or_default()
                .push((product.base.clone(), weight));
            edges
                .entry(product.base.clone())
                .or_default()
                .push((product.commodity.clone(), weight));
        }
        Self { edges }
    }

    fn shortest_paths_from(&self, source: &Currency) -> ShortestPaths {
        let mut dist: FxHashMap<Currency, f64> = FxHashMap::default();
        let mut first_hop: FxHashMap<Currency, Currency> = FxHashMap::default();
        let mut predecessor: FxHashMap<Currency, Currency> = FxHashMap::default();
        let mut heap: BinaryHeap<HeapEntry> = BinaryHeap::new();

        dist.insert(source.clone(), 0.0);
        heap.push(HeapEntry {
            cost: 0.0,
            currency: source.clone(),
        });

        while let Some(HeapEntry { cost, currency }) = heap.pop() {
            if cost > dist.get(&currency).copied().unwrap_or(f64::INFINITY) + 1e-12 {
                continue;
            }
            let Some(neighbors) = self.edges.get(&currency) else {
                continue;
            };
            for (next, weight) in neighbors {
                let next_cost = cost + weight;
                let current_best = dist.get(next).copied().unwrap_or(f64::INFINITY);
                let candidate_hop = if currency == *source {
                    next.clone()
                } else {
                    first_hop.get(&currency).cloned().unwrap_or_else(|| currency.clone())
                };
                let better = next_cost < current_best - 1e-12;
                let tied_better_hop = (next_cost - current_best).abs() <= 1e-12
                    && first_hop
                        .get(next)
                        .map(|existing| candidate_hop < *existing)
                        .unwrap_or(false);
                if better || tied_better_hop {
                    dist.insert(next.clone(), next_cost);
                    predecessor.insert(next.clone(), currency.clone());
                    first_hop.insert(next.clone(), candidate_hop);
                    heap.push(HeapEntry {
                        cost: next_cost,
                        currency: next.clone(),
                    });
                }
            }
        }

        ShortestPaths {
            dist,
            first_hop,
            predecessor,
            source: source.clone(),
        }
    }
}

struct ShortestPaths {
    dist: FxHashMap<Currency, f64>,
    first_hop: FxHashMap<Currency, Currency>,
    predecessor: FxHashMap<Currency, Currency>,
    source: Currency,
}

impl ShortestPaths {
    fn contains(&self, c: &Currency) -> bool {
        *c == self.source || self.dist.contains_key(c)
    }

    fn cost_and_first_hop(&self, c: &Currency) -> (f64, Currency) {
        if *c == self.source {
            return (0.0, self.source.clone());
        }
        let cost = self.dist.get(c).copied().unwrap_or(f64::INFINITY);
        let hop = self.first_hop.get(c).cloned().unwrap_or_else(|| c.clone());
        (cost, hop)
    }

    fn path_to(&self, target: &Currency) -> Option<Vec<Currency>> {
        if *target == self.source {
            return Some(vec![self.source.clone()]);
        }
        let mut path = vec![target.clone()];
        let mut current = target.clone();
        loop {
            let prev = self.predecessor.get(&current)?;
            path.push(prev.clone());
            if *prev == self.source {
                break;
            }
            current = prev.clone();
        }
        path.reverse();
        Some(path)
    }
}

#[derive(PartialEq)]
struct HeapEntry {
    cost: f64,
    currency: Currency,
}

impl Eq for HeapEntry {}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse for a min-heap; break ties lexicographically for determinism.
        other
            .cost
            .partial_cmp(&self.cost)
            .unwrap_or(Ordering::Equal)
            .then_with(|| self.currency.cmp(&other.currency))
    }
}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
