//! Topological ordering of the transfer DAG.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::currency::Currency;
use crate::types::Transfer;

/// Order `transfers` (edges `from -> to`) so that for any transfer `X -> Y`,
/// every transfer `Y -> Z` appears after it. The transfer graph cannot
/// contain cycles: every currency is strictly a net source or a net sink.
///
/// Implemented as a standard DFS topological sort over the *currency* nodes
/// (post-order finish times, reversed), which places every producer of a
/// currency before every consumer of it. Transfers are then ordered by the
/// topological rank of their `from` currency; ties — multiple transfers
/// leaving the same currency, or transfers whose currencies have no
/// ordering constraint between them — are broken lexicographically, for
/// determinism.
pub fn topological_sort(transfers: Vec<Transfer>) -> Vec<Transfer> {
    let mut by_from: FxHashMap<Currency, Vec<Currency>> = FxHashMap::default();
    for t in &transfers {
        by_from.entry(t.from.clone()).or_default().push(t.to.clone());
    }
    for tos in by_from.values_mut() {
        tos.sort();
        tos.dedup();
    }

    let mut currencies: Vec<Currency> = transfers
        .iter()
        .flat_map(|t| [t.from.clone(), t.to.clone()])
        .collect();
    currencies.sort();
    currencies.dedup();

    let mut visited: FxHashSet<Currency> = FxHashSet::default();
    let mut finish_order: Vec<Currency> = Vec::with_capacity(currencies.len());

    fn visit(
        currency: &Currency,
        by_from: &FxHashMap<Currency, Vec<Currency>>,
        visited: &mut FxHashSet<Currency>,
        finish_order: &mut Vec<Currency>,
    ) {
        if !visited.insert(currency.clone()) {
            return;
        }
        if let Some(tos) = by_from.get(currency) {
            for to in tos {
                visit(to, by_from, visited, finish_order);
            }
        }
        finish_order.push(currency.clone());
    }

    for currency in &currencies {
        visit(currency, &by_from, &mut visited, &mut finish_order);
    }
    finish_order.reverse();

    let rank: FxHashMap<Currency, usize> = finish_order
        .into_iter()
        .enumerate()
        .map(|(i, c)| (c, i))
        .collect();

    let mut indices: Vec<usize> = (0..transfers.len()).collect();
    indices.sort_by(|&a, &b| {
        let ra = rank[&transfers[a].from];
        let rb = rank[&transfers[b].from];
        ra.cmp(&rb)
            .then_with(|| transfers[a].to.cmp(&transfers[b].to))
            .then_with(|| transfers[a].from.cmp(&transfers[b].from))
    });

    indices.into_iter().map(|i| transfers[i].clone()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn t(from: &str, to: &str) -> Transfer {
        Transfer::new(Currency::from(from), Currency::from(to), dec!(1))
    }

    #[test]
    fn orders_producer_before_consumer() {
        // USDT -> BTC, BTC -> ETH: BTC must be produced before it is spent.
        let transfers = vec![t("BTC", "ETH"), t("USDT", "BTC")];
        let sorted = topological_sort(transfers);
        let pos_usdt_btc = sorted
            .iter()
            .position(|x| x.from == Currency::from("USDT"))
            .unwrap();
        let pos_btc_eth = sorted
            .iter()
            .position(|x| x.from == Currency::from("BTC"))
            .unwrap();
        assert!(pos_usdt_btc < pos_btc_eth);
    }

    #[test]
    fn handles_disjoint_chains() {
        let transfers = vec![t("ETH", "BTC"), t("USDT", "BTC")];
        let sorted = topological_sort(transfers.clone());
        assert_eq!(sorted.len(), transfers.len());
    }

    #[test]
    fn longer_chain_respects_order() {
        // A -> B -> C -> D
        let transfers = vec![t("C", "D"), t("A", "B"), t("B", "C")];
        let sorted = topological_sort(transfers);
        let pos = |from: &str| sorted.iter().position(|x| x.from == Currency::from(from)).unwrap();
        assert!(pos("A") < pos("B"));
        assert!(pos("B") < pos("C"));
    }
}
