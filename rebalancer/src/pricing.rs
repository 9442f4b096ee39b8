//! Price & graph utilities (mid-price extraction, price estimation via
//! shortest path, weight derivation, fee composition).

use petgraph::graph::{DiGraph, NodeIndex};
use rust_decimal::Decimal;
use rust_decimal::MathematicalOps;
use rustc_hash::FxHashMap;

use crate::currency::{Currency, Product};
use crate::error::{Error, Result};
use crate::types::{OrderBook, PriceEstimates, Resources, Weights};

/// Derive a mid price per product, plus the inverse product for every entry.
///
/// For `OrderBook::Walls`, mid is the geometric mean of ask and bid. For
/// `OrderBook::Mid`, the stored value is used directly.
pub fn mid_prices(orderbooks: &FxHashMap<Product, OrderBook>) -> FxHashMap<Product, Decimal> {
    let mut out = FxHashMap::default();
    for (product, book) in orderbooks {
        let mid = match book {
            OrderBook::Mid(m) => *m,
            OrderBook::Walls { ask, bid } => (*ask * *bid).sqrt().unwrap_or(Decimal::ZERO),
        };
        out.insert(product.clone(), mid);
        out.insert(product.inverse(), Decimal::ONE / mid);
    }
    out
}

/// Build a directed log-weight graph from `mid` and run a Bellman-Ford-style
/// relaxation from `base` to every reachable currency.
///
/// For a mid-price entry `{commodity, base: b}` worth `m` (one `commodity`
/// unit equals `m` units of `b`), the graph gets an edge `b -> commodity`
/// weighted `ln(m)`. The result for a currency `c` is `exp(dist[base -> c])`:
/// how many base units one unit of `c` is worth. `base` always maps to `1`.
pub fn price_estimates(mid: &FxHashMap<Product, Decimal>, base: &Currency) -> Result<PriceEstimates> {
    let mut graph: DiGraph<Currency, f64> = DiGraph::new();
    let mut nodes: FxHashMap<Currency, NodeIndex> = FxHashMap::default();

    let mut node_for = |g: &mut DiGraph<Currency, f64>,
                         nodes: &mut FxHashMap<Currency, NodeIndex>,
                         c: &Currency|
     -> NodeIndex {
        *nodes
            .entry(c.clone())
            .or_insert_with(|| g.add_node(c.clone()))
    };

    for (product, price) in mid {
        let price_f64 = price
            .to_string()
            .parse::<f64>()
            .map_err(|_| Error::InvariantViolation(format!("non-finite price for {product}")))?;
        if price_f64 <= 0.0 || !price_f64.is_finite() {
            return Err(Error::InvariantViolation(format!(
                "non-positive or non-finite mid price for {product}"
            )));
        }
        let b = node_for(&mut graph, &mut nodes, &product.base);
        let c = node_for(&mut graph, &mut nodes, &product.commodity);
        graph.add_edge(b, c, price_f64.ln());
    }

    let base_idx = *nodes
        .get(base)
        .ok_or_else(|| Error::InvariantViolation(format!("base currency {base} not in graph")))?;

    let paths = petgraph::algo::bellman_ford(&graph, base_idx)
        .map_err(|_| Error::InvariantViolation("negative cycle in price graph".into()))?;

    let mut estimates = PriceEstimates::default();
    for (currency, idx) in &nodes {
        let dist = paths.distances[idx.index()];
        if dist.is_finite() {
            let value = dist.exp();
            let decimal = Decimal::try_from(value).map_err(|_| {
                Error::InvariantViolation(format!("price estimate for {currency} out of range"))
            })?;
            estimates.insert(currency.clone(), decimal);
        }
    }
    estimates.insert(base.clone(), Decimal::ONE);
    Ok(estimates)
}

/// Each currency's share of total portfolio value, valued at `price_estimates`.
pub fn weights_from_resources(
    resources: &Resources,
    price_estimates: &PriceEstimates,
) -> Result<Weights> {
    let mut total = Decimal::ZERO;
    let mut values = FxHashMap::default();
    for (currency, amount) in resources {
        let price = price_estimates.get(currency).ok_or_else(|| {
            Error::InvariantViolation(format!("no price estimate for {currency}"))
        })?;
        let value = *amount * *price;
        values.insert(currency.clone(), value);
        total += value;
    }
    if total == Decimal::ZERO {
        return Err(Error::InvariantViolation(
            "portfolio value is zero, cannot derive weights".into(),
        ));
    }
    Ok(values
        .into_iter()
        .map(|(currency, value)| (currency, value / total))
        .collect())
}

/// Normalize a weight map so its values sum to exactly `1`.
pub fn normalize_weights(weights: &Weights) -> Result<Weights> {
    let total: Decimal = weights.values().copied().sum();
    if total == Decimal::ZERO {
        return Err(Error::InvariantViolation(
            "weights sum to zero, cannot normalize".into(),
        ));
    }
    let normalized: Weights = weights
        .iter()
        .map(|(c, w)| (c.clone(), *w / total))
        .collect();
    let check: Decimal = normalized.values().copied().sum();
    if (check - Decimal::ONE).abs() > Decimal::new(1, 9) {
        return Err(Error::InvariantViolation(format!(
            "normalized weights sum to {check}, expected 1"
        )));
    }
    Ok(normalized)
}

/// Total portfolio value in base-currency units.
pub fn portfolio_value(resources: &Resources, price_estimates: &PriceEstimates) -> Result<Decimal> {
    let mut total = Decimal::ZERO;
    for (currency, amount) in resources {
        let price = price_estimates.get(currency).ok_or_else(|| {
            Error::InvariantViolation(format!("no price estimate for {currency}"))
        })?;
        total += *amount * *price;
    }
    Ok(total)
}

/// The implicit cost of crossing the spread, `1 - sqrt(bid/ask)`. Zero for a
/// mid-only book.
pub fn spread_to_fee(book: &OrderBook) -> Decimal {
    match book {
        OrderBook::Mid(_) => Decimal::ZERO,
        OrderBook::Walls { ask, bid } => {
            Decimal::ONE - (*bid / *ask).sqrt().unwrap_or(Decimal::ZERO)
        }
    }
}

/// Composition of spread fee with exchange fee: `1 - (1-s)(1-e)`.
pub fn total_fee(spread_fee: Decimal, exchange_fee: Decimal) -> Decimal {
    Decimal::ONE - (Decimal::ONE - spread_fee) * (Decimal::ONE - exchange_fee)
}
