//! Market-order executor: plan, compile, place-and-forget (spec §4.E).

use rust_decimal::Decimal;
use rustc_hash::FxHashMap;

use crate::compiler::parse_order;
use crate::currency::{Currency, Product};
use crate::error::{Error, Result};
use crate::exchange::{Exchange, FillReport};
use crate::pricing::{mid_prices, normalize_weights, price_estimates, spread_to_fee, total_fee, weights_from_resources};
use crate::planner::rebalance_orders;
use crate::topo::topological_sort;
use crate::types::{candidate_universe, OrderType, Weights};

const DUST_THRESHOLD: Decimal = Decimal::from_parts(1, 0, 0, false, 9);

/// Run one full market-order rebalance against `exchange`.
pub fn market_order_rebalance(
    exchange: &dyn Exchange,
    target_weights: &Weights,
    base: &Currency,
) -> Result<Vec<FillReport>> {
    let resources = exchange.get_resources()?;
    let through_trade = exchange.through_trade_currencies()?;
    let target_weights = normalize_weights(target_weights)?;

    let (_, requested) = candidate_universe(&resources, &target_weights, &through_trade, base);
    let orderbooks = exchange.get_orderbooks(&requested)?;

    let mid = mid_prices(&orderbooks);
    let price_estimates = price_estimates(&mid, base)?;
    let initial_weights = weights_from_resources(&resources, &price_estimates)?;

    let mut edge_fees = FxHashMap::default();
    for product in orderbooks.keys() {
        let book = &orderbooks[product];
        let spread_fee = spread_to_fee(book);
        let exchange_fee = exchange.get_taker_fee(product)?;
        edge_fees.insert(product.clone(), Decimal::ONE - total_fee(spread_fee, exchange_fee));
    }

    let products: rustc_hash::FxHashSet<Product> = orderbooks.keys().cloned().collect();

    let mut transfers = rebalance_orders(&initial_weights, &target_weights, &edge_fees);
    transfers.retain(|t| t.amount > DUST_THRESHOLD);
    let transfers = topological_sort(transfers);

    let mut reports = Vec::new();
    for transfer in &transfers {
        let order = match parse_order(
            transfer,
            &products,
            &price_estimates,
            base,
            OrderType::Market,
            None,
        ) {
            Ok(order) => order,
            Err(Error::UnsupportedPair { from, to }) => {
                log::warn!("no listed product for {from} -> {to}, skipping transfer");
                continue;
            }
            Err(e) => return Err(e),
        };

        let Some(validated) = exchange.validate_order(&order, &price_estimates)? else {
            log::debug!("order for {} rejected by filters, dropping dust", order.product);
            continue;
        };

        if let Some(report) = exchange.place_market_order(&validated, &price_estimates)? {
            reports.push(report);
        } else {
            log::warn!("exchange rejected market order for {}", validated.product);
        }
    }

    Ok(reports)
}
