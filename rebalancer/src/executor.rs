//! Limit-order executor (spec §4.F): a two-tier state machine. The outer
//! loop retries the residual rebalance up to `max_retries` times, each time
//! re-planning from freshly fetched resources and order books — which is
//! what lets a retry reroute through a different intermediate currency, per
//! spec.md's worked example (`USDT->LTC` direct, then `USDT->BTC->LTC`). The
//! inner loop places each compiled order in topological order, waits,
//! inspects, and cancels.

use std::time::Duration;

use rust_decimal::Decimal;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::compiler::{listed_product_and_action, parse_order};
use crate::currency::{Currency, Product};
use crate::error::{Error, Result};
use crate::exchange::{Exchange, FillReport, OrderState};
use crate::planner::rebalance_orders;
use crate::pricing::{
    mid_prices, normalize_weights, price_estimates, spread_to_fee, total_fee,
    weights_from_resources,
};
use crate::topo::topological_sort;
use crate::types::{candidate_universe, Order, OrderType, Weights};

const DUST_THRESHOLD: Decimal = Decimal::from_parts(1, 0, 0, false, 9);

/// Outcome of a full `limit_order_rebalance` invocation.
#[derive(Debug, Clone, Default)]
pub struct LimitExecutionOutcome {
    /// One entry per placed limit order, in placement order (spec §4.F's
    /// fill accounting: a partial fill produces two entries across two
    /// retry iterations).
    pub fills: Vec<OrderState>,
    /// Fill reports for orders the dust fallback (S3) routed to the market,
    /// suitable for [`crate::stats::create_order_statistics`].
    pub market_fallbacks: Vec<FillReport>,
    /// Whether the last outer iteration left zero residual (spec §4.F S2:
    /// TERMINAL success) rather than exhausting `max_retries` with a
    /// residual still outstanding (TERMINAL partial). Earlier entries in
    /// `fills` may still show a nonzero residual — that is the normal shape
    /// of a retried partial fill, not a failure.
    pub complete: bool,
}

/// Whether a compiled limit order was actually submitted as a limit order,
/// or downgraded to market by the dust fallback (spec §4.F S3).
enum Placement {
    Limit(crate::exchange::OrderHandle),
    Market(Option<FillReport>),
}

/// S3: route `order` (a compiled LIMIT order) to the market instead if its
/// notional, expressed in `base` units, falls below `dust_notional_threshold`.
///
/// `notional = quantity * limit_price / price_estimates[base]`.
fn place_limit_or_market_order(
    exchange: &dyn Exchange,
    order: &Order,
    dust_notional_threshold: Decimal,
    price_estimates: &FxHashMap<Currency, Decimal>,
    base: &Currency,
) -> Result<Placement> {
    let limit_price = order.price.ok_or_else(|| {
        Error::InvariantViolation("place_limit_or_market_order given a non-limit order".into())
    })?;
    let base_price = price_estimates.get(base).ok_or_else(|| {
        Error::InvariantViolation(format!("no price estimate for base currency {base}"))
    })?;
    let notional = order.quantity * limit_price / *base_price;

    if notional < dust_notional_threshold {
        let market_order = Order::new(
            order.product.clone(),
            OrderType::Market,
            order.action,
            order.quantity,
            None,
        )?;
        let report = exchange.place_market_order(&market_order, price_estimates)?;
        Ok(Placement::Market(report))
    } else {
        let handle = exchange.place_limit_order(order)?;
        Ok(Placement::Limit(handle))
    }
}

/// Run a full limit-order rebalance against `exchange`.
///
/// `sleep` is injected so tests can run the state machine without actually
/// waiting `wait_seconds` between place and inspect; production callers pass
/// `std::thread::sleep`.
pub fn limit_order_rebalance<F>(
    exchange: &dyn Exchange,
    target_weights: &Weights,
    base: &Currency,
    max_retries: u32,
    wait_seconds: u64,
    dust_notional_threshold: Decimal,
    sleep: F,
) -> Result<LimitExecutionOutcome>
where
    F: Fn(Duration),
{
    let target_weights = normalize_weights(target_weights)?;
    let mut outcome = LimitExecutionOutcome::default();

    for attempt in 0..=max_retries {
        let resources = exchange.get_resources()?;
        let through_trade = exchange.through_trade_currencies()?;
        let (_, requested) = candidate_universe(&resources, &target_weights, &through_trade, base);
        let orderbooks = exchange.get_orderbooks(&requested)?;

        let mid = mid_prices(&orderbooks);
        let estimates = price_estimates(&mid, base)?;
        let current_weights = weights_from_resources(&resources, &estimates)?;

        let mut edge_fees = FxHashMap::default();
        for product in orderbooks.keys() {
            let spread_fee = spread_to_fee(&orderbooks[product]);
            let exchange_fee = exchange.get_maker_fee(product)?;
            edge_fees.insert(
                product.clone(),
                Decimal::ONE - total_fee(spread_fee, exchange_fee),
            );
        }
        let products: FxHashSet<Product> = orderbooks.keys().cloned().collect();

        let mut transfers = rebalance_orders(&current_weights, &target_weights, &edge_fees);
        transfers.retain(|t| t.amount > DUST_THRESHOLD);
        let transfers = topological_sort(transfers);

        if transfers.is_empty() {
            log::debug!("limit rebalance attempt {attempt}: nothing to trade, terminal success");
            outcome.complete = true;
            return Ok(outcome);
        }

        let mut residual_remains = false;

        for transfer in &transfers {
            let (product, _action) = match listed_product_and_action(transfer, &products) {
                Ok(resolved) => resolved,
                Err(Error::UnsupportedPair { from, to }) => {
                    log::warn!("no listed product for {from} -> {to}, skipping transfer");
                    continue;
                }
                Err(e) => return Err(e),
            };
            let limit_price = mid.get(&product).copied().ok_or_else(|| {
                Error::InvariantViolation(format!("no mid price for listed product {product}"))
            })?;

            let order = match parse_order(
                transfer,
                &products,
                &estimates,
                base,
                OrderType::Limit,
                Some(limit_price),
            ) {
                Ok(order) => order,
                Err(Error::UnsupportedPair { from, to }) => {
                    log::warn!("no listed product for {from} -> {to}, skipping transfer");
                    continue;
                }
                Err(e) => return Err(e),
            };

            let Some(validated) = exchange.validate_order(&order, &estimates)? else {
                log::debug!("order for {} rejected by filters, dropping dust", order.product);
                continue;
            };

            match place_limit_or_market_order(
                exchange,
                &validated,
                dust_notional_threshold,
                &estimates,
                base,
            )? {
                Placement::Limit(handle) => {
                    sleep(Duration::from_secs(wait_seconds));
                    let state = exchange.get_order(handle)?;
                    exchange.cancel_limit_order(handle)?;
                    if state.residual() > DUST_THRESHOLD {
                        residual_remains = true;
                    }
                    outcome.fills.push(state);
                }
                Placement::Market(Some(report)) => {
                    let residual = validated.quantity - report.executed_quantity;
                    if residual > DUST_THRESHOLD {
                        residual_remains = true;
                    }
                    outcome.fills.push(OrderState {
                        orig_quantity: validated.quantity,
                        executed_quantity: report.executed_quantity,
                    });
                    outcome.market_fallbacks.push(report);
                }
                Placement::Market(None) => {
                    log::warn!("exchange rejected dust-fallback market order for {}", validated.product);
                    residual_remains = true;
                    outcome.fills.push(OrderState {
                        orig_quantity: validated.quantity,
                        executed_quantity: Decimal::ZERO,
                    });
                }
            }
        }

        if !residual_remains {
            outcome.complete = true;
            return Ok(outcome);
        }
        log::info!("limit rebalance attempt {attempt} left a residual, retrying");
    }

    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::{FillMode, PaperExchange};
    use crate::types::OrderBook;
    use rust_decimal_macros::dec;

    fn product(c: &str, b: &str) -> Product {
        Product::new(Currency::from(c), Currency::from(b))
    }

    fn three_asset_exchange(fill_mode: FillMode) -> PaperExchange {
        PaperExchange::builder()
            .resource(Currency::from("BTC"), dec!(1))
            .resource(Currency::from("USDT"), dec!(10000))
            .resource(Currency::from("LTC"), dec!(100))
            .through_trade_currency(Currency::from("USDT"))
            .through_trade_currency(Currency::from("BTC"))
            .through_trade_currency(Currency::from("LTC"))
            .orderbook(product("BTC", "USDT"), OrderBook::Mid(dec!(10000)))
            .orderbook(product("LTC", "USDT"), OrderBook::Mid(dec!(100)))
            .fee(product("BTC", "USDT"), dec!(0.001), dec!(0.001))
            .fee(product("LTC", "USDT"), dec!(0.001), dec!(0.001))
            .fill_mode(fill_mode)
            .build()
    }

    fn target() -> Weights {
        let mut w = Weights::default();
        w.insert(Currency::from("LTC"), dec!(1));
        w
    }

    #[test]
    fn full_fill_terminates_on_first_attempt() {
        let exchange = three_asset_exchange(FillMode::Full);
        let outcome = limit_order_rebalance(
            &exchange,
            &target(),
            &Currency::from("USDT"),
            3,
            0,
            dec!(0),
            |_| {},
        )
        .unwrap();
        assert!(!outcome.fills.is_empty());
        assert!(outcome.complete);
        for fill in &outcome.fills {
            assert_eq!(fill.residual(), Decimal::ZERO);
        }
    }

    #[test]
    fn partial_fill_retries_until_complete() {
        let exchange = three_asset_exchange(FillMode::PartialFirst(dec!(0.5)));
        let outcome = limit_order_rebalance(
            &exchange,
            &target(),
            &Currency::from("USDT"),
            3,
            0,
            dec!(0),
            |_| {},
        )
        .unwrap();
        assert!(outcome.complete);
        assert!(outcome.fills.len() >= 2);
        assert!(outcome.fills[0].residual() > Decimal::ZERO);
    }

    #[test]
    fn partial_fill_without_retries_leaves_residual() {
        let exchange = three_asset_exchange(FillMode::PartialFirst(dec!(0.5)));
        let outcome = limit_order_rebalance(
            &exchange,
            &target(),
            &Currency::from("USDT"),
            0,
            0,
            dec!(0),
            |_| {},
        )
        .unwrap();
        assert!(!outcome.complete);
        assert_eq!(outcome.fills.len(), 1);
        assert!(outcome.fills[0].residual() > Decimal::ZERO);
    }

    #[test]
    fn idempotent_rebalance_emits_no_fills() {
        let exchange = PaperExchange::builder()
            .resource(Currency::from("BTC"), dec!(1))
            .resource(Currency::from("USDT"), dec!(10000))
            .through_trade_currency(Currency::from("USDT"))
            .through_trade_currency(Currency::from("BTC"))
            .orderbook(product("BTC", "USDT"), OrderBook::Mid(dec!(10000)))
            .fee(product("BTC", "USDT"), dec!(0.001), dec!(0.001))
            .fill_mode(FillMode::Full)
            .build();

        let mut target = Weights::default();
        target.insert(Currency::from("BTC"), dec!(0.5));
        target.insert(Currency::from("USDT"), dec!(0.5));

        let outcome = limit_order_rebalance(
            &exchange,
            &target,
            &Currency::from("USDT"),
            2,
            0,
            dec!(0),
            |_| {},
        )
        .unwrap();
        assert!(outcome.fills.is_empty());
    }

    #[test]
    fn dust_notional_below_threshold_routes_to_market() {
        let exchange = PaperExchange::builder()
            .resource(Currency::from("BTC"), dec!(0.999))
            .resource(Currency::from("LTC"), dec!(0.1))
            .through_trade_currency(Currency::from("BTC"))
            .through_trade_currency(Currency::from("LTC"))
            .orderbook(product("LTC", "BTC"), OrderBook::Mid(dec!(0.01)))
            .fee(product("LTC", "BTC"), dec!(0.001), dec!(0.001))
            .fill_mode(FillMode::Full)
            .build();

        let mut target = Weights::default();
        target.insert(Currency::from("BTC"), dec!(1));

        let outcome = limit_order_rebalance(
            &exchange,
            &target,
            &Currency::from("BTC"),
            0,
            0,
            dec!(0.5),
            |_| {},
        )
        .unwrap();
        assert!(!outcome.market_fallbacks.is_empty());
    }
}
