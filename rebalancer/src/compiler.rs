//! Trade-to-order compiler: rewrites an abstract [`Transfer`] into a concrete
//! [`Order`] on a listed product.

use rustc_hash::FxHashSet;

use crate::currency::{Currency, Product};
use crate::error::{Error, Result};
use crate::types::{Action, Order, OrderType, PriceEstimates, Transfer};

/// Determine which of `A_B`/`B_A` is listed for `transfer`, and whether
/// realizing it is a BUY or a SELL.
///
/// Returns `Error::UnsupportedPair` if neither direction is listed. Exposed
/// separately from [`parse_order`] so callers that need the product before
/// they can compute a limit price (the limit-order executor, spec §4.F) can
/// resolve it without duplicating the lookup.
pub fn listed_product_and_action(
    transfer: &Transfer,
    products: &FxHashSet<Product>,
) -> Result<(Product, Action)> {
    let sell_product = Product::new(transfer.from.clone(), transfer.to.clone());
    let buy_product = Product::new(transfer.to.clone(), transfer.from.clone());

    if products.contains(&sell_product) {
        Ok((sell_product, Action::Sell))
    } else if products.contains(&buy_product) {
        Ok((buy_product, Action::Buy))
    } else {
        Err(Error::UnsupportedPair {
            from: transfer.from.clone(),
            to: transfer.to.clone(),
        })
    }
}

/// Compile `transfer` into an [`Order`] on whichever of `A_B`/`B_A` is listed.
///
/// `price` must be `Some` iff `order_type == Limit`. Returns
/// `Error::UnsupportedPair` if neither direction of the product is listed.
pub fn parse_order(
    transfer: &Transfer,
    products: &FxHashSet<Product>,
    price_estimates: &PriceEstimates,
    base: &Currency,
    order_type: OrderType,
    price: Option<rust_decimal::Decimal>,
) -> Result<Order> {
    if !price_estimates.contains_key(base) {
        return Err(Error::InvariantViolation(format!(
            "price estimates missing base currency {base}"
        )));
    }

    let (product, action) = listed_product_and_action(transfer, products)?;
    let commodity = if action == Action::Sell {
        &transfer.from
    } else {
        &transfer.to
    };

    let commodity_price = price_estimates.get(commodity).ok_or_else(|| {
        Error::InvariantViolation(format!("no price estimate for {commodity}"))
    })?;
    if commodity_price.is_zero() {
        return Err(Error::InvariantViolation(format!(
            "zero price estimate for {commodity}"
        )));
    }
    let quantity = transfer.amount / *commodity_price;

    Order::new(product, order_type, action, quantity, price)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PriceEstimates;
    use rust_decimal_macros::dec;

    fn listed(pairs: &[(&str, &str)]) -> FxHashSet<Product> {
        pairs
            .iter()
            .map(|(c, b)| Product::new(Currency::from(*c), Currency::from(*b)))
            .collect()
    }

    fn prices() -> PriceEstimates {
        let mut p = PriceEstimates::default();
        p.insert(Currency::from("USDT"), dec!(1));
        p.insert(Currency::from("BNB"), dec!(10));
        p.insert(Currency::from("BTC"), dec!(10000));
        p.insert(Currency::from("ETH"), dec!(10000) / dec!(11));
        p.insert(Currency::from("EOS"), dec!(1000) / dec!(11));
        p
    }

    #[test]
    fn sell_when_commodity_is_from() {
        let products = listed(&[("BTC", "USDT")]);
        let transfer = Transfer::new(Currency::from("BTC"), Currency::from("USDT"), dec!(10000));
        let order = parse_order(
            &transfer,
            &products,
            &prices(),
            &Currency::from("USDT"),
            OrderType::Market,
            None,
        )
        .unwrap();
        assert_eq!(order.action, Action::Sell);
        assert_eq!(order.quantity, dec!(1));
    }

    #[test]
    fn buy_when_commodity_is_to() {
        let products = listed(&[("BTC", "USDT")]);
        let transfer = Transfer::new(Currency::from("USDT"), Currency::from("BTC"), dec!(10000));
        let order = parse_order(
            &transfer,
            &products,
            &prices(),
            &Currency::from("USDT"),
            OrderType::Market,
            None,
        )
        .unwrap();
        assert_eq!(order.action, Action::Buy);
        assert_eq!(order.quantity, dec!(1));
    }

    #[test]
    fn indirect_commodity_uses_commodity_price() {
        let products = listed(&[("EOS", "ETH")]);
        let transfer = Transfer::new(Currency::from("ETH"), Currency::from("EOS"), dec!(10000));
        let order = parse_order(
            &transfer,
            &products,
            &prices(),
            &Currency::from("USDT"),
            OrderType::Market,
            None,
        )
        .unwrap();
        assert_eq!(order.action, Action::Buy);
        assert_eq!(order.quantity, dec!(110));
    }

    #[test]
    fn limit_order_carries_price() {
        let products = listed(&[("EOS", "ETH")]);
        let transfer = Transfer::new(Currency::from("ETH"), Currency::from("EOS"), dec!(10000));
        let order = parse_order(
            &transfer,
            &products,
            &prices(),
            &Currency::from("USDT"),
            OrderType::Limit,
            Some(dec!(1000)),
        )
        .unwrap();
        assert_eq!(order.price, Some(dec!(1000)));
    }

    #[test]
    fn unlisted_pair_errors() {
        let products = listed(&[("BTC", "USDT")]);
        let transfer = Transfer::new(Currency::from("LTC"), Currency::from("EOS"), dec!(10));
        let result = parse_order(
            &transfer,
            &products,
            &prices(),
            &Currency::from("USDT"),
            OrderType::Market,
            None,
        );
        assert!(matches!(result, Err(Error::UnsupportedPair { .. })));
    }
}
