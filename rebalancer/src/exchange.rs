//! The `Exchange` capability trait (spec §6) and a paper-trading
//! implementation used for dry runs, tests, and integration fixtures.

use std::sync::Mutex;

use rust_decimal::Decimal;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::currency::{Currency, Product};
use crate::error::{Error, Result};
use crate::types::{Action, Filters, Order, OrderBook, OrderType, PriceEstimates, Resources};

/// Opaque handle returned by `place_limit_order`, used to poll/cancel later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OrderHandle(pub u64);

/// A snapshot of a placed order's fill progress.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrderState {
    pub orig_quantity: Decimal,
    pub executed_quantity: Decimal,
}

impl OrderState {
    pub fn residual(&self) -> Decimal {
        self.orig_quantity - self.executed_quantity
    }
}

/// A filled (or partially filled) order as reported by the exchange,
/// consumed by the statistics builder (spec §4.G).
#[derive(Debug, Clone)]
pub struct FillReport {
    pub order_id: OrderHandle,
    pub product: Product,
    pub side: Action,
    pub executed_quantity: Decimal,
    pub mean_price: Decimal,
    /// Commission already converted into the rebalance's base currency by
    /// the exchange adapter.
    pub commission_base: Decimal,
    pub mid_market_price: Decimal,
}

/// The external collaborator this crate plans and executes trades against.
/// Implementations own authentication, rate limiting and the wire protocol;
/// none of that is this crate's concern (spec §1).
pub trait Exchange {
    fn get_resources(&self) -> Result<Resources>;
    fn through_trade_currencies(&self) -> Result<FxHashSet<Currency>>;
    fn get_orderbooks(&self, products: &[Product]) -> Result<FxHashMap<Product, OrderBook>>;
    fn get_maker_fee(&self, product: &Product) -> Result<Decimal>;
    fn get_taker_fee(&self, product: &Product) -> Result<Decimal>;
    fn get_filters(&self) -> Result<FxHashMap<Product, Filters>>;

    fn place_limit_order(&self, order: &Order) -> Result<OrderHandle>;
    fn place_market_order(
        &self,
        order: &Order,
        price_estimates: &PriceEstimates,
    ) -> Result<Option<FillReport>>;
    fn get_order(&self, handle: OrderHandle) -> Result<OrderState>;
    fn cancel_limit_order(&self, handle: OrderHandle) -> Result<()>;

    /// Apply exchange filters, returning `None` if the order is dust.
    fn validate_order(
        &self,
        order: &Order,
        price_estimates: &PriceEstimates,
    ) -> Result<Option<Order>>;
}

/// Round `quantity` to `step` toward zero, then enforce min/max size and
/// min-notional. Returns `None` if the result is dust.
pub fn apply_filters(quantity: Decimal, price: Decimal, filters: &Filters) -> Option<Decimal> {
    let stepped = if filters.order_step > Decimal::ZERO {
        (quantity / filters.order_step).trunc() * filters.order_step
    } else {
        quantity
    };
    if stepped <= Decimal::ZERO {
        return None;
    }
    if stepped < filters.min_order_size || stepped > filters.max_order_size {
        return None;
    }
    if stepped * price < filters.min_notional {
        return None;
    }
    Some(stepped)
}

/// How a placed order is filled by [`PaperExchange`].
#[derive(Debug, Clone, Copy)]
pub enum FillMode {
    /// Orders fill completely at the order's own price (or mid for market).
    Full,
    /// Orders fill for the given fraction of their original quantity.
    Partial(Decimal),
    /// The first order placed (by handle order) fills for the given
    /// fraction; every subsequent order fills completely. Models a single
    /// partial fill followed by full fills on retry, for exercising the
    /// limit-order executor's residual-retry path.
    PartialFirst(Decimal),
    /// Orders are rejected outright.
    Reject,
}

struct PlacedOrder {
    order: Order,
    state: OrderState,
}

/// An in-memory exchange used for dry runs and as the `FakeExchange`-style
/// fixture in tests: holds fixed resources/books/fees/filters and fills
/// orders according to a configurable [`FillMode`].
pub struct PaperExchange {
    resources: Mutex<Resources>,
    through_trade: FxHashSet<Currency>,
    orderbooks: FxHashMap<Product, OrderBook>,
    maker_fees: FxHashMap<Product, Decimal>,
    taker_fees: FxHashMap<Product, Decimal>,
    filters: FxHashMap<Product, Filters>,
    fill_mode: FillMode,
    next_handle: Mutex<u64>,
    placed: Mutex<FxHashMap<OrderHandle, PlacedOrder>>,
}

pub struct PaperExchangeBuilder {
    resources: Resources,
    through_trade: FxHashSet<Currency>,
    orderbooks: FxHashMap<Product, OrderBook>,
    maker_fees: FxHashMap<Product, Decimal>,
    taker_fees: FxHashMap<Product, Decimal>,
    filters: FxHashMap<Product, Filters>,
    fill_mode: FillMode,
}

impl PaperExchangeBuilder {
    pub fn resource(mut self, currency: Currency, amount: Decimal) -> Self {
        self.resources.insert(currency, amount);
        self
    }

    pub fn through_trade_currency(mut self, currency: Currency) -> Self {
        self.through_trade.insert(currency);
        self
    }

    pub fn orderbook(mut self, product: Product, book: OrderBook) -> Self {
        self.orderbooks.insert(product, book);
        self
    }

    pub fn fee(mut self, product: Product, maker: Decimal, taker: Decimal) -> Self {
        self.maker_fees.insert(product.clone(), maker);
        self.taker_fees.insert(product, taker);
        self
    }

    pub fn filters(mut self, product: Product, filters: Filters) -> Self {
        self.filters.insert(product, filters);
        self
    }

    pub fn fill_mode(mut self, mode: FillMode) -> Self {
        self.fill_mode = mode;
        self
    }

    pub fn build(self) -> PaperExchange {
        PaperExchange {
            resources: Mutex::new(self.resources),
            through_trade: self.through_trade,
            orderbooks: self.orderbooks,
            maker_fees: self.maker_fees,
            taker_fees: self.taker_fees,
            filters: self.filters,
            fill_mode: self.fill_mode,
            next_handle: Mutex::new(1),
            placed: Mutex::new(FxHashMap::default()),
        }
    }
}

impl PaperExchange {
    pub fn builder() -> PaperExchangeBuilder {
        PaperExchangeBuilder {
            resources: Resources::default(),
            through_trade: FxHashSet::default(),
            orderbooks: FxHashMap::default(),
            maker_fees: FxHashMap::default(),
            taker_fees: FxHashMap::default(),
            filters: FxHashMap::default(),
            fill_mode: FillMode::Full,
        }
    }

    fn next_handle(&self) -> OrderHandle {
        let mut guard = self.next_handle.lock().unwrap();
        let handle = OrderHandle(*guard);
        *guard += 1;
        handle
    }

    fn mid_price(&self, product: &Product) -> Option<Decimal> {
        match self.orderbooks.get(product) {
            Some(OrderBook::Mid(m)) => Some(*m),
            Some(OrderBook::Walls { ask, bid }) => (*ask * *bid).sqrt(),
            None => None,
        }
    }

    /// Credit/debit the commodity and base legs of a fill. A `Sell` of
    /// `executed` units of `product.commodity` at `price` converts that
    /// quantity into `executed * price` units of `product.base`; a `Buy`
    /// does the reverse.
    fn settle(&self, product: &Product, action: Action, executed: Decimal, price: Decimal) {
        if executed.is_zero() {
            return;
        }
        let mut resources = self.resources.lock().unwrap();
        let notional = executed * price;
        match action {
            Action::Sell => {
                *resources.entry(product.commodity.clone()).or_insert(Decimal::ZERO) -= executed;
                *resources.entry(product.base.clone()).or_insert(Decimal::ZERO) += notional;
            }
            Action::Buy => {
                *resources.entry(product.commodity.clone()).or_insert(Decimal::ZERO) += executed;
                *resources.entry(product.base.clone()).or_insert(Decimal::ZERO) -= notional;
            }
        }
    }
}

impl Exchange for PaperExchange {
    fn get_resources(&self) -> Result<Resources> {
        Ok(self.resources.lock().unwrap().clone())
    }

    fn through_trade_currencies(&self) -> Result<FxHashSet<Currency>> {
        Ok(self.through_trade.clone())
    }

    fn get_orderbooks(&self, products: &[Product]) -> Result<FxHashMap<Product, OrderBook>> {
        Ok(products
            .iter()
            .filter_map(|p| self.orderbooks.get(p).map(|b| (p.clone(), *b)))
            .collect())
    }

    fn get_maker_fee(&self, product: &Product) -> Result<Decimal> {
        self.maker_fees
            .get(product)
            .copied()
            .ok_or_else(|| Error::ExchangeError(format!("no maker fee for {product}")))
    }

    fn get_taker_fee(&self, product: &Product) -> Result<Decimal> {
        self.taker_fees
            .get(product)
            .copied()
            .ok_or_else(|| Error::ExchangeError(format!("no taker fee for {product}")))
    }

    fn get_filters(&self) -> Result<FxHashMap<Product, Filters>> {
        Ok(self.filters.clone())
    }

    fn place_limit_order(&self, order: &Order) -> Result<OrderHandle> {
        if matches!(self.fill_mode, FillMode::Reject) {
            return Err(Error::ExchangeError("order rejected".into()));
        }
        let handle = self.next_handle();
        let executed = match self.fill_mode {
            FillMode::Full => order.quantity,
            FillMode::Partial(fraction) => order.quantity * fraction,
            FillMode::PartialFirst(fraction) => {
                if handle.0 == 1 {
                    order.quantity * fraction
                } else {
                    order.quantity
                }
            }
            FillMode::Reject => unreachable!(),
        };
        let price = order.price.unwrap_or(Decimal::ZERO);
        self.settle(&order.product, order.action, executed, price);
        self.placed.lock().unwrap().insert(
            handle,
            PlacedOrder {
                order: order.clone(),
                state: OrderState {
                    orig_quantity: order.quantity,
                    executed_quantity: executed,
                },
            },
        );
        Ok(handle)
    }

    fn place_market_order(
        &self,
        order: &Order,
        _price_estimates: &PriceEstimates,
    ) -> Result<Option<FillReport>> {
        if matches!(self.fill_mode, FillMode::Reject) {
            return Ok(None);
        }
        let mid = self
            .mid_price(&order.product)
            .ok_or_else(|| Error::ExchangeError(format!("no book for {}", order.product)))?;
        let fee_rate = self.get_taker_fee(&order.product).unwrap_or(Decimal::ZERO);
        let executed = match self.fill_mode {
            FillMode::Partial(fraction) => order.quantity * fraction,
            _ => order.quantity,
        };
        let handle = self.next_handle();
        self.settle(&order.product, order.action, executed, mid);
        Ok(Some(FillReport {
            order_id: handle,
            product: order.product.clone(),
            side: order.action,
            executed_quantity: executed,
            mean_price: mid,
            commission_base: executed * mid * fee_rate,
            mid_market_price: mid,
        }))
    }

    fn get_order(&self, handle: OrderHandle) -> Result<OrderState> {
        self.placed
            .lock()
            .unwrap()
            .get(&handle)
            .map(|p| p.state)
            .ok_or_else(|| Error::ExchangeError(format!("unknown order handle {}", handle.0)))
    }

    fn cancel_limit_order(&self, handle: OrderHandle) -> Result<()> {
        // Cancelling an already-filled or unknown order is a no-op.
        self.placed.lock().unwrap().remove(&handle);
        Ok(())
    }

    fn validate_order(
        &self,
        order: &Order,
        price_estimates: &PriceEstimates,
    ) -> Result<Option<Order>> {
        let Some(filters) = self.filters.get(&order.product) else {
            return Ok(Some(order.clone()));
        };
        let price = order
            .price
            .or_else(|| self.mid_price(&order.product))
            .or_else(|| price_estimates.get(&order.product.commodity).copied())
            .ok_or_else(|| Error::ExchangeError(format!("no price for {}", order.product)))?;
        match apply_filters(order.quantity, price, filters) {
            Some(quantity) => {
                let mut validated = order.clone();
                validated.quantity = quantity;
                Ok(Some(validated))
            }
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn btc_usdt() -> Product {
        Product::new(Currency::from("BTC"), Currency::from("USDT"))
    }

    #[test]
    fn apply_filters_rounds_toward_zero_and_enforces_notional() {
        let filters = Filters {
            min_order_size: dec!(0.001),
            max_order_size: dec!(100),
            order_step: dec!(0.001),
            min_notional: dec!(10),
            base: Currency::from("USDT"),
            commodity: Currency::from("BTC"),
        };
        assert_eq!(
            apply_filters(dec!(1.23456), dec!(10000), &filters),
            Some(dec!(1.234))
        );
        assert_eq!(apply_filters(dec!(0.0001), dec!(10000), &filters), None);
        assert_eq!(apply_filters(dec!(0.002), dec!(1), &filters), None);
    }

    #[test]
    fn paper_exchange_full_fill_limit() {
        let exchange = PaperExchange::builder()
            .fill_mode(FillMode::Full)
            .build();
        let order = Order::new(
            btc_usdt(),
            OrderType::Limit,
            Action::Sell,
            dec!(1),
            Some(dec!(10000)),
        )
        .unwrap();
        let handle = exchange.place_limit_order(&order).unwrap();
        let state = exchange.get_order(handle).unwrap();
        assert_eq!(state.executed_quantity, dec!(1));
        assert_eq!(state.residual(), Decimal::ZERO);
        exchange.cancel_limit_order(handle).unwrap();
    }

    #[test]
    fn paper_exchange_partial_fill() {
        let exchange = PaperExchange::builder()
            .fill_mode(FillMode::Partial(dec!(0.5)))
            .build();
        let order = Order::new(
            btc_usdt(),
            OrderType::Limit,
            Action::Sell,
            dec!(1),
            Some(dec!(10000)),
        )
        .unwrap();
        let handle = exchange.place_limit_order(&order).unwrap();
        let state = exchange.get_order(handle).unwrap();
        assert_eq!(state.executed_quantity, dec!(0.5));
        assert_eq!(state.residual(), dec!(0.5));
    }
}
