//! Core data model: resources, weights, order books, orders and transfers.

use rust_decimal::Decimal;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};

use crate::currency::{Currency, Product};
use crate::error::{Error, Result};

/// Currency -> amount held, in that currency's own units.
pub type Resources = FxHashMap<Currency, Decimal>;

/// Currency -> portfolio-value share, in `[0, 1]`.
pub type Weights = FxHashMap<Currency, Decimal>;

/// Currency -> base-currency value of one unit of that currency.
pub type PriceEstimates = FxHashMap<Currency, Decimal>;

/// The currencies a rebalance call needs order books for — everything held,
/// everything targeted, every through-trade currency, and the base currency
/// itself — plus every ordered pair among them, which is the superset of
/// products that might be listed.
///
/// Shared by the CLI's display/status/reconcile paths and both executors so
/// the universe-construction rule lives in exactly one place.
pub fn candidate_universe(
    resources: &Resources,
    target: &Weights,
    through_trade: &FxHashSet<Currency>,
    base: &Currency,
) -> (Vec<Currency>, Vec<Product>) {
    let mut currencies: Vec<Currency> = resources
        .keys()
        .chain(target.keys())
        .chain(through_trade.iter())
        .cloned()
        .collect();
    currencies.push(base.clone());
    currencies.sort();
    currencies.dedup();

    let mut products = Vec::new();
    for a in &currencies {
        for b in &currencies {
            if a != b {
                products.push(Product::new(a.clone(), b.clone()));
            }
        }
    }

    (currencies, products)
}

/// A snapshot of one side (or both sides) of a product's top of book.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OrderBook {
    /// A single reference price, no spread information.
    Mid(Decimal),
    /// Best ask and best bid walls.
    Walls { ask: Decimal, bid: Decimal },
}

impl OrderBook {
    /// Build a `Walls` book, normalizing argument order so `ask >= bid`
    /// regardless of which wall the caller passed first.
    pub fn from_walls(a: Decimal, b: Decimal) -> Self {
        if a >= b {
            OrderBook::Walls { ask: a, bid: b }
        } else {
            OrderBook::Walls { ask: b, bid: a }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderType {
    Limit,
    Market,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Action {
    Buy,
    Sell,
}

impl Action {
    pub fn as_lowercase_str(&self) -> &'static str {
        match self {
            Action::Buy => "buy",
            Action::Sell => "sell",
        }
    }
}

/// A concrete exchange order, compiled from an abstract [`crate::types::Transfer`].
///
/// `price` must be `Some` iff `order_type == Limit`, enforced at construction.
#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub product: Product,
    pub order_type: OrderType,
    pub action: Action,
    pub quantity: Decimal,
    pub price: Option<Decimal>,
}

impl Order {
    pub fn new(
        product: Product,
        order_type: OrderType,
        action: Action,
        quantity: Decimal,
        price: Option<Decimal>,
    ) -> Result<Self> {
        match (order_type, price) {
            (OrderType::Limit, None) => {
                return Err(Error::InvariantViolation(
                    "limit order constructed without a price".into(),
                ))
            }
            (OrderType::Market, Some(_)) => {
                return Err(Error::InvariantViolation(
                    "market order constructed with a price".into(),
                ))
            }
            _ => {}
        }
        Ok(Self {
            product,
            order_type,
            action,
            quantity,
            price,
        })
    }
}

/// An abstract currency-to-currency movement, prior to being compiled into an
/// exchange-specific [`Order`]. `amount` is denominated in base-currency
/// value units, not in `from`'s own units.
#[derive(Debug, Clone, PartialEq)]
pub struct Transfer {
    pub from: Currency,
    pub to: Currency,
    pub amount: Decimal,
}

impl Transfer {
    pub fn new(from: Currency, to: Currency, amount: Decimal) -> Self {
        Self { from, to, amount }
    }
}

/// Per-product exchange trading filters.
#[derive(Debug, Clone)]
pub struct Filters {
    pub min_order_size: Decimal,
    pub max_order_size: Decimal,
    pub order_step: Decimal,
    pub min_notional: Decimal,
    pub base: Currency,
    pub commodity: Currency,
}
