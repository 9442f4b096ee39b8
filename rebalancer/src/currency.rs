//! Currency and product identifiers.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// An opaque exchange currency symbol, e.g. `"BTC"`.
///
/// Unlike a stock ticker, crypto asset symbols are not bounded to a fixed
/// byte width, so this wraps an owned `String` rather than a fixed-size
/// inline buffer.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Currency(String);

impl Currency {
    pub fn new(symbol: impl Into<String>) -> Result<Self> {
        let symbol = symbol.into();
        if symbol.is_empty() {
            return Err(Error::InvariantViolation("empty currency symbol".into()));
        }
        if !symbol.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(Error::InvariantViolation(format!(
                "currency symbol '{symbol}' contains non-alphanumeric characters"
            )));
        }
        Ok(Self(symbol.to_ascii_uppercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Currency {
    /// Infallible conversion for trusted, already-validated literals (tests,
    /// constants). Prefer [`Currency::new`] for externally sourced symbols.
    fn from(s: &str) -> Self {
        Currency(s.to_ascii_uppercase())
    }
}

/// A listed product: `commodity` trades against `base`.
///
/// Canonical textual form is `"COMMODITY_BASE"`, e.g. `ETH_BTC` means ETH is
/// the commodity and BTC is the quote currency.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Product {
    pub commodity: Currency,
    pub base: Currency,
}

impl Product {
    pub fn new(commodity: Currency, base: Currency) -> Self {
        Self { commodity, base }
    }

    /// The product with commodity and base swapped.
    pub fn inverse(&self) -> Product {
        Product::new(self.base.clone(), self.commodity.clone())
    }

    /// Parse a product symbol in canonical `"COMMODITY_BASE"` form.
    pub fn parse(symbol: &str) -> Result<Self> {
        let (commodity, base) = symbol.split_once('_').ok_or_else(|| {
            Error::InvariantViolation(format!("malformed product symbol '{symbol}'"))
        })?;
        Ok(Product::new(Currency::new(commodity)?, Currency::new(base)?))
    }
}

impl fmt::Display for Product {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.commodity, self.base)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn product_display_roundtrip() {
        let p = Product::new(Currency::from("ETH"), Currency::from("BTC"));
        assert_eq!(p.to_string(), "ETH_BTC");
        assert_eq!(Product::parse("ETH_BTC").unwrap(), p);
    }

    #[test]
    fn product_inverse() {
        let p = Product::new(Currency::from("ETH"), Currency::from("BTC"));
        let inv = p.inverse();
        assert_eq!(inv.commodity, Currency::from("BTC"));
        assert_eq!(inv.base, Currency::from("ETH"));
    }

    #[test]
    fn currency_rejects_empty() {
        assert!(Currency::new("").is_err());
    }

    #[test]
    fn currency_uppercases() {
        assert_eq!(Currency::new("btc").unwrap().as_str(), "BTC");
    }
}
