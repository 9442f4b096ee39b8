//! Target portfolio specification (weights.json) loading and validation.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::currency::Currency;
use crate::error::{Error, Result};
use crate::types::Weights;

/// A target portfolio specification: a set of desired currency weights.
#[derive(Debug, Clone, Deserialize)]
pub struct TargetSpec {
    pub timestamp: DateTime<Utc>,
    pub targets: Vec<TargetWeight>,
}

/// A single target position: currency + weight in `[0, 1]`.
#[derive(Debug, Clone, Deserialize)]
pub struct TargetWeight {
    pub currency: String,
    pub weight: f64,
}

impl TargetSpec {
    /// Load and validate a weights.json file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| Error::WeightsRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        let spec: TargetSpec = serde_json::from_str(&contents)?;
        spec.validate()?;
        Ok(spec)
    }

    /// Parse from a JSON string (useful for testing).
    pub fn from_json(json: &str) -> Result<Self> {
        let spec: TargetSpec = serde_json::from_str(json)?;
        spec.validate()?;
        Ok(spec)
    }

    /// Validate the target specification. Unlike an equities target (which
    /// may carry short positions), spot holdings can't go negative, so every
    /// weight must land in `[0, 1]`.
    fn validate(&self) -> Result<()> {
        if self.targets.is_empty() {
            return Err(Error::Weights("targets list is empty".into()));
        }

        let mut seen = std::collections::HashSet::new();
        for t in &self.targets {
            if !seen.insert(&t.currency) {
                return Err(Error::Weights(format!(
                    "duplicate currency: {}",
                    t.currency
                )));
            }
            if t.currency.is_empty() {
                return Err(Error::Weights("empty currency symbol".into()));
            }
            if t.weight < 0.0 || t.weight > 1.0 {
                return Err(Error::Weights(format!(
                    "weight for {} ({}) must be in [0, 1]",
                    t.currency, t.weight
                )));
            }
        }

        let total: f64 = self.targets.iter().map(|t| t.weight).sum();
        if total <= 0.0 {
            return Err(Error::Weights("weights sum to zero".into()));
        }

        Ok(())
    }

    /// Convert to a [`Weights`] map. Callers still normalize via
    /// [`crate::pricing::normalize_weights`] before planning — this only
    /// converts representation.
    pub fn as_weights(&self) -> Result<Weights> {
        self.targets
            .iter()
            .map(|t| Ok((Currency::new(t.currency.clone())?, decimal_from_f64(t.weight))))
            .collect()
    }
}

fn decimal_from_f64(value: f64) -> rust_decimal::Decimal {
    rust_decimal::Decimal::from_str_exact(&format!("{value}"))
        .unwrap_or(rust_decimal::Decimal::ZERO)
}
