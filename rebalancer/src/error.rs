//! Error types for the rebalancer.

use std::path::PathBuf;

use crate::currency::Currency;

/// All errors that can occur during rebalancer operation.
///
/// `UnsupportedPair` is recoverable at the level of a single transfer:
/// callers log and skip. `ExchangeError` and `InvariantViolation` abort the
/// current rebalance invocation. A rejected-by-filters order (spec §7's
/// `FilterRejection`) isn't represented here at all: `Exchange::validate_order`
/// resolves it as `Ok(None)` and callers drop the dust directly, so there is
/// no error value to construct for it.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("no listed product for transfer {from} -> {to}")]
    UnsupportedPair { from: Currency, to: Currency },

    #[error("exchange error: {0}")]
    ExchangeError(String),

    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("failed to read config file {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("weights file error: {0}")]
    Weights(String),

    #[error("failed to read weights file {path}: {source}")]
    WeightsRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse weights JSON: {0}")]
    WeightsParse(#[from] serde_json::Error),

    #[error("execution aborted: {0}")]
    Aborted(String),

    #[error("reconciliation error: {0}")]
    Reconcile(String),

    #[error("audit log error: {0}")]
    Audit(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
