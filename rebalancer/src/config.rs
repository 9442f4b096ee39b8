//! TOML configuration loading and validation.

use std::path::Path;

use rust_decimal::Decimal;
use serde::Deserialize;

use crate::error::{Error, Result};

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub connection: ConnectionConfig,
    pub account: AccountConfig,
    pub execution: ExecutionConfig,
    pub risk: RiskConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConnectionConfig {
    pub kind: ConnectionKind,
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub api_key_env: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionKind {
    Paper,
    Live,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AccountConfig {
    pub base_currency: String,
    pub through_trade_currencies: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExecutionConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_wait_seconds")]
    pub wait_seconds: u64,
    #[serde(default = "default_order_interval_ms")]
    pub order_interval_ms: u64,
    #[serde(default = "default_dust_notional_threshold")]
    pub dust_notional_threshold: Decimal,
}

fn default_max_retries() -> u32 {
    3
}
fn default_wait_seconds() -> u64 {
    15
}
fn default_order_interval_ms() -> u64 {
    250
}
fn default_dust_notional_threshold() -> Decimal {
    Decimal::TEN
}

#[derive(Debug, Clone, Deserialize)]
pub struct RiskConfig {
    #[serde(default = "default_min_trade")]
    pub min_trade_usd: f64,
    #[serde(default = "default_max_orders")]
    pub max_orders_per_run: usize,
}

fn default_min_trade() -> f64 {
    5.0
}
fn default_max_orders() -> usize {
    50
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_dir")]
    pub dir: String,
    #[serde(default = "default_audit_file")]
    pub audit_file: String,
}

fn default_log_dir() -> String {
    "./logs".into()
}
fn default_audit_file() -> String {
    "audit.jsonl".into()
}

impl Config {
    /// Load config from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| Error::ConfigRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate config invariants.
    fn validate(&self) -> Result<()> {
        if self.account.base_currency.is_empty() {
            return Err(Error::Config("account.base_currency must not be empty".into()));
        }
        if self.account.through_trade_currencies.is_empty() {
            return Err(Error::Config(
                "account.through_trade_currencies must not be empty".into(),
            ));
        }
        if !self
            .account
            .through_trade_currencies
            .iter()
            .any(|c| c.eq_ignore_ascii_case(&self.account.base_currency))
        {
            return Err(Error::Config(
                "account.through_trade_currencies must include the base currency".into(),
            ));
        }
        if self.connection.kind == ConnectionKind::Live && self.connection.api_key_env.is_none() {
            return Err(Error::Config(
                "connection.api_key_env is required for a live connection".into(),
            ));
        }
        if self.execution.dust_notional_threshold < Decimal::ZERO {
            return Err(Error::Config(
                "execution.dust_notional_threshold must be >= 0".into(),
            ));
        }
        if self.risk.min_trade_usd < 0.0 {
            return Err(Error::Config("risk.min_trade_usd must be >= 0".into()));
        }
        if self.risk.max_orders_per_run == 0 {
            return Err(Error::Config(
                "risk.max_orders_per_run must be > 0".into(),
            ));
        }
        Ok(())
    }

    /// Full path to the audit log file.
    pub fn audit_path(&self) -> std::path::PathBuf {
        Path::new(&self.logging.dir).join(&self.logging.audit_file)
    }
}
