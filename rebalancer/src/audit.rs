//! JSONL audit trail logging.
//!
//! Each rebalancer run appends events to an audit.jsonl file, one JSON
//! object per line.

use std::fs::{self, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::currency::Currency;
use crate::error::Result;
use crate::exchange::{FillReport, OrderState};
use crate::types::{Order, PriceEstimates, Resources, Transfer};

/// An audit event written to the JSONL trail.
#[derive(Debug, Clone, Serialize)]
pub struct AuditEvent {
    pub event: &'static str,
    pub ts: DateTime<Utc>,
    #[serde(flatten)]
    pub data: serde_json::Value,
}

/// Append-only audit logger.
pub struct AuditLog {
    writer: BufWriter<std::fs::File>,
}

impl AuditLog {
    /// Open (or create) the audit log file for appending.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new().create(true).append(true).open(path)?;

        Ok(Self {
            writer: BufWriter::new(file),
        })
    }

    /// Log an event with arbitrary JSON data.
    pub fn log(&mut self, event: &'static str, data: serde_json::Value) -> Result<()> {
        let entry = AuditEvent {
            event,
            ts: Utc::now(),
            data,
        };
        let json = serde_json::to_string(&entry)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        writeln!(self.writer, "{json}")?;
        self.writer.flush()?;
        Ok(())
    }

    /// Log a simple event with no additional data.
    pub fn log_simple(&mut self, event: &'static str) -> Result<()> {
        self.log(event, serde_json::json!({}))
    }
}

/// Convenience: log a run start event.
pub fn log_run_started(
    audit: &mut AuditLog,
    weights_file: &str,
    base_currency: &Currency,
    mode: &str,
) -> Result<()> {
    audit.log(
        "run_started",
        serde_json::json!({
            "weights_file": weights_file,
            "base_currency": base_currency,
            "mode": mode,
        }),
    )
}

/// Convenience: log resources and price estimates fetched from the exchange.
pub fn log_resources_fetched(
    audit: &mut AuditLog,
    resources: &Resources,
    price_estimates: &PriceEstimates,
) -> Result<()> {
    audit.log(
        "resources_fetched",
        serde_json::json!({
            "resources": resources,
            "price_estimates": price_estimates,
        }),
    )
}

/// Convenience: log the routing planner's computed transfers.
pub fn log_plan_computed(audit: &mut AuditLog, transfers: &[Transfer]) -> Result<()> {
    let data: Vec<_> = transfers
        .iter()
        .map(|t| {
            serde_json::json!({
                "from": t.from,
                "to": t.to,
                "amount": t.amount,
            })
        })
        .collect();
    audit.log("plan_computed", serde_json::json!({ "transfers": data }))
}

/// Convenience: log an order submission.
pub fn log_order_submitted(audit: &mut AuditLog, order: &Order) -> Result<()> {
    audit.log(
        "order_submitted",
        serde_json::json!({
            "product": order.product,
            "order_type": order.order_type,
            "action": order.action.as_lowercase_str(),
            "quantity": order.quantity,
            "price": order.price,
        }),
    )
}

/// Convenience: log a limit order's fill state after inspection.
pub fn log_order_filled(audit: &mut AuditLog, state: &OrderState) -> Result<()> {
    audit.log(
        "order_filled",
        serde_json::json!({
            "orig_quantity": state.orig_quantity,
            "executed_quantity": state.executed_quantity,
            "residual": state.residual(),
        }),
    )
}

/// Convenience: log a market-order fill report.
pub fn log_market_fill(audit: &mut AuditLog, report: &FillReport) -> Result<()> {
    audit.log(
        "order_filled",
        serde_json::json!({
            "product": report.product,
            "action": report.side.as_lowercase_str(),
            "executed_quantity": report.executed_quantity,
            "mean_price": report.mean_price,
            "commission_base": report.commission_base,
        }),
    )
}

/// Convenience: log the start of a limit-executor retry iteration.
pub fn log_retry_started(audit: &mut AuditLog, attempt: u32, max_retries: u32) -> Result<()> {
    audit.log(
        "retry_started",
        serde_json::json!({
            "attempt": attempt,
            "max_retries": max_retries,
        }),
    )
}

/// Convenience: log run completion.
pub fn log_run_completed(audit: &mut AuditLog, complete: bool, orders_submitted: usize) -> Result<()> {
    audit.log(
        "run_completed",
        serde_json::json!({
            "complete": complete,
            "orders_submitted": orders_submitted,
        }),
    )
}
