//! Post-execution reconciliation: compare actual currency weights vs target.

use rust_decimal::Decimal;
use serde::Serialize;

use crate::currency::Currency;
use crate::pricing::weights_from_resources;
use crate::types::{PriceEstimates, Resources, Weights};

/// Reconciliation report comparing actual vs target weights.
#[derive(Debug, Clone, Serialize)]
pub struct ReconcileReport {
    pub entries: Vec<ReconcileEntry>,
    pub tracking_error: Decimal,
}

/// One currency's reconciliation entry.
#[derive(Debug, Clone, Serialize)]
pub struct ReconcileEntry {
    pub currency: Currency,
    pub target_weight: Decimal,
    pub actual_weight: Decimal,
    pub diff_weight: Decimal,
}

/// Compare `resources`' actual weights (valued via `price_estimates`) against
/// `target`. Returns a report with per-currency comparison and an overall
/// tracking error (root-mean-square weight deviation).
pub fn reconcile(
    resources: &Resources,
    target: &Weights,
    price_estimates: &PriceEstimates,
) -> crate::error::Result<ReconcileReport> {
    let actual = weights_from_resources(resources, price_estimates)?;

    let mut currencies: Vec<Currency> = actual.keys().chain(target.keys()).cloned().collect();
    currencies.sort();
    currencies.dedup();

    let mut entries = Vec::new();
    let mut sum_sq_diff = Decimal::ZERO;

    for currency in &currencies {
        let target_weight = target.get(currency).copied().unwrap_or(Decimal::ZERO);
        let actual_weight = actual.get(currency).copied().unwrap_or(Decimal::ZERO);
        let diff_weight = actual_weight - target_weight;
        sum_sq_diff += diff_weight * diff_weight;

        entries.push(ReconcileEntry {
            currency: currency.clone(),
            target_weight,
            actual_weight,
            diff_weight,
        });
    }

    let count = Decimal::from(currencies.len().max(1) as u64);
    let tracking_error = (sum_sq_diff / count).sqrt().unwrap_or(Decimal::ZERO);

    Ok(ReconcileReport {
        entries,
        tracking_error,
    })
}

impl std::fmt::Display for ReconcileReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "RECONCILIATION:")?;
        writeln!(
            f,
            "  {:8} {:>10} {:>10} {:>10}",
            "Currency", "Target%", "Actual%", "Diff%"
        )?;
        for e in &self.entries {
            writeln!(
                f,
                "  {:8} {:>9.2}% {:>9.2}% {:>+9.2}%",
                e.currency,
                e.target_weight * Decimal::ONE_HUNDRED,
                e.actual_weight * Decimal::ONE_HUNDRED,
                e.diff_weight * Decimal::ONE_HUNDRED,
            )?;
        }
        writeln!(f, "\n  Tracking error: {:.4}", self.tracking_error)?;
        Ok(())
    }
}
