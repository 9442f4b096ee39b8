//! Statistics builder (spec §4.G): normalizes exchange fill reports into
//! per-trade records for the persistence sink.

use rust_decimal::Decimal;
use serde::Serialize;

use crate::currency::Product;
use crate::exchange::FillReport;
use crate::types::Action;

/// One normalized trade record, ready for the persistence layer (out of
/// scope for this crate — see spec §1).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderStatistics {
    pub user: String,
    pub pair: Product,
    pub mid_market_price: Decimal,
    pub average_exec_price: Decimal,
    pub volume: Decimal,
    pub fee: Decimal,
    pub action: &'static str,
}

/// Convert fill reports into [`OrderStatistics`] for `user`.
///
/// `volume = executed_quantity * mean_price + commission_base`: the
/// commission is already expressed in base-currency terms by the exchange
/// adapter (spec §9's open question on commission currency), so it is added
/// directly rather than converted here.
pub fn create_order_statistics(responses: &[FillReport], user: &str) -> Vec<OrderStatistics> {
    responses
        .iter()
        .map(|report| OrderStatistics {
            user: user.to_string(),
            pair: report.product.clone(),
            mid_market_price: report.mid_market_price,
            average_exec_price: report.mean_price,
            volume: report.executed_quantity * report.mean_price + report.commission_base,
            fee: report.commission_base,
            action: report.side.as_lowercase_str(),
        })
        .collect()
}
