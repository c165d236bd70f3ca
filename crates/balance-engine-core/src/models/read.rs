use rust_decimal::Decimal;
use time::Date;

use super::BalanceKey;

/// A balance line as aggregated by a storage backend, before it is
/// enriched with account data from the chart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BalanceRow {
    pub key: BalanceKey,
    pub initial_balance: Decimal,
    pub debit: Decimal,
    pub credit: Decimal,
    pub last_change_date: Option<Date>,
}
