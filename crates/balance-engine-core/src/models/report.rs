use std::{fmt::Display, sync::Arc};

use prettytable::{row, Table};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{query::BalanceQuery, BalanceEntry, ItemType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Text,
    Decimal,
    Date,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportColumn {
    pub field: Arc<str>,
    pub title: Arc<str>,
    pub column_type: ColumnType,
}

impl ReportColumn {
    pub fn new(field: &str, title: &str, column_type: ColumnType) -> Self {
        Self {
            field: Arc::from(field),
            title: Arc::from(title),
            column_type,
        }
    }
}

/// An assembled report: the query echo, its column layout and the ordered rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub query: BalanceQuery,
    pub columns: Vec<ReportColumn>,
    pub entries: Vec<BalanceEntry>,
}

impl Report {
    pub fn rows_of(&self, item_type: ItemType) -> impl Iterator<Item = &BalanceEntry> {
        self.entries.iter().filter(move |e| e.item_type == item_type)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn opt<T: ToString>(value: &Option<T>) -> String {
    value.as_ref().map(|v| v.to_string()).unwrap_or_default()
}

fn label(entry: &BalanceEntry) -> String {
    match (&entry.account, entry.item_type) {
        (Some(account), _) => match &entry.account_name {
            Some(name) => format!("{} {}", account, name),
            None => account.to_string(),
        },
        (None, item_type) => item_type.to_string(),
    }
}

impl Display for Report {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut table = Table::new();
        table.add_row(row![
            "Type", "Ledger", "Currency", "Account", "Sector", "Subledger",
            "Initial", "Debit", "Credit", "Balance", "Equivalence"
        ]);
        table.add_empty_row();

        for entry in &self.entries {
            table.add_row(row![
                entry.item_type,
                opt(&entry.ledger),
                opt(&entry.currency),
                label(entry),
                entry.sector,
                opt(&entry.subledger_account),
                entry.initial_balance,
                entry.debit,
                entry.credit,
                entry.current_balance,
                opt::<Decimal>(&entry.total_equivalence)
            ]);
        }

        write!(f, "\n{} {} to {}\n{}\n", self.query.report_type, self.query.from_date, self.query.to_date, table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{query::ReportType, AccountNature, BalanceKey};
    use rust_decimal_macros::dec;
    use time::macros::date;

    #[test]
    fn test_display_renders_rows() {
        let mut entry = BalanceEntry::new(
            BalanceKey {
                ledger: Arc::from("01"),
                currency: Arc::from("MXN"),
                account: Arc::from("1101"),
                sector: Arc::from("00"),
                subledger_account: None,
            },
            AccountNature::Debtor,
            dec!(10000),
            dec!(0),
            dec!(300),
        );
        entry.account_name = Some(Arc::from("Caja"));

        let report = Report {
            query: BalanceQuery::new("IFRS", ReportType::Balanza, date!(2022 - 02 - 01), date!(2022 - 02 - 28)),
            columns: vec![ReportColumn::new("account", "Cuenta", ColumnType::Text)],
            entries: vec![entry],
        };

        let text = report.to_string();
        assert!(text.contains("Balanza"));
        assert!(text.contains("1101 Caja"));
        assert!(text.contains("9700"));
        assert_eq!(report.rows_of(ItemType::Entry).count(), 1);
    }
}
