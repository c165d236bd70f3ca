use std::sync::Arc;

use balance_engine_core::{AccountNature, AccountsChart, BalanceEntry, BalanceFilter, BalanceQuery, BalanceRow};

use crate::{error::EngineError, storage::StorageBackend};

/// Fetches posting-level balance lines for a query and enriches them with
/// chart data.
pub struct BalanceReader {
    storage: Arc<dyn StorageBackend>,
}

impl BalanceReader {
    pub fn new(storage: Arc<dyn StorageBackend>) -> Self {
        Self { storage }
    }

    /// Returns the query's accounts chart together with one `Entry` row per
    /// balance key, ordered by key.
    pub fn read(&self, query: &BalanceQuery) -> Result<(AccountsChart, Vec<BalanceEntry>), EngineError> {
        let chart = self.storage.get_accounts_chart(&query.accounts_chart)?;
        let filter = BalanceFilter::from_query(query);
        let rows = self.storage.read_balances(&query.accounts_chart, &filter)?;

        let entries: Vec<BalanceEntry> = rows.into_iter().map(|row| to_entry(&chart, row)).collect();

        tracing::debug!(
            chart = %query.accounts_chart,
            from = %query.from_date,
            to = %query.to_date,
            rows = entries.len(),
            "Balances read"
        );

        Ok((chart, entries))
    }
}

fn to_entry(chart: &AccountsChart, row: BalanceRow) -> BalanceEntry {
    let account = chart.get_account(&row.key.account);
    let nature = account.map(|a| a.nature).unwrap_or(AccountNature::Debtor);
    let account_name = account.map(|a| a.name.clone());
    let level = chart.level(&row.key.account);

    let mut entry = BalanceEntry::new(row.key, nature, row.initial_balance, row.debit, row.credit);
    entry.account_name = account_name;
    entry.level = level;
    entry.last_change_date = row.last_change_date;
    entry
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryStorage;
    use balance_engine_core::{
        Account, CreateAccountsChartCommand, CreateVoucherCommand, PostingLine, ReportType, VoucherEntryCommand,
    };
    use rust_decimal_macros::dec;
    use time::macros::date;

    fn storage() -> Arc<dyn StorageBackend> {
        let storage = InMemoryStorage::new();
        storage
            .create_accounts_chart(&CreateAccountsChartCommand {
                id: Arc::from("IFRS"),
                name: Arc::from("IFRS"),
                accounts: vec![
                    Account::new("2", "Pasivo", AccountNature::Creditor, None),
                    Account::new("2101", "Depositos", AccountNature::Creditor, Some("2")),
                    Account::new("1101", "Caja", AccountNature::Debtor, None),
                ],
            })
            .unwrap();
        storage
            .create_voucher(
                "IFRS",
                &CreateVoucherCommand {
                    ledger: Arc::from("01"),
                    date: date!(2022 - 02 - 10),
                    concept: Arc::from("Deposit"),
                    entries: vec![
                        VoucherEntryCommand::Debit(PostingLine::new("1101", "00", "MXN", dec!(500))),
                        VoucherEntryCommand::Credit(PostingLine::new("2101", "00", "MXN", dec!(500))),
                    ],
                },
            )
            .unwrap();
        Arc::new(storage)
    }

    #[test]
    fn test_read_enriches_from_chart() {
        let reader = BalanceReader::new(storage());
        let query = BalanceQuery::new("IFRS", ReportType::Balanza, date!(2022 - 02 - 01), date!(2022 - 02 - 28));
        let (chart, entries) = reader.read(&query).unwrap();

        assert_eq!(chart.id.as_ref(), "IFRS");
        assert_eq!(entries.len(), 2);
        let deposits = &entries[1];
        assert_eq!(deposits.account.as_deref(), Some("2101"));
        assert_eq!(deposits.account_name.as_deref(), Some("Depositos"));
        assert_eq!(deposits.nature, AccountNature::Creditor);
        assert_eq!(deposits.level, 2);
        assert_eq!(deposits.current_balance, dec!(-500));
        assert_eq!(deposits.last_change_date, Some(date!(2022 - 02 - 10)));
    }

    #[test]
    fn test_read_unknown_chart() {
        let reader = BalanceReader::new(storage());
        let query = BalanceQuery::new("NOPE", ReportType::Balanza, date!(2022 - 02 - 01), date!(2022 - 02 - 28));
        assert!(matches!(reader.read(&query), Err(EngineError::NotFound(_))));
    }

    #[test]
    fn test_read_empty_period() {
        let reader = BalanceReader::new(storage());
        let query = BalanceQuery::new("IFRS", ReportType::Balanza, date!(2021 - 01 - 01), date!(2021 - 12 - 31));
        let (_, entries) = reader.read(&query).unwrap();
        assert!(entries.is_empty());
    }
}
