use std::{collections::BTreeMap, ops::Bound, sync::{Arc, RwLock}};

use rust_decimal::Decimal;
use time::Date;

use balance_engine_core::{
    ensure_balanced, Account, AccountsChart, BalanceFilter, BalanceKey, BalanceRow,
    CreateAccountsChartCommand, CreateVoucherCommand, ExchangeRate, SetExchangeRateCommand,
    VoucherEntryCommand,
};

// Re-export core storage types so callers can use crate::storage::*
pub use balance_engine_core::storage::{StorageBackend, StorageError};

#[derive(Clone)]
struct ChartData {
    chart: AccountsChart,
    ledger: LedgerStore,
}

pub struct InMemoryStorage {
    charts: RwLock<BTreeMap<Arc<str>, ChartData>>,
    rates: RwLock<BTreeMap<(Arc<str>, Arc<str>), RateStore>>,
}

impl Default for InMemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self {
            charts: RwLock::new(BTreeMap::new()),
            rates: RwLock::new(BTreeMap::new()),
        }
    }
}

impl StorageBackend for InMemoryStorage {
    fn create_accounts_chart(&self, command: &CreateAccountsChartCommand) -> Result<(), StorageError> {
        let mut charts = self.charts.write().unwrap();
        if charts.contains_key(&command.id) {
            return Err(StorageError::AccountsChartAlreadyExists(command.id.to_string()));
        }
        let mut chart = AccountsChart::new(&command.id, &command.name);
        for account in &command.accounts {
            chart.add_account(account.clone());
        }
        charts.insert(command.id.clone(), ChartData { chart, ledger: LedgerStore::new() });
        Ok(())
    }

    fn create_account(&self, chart_id: &str, account: &Account) -> Result<(), StorageError> {
        let mut charts = self.charts.write().unwrap();
        let data = charts.get_mut(chart_id)
            .ok_or_else(|| StorageError::AccountsChartNotFound(chart_id.to_string()))?;
        data.chart.add_account(account.clone());
        Ok(())
    }

    fn get_accounts_chart(&self, chart_id: &str) -> Result<AccountsChart, StorageError> {
        let charts = self.charts.read().unwrap();
        charts.get(chart_id)
            .map(|data| data.chart.clone())
            .ok_or_else(|| StorageError::AccountsChartNotFound(chart_id.to_string()))
    }

    fn list_accounts_charts(&self) -> Vec<Arc<str>> {
        self.charts.read().unwrap().keys().cloned().collect()
    }

    fn create_voucher(&self, chart_id: &str, command: &CreateVoucherCommand) -> Result<(), StorageError> {
        ensure_balanced(command)?;

        let mut charts = self.charts.write().unwrap();
        let data = charts.get_mut(chart_id)
            .ok_or_else(|| StorageError::AccountsChartNotFound(chart_id.to_string()))?;

        // all accounts are checked before anything is posted
        for entry in &command.entries {
            let account = &entry.line().account;
            if !data.chart.contains(account) {
                return Err(StorageError::AccountNotFound(account.to_string()));
            }
        }

        for entry in &command.entries {
            data.ledger.add_posting(command.date, Posting::new(&command.ledger, entry));
        }
        tracing::debug!(
            chart_id,
            ledger = %command.ledger,
            date = %command.date,
            postings = command.entries.len(),
            "Voucher posted"
        );
        Ok(())
    }

    fn read_balances(&self, chart_id: &str, filter: &BalanceFilter) -> Result<Vec<BalanceRow>, StorageError> {
        let charts = self.charts.read().unwrap();
        let data = charts.get(chart_id)
            .ok_or_else(|| StorageError::AccountsChartNotFound(chart_id.to_string()))?;
        Ok(data.ledger.balances(filter))
    }

    fn set_exchange_rate(&self, command: &SetExchangeRateCommand) -> Result<(), StorageError> {
        let mut rates = self.rates.write().unwrap();
        let store = rates
            .entry((command.rate_type.clone(), command.to_currency.clone()))
            .or_insert_with(RateStore::new);
        store.add_rate(ExchangeRate {
            from_currency: command.from_currency.clone(),
            to_currency: command.to_currency.clone(),
            rate_type: command.rate_type.clone(),
            date: command.date,
            value: command.value,
        });
        Ok(())
    }

    fn get_exchange_rate(&self, rate_type: &str, currency: &str, date: Date) -> Result<ExchangeRate, StorageError> {
        let rates = self.rates.read().unwrap();
        rates.get(&(Arc::from(rate_type), Arc::from(currency)))
            .and_then(|store| store.get_rate(date))
            .ok_or_else(|| StorageError::NoRateFound {
                rate_type: rate_type.to_string(),
                currency: currency.to_string(),
                date,
            })
    }
}

#[derive(Debug, Clone)]
struct Posting {
    key: BalanceKey,
    debit: Decimal,
    credit: Decimal,
}

impl Posting {
    fn new(ledger: &Arc<str>, entry: &VoucherEntryCommand) -> Self {
        let line = entry.line();
        let (debit, credit) = match entry {
            VoucherEntryCommand::Debit(line) => (line.amount, Decimal::ZERO),
            VoucherEntryCommand::Credit(line) => (Decimal::ZERO, line.amount),
        };
        Self {
            key: BalanceKey {
                ledger: ledger.clone(),
                currency: line.currency.clone(),
                account: line.account.clone(),
                sector: line.sector.clone(),
                subledger_account: line.subledger_account.clone(),
            },
            debit,
            credit,
        }
    }
}

#[derive(Clone)]
struct LedgerStore {
    days: BTreeMap<Date, Vec<Posting>>,
}

impl LedgerStore {
    pub fn new() -> Self {
        Self {
            days: BTreeMap::new(),
        }
    }

    pub fn add_posting(&mut self, date: Date, posting: Posting) {
        self.days.entry(date).or_default().push(posting);
    }

    /// Aggregates postings up to `filter.to_date` into one row per key.
    /// Keys whose initial balance and movements are all zero are dropped.
    pub fn balances(&self, filter: &BalanceFilter) -> Vec<BalanceRow> {
        let mut rows: BTreeMap<BalanceKey, BalanceRow> = BTreeMap::new();

        let days = self.days.range((Bound::Unbounded, Bound::Included(filter.to_date)));
        for (date, postings) in days {
            for posting in postings {
                let key = &posting.key;
                if !filter.matches(&key.ledger, &key.currency, &key.sector, &key.account) {
                    continue;
                }
                let mut key = key.clone();
                if !filter.with_subledger_accounts {
                    key.subledger_account = None;
                }

                let row = rows.entry(key.clone()).or_insert_with(|| BalanceRow {
                    key,
                    initial_balance: Decimal::ZERO,
                    debit: Decimal::ZERO,
                    credit: Decimal::ZERO,
                    last_change_date: None,
                });

                if *date < filter.from_date {
                    row.initial_balance += posting.debit - posting.credit;
                } else {
                    row.debit += posting.debit;
                    row.credit += posting.credit;
                }
                row.last_change_date = row.last_change_date.max(Some(*date));
            }
        }

        rows.into_values()
            .filter(|r| !(r.initial_balance.is_zero() && r.debit.is_zero() && r.credit.is_zero()))
            .collect()
    }
}

#[derive(Clone)]
struct RateStore {
    values: BTreeMap<Date, ExchangeRate>,
}

impl RateStore {
    pub fn new() -> Self {
        Self {
            values: BTreeMap::new(),
        }
    }

    pub fn add_rate(&mut self, rate: ExchangeRate) {
        self.values.insert(rate.date, rate);
    }

    /// Latest rate registered on or before `date`.
    pub fn get_rate(&self, date: Date) -> Option<ExchangeRate> {
        let mut rates = self.values.range((Bound::Unbounded, Bound::Included(date)));
        rates.next_back().map(|(_, rate)| rate.clone())
    }
}
