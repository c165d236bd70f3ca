use std::{collections::BTreeMap, sync::Arc};

use rust_decimal::Decimal;
use time::Date;

use crate::models::{
    query::BalanceFilter,
    read::BalanceRow,
    write::{CreateAccountsChartCommand, CreateVoucherCommand, SetExchangeRateCommand, VoucherEntryCommand},
    Account, AccountsChart, ExchangeRate,
};

use thiserror::Error;

// Postings are kept in whole cents by every backend.
const MONEY_SCALE: u32 = 2;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("{0}")]
    Other(String),
    #[error("no exchange rate found for {currency} ({rate_type}) on or before {date}")]
    NoRateFound {
        rate_type: String,
        currency: String,
        date: Date,
    },
    #[error("accounts chart not found: {0}")]
    AccountsChartNotFound(String),
    #[error("accounts chart already exists: {0}")]
    AccountsChartAlreadyExists(String),
    #[error("account not found: {0}")]
    AccountNotFound(String),
    #[error("voucher is not balanced in currency {currency}: debits {debits} != credits {credits}")]
    UnbalancedVoucher {
        currency: String,
        debits: String,
        credits: String,
    },
    #[error("amount {amount} on account {account} has more than two decimals")]
    InvalidAmount {
        account: String,
        amount: String,
    },
}

pub trait StorageBackend: Send + Sync {
    // Accounts charts
    fn create_accounts_chart(&self, command: &CreateAccountsChartCommand) -> Result<(), StorageError>;
    fn create_account(&self, chart_id: &str, account: &Account) -> Result<(), StorageError>;
    fn get_accounts_chart(&self, chart_id: &str) -> Result<AccountsChart, StorageError>;
    fn list_accounts_charts(&self) -> Vec<Arc<str>>;

    // Postings
    fn create_voucher(&self, chart_id: &str, command: &CreateVoucherCommand) -> Result<(), StorageError>;
    fn read_balances(&self, chart_id: &str, filter: &BalanceFilter) -> Result<Vec<BalanceRow>, StorageError>;

    // Exchange rates, all registered against a single base currency
    fn set_exchange_rate(&self, command: &SetExchangeRateCommand) -> Result<(), StorageError>;
    fn get_exchange_rate(&self, rate_type: &str, currency: &str, date: Date) -> Result<ExchangeRate, StorageError>;
}

/// Rejects vouchers whose debits and credits differ in any currency, or
/// that carry amounts finer than a cent.
pub fn ensure_balanced(command: &CreateVoucherCommand) -> Result<(), StorageError> {
    let mut sums: BTreeMap<&str, (Decimal, Decimal)> = BTreeMap::new();
    for entry in &command.entries {
        let line = entry.line();
        if line.amount.normalize().scale() > MONEY_SCALE {
            return Err(StorageError::InvalidAmount {
                account: line.account.to_string(),
                amount: line.amount.to_string(),
            });
        }
        let sum = sums.entry(entry.line().currency.as_ref()).or_default();
        match entry {
            VoucherEntryCommand::Debit(line) => sum.0 += line.amount,
            VoucherEntryCommand::Credit(line) => sum.1 += line.amount,
        }
    }

    for (currency, (debits, credits)) in sums {
        if debits != credits {
            return Err(StorageError::UnbalancedVoucher {
                currency: currency.to_string(),
                debits: debits.to_string(),
                credits: credits.to_string(),
            });
        }
    }
    Ok(())
}
