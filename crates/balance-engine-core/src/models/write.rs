use std::sync::Arc;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use time::Date;

use super::Account;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateAccountsChartCommand {
    pub id: Arc<str>,
    pub name: Arc<str>,
    #[serde(default)]
    pub accounts: Vec<Account>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostingLine {
    pub account: Arc<str>,
    pub sector: Arc<str>,
    pub currency: Arc<str>,
    #[serde(default)]
    pub subledger_account: Option<Arc<str>>,
    pub amount: Decimal,
}

impl PostingLine {
    pub fn new(account: &str, sector: &str, currency: &str, amount: Decimal) -> Self {
        Self {
            account: Arc::from(account),
            sector: Arc::from(sector),
            currency: Arc::from(currency),
            subledger_account: None,
            amount,
        }
    }

    pub fn with_subledger_account(mut self, subledger_account: &str) -> Self {
        self.subledger_account = Some(Arc::from(subledger_account));
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum VoucherEntryCommand {
    Debit(PostingLine),
    Credit(PostingLine),
}

impl VoucherEntryCommand {
    pub fn line(&self) -> &PostingLine {
        match self {
            VoucherEntryCommand::Debit(line) | VoucherEntryCommand::Credit(line) => line,
        }
    }

    /// Debit-positive signed amount of the line.
    pub fn signed_amount(&self) -> Decimal {
        match self {
            VoucherEntryCommand::Debit(line) => line.amount,
            VoucherEntryCommand::Credit(line) => -line.amount,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateVoucherCommand {
    pub ledger: Arc<str>,
    pub date: Date,
    pub concept: Arc<str>,
    pub entries: Vec<VoucherEntryCommand>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetExchangeRateCommand {
    pub rate_type: Arc<str>,
    pub from_currency: Arc<str>,
    pub to_currency: Arc<str>,
    pub date: Date,
    pub value: Decimal,
}
