use std::{collections::BTreeMap, fmt::Display, sync::Arc};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use time::Date;

pub mod query;
pub mod read;
pub mod report;
pub mod write;

/// Sector code used when a row is not broken down by sector.
pub const NO_SECTOR: &str = "00";

/// Rounds a monetary amount to the two decimals used across all balances.
pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp(2)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AccountNature {
    Debtor,
    Creditor,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub number: Arc<str>,
    pub name: Arc<str>,
    pub nature: AccountNature,
    #[serde(default)]
    pub parent: Option<Arc<str>>,
}

impl Account {
    pub fn new(number: &str, name: &str, nature: AccountNature, parent: Option<&str>) -> Self {
        Self {
            number: Arc::from(number),
            name: Arc::from(name),
            nature,
            parent: parent.map(Arc::from),
        }
    }
}

/// An accounts chart ("catálogo de cuentas"). Hierarchy is given by each
/// account's `parent` link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountsChart {
    pub id: Arc<str>,
    pub name: Arc<str>,
    accounts: BTreeMap<Arc<str>, Account>,
}

impl AccountsChart {
    pub fn new(id: &str, name: &str) -> Self {
        Self {
            id: Arc::from(id),
            name: Arc::from(name),
            accounts: BTreeMap::new(),
        }
    }

    pub fn add_account(&mut self, account: Account) {
        self.accounts.insert(account.number.clone(), account);
    }

    pub fn get_account(&self, number: &str) -> Option<&Account> {
        self.accounts.get(number)
    }

    pub fn contains(&self, number: &str) -> bool {
        self.accounts.contains_key(number)
    }

    pub fn accounts(&self) -> impl Iterator<Item = &Account> {
        self.accounts.values()
    }

    /// Ancestors of `number`, nearest parent first. Stops on a dangling
    /// parent link or a cycle.
    pub fn ancestors(&self, number: &str) -> Vec<&Account> {
        let mut result: Vec<&Account> = Vec::new();
        let mut current = self.accounts.get(number).and_then(|a| a.parent.clone());

        while let Some(parent) = current {
            let Some(account) = self.accounts.get(&parent) else {
                break;
            };
            if account.number.as_ref() == number || result.iter().any(|a| a.number == account.number) {
                break;
            }
            result.push(account);
            current = account.parent.clone();
        }

        result
    }

    pub fn level(&self, number: &str) -> u32 {
        self.ancestors(number).len() as u32 + 1
    }

    pub fn has_children(&self, number: &str) -> bool {
        self.accounts
            .values()
            .any(|a| a.parent.as_deref() == Some(number))
    }

    pub fn is_descendant_or_self(&self, number: &str, root: &str) -> bool {
        number == root || self.ancestors(number).iter().any(|a| a.number.as_ref() == root)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ItemType {
    Entry,
    Summary,
    Group,
    Total,
    BalanceTotalDebtor,
    BalanceTotalCreditor,
    BalanceTotalCurrency,
    BalanceTotalConsolidated,
}

impl ItemType {
    /// Position of the row kind among rows sharing the same account key.
    pub fn sort_order(&self) -> u8 {
        match self {
            ItemType::Group => 0,
            ItemType::Summary => 1,
            ItemType::Entry => 2,
            ItemType::Total => 3,
            ItemType::BalanceTotalDebtor => 4,
            ItemType::BalanceTotalCreditor => 5,
            ItemType::BalanceTotalCurrency => 6,
            ItemType::BalanceTotalConsolidated => 7,
        }
    }

    pub fn is_total(&self) -> bool {
        matches!(
            self,
            ItemType::Total
                | ItemType::BalanceTotalDebtor
                | ItemType::BalanceTotalCreditor
                | ItemType::BalanceTotalCurrency
                | ItemType::BalanceTotalConsolidated
        )
    }
}

impl Display for ItemType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ItemType::Entry => "Entry",
            ItemType::Summary => "Summary",
            ItemType::Group => "Group",
            ItemType::Total => "Total",
            ItemType::BalanceTotalDebtor => "BalanceTotalDebtor",
            ItemType::BalanceTotalCreditor => "BalanceTotalCreditor",
            ItemType::BalanceTotalCurrency => "BalanceTotalCurrency",
            ItemType::BalanceTotalConsolidated => "BalanceTotalConsolidated",
        };
        f.write_str(name)
    }
}

/// Full key of a posting-level balance line.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceKey {
    pub ledger: Arc<str>,
    pub currency: Arc<str>,
    pub account: Arc<str>,
    pub sector: Arc<str>,
    pub subledger_account: Option<Arc<str>>,
}

/// One row of a balance report.
///
/// Balances are signed debit-positive: `current_balance` is always
/// `initial_balance + debit - credit`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceEntry {
    pub item_type: ItemType,
    pub ledger: Option<Arc<str>>,
    pub currency: Option<Arc<str>>,
    pub account: Option<Arc<str>>,
    pub account_name: Option<Arc<str>>,
    pub sector: Arc<str>,
    pub subledger_account: Option<Arc<str>>,
    pub level: u32,
    pub nature: AccountNature,
    pub initial_balance: Decimal,
    pub debit: Decimal,
    pub credit: Decimal,
    pub current_balance: Decimal,
    pub exchange_rate: Option<Decimal>,
    pub valued_exchange_rate: Option<Decimal>,
    pub total_equivalence: Option<Decimal>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub by_currency: BTreeMap<Arc<str>, Decimal>,
    pub last_change_date: Option<Date>,
}

impl BalanceEntry {
    /// Builds an `Entry` row from a key and its movements.
    pub fn new(key: BalanceKey, nature: AccountNature, initial_balance: Decimal, debit: Decimal, credit: Decimal) -> Self {
        let initial_balance = round_money(initial_balance);
        let debit = round_money(debit);
        let credit = round_money(credit);
        Self {
            item_type: ItemType::Entry,
            ledger: Some(key.ledger),
            currency: Some(key.currency),
            account: Some(key.account),
            account_name: None,
            sector: key.sector,
            subledger_account: key.subledger_account,
            level: 1,
            nature,
            initial_balance,
            debit,
            credit,
            current_balance: round_money(initial_balance + debit - credit),
            exchange_rate: None,
            valued_exchange_rate: None,
            total_equivalence: None,
            by_currency: BTreeMap::new(),
            last_change_date: None,
        }
    }

    /// An empty total row of the given kind.
    pub fn total(item_type: ItemType, currency: Option<Arc<str>>, nature: AccountNature) -> Self {
        Self {
            item_type,
            ledger: None,
            currency,
            account: None,
            account_name: None,
            sector: Arc::from(NO_SECTOR),
            subledger_account: None,
            level: 0,
            nature,
            initial_balance: Decimal::ZERO,
            debit: Decimal::ZERO,
            credit: Decimal::ZERO,
            current_balance: Decimal::ZERO,
            exchange_rate: None,
            valued_exchange_rate: None,
            total_equivalence: None,
            by_currency: BTreeMap::new(),
            last_change_date: None,
        }
    }

    pub fn is_entry(&self) -> bool {
        self.item_type == ItemType::Entry
    }

    pub fn with_item_type(mut self, item_type: ItemType) -> Self {
        self.item_type = item_type;
        self
    }

    /// Folds `other` into a copy of `self`. Every monetary field is summed
    /// and rounded; the last change date is the later of both.
    pub fn combine(&self, other: &BalanceEntry) -> BalanceEntry {
        let mut result = self.clone();
        result.initial_balance = round_money(self.initial_balance + other.initial_balance);
        result.debit = round_money(self.debit + other.debit);
        result.credit = round_money(self.credit + other.credit);
        result.current_balance = round_money(self.current_balance + other.current_balance);
        result.total_equivalence = match (self.total_equivalence, other.total_equivalence) {
            (None, None) => None,
            (a, b) => Some(round_money(a.unwrap_or_default() + b.unwrap_or_default())),
        };
        for (currency, amount) in &other.by_currency {
            let sum = result.by_currency.entry(currency.clone()).or_insert(Decimal::ZERO);
            *sum = round_money(*sum + amount);
        }
        result.last_change_date = self.last_change_date.max(other.last_change_date);
        result
    }

    /// Balance used when adding rows of different currencies together.
    pub fn comparable_balance(&self) -> Decimal {
        self.total_equivalence.unwrap_or(self.current_balance)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExchangeRate {
    pub from_currency: Arc<str>,
    pub to_currency: Arc<str>,
    pub rate_type: Arc<str>,
    pub date: Date,
    pub value: Decimal,
}
