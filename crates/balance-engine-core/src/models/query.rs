use std::{fmt::Display, str::FromStr, sync::Arc};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::Date;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueryError {
    #[error("accounts chart is required")]
    MissingAccountsChart,
    #[error("from date {from} is after to date {to}")]
    InvalidDateRange { from: Date, to: Date },
    #[error("level must be greater than zero")]
    InvalidLevel,
    #[error("account range is inverted: {from} > {to}")]
    InvalidAccountRange { from: String, to: String },
    #[error("valuation requires {0}")]
    InvalidValuation(&'static str),
    #[error("unknown report type: {0}")]
    UnknownReportType(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ReportType {
    Balanza,
    AnaliticoDeCuentas,
    BalanzaDolarizada,
    SaldosPorCuenta,
    BalanzaEnColumnasPorMoneda,
}

impl ReportType {
    pub const ALL: [ReportType; 5] = [
        ReportType::Balanza,
        ReportType::AnaliticoDeCuentas,
        ReportType::BalanzaDolarizada,
        ReportType::SaldosPorCuenta,
        ReportType::BalanzaEnColumnasPorMoneda,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ReportType::Balanza => "Balanza",
            ReportType::AnaliticoDeCuentas => "AnaliticoDeCuentas",
            ReportType::BalanzaDolarizada => "BalanzaDolarizada",
            ReportType::SaldosPorCuenta => "SaldosPorCuenta",
            ReportType::BalanzaEnColumnasPorMoneda => "BalanzaEnColumnasPorMoneda",
        }
    }

    /// Path segment used by the HTTP surface.
    pub fn slug(&self) -> &'static str {
        match self {
            ReportType::Balanza => "balanza",
            ReportType::AnaliticoDeCuentas => "analitico-de-cuentas",
            ReportType::BalanzaDolarizada => "balanza-dolarizada",
            ReportType::SaldosPorCuenta => "saldos-por-cuenta",
            ReportType::BalanzaEnColumnasPorMoneda => "balanza-columnas-moneda",
        }
    }

    pub fn from_slug(slug: &str) -> Option<ReportType> {
        ReportType::ALL.into_iter().find(|r| r.slug() == slug)
    }
}

impl Display for ReportType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReportType {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ReportType::ALL
            .into_iter()
            .find(|r| r.as_str().eq_ignore_ascii_case(s))
            .or_else(|| ReportType::from_slug(s))
            .ok_or_else(|| QueryError::UnknownReportType(s.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValuationOptions {
    pub currency: Arc<str>,
    pub rate_type: Arc<str>,
    /// Defaults to the query's `to_date`.
    #[serde(default)]
    pub date: Option<Date>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceQuery {
    pub accounts_chart: Arc<str>,
    pub report_type: ReportType,
    pub from_date: Date,
    pub to_date: Date,
    #[serde(default)]
    pub ledgers: Vec<Arc<str>>,
    #[serde(default)]
    pub currencies: Vec<Arc<str>>,
    #[serde(default)]
    pub sectors: Vec<Arc<str>>,
    #[serde(default)]
    pub from_account: Option<Arc<str>>,
    #[serde(default)]
    pub to_account: Option<Arc<str>>,
    #[serde(default)]
    pub level: Option<u32>,
    /// Consolidate all ledgers into one set of rows.
    #[serde(default)]
    pub consolidated: bool,
    #[serde(default)]
    pub with_sectors: bool,
    #[serde(default)]
    pub with_subledger_accounts: bool,
    #[serde(default)]
    pub valuation: Option<ValuationOptions>,
}

impl BalanceQuery {
    pub fn new(accounts_chart: &str, report_type: ReportType, from_date: Date, to_date: Date) -> Self {
        Self {
            accounts_chart: Arc::from(accounts_chart),
            report_type,
            from_date,
            to_date,
            ledgers: Vec::new(),
            currencies: Vec::new(),
            sectors: Vec::new(),
            from_account: None,
            to_account: None,
            level: None,
            consolidated: false,
            with_sectors: false,
            with_subledger_accounts: false,
            valuation: None,
        }
    }

    pub fn validate(&self) -> Result<(), QueryError> {
        if self.accounts_chart.trim().is_empty() {
            return Err(QueryError::MissingAccountsChart);
        }
        if self.from_date > self.to_date {
            return Err(QueryError::InvalidDateRange {
                from: self.from_date,
                to: self.to_date,
            });
        }
        if self.level == Some(0) {
            return Err(QueryError::InvalidLevel);
        }
        if let (Some(from), Some(to)) = (&self.from_account, &self.to_account) {
            if from > to && !from.starts_with(to.as_ref()) {
                return Err(QueryError::InvalidAccountRange {
                    from: from.to_string(),
                    to: to.to_string(),
                });
            }
        }
        if let Some(valuation) = &self.valuation {
            if valuation.currency.trim().is_empty() {
                return Err(QueryError::InvalidValuation("a currency"));
            }
            if valuation.rate_type.trim().is_empty() {
                return Err(QueryError::InvalidValuation("a rate type"));
            }
        }
        Ok(())
    }
}

/// Fetch filter handed to storage backends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BalanceFilter {
    pub from_date: Date,
    pub to_date: Date,
    pub ledgers: Vec<Arc<str>>,
    pub currencies: Vec<Arc<str>>,
    pub sectors: Vec<Arc<str>>,
    pub from_account: Option<Arc<str>>,
    pub to_account: Option<Arc<str>>,
    pub with_subledger_accounts: bool,
}

impl BalanceFilter {
    pub fn from_query(query: &BalanceQuery) -> Self {
        Self {
            from_date: query.from_date,
            to_date: query.to_date,
            ledgers: query.ledgers.clone(),
            currencies: query.currencies.clone(),
            sectors: query.sectors.clone(),
            from_account: query.from_account.clone(),
            to_account: query.to_account.clone(),
            with_subledger_accounts: query.with_subledger_accounts
                || query.report_type == ReportType::SaldosPorCuenta,
        }
    }

    /// `to_account` is inclusive of its subaccounts: "2" admits "2101".
    pub fn matches_account(&self, number: &str) -> bool {
        let above = match &self.from_account {
            Some(from) => number >= from.as_ref(),
            None => true,
        };
        let below = match &self.to_account {
            Some(to) => number <= to.as_ref() || number.starts_with(to.as_ref()),
            None => true,
        };
        above && below
    }

    pub fn matches(&self, ledger: &str, currency: &str, sector: &str, account: &str) -> bool {
        (self.ledgers.is_empty() || self.ledgers.iter().any(|l| l.as_ref() == ledger))
            && (self.currencies.is_empty() || self.currencies.iter().any(|c| c.as_ref() == currency))
            && (self.sectors.is_empty() || self.sectors.iter().any(|s| s.as_ref() == sector))
            && self.matches_account(account)
    }
}
