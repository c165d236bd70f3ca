//! Core types and traits for Balance Engine storage backends.
//!
//! This crate provides the `StorageBackend` trait together with the balance,
//! query and report models shared by the pipeline and its storage
//! implementations.

pub mod models;
pub mod storage;

// Re-export key types at crate root for convenience
pub use models::{
    round_money, Account, AccountNature, AccountsChart, BalanceEntry, BalanceKey, ExchangeRate, ItemType, NO_SECTOR,
};
pub use models::query::{BalanceFilter, BalanceQuery, QueryError, ReportType, ValuationOptions};
pub use models::read::BalanceRow;
pub use models::report::{ColumnType, Report, ReportColumn};
pub use models::write::{
    CreateAccountsChartCommand, CreateVoucherCommand, PostingLine, SetExchangeRateCommand, VoucherEntryCommand,
};
pub use storage::{ensure_balanced, StorageBackend, StorageError};
