use balance_engine_core::{QueryError, StorageError};
use thiserror::Error;
use time::Date;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid query: {0}")]
    Validation(#[from] QueryError),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("missing exchange rate for {currency} ({rate_type}) on {date}")]
    MissingExchangeRate {
        currency: String,
        rate_type: String,
        date: Date,
    },
    #[error("data quality assertion failed: {0}")]
    DataQualityAssertion(String),
    #[error("unsupported report type: {0}")]
    UnsupportedReport(String),
    #[error("storage error: {0}")]
    Storage(StorageError),
}

impl From<StorageError> for EngineError {
    fn from(error: StorageError) -> Self {
        match error {
            StorageError::AccountsChartNotFound(id) => EngineError::NotFound(format!("accounts chart {}", id)),
            StorageError::AccountNotFound(number) => EngineError::NotFound(format!("account {}", number)),
            StorageError::NoRateFound { rate_type, currency, date } => EngineError::MissingExchangeRate {
                currency,
                rate_type,
                date,
            },
            other => EngineError::Storage(other),
        }
    }
}
