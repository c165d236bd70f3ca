use std::{collections::BTreeMap, sync::Arc};

use rust_decimal::Decimal;
use time::Date;

use balance_engine_core::{round_money, BalanceEntry};

use crate::{error::EngineError, storage::StorageBackend};

/// Target of a valuation after query values and engine defaults are merged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedValuation {
    pub currency: Arc<str>,
    pub rate_type: Arc<str>,
    pub date: Date,
}

/// Attaches exchange rates and equivalences to balance rows.
///
/// Rates are expressed in units of the base currency per unit of foreign
/// currency, so valuing into any other target uses the cross rate
/// `rate(currency) / rate(target)`. The cross rate keeps full precision;
/// only the equivalence is rounded to cents.
pub struct Valuator {
    storage: Arc<dyn StorageBackend>,
    base_currency: Arc<str>,
}

impl Valuator {
    pub fn new(storage: Arc<dyn StorageBackend>, base_currency: Arc<str>) -> Self {
        Self { storage, base_currency }
    }

    pub fn base_currency(&self) -> &Arc<str> {
        &self.base_currency
    }

    /// Values every row into `valuation.currency`. All rates are resolved
    /// before any row is touched; a missing rate fails the whole call.
    pub fn value(&self, entries: Vec<BalanceEntry>, valuation: &ResolvedValuation) -> Result<Vec<BalanceEntry>, EngineError> {
        let rates = self.load_rates(&entries, valuation)?;
        let target_rate = rates[&valuation.currency];

        let valued = entries
            .into_iter()
            .map(|mut entry| {
                if let Some(rate) = entry.currency.as_ref().map(|c| rates[c]) {
                    let valued_rate = if entry.currency.as_ref() == Some(&valuation.currency) {
                        Decimal::ONE
                    } else {
                        rate / target_rate
                    };
                    entry.exchange_rate = Some(rate);
                    entry.valued_exchange_rate = Some(valued_rate);
                    entry.total_equivalence = Some(round_money(entry.current_balance * valued_rate));
                }
                entry
            })
            .collect();

        tracing::debug!(
            currency = %valuation.currency,
            rate_type = %valuation.rate_type,
            date = %valuation.date,
            currencies = rates.len(),
            "Balances valued"
        );

        Ok(valued)
    }

    fn load_rates(
        &self,
        entries: &[BalanceEntry],
        valuation: &ResolvedValuation,
    ) -> Result<BTreeMap<Arc<str>, Decimal>, EngineError> {
        let mut rates = BTreeMap::new();
        let currencies = entries
            .iter()
            .filter_map(|e| e.currency.clone())
            .chain(std::iter::once(valuation.currency.clone()));

        for currency in currencies {
            if rates.contains_key(&currency) {
                continue;
            }
            let rate = self.rate_of(&currency, valuation)?;
            rates.insert(currency, rate);
        }
        Ok(rates)
    }

    fn rate_of(&self, currency: &str, valuation: &ResolvedValuation) -> Result<Decimal, EngineError> {
        if currency == self.base_currency.as_ref() {
            return Ok(Decimal::ONE);
        }

        let rate = self
            .storage
            .get_exchange_rate(&valuation.rate_type, currency, valuation.date)?;

        if rate.from_currency != self.base_currency {
            tracing::warn!(
                currency,
                from_currency = %rate.from_currency,
                base_currency = %self.base_currency,
                "Exchange rate is not quoted against the base currency"
            );
        }
        if rate.value <= Decimal::ZERO {
            return Err(EngineError::DataQualityAssertion(format!(
                "exchange rate for {} ({}) on {} is not positive: {}",
                currency, valuation.rate_type, rate.date, rate.value
            )));
        }

        Ok(rate.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryStorage;
    use balance_engine_core::{AccountNature, BalanceKey, SetExchangeRateCommand, NO_SECTOR};
    use rust_decimal_macros::dec;
    use time::macros::date;

    fn entry(currency: &str, balance: Decimal) -> BalanceEntry {
        BalanceEntry::new(
            BalanceKey {
                ledger: Arc::from("01"),
                currency: Arc::from(currency),
                account: Arc::from("1102"),
                sector: Arc::from(NO_SECTOR),
                subledger_account: None,
            },
            AccountNature::Debtor,
            balance,
            Decimal::ZERO,
            Decimal::ZERO,
        )
    }

    fn valuator() -> Valuator {
        let storage = InMemoryStorage::new();
        for (currency, value) in [("USD", dec!(20.50)), ("EUR", dec!(22.10))] {
            storage
                .set_exchange_rate(&SetExchangeRateCommand {
                    rate_type: Arc::from("FIX"),
                    from_currency: Arc::from("MXN"),
                    to_currency: Arc::from(currency),
                    date: date!(2022 - 02 - 28),
                    value,
                })
                .unwrap();
        }
        Valuator::new(Arc::new(storage), Arc::from("MXN"))
    }

    fn into(currency: &str) -> ResolvedValuation {
        ResolvedValuation {
            currency: Arc::from(currency),
            rate_type: Arc::from("FIX"),
            date: date!(2022 - 02 - 28),
        }
    }

    #[test]
    fn test_value_into_base_currency() {
        let rows = valuator()
            .value(vec![entry("MXN", dec!(100)), entry("USD", dec!(1200))], &into("MXN"))
            .unwrap();
        assert_eq!(rows[0].valued_exchange_rate, Some(Decimal::ONE));
        assert_eq!(rows[0].total_equivalence, Some(dec!(100)));
        assert_eq!(rows[1].exchange_rate, Some(dec!(20.50)));
        assert_eq!(rows[1].total_equivalence, Some(dec!(24600)));
    }

    #[test]
    fn test_value_uses_cross_rate() {
        let rows = valuator()
            .value(vec![entry("MXN", dec!(2500)), entry("EUR", dec!(100))], &into("USD"))
            .unwrap();
        assert_eq!(rows[0].valued_exchange_rate, Some(dec!(1) / dec!(20.50)));
        assert_eq!(rows[0].total_equivalence, Some(dec!(121.95)));
        assert_eq!(rows[1].valued_exchange_rate, Some(dec!(22.10) / dec!(20.50)));
        assert_eq!(rows[1].total_equivalence, Some(dec!(107.80)));
    }

    #[test]
    fn test_large_balance_keeps_cross_rate_precision() {
        let rows = valuator()
            .value(vec![entry("MXN", dec!(1000000000))], &into("USD"))
            .unwrap();
        assert_eq!(rows[0].total_equivalence, Some(dec!(48780487.80)));

        let rows = valuator()
            .value(vec![entry("EUR", dec!(1000000000))], &into("USD"))
            .unwrap();
        assert_eq!(rows[0].total_equivalence, Some(dec!(1078048780.49)));
    }

    #[test]
    fn test_missing_rate_is_fatal() {
        let result = valuator().value(vec![entry("USD", dec!(1)), entry("GBP", dec!(1))], &into("MXN"));
        assert!(matches!(
            result,
            Err(EngineError::MissingExchangeRate { ref currency, .. }) if currency == "GBP"
        ));
    }

    #[test]
    fn test_rate_on_or_before_date() {
        let valuation = ResolvedValuation {
            date: date!(2022 - 02 - 27),
            ..into("MXN")
        };
        let result = valuator().value(vec![entry("USD", dec!(1))], &valuation);
        assert!(matches!(result, Err(EngineError::MissingExchangeRate { .. })));
    }
}
