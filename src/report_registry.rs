use std::{collections::HashMap, sync::{Arc, RwLock}};

use balance_engine_core::{AccountsChart, BalanceEntry, BalanceQuery, ReportColumn, ReportType};

use crate::{
    engine::EngineOptions,
    error::EngineError,
    reports::{AnaliticoDeCuentas, Balanza, BalanzaDolarizada, BalanzaEnColumnasPorMoneda, SaldosPorCuenta},
    valuator::{ResolvedValuation, Valuator},
};

/// Everything a builder needs to turn read entries into report rows.
pub struct ReportContext<'a> {
    pub query: &'a BalanceQuery,
    pub chart: &'a AccountsChart,
    pub entries: Vec<BalanceEntry>,
    pub valuator: &'a Valuator,
    pub options: &'a EngineOptions,
}

impl<'a> ReportContext<'a> {
    pub fn requested_valuation(&self) -> Option<ResolvedValuation> {
        self.query.valuation.as_ref().map(|valuation| ResolvedValuation {
            currency: valuation.currency.clone(),
            rate_type: valuation.rate_type.clone(),
            date: valuation.date.unwrap_or(self.query.to_date),
        })
    }

    /// The query's valuation, or one into `currency` with the engine's
    /// default rate type as of `to_date`.
    pub fn valuation_or(&self, currency: &Arc<str>) -> ResolvedValuation {
        self.requested_valuation().unwrap_or_else(|| ResolvedValuation {
            currency: currency.clone(),
            rate_type: self.options.default_rate_type.clone(),
            date: self.query.to_date,
        })
    }
}

pub trait ReportBuilder: Send + Sync {
    fn columns(&self) -> Vec<ReportColumn>;
    fn build(&self, context: ReportContext) -> Result<Vec<BalanceEntry>, EngineError>;
}

pub struct ReportRegistry {
    builders: Arc<RwLock<HashMap<ReportType, Arc<dyn ReportBuilder>>>>,
}

impl Default for ReportRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ReportRegistry {
    pub fn new() -> ReportRegistry {
        ReportRegistry {
            builders: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// A registry holding a builder for every report type.
    pub fn with_defaults() -> ReportRegistry {
        let registry = ReportRegistry::new();
        registry.register_builder(ReportType::Balanza, Arc::new(Balanza));
        registry.register_builder(ReportType::SaldosPorCuenta, Arc::new(SaldosPorCuenta));
        registry.register_builder(ReportType::AnaliticoDeCuentas, Arc::new(AnaliticoDeCuentas));
        registry.register_builder(ReportType::BalanzaDolarizada, Arc::new(BalanzaDolarizada));
        registry.register_builder(ReportType::BalanzaEnColumnasPorMoneda, Arc::new(BalanzaEnColumnasPorMoneda));
        registry
    }

    pub fn register_builder(&self, report_type: ReportType, builder: Arc<dyn ReportBuilder>) {
        let mut lock = self.builders.write().unwrap();
        lock.insert(report_type, builder);
    }

    pub fn get_builder(&self, report_type: ReportType) -> Option<Arc<dyn ReportBuilder>> {
        let lock = self.builders.read().unwrap();
        lock.get(&report_type).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_cover_every_report() {
        let registry = ReportRegistry::with_defaults();
        for report_type in ReportType::ALL {
            let builder = registry.get_builder(report_type);
            assert!(builder.is_some(), "no builder for {}", report_type);
            assert!(!builder.unwrap().columns().is_empty());
        }
    }

    #[test]
    fn test_empty_registry() {
        assert!(ReportRegistry::new().get_builder(ReportType::Balanza).is_none());
    }
}
