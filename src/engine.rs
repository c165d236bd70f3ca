use std::{sync::Arc, time::Instant};

use balance_engine_core::{BalanceQuery, Report};

use crate::{
    assembler::verify_totals,
    error::EngineError,
    reader::BalanceReader,
    report_registry::{ReportContext, ReportRegistry},
    storage::StorageBackend,
    valuator::Valuator,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineOptions {
    /// Currency all exchange rates are quoted against.
    pub base_currency: Arc<str>,
    pub dollar_currency: Arc<str>,
    pub default_rate_type: Arc<str>,
    pub verify_integrity: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            base_currency: Arc::from("MXN"),
            dollar_currency: Arc::from("USD"),
            default_rate_type: Arc::from("FIX"),
            verify_integrity: true,
        }
    }
}

pub struct BalanceEngine {
    reader: BalanceReader,
    valuator: Valuator,
    registry: Arc<ReportRegistry>,
    options: EngineOptions,
}

impl BalanceEngine {
    pub fn new(storage: Arc<dyn StorageBackend>, registry: Arc<ReportRegistry>, options: EngineOptions) -> Self {
        Self {
            reader: BalanceReader::new(storage.clone()),
            valuator: Valuator::new(storage, options.base_currency.clone()),
            registry,
            options,
        }
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    /// Runs one balance query end to end. Nothing is returned unless every
    /// stage succeeds.
    pub fn execute(&self, query: &BalanceQuery) -> Result<Report, EngineError> {
        let started = Instant::now();
        let report_type = query.report_type.as_str();
        let result = self.run(query);

        match &result {
            Ok(report) => {
                metrics::increment_counter!("balance_engine_reports_total", "report" => report_type);
                metrics::histogram!("balance_engine_report_rows", report.entries.len() as f64, "report" => report_type);
                tracing::info!(
                    report = report_type,
                    chart = %query.accounts_chart,
                    rows = report.entries.len(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Report built"
                );
            }
            Err(e) => {
                metrics::increment_counter!("balance_engine_report_failures_total", "report" => report_type);
                tracing::warn!(report = report_type, chart = %query.accounts_chart, error = %e, "Report failed");
            }
        }

        result
    }

    fn run(&self, query: &BalanceQuery) -> Result<Report, EngineError> {
        query.validate()?;

        let builder = self
            .registry
            .get_builder(query.report_type)
            .ok_or_else(|| EngineError::UnsupportedReport(query.report_type.to_string()))?;

        let (chart, entries) = self.reader.read(query)?;
        if entries.is_empty() {
            return Ok(Report {
                query: query.clone(),
                columns: builder.columns(),
                entries: Vec::new(),
            });
        }

        let rows = builder.build(ReportContext {
            query,
            chart: &chart,
            entries,
            valuator: &self.valuator,
            options: &self.options,
        })?;

        if self.options.verify_integrity {
            verify_totals(&rows)?;
        }

        Ok(Report {
            query: query.clone(),
            columns: builder.columns(),
            entries: rows,
        })
    }
}
