use std::sync::Arc;

use balance_engine_core::{BalanceEntry, ColumnType, ItemType, ReportColumn};

use crate::{
    assembler::{assemble_groups, grand_total, sort_rows, GroupLayout, GroupTotals},
    error::EngineError,
    report_registry::{ReportBuilder, ReportContext},
    summarizer::{collapse, consolidate_currencies, summarize_parents, GroupingKey},
    valuator::ResolvedValuation,
};

fn key_columns() -> Vec<ReportColumn> {
    vec![
        ReportColumn::new("itemType", "Tipo", ColumnType::Text),
        ReportColumn::new("currency", "Moneda", ColumnType::Text),
        ReportColumn::new("account", "Cuenta", ColumnType::Text),
        ReportColumn::new("accountName", "Nombre", ColumnType::Text),
        ReportColumn::new("sector", "Sector", ColumnType::Text),
    ]
}

fn balance_columns() -> Vec<ReportColumn> {
    vec![
        ReportColumn::new("initialBalance", "Saldo anterior", ColumnType::Decimal),
        ReportColumn::new("debit", "Cargos", ColumnType::Decimal),
        ReportColumn::new("credit", "Abonos", ColumnType::Decimal),
        ReportColumn::new("currentBalance", "Saldo actual", ColumnType::Decimal),
    ]
}

fn valuation_columns() -> Vec<ReportColumn> {
    vec![
        ReportColumn::new("exchangeRate", "Tipo de cambio", ColumnType::Decimal),
        ReportColumn::new("valuedExchangeRate", "Tipo de cambio valorizado", ColumnType::Decimal),
        ReportColumn::new("totalEquivalence", "Equivalencia", ColumnType::Decimal),
    ]
}

fn last_change_column() -> ReportColumn {
    ReportColumn::new("lastChangeDate", "Ultimo movimiento", ColumnType::Date)
}

/// Grand total across currency groups. Valued rows are converted into the
/// target currency first; unvalued rows are only summed when they all share
/// one currency.
fn consolidated_total(rows: &[BalanceEntry], valuation: Option<&ResolvedValuation>) -> Option<BalanceEntry> {
    if let Some(valuation) = valuation {
        let converted = consolidate_currencies(rows, &valuation.currency);
        return Some(grand_total(&converted, Some(valuation.currency.clone())));
    }

    let mut currencies = rows.iter().filter(|r| r.is_entry()).map(|r| &r.currency);
    let first = currencies.next()?;
    if currencies.all(|c| c == first) {
        Some(grand_total(rows, first.clone()))
    } else {
        None
    }
}

type CurrencyKey = Option<Arc<str>>;
type AccountKey = Option<Arc<str>>;

/// Trial balance grouped by currency.
pub struct Balanza;

struct BalanzaLayout {
    max_level: Option<u32>,
}

impl GroupLayout<CurrencyKey> for BalanzaLayout {
    fn header(&self, _key: &CurrencyKey, _rows: &[BalanceEntry], totals: &GroupTotals) -> Option<BalanceEntry> {
        Some(totals.all.clone().with_item_type(ItemType::Group))
    }

    fn children(&self, mut rows: Vec<BalanceEntry>) -> Vec<BalanceEntry> {
        if let Some(max_level) = self.max_level {
            rows.retain(|row| row.level <= max_level);
        }
        sort_rows(&mut rows);
        rows
    }

    fn subtotals(&self, _key: &CurrencyKey, totals: &GroupTotals) -> Vec<BalanceEntry> {
        totals.currency_rows()
    }
}

impl ReportBuilder for Balanza {
    fn columns(&self) -> Vec<ReportColumn> {
        let mut columns = vec![ReportColumn::new("ledger", "Contabilidad", ColumnType::Text)];
        columns.extend(key_columns());
        columns.extend(balance_columns());
        columns.extend(valuation_columns());
        columns.push(last_change_column());
        columns
    }

    fn build(&self, context: ReportContext) -> Result<Vec<BalanceEntry>, EngineError> {
        let grouping = GroupingKey::for_query(context.query);
        let valuation = context.requested_valuation();

        let mut rows = collapse(&context.entries, grouping);
        if let Some(valuation) = &valuation {
            rows = context.valuator.value(rows, valuation)?;
        }

        let total = consolidated_total(&rows, valuation.as_ref());
        let summaries = summarize_parents(&rows, context.chart);
        rows.extend(summaries);

        let layout = BalanzaLayout {
            max_level: context.query.level,
        };
        let mut output = assemble_groups(rows, |row| row.currency.clone(), &layout);
        output.extend(total);
        Ok(output)
    }
}

/// Balances by account and subledger account.
pub struct SaldosPorCuenta;

struct SaldosCurrencyLayout;

impl GroupLayout<CurrencyKey> for SaldosCurrencyLayout {
    fn header(&self, _key: &CurrencyKey, _rows: &[BalanceEntry], _totals: &GroupTotals) -> Option<BalanceEntry> {
        None
    }

    fn children(&self, rows: Vec<BalanceEntry>) -> Vec<BalanceEntry> {
        assemble_groups(rows, |row| row.account.clone(), &SaldosAccountLayout)
    }

    fn subtotals(&self, _key: &CurrencyKey, totals: &GroupTotals) -> Vec<BalanceEntry> {
        totals.currency_rows()
    }
}

struct SaldosAccountLayout;

impl GroupLayout<AccountKey> for SaldosAccountLayout {
    fn header(&self, _key: &AccountKey, rows: &[BalanceEntry], totals: &GroupTotals) -> Option<BalanceEntry> {
        rows.first().map(|template| totals.account_header(template))
    }

    fn subtotals(&self, _key: &AccountKey, _totals: &GroupTotals) -> Vec<BalanceEntry> {
        Vec::new()
    }
}

impl ReportBuilder for SaldosPorCuenta {
    fn columns(&self) -> Vec<ReportColumn> {
        let mut columns = vec![ReportColumn::new("ledger", "Contabilidad", ColumnType::Text)];
        columns.extend(key_columns());
        columns.push(ReportColumn::new("subledgerAccount", "Auxiliar", ColumnType::Text));
        columns.extend(balance_columns());
        columns.extend(valuation_columns());
        columns.push(last_change_column());
        columns
    }

    fn build(&self, context: ReportContext) -> Result<Vec<BalanceEntry>, EngineError> {
        let valuation = context.requested_valuation();

        let mut rows = collapse(&context.entries, GroupingKey::for_query(context.query));
        if let Some(valuation) = &valuation {
            rows = context.valuator.value(rows, valuation)?;
        }

        let total = consolidated_total(&rows, valuation.as_ref());
        let mut output = assemble_groups(rows, |row| row.currency.clone(), &SaldosCurrencyLayout);
        output.extend(total);
        Ok(output)
    }
}

/// Rows valued into one currency, consolidated across ledgers and
/// currencies, plus parent summaries.
fn consolidated_rows(context: &ReportContext) -> Result<(Arc<str>, Vec<BalanceEntry>), EngineError> {
    let valuation = context.valuation_or(context.valuator.base_currency());
    let grouping = GroupingKey::for_query(context.query).across_ledgers();

    let rows = collapse(&context.entries, grouping);
    let rows = context.valuator.value(rows, &valuation)?;
    let rows = consolidate_currencies(&rows, &valuation.currency);

    Ok((valuation.currency, rows))
}

/// Accounts valued into the base currency with a column per currency.
pub struct AnaliticoDeCuentas;

struct SingleGroupLayout {
    subtotal_kinds: &'static [ItemType],
}

impl GroupLayout<()> for SingleGroupLayout {
    fn header(&self, _key: &(), _rows: &[BalanceEntry], _totals: &GroupTotals) -> Option<BalanceEntry> {
        None
    }

    fn subtotals(&self, _key: &(), totals: &GroupTotals) -> Vec<BalanceEntry> {
        self.subtotal_kinds
            .iter()
            .map(|kind| match kind {
                ItemType::BalanceTotalDebtor => totals.debtor.clone(),
                ItemType::BalanceTotalCreditor => totals.creditor.clone(),
                other => totals.all.clone().with_item_type(*other),
            })
            .collect()
    }
}

fn by_currency_columns() -> Vec<ReportColumn> {
    let mut columns = vec![ReportColumn::new("level", "Nivel", ColumnType::Decimal)];
    columns.extend(key_columns());
    columns.extend(balance_columns());
    columns.push(ReportColumn::new("totalEquivalence", "Equivalencia", ColumnType::Decimal));
    columns.push(ReportColumn::new("byCurrency", "Saldo por moneda", ColumnType::Decimal));
    columns.push(last_change_column());
    columns
}

impl ReportBuilder for AnaliticoDeCuentas {
    fn columns(&self) -> Vec<ReportColumn> {
        by_currency_columns()
    }

    fn build(&self, context: ReportContext) -> Result<Vec<BalanceEntry>, EngineError> {
        let (currency, mut rows) = consolidated_rows(&context)?;

        let total = grand_total(&rows, Some(currency));
        let summaries = summarize_parents(&rows, context.chart);
        rows.extend(summaries);

        let layout = SingleGroupLayout {
            subtotal_kinds: &[ItemType::BalanceTotalDebtor, ItemType::BalanceTotalCreditor],
        };
        let mut output = assemble_groups(rows, |_| (), &layout);
        output.push(total);
        Ok(output)
    }
}

/// Balances per account and currency valued into the dollar currency.
pub struct BalanzaDolarizada;

struct DolarizadaLayout {
    target: Arc<str>,
}

impl GroupLayout<AccountKey> for DolarizadaLayout {
    fn header(&self, _key: &AccountKey, rows: &[BalanceEntry], _totals: &GroupTotals) -> Option<BalanceEntry> {
        let valued = GroupTotals::from_rows(&consolidate_currencies(rows, &self.target));
        rows.first().map(|template| valued.account_header(template))
    }

    fn subtotals(&self, _key: &AccountKey, _totals: &GroupTotals) -> Vec<BalanceEntry> {
        Vec::new()
    }
}

impl ReportBuilder for BalanzaDolarizada {
    fn columns(&self) -> Vec<ReportColumn> {
        let mut columns = key_columns();
        columns.extend(balance_columns());
        columns.extend(valuation_columns());
        columns.push(last_change_column());
        columns
    }

    fn build(&self, context: ReportContext) -> Result<Vec<BalanceEntry>, EngineError> {
        let valuation = context.valuation_or(&context.options.dollar_currency);

        let rows = collapse(&context.entries, GroupingKey::default());
        let rows = context.valuator.value(rows, &valuation)?;
        let total = grand_total(&consolidate_currencies(&rows, &valuation.currency), Some(valuation.currency.clone()));

        let layout = DolarizadaLayout {
            target: valuation.currency,
        };
        let mut output = assemble_groups(rows, |row| row.account.clone(), &layout);
        output.push(total);
        Ok(output)
    }
}

/// Balances valued into the base currency, one column per original
/// currency.
pub struct BalanzaEnColumnasPorMoneda;

impl ReportBuilder for BalanzaEnColumnasPorMoneda {
    fn columns(&self) -> Vec<ReportColumn> {
        by_currency_columns()
    }

    fn build(&self, context: ReportContext) -> Result<Vec<BalanceEntry>, EngineError> {
        let (_, mut rows) = consolidated_rows(&context)?;

        let summaries = summarize_parents(&rows, context.chart);
        rows.extend(summaries);

        let layout = SingleGroupLayout {
            subtotal_kinds: &[ItemType::Total],
        };
        Ok(assemble_groups(rows, |_| (), &layout))
    }
}
