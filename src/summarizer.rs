use std::{
    collections::{btree_map, BTreeMap},
    sync::Arc,
};

use rust_decimal::Decimal;

use balance_engine_core::{
    round_money, AccountsChart, BalanceEntry, BalanceQuery, ItemType, ReportType, NO_SECTOR,
};

/// Which key parts survive when entries are folded together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GroupingKey {
    pub by_ledger: bool,
    pub by_sector: bool,
    pub by_subledger: bool,
}

impl GroupingKey {
    pub fn for_query(query: &BalanceQuery) -> Self {
        Self {
            by_ledger: !query.consolidated,
            by_sector: query.with_sectors,
            by_subledger: query.with_subledger_accounts || query.report_type == ReportType::SaldosPorCuenta,
        }
    }

    pub fn across_ledgers(mut self) -> Self {
        self.by_ledger = false;
        self
    }

    fn rekey(&self, mut entry: BalanceEntry) -> BalanceEntry {
        if !self.by_ledger {
            entry.ledger = None;
        }
        if !self.by_sector {
            entry.sector = Arc::from(NO_SECTOR);
        }
        if !self.by_subledger {
            entry.subledger_account = None;
        }
        entry
    }
}

/// Map key for folding rows; field order matches report ordering.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct RowKey {
    currency: Option<Arc<str>>,
    account: Option<Arc<str>>,
    sector: Arc<str>,
    subledger_account: Option<Arc<str>>,
    kind: u8,
    ledger: Option<Arc<str>>,
}

impl RowKey {
    fn of(entry: &BalanceEntry) -> Self {
        Self {
            currency: entry.currency.clone(),
            account: entry.account.clone(),
            sector: entry.sector.clone(),
            subledger_account: entry.subledger_account.clone(),
            kind: entry.item_type.sort_order(),
            ledger: entry.ledger.clone(),
        }
    }
}

fn fold_into(groups: &mut BTreeMap<RowKey, BalanceEntry>, row: BalanceEntry) {
    match groups.entry(RowKey::of(&row)) {
        btree_map::Entry::Occupied(mut slot) => {
            let merged = slot.get().combine(&row);
            slot.insert(merged);
        }
        btree_map::Entry::Vacant(slot) => {
            slot.insert(row);
        }
    }
}

/// Re-keys `Entry` rows by `grouping` and folds rows sharing a key. This is
/// the cross-ledger, cross-sector and cross-subledger consolidation.
pub fn collapse(entries: &[BalanceEntry], grouping: GroupingKey) -> Vec<BalanceEntry> {
    let mut groups = BTreeMap::new();
    for entry in entries.iter().filter(|e| e.is_entry()) {
        fold_into(&mut groups, grouping.rekey(entry.clone()));
    }
    groups.into_values().collect()
}

/// Emits one `Summary` row per ancestor account and remaining key parts.
///
/// An account that carries postings and also has children gets a `Summary`
/// row of its own next to its `Entry` row; that summary includes the
/// account's own postings.
pub fn summarize_parents(entries: &[BalanceEntry], chart: &AccountsChart) -> Vec<BalanceEntry> {
    let mut groups = BTreeMap::new();

    for entry in entries.iter().filter(|e| e.is_entry()) {
        let Some(number) = entry.account.as_deref() else {
            continue;
        };

        let mut targets = chart.ancestors(number);
        if let Some(own) = chart.get_account(number).filter(|_| chart.has_children(number)) {
            targets.insert(0, own);
        }

        for account in targets {
            let mut summary = entry.clone().with_item_type(ItemType::Summary);
            summary.account = Some(account.number.clone());
            summary.account_name = Some(account.name.clone());
            summary.nature = account.nature;
            summary.level = chart.level(&account.number);
            summary.subledger_account = None;
            fold_into(&mut groups, summary);
        }
    }

    groups.into_values().collect()
}

/// Folds valued rows of every currency into `target`-currency rows per
/// account, sector and row kind. Each monetary field is converted with the
/// row's valued rate; the equivalence per original currency is kept in
/// `by_currency`.
pub fn consolidate_currencies(entries: &[BalanceEntry], target: &Arc<str>) -> Vec<BalanceEntry> {
    let mut groups = BTreeMap::new();

    for entry in entries {
        let rate = entry.valued_exchange_rate.unwrap_or(Decimal::ONE);
        let equivalence = entry
            .total_equivalence
            .unwrap_or_else(|| round_money(entry.current_balance * rate));

        let mut row = entry.clone();
        row.currency = Some(target.clone());
        row.initial_balance = round_money(entry.initial_balance * rate);
        row.debit = round_money(entry.debit * rate);
        row.credit = round_money(entry.credit * rate);
        row.current_balance = round_money(row.initial_balance + row.debit - row.credit);
        row.exchange_rate = None;
        row.valued_exchange_rate = None;
        row.total_equivalence = Some(equivalence);
        row.by_currency = BTreeMap::new();
        if let Some(currency) = &entry.currency {
            row.by_currency.insert(currency.clone(), equivalence);
        }

        fold_into(&mut groups, row);
    }

    groups.into_values().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use balance_engine_core::{Account, AccountNature, BalanceKey};
    use rust_decimal_macros::dec;
    use time::macros::date;

    fn entry(ledger: &str, currency: &str, account: &str, sector: &str, balance: Decimal) -> BalanceEntry {
        BalanceEntry::new(
            BalanceKey {
                ledger: Arc::from(ledger),
                currency: Arc::from(currency),
                account: Arc::from(account),
                sector: Arc::from(sector),
                subledger_account: None,
            },
            AccountNature::Debtor,
            Decimal::ZERO,
            balance,
            Decimal::ZERO,
        )
    }

    fn chart() -> AccountsChart {
        let mut chart = AccountsChart::new("IFRS", "IFRS");
        chart.add_account(Account::new("1", "Activo", AccountNature::Debtor, None));
        chart.add_account(Account::new("1102", "Bancos", AccountNature::Debtor, Some("1")));
        chart.add_account(Account::new("1102-01", "Bancos MN", AccountNature::Debtor, Some("1102")));
        chart.add_account(Account::new("1103", "Inversiones", AccountNature::Debtor, Some("1")));
        chart
    }

    #[test]
    fn test_collapse_across_ledgers_and_sectors() {
        let mut a = entry("01", "MXN", "1102-01", "01", dec!(100));
        a.last_change_date = Some(date!(2022 - 02 - 05));
        let mut b = entry("02", "MXN", "1102-01", "21", dec!(50.25));
        b.last_change_date = Some(date!(2022 - 02 - 20));
        let c = entry("02", "USD", "1102-01", "21", dec!(7));

        let rows = collapse(&[a, b, c], GroupingKey::default());
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].currency.as_deref(), Some("MXN"));
        assert_eq!(rows[0].ledger, None);
        assert_eq!(rows[0].sector.as_ref(), NO_SECTOR);
        assert_eq!(rows[0].current_balance, dec!(150.25));
        assert_eq!(rows[0].last_change_date, Some(date!(2022 - 02 - 20)));
        assert_eq!(rows[1].current_balance, dec!(7));
    }

    #[test]
    fn test_collapse_keeps_requested_parts() {
        let a = entry("01", "MXN", "1102-01", "01", dec!(100));
        let b = entry("02", "MXN", "1102-01", "21", dec!(50));
        let grouping = GroupingKey {
            by_ledger: true,
            by_sector: true,
            by_subledger: false,
        };
        assert_eq!(collapse(&[a, b], grouping).len(), 2);
    }

    #[test]
    fn test_summarize_parents() {
        let rows = vec![
            entry("01", "MXN", "1102-01", "00", dec!(100)),
            entry("01", "MXN", "1103", "00", dec!(40)),
        ];
        let summaries = summarize_parents(&rows, &chart());

        let by_account: Vec<(&str, Decimal, u32)> = summaries
            .iter()
            .map(|s| (s.account.as_deref().unwrap(), s.current_balance, s.level))
            .collect();
        assert_eq!(by_account, vec![("1", dec!(140), 1), ("1102", dec!(100), 2)]);
        assert!(summaries.iter().all(|s| s.item_type == ItemType::Summary));
        assert_eq!(summaries[1].account_name.as_deref(), Some("Bancos"));
    }

    #[test]
    fn test_mixed_account_gets_entry_and_summary() {
        let rows = vec![
            entry("01", "MXN", "1102", "00", dec!(10)),
            entry("01", "MXN", "1102-01", "00", dec!(100)),
        ];
        let summaries = summarize_parents(&rows, &chart());
        let own = summaries
            .iter()
            .find(|s| s.account.as_deref() == Some("1102"))
            .unwrap();
        assert_eq!(own.current_balance, dec!(110));
        assert_eq!(summaries.iter().find(|s| s.account.as_deref() == Some("1")).unwrap().current_balance, dec!(110));
    }

    #[test]
    fn test_consolidate_currencies() {
        let mut mxn = entry("01", "MXN", "1102-01", "00", dec!(100));
        mxn.valued_exchange_rate = Some(Decimal::ONE);
        mxn.total_equivalence = Some(dec!(100));
        let mut usd = entry("01", "USD", "1102-01", "00", dec!(10));
        usd.valued_exchange_rate = Some(dec!(20.5));
        usd.total_equivalence = Some(dec!(205));

        let target: Arc<str> = Arc::from("MXN");
        let rows = consolidate_currencies(&[mxn, usd], &target);
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.currency.as_deref(), Some("MXN"));
        assert_eq!(row.debit, dec!(305));
        assert_eq!(row.current_balance, dec!(305));
        assert_eq!(row.total_equivalence, Some(dec!(305)));
        assert_eq!(row.by_currency.get("USD"), Some(&dec!(205)));
        assert_eq!(row.by_currency.get("MXN"), Some(&dec!(100)));
        assert_eq!(row.valued_exchange_rate, None);
    }
}
