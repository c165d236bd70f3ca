use std::{collections::BTreeMap, sync::Arc};

use rust_decimal::Decimal;

use balance_engine_core::{AccountNature, BalanceEntry, ItemType};

use crate::error::EngineError;

/// Orders rows by currency, account, sector, subledger, row kind and ledger.
pub fn sort_rows(rows: &mut [BalanceEntry]) {
    rows.sort_by(|a, b| {
        a.currency
            .cmp(&b.currency)
            .then_with(|| a.account.cmp(&b.account))
            .then_with(|| a.sector.cmp(&b.sector))
            .then_with(|| a.subledger_account.cmp(&b.subledger_account))
            .then_with(|| a.item_type.sort_order().cmp(&b.item_type.sort_order()))
            .then_with(|| a.ledger.cmp(&b.ledger))
    });
}

fn fold(item_type: ItemType, currency: Option<Arc<str>>, nature: AccountNature, rows: &[&BalanceEntry]) -> BalanceEntry {
    rows.iter()
        .fold(BalanceEntry::total(item_type, currency, nature), |acc, row| acc.combine(row))
}

/// Flips balances so that a creditor total reads positive. Movements stay
/// as posted.
fn creditor_positive(mut entry: BalanceEntry) -> BalanceEntry {
    entry.initial_balance = -entry.initial_balance;
    entry.current_balance = -entry.current_balance;
    entry.total_equivalence = entry.total_equivalence.map(|e| -e);
    for amount in entry.by_currency.values_mut() {
        *amount = -*amount;
    }
    entry
}

/// Totals of a group, computed from its `Entry` rows only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupTotals {
    pub all: BalanceEntry,
    pub debtor: BalanceEntry,
    pub creditor: BalanceEntry,
}

impl GroupTotals {
    pub fn from_rows(rows: &[BalanceEntry]) -> Self {
        let entries: Vec<&BalanceEntry> = rows.iter().filter(|r| r.is_entry()).collect();
        let currency = common_currency(&entries);

        let debtor: Vec<&BalanceEntry> = entries
            .iter()
            .copied()
            .filter(|e| e.nature == AccountNature::Debtor)
            .collect();
        let creditor: Vec<&BalanceEntry> = entries
            .iter()
            .copied()
            .filter(|e| e.nature == AccountNature::Creditor)
            .collect();

        Self {
            all: fold(ItemType::Total, currency.clone(), AccountNature::Debtor, &entries),
            debtor: fold(ItemType::BalanceTotalDebtor, currency.clone(), AccountNature::Debtor, &debtor),
            creditor: creditor_positive(fold(
                ItemType::BalanceTotalCreditor,
                currency,
                AccountNature::Creditor,
                &creditor,
            )),
        }
    }

    /// Debtor, creditor and currency total rows, in that order.
    pub fn currency_rows(&self) -> Vec<BalanceEntry> {
        vec![
            self.debtor.clone(),
            self.creditor.clone(),
            self.all.clone().with_item_type(ItemType::BalanceTotalCurrency),
        ]
    }

    /// A `Group` header carrying the group's total and the account data of
    /// `template`.
    pub fn account_header(&self, template: &BalanceEntry) -> BalanceEntry {
        let mut header = self.all.clone().with_item_type(ItemType::Group);
        header.account = template.account.clone();
        header.account_name = template.account_name.clone();
        header.level = template.level;
        header.nature = template.nature;
        header
    }
}

fn common_currency(entries: &[&BalanceEntry]) -> Option<Arc<str>> {
    let first = entries.first().and_then(|e| e.currency.clone())?;
    entries
        .iter()
        .all(|e| e.currency.as_ref() == Some(&first))
        .then_some(first)
}

/// Shapes one group of an assembled report.
pub trait GroupLayout<K> {
    fn header(&self, key: &K, rows: &[BalanceEntry], totals: &GroupTotals) -> Option<BalanceEntry>;

    fn children(&self, mut rows: Vec<BalanceEntry>) -> Vec<BalanceEntry> {
        sort_rows(&mut rows);
        rows
    }

    fn subtotals(&self, key: &K, totals: &GroupTotals) -> Vec<BalanceEntry>;
}

/// Splits `rows` into groups by `group_of` and emits, per group in key
/// order, its header, its children and its subtotals.
pub fn assemble_groups<K, F, L>(rows: Vec<BalanceEntry>, group_of: F, layout: &L) -> Vec<BalanceEntry>
where
    K: Ord,
    F: Fn(&BalanceEntry) -> K,
    L: GroupLayout<K>,
{
    let mut groups: BTreeMap<K, Vec<BalanceEntry>> = BTreeMap::new();
    for row in rows {
        groups.entry(group_of(&row)).or_default().push(row);
    }

    let mut output = Vec::new();
    for (key, children) in groups {
        let totals = GroupTotals::from_rows(&children);
        if let Some(header) = layout.header(&key, &children, &totals) {
            output.push(header);
        }
        output.extend(layout.children(children));
        output.extend(layout.subtotals(&key, &totals));
    }
    output
}

/// The terminal row of a report: every `Entry` row folded together.
pub fn grand_total(rows: &[BalanceEntry], currency: Option<Arc<str>>) -> BalanceEntry {
    let entries: Vec<&BalanceEntry> = rows.iter().filter(|r| r.is_entry()).collect();
    fold(ItemType::BalanceTotalConsolidated, currency, AccountNature::Debtor, &entries)
}

/// Checks every currency total against its debtor and creditor totals.
pub fn verify_totals(rows: &[BalanceEntry]) -> Result<(), EngineError> {
    let mut debtor: BTreeMap<Option<Arc<str>>, &BalanceEntry> = BTreeMap::new();
    let mut creditor: BTreeMap<Option<Arc<str>>, &BalanceEntry> = BTreeMap::new();

    for row in rows {
        match row.item_type {
            ItemType::BalanceTotalDebtor => {
                debtor.insert(row.currency.clone(), row);
            }
            ItemType::BalanceTotalCreditor => {
                creditor.insert(row.currency.clone(), row);
            }
            ItemType::BalanceTotalCurrency => {
                let d = debtor.get(&row.currency);
                let c = creditor.get(&row.currency);

                let expected = d.map_or(Decimal::ZERO, |d| d.current_balance)
                    - c.map_or(Decimal::ZERO, |c| c.current_balance);
                if row.current_balance != expected {
                    return Err(EngineError::DataQualityAssertion(format!(
                        "currency total for {} is {} but debtor minus creditor is {}",
                        row.currency.as_deref().unwrap_or("-"),
                        row.current_balance,
                        expected
                    )));
                }

                if let Some(equivalence) = row.total_equivalence {
                    let expected = d.and_then(|d| d.total_equivalence).unwrap_or_default()
                        - c.and_then(|c| c.total_equivalence).unwrap_or_default();
                    if equivalence != expected {
                        return Err(EngineError::DataQualityAssertion(format!(
                            "currency equivalence for {} is {} but debtor minus creditor is {}",
                            row.currency.as_deref().unwrap_or("-"),
                            equivalence,
                            expected
                        )));
                    }
                }
            }
            _ => {}
        }
    }
    Ok(())
}

/// Compares a report's currency total with an externally supplied control
/// figure.
pub fn assert_control_total(rows: &[BalanceEntry], currency: &str, expected: Decimal) -> Result<(), EngineError> {
    let actual = rows
        .iter()
        .find(|r| r.item_type == ItemType::BalanceTotalCurrency && r.currency.as_deref() == Some(currency))
        .map(|r| r.current_balance)
        .unwrap_or_default();

    if actual != expected {
        return Err(EngineError::DataQualityAssertion(format!(
            "control total for {} is {} but the report shows {}",
            currency, expected, actual
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use balance_engine_core::{BalanceKey, NO_SECTOR};
    use rust_decimal_macros::dec;

    fn entry(currency: &str, account: &str, nature: AccountNature, balance: Decimal) -> BalanceEntry {
        let (debit, credit) = if balance >= Decimal::ZERO {
            (balance, Decimal::ZERO)
        } else {
            (Decimal::ZERO, -balance)
        };
        BalanceEntry::new(
            BalanceKey {
                ledger: Arc::from("01"),
                currency: Arc::from(currency),
                account: Arc::from(account),
                sector: Arc::from(NO_SECTOR),
                subledger_account: None,
            },
            nature,
            Decimal::ZERO,
            debit,
            credit,
        )
    }

    struct ByCurrency;

    impl GroupLayout<Option<Arc<str>>> for ByCurrency {
        fn header(&self, _key: &Option<Arc<str>>, _rows: &[BalanceEntry], totals: &GroupTotals) -> Option<BalanceEntry> {
            Some(totals.all.clone().with_item_type(ItemType::Group))
        }

        fn subtotals(&self, _key: &Option<Arc<str>>, totals: &GroupTotals) -> Vec<BalanceEntry> {
            totals.currency_rows()
        }
    }

    fn rows() -> Vec<BalanceEntry> {
        vec![
            entry("USD", "2101", AccountNature::Creditor, dec!(-1200)),
            entry("MXN", "1101", AccountNature::Debtor, dec!(9700)),
            entry("USD", "1102-02", AccountNature::Debtor, dec!(1200)),
            entry("MXN", "3101", AccountNature::Creditor, dec!(-10000)),
            entry("MXN", "5101", AccountNature::Debtor, dec!(300)),
        ]
    }

    #[test]
    fn test_sort_rows_puts_summary_first() {
        let mut rows = vec![
            entry("MXN", "1102", AccountNature::Debtor, dec!(1)),
            entry("MXN", "1102", AccountNature::Debtor, dec!(1)).with_item_type(ItemType::Summary),
            entry("MXN", "1", AccountNature::Debtor, dec!(1)).with_item_type(ItemType::Summary),
        ];
        sort_rows(&mut rows);
        let order: Vec<(&str, ItemType)> = rows.iter().map(|r| (r.account.as_deref().unwrap(), r.item_type)).collect();
        assert_eq!(
            order,
            vec![("1", ItemType::Summary), ("1102", ItemType::Summary), ("1102", ItemType::Entry)]
        );
    }

    #[test]
    fn test_group_totals() {
        let totals = GroupTotals::from_rows(&rows()[1..]);
        assert_eq!(totals.all.currency, None);

        let mxn: Vec<BalanceEntry> = rows().into_iter().filter(|r| r.currency.as_deref() == Some("MXN")).collect();
        let totals = GroupTotals::from_rows(&mxn);
        assert_eq!(totals.all.currency.as_deref(), Some("MXN"));
        assert_eq!(totals.debtor.current_balance, dec!(10000));
        assert_eq!(totals.creditor.current_balance, dec!(10000));
        assert_eq!(totals.creditor.credit, dec!(10000));
        assert_eq!(totals.all.current_balance, Decimal::ZERO);
    }

    #[test]
    fn test_assemble_groups_layout() {
        let report = assemble_groups(rows(), |r| r.currency.clone(), &ByCurrency);
        let kinds: Vec<(Option<&str>, ItemType)> = report.iter().map(|r| (r.currency.as_deref(), r.item_type)).collect();
        assert_eq!(
            kinds,
            vec![
                (Some("MXN"), ItemType::Group),
                (Some("MXN"), ItemType::Entry),
                (Some("MXN"), ItemType::Entry),
                (Some("MXN"), ItemType::Entry),
                (Some("MXN"), ItemType::BalanceTotalDebtor),
                (Some("MXN"), ItemType::BalanceTotalCreditor),
                (Some("MXN"), ItemType::BalanceTotalCurrency),
                (Some("USD"), ItemType::Group),
                (Some("USD"), ItemType::Entry),
                (Some("USD"), ItemType::Entry),
                (Some("USD"), ItemType::BalanceTotalDebtor),
                (Some("USD"), ItemType::BalanceTotalCreditor),
                (Some("USD"), ItemType::BalanceTotalCurrency),
            ]
        );
        assert!(verify_totals(&report).is_ok());
    }

    #[test]
    fn test_verify_totals_detects_mismatch() {
        let mut report = assemble_groups(rows(), |r| r.currency.clone(), &ByCurrency);
        let currency_total = report
            .iter_mut()
            .find(|r| r.item_type == ItemType::BalanceTotalCurrency)
            .unwrap();
        currency_total.current_balance = dec!(0.01);
        assert!(matches!(verify_totals(&report), Err(EngineError::DataQualityAssertion(_))));
    }

    #[test]
    fn test_grand_total() {
        let total = grand_total(&rows(), None);
        assert_eq!(total.item_type, ItemType::BalanceTotalConsolidated);
        assert_eq!(total.current_balance, Decimal::ZERO);
        assert_eq!(total.debit, dec!(11200));
    }

    #[test]
    fn test_control_total() {
        let report = assemble_groups(rows(), |r| r.currency.clone(), &ByCurrency);
        assert!(assert_control_total(&report, "MXN", Decimal::ZERO).is_ok());
        assert!(matches!(
            assert_control_total(&report, "MXN", dec!(15)),
            Err(EngineError::DataQualityAssertion(_))
        ));
    }
}
