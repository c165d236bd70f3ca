use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rust_decimal::Decimal;
use time::{Date, Duration, Month};

use balance_engine::engine::{BalanceEngine, EngineOptions};
use balance_engine::report_registry::ReportRegistry;
use balance_engine::storage::{InMemoryStorage, StorageBackend};
use balance_engine_core::{
    Account, AccountNature, BalanceQuery, CreateAccountsChartCommand, CreateVoucherCommand, PostingLine, ReportType,
    SetExchangeRateCommand, VoucherEntryCommand,
};

const ACCOUNTS: usize = 40;
const DAYS: i64 = 90;

fn start() -> Date {
    Date::from_calendar_date(2022, Month::January, 1).unwrap()
}

fn setup() -> BalanceEngine {
    let storage: Arc<dyn StorageBackend> = Arc::new(InMemoryStorage::new());

    let mut accounts = vec![
        Account::new("1", "Activo", AccountNature::Debtor, None),
        Account::new("2", "Pasivo", AccountNature::Creditor, None),
    ];
    for i in 0..ACCOUNTS {
        accounts.push(Account::new(&format!("1{:03}", i), "Activo", AccountNature::Debtor, Some("1")));
        accounts.push(Account::new(&format!("2{:03}", i), "Pasivo", AccountNature::Creditor, Some("2")));
    }
    storage
        .create_accounts_chart(&CreateAccountsChartCommand {
            id: Arc::from("BENCH"),
            name: Arc::from("Bench"),
            accounts,
        })
        .unwrap();

    for day in 0..DAYS {
        let date = start() + Duration::days(day);
        for i in 0..ACCOUNTS {
            let currency = if i % 3 == 0 { "USD" } else { "MXN" };
            let amount = Decimal::new(10_000 + (day * 37 + i as i64 * 11) % 5_000, 2);
            let sector = format!("{:02}", i % 4);
            storage
                .create_voucher(
                    "BENCH",
                    &CreateVoucherCommand {
                        ledger: Arc::from(if i % 2 == 0 { "01" } else { "02" }),
                        date,
                        concept: Arc::from("Bench"),
                        entries: vec![
                            VoucherEntryCommand::Debit(PostingLine::new(&format!("1{:03}", i), &sector, currency, amount)),
                            VoucherEntryCommand::Credit(
                                PostingLine::new(&format!("2{:03}", i), &sector, currency, amount)
                                    .with_subledger_account(&format!("CLI-{:03}", day % 7)),
                            ),
                        ],
                    },
                )
                .unwrap();
        }
    }

    storage
        .set_exchange_rate(&SetExchangeRateCommand {
            rate_type: Arc::from("FIX"),
            from_currency: Arc::from("MXN"),
            to_currency: Arc::from("USD"),
            date: start(),
            value: Decimal::new(2050, 2),
        })
        .unwrap();

    BalanceEngine::new(storage, Arc::new(ReportRegistry::with_defaults()), EngineOptions::default())
}

fn bench_reports(c: &mut Criterion) {
    let engine = setup();
    let from = start() + Duration::days(30);
    let to = start() + Duration::days(59);

    for report_type in ReportType::ALL {
        let query = BalanceQuery::new("BENCH", report_type, from, to);
        c.bench_function(&format!("report_{}", report_type.slug()), |b| {
            b.iter(|| engine.execute(black_box(&query)).unwrap())
        });
    }
}

criterion_group!(benches, bench_reports);
criterion_main!(benches);
