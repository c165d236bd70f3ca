use std::{str::FromStr, sync::{Arc, Mutex}};

use rust_decimal::{prelude::ToPrimitive, Decimal};
use rusqlite::{params, params_from_iter, Connection};
use time::{macros::format_description, Date, OffsetDateTime};

use balance_engine_core::{
    ensure_balanced, Account, AccountNature, AccountsChart, BalanceFilter, BalanceKey, BalanceRow,
    CreateAccountsChartCommand, CreateVoucherCommand, ExchangeRate, SetExchangeRateCommand, VoucherEntryCommand,
};

use crate::storage::{StorageBackend, StorageError};

pub struct SqliteStorage {
    conn: Mutex<Connection>,
}

impl SqliteStorage {
    pub fn new(path: &str) -> Result<Self, StorageError> {
        let conn = if path == ":memory:" {
            Connection::open_in_memory()
        } else {
            Connection::open(path)
        }
        .map_err(sql_err)?;

        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")
            .map_err(sql_err)?;

        let storage = Self {
            conn: Mutex::new(conn),
        };
        storage.init_schema()?;
        Ok(storage)
    }

    fn init_schema(&self) -> Result<(), StorageError> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS accounts_charts (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS accounts (
                chart_id TEXT NOT NULL,
                number TEXT NOT NULL,
                name TEXT NOT NULL,
                nature TEXT NOT NULL,
                parent TEXT,
                PRIMARY KEY (chart_id, number),
                FOREIGN KEY (chart_id) REFERENCES accounts_charts(id)
            );

            CREATE TABLE IF NOT EXISTS vouchers (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                chart_id TEXT NOT NULL,
                ledger TEXT NOT NULL,
                date TEXT NOT NULL,
                concept TEXT NOT NULL,
                created_at TEXT NOT NULL,
                FOREIGN KEY (chart_id) REFERENCES accounts_charts(id)
            );

            CREATE TABLE IF NOT EXISTS postings (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                voucher_id INTEGER NOT NULL,
                chart_id TEXT NOT NULL,
                ledger TEXT NOT NULL,
                date TEXT NOT NULL,
                account TEXT NOT NULL,
                sector TEXT NOT NULL,
                currency TEXT NOT NULL,
                subledger_account TEXT,
                debit INTEGER NOT NULL,
                credit INTEGER NOT NULL,
                FOREIGN KEY (voucher_id) REFERENCES vouchers(id),
                FOREIGN KEY (chart_id, account) REFERENCES accounts(chart_id, number)
            );

            CREATE INDEX IF NOT EXISTS idx_postings_chart_date
                ON postings(chart_id, date);

            CREATE TABLE IF NOT EXISTS exchange_rates (
                rate_type TEXT NOT NULL,
                to_currency TEXT NOT NULL,
                date TEXT NOT NULL,
                from_currency TEXT NOT NULL,
                value TEXT NOT NULL,
                PRIMARY KEY (rate_type, to_currency, date)
            );
            ",
        )
        .map_err(sql_err)?;
        Ok(())
    }

    fn chart_exists(conn: &Connection, chart_id: &str) -> Result<bool, StorageError> {
        conn.query_row(
            "SELECT COUNT(*) > 0 FROM accounts_charts WHERE id = ?1",
            params![chart_id],
            |row| row.get(0),
        )
        .map_err(sql_err)
    }

    fn insert_account(conn: &Connection, chart_id: &str, account: &Account) -> Result<(), StorageError> {
        conn.execute(
            "INSERT OR REPLACE INTO accounts (chart_id, number, name, nature, parent) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                chart_id,
                account.number.as_ref(),
                account.name.as_ref(),
                nature_to_str(account.nature),
                account.parent.as_deref()
            ],
        )
        .map_err(sql_err)?;
        Ok(())
    }
}

fn sql_err(e: rusqlite::Error) -> StorageError {
    StorageError::Other(e.to_string())
}

fn date_to_str(d: Date) -> String {
    format!("{:04}-{:02}-{:02}", d.year(), d.month() as u8, d.day())
}

fn str_to_date(s: &str) -> Result<Date, StorageError> {
    Date::parse(s, format_description!("[year]-[month]-[day]"))
        .map_err(|e| StorageError::Other(format!("Invalid date '{}': {}", s, e)))
}

fn nature_to_str(nature: AccountNature) -> &'static str {
    match nature {
        AccountNature::Debtor => "DEBTOR",
        AccountNature::Creditor => "CREDITOR",
    }
}

fn str_to_nature(s: &str) -> AccountNature {
    match s {
        "CREDITOR" => AccountNature::Creditor,
        _ => AccountNature::Debtor,
    }
}

/// Amounts are stored as integer cents so that SQL sums stay exact.
/// `ensure_balanced` has already rejected anything finer than a cent.
fn to_minor(amount: Decimal) -> Result<i64, StorageError> {
    (amount * Decimal::ONE_HUNDRED)
        .to_i64()
        .ok_or_else(|| StorageError::Other(format!("Amount out of range: {}", amount)))
}

fn from_minor(cents: i64) -> Decimal {
    Decimal::new(cents, 2)
}

fn push_in_clause(sql: &mut String, params: &mut Vec<String>, column: &str, values: &[Arc<str>]) {
    if values.is_empty() {
        return;
    }
    let mut placeholders = Vec::with_capacity(values.len());
    for value in values {
        params.push(value.to_string());
        placeholders.push(format!("?{}", params.len()));
    }
    sql.push_str(&format!(" AND {} IN ({})", column, placeholders.join(", ")));
}

impl StorageBackend for SqliteStorage {
    fn create_accounts_chart(&self, command: &CreateAccountsChartCommand) -> Result<(), StorageError> {
        let mut conn = self.conn.lock().unwrap();
        if Self::chart_exists(&conn, &command.id)? {
            return Err(StorageError::AccountsChartAlreadyExists(command.id.to_string()));
        }

        let tx = conn.transaction().map_err(sql_err)?;
        tx.execute(
            "INSERT INTO accounts_charts (id, name) VALUES (?1, ?2)",
            params![command.id.as_ref(), command.name.as_ref()],
        )
        .map_err(sql_err)?;
        for account in &command.accounts {
            Self::insert_account(&tx, &command.id, account)?;
        }
        tx.commit().map_err(sql_err)?;
        Ok(())
    }

    fn create_account(&self, chart_id: &str, account: &Account) -> Result<(), StorageError> {
        let conn = self.conn.lock().unwrap();
        if !Self::chart_exists(&conn, chart_id)? {
            return Err(StorageError::AccountsChartNotFound(chart_id.to_string()));
        }
        Self::insert_account(&conn, chart_id, account)
    }

    fn get_accounts_chart(&self, chart_id: &str) -> Result<AccountsChart, StorageError> {
        let conn = self.conn.lock().unwrap();
        let name: String = conn
            .query_row(
                "SELECT name FROM accounts_charts WHERE id = ?1",
                params![chart_id],
                |row| row.get(0),
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StorageError::AccountsChartNotFound(chart_id.to_string()),
                _ => sql_err(e),
            })?;

        let mut chart = AccountsChart::new(chart_id, &name);
        let mut stmt = conn
            .prepare("SELECT number, name, nature, parent FROM accounts WHERE chart_id = ?1 ORDER BY number")
            .map_err(sql_err)?;
        let rows = stmt
            .query_map(params![chart_id], |row| {
                let number: String = row.get(0)?;
                let name: String = row.get(1)?;
                let nature: String = row.get(2)?;
                let parent: Option<String> = row.get(3)?;
                Ok((number, name, nature, parent))
            })
            .map_err(sql_err)?;

        for row in rows {
            let (number, name, nature, parent) = row.map_err(sql_err)?;
            chart.add_account(Account::new(&number, &name, str_to_nature(&nature), parent.as_deref()));
        }
        Ok(chart)
    }

    fn list_accounts_charts(&self) -> Vec<Arc<str>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = match conn.prepare("SELECT id FROM accounts_charts ORDER BY id") {
            Ok(stmt) => stmt,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to list accounts charts");
                return Vec::new();
            }
        };
        let rows = match stmt.query_map([], |row| row.get::<_, String>(0)) {
            Ok(rows) => rows,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to list accounts charts");
                return Vec::new();
            }
        };
        rows.flatten().map(|id| Arc::from(id.as_str())).collect()
    }

    fn create_voucher(&self, chart_id: &str, command: &CreateVoucherCommand) -> Result<(), StorageError> {
        ensure_balanced(command)?;

        let mut conn = self.conn.lock().unwrap();
        if !Self::chart_exists(&conn, chart_id)? {
            return Err(StorageError::AccountsChartNotFound(chart_id.to_string()));
        }

        let tx = conn.transaction().map_err(sql_err)?;
        let date_str = date_to_str(command.date);
        let now = OffsetDateTime::now_utc().to_string();

        tx.execute(
            "INSERT INTO vouchers (chart_id, ledger, date, concept, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![chart_id, command.ledger.as_ref(), date_str, command.concept.as_ref(), now],
        )
        .map_err(sql_err)?;
        let voucher_id = tx.last_insert_rowid();

        for entry in &command.entries {
            let line = entry.line();
            let exists: bool = tx
                .query_row(
                    "SELECT COUNT(*) > 0 FROM accounts WHERE chart_id = ?1 AND number = ?2",
                    params![chart_id, line.account.as_ref()],
                    |row| row.get(0),
                )
                .map_err(sql_err)?;
            if !exists {
                // dropping the transaction rolls the voucher back
                return Err(StorageError::AccountNotFound(line.account.to_string()));
            }

            let (debit, credit) = match entry {
                VoucherEntryCommand::Debit(line) => (to_minor(line.amount)?, 0),
                VoucherEntryCommand::Credit(line) => (0, to_minor(line.amount)?),
            };

            tx.execute(
                "INSERT INTO postings (voucher_id, chart_id, ledger, date, account, sector, currency, subledger_account, debit, credit)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    voucher_id,
                    chart_id,
                    command.ledger.as_ref(),
                    date_str,
                    line.account.as_ref(),
                    line.sector.as_ref(),
                    line.currency.as_ref(),
                    line.subledger_account.as_deref(),
                    debit,
                    credit
                ],
            )
            .map_err(sql_err)?;
        }

        tx.commit().map_err(sql_err)?;
        tracing::debug!(voucher_id, chart_id, postings = command.entries.len(), "SQLite voucher posted");
        Ok(())
    }

    fn read_balances(&self, chart_id: &str, filter: &BalanceFilter) -> Result<Vec<BalanceRow>, StorageError> {
        let conn = self.conn.lock().unwrap();
        if !Self::chart_exists(&conn, chart_id)? {
            return Err(StorageError::AccountsChartNotFound(chart_id.to_string()));
        }

        let subledger = if filter.with_subledger_accounts {
            "COALESCE(subledger_account, '')"
        } else {
            "''"
        };

        let mut sql = format!(
            "SELECT ledger, currency, account, sector, {} AS subledger,
                    SUM(CASE WHEN date < ?2 THEN debit - credit ELSE 0 END),
                    SUM(CASE WHEN date >= ?2 THEN debit ELSE 0 END),
                    SUM(CASE WHEN date >= ?2 THEN credit ELSE 0 END),
                    MAX(date)
             FROM postings
             WHERE chart_id = ?1 AND date <= ?3",
            subledger
        );
        let mut params: Vec<String> = vec![
            chart_id.to_string(),
            date_to_str(filter.from_date),
            date_to_str(filter.to_date),
        ];

        push_in_clause(&mut sql, &mut params, "ledger", &filter.ledgers);
        push_in_clause(&mut sql, &mut params, "currency", &filter.currencies);
        push_in_clause(&mut sql, &mut params, "sector", &filter.sectors);

        if let Some(from) = &filter.from_account {
            params.push(from.to_string());
            sql.push_str(&format!(" AND account >= ?{}", params.len()));
        }
        if let Some(to) = &filter.to_account {
            params.push(to.to_string());
            let n = params.len();
            sql.push_str(&format!(" AND (account <= ?{n} OR substr(account, 1, length(?{n})) = ?{n})"));
        }

        sql.push_str(
            " GROUP BY ledger, currency, account, sector, subledger
              ORDER BY ledger, currency, account, sector, subledger",
        );

        let mut stmt = conn.prepare(&sql).map_err(sql_err)?;
        let rows = stmt
            .query_map(params_from_iter(params.iter()), |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, i64>(5)?,
                    row.get::<_, i64>(6)?,
                    row.get::<_, i64>(7)?,
                    row.get::<_, Option<String>>(8)?,
                ))
            })
            .map_err(sql_err)?;

        let mut result = Vec::new();
        for row in rows {
            let (ledger, currency, account, sector, subledger, initial, debit, credit, last) = row.map_err(sql_err)?;
            if initial == 0 && debit == 0 && credit == 0 {
                continue;
            }
            result.push(BalanceRow {
                key: BalanceKey {
                    ledger: Arc::from(ledger.as_str()),
                    currency: Arc::from(currency.as_str()),
                    account: Arc::from(account.as_str()),
                    sector: Arc::from(sector.as_str()),
                    subledger_account: if subledger.is_empty() { None } else { Some(Arc::from(subledger.as_str())) },
                },
                initial_balance: from_minor(initial),
                debit: from_minor(debit),
                credit: from_minor(credit),
                last_change_date: last.as_deref().map(str_to_date).transpose()?,
            });
        }

        tracing::debug!(chart_id, rows = result.len(), "SQLite balances read");
        Ok(result)
    }

    fn set_exchange_rate(&self, command: &SetExchangeRateCommand) -> Result<(), StorageError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR REPLACE INTO exchange_rates (rate_type, to_currency, date, from_currency, value) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                command.rate_type.as_ref(),
                command.to_currency.as_ref(),
                date_to_str(command.date),
                command.from_currency.as_ref(),
                command.value.to_string()
            ],
        )
        .map_err(sql_err)?;
        Ok(())
    }

    fn get_exchange_rate(&self, rate_type: &str, currency: &str, date: Date) -> Result<ExchangeRate, StorageError> {
        let conn = self.conn.lock().unwrap();
        let result: Result<(String, String, String), _> = conn.query_row(
            "SELECT date, from_currency, value FROM exchange_rates
             WHERE rate_type = ?1 AND to_currency = ?2 AND date <= ?3
             ORDER BY date DESC LIMIT 1",
            params![rate_type, currency, date_to_str(date)],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        );
        match result {
            Ok((rate_date, from_currency, value)) => Ok(ExchangeRate {
                from_currency: Arc::from(from_currency.as_str()),
                to_currency: Arc::from(currency),
                rate_type: Arc::from(rate_type),
                date: str_to_date(&rate_date)?,
                value: Decimal::from_str(&value)
                    .map_err(|e| StorageError::Other(format!("Invalid decimal: {}", e)))?,
            }),
            Err(rusqlite::Error::QueryReturnedNoRows) => Err(StorageError::NoRateFound {
                rate_type: rate_type.to_string(),
                currency: currency.to_string(),
                date,
            }),
            Err(e) => Err(sql_err(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use balance_engine_core::{BalanceQuery, PostingLine, ReportType};
    use rust_decimal_macros::dec;
    use time::macros::date;

    fn storage() -> SqliteStorage {
        let storage = SqliteStorage::new(":memory:").unwrap();
        storage
            .create_accounts_chart(&CreateAccountsChartCommand {
                id: Arc::from("IFRS"),
                name: Arc::from("IFRS"),
                accounts: vec![
                    Account::new("1", "Activo", AccountNature::Debtor, None),
                    Account::new("1101", "Caja", AccountNature::Debtor, Some("1")),
                    Account::new("2101", "Depositos", AccountNature::Creditor, None),
                ],
            })
            .unwrap();
        storage
    }

    fn deposit(date: Date, amount: Decimal, client: &str) -> CreateVoucherCommand {
        CreateVoucherCommand {
            ledger: Arc::from("01"),
            date,
            concept: Arc::from("Deposit"),
            entries: vec![
                VoucherEntryCommand::Debit(PostingLine::new("1101", "00", "MXN", amount)),
                VoucherEntryCommand::Credit(PostingLine::new("2101", "01", "MXN", amount).with_subledger_account(client)),
            ],
        }
    }

    #[test]
    fn test_sqlite_chart_round_trip() {
        let storage = storage();
        let chart = storage.get_accounts_chart("IFRS").unwrap();
        assert_eq!(chart.level("1101"), 2);
        assert_eq!(chart.get_account("2101").unwrap().nature, AccountNature::Creditor);
        assert_eq!(storage.list_accounts_charts(), vec![Arc::<str>::from("IFRS")]);
        assert!(matches!(storage.get_accounts_chart("NOPE"), Err(StorageError::AccountsChartNotFound(_))));
    }

    #[test]
    fn test_sqlite_read_balances() {
        let storage = storage();
        storage.create_voucher("IFRS", &deposit(date!(2022 - 01 - 20), dec!(1000.10), "A")).unwrap();
        storage.create_voucher("IFRS", &deposit(date!(2022 - 02 - 03), dec!(250.25), "B")).unwrap();
        storage.create_voucher("IFRS", &deposit(date!(2022 - 03 - 03), dec!(9), "B")).unwrap();

        let mut query = BalanceQuery::new("IFRS", ReportType::SaldosPorCuenta, date!(2022 - 02 - 01), date!(2022 - 02 - 28));
        query.to_account = Some(Arc::from("2"));
        let rows = storage.read_balances("IFRS", &BalanceFilter::from_query(&query)).unwrap();

        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].key.account.as_ref(), "1101");
        assert_eq!(rows[0].initial_balance, dec!(1000.10));
        assert_eq!(rows[0].debit, dec!(250.25));
        assert_eq!(rows[0].last_change_date, Some(date!(2022 - 02 - 03)));
        assert_eq!(rows[1].key.subledger_account.as_deref(), Some("A"));
        assert_eq!(rows[1].initial_balance, dec!(-1000.10));
        assert_eq!(rows[2].key.subledger_account.as_deref(), Some("B"));
        assert_eq!(rows[2].credit, dec!(250.25));
    }

    #[test]
    fn test_sqlite_voucher_rolls_back_on_unknown_account() {
        let storage = storage();
        let mut cmd = deposit(date!(2022 - 02 - 03), dec!(10), "A");
        cmd.entries.push(VoucherEntryCommand::Debit(PostingLine::new("9999", "00", "MXN", dec!(5))));
        cmd.entries.push(VoucherEntryCommand::Credit(PostingLine::new("1101", "00", "MXN", dec!(5))));
        assert!(matches!(storage.create_voucher("IFRS", &cmd), Err(StorageError::AccountNotFound(_))));

        let query = BalanceQuery::new("IFRS", ReportType::Balanza, date!(2022 - 01 - 01), date!(2022 - 12 - 31));
        let rows = storage.read_balances("IFRS", &BalanceFilter::from_query(&query)).unwrap();
        assert!(rows.is_empty(), "Postings should be rolled back");
    }

    #[test]
    fn test_sqlite_rejects_sub_cent_amounts() {
        let storage = storage();
        let result = storage.create_voucher("IFRS", &deposit(date!(2022 - 02 - 03), dec!(0.005), "A"));
        assert!(matches!(result, Err(StorageError::InvalidAmount { .. })));

        let query = BalanceQuery::new("IFRS", ReportType::Balanza, date!(2022 - 01 - 01), date!(2022 - 12 - 31));
        let rows = storage.read_balances("IFRS", &BalanceFilter::from_query(&query)).unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn test_sqlite_exchange_rates() {
        let storage = storage();
        storage
            .set_exchange_rate(&SetExchangeRateCommand {
                rate_type: Arc::from("FIX"),
                from_currency: Arc::from("MXN"),
                to_currency: Arc::from("USD"),
                date: date!(2022 - 02 - 28),
                value: dec!(20.5012),
            })
            .unwrap();

        let rate = storage.get_exchange_rate("FIX", "USD", date!(2022 - 03 - 05)).unwrap();
        assert_eq!(rate.value, dec!(20.5012));
        assert_eq!(rate.date, date!(2022 - 02 - 28));
        assert!(matches!(
            storage.get_exchange_rate("FIX", "EUR", date!(2022 - 03 - 05)),
            Err(StorageError::NoRateFound { .. })
        ));
    }
}
