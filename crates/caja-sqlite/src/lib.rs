//! SQLite storage backend for Caja.
//!
//! One connection guarded by a mutex. Every unit of work runs inside
//! `BEGIN IMMEDIATE`, so the write lock is taken before any register row is read.

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc, Mutex, MutexGuard,
};

use rusqlite::{ffi, params, Connection, ErrorCode, OptionalExtension, Row};
use rust_decimal::Decimal;
use time::{Date, OffsetDateTime};
use uuid::Uuid;

use caja_core::{
    text::{date_to_str, str_to_date, str_to_decimal, str_to_timestamp, timestamp_to_str},
    Actor, BillingPeriod, Expense, LedgerStore, LedgerTx, LineItem, Movement, MovementSource,
    NewMovement, Payment, Receipt, Register, StorageError,
};

pub struct SqliteStorage {
    conn: Mutex<Connection>,
    tx_counter: AtomicU64,
}

impl SqliteStorage {
    pub fn new(path: &str) -> Result<Self, StorageError> {
        let conn = if path == ":memory:" {
            Connection::open_in_memory()
        } else {
            Connection::open(path)
        }
        .map_err(sql_err)?;

        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON; PRAGMA busy_timeout=5000;")
            .map_err(sql_err)?;

        let storage = Self {
            conn: Mutex::new(conn),
            tx_counter: AtomicU64::new(1),
        };
        storage.init_schema()?;
        Ok(storage)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StorageError> {
        self.conn
            .lock()
            .map_err(|_| StorageError::Other("sqlite connection lock poisoned".to_string()))
    }

    fn init_schema(&self) -> Result<(), StorageError> {
        let conn = self.lock()?;
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS registers (
                date TEXT PRIMARY KEY,
                opening_balance TEXT NOT NULL,
                closing_balance TEXT,
                closed INTEGER NOT NULL DEFAULT 0,
                opened_by_id TEXT NOT NULL,
                opened_by_name TEXT NOT NULL,
                opened_at TEXT NOT NULL,
                closed_by_id TEXT,
                closed_by_name TEXT,
                closed_at TEXT,
                balance_overridden INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS receipts (
                id TEXT PRIMARY KEY,
                number INTEGER NOT NULL UNIQUE,
                client_id TEXT NOT NULL,
                date TEXT NOT NULL,
                created_by_id TEXT NOT NULL,
                created_by_name TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS receipt_items (
                receipt_id TEXT NOT NULL REFERENCES receipts(id) ON DELETE CASCADE,
                position INTEGER NOT NULL,
                description TEXT NOT NULL,
                period_year INTEGER,
                period_month INTEGER,
                amount TEXT NOT NULL,
                PRIMARY KEY (receipt_id, position)
            );

            CREATE TABLE IF NOT EXISTS receipt_payments (
                receipt_id TEXT NOT NULL REFERENCES receipts(id) ON DELETE CASCADE,
                position INTEGER NOT NULL,
                method TEXT NOT NULL,
                amount TEXT NOT NULL,
                check_numbers TEXT NOT NULL DEFAULT '[]',
                PRIMARY KEY (receipt_id, position)
            );

            CREATE TABLE IF NOT EXISTS expenses (
                id TEXT PRIMARY KEY,
                date TEXT NOT NULL,
                description TEXT NOT NULL,
                amount TEXT NOT NULL,
                payment_method TEXT,
                created_by_id TEXT NOT NULL,
                created_by_name TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS movements (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                date TEXT NOT NULL REFERENCES registers(date),
                kind TEXT NOT NULL,
                amount TEXT NOT NULL,
                running_balance TEXT NOT NULL,
                description TEXT NOT NULL,
                payment_method TEXT,
                receipt_id TEXT,
                receipt_number INTEGER,
                expense_id TEXT,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_movements_date
                ON movements(date, id);

            CREATE INDEX IF NOT EXISTS idx_movements_receipt
                ON movements(receipt_id);

            CREATE INDEX IF NOT EXISTS idx_movements_expense
                ON movements(expense_id);

            CREATE TABLE IF NOT EXISTS sequence_counter (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                value INTEGER NOT NULL
            );

            INSERT OR IGNORE INTO sequence_counter (id, value) VALUES (1, 0);
            ",
        )
        .map_err(sql_err)?;
        Ok(())
    }
}

fn sql_err(e: rusqlite::Error) -> StorageError {
    match &e {
        rusqlite::Error::SqliteFailure(failure, _) => match failure.code {
            ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked => StorageError::Transient(e.to_string()),
            ErrorCode::ConstraintViolation if failure.extended_code == ffi::SQLITE_CONSTRAINT_FOREIGNKEY => {
                StorageError::EntityNotFound(e.to_string())
            }
            ErrorCode::ConstraintViolation => StorageError::EntityAlreadyExists(e.to_string()),
            _ => StorageError::Other(e.to_string()),
        },
        _ => StorageError::Other(e.to_string()),
    }
}

fn parse_uuid(s: &str) -> Result<Uuid, StorageError> {
    Uuid::parse_str(s).map_err(|e| StorageError::Other(format!("invalid id {}: {}", s, e)))
}

fn opt_actor(id: Option<String>, name: Option<String>) -> Option<Actor> {
    match (id, name) {
        (Some(id), Some(name)) => Some(Actor::new(id, name)),
        _ => None,
    }
}

const REGISTER_COLUMNS: &str = "date, opening_balance, closing_balance, closed, opened_by_id, opened_by_name,
     opened_at, closed_by_id, closed_by_name, closed_at, balance_overridden";

struct RegisterRow {
    date: String,
    opening_balance: String,
    closing_balance: Option<String>,
    closed: bool,
    opened_by_id: String,
    opened_by_name: String,
    opened_at: String,
    closed_by_id: Option<String>,
    closed_by_name: Option<String>,
    closed_at: Option<String>,
    balance_overridden: bool,
}

impl RegisterRow {
    fn read(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            date: row.get(0)?,
            opening_balance: row.get(1)?,
            closing_balance: row.get(2)?,
            closed: row.get(3)?,
            opened_by_id: row.get(4)?,
            opened_by_name: row.get(5)?,
            opened_at: row.get(6)?,
            closed_by_id: row.get(7)?,
            closed_by_name: row.get(8)?,
            closed_at: row.get(9)?,
            balance_overridden: row.get(10)?,
        })
    }

    fn into_register(self) -> Result<Register, StorageError> {
        Ok(Register {
            date: str_to_date(&self.date)?,
            opening_balance: str_to_decimal(&self.opening_balance)?,
            closing_balance: self.closing_balance.as_deref().map(str_to_decimal).transpose()?,
            closed: self.closed,
            opened_by: Actor::new(self.opened_by_id, self.opened_by_name),
            opened_at: str_to_timestamp(&self.opened_at)?,
            closed_by: opt_actor(self.closed_by_id, self.closed_by_name),
            closed_at: self.closed_at.as_deref().map(str_to_timestamp).transpose()?,
            balance_overridden: self.balance_overridden,
        })
    }
}

const MOVEMENT_COLUMNS: &str = "id, date, kind, amount, running_balance, description, payment_method,
     receipt_id, receipt_number, expense_id, created_at";

struct MovementRow {
    id: u64,
    date: String,
    kind: String,
    amount: String,
    running_balance: String,
    description: String,
    payment_method: Option<String>,
    receipt_id: Option<String>,
    receipt_number: Option<u64>,
    expense_id: Option<String>,
    created_at: String,
}

impl MovementRow {
    fn read(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            date: row.get(1)?,
            kind: row.get(2)?,
            amount: row.get(3)?,
            running_balance: row.get(4)?,
            description: row.get(5)?,
            payment_method: row.get(6)?,
            receipt_id: row.get(7)?,
            receipt_number: row.get(8)?,
            expense_id: row.get(9)?,
            created_at: row.get(10)?,
        })
    }

    fn into_movement(self) -> Result<Movement, StorageError> {
        let source = match (self.receipt_id, self.receipt_number, self.expense_id) {
            (Some(id), Some(number), _) => MovementSource::Receipt { receipt_id: parse_uuid(&id)?, number },
            (_, _, Some(id)) => MovementSource::Expense { expense_id: parse_uuid(&id)? },
            _ => MovementSource::Manual,
        };
        Ok(Movement {
            id: self.id,
            date: str_to_date(&self.date)?,
            kind: self.kind.parse().map_err(StorageError::Other)?,
            amount: str_to_decimal(&self.amount)?,
            running_balance: str_to_decimal(&self.running_balance)?,
            description: Arc::from(self.description.as_str()),
            payment_method: self.payment_method.map(|m| Arc::from(m.as_str())),
            source,
            created_at: str_to_timestamp(&self.created_at)?,
        })
    }
}

fn source_columns(source: &MovementSource) -> (Option<String>, Option<u64>, Option<String>) {
    match source {
        MovementSource::Manual => (None, None, None),
        MovementSource::Receipt { receipt_id, number } => (Some(receipt_id.to_string()), Some(*number), None),
        MovementSource::Expense { expense_id } => (None, None, Some(expense_id.to_string())),
    }
}

impl LedgerStore for SqliteStorage {
    fn begin(&self) -> Result<Box<dyn LedgerTx + '_>, StorageError> {
        self.start("BEGIN IMMEDIATE")
    }

    fn begin_read(&self) -> Result<Box<dyn LedgerTx + '_>, StorageError> {
        self.start("BEGIN DEFERRED")
    }
}

impl SqliteStorage {
    fn start(&self, statement: &str) -> Result<Box<dyn LedgerTx + '_>, StorageError> {
        let conn = self.lock()?;
        conn.execute_batch(statement).map_err(sql_err)?;
        let tx_id = self.tx_counter.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(tx_id, statement, "SQLite transaction started");
        Ok(Box::new(SqliteTx {
            tx_id,
            conn,
            finished: false,
        }))
    }
}

struct SqliteTx<'a> {
    tx_id: u64,
    conn: MutexGuard<'a, Connection>,
    finished: bool,
}

impl Drop for SqliteTx<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        match self.conn.execute_batch("ROLLBACK") {
            Ok(()) => tracing::debug!(tx_id = self.tx_id, "SQLite transaction rolled back"),
            Err(e) => tracing::error!(tx_id = self.tx_id, error = %e, "SQLite rollback failed"),
        }
    }
}

impl SqliteTx<'_> {
    fn load_receipt(&self, id: &str) -> Result<Option<Receipt>, StorageError> {
        let header = self
            .conn
            .query_row(
                "SELECT id, number, client_id, date, created_by_id, created_by_name, created_at
                 FROM receipts WHERE id = ?1",
                params![id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, u64>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, String>(5)?,
                        row.get::<_, String>(6)?,
                    ))
                },
            )
            .optional()
            .map_err(sql_err)?;

        let Some((rid, number, client_id, date, by_id, by_name, created_at)) = header else {
            return Ok(None);
        };

        let mut stmt = self
            .conn
            .prepare(
                "SELECT description, period_year, period_month, amount
                 FROM receipt_items WHERE receipt_id = ?1 ORDER BY position",
            )
            .map_err(sql_err)?;
        let item_rows = stmt
            .query_map(params![id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, Option<i32>>(1)?,
                    row.get::<_, Option<u8>>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })
            .map_err(sql_err)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(sql_err)?;

        let mut items = Vec::with_capacity(item_rows.len());
        for (description, year, month, amount) in item_rows {
            items.push(LineItem {
                description: Arc::from(description.as_str()),
                period: match (year, month) {
                    (Some(year), Some(month)) => Some(BillingPeriod { year, month }),
                    _ => None,
                },
                amount: str_to_decimal(&amount)?,
            });
        }

        let mut stmt = self
            .conn
            .prepare(
                "SELECT method, amount, check_numbers
                 FROM receipt_payments WHERE receipt_id = ?1 ORDER BY position",
            )
            .map_err(sql_err)?;
        let payment_rows = stmt
            .query_map(params![id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })
            .map_err(sql_err)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(sql_err)?;

        let mut payments = Vec::with_capacity(payment_rows.len());
        for (method, amount, checks) in payment_rows {
            let check_numbers: Vec<String> = serde_json::from_str(&checks)
                .map_err(|e| StorageError::Other(format!("invalid check numbers: {}", e)))?;
            payments.push(Payment {
                method: Arc::from(method.as_str()),
                amount: str_to_decimal(&amount)?,
                check_numbers: check_numbers.iter().map(|c| Arc::from(c.as_str())).collect(),
            });
        }

        Ok(Some(Receipt {
            id: parse_uuid(&rid)?,
            number,
            client_id: Arc::from(client_id.as_str()),
            date: str_to_date(&date)?,
            items,
            payments,
            created_by: Actor::new(by_id, by_name),
            created_at: str_to_timestamp(&created_at)?,
        }))
    }
}

impl LedgerTx for SqliteTx<'_> {
    fn register(&mut self, date: Date) -> Result<Option<Register>, StorageError> {
        let row = self
            .conn
            .query_row(
                &format!("SELECT {} FROM registers WHERE date = ?1", REGISTER_COLUMNS),
                params![date_to_str(date)],
                RegisterRow::read,
            )
            .optional()
            .map_err(sql_err)?;
        row.map(RegisterRow::into_register).transpose()
    }

    fn register_for_update(&mut self, date: Date) -> Result<Option<Register>, StorageError> {
        // The IMMEDIATE transaction already holds the database write lock.
        let row = self
            .conn
            .query_row(
                &format!("SELECT {} FROM registers WHERE date = ?1", REGISTER_COLUMNS),
                params![date_to_str(date)],
                RegisterRow::read,
            )
            .optional()
            .map_err(sql_err)?;
        row.map(RegisterRow::into_register).transpose()
    }

    fn insert_register(&mut self, register: &Register) -> Result<(), StorageError> {
        self.conn
            .execute(
                &format!(
                    "INSERT INTO registers ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                    REGISTER_COLUMNS
                ),
                params![
                    date_to_str(register.date),
                    register.opening_balance.to_string(),
                    register.closing_balance.map(|b| b.to_string()),
                    register.closed,
                    register.opened_by.id.as_ref(),
                    register.opened_by.name.as_ref(),
                    timestamp_to_str(register.opened_at)?,
                    register.closed_by.as_ref().map(|a| a.id.to_string()),
                    register.closed_by.as_ref().map(|a| a.name.to_string()),
                    register.closed_at.map(timestamp_to_str).transpose()?,
                    register.balance_overridden,
                ],
            )
            .map_err(sql_err)?;
        Ok(())
    }

    fn update_register(&mut self, register: &Register) -> Result<(), StorageError> {
        let changed = self
            .conn
            .execute(
                "UPDATE registers SET closing_balance = ?2, closed = ?3, closed_by_id = ?4,
                     closed_by_name = ?5, closed_at = ?6, balance_overridden = ?7
                 WHERE date = ?1",
                params![
                    date_to_str(register.date),
                    register.closing_balance.map(|b| b.to_string()),
                    register.closed,
                    register.closed_by.as_ref().map(|a| a.id.to_string()),
                    register.closed_by.as_ref().map(|a| a.name.to_string()),
                    register.closed_at.map(timestamp_to_str).transpose()?,
                    register.balance_overridden,
                ],
            )
            .map_err(sql_err)?;
        if changed == 0 {
            return Err(StorageError::EntityNotFound(register.date.to_string()));
        }
        Ok(())
    }

    fn open_registers_before(&mut self, date: Date) -> Result<Vec<Date>, StorageError> {
        let mut stmt = self
            .conn
            .prepare("SELECT date FROM registers WHERE closed = 0 AND date < ?1 ORDER BY date")
            .map_err(sql_err)?;
        let rows = stmt
            .query_map(params![date_to_str(date)], |row| row.get::<_, String>(0))
            .map_err(sql_err)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(sql_err)?;
        rows.iter().map(|d| str_to_date(d)).collect()
    }

    fn movements_for_date(&mut self, date: Date) -> Result<Vec<Movement>, StorageError> {
        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT {} FROM movements WHERE date = ?1 ORDER BY id",
                MOVEMENT_COLUMNS
            ))
            .map_err(sql_err)?;
        let rows = stmt
            .query_map(params![date_to_str(date)], MovementRow::read)
            .map_err(sql_err)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(sql_err)?;
        rows.into_iter().map(MovementRow::into_movement).collect()
    }

    fn last_running_balance(&mut self, date: Date) -> Result<Option<Decimal>, StorageError> {
        let val: Option<String> = self
            .conn
            .query_row(
                "SELECT running_balance FROM movements WHERE date = ?1 ORDER BY id DESC LIMIT 1",
                params![date_to_str(date)],
                |row| row.get(0),
            )
            .optional()
            .map_err(sql_err)?;
        val.as_deref().map(str_to_decimal).transpose()
    }

    fn insert_movement(&mut self, movement: &NewMovement, running_balance: Decimal, created_at: OffsetDateTime) -> Result<Movement, StorageError> {
        let (receipt_id, receipt_number, expense_id) = source_columns(&movement.source);
        self.conn
            .execute(
                "INSERT INTO movements (date, kind, amount, running_balance, description, payment_method,
                     receipt_id, receipt_number, expense_id, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    date_to_str(movement.date),
                    movement.kind.as_str(),
                    movement.amount.to_string(),
                    running_balance.to_string(),
                    movement.description.as_ref(),
                    movement.payment_method.as_deref(),
                    receipt_id,
                    receipt_number,
                    expense_id,
                    timestamp_to_str(created_at)?,
                ],
            )
            .map_err(sql_err)?;

        Ok(Movement {
            id: self.conn.last_insert_rowid() as u64,
            date: movement.date,
            kind: movement.kind,
            amount: movement.amount,
            running_balance,
            description: movement.description.clone(),
            payment_method: movement.payment_method.clone(),
            source: movement.source.clone(),
            created_at,
        })
    }

    fn delete_movements_for_receipt(&mut self, receipt_id: Uuid) -> Result<usize, StorageError> {
        self.conn
            .execute("DELETE FROM movements WHERE receipt_id = ?1", params![receipt_id.to_string()])
            .map_err(sql_err)
    }

    fn delete_movements_for_expense(&mut self, expense_id: Uuid) -> Result<usize, StorageError> {
        self.conn
            .execute("DELETE FROM movements WHERE expense_id = ?1", params![expense_id.to_string()])
            .map_err(sql_err)
    }

    fn next_receipt_number(&mut self) -> Result<u64, StorageError> {
        self.conn
            .query_row(
                "UPDATE sequence_counter SET value = value + 1 WHERE id = 1 RETURNING value",
                [],
                |row| row.get(0),
            )
            .map_err(sql_err)
    }

    fn current_receipt_number(&mut self) -> Result<u64, StorageError> {
        self.conn
            .query_row("SELECT value FROM sequence_counter WHERE id = 1", [], |row| row.get(0))
            .map_err(sql_err)
    }

    fn decrement_receipt_number(&mut self, expected: u64) -> Result<bool, StorageError> {
        let changed = self
            .conn
            .execute(
                "UPDATE sequence_counter SET value = value - 1 WHERE id = 1 AND value = ?1 AND value > 0",
                params![expected],
            )
            .map_err(sql_err)?;
        Ok(changed == 1)
    }

    fn insert_receipt(&mut self, receipt: &Receipt) -> Result<(), StorageError> {
        let id = receipt.id.to_string();
        self.conn
            .execute(
                "INSERT INTO receipts (id, number, client_id, date, created_by_id, created_by_name, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    id,
                    receipt.number,
                    receipt.client_id.as_ref(),
                    date_to_str(receipt.date),
                    receipt.created_by.id.as_ref(),
                    receipt.created_by.name.as_ref(),
                    timestamp_to_str(receipt.created_at)?,
                ],
            )
            .map_err(sql_err)?;

        for (position, item) in receipt.items.iter().enumerate() {
            self.conn
                .execute(
                    "INSERT INTO receipt_items (receipt_id, position, description, period_year, period_month, amount)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    params![
                        id,
                        position,
                        item.description.as_ref(),
                        item.period.map(|p| p.year),
                        item.period.map(|p| p.month),
                        item.amount.to_string(),
                    ],
                )
                .map_err(sql_err)?;
        }

        for (position, payment) in receipt.payments.iter().enumerate() {
            let checks: Vec<&str> = payment.check_numbers.iter().map(|c| c.as_ref()).collect();
            let checks = serde_json::to_string(&checks)
                .map_err(|e| StorageError::Other(e.to_string()))?;
            self.conn
                .execute(
                    "INSERT INTO receipt_payments (receipt_id, position, method, amount, check_numbers)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![id, position, payment.method.as_ref(), payment.amount.to_string(), checks],
                )
                .map_err(sql_err)?;
        }

        Ok(())
    }

    fn receipt(&mut self, id: Uuid) -> Result<Option<Receipt>, StorageError> {
        self.load_receipt(&id.to_string())
    }

    fn latest_receipt(&mut self) -> Result<Option<Receipt>, StorageError> {
        let id: Option<String> = self
            .conn
            .query_row("SELECT id FROM receipts ORDER BY number DESC LIMIT 1", [], |row| row.get(0))
            .optional()
            .map_err(sql_err)?;
        match id {
            Some(id) => self.load_receipt(&id),
            None => Ok(None),
        }
    }

    fn count_receipts_from(&mut self, number: u64) -> Result<u64, StorageError> {
        self.conn
            .query_row("SELECT COUNT(*) FROM receipts WHERE number >= ?1", params![number], |row| row.get(0))
            .map_err(sql_err)
    }

    fn delete_receipt(&mut self, id: Uuid) -> Result<bool, StorageError> {
        let changed = self
            .conn
            .execute("DELETE FROM receipts WHERE id = ?1", params![id.to_string()])
            .map_err(sql_err)?;
        Ok(changed == 1)
    }

    fn insert_expense(&mut self, expense: &Expense) -> Result<(), StorageError> {
        self.conn
            .execute(
                "INSERT INTO expenses (id, date, description, amount, payment_method, created_by_id, created_by_name, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    expense.id.to_string(),
                    date_to_str(expense.date),
                    expense.description.as_ref(),
                    expense.amount.to_string(),
                    expense.payment_method.as_deref(),
                    expense.created_by.id.as_ref(),
                    expense.created_by.name.as_ref(),
                    timestamp_to_str(expense.created_at)?,
                ],
            )
            .map_err(sql_err)?;
        Ok(())
    }

    fn expense(&mut self, id: Uuid) -> Result<Option<Expense>, StorageError> {
        let row = self
            .conn
            .query_row(
                "SELECT date, description, amount, payment_method, created_by_id, created_by_name, created_at
                 FROM expenses WHERE id = ?1",
                params![id.to_string()],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, Option<String>>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, String>(5)?,
                        row.get::<_, String>(6)?,
                    ))
                },
            )
            .optional()
            .map_err(sql_err)?;

        let Some((date, description, amount, method, by_id, by_name, created_at)) = row else {
            return Ok(None);
        };
        Ok(Some(Expense {
            id,
            date: str_to_date(&date)?,
            description: Arc::from(description.as_str()),
            amount: str_to_decimal(&amount)?,
            payment_method: method.map(|m| Arc::from(m.as_str())),
            created_by: Actor::new(by_id, by_name),
            created_at: str_to_timestamp(&created_at)?,
        }))
    }

    fn update_expense(&mut self, expense: &Expense) -> Result<(), StorageError> {
        let changed = self
            .conn
            .execute(
                "UPDATE expenses SET description = ?2, amount = ?3, payment_method = ?4 WHERE id = ?1",
                params![
                    expense.id.to_string(),
                    expense.description.as_ref(),
                    expense.amount.to_string(),
                    expense.payment_method.as_deref(),
                ],
            )
            .map_err(sql_err)?;
        if changed == 0 {
            return Err(StorageError::EntityNotFound(expense.id.to_string()));
        }
        Ok(())
    }

    fn delete_expense(&mut self, id: Uuid) -> Result<bool, StorageError> {
        let changed = self
            .conn
            .execute("DELETE FROM expenses WHERE id = ?1", params![id.to_string()])
            .map_err(sql_err)?;
        Ok(changed == 1)
    }

    fn commit(mut self: Box<Self>) -> Result<(), StorageError> {
        self.conn.execute_batch("COMMIT").map_err(sql_err)?;
        self.finished = true;
        tracing::debug!(tx_id = self.tx_id, "SQLite transaction committed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use caja_core::MovementKind;
    use rust_decimal_macros::dec;
    use time::macros::date;

    fn register(date: Date) -> Register {
        Register::open(date, dec!(100.00), Actor::new("1", "Ana"), OffsetDateTime::UNIX_EPOCH)
    }

    fn receipt(number: u64, date: Date) -> Receipt {
        Receipt {
            id: Uuid::new_v4(),
            number,
            client_id: Arc::from("client-7"),
            date,
            items: vec![LineItem {
                description: Arc::from("March fee"),
                period: Some(BillingPeriod { year: 2024, month: 3 }),
                amount: dec!(50.00),
            }],
            payments: vec![Payment {
                method: Arc::from("check"),
                amount: dec!(50.00),
                check_numbers: vec![Arc::from("000123")],
            }],
            created_by: Actor::new("1", "Ana"),
            created_at: OffsetDateTime::UNIX_EPOCH,
        }
    }

    #[test]
    fn test_sqlite_register_and_movements() {
        let storage = SqliteStorage::new(":memory:").unwrap();
        let day = date!(2024 - 03 - 01);

        let mut tx = storage.begin().unwrap();
        tx.insert_register(&register(day)).unwrap();
        let movement = NewMovement {
            date: day,
            kind: MovementKind::Income,
            amount: dec!(50.00),
            description: Arc::from("Receipt 1"),
            payment_method: Some(Arc::from("cash")),
            source: MovementSource::Manual,
        };
        let stored = tx.insert_movement(&movement, dec!(150.00), OffsetDateTime::UNIX_EPOCH).unwrap();
        tx.commit().unwrap();

        let mut tx = storage.begin().unwrap();
        let loaded = tx.register_for_update(day).unwrap().unwrap();
        assert_eq!(loaded, register(day));
        assert_eq!(tx.movements_for_date(day).unwrap(), vec![stored]);
        assert_eq!(tx.last_running_balance(day).unwrap(), Some(dec!(150.00)));
    }

    #[test]
    fn test_sqlite_read_transaction() {
        let storage = SqliteStorage::new(":memory:").unwrap();
        let day = date!(2024 - 03 - 01);

        let mut tx = storage.begin().unwrap();
        tx.insert_register(&register(day)).unwrap();
        tx.commit().unwrap();

        {
            let mut tx = storage.begin_read().unwrap();
            assert_eq!(tx.register(day).unwrap(), Some(register(day)));
            assert!(tx.register(date!(2024 - 03 - 02)).unwrap().is_none());
        }

        // The dropped read transaction left no lock behind.
        let mut tx = storage.begin().unwrap();
        assert_eq!(tx.next_receipt_number().unwrap(), 1);
        tx.commit().unwrap();
    }

    #[test]
    fn test_sqlite_movement_requires_register() {
        let storage = SqliteStorage::new(":memory:").unwrap();
        let mut tx = storage.begin().unwrap();
        let movement = NewMovement {
            date: date!(2024 - 03 - 01),
            kind: MovementKind::Expense,
            amount: dec!(5),
            description: Arc::from("orphan"),
            payment_method: None,
            source: MovementSource::Manual,
        };
        assert!(matches!(
            tx.insert_movement(&movement, dec!(-5), OffsetDateTime::UNIX_EPOCH),
            Err(StorageError::EntityNotFound(_))
        ));
    }

    #[test]
    fn test_sqlite_transaction_rollback() {
        let storage = SqliteStorage::new(":memory:").unwrap();
        let day = date!(2024 - 03 - 01);

        {
            let mut tx = storage.begin().unwrap();
            tx.insert_register(&register(day)).unwrap();
            assert_eq!(tx.next_receipt_number().unwrap(), 1);
        }

        let mut tx = storage.begin().unwrap();
        assert!(tx.register_for_update(day).unwrap().is_none());
        assert_eq!(tx.current_receipt_number().unwrap(), 0, "Counter should be 0 after rollback");
    }

    #[test]
    fn test_sqlite_receipt_round_trip_and_cascade() {
        let storage = SqliteStorage::new(":memory:").unwrap();
        let day = date!(2024 - 03 - 01);

        let mut tx = storage.begin().unwrap();
        tx.insert_register(&register(day)).unwrap();
        let number = tx.next_receipt_number().unwrap();
        let r = receipt(number, day);
        tx.insert_receipt(&r).unwrap();
        assert_eq!(tx.receipt(r.id).unwrap(), Some(r.clone()));
        assert_eq!(tx.latest_receipt().unwrap().map(|l| l.number), Some(1));

        assert!(matches!(
            tx.insert_receipt(&receipt(number, day)),
            Err(StorageError::EntityAlreadyExists(_))
        ));

        assert!(tx.delete_receipt(r.id).unwrap());
        assert_eq!(tx.receipt(r.id).unwrap(), None);
        tx.commit().unwrap();

        let conn = storage.lock().unwrap();
        let items: i64 = conn
            .query_row("SELECT COUNT(*) FROM receipt_items", [], |row| row.get(0))
            .unwrap();
        assert_eq!(items, 0, "Line items should cascade with the receipt");
    }

    #[test]
    fn test_sqlite_counter_compare_and_swap() {
        let storage = SqliteStorage::new(":memory:").unwrap();
        let mut tx = storage.begin().unwrap();
        assert!(!tx.decrement_receipt_number(0).unwrap());
        tx.next_receipt_number().unwrap();
        tx.next_receipt_number().unwrap();
        assert!(!tx.decrement_receipt_number(1).unwrap());
        assert!(tx.decrement_receipt_number(2).unwrap());
        assert_eq!(tx.current_receipt_number().unwrap(), 1);
    }
}
