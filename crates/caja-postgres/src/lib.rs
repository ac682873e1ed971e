//! PostgreSQL storage backend for Caja.
//!
//! Register rows are locked with `SELECT ... FOR UPDATE` and the receipt counter is
//! advanced with a single `UPDATE ... RETURNING`, so a unit of work never reads a
//! value it later writes back.

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc, Mutex, MutexGuard,
};

use postgres::{error::SqlState, Client, NoTls, Row};
use rust_decimal::Decimal;
use time::{Date, OffsetDateTime};
use uuid::Uuid;

use caja_core::{
    text::{date_to_str, str_to_date, str_to_decimal, str_to_timestamp, timestamp_to_str},
    Actor, BillingPeriod, Expense, LedgerStore, LedgerTx, LineItem, Movement, MovementSource,
    NewMovement, Payment, Receipt, Register, StorageError,
};

pub struct PostgresStorage {
    client: Mutex<Client>,
    tx_counter: AtomicU64,
}

impl PostgresStorage {
    pub fn new(connection_string: &str) -> Result<Self, StorageError> {
        let client = Client::connect(connection_string, NoTls)
            .map_err(|e| StorageError::Other(format!("PostgreSQL connection failed: {}", e)))?;

        let storage = Self {
            client: Mutex::new(client),
            tx_counter: AtomicU64::new(1),
        };
        storage.init_schema()?;
        Ok(storage)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Client>, StorageError> {
        self.client
            .lock()
            .map_err(|_| StorageError::Other("postgres client lock poisoned".to_string()))
    }

    fn init_schema(&self) -> Result<(), StorageError> {
        let mut client = self.lock()?;
        client
            .batch_execute(
                "
            CREATE TABLE IF NOT EXISTS registers (
                date TEXT PRIMARY KEY,
                opening_balance TEXT NOT NULL,
                closing_balance TEXT,
                closed BOOLEAN NOT NULL DEFAULT FALSE,
                opened_by_id TEXT NOT NULL,
                opened_by_name TEXT NOT NULL,
                opened_at TEXT NOT NULL,
                closed_by_id TEXT,
                closed_by_name TEXT,
                closed_at TEXT,
                balance_overridden BOOLEAN NOT NULL DEFAULT FALSE
            );

            CREATE TABLE IF NOT EXISTS receipts (
                id TEXT PRIMARY KEY,
                number BIGINT NOT NULL UNIQUE,
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
                id BIGSERIAL PRIMARY KEY,
                date TEXT NOT NULL REFERENCES registers(date),
                kind TEXT NOT NULL,
                amount TEXT NOT NULL,
                running_balance TEXT NOT NULL,
                description TEXT NOT NULL,
                payment_method TEXT,
                receipt_id TEXT,
                receipt_number BIGINT,
                expense_id TEXT,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_pg_movements_date
                ON movements(date, id);

            CREATE INDEX IF NOT EXISTS idx_pg_movements_receipt
                ON movements(receipt_id);

            CREATE INDEX IF NOT EXISTS idx_pg_movements_expense
                ON movements(expense_id);

            CREATE TABLE IF NOT EXISTS sequence_counter (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                value BIGINT NOT NULL
            );

            INSERT INTO sequence_counter (id, value) VALUES (1, 0)
                ON CONFLICT (id) DO NOTHING;
            ",
            )
            .map_err(pg_err)?;
        Ok(())
    }
}

fn pg_err(e: postgres::Error) -> StorageError {
    match e.code() {
        Some(code) if *code == SqlState::T_R_DEADLOCK_DETECTED || *code == SqlState::T_R_SERIALIZATION_FAILURE => {
            StorageError::Transient(e.to_string())
        }
        Some(code) if *code == SqlState::UNIQUE_VIOLATION => StorageError::EntityAlreadyExists(e.to_string()),
        Some(code) if *code == SqlState::FOREIGN_KEY_VIOLATION => StorageError::EntityNotFound(e.to_string()),
        _ => StorageError::Other(e.to_string()),
    }
}

fn parse_uuid(s: &str) -> Result<Uuid, StorageError> {
    Uuid::parse_str(s).map_err(|e| StorageError::Other(format!("invalid id {}: {}", s, e)))
}

fn to_u64(v: i64) -> Result<u64, StorageError> {
    u64::try_from(v).map_err(|_| StorageError::Other(format!("negative counter value: {}", v)))
}

fn to_i64(v: u64) -> Result<i64, StorageError> {
    i64::try_from(v).map_err(|_| StorageError::Other(format!("counter value out of range: {}", v)))
}

const REGISTER_COLUMNS: &str = "date, opening_balance, closing_balance, closed, opened_by_id, opened_by_name,
     opened_at, closed_by_id, closed_by_name, closed_at, balance_overridden";

fn row_to_register(row: &Row) -> Result<Register, StorageError> {
    let closing: Option<String> = row.get(2);
    let closed_by_id: Option<String> = row.get(7);
    let closed_by_name: Option<String> = row.get(8);
    let closed_at: Option<String> = row.get(9);
    Ok(Register {
        date: str_to_date(row.get(0))?,
        opening_balance: str_to_decimal(row.get(1))?,
        closing_balance: closing.as_deref().map(str_to_decimal).transpose()?,
        closed: row.get(3),
        opened_by: Actor::new(row.get::<_, String>(4), row.get::<_, String>(5)),
        opened_at: str_to_timestamp(row.get(6))?,
        closed_by: match (closed_by_id, closed_by_name) {
            (Some(id), Some(name)) => Some(Actor::new(id, name)),
            _ => None,
        },
        closed_at: closed_at.as_deref().map(str_to_timestamp).transpose()?,
        balance_overridden: row.get(10),
    })
}

const MOVEMENT_COLUMNS: &str = "id, date, kind, amount, running_balance, description, payment_method,
     receipt_id, receipt_number, expense_id, created_at";

fn row_to_movement(row: &Row) -> Result<Movement, StorageError> {
    let receipt_id: Option<String> = row.get(7);
    let receipt_number: Option<i64> = row.get(8);
    let expense_id: Option<String> = row.get(9);
    let source = match (receipt_id, receipt_number, expense_id) {
        (Some(id), Some(number), _) => MovementSource::Receipt {
            receipt_id: parse_uuid(&id)?,
            number: to_u64(number)?,
        },
        (_, _, Some(id)) => MovementSource::Expense { expense_id: parse_uuid(&id)? },
        _ => MovementSource::Manual,
    };
    let kind: String = row.get(2);
    let method: Option<String> = row.get(6);
    Ok(Movement {
        id: to_u64(row.get(0))?,
        date: str_to_date(row.get(1))?,
        kind: kind.parse().map_err(StorageError::Other)?,
        amount: str_to_decimal(row.get(3))?,
        running_balance: str_to_decimal(row.get(4))?,
        description: Arc::from(row.get::<_, &str>(5)),
        payment_method: method.map(|m| Arc::from(m.as_str())),
        source,
        created_at: str_to_timestamp(row.get(10))?,
    })
}

impl LedgerStore for PostgresStorage {
    fn begin(&self) -> Result<Box<dyn LedgerTx + '_>, StorageError> {
        self.start("BEGIN ISOLATION LEVEL READ COMMITTED")
    }

    fn begin_read(&self) -> Result<Box<dyn LedgerTx + '_>, StorageError> {
        self.start("BEGIN ISOLATION LEVEL READ COMMITTED READ ONLY")
    }
}

impl PostgresStorage {
    fn start(&self, statement: &str) -> Result<Box<dyn LedgerTx + '_>, StorageError> {
        let mut client = self.lock()?;
        client.batch_execute(statement).map_err(pg_err)?;
        let tx_id = self.tx_counter.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(tx_id, statement, "PostgreSQL transaction started");
        Ok(Box::new(PgTx {
            tx_id,
            client,
            finished: false,
        }))
    }
}

struct PgTx<'a> {
    tx_id: u64,
    client: MutexGuard<'a, Client>,
    finished: bool,
}

impl Drop for PgTx<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        match self.client.batch_execute("ROLLBACK") {
            Ok(()) => tracing::debug!(tx_id = self.tx_id, "PostgreSQL transaction rolled back"),
            Err(e) => tracing::error!(tx_id = self.tx_id, error = %e, "PostgreSQL rollback failed"),
        }
    }
}

impl PgTx<'_> {
    fn load_receipt(&mut self, id: &str) -> Result<Option<Receipt>, StorageError> {
        let Some(header) = self
            .client
            .query_opt(
                "SELECT id, number, client_id, date, created_by_id, created_by_name, created_at
                 FROM receipts WHERE id = $1",
                &[&id],
            )
            .map_err(pg_err)?
        else {
            return Ok(None);
        };

        let mut items = Vec::new();
        for row in self
            .client
            .query(
                "SELECT description, period_year, period_month, amount
                 FROM receipt_items WHERE receipt_id = $1 ORDER BY position",
                &[&id],
            )
            .map_err(pg_err)?
        {
            let year: Option<i32> = row.get(1);
            let month: Option<i32> = row.get(2);
            items.push(LineItem {
                description: Arc::from(row.get::<_, &str>(0)),
                period: match (year, month) {
                    (Some(year), Some(month)) => Some(BillingPeriod {
                        year,
                        month: u8::try_from(month)
                            .map_err(|_| StorageError::Other(format!("invalid month: {}", month)))?,
                    }),
                    _ => None,
                },
                amount: str_to_decimal(row.get(3))?,
            });
        }

        let mut payments = Vec::new();
        for row in self
            .client
            .query(
                "SELECT method, amount, check_numbers
                 FROM receipt_payments WHERE receipt_id = $1 ORDER BY position",
                &[&id],
            )
            .map_err(pg_err)?
        {
            let check_numbers: Vec<String> = serde_json::from_str(row.get(2))
                .map_err(|e| StorageError::Other(format!("invalid check numbers: {}", e)))?;
            payments.push(Payment {
                method: Arc::from(row.get::<_, &str>(0)),
                amount: str_to_decimal(row.get(1))?,
                check_numbers: check_numbers.iter().map(|c| Arc::from(c.as_str())).collect(),
            });
        }

        Ok(Some(Receipt {
            id: parse_uuid(header.get(0))?,
            number: to_u64(header.get(1))?,
            client_id: Arc::from(header.get::<_, &str>(2)),
            date: str_to_date(header.get(3))?,
            items,
            payments,
            created_by: Actor::new(header.get::<_, String>(4), header.get::<_, String>(5)),
            created_at: str_to_timestamp(header.get(6))?,
        }))
    }
}

impl LedgerTx for PgTx<'_> {
    fn register(&mut self, date: Date) -> Result<Option<Register>, StorageError> {
        let row = self
            .client
            .query_opt(
                &format!("SELECT {} FROM registers WHERE date = $1", REGISTER_COLUMNS),
                &[&date_to_str(date)],
            )
            .map_err(pg_err)?;
        row.as_ref().map(row_to_register).transpose()
    }

    fn register_for_update(&mut self, date: Date) -> Result<Option<Register>, StorageError> {
        let row = self
            .client
            .query_opt(
                &format!("SELECT {} FROM registers WHERE date = $1 FOR UPDATE", REGISTER_COLUMNS),
                &[&date_to_str(date)],
            )
            .map_err(pg_err)?;
        row.as_ref().map(row_to_register).transpose()
    }

    fn insert_register(&mut self, register: &Register) -> Result<(), StorageError> {
        let closing = register.closing_balance.map(|b| b.to_string());
        let closed_by_id = register.closed_by.as_ref().map(|a| a.id.to_string());
        let closed_by_name = register.closed_by.as_ref().map(|a| a.name.to_string());
        let closed_at = register.closed_at.map(timestamp_to_str).transpose()?;
        self.client
            .execute(
                &format!(
                    "INSERT INTO registers ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
                    REGISTER_COLUMNS
                ),
                &[
                    &date_to_str(register.date),
                    &register.opening_balance.to_string(),
                    &closing,
                    &register.closed,
                    &register.opened_by.id.as_ref(),
                    &register.opened_by.name.as_ref(),
                    &timestamp_to_str(register.opened_at)?,
                    &closed_by_id,
                    &closed_by_name,
                    &closed_at,
                    &register.balance_overridden,
                ],
            )
            .map_err(pg_err)?;
        Ok(())
    }

    fn update_register(&mut self, register: &Register) -> Result<(), StorageError> {
        let closing = register.closing_balance.map(|b| b.to_string());
        let closed_by_id = register.closed_by.as_ref().map(|a| a.id.to_string());
        let closed_by_name = register.closed_by.as_ref().map(|a| a.name.to_string());
        let closed_at = register.closed_at.map(timestamp_to_str).transpose()?;
        let changed = self
            .client
            .execute(
                "UPDATE registers SET closing_balance = $2, closed = $3, closed_by_id = $4,
                     closed_by_name = $5, closed_at = $6, balance_overridden = $7
                 WHERE date = $1",
                &[
                    &date_to_str(register.date),
                    &closing,
                    &register.closed,
                    &closed_by_id,
                    &closed_by_name,
                    &closed_at,
                    &register.balance_overridden,
                ],
            )
            .map_err(pg_err)?;
        if changed == 0 {
            return Err(StorageError::EntityNotFound(register.date.to_string()));
        }
        Ok(())
    }

    fn open_registers_before(&mut self, date: Date) -> Result<Vec<Date>, StorageError> {
        self.client
            .query(
                "SELECT date FROM registers WHERE NOT closed AND date < $1 ORDER BY date",
                &[&date_to_str(date)],
            )
            .map_err(pg_err)?
            .iter()
            .map(|row| str_to_date(row.get(0)))
            .collect()
    }

    fn movements_for_date(&mut self, date: Date) -> Result<Vec<Movement>, StorageError> {
        self.client
            .query(
                &format!("SELECT {} FROM movements WHERE date = $1 ORDER BY id", MOVEMENT_COLUMNS),
                &[&date_to_str(date)],
            )
            .map_err(pg_err)?
            .iter()
            .map(row_to_movement)
            .collect()
    }

    fn last_running_balance(&mut self, date: Date) -> Result<Option<Decimal>, StorageError> {
        let row = self
            .client
            .query_opt(
                "SELECT running_balance FROM movements WHERE date = $1 ORDER BY id DESC LIMIT 1",
                &[&date_to_str(date)],
            )
            .map_err(pg_err)?;
        row.map(|r| str_to_decimal(r.get(0))).transpose()
    }

    fn insert_movement(&mut self, movement: &NewMovement, running_balance: Decimal, created_at: OffsetDateTime) -> Result<Movement, StorageError> {
        let (receipt_id, receipt_number, expense_id) = match &movement.source {
            MovementSource::Manual => (None, None, None),
            MovementSource::Receipt { receipt_id, number } => {
                (Some(receipt_id.to_string()), Some(to_i64(*number)?), None)
            }
            MovementSource::Expense { expense_id } => (None, None, Some(expense_id.to_string())),
        };
        let method = movement.payment_method.as_deref();
        let row = self
            .client
            .query_one(
                "INSERT INTO movements (date, kind, amount, running_balance, description, payment_method,
                     receipt_id, receipt_number, expense_id, created_at)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) RETURNING id",
                &[
                    &date_to_str(movement.date),
                    &movement.kind.as_str(),
                    &movement.amount.to_string(),
                    &running_balance.to_string(),
                    &movement.description.as_ref(),
                    &method,
                    &receipt_id,
                    &receipt_number,
                    &expense_id,
                    &timestamp_to_str(created_at)?,
                ],
            )
            .map_err(pg_err)?;

        Ok(Movement {
            id: to_u64(row.get(0))?,
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
        let n = self
            .client
            .execute("DELETE FROM movements WHERE receipt_id = $1", &[&receipt_id.to_string()])
            .map_err(pg_err)?;
        Ok(n as usize)
    }

    fn delete_movements_for_expense(&mut self, expense_id: Uuid) -> Result<usize, StorageError> {
        let n = self
            .client
            .execute("DELETE FROM movements WHERE expense_id = $1", &[&expense_id.to_string()])
            .map_err(pg_err)?;
        Ok(n as usize)
    }

    fn next_receipt_number(&mut self) -> Result<u64, StorageError> {
        let row = self
            .client
            .query_one(
                "UPDATE sequence_counter SET value = value + 1 WHERE id = 1 RETURNING value",
                &[],
            )
            .map_err(pg_err)?;
        to_u64(row.get(0))
    }

    fn current_receipt_number(&mut self) -> Result<u64, StorageError> {
        let row = self
            .client
            .query_one("SELECT value FROM sequence_counter WHERE id = 1 FOR UPDATE", &[])
            .map_err(pg_err)?;
        to_u64(row.get(0))
    }

    fn decrement_receipt_number(&mut self, expected: u64) -> Result<bool, StorageError> {
        let changed = self
            .client
            .execute(
                "UPDATE sequence_counter SET value = value - 1 WHERE id = 1 AND value = $1 AND value > 0",
                &[&to_i64(expected)?],
            )
            .map_err(pg_err)?;
        Ok(changed == 1)
    }

    fn insert_receipt(&mut self, receipt: &Receipt) -> Result<(), StorageError> {
        let id = receipt.id.to_string();
        self.client
            .execute(
                "INSERT INTO receipts (id, number, client_id, date, created_by_id, created_by_name, created_at)
                 VALUES ($1, $2, $3, $4, $5, $6, $7)",
                &[
                    &id,
                    &to_i64(receipt.number)?,
                    &receipt.client_id.as_ref(),
                    &date_to_str(receipt.date),
                    &receipt.created_by.id.as_ref(),
                    &receipt.created_by.name.as_ref(),
                    &timestamp_to_str(receipt.created_at)?,
                ],
            )
            .map_err(pg_err)?;

        for (position, item) in receipt.items.iter().enumerate() {
            let year = item.period.map(|p| p.year);
            let month = item.period.map(|p| i32::from(p.month));
            self.client
                .execute(
                    "INSERT INTO receipt_items (receipt_id, position, description, period_year, period_month, amount)
                     VALUES ($1, $2, $3, $4, $5, $6)",
                    &[
                        &id,
                        &(position as i32),
                        &item.description.as_ref(),
                        &year,
                        &month,
                        &item.amount.to_string(),
                    ],
                )
                .map_err(pg_err)?;
        }

        for (position, payment) in receipt.payments.iter().enumerate() {
            let checks: Vec<&str> = payment.check_numbers.iter().map(|c| c.as_ref()).collect();
            let checks = serde_json::to_string(&checks)
                .map_err(|e| StorageError::Other(e.to_string()))?;
            self.client
                .execute(
                    "INSERT INTO receipt_payments (receipt_id, position, method, amount, check_numbers)
                     VALUES ($1, $2, $3, $4, $5)",
                    &[
                        &id,
                        &(position as i32),
                        &payment.method.as_ref(),
                        &payment.amount.to_string(),
                        &checks,
                    ],
                )
                .map_err(pg_err)?;
        }

        Ok(())
    }

    fn receipt(&mut self, id: Uuid) -> Result<Option<Receipt>, StorageError> {
        self.load_receipt(&id.to_string())
    }

    fn latest_receipt(&mut self) -> Result<Option<Receipt>, StorageError> {
        let row = self
            .client
            .query_opt("SELECT id FROM receipts ORDER BY number DESC LIMIT 1", &[])
            .map_err(pg_err)?;
        match row {
            Some(row) => {
                let id: String = row.get(0);
                self.load_receipt(&id)
            }
            None => Ok(None),
        }
    }

    fn count_receipts_from(&mut self, number: u64) -> Result<u64, StorageError> {
        let row = self
            .client
            .query_one("SELECT COUNT(*) FROM receipts WHERE number >= $1", &[&to_i64(number)?])
            .map_err(pg_err)?;
        to_u64(row.get(0))
    }

    fn delete_receipt(&mut self, id: Uuid) -> Result<bool, StorageError> {
        let changed = self
            .client
            .execute("DELETE FROM receipts WHERE id = $1", &[&id.to_string()])
            .map_err(pg_err)?;
        Ok(changed == 1)
    }

    fn insert_expense(&mut self, expense: &Expense) -> Result<(), StorageError> {
        let method = expense.payment_method.as_deref();
        self.client
            .execute(
                "INSERT INTO expenses (id, date, description, amount, payment_method, created_by_id, created_by_name, created_at)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
                &[
                    &expense.id.to_string(),
                    &date_to_str(expense.date),
                    &expense.description.as_ref(),
                    &expense.amount.to_string(),
                    &method,
                    &expense.created_by.id.as_ref(),
                    &expense.created_by.name.as_ref(),
                    &timestamp_to_str(expense.created_at)?,
                ],
            )
            .map_err(pg_err)?;
        Ok(())
    }

    fn expense(&mut self, id: Uuid) -> Result<Option<Expense>, StorageError> {
        let Some(row) = self
            .client
            .query_opt(
                "SELECT date, description, amount, payment_method, created_by_id, created_by_name, created_at
                 FROM expenses WHERE id = $1 FOR UPDATE",
                &[&id.to_string()],
            )
            .map_err(pg_err)?
        else {
            return Ok(None);
        };
        let method: Option<String> = row.get(3);
        Ok(Some(Expense {
            id,
            date: str_to_date(row.get(0))?,
            description: Arc::from(row.get::<_, &str>(1)),
            amount: str_to_decimal(row.get(2))?,
            payment_method: method.map(|m| Arc::from(m.as_str())),
            created_by: Actor::new(row.get::<_, String>(4), row.get::<_, String>(5)),
            created_at: str_to_timestamp(row.get(6))?,
        }))
    }

    fn update_expense(&mut self, expense: &Expense) -> Result<(), StorageError> {
        let method = expense.payment_method.as_deref();
        let changed = self
            .client
            .execute(
                "UPDATE expenses SET description = $2, amount = $3, payment_method = $4 WHERE id = $1",
                &[
                    &expense.id.to_string(),
                    &expense.description.as_ref(),
                    &expense.amount.to_string(),
                    &method,
                ],
            )
            .map_err(pg_err)?;
        if changed == 0 {
            return Err(StorageError::EntityNotFound(expense.id.to_string()));
        }
        Ok(())
    }

    fn delete_expense(&mut self, id: Uuid) -> Result<bool, StorageError> {
        let changed = self
            .client
            .execute("DELETE FROM expenses WHERE id = $1", &[&id.to_string()])
            .map_err(pg_err)?;
        Ok(changed == 1)
    }

    fn commit(mut self: Box<Self>) -> Result<(), StorageError> {
        self.client.batch_execute("COMMIT").map_err(pg_err)?;
        self.finished = true;
        tracing::debug!(tx_id = self.tx_id, "PostgreSQL transaction committed");
        Ok(())
    }
}
