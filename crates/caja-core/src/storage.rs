use rust_decimal::Decimal;
use time::{Date, OffsetDateTime};
use uuid::Uuid;

use crate::models::{write::NewMovement, Expense, Movement, Receipt, Register};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("{0}")]
    Other(String),
    /// Deadlocks, serialization failures, busy databases. Safe to retry once.
    #[error("transient storage failure: {0}")]
    Transient(String),
    #[error("no active transaction")]
    NoActiveTransaction,
    #[error("entity not found: {0}")]
    EntityNotFound(String),
    #[error("entity already exists: {0}")]
    EntityAlreadyExists(String),
}

impl StorageError {
    pub fn is_transient(&self) -> bool {
        matches!(self, StorageError::Transient(_))
    }
}

/// A storage backend able to run ledger units of work.
pub trait LedgerStore: Send + Sync {
    /// Starts a unit of work. Register rows and the receipt counter touched through the
    /// returned transaction cannot be changed by anyone else until it ends. Dropping the
    /// transaction without calling [`LedgerTx::commit`] rolls it back.
    fn begin(&self) -> Result<Box<dyn LedgerTx + '_>, StorageError>;

    /// Starts a unit of work that only reads. Backends may skip the write locks `begin` takes.
    fn begin_read(&self) -> Result<Box<dyn LedgerTx + '_>, StorageError> {
        self.begin()
    }
}

pub trait LedgerTx {
    // Registers
    fn register(&mut self, date: Date) -> Result<Option<Register>, StorageError>;
    fn register_for_update(&mut self, date: Date) -> Result<Option<Register>, StorageError>;
    fn insert_register(&mut self, register: &Register) -> Result<(), StorageError>;
    fn update_register(&mut self, register: &Register) -> Result<(), StorageError>;
    fn open_registers_before(&mut self, date: Date) -> Result<Vec<Date>, StorageError>;

    // Movements
    fn movements_for_date(&mut self, date: Date) -> Result<Vec<Movement>, StorageError>;
    fn last_running_balance(&mut self, date: Date) -> Result<Option<Decimal>, StorageError>;
    fn insert_movement(&mut self, movement: &NewMovement, running_balance: Decimal, created_at: OffsetDateTime) -> Result<Movement, StorageError>;
    fn delete_movements_for_receipt(&mut self, receipt_id: Uuid) -> Result<usize, StorageError>;
    fn delete_movements_for_expense(&mut self, expense_id: Uuid) -> Result<usize, StorageError>;

    // Receipt numbering. The counter holds the last number handed out.
    fn next_receipt_number(&mut self) -> Result<u64, StorageError>;
    fn current_receipt_number(&mut self) -> Result<u64, StorageError>;
    /// Moves the counter from `expected` to `expected - 1`. Returns false if it was not at `expected`.
    fn decrement_receipt_number(&mut self, expected: u64) -> Result<bool, StorageError>;

    // Receipts
    fn insert_receipt(&mut self, receipt: &Receipt) -> Result<(), StorageError>;
    fn receipt(&mut self, id: Uuid) -> Result<Option<Receipt>, StorageError>;
    fn latest_receipt(&mut self) -> Result<Option<Receipt>, StorageError>;
    fn count_receipts_from(&mut self, number: u64) -> Result<u64, StorageError>;
    fn delete_receipt(&mut self, id: Uuid) -> Result<bool, StorageError>;

    // Expenses
    fn insert_expense(&mut self, expense: &Expense) -> Result<(), StorageError>;
    fn expense(&mut self, id: Uuid) -> Result<Option<Expense>, StorageError>;
    fn update_expense(&mut self, expense: &Expense) -> Result<(), StorageError>;
    fn delete_expense(&mut self, id: Uuid) -> Result<bool, StorageError>;

    fn commit(self: Box<Self>) -> Result<(), StorageError>;
}
