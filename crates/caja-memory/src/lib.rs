//! In-memory storage backend for Caja.
//!
//! Every unit of work takes the single state lock and keeps a snapshot of the state
//! it started from; dropping the transaction without committing restores the snapshot.

use std::{
    collections::{BTreeMap, HashMap},
    sync::{
        atomic::{AtomicU64, Ordering},
        Mutex, MutexGuard,
    },
};

use rust_decimal::Decimal;
use time::{Date, OffsetDateTime};
use uuid::Uuid;

use caja_core::{
    Expense, LedgerStore, LedgerTx, Movement, MovementSource, NewMovement, Receipt, Register,
    StorageError,
};

#[derive(Clone, Default)]
struct LedgerState {
    registers: BTreeMap<Date, Register>,
    movements: BTreeMap<u64, Movement>,
    receipts: BTreeMap<u64, Receipt>,
    receipt_numbers: HashMap<Uuid, u64>,
    expenses: HashMap<Uuid, Expense>,
    receipt_counter: u64,
    movement_counter: u64,
}

pub struct InMemoryStorage {
    state: Mutex<LedgerState>,
    tx_counter: AtomicU64,
}

impl Default for InMemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(LedgerState::default()),
            tx_counter: AtomicU64::new(1),
        }
    }
}

impl LedgerStore for InMemoryStorage {
    fn begin(&self) -> Result<Box<dyn LedgerTx + '_>, StorageError> {
        let guard = self
            .state
            .lock()
            .map_err(|_| StorageError::Other("ledger state lock poisoned".to_string()))?;
        let tx_id = self.tx_counter.fetch_add(1, Ordering::SeqCst);
        let snapshot = guard.clone();
        tracing::debug!(tx_id, "Transaction started");
        Ok(Box::new(MemoryTx {
            tx_id,
            state: guard,
            snapshot: Some(snapshot),
        }))
    }
}

struct MemoryTx<'a> {
    tx_id: u64,
    state: MutexGuard<'a, LedgerState>,
    snapshot: Option<LedgerState>,
}

impl Drop for MemoryTx<'_> {
    fn drop(&mut self) {
        if let Some(snapshot) = self.snapshot.take() {
            *self.state = snapshot;
            tracing::debug!(tx_id = self.tx_id, "Transaction rolled back");
        }
    }
}

impl LedgerTx for MemoryTx<'_> {
    fn register(&mut self, date: Date) -> Result<Option<Register>, StorageError> {
        Ok(self.state.registers.get(&date).cloned())
    }

    fn register_for_update(&mut self, date: Date) -> Result<Option<Register>, StorageError> {
        Ok(self.state.registers.get(&date).cloned())
    }

    fn insert_register(&mut self, register: &Register) -> Result<(), StorageError> {
        if self.state.registers.contains_key(&register.date) {
            return Err(StorageError::EntityAlreadyExists(register.date.to_string()));
        }
        self.state.registers.insert(register.date, register.clone());
        Ok(())
    }

    fn update_register(&mut self, register: &Register) -> Result<(), StorageError> {
        let stored = self
            .state
            .registers
            .get_mut(&register.date)
            .ok_or_else(|| StorageError::EntityNotFound(register.date.to_string()))?;
        *stored = register.clone();
        Ok(())
    }

    fn open_registers_before(&mut self, date: Date) -> Result<Vec<Date>, StorageError> {
        Ok(self
            .state
            .registers
            .range(..date)
            .filter(|(_, r)| r.is_open())
            .map(|(d, _)| *d)
            .collect())
    }

    fn movements_for_date(&mut self, date: Date) -> Result<Vec<Movement>, StorageError> {
        Ok(self
            .state
            .movements
            .values()
            .filter(|m| m.date == date)
            .cloned()
            .collect())
    }

    fn last_running_balance(&mut self, date: Date) -> Result<Option<Decimal>, StorageError> {
        Ok(self
            .state
            .movements
            .values()
            .rev()
            .find(|m| m.date == date)
            .map(|m| m.running_balance))
    }

    fn insert_movement(&mut self, movement: &NewMovement, running_balance: Decimal, created_at: OffsetDateTime) -> Result<Movement, StorageError> {
        if !self.state.registers.contains_key(&movement.date) {
            return Err(StorageError::EntityNotFound(movement.date.to_string()));
        }
        self.state.movement_counter += 1;
        let stored = Movement {
            id: self.state.movement_counter,
            date: movement.date,
            kind: movement.kind,
            amount: movement.amount,
            running_balance,
            description: movement.description.clone(),
            payment_method: movement.payment_method.clone(),
            source: movement.source.clone(),
            created_at,
        };
        self.state.movements.insert(stored.id, stored.clone());
        Ok(stored)
    }

    fn delete_movements_for_receipt(&mut self, receipt_id: Uuid) -> Result<usize, StorageError> {
        let before = self.state.movements.len();
        self.state.movements.retain(|_, m| {
            !matches!(m.source, MovementSource::Receipt { receipt_id: id, .. } if id == receipt_id)
        });
        Ok(before - self.state.movements.len())
    }

    fn delete_movements_for_expense(&mut self, expense_id: Uuid) -> Result<usize, StorageError> {
        let before = self.state.movements.len();
        self.state.movements.retain(|_, m| {
            !matches!(m.source, MovementSource::Expense { expense_id: id } if id == expense_id)
        });
        Ok(before - self.state.movements.len())
    }

    fn next_receipt_number(&mut self) -> Result<u64, StorageError> {
        self.state.receipt_counter += 1;
        Ok(self.state.receipt_counter)
    }

    fn current_receipt_number(&mut self) -> Result<u64, StorageError> {
        Ok(self.state.receipt_counter)
    }

    fn decrement_receipt_number(&mut self, expected: u64) -> Result<bool, StorageError> {
        if expected == 0 || self.state.receipt_counter != expected {
            return Ok(false);
        }
        self.state.receipt_counter -= 1;
        Ok(true)
    }

    fn insert_receipt(&mut self, receipt: &Receipt) -> Result<(), StorageError> {
        if self.state.receipts.contains_key(&receipt.number) {
            return Err(StorageError::EntityAlreadyExists(format!("receipt number {}", receipt.number)));
        }
        if self.state.receipt_numbers.contains_key(&receipt.id) {
            return Err(StorageError::EntityAlreadyExists(receipt.id.to_string()));
        }
        self.state.receipt_numbers.insert(receipt.id, receipt.number);
        self.state.receipts.insert(receipt.number, receipt.clone());
        Ok(())
    }

    fn receipt(&mut self, id: Uuid) -> Result<Option<Receipt>, StorageError> {
        Ok(self
            .state
            .receipt_numbers
            .get(&id)
            .and_then(|n| self.state.receipts.get(n))
            .cloned())
    }

    fn latest_receipt(&mut self) -> Result<Option<Receipt>, StorageError> {
        Ok(self.state.receipts.values().next_back().cloned())
    }

    fn count_receipts_from(&mut self, number: u64) -> Result<u64, StorageError> {
        Ok(self.state.receipts.range(number..).count() as u64)
    }

    fn delete_receipt(&mut self, id: Uuid) -> Result<bool, StorageError> {
        match self.state.receipt_numbers.remove(&id) {
            Some(number) => Ok(self.state.receipts.remove(&number).is_some()),
            None => Ok(false),
        }
    }

    fn insert_expense(&mut self, expense: &Expense) -> Result<(), StorageError> {
        if self.state.expenses.contains_key(&expense.id) {
            return Err(StorageError::EntityAlreadyExists(expense.id.to_string()));
        }
        self.state.expenses.insert(expense.id, expense.clone());
        Ok(())
    }

    fn expense(&mut self, id: Uuid) -> Result<Option<Expense>, StorageError> {
        Ok(self.state.expenses.get(&id).cloned())
    }

    fn update_expense(&mut self, expense: &Expense) -> Result<(), StorageError> {
        let stored = self
            .state
            .expenses
            .get_mut(&expense.id)
            .ok_or_else(|| StorageError::EntityNotFound(expense.id.to_string()))?;
        *stored = expense.clone();
        Ok(())
    }

    fn delete_expense(&mut self, id: Uuid) -> Result<bool, StorageError> {
        Ok(self.state.expenses.remove(&id).is_some())
    }

    fn commit(mut self: Box<Self>) -> Result<(), StorageError> {
        self.snapshot.take().ok_or(StorageError::NoActiveTransaction)?;
        tracing::debug!(tx_id = self.tx_id, "Transaction committed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use caja_core::{Actor, MovementKind};
    use rust_decimal_macros::dec;
    use time::macros::date;

    fn register(date: Date) -> Register {
        Register::open(date, dec!(100.00), Actor::new("1", "Ana"), OffsetDateTime::UNIX_EPOCH)
    }

    fn cash_in(date: Date, amount: Decimal) -> NewMovement {
        NewMovement {
            date,
            kind: MovementKind::Income,
            amount,
            description: Arc::from("cash in"),
            payment_method: Some(Arc::from("cash")),
            source: MovementSource::Manual,
        }
    }

    #[test]
    fn test_memory_commit_persists() {
        let storage = InMemoryStorage::new();
        let day = date!(2024 - 03 - 01);

        let mut tx = storage.begin().unwrap();
        tx.insert_register(&register(day)).unwrap();
        tx.insert_movement(&cash_in(day, dec!(50)), dec!(150), OffsetDateTime::UNIX_EPOCH).unwrap();
        assert_eq!(tx.next_receipt_number().unwrap(), 1);
        tx.commit().unwrap();

        let mut tx = storage.begin().unwrap();
        assert!(tx.register_for_update(day).unwrap().is_some());
        assert_eq!(tx.last_running_balance(day).unwrap(), Some(dec!(150)));
        assert_eq!(tx.current_receipt_number().unwrap(), 1);
    }

    #[test]
    fn test_memory_read_transaction() {
        let storage = InMemoryStorage::new();
        let day = date!(2024 - 03 - 01);

        let mut tx = storage.begin().unwrap();
        tx.insert_register(&register(day)).unwrap();
        tx.commit().unwrap();

        let mut tx = storage.begin_read().unwrap();
        assert_eq!(tx.register(day).unwrap(), Some(register(day)));
    }

    #[test]
    fn test_memory_drop_rolls_back() {
        let storage = InMemoryStorage::new();
        let day = date!(2024 - 03 - 01);

        {
            let mut tx = storage.begin().unwrap();
            tx.insert_register(&register(day)).unwrap();
            tx.next_receipt_number().unwrap();
        }

        let mut tx = storage.begin().unwrap();
        assert!(tx.register_for_update(day).unwrap().is_none());
        assert_eq!(tx.current_receipt_number().unwrap(), 0);
    }

    #[test]
    fn test_memory_duplicate_register_rejected() {
        let storage = InMemoryStorage::new();
        let day = date!(2024 - 03 - 01);
        let mut tx = storage.begin().unwrap();
        tx.insert_register(&register(day)).unwrap();
        assert!(matches!(
            tx.insert_register(&register(day)),
            Err(StorageError::EntityAlreadyExists(_))
        ));
    }

    #[test]
    fn test_memory_counter_compare_and_swap() {
        let storage = InMemoryStorage::new();
        let mut tx = storage.begin().unwrap();
        tx.next_receipt_number().unwrap();
        tx.next_receipt_number().unwrap();
        assert!(!tx.decrement_receipt_number(1).unwrap());
        assert!(tx.decrement_receipt_number(2).unwrap());
        assert_eq!(tx.current_receipt_number().unwrap(), 1);
    }

    #[test]
    fn test_memory_open_registers_before() {
        let storage = InMemoryStorage::new();
        let mut tx = storage.begin().unwrap();
        tx.insert_register(&register(date!(2024 - 02 - 28))).unwrap();
        let mut closed = register(date!(2024 - 02 - 29));
        closed.closed = true;
        tx.insert_register(&closed).unwrap();
        tx.insert_register(&register(date!(2024 - 03 - 01))).unwrap();

        assert_eq!(
            tx.open_registers_before(date!(2024 - 03 - 01)).unwrap(),
            vec![date!(2024 - 02 - 28)]
        );
    }
}
