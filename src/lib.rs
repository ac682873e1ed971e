//! Caja: a daily cash register ledger.
//!
//! Registers are opened and closed once per calendar day, every cash movement keeps a
//! running balance, and receipts are numbered from a single gap-free counter.

pub mod api;
pub mod audit;
pub mod auth;
pub mod config;
pub mod expenses;
pub mod ledger;
pub mod receipts;
pub mod sequence;
pub mod storage;

use std::sync::Arc;

pub use caja_core::{
    Actor, AuditFact, AuditSink, AutoCloseFailure, AutoCloseReport, BillingPeriod, Clock,
    ConflictError, CreateExpenseCommand, CreateReceiptCommand, Expense, FixedClock,
    InsertMovementCommand, LedgerError, LineItem, MethodTotals, Movement, MovementKind,
    MovementSource, Payment, Receipt, Register, RegisterState, RegisterSummary, SystemClock,
};

use crate::{
    expenses::ExpenseManager,
    ledger::{LedgerOptions, LedgerService},
    receipts::ReceiptManager,
    storage::LedgerStore,
};

/// The ledger services wired over one store.
pub struct Caja {
    pub ledger: Arc<LedgerService>,
    pub receipts: ReceiptManager,
    pub expenses: ExpenseManager,
}

impl Caja {
    pub fn new(store: Arc<dyn LedgerStore>, audit: Arc<dyn AuditSink>, clock: Arc<dyn Clock>, options: LedgerOptions) -> Self {
        let ledger = Arc::new(LedgerService::new(store, audit, clock, options));
        Self {
            receipts: ReceiptManager::new(ledger.clone()),
            expenses: ExpenseManager::new(ledger.clone()),
            ledger,
        }
    }
}
