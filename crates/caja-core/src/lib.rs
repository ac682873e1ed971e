//! Core types and traits for the Caja daily cash ledger.
//!
//! This crate provides the `LedgerStore` trait and all associated types,
//! enabling pluggable storage implementations in separate crates.

pub mod audit;
pub mod clock;
pub mod error;
pub mod models;
pub mod storage;
pub mod text;

// Re-export key types at crate root for convenience
pub use audit::{AuditFact, AuditSink};
pub use clock::{Clock, FixedClock, SystemClock};
pub use error::{ConflictError, LedgerError};
pub use models::{
    checked_sum, Actor, BillingPeriod, Expense, LineItem, Movement, MovementKind, MovementSource, Payment,
    Receipt, Register, RegisterState, BALANCE_TOLERANCE,
};
pub use models::read::{AutoCloseFailure, AutoCloseReport, MethodTotals, RegisterSummary};
pub use models::write::{
    CreateExpenseCommand, CreateReceiptCommand, InsertMovementCommand, NewMovement,
};
pub use storage::{LedgerStore, LedgerTx, StorageError};
