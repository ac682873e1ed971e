use time::Date;

use thiserror::Error;

use crate::storage::StorageError;

/// Invalid state transitions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConflictError {
    #[error("register for {0} already exists")]
    AlreadyExists(Date),
    #[error("register for {0} is already closed")]
    AlreadyClosed(Date),
    #[error("register for {0} is not closed")]
    NotClosed(Date),
    #[error("no open register for {0}")]
    RegisterNotOpen(Date),
    #[error("register for {0} is historical and cannot be reopened")]
    ReopenNotAllowed(Date),
}

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error(transparent)]
    Conflict(#[from] ConflictError),
    #[error("sequence integrity violation: {0}")]
    SequenceIntegrity(String),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("there is no receipt to void")]
    NothingToVoid,
    #[error("storage error: {0}")]
    Persistence(#[from] StorageError),
}

impl LedgerError {
    /// A total or balance that no longer fits in a `Decimal`.
    pub fn out_of_range() -> Self {
        LedgerError::Validation("amount out of range".to_string())
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, LedgerError::Persistence(e) if e.is_transient())
    }
}
