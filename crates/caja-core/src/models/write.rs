use std::sync::Arc;

use rust_decimal::Decimal;
use serde::Deserialize;
use time::Date;

use super::{LineItem, MovementKind, MovementSource, Payment};

/// A movement about to be written. The running balance is computed inside the transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct NewMovement {
    pub date: Date,
    pub kind: MovementKind,
    pub amount: Decimal,
    pub description: Arc<str>,
    pub payment_method: Option<Arc<str>>,
    pub source: MovementSource,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct InsertMovementCommand {
    pub kind: MovementKind,
    pub amount: Decimal,
    pub description: Arc<str>,
    #[serde(default)]
    pub payment_method: Option<Arc<str>>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CreateReceiptCommand {
    pub client_id: Arc<str>,
    /// Defaults to today.
    #[serde(default)]
    pub date: Option<Date>,
    pub items: Vec<LineItem>,
    pub payments: Vec<Payment>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CreateExpenseCommand {
    #[serde(default)]
    pub date: Option<Date>,
    pub description: Arc<str>,
    pub amount: Decimal,
    #[serde(default)]
    pub payment_method: Option<Arc<str>>,
}
