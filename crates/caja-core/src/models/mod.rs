use std::{fmt::Display, str::FromStr, sync::Arc};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use time::{Date, OffsetDateTime};
use uuid::Uuid;

pub mod read;
pub mod write;

/// Two balances closer than this are considered equal.
pub const BALANCE_TOLERANCE: Decimal = Decimal::from_parts(1, 0, 0, false, 2);

pub const SYSTEM_ACTOR_ID: &str = "system";

/// Adds up amounts, returning `None` instead of overflowing.
pub fn checked_sum<I: IntoIterator<Item = Decimal>>(amounts: I) -> Option<Decimal> {
    amounts
        .into_iter()
        .try_fold(Decimal::ZERO, |total, amount| total.checked_add(amount))
}

/// Whoever performed an operation. The ledger only records it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Actor {
    pub id: Arc<str>,
    pub name: Arc<str>,
}

impl Actor {
    pub fn new(id: impl Into<Arc<str>>, name: impl Into<Arc<str>>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }

    /// The distinguished actor used by maintenance sweeps.
    pub fn system(name: impl Into<Arc<str>>) -> Self {
        Self::new(SYSTEM_ACTOR_ID, name)
    }

    pub fn is_system(&self) -> bool {
        self.id.as_ref() == SYSTEM_ACTOR_ID
    }
}

impl Display for Actor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.name, self.id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegisterState {
    Open,
    Closed,
}

/// The cash drawer for one calendar day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Register {
    pub date: Date,
    pub opening_balance: Decimal,
    pub closing_balance: Option<Decimal>,
    pub closed: bool,
    pub opened_by: Actor,
    pub opened_at: OffsetDateTime,
    pub closed_by: Option<Actor>,
    pub closed_at: Option<OffsetDateTime>,
    /// Set when the closing balance was supplied by an administrator instead of computed.
    pub balance_overridden: bool,
}

impl Register {
    pub fn open(date: Date, opening_balance: Decimal, actor: Actor, at: OffsetDateTime) -> Self {
        Self {
            date,
            opening_balance,
            closing_balance: None,
            closed: false,
            opened_by: actor,
            opened_at: at,
            closed_by: None,
            closed_at: None,
            balance_overridden: false,
        }
    }

    pub fn state(&self) -> RegisterState {
        if self.closed {
            RegisterState::Closed
        } else {
            RegisterState::Open
        }
    }

    pub fn is_open(&self) -> bool {
        !self.closed
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MovementKind {
    Income,
    Expense,
}

impl MovementKind {
    /// Applies the movement's sign to a positive amount.
    pub fn signed(&self, amount: Decimal) -> Decimal {
        match self {
            MovementKind::Income => amount,
            MovementKind::Expense => -amount,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MovementKind::Income => "INCOME",
            MovementKind::Expense => "EXPENSE",
        }
    }
}

impl FromStr for MovementKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "INCOME" => Ok(MovementKind::Income),
            "EXPENSE" => Ok(MovementKind::Expense),
            other => Err(format!("unknown movement kind: {}", other)),
        }
    }
}

/// What a movement was recorded for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MovementSource {
    Manual,
    Receipt { receipt_id: Uuid, number: u64 },
    Expense { expense_id: Uuid },
}

/// A signed monetary fact recorded against a register. Never edited once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Movement {
    pub id: u64,
    pub date: Date,
    pub kind: MovementKind,
    pub amount: Decimal,
    /// Register balance right after this movement was inserted.
    pub running_balance: Decimal,
    pub description: Arc<str>,
    pub payment_method: Option<Arc<str>>,
    pub source: MovementSource,
    pub created_at: OffsetDateTime,
}

impl Movement {
    pub fn signed_amount(&self) -> Decimal {
        self.kind.signed(self.amount)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillingPeriod {
    pub year: i32,
    pub month: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub description: Arc<str>,
    #[serde(default)]
    pub period: Option<BillingPeriod>,
    pub amount: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub method: Arc<str>,
    pub amount: Decimal,
    #[serde(default)]
    pub check_numbers: Vec<Arc<str>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Receipt {
    pub id: Uuid,
    pub number: u64,
    pub client_id: Arc<str>,
    pub date: Date,
    pub items: Vec<LineItem>,
    pub payments: Vec<Payment>,
    pub created_by: Actor,
    pub created_at: OffsetDateTime,
}

impl Receipt {
    pub fn items_total(&self) -> Option<Decimal> {
        checked_sum(self.items.iter().map(|i| i.amount))
    }

    pub fn payments_total(&self) -> Option<Decimal> {
        checked_sum(self.payments.iter().map(|p| p.amount))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expense {
    pub id: Uuid,
    pub date: Date,
    pub description: Arc<str>,
    pub amount: Decimal,
    pub payment_method: Option<Arc<str>>,
    pub created_by: Actor,
    pub created_at: OffsetDateTime,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn tolerance_is_one_cent() {
        assert_eq!(BALANCE_TOLERANCE, dec!(0.01));
    }

    #[test]
    fn kind_sign_and_round_trip() {
        assert_eq!(MovementKind::Expense.signed(dec!(20.00)), dec!(-20.00));
        assert_eq!(MovementKind::Income.signed(dec!(20.00)), dec!(20.00));
        assert_eq!("EXPENSE".parse::<MovementKind>(), Ok(MovementKind::Expense));
        assert!("refund".parse::<MovementKind>().is_err());
    }

    #[test]
    fn checked_sum_stops_at_overflow() {
        assert_eq!(checked_sum([dec!(1.50), dec!(2.25)]), Some(dec!(3.75)));
        assert_eq!(checked_sum([Decimal::MAX, dec!(1)]), None);
        assert_eq!(checked_sum([]), Some(Decimal::ZERO));
    }

    #[test]
    fn system_actor_is_distinguished() {
        assert!(Actor::system("auto-close").is_system());
        assert!(!Actor::new("42", "Marta").is_system());
    }
}
