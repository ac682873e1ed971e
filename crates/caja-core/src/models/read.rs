use std::{collections::BTreeMap, fmt::Display, sync::Arc};

use prettytable::{row, Table};
use rust_decimal::Decimal;
use serde::Serialize;
use time::Date;

use super::{Movement, MovementKind, Register};
use crate::error::LedgerError;

pub const MAX_PAGE_SIZE: usize = 500;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MethodTotals {
    pub income: Decimal,
    pub expense: Decimal,
}

/// Read-only view of one day: register state, one page of movements and totals over all of them.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegisterSummary {
    pub register: Register,
    pub movements: Vec<Movement>,
    pub movement_count: usize,
    pub page: usize,
    pub page_size: usize,
    pub income_total: Decimal,
    pub expense_total: Decimal,
    pub final_balance: Decimal,
    pub by_payment_method: BTreeMap<Arc<str>, MethodTotals>,
}

impl RegisterSummary {
    /// `movements` must hold every movement of the register's date in insertion order.
    /// Fails with a validation error if a total does not fit in a `Decimal`.
    pub fn build(register: Register, movements: Vec<Movement>, page: usize, page_size: usize) -> Result<Self, LedgerError> {
        let page = page.max(1);
        let page_size = page_size.clamp(1, MAX_PAGE_SIZE);

        let mut income_total = Decimal::ZERO;
        let mut expense_total = Decimal::ZERO;
        let mut by_payment_method: BTreeMap<Arc<str>, MethodTotals> = BTreeMap::new();
        for m in &movements {
            let total = match m.kind {
                MovementKind::Income => &mut income_total,
                MovementKind::Expense => &mut expense_total,
            };
            *total = total.checked_add(m.amount).ok_or_else(LedgerError::out_of_range)?;

            if let Some(method) = &m.payment_method {
                let totals = by_payment_method.entry(method.clone()).or_default();
                let total = match m.kind {
                    MovementKind::Income => &mut totals.income,
                    MovementKind::Expense => &mut totals.expense,
                };
                *total = total.checked_add(m.amount).ok_or_else(LedgerError::out_of_range)?;
            }
        }

        let final_balance = match register.closing_balance {
            Some(closing) if register.closed => closing,
            _ => net_balance(register.opening_balance, income_total, expense_total).ok_or_else(LedgerError::out_of_range)?,
        };

        let movement_count = movements.len();
        let movements = movements
            .into_iter()
            .skip((page - 1).saturating_mul(page_size))
            .take(page_size)
            .collect();

        Ok(Self {
            register,
            movements,
            movement_count,
            page,
            page_size,
            income_total,
            expense_total,
            final_balance,
            by_payment_method,
        })
    }

    /// Opening balance plus net movements, ignoring any stored closing balance.
    pub fn computed_balance(&self) -> Option<Decimal> {
        net_balance(self.register.opening_balance, self.income_total, self.expense_total)
    }
}

fn net_balance(opening: Decimal, income: Decimal, expense: Decimal) -> Option<Decimal> {
    opening.checked_add(income)?.checked_sub(expense)
}

impl Display for RegisterSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut table = Table::new();
        table.add_row(row!["#", "Kind", "Description", "Method", "Amount", "Balance"]);
        table.add_empty_row();

        for m in &self.movements {
            table.add_row(row![
                m.id,
                m.kind.as_str(),
                m.description,
                m.payment_method.as_deref().unwrap_or(""),
                m.amount,
                m.running_balance
            ]);
        }

        writeln!(f, "Register {} ({:?})", self.register.date, self.register.state())?;
        writeln!(f, "Opening: {}", self.register.opening_balance)?;
        write!(f, "{}", table)?;
        writeln!(f, "Income: {}  Expense: {}  Final: {}", self.income_total, self.expense_total, self.final_balance)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AutoCloseFailure {
    pub date: Date,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AutoCloseReport {
    pub closed: Vec<Register>,
    pub failed: Vec<AutoCloseFailure>,
    pub count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Actor, MovementSource};
    use rust_decimal_macros::dec;
    use time::{macros::date, OffsetDateTime};

    fn movement(id: u64, kind: MovementKind, amount: Decimal, method: Option<&str>) -> Movement {
        Movement {
            id,
            date: date!(2024 - 03 - 01),
            kind,
            amount,
            running_balance: Decimal::ZERO,
            description: Arc::from("test"),
            payment_method: method.map(Arc::from),
            source: MovementSource::Manual,
            created_at: OffsetDateTime::UNIX_EPOCH,
        }
    }

    fn register() -> Register {
        Register::open(date!(2024 - 03 - 01), dec!(100.00), Actor::new("1", "Ana"), OffsetDateTime::UNIX_EPOCH)
    }

    #[test]
    fn totals_cover_all_pages() {
        let movements = vec![
            movement(1, MovementKind::Income, dec!(50.00), Some("cash")),
            movement(2, MovementKind::Income, dec!(30.00), Some("card")),
            movement(3, MovementKind::Expense, dec!(20.00), Some("cash")),
        ];
        let summary = RegisterSummary::build(register(), movements, 2, 2).unwrap();

        assert_eq!(summary.movements.len(), 1);
        assert_eq!(summary.movements[0].id, 3);
        assert_eq!(summary.movement_count, 3);
        assert_eq!(summary.income_total, dec!(80.00));
        assert_eq!(summary.expense_total, dec!(20.00));
        assert_eq!(summary.final_balance, dec!(160.00));
        assert_eq!(summary.by_payment_method["cash"], MethodTotals { income: dec!(50.00), expense: dec!(20.00) });
    }

    #[test]
    fn closed_register_reports_stored_balance() {
        let mut reg = register();
        reg.closed = true;
        reg.closing_balance = Some(dec!(999.00));
        reg.balance_overridden = true;
        let summary = RegisterSummary::build(reg, vec![], 1, 10).unwrap();
        assert_eq!(summary.final_balance, dec!(999.00));
        assert_eq!(summary.computed_balance(), Some(dec!(100.00)));
    }

    #[test]
    fn page_past_end_is_empty_and_size_is_clamped() {
        let movements = vec![movement(1, MovementKind::Income, dec!(5), None)];
        let summary = RegisterSummary::build(register(), movements, 7, 0).unwrap();
        assert!(summary.movements.is_empty());
        assert_eq!(summary.page_size, 1);
        assert_eq!(summary.income_total, dec!(5));
        assert!(summary.by_payment_method.is_empty());
    }

    #[test]
    fn totals_that_overflow_are_rejected() {
        let mut reg = register();
        reg.opening_balance = Decimal::MAX;
        let movements = vec![movement(1, MovementKind::Income, dec!(1), Some("cash"))];
        assert!(matches!(
            RegisterSummary::build(reg, movements, 1, 10),
            Err(LedgerError::Validation(_))
        ));

        let movements = vec![
            movement(1, MovementKind::Income, Decimal::MAX, None),
            movement(2, MovementKind::Income, Decimal::MAX, None),
        ];
        assert!(RegisterSummary::build(register(), movements, 1, 10).is_err());
    }
}
