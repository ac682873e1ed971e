use std::sync::Arc;

use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use caja_core::{
    Actor, CreateExpenseCommand, Expense, LedgerError, Movement, MovementKind, MovementSource,
    NewMovement,
};

use crate::ledger::{append_movement, require_open, LedgerService};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExpenseUpdate {
    pub expense: Expense,
    /// The movement that records the difference, if the amount changed.
    pub adjustment: Option<Movement>,
}

/// Expenses are outflows recorded against the open register of their date.
pub struct ExpenseManager {
    ledger: Arc<LedgerService>,
}

impl ExpenseManager {
    pub fn new(ledger: Arc<LedgerService>) -> Self {
        Self { ledger }
    }

    pub fn create(&self, command: &CreateExpenseCommand, actor: &Actor) -> Result<Expense, LedgerError> {
        if command.description.trim().is_empty() {
            return Err(LedgerError::Validation("expense description is required".to_string()));
        }
        if command.amount <= Decimal::ZERO {
            return Err(LedgerError::Validation(format!("expense amount must be positive, got {}", command.amount)));
        }

        let clock = self.ledger.clock();
        let date = command.date.unwrap_or_else(|| clock.today());
        let now = clock.now();

        let expense = self.ledger.transaction("create_expense", |tx| {
            require_open(tx, date)?;
            let expense = Expense {
                id: Uuid::new_v4(),
                date,
                description: command.description.clone(),
                amount: command.amount,
                payment_method: command.payment_method.clone(),
                created_by: actor.clone(),
                created_at: now,
            };
            tx.insert_expense(&expense)?;
            append_movement(
                tx,
                &NewMovement {
                    date,
                    kind: MovementKind::Expense,
                    amount: expense.amount,
                    description: expense.description.clone(),
                    payment_method: expense.payment_method.clone(),
                    source: MovementSource::Expense { expense_id: expense.id },
                },
                now,
            )?;
            Ok(expense)
        })?;

        tracing::info!(%date, id = %expense.id, amount = %expense.amount, "Expense recorded");
        self.ledger.record(
            actor,
            "expense.create",
            "expense",
            expense.id,
            format!("{} on {}", expense.amount, date),
        );
        Ok(expense)
    }

    /// Changes an expense's amount. Existing movements stay as written; the difference
    /// is appended as a new movement on the expense's date.
    pub fn update_amount(&self, id: Uuid, amount: Decimal, actor: &Actor) -> Result<ExpenseUpdate, LedgerError> {
        if amount <= Decimal::ZERO {
            return Err(LedgerError::Validation(format!("expense amount must be positive, got {}", amount)));
        }
        let now = self.ledger.clock().now();

        let (update, previous) = self.ledger.transaction("update_expense", |tx| {
            let mut expense = tx
                .expense(id)?
                .ok_or_else(|| LedgerError::NotFound(format!("expense {}", id)))?;
            let previous = expense.amount;
            let delta = amount - previous;
            if delta.is_zero() {
                return Ok((ExpenseUpdate { expense, adjustment: None }, previous));
            }

            require_open(tx, expense.date)?;
            expense.amount = amount;
            tx.update_expense(&expense)?;

            let kind = if delta > Decimal::ZERO {
                MovementKind::Expense
            } else {
                MovementKind::Income
            };
            let adjustment = append_movement(
                tx,
                &NewMovement {
                    date: expense.date,
                    kind,
                    amount: delta.abs(),
                    description: Arc::from(format!("Adjustment: {}", expense.description)),
                    payment_method: expense.payment_method.clone(),
                    source: MovementSource::Expense { expense_id: expense.id },
                },
                now,
            )?;
            Ok((ExpenseUpdate { expense, adjustment: Some(adjustment) }, previous))
        })?;

        if update.adjustment.is_some() {
            tracing::info!(id = %id, from = %previous, to = %amount, "Expense amount changed");
            self.ledger.record(
                actor,
                "expense.update",
                "expense",
                id,
                format!("amount {} -> {}", previous, amount),
            );
        }
        Ok(update)
    }

    /// Removes an expense together with every movement recorded for it.
    pub fn delete(&self, id: Uuid, actor: &Actor) -> Result<Expense, LedgerError> {
        let expense = self.ledger.transaction("delete_expense", |tx| {
            let expense = tx
                .expense(id)?
                .ok_or_else(|| LedgerError::NotFound(format!("expense {}", id)))?;
            require_open(tx, expense.date)?;
            tx.delete_movements_for_expense(id)?;
            tx.delete_expense(id)?;
            Ok(expense)
        })?;

        tracing::info!(id = %id, amount = %expense.amount, "Expense deleted");
        self.ledger.record(
            actor,
            "expense.delete",
            "expense",
            id,
            format!("{} on {}", expense.amount, expense.date),
        );
        Ok(expense)
    }
}
