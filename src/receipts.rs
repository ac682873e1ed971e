use std::sync::Arc;

use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use caja_core::{
    checked_sum, Actor, CreateReceiptCommand, LedgerError, MovementKind, MovementSource, NewMovement, Receipt,
    StorageError, BALANCE_TOLERANCE,
};

use crate::{
    ledger::{append_movement, require_open, LedgerService},
    sequence,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VoidedReceipt {
    pub receipt_id: Uuid,
    pub voided_number: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeletedReceipt {
    pub receipt_id: Uuid,
    pub deleted_number: u64,
}

/// Creates, voids and deletes receipts. Each operation is a single unit of work:
/// receipt rows, movements and the counter change together or not at all.
pub struct ReceiptManager {
    ledger: Arc<LedgerService>,
}

impl ReceiptManager {
    pub fn new(ledger: Arc<LedgerService>) -> Self {
        Self { ledger }
    }

    pub fn create(&self, command: &CreateReceiptCommand, actor: &Actor) -> Result<Receipt, LedgerError> {
        let total = validate(command)?;

        let clock = self.ledger.clock();
        let date = command.date.unwrap_or_else(|| clock.today());
        let now = clock.now();

        let receipt = self.ledger.transaction("create_receipt", |tx| {
            require_open(tx, date)?;
            let number = sequence::reserve(tx)?;
            let receipt = Receipt {
                id: Uuid::new_v4(),
                number,
                client_id: command.client_id.clone(),
                date,
                items: command.items.clone(),
                payments: command.payments.clone(),
                created_by: actor.clone(),
                created_at: now,
            };
            tx.insert_receipt(&receipt).map_err(|e| match e {
                StorageError::EntityAlreadyExists(_) => {
                    LedgerError::SequenceIntegrity(format!("receipt number {} is already taken", number))
                }
                other => other.into(),
            })?;

            let description: Arc<str> = Arc::from(format!("Receipt #{}", number));
            for payment in &receipt.payments {
                let movement = NewMovement {
                    date,
                    kind: MovementKind::Income,
                    amount: payment.amount,
                    description: description.clone(),
                    payment_method: Some(payment.method.clone()),
                    source: MovementSource::Receipt {
                        receipt_id: receipt.id,
                        number,
                    },
                };
                append_movement(tx, &movement, now)?;
            }
            Ok(receipt)
        })?;

        tracing::info!(number = receipt.number, client = %receipt.client_id, %total, "Receipt created");
        metrics::increment_counter!("caja_receipts_created_total");
        self.ledger.record(
            actor,
            "receipt.create",
            "receipt",
            receipt.id,
            format!("number {} for client {} total {}", receipt.number, receipt.client_id, total),
        );
        Ok(receipt)
    }

    /// Removes the highest-numbered receipt and gives its number back.
    pub fn void_last(&self, actor: &Actor) -> Result<VoidedReceipt, LedgerError> {
        let voided = self.ledger.transaction("void_last_receipt", |tx| {
            let latest = tx.latest_receipt()?.ok_or(LedgerError::NothingToVoid)?;
            require_open(tx, latest.date)?;
            sequence::rollback_last(tx, latest.number)?;
            tx.delete_movements_for_receipt(latest.id)?;
            tx.delete_receipt(latest.id)?;
            Ok(VoidedReceipt {
                receipt_id: latest.id,
                voided_number: latest.number,
            })
        })?;

        tracing::info!(number = voided.voided_number, actor = %actor, "Receipt voided");
        metrics::increment_counter!("caja_receipts_voided_total");
        self.ledger.record(
            actor,
            "receipt.void",
            "receipt",
            voided.receipt_id,
            format!("number {} returned to the pool", voided.voided_number),
        );
        Ok(voided)
    }

    /// Removes any receipt without touching the counter. The number is lost for good,
    /// leaving a gap in the sequence.
    pub fn delete(&self, id: Uuid, actor: &Actor) -> Result<DeletedReceipt, LedgerError> {
        let deleted = self.ledger.transaction("delete_receipt", |tx| {
            let receipt = tx
                .receipt(id)?
                .ok_or_else(|| LedgerError::NotFound(format!("receipt {}", id)))?;
            require_open(tx, receipt.date)?;
            tx.delete_movements_for_receipt(receipt.id)?;
            tx.delete_receipt(receipt.id)?;
            Ok(DeletedReceipt {
                receipt_id: receipt.id,
                deleted_number: receipt.number,
            })
        })?;

        tracing::warn!(number = deleted.deleted_number, actor = %actor, "Receipt deleted, number not reused");
        metrics::increment_counter!("caja_receipts_deleted_total");
        self.ledger.record(
            actor,
            "receipt.delete",
            "receipt",
            deleted.receipt_id,
            format!("number {} deleted, gap left in sequence", deleted.deleted_number),
        );
        Ok(deleted)
    }
}

/// Checks the command and returns the payments total.
fn validate(command: &CreateReceiptCommand) -> Result<Decimal, LedgerError> {
    if command.client_id.trim().is_empty() {
        return Err(LedgerError::Validation("client is required".to_string()));
    }
    if command.items.is_empty() {
        return Err(LedgerError::Validation("a receipt needs at least one line item".to_string()));
    }
    if command.payments.is_empty() {
        return Err(LedgerError::Validation("a receipt needs at least one payment".to_string()));
    }

    for item in &command.items {
        if item.description.trim().is_empty() {
            return Err(LedgerError::Validation("line item description is required".to_string()));
        }
        if item.amount <= Decimal::ZERO {
            return Err(LedgerError::Validation(format!("line item amount must be positive, got {}", item.amount)));
        }
        if let Some(period) = item.period {
            if !(1..=12).contains(&period.month) {
                return Err(LedgerError::Validation(format!("invalid period month {}", period.month)));
            }
        }
    }

    for payment in &command.payments {
        if payment.method.trim().is_empty() {
            return Err(LedgerError::Validation("payment method is required".to_string()));
        }
        if payment.amount <= Decimal::ZERO {
            return Err(LedgerError::Validation(format!("payment amount must be positive, got {}", payment.amount)));
        }
    }

    let items = checked_sum(command.items.iter().map(|i| i.amount)).ok_or_else(LedgerError::out_of_range)?;
    let payments = checked_sum(command.payments.iter().map(|p| p.amount)).ok_or_else(LedgerError::out_of_range)?;
    if (items - payments).abs() > BALANCE_TOLERANCE {
        return Err(LedgerError::Validation(format!(
            "line items total {} does not match payments total {}",
            items, payments
        )));
    }
    Ok(payments)
}

#[cfg(test)]
mod tests {
    use super::*;
    use caja_core::{BillingPeriod, LineItem, Payment};
    use rust_decimal_macros::dec;

    fn command(item: Decimal, paid: Decimal) -> CreateReceiptCommand {
        CreateReceiptCommand {
            client_id: Arc::from("client-1"),
            date: None,
            items: vec![LineItem {
                description: Arc::from("Monthly fee"),
                period: Some(BillingPeriod { year: 2024, month: 3 }),
                amount: item,
            }],
            payments: vec![Payment {
                method: Arc::from("cash"),
                amount: paid,
                check_numbers: vec![],
            }],
        }
    }

    #[test]
    fn totals_within_a_cent_are_accepted() {
        assert!(validate(&command(dec!(50.00), dec!(50.01))).is_ok());
        assert!(validate(&command(dec!(50.00), dec!(49.99))).is_ok());
    }

    #[test]
    fn totals_off_by_more_than_a_cent_are_rejected() {
        assert!(matches!(
            validate(&command(dec!(50.00), dec!(50.02))),
            Err(LedgerError::Validation(_))
        ));
    }

    #[test]
    fn totals_that_overflow_are_rejected() {
        let mut cmd = command(Decimal::MAX, Decimal::MAX);
        cmd.items.push(cmd.items[0].clone());
        assert!(matches!(validate(&cmd), Err(LedgerError::Validation(msg)) if msg == "amount out of range"));
    }

    #[test]
    fn bad_period_and_amounts_are_rejected() {
        let mut cmd = command(dec!(10), dec!(10));
        cmd.items[0].period = Some(BillingPeriod { year: 2024, month: 13 });
        assert!(validate(&cmd).is_err());

        assert!(validate(&command(dec!(0), dec!(0))).is_err());

        let mut cmd = command(dec!(10), dec!(10));
        cmd.payments.clear();
        assert!(validate(&cmd).is_err());
    }
}
