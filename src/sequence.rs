//! Receipt numbering. Numbers come from a single counter that is only ever moved by
//! an atomic increment, and moved back only for the most recent receipt.

use caja_core::{LedgerError, LedgerTx};

/// Hands out the next receipt number inside the caller's unit of work.
pub fn reserve(tx: &mut dyn LedgerTx) -> Result<u64, LedgerError> {
    Ok(tx.next_receipt_number()?)
}

/// Returns `expected` to the pool. Legal only when it is the last number handed out
/// and the receipt holding it is the only one at or above it.
pub fn rollback_last(tx: &mut dyn LedgerTx, expected: u64) -> Result<(), LedgerError> {
    let current = tx.current_receipt_number()?;
    if expected == 0 || expected != current {
        return Err(LedgerError::SequenceIntegrity(format!(
            "receipt {} is not the last number issued (counter at {})",
            expected, current
        )));
    }

    let at_or_above = tx.count_receipts_from(expected)?;
    if at_or_above != 1 {
        return Err(LedgerError::SequenceIntegrity(format!(
            "expected exactly one receipt numbered {} or higher, found {}",
            expected, at_or_above
        )));
    }

    if !tx.decrement_receipt_number(expected)? {
        return Err(LedgerError::SequenceIntegrity(format!(
            "counter moved while returning receipt {}",
            expected
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use caja_core::{Actor, LedgerStore, Receipt};
    use caja_memory::InMemoryStorage;
    use time::{macros::date, OffsetDateTime};
    use uuid::Uuid;

    fn receipt(number: u64) -> Receipt {
        Receipt {
            id: Uuid::new_v4(),
            number,
            client_id: Arc::from("c1"),
            date: date!(2024 - 03 - 01),
            items: vec![],
            payments: vec![],
            created_by: Actor::new("1", "Ana"),
            created_at: OffsetDateTime::UNIX_EPOCH,
        }
    }

    #[test]
    fn rollback_returns_last_number() {
        let storage = InMemoryStorage::new();
        let mut tx = storage.begin().unwrap();
        let n = reserve(tx.as_mut()).unwrap();
        tx.insert_receipt(&receipt(n)).unwrap();

        rollback_last(tx.as_mut(), n).unwrap();
        assert_eq!(tx.current_receipt_number().unwrap(), 0);
    }

    #[test]
    fn rollback_rejects_older_number() {
        let storage = InMemoryStorage::new();
        let mut tx = storage.begin().unwrap();
        for _ in 0..2 {
            let n = reserve(tx.as_mut()).unwrap();
            tx.insert_receipt(&receipt(n)).unwrap();
        }

        assert!(matches!(rollback_last(tx.as_mut(), 1), Err(LedgerError::SequenceIntegrity(_))));
        assert_eq!(tx.current_receipt_number().unwrap(), 2);
    }

    #[test]
    fn rollback_rejects_missing_receipt() {
        let storage = InMemoryStorage::new();
        let mut tx = storage.begin().unwrap();
        reserve(tx.as_mut()).unwrap();

        assert!(matches!(rollback_last(tx.as_mut(), 1), Err(LedgerError::SequenceIntegrity(_))));
    }
}
