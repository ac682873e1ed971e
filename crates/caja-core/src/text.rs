//! Text encodings shared by the SQL backends, which store dates, amounts and
//! timestamps as TEXT columns.

use std::str::FromStr;

use rust_decimal::Decimal;
use time::{format_description::well_known::Rfc3339, Date, Month, OffsetDateTime};

use crate::storage::StorageError;

pub fn date_to_str(d: Date) -> String {
    format!("{:04}-{:02}-{:02}", d.year(), d.month() as u8, d.day())
}

pub fn str_to_date(s: &str) -> Result<Date, StorageError> {
    let invalid = || StorageError::Other(format!("invalid date: {}", s));
    let mut parts = s.split('-');
    let year = parts.next().and_then(|p| p.parse::<i32>().ok()).ok_or_else(invalid)?;
    let month = parts.next().and_then(|p| p.parse::<u8>().ok()).ok_or_else(invalid)?;
    let day = parts.next().and_then(|p| p.parse::<u8>().ok()).ok_or_else(invalid)?;
    let month = Month::try_from(month).map_err(|_| invalid())?;
    Date::from_calendar_date(year, month, day).map_err(|_| invalid())
}

pub fn timestamp_to_str(t: OffsetDateTime) -> Result<String, StorageError> {
    t.format(&Rfc3339)
        .map_err(|e| StorageError::Other(format!("invalid timestamp: {}", e)))
}

pub fn str_to_timestamp(s: &str) -> Result<OffsetDateTime, StorageError> {
    OffsetDateTime::parse(s, &Rfc3339)
        .map_err(|e| StorageError::Other(format!("invalid timestamp {}: {}", s, e)))
}

pub fn str_to_decimal(s: &str) -> Result<Decimal, StorageError> {
    Decimal::from_str(s).map_err(|e| StorageError::Other(format!("Invalid decimal: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::{date, datetime};

    #[test]
    fn dates_sort_as_text() {
        assert_eq!(date_to_str(date!(2024 - 03 - 01)), "2024-03-01");
        assert!(date_to_str(date!(2024 - 02 - 29)) < date_to_str(date!(2024 - 03 - 01)));
        assert_eq!(str_to_date("2024-03-01").unwrap(), date!(2024 - 03 - 01));
        assert!(str_to_date("2024-13-01").is_err());
        assert!(str_to_date("garbage").is_err());
    }

    #[test]
    fn timestamps_keep_offset() {
        let t = datetime!(2024-03-01 18:30:00 -3);
        assert_eq!(str_to_timestamp(&timestamp_to_str(t).unwrap()).unwrap(), t);
    }
}
