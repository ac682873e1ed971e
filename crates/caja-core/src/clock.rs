use std::sync::Mutex;

use time::{Date, OffsetDateTime, UtcOffset};

pub trait Clock: Send + Sync {
    fn now(&self) -> OffsetDateTime;

    /// The business date, in the clock's local offset.
    fn today(&self) -> Date {
        self.now().date()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    offset: UtcOffset,
}

impl SystemClock {
    pub fn utc() -> Self {
        Self { offset: UtcOffset::UTC }
    }

    pub fn with_offset(offset: UtcOffset) -> Self {
        Self { offset }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::utc()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc().to_offset(self.offset)
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct FixedClock {
    now: Mutex<OffsetDateTime>,
}

impl FixedClock {
    pub fn new(now: OffsetDateTime) -> Self {
        Self { now: Mutex::new(now) }
    }

    pub fn at_date(date: Date) -> Self {
        Self::new(date.midnight().assume_utc())
    }

    pub fn set_date(&self, date: Date) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now = date.midnight().assume_utc();
    }
}

impl Clock for FixedClock {
    fn now(&self) -> OffsetDateTime {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::date;

    #[test]
    fn fixed_clock_moves_on_demand() {
        let clock = FixedClock::at_date(date!(2024 - 03 - 01));
        assert_eq!(clock.today(), date!(2024 - 03 - 01));
        clock.set_date(date!(2024 - 03 - 02));
        assert_eq!(clock.today(), date!(2024 - 03 - 02));
    }
}
