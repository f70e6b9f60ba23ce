//! Calendar clock used to date key lifecycle transitions.

use chrono::{Local, NaiveDate};
use parking_lot::Mutex;

/// Source of the current calendar date.
pub trait Clock: Send + Sync + 'static {
    /// Today's date. Time of day never matters for key rotation.
    fn today(&self) -> NaiveDate;
}

/// Host-local calendar date.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        Local::now().date_naive()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct FixedClock {
    today: Mutex<NaiveDate>,
}

impl FixedClock {
    /// Clock frozen at `today`.
    #[must_use]
    pub fn new(today: NaiveDate) -> Self {
        Self {
            today: Mutex::new(today),
        }
    }

    /// Move to an arbitrary date.
    pub fn set(&self, today: NaiveDate) {
        *self.today.lock() = today;
    }

    /// Move forward by whole days.
    pub fn advance_days(&self, days: u64) {
        let mut today = self.today.lock();
        if let Some(next) = today.checked_add_days(chrono::Days::new(days)) {
            *today = next;
        }
    }
}

impl Clock for FixedClock {
    fn today(&self) -> NaiveDate {
        *self.today.lock()
    }
}
