//! Time source for the booking and crowd rules
//!
//! Slot windows are wall-clock times at the temple, so rules compare against
//! [`Clock::local_now`]. Audit timestamps use [`Clock::now`].

use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};

pub trait Clock: Send + Sync {
    /// Current instant, for audit timestamps
    fn now(&self) -> DateTime<Utc>;

    /// Current local wall-clock time
    fn local_now(&self) -> NaiveDateTime;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn local_now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// Clock frozen at a local wall-clock time; `now()` reads the same value as UTC
#[derive(Debug, Clone, Copy)]
pub struct FixedClock {
    local: NaiveDateTime,
}

impl FixedClock {
    pub const fn new(local: NaiveDateTime) -> Self {
        Self { local }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        Utc.from_utc_datetime(&self.local)
    }

    fn local_now(&self) -> NaiveDateTime {
        self.local
    }
}
