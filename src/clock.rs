//! Time source abstraction
//!
//! Services read the current time through [`Clock`] so that cooldown and
//! rate-window behaviour can be exercised with controlled timestamps.

use crate::events::Timestamp;
use chrono::Utc;

#[cfg_attr(test, mockall::automock)]
pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}

/// `Clock` backed by the system wall clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Utc::now()
    }
}
