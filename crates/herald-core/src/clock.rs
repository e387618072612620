//! Time source for `occurred_on` and `published_on`.

use chrono::{DateTime, SubsecRound, Utc};

/// Supplies event and publication timestamps.
pub trait Clock: Send + Sync {
    /// Returns the current time.
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock, truncated to microseconds.
///
/// Relational stores keep microsecond timestamps, so a record read back
/// compares equal to the one written and keyset cursors stay exact.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now().trunc_subsecs(6)
    }
}
