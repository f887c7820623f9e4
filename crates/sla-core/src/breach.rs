//! Breach detection.
//!
//! Pure classification of a tracker deadline against a captured "now".
//! Equality is not a breach: only `now > breach_time` is.

use chrono::{DateTime, TimeDelta, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreachState {
    /// The tracker has no deadline.
    NoSla,
    /// Deadline not yet passed. `remaining` is never negative.
    Ok { remaining: TimeDelta },
    /// Deadline passed. `overdue_by` is strictly positive.
    Breached { overdue_by: TimeDelta },
}

impl BreachState {
    pub fn is_breached(&self) -> bool {
        matches!(self, BreachState::Breached { .. })
    }
}

pub fn classify(now: DateTime<Utc>, breach_time: Option<DateTime<Utc>>) -> BreachState {
    match breach_time {
        None => BreachState::NoSla,
        Some(deadline) if now > deadline => BreachState::Breached {
            overdue_by: now - deadline,
        },
        Some(deadline) => BreachState::Ok {
            remaining: deadline - now,
        },
    }
}
