//! SLA tracker and ticket history data model.
//!
//! An `SlaTracker` is one service-level commitment on a ticket: a deadline
//! plus a status. A `HistoryEntry` is the append-only audit record written
//! against the owning ticket when the poller detects a breach.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::TrackerStatus;

/// Ticket status recorded as the "before" value of a breach history entry.
///
/// This is a fixed literal, not a read of the ticket's actual status.
pub const TICKET_STATUS_OPEN: &str = "open";

/// Ticket status recorded as the "after" value of a breach history entry.
pub const TICKET_STATUS_SLA_BREACHED: &str = "sla_breached";

// ---------------------------------------------------------------------------
// SlaTracker
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlaTracker {
    pub id: Uuid,
    pub ticket_id: String,
    /// Human-readable policy label (e.g. "Response Time").
    pub sla_name: String,
    pub status: TrackerStatus,
    /// Absolute deadline. `None` means the tracker can never breach.
    #[serde(default)]
    pub breach_time: Option<DateTime<Utc>>,
    /// Persisted but not consulted: deadlines are wall-clock instants.
    #[serde(default)]
    pub business_hours: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SlaTracker {
    /// Create a new tracker in `Running` state.
    pub fn new(
        ticket_id: impl Into<String>,
        sla_name: impl Into<String>,
        breach_time: Option<DateTime<Utc>>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            ticket_id: ticket_id.into(),
            sla_name: sla_name.into(),
            status: TrackerStatus::Running,
            breach_time,
            business_hours: false,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_running(&self) -> bool {
        self.status == TrackerStatus::Running
    }
}

// ---------------------------------------------------------------------------
// HistoryEntry
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub ticket_id: String,
    pub old_status: String,
    pub new_status: String,
    pub changed_at: DateTime<Utc>,
}

impl HistoryEntry {
    pub fn new(
        ticket_id: impl Into<String>,
        old_status: impl Into<String>,
        new_status: impl Into<String>,
        changed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            ticket_id: ticket_id.into(),
            old_status: old_status.into(),
            new_status: new_status.into(),
            changed_at,
        }
    }

    /// The `open → sla_breached` entry written when a tracker breaches.
    pub fn sla_breached(ticket_id: impl Into<String>, changed_at: DateTime<Utc>) -> Self {
        Self::new(
            ticket_id,
            TICKET_STATUS_OPEN,
            TICKET_STATUS_SLA_BREACHED,
            changed_at,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_tracker_is_running_and_inert_on_business_hours() {
        let t = SlaTracker::new("T1", "Response Time", None);
        assert!(t.is_running());
        assert!(!t.business_hours);
        assert_eq!(t.created_at, t.updated_at);
    }

    #[test]
    fn breach_entry_uses_literal_statuses() {
        let at = Utc::now();
        let e = HistoryEntry::sla_breached("T9", at);
        assert_eq!(e.old_status, "open");
        assert_eq!(e.new_status, "sla_breached");
        assert_eq!(e.changed_at, at);
    }

    #[test]
    fn tracker_without_deadline_deserializes() {
        let json = r#"{
            "id": "6c1f0b52-8a3e-4c5e-9d0a-2f4b7e1c9a10",
            "ticket_id": "T2",
            "sla_name": "Resolution Time",
            "status": "paused",
            "created_at": "2026-01-01T00:00:00Z",
            "updated_at": "2026-01-01T00:00:00Z"
        }"#;
        let t: SlaTracker = serde_json::from_str(json).unwrap();
        assert_eq!(t.status, TrackerStatus::Paused);
        assert!(t.breach_time.is_none());
        assert!(!t.business_hours);
    }
}
