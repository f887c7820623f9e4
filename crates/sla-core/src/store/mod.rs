//! Tracker persistence boundary.
//!
//! The poller only needs three operations, captured by `TrackerRepository`.
//! `mark_breached` is a conditional write: it succeeds only if the tracker is
//! still `Running` when the write lands, which is what keeps two pollers from
//! both notifying for the same breach.

pub mod db;
pub mod memory;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;
use crate::tracker::{HistoryEntry, SlaTracker};

pub use db::TrackerDb;
pub use memory::MemoryTrackerStore;

#[async_trait]
pub trait TrackerRepository: Send + Sync {
    /// All trackers currently `Running`, in no particular order.
    async fn list_running(&self) -> Result<Vec<SlaTracker>>;

    /// Transition `Running → Breached`. Returns `false` when the tracker was
    /// no longer `Running` (another process got there first, or an external
    /// collaborator paused or completed it).
    async fn mark_breached(&self, id: Uuid) -> Result<bool>;

    /// Append an audit entry to the ticket's status history.
    async fn append_history(&self, entry: &HistoryEntry) -> Result<()>;
}
