//! In-memory `TrackerRepository`.
//!
//! Same conditional-write semantics as `TrackerDb`, without a file. Used for
//! dry runs and as the test double for the poller. Individual operations can
//! be made to fail to exercise error isolation.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::error::{Result, SlaError};
use crate::tracker::{HistoryEntry, SlaTracker};
use crate::types::TrackerStatus;

use super::TrackerRepository;

#[derive(Default)]
pub struct MemoryTrackerStore {
    trackers: Mutex<HashMap<Uuid, SlaTracker>>,
    history: Mutex<Vec<HistoryEntry>>,
    fail_list: AtomicBool,
    fail_history: AtomicBool,
    fail_mark: Mutex<HashSet<Uuid>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MemoryTrackerStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_trackers(trackers: impl IntoIterator<Item = SlaTracker>) -> Self {
        let store = Self::new();
        for t in trackers {
            store.insert(t);
        }
        store
    }

    pub fn insert(&self, tracker: SlaTracker) {
        lock(&self.trackers).insert(tracker.id, tracker);
    }

    pub fn get(&self, id: Uuid) -> Option<SlaTracker> {
        lock(&self.trackers).get(&id).cloned()
    }

    /// Overwrite a tracker's status with no checks, as another process or an
    /// external collaborator might.
    pub fn force_status(&self, id: Uuid, status: TrackerStatus) {
        if let Some(t) = lock(&self.trackers).get_mut(&id) {
            t.status = status;
            t.updated_at = Utc::now();
        }
    }

    pub fn history(&self) -> Vec<HistoryEntry> {
        lock(&self.history).clone()
    }

    pub fn history_for_ticket(&self, ticket_id: &str) -> Vec<HistoryEntry> {
        lock(&self.history)
            .iter()
            .filter(|e| e.ticket_id == ticket_id)
            .cloned()
            .collect()
    }

    pub fn fail_list_running(&self, fail: bool) {
        self.fail_list.store(fail, Ordering::SeqCst);
    }

    pub fn fail_history(&self, fail: bool) {
        self.fail_history.store(fail, Ordering::SeqCst);
    }

    pub fn fail_mark_breached_for(&self, id: Uuid) {
        lock(&self.fail_mark).insert(id);
    }
}

#[async_trait]
impl TrackerRepository for MemoryTrackerStore {
    async fn list_running(&self) -> Result<Vec<SlaTracker>> {
        if self.fail_list.load(Ordering::SeqCst) {
            return Err(SlaError::Store("list_running unavailable".into()));
        }
        Ok(lock(&self.trackers)
            .values()
            .filter(|t| t.is_running())
            .cloned()
            .collect())
    }

    async fn mark_breached(&self, id: Uuid) -> Result<bool> {
        if lock(&self.fail_mark).contains(&id) {
            return Err(SlaError::Store(format!("mark_breached failed for {id}")));
        }
        let mut trackers = lock(&self.trackers);
        match trackers.get_mut(&id) {
            Some(t) if t.status == TrackerStatus::Running => {
                t.status = TrackerStatus::Breached;
                t.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn append_history(&self, entry: &HistoryEntry) -> Result<()> {
        if self.fail_history.load(Ordering::SeqCst) {
            return Err(SlaError::Store("history append failed".into()));
        }
        lock(&self.history).push(entry.clone());
        Ok(())
    }
}
