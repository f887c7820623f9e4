//! Persistent tracker store using redb.
//!
//! # Table design
//!
//! `TRACKERS` is keyed by the tracker's 16 UUID bytes; values are
//! JSON-encoded `SlaTracker` records.
//!
//! `HISTORY` uses a 24-byte composite key:
//! ```text
//! [ changed_at_ms: u64 big-endian (8 bytes) | uuid: 16 bytes ]
//! ```
//! so a plain iteration yields entries in `changed_at` order. The UUID suffix
//! is random and only keeps same-millisecond entries distinct.
//!
//! # Sharing the file
//!
//! redb takes an exclusive file lock for as long as a `Database` is open. The
//! running poller, one-shot CLI commands and other pollers all use the same
//! file, so the database is opened per operation and closed again when it
//! finishes. A caller that finds the file busy retries with backoff for up to
//! `LOCK_WAIT`.
//!
//! The read-check-write inside `mark_breached` runs in a single write
//! transaction under that lock, so it is atomic with respect to every other
//! writer of the file.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redb::{Database, DatabaseError, ReadableTable, TableDefinition};
use uuid::Uuid;

use crate::error::{Result, SlaError};
use crate::tracker::{HistoryEntry, SlaTracker};
use crate::types::TrackerStatus;

use super::TrackerRepository;

// ---------------------------------------------------------------------------
// Table definitions
// ---------------------------------------------------------------------------

const TRACKERS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("trackers");
const HISTORY: TableDefinition<&[u8], &[u8]> = TableDefinition::new("ticket_history");

/// How long an operation waits for another process to release the file.
const LOCK_WAIT: Duration = Duration::from_secs(10);
const LOCK_RETRY_MAX: Duration = Duration::from_millis(100);

// ---------------------------------------------------------------------------
// Key helpers
// ---------------------------------------------------------------------------

fn history_key(ts: DateTime<Utc>, id: Uuid) -> [u8; 24] {
    let mut key = [0u8; 24];
    let ms = ts.timestamp_millis().max(0) as u64;
    key[..8].copy_from_slice(&ms.to_be_bytes());
    key[8..].copy_from_slice(id.as_bytes());
    key
}

// ---------------------------------------------------------------------------
// TrackerDb
// ---------------------------------------------------------------------------

/// redb-backed `TrackerRepository`.
///
/// Cloning is cheap. Clones share one in-process gate, so they never contend
/// for the file lock with each other.
#[derive(Clone)]
pub struct TrackerDb {
    path: Arc<PathBuf>,
    gate: Arc<Mutex<()>>,
}

impl TrackerDb {
    /// Create the database at `path` if needed, with parent directories and
    /// both tables. The file is not held open afterwards.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                crate::io::ensure_dir(parent)?;
            }
        }
        let store = Self {
            path: Arc::new(path.to_path_buf()),
            gate: Arc::new(Mutex::new(())),
        };
        store.with_db(|db| {
            let wt = db.begin_write().map_err(SlaError::store)?;
            wt.open_table(TRACKERS).map_err(SlaError::store)?;
            wt.open_table(HISTORY).map_err(SlaError::store)?;
            wt.commit().map_err(SlaError::store)?;
            Ok(())
        })?;
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Open the file, run `f`, and close it again.
    fn with_db<T>(&self, f: impl FnOnce(&Database) -> Result<T>) -> Result<T> {
        let _gate = self.gate.lock().unwrap_or_else(|p| p.into_inner());
        let db = self.acquire()?;
        f(&db)
    }

    fn acquire(&self) -> Result<Database> {
        let deadline = Instant::now() + LOCK_WAIT;
        let mut delay = Duration::from_millis(5);
        loop {
            match Database::create(self.path.as_path()) {
                Ok(db) => return Ok(db),
                Err(DatabaseError::DatabaseAlreadyOpen) if Instant::now() < deadline => {
                    std::thread::sleep(delay);
                    delay = (delay * 2).min(LOCK_RETRY_MAX);
                }
                Err(e) => return Err(SlaError::store(e)),
            }
        }
    }

    /// Insert or replace a tracker.
    pub fn insert(&self, tracker: &SlaTracker) -> Result<()> {
        let value = serde_json::to_vec(tracker)?;
        self.with_db(|db| {
            let wt = db.begin_write().map_err(SlaError::store)?;
            {
                let mut table = wt.open_table(TRACKERS).map_err(SlaError::store)?;
                table
                    .insert(tracker.id.as_bytes().as_slice(), value.as_slice())
                    .map_err(SlaError::store)?;
            }
            wt.commit().map_err(SlaError::store)?;
            Ok(())
        })
    }

    pub fn get(&self, id: Uuid) -> Result<SlaTracker> {
        self.with_db(|db| {
            let rt = db.begin_read().map_err(SlaError::store)?;
            let table = rt.open_table(TRACKERS).map_err(SlaError::store)?;
            let guard = table
                .get(id.as_bytes().as_slice())
                .map_err(SlaError::store)?
                .ok_or(SlaError::TrackerNotFound(id))?;
            let tracker = serde_json::from_slice(guard.value())?;
            Ok(tracker)
        })
    }

    /// List all trackers, sorted by `created_at` descending (newest first).
    pub fn list_all(&self) -> Result<Vec<SlaTracker>> {
        let mut result = self.scan(|_| true)?;
        result.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(result)
    }

    pub fn list_by_status(&self, status: TrackerStatus) -> Result<Vec<SlaTracker>> {
        self.scan(|t| t.status == status)
    }

    /// Move a tracker to `status` on behalf of an external collaborator.
    ///
    /// Allowed moves are `Running → Paused`, `Paused → Running` and
    /// `Running | Paused → Completed`. `Breached` is one-way and only
    /// `mark_breached` may move a tracker into it. `Completed` is final.
    pub fn set_status(&self, id: Uuid, status: TrackerStatus) -> Result<SlaTracker> {
        self.with_db(|db| {
            let wt = db.begin_write().map_err(SlaError::store)?;
            let updated = {
                let mut table = wt.open_table(TRACKERS).map_err(SlaError::store)?;
                let raw = table
                    .get(id.as_bytes().as_slice())
                    .map_err(SlaError::store)?
                    .map(|g| g.value().to_vec())
                    .ok_or(SlaError::TrackerNotFound(id))?;
                let mut tracker: SlaTracker = serde_json::from_slice(&raw)?;

                check_transition(tracker.status, status)?;

                tracker.status = status;
                tracker.updated_at = Utc::now();
                let value = serde_json::to_vec(&tracker)?;
                table
                    .insert(id.as_bytes().as_slice(), value.as_slice())
                    .map_err(SlaError::store)?;
                tracker
            };
            wt.commit().map_err(SlaError::store)?;
            Ok(updated)
        })
    }

    /// Conditional `Running → Breached` transition. See `TrackerRepository`.
    pub fn mark_breached_blocking(&self, id: Uuid) -> Result<bool> {
        self.with_db(|db| {
            let wt = db.begin_write().map_err(SlaError::store)?;
            {
                let mut table = wt.open_table(TRACKERS).map_err(SlaError::store)?;
                let raw = table
                    .get(id.as_bytes().as_slice())
                    .map_err(SlaError::store)?
                    .map(|g| g.value().to_vec());
                let Some(raw) = raw else {
                    return Ok(false);
                };
                let mut tracker: SlaTracker = serde_json::from_slice(&raw)?;
                if tracker.status != TrackerStatus::Running {
                    return Ok(false);
                }
                tracker.status = TrackerStatus::Breached;
                tracker.updated_at = Utc::now();
                let value = serde_json::to_vec(&tracker)?;
                table
                    .insert(id.as_bytes().as_slice(), value.as_slice())
                    .map_err(SlaError::store)?;
            }
            wt.commit().map_err(SlaError::store)?;
            Ok(true)
        })
    }

    pub fn append_history_blocking(&self, entry: &HistoryEntry) -> Result<()> {
        let key = history_key(entry.changed_at, Uuid::new_v4());
        let value = serde_json::to_vec(entry)?;
        self.with_db(|db| {
            let wt = db.begin_write().map_err(SlaError::store)?;
            {
                let mut table = wt.open_table(HISTORY).map_err(SlaError::store)?;
                table
                    .insert(key.as_slice(), value.as_slice())
                    .map_err(SlaError::store)?;
            }
            wt.commit().map_err(SlaError::store)?;
            Ok(())
        })
    }

    /// History entries for one ticket, oldest first.
    pub fn history_for_ticket(&self, ticket_id: &str) -> Result<Vec<HistoryEntry>> {
        self.with_db(|db| {
            let rt = db.begin_read().map_err(SlaError::store)?;
            let table = rt.open_table(HISTORY).map_err(SlaError::store)?;

            let mut result = Vec::new();
            for entry in table.iter().map_err(SlaError::store)? {
                let (_, v) = entry.map_err(SlaError::store)?;
                let item: HistoryEntry = serde_json::from_slice(v.value())?;
                if item.ticket_id == ticket_id {
                    result.push(item);
                }
            }
            Ok(result)
        })
    }

    fn scan(&self, keep: impl Fn(&SlaTracker) -> bool) -> Result<Vec<SlaTracker>> {
        self.with_db(|db| {
            let rt = db.begin_read().map_err(SlaError::store)?;
            let table = rt.open_table(TRACKERS).map_err(SlaError::store)?;

            let mut result = Vec::new();
            for entry in table.iter().map_err(SlaError::store)? {
                let (_, v) = entry.map_err(SlaError::store)?;
                let tracker: SlaTracker = serde_json::from_slice(v.value())?;
                if keep(&tracker) {
                    result.push(tracker);
                }
            }
            Ok(result)
        })
    }

    async fn blocking<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(TrackerDb) -> Result<T> + Send + 'static,
    {
        let db = self.clone();
        tokio::task::spawn_blocking(move || f(db))
            .await
            .map_err(|e| SlaError::Store(format!("task join error: {e}")))?
    }
}

fn check_transition(from: TrackerStatus, to: TrackerStatus) -> Result<()> {
    use TrackerStatus::*;
    let reason = match (from, to) {
        (Running, Paused) | (Paused, Running) | (Running | Paused, Completed) => return Ok(()),
        (Breached, _) | (_, Breached) => "breach state is owned by the poller and is one-way",
        (Completed, _) => "completed trackers are final",
        _ if from == to => "tracker is already in that state",
        _ => "not an allowed move",
    };
    Err(SlaError::InvalidTransition {
        from: from.to_string(),
        to: to.to_string(),
        reason: reason.into(),
    })
}

#[async_trait]
impl TrackerRepository for TrackerDb {
    async fn list_running(&self) -> Result<Vec<SlaTracker>> {
        self.blocking(|db| db.list_by_status(TrackerStatus::Running))
            .await
    }

    async fn mark_breached(&self, id: Uuid) -> Result<bool> {
        self.blocking(move |db| db.mark_breached_blocking(id)).await
    }

    async fn append_history(&self, entry: &HistoryEntry) -> Result<()> {
        let entry = entry.clone();
        self.blocking(move |db| db.append_history_blocking(&entry))
            .await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
