//! SLA breach poller.
//!
//! Each tick captures one "now", pulls every `Running` tracker and classifies
//! it. For a breach the order is fixed: the conditional `mark_breached` must
//! win before the history entry is written and the notification goes out.
//! Losing that write means another process owns the breach, so this tick
//! does nothing further for the tracker.
//!
//! Trackers within a tick are processed concurrently and independently. A
//! failure for one tracker, or for a whole tick, is logged and never stops
//! the scheduler.
//!
//! Breach handling runs on its own task, detached from the tick that found
//! it. Abandoning a tick (timeout, dropped caller) only abandons the listing
//! and the wait; a breach whose write has committed still gets its history
//! entry, its notification and its place in the totals.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, TimeDelta, Utc};
use serde::Serialize;
use sla_core::config::PollerConfig;
use sla_core::{classify, BreachState, HistoryEntry, SlaTracker, TrackerRepository};
use sla_notify::{NotificationDispatcher, TemplateData};
use thiserror::Error;
use tokio::sync::{watch, Notify};
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{error, info, warn};

use crate::clock::{Clock, SystemClock};

/// Template used for both the email and the Teams card.
pub const BREACH_TEMPLATE: &str = "sla_breach";

#[derive(Debug, Error)]
pub enum PollerError {
    #[error("poller is already running")]
    AlreadyRunning,
}

// ---------------------------------------------------------------------------
// PollerSettings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct PollerSettings {
    pub interval: Duration,
    pub app_url: String,
    pub ops_email: String,
    pub teams_webhook_url: Option<String>,
    pub tick_timeout: Option<Duration>,
}

impl PollerSettings {
    pub fn from_config(cfg: &PollerConfig) -> Self {
        Self {
            interval: cfg.poll_interval(),
            app_url: cfg.app_url.trim_end_matches('/').to_string(),
            ops_email: cfg.ops_email.clone(),
            teams_webhook_url: cfg.teams_webhook_url.clone(),
            tick_timeout: cfg.tick_timeout(),
        }
    }
}

impl Default for PollerSettings {
    fn default() -> Self {
        Self::from_config(&PollerConfig::default())
    }
}

// ---------------------------------------------------------------------------
// Tick results
// ---------------------------------------------------------------------------

/// What one tick did with one tracker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackerOutcome {
    /// Deadline not reached yet.
    Ok,
    /// No deadline.
    NoSla,
    /// Breached here, and every notification went out.
    Notified,
    /// Breached here, but at least one notification failed.
    NotifyFailed,
    /// Another process transitioned the tracker first.
    LostRace,
    /// The repository failed before the transition committed.
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TickReport {
    pub started_at: DateTime<Utc>,
    pub checked: usize,
    pub breached: usize,
    pub notified: usize,
    pub notify_failures: usize,
    pub lost_races: usize,
    pub errors: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub listing_error: Option<String>,
}

impl TickReport {
    fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            checked: 0,
            breached: 0,
            notified: 0,
            notify_failures: 0,
            lost_races: 0,
            errors: Vec::new(),
            listing_error: None,
        }
    }

    fn record(&mut self, outcome: TrackerOutcome) {
        self.checked += 1;
        match outcome {
            TrackerOutcome::Ok | TrackerOutcome::NoSla => {}
            TrackerOutcome::Notified => {
                self.breached += 1;
                self.notified += 1;
            }
            TrackerOutcome::NotifyFailed => {
                self.breached += 1;
                self.notify_failures += 1;
            }
            TrackerOutcome::LostRace => self.lost_races += 1,
            TrackerOutcome::Failed(e) => self.errors.push(e),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PollerTotals {
    pub breached: u64,
    pub notified: u64,
    pub notify_failures: u64,
    pub lost_races: u64,
    pub errors: u64,
    pub timed_out_ticks: u64,
    pub panicked_ticks: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PollerState {
    Stopped,
    Running,
}

#[derive(Debug, Clone, Serialize)]
pub struct PollerStatus {
    pub state: PollerState,
    pub interval_ms: u64,
    pub ticks: u64,
    pub last_tick: Option<TickReport>,
    pub totals: PollerTotals,
}

// ---------------------------------------------------------------------------
// SlaPoller
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct Stats {
    ticks: u64,
    last_tick: Option<TickReport>,
    totals: PollerTotals,
}

pub struct SlaPoller {
    repo: Arc<dyn TrackerRepository>,
    dispatcher: Arc<NotificationDispatcher>,
    clock: Arc<dyn Clock>,
    settings: PollerSettings,
    running: AtomicBool,
    stats: Mutex<Stats>,
    breach_tasks: AtomicUsize,
    breach_idle: Notify,
}

impl SlaPoller {
    pub fn new(
        repo: Arc<dyn TrackerRepository>,
        dispatcher: Arc<NotificationDispatcher>,
        settings: PollerSettings,
    ) -> Self {
        Self {
            repo,
            dispatcher,
            clock: Arc::new(SystemClock),
            settings,
            running: AtomicBool::new(false),
            stats: Mutex::new(Stats::default()),
            breach_tasks: AtomicUsize::new(0),
            breach_idle: Notify::new(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn repository(&self) -> Arc<dyn TrackerRepository> {
        Arc::clone(&self.repo)
    }

    pub fn settings(&self) -> &PollerSettings {
        &self.settings
    }

    pub fn state(&self) -> PollerState {
        if self.running.load(Ordering::SeqCst) {
            PollerState::Running
        } else {
            PollerState::Stopped
        }
    }

    pub fn status(&self) -> PollerStatus {
        let stats = self.stats();
        PollerStatus {
            state: self.state(),
            interval_ms: self.settings.interval.as_millis() as u64,
            ticks: stats.ticks,
            last_tick: stats.last_tick.clone(),
            totals: stats.totals,
        }
    }

    fn stats(&self) -> MutexGuard<'_, Stats> {
        self.stats.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Run one evaluation pass over all running trackers.
    ///
    /// Resolves once every breach found by this pass has been handled.
    /// Dropping the future early leaves those breaches running.
    pub async fn tick(self: &Arc<Self>) -> TickReport {
        let now = self.clock.now();
        let mut report = TickReport::new(now);

        match self.repo.list_running().await {
            Ok(trackers) => {
                let mut breaches = Vec::new();
                for tracker in trackers {
                    match classify(now, tracker.breach_time) {
                        BreachState::NoSla => report.record(TrackerOutcome::NoSla),
                        BreachState::Ok { .. } => report.record(TrackerOutcome::Ok),
                        BreachState::Breached { overdue_by } => {
                            breaches.push(self.spawn_breach(tracker, overdue_by));
                        }
                    }
                }
                for joined in futures::future::join_all(breaches).await {
                    let outcome = joined.unwrap_or_else(|e| {
                        error!(error = %e, "breach task failed");
                        self.stats().totals.errors += 1;
                        TrackerOutcome::Failed(format!("breach task failed: {e}"))
                    });
                    report.record(outcome);
                }
            }
            Err(e) => {
                error!(error = %e, "failed to list running trackers");
                report.listing_error = Some(e.to_string());
            }
        }

        if report.breached > 0 || !report.errors.is_empty() || report.listing_error.is_some() {
            info!(
                checked = report.checked,
                breached = report.breached,
                notified = report.notified,
                notify_failures = report.notify_failures,
                lost_races = report.lost_races,
                errors = report.errors.len(),
                "tick complete"
            );
        }
        self.record_tick(&report);
        report
    }

    /// Per-tracker counts go into the totals as each breach task finishes,
    /// so only the tick itself is recorded here.
    fn record_tick(&self, report: &TickReport) {
        let mut stats = self.stats();
        stats.ticks += 1;
        stats.totals.errors += u64::from(report.listing_error.is_some());
        stats.last_tick = Some(report.clone());
    }

    fn record_outcome(&self, outcome: &TrackerOutcome) {
        let mut stats = self.stats();
        let totals = &mut stats.totals;
        match outcome {
            TrackerOutcome::Ok | TrackerOutcome::NoSla => {}
            TrackerOutcome::Notified => {
                totals.breached += 1;
                totals.notified += 1;
            }
            TrackerOutcome::NotifyFailed => {
                totals.breached += 1;
                totals.notify_failures += 1;
            }
            TrackerOutcome::LostRace => totals.lost_races += 1,
            TrackerOutcome::Failed(_) => totals.errors += 1,
        }
    }

    fn spawn_breach(
        self: &Arc<Self>,
        tracker: SlaTracker,
        overdue_by: TimeDelta,
    ) -> JoinHandle<TrackerOutcome> {
        // Counted before the spawn so a concurrent `wait_for_breaches` sees it.
        let guard = BreachTaskGuard::enter(self);
        let poller = Arc::clone(self);
        tokio::spawn(async move {
            let _guard = guard;
            let outcome = poller.handle_breach(&tracker, overdue_by).await;
            poller.record_outcome(&outcome);
            outcome
        })
    }

    /// Wait until no breach task is running.
    async fn wait_for_breaches(&self) {
        loop {
            let idle = self.breach_idle.notified();
            tokio::pin!(idle);
            idle.as_mut().enable();
            if self.breach_tasks.load(Ordering::SeqCst) == 0 {
                return;
            }
            idle.await;
        }
    }

    async fn handle_breach(&self, tracker: &SlaTracker, overdue_by: TimeDelta) -> TrackerOutcome {
        match self.repo.mark_breached(tracker.id).await {
            Ok(true) => {}
            Ok(false) => {
                info!(
                    tracker_id = %tracker.id,
                    ticket_id = %tracker.ticket_id,
                    "tracker already transitioned elsewhere, skipping"
                );
                return TrackerOutcome::LostRace;
            }
            Err(e) => {
                error!(
                    tracker_id = %tracker.id,
                    ticket_id = %tracker.ticket_id,
                    error = %e,
                    "failed to mark tracker breached"
                );
                return TrackerOutcome::Failed(format!("{}: {e}", tracker.id));
            }
        }

        warn!(
            tracker_id = %tracker.id,
            ticket_id = %tracker.ticket_id,
            sla = %tracker.sla_name,
            overdue_secs = overdue_by.num_seconds(),
            "SLA breached"
        );

        // The transition has committed; a lost audit row must not undo it.
        let entry = HistoryEntry::sla_breached(&tracker.ticket_id, self.clock.now());
        if let Err(e) = self.repo.append_history(&entry).await {
            error!(
                tracker_id = %tracker.id,
                ticket_id = %tracker.ticket_id,
                error = %e,
                "failed to append ticket history"
            );
        }

        if self.notify_breach(tracker, overdue_by).await {
            TrackerOutcome::Notified
        } else {
            TrackerOutcome::NotifyFailed
        }
    }

    /// Send the breach alert on every configured channel. Returns `true` if
    /// all of them succeeded.
    async fn notify_breach(&self, tracker: &SlaTracker, overdue_by: TimeDelta) -> bool {
        let data = self.breach_data(tracker, overdue_by);
        let subject = format!(
            "SLA breached: {} on ticket {}",
            tracker.sla_name, tracker.ticket_id
        );
        let mut ok = true;

        if let Err(e) = self
            .dispatcher
            .send_email(&self.settings.ops_email, &subject, BREACH_TEMPLATE, &data)
            .await
        {
            error!(
                tracker_id = %tracker.id,
                ticket_id = %tracker.ticket_id,
                to = %self.settings.ops_email,
                error = %e,
                "breach email not sent"
            );
            ok = false;
        }

        if let Some(url) = &self.settings.teams_webhook_url {
            if let Err(e) = self
                .dispatcher
                .send_teams_webhook(url, BREACH_TEMPLATE, &data)
                .await
            {
                error!(
                    tracker_id = %tracker.id,
                    ticket_id = %tracker.ticket_id,
                    error = %e,
                    "breach teams card not sent"
                );
                ok = false;
            }
        }

        ok
    }

    fn breach_data(&self, tracker: &SlaTracker, overdue_by: TimeDelta) -> TemplateData {
        let breach_time = tracker
            .breach_time
            .map(|t| t.to_rfc3339_opts(SecondsFormat::Secs, true))
            .unwrap_or_default();
        let app_url = &self.settings.app_url;
        let mut data = TemplateData::new();
        data.insert("ticketId".into(), tracker.ticket_id.clone());
        data.insert("slaName".into(), tracker.sla_name.clone());
        data.insert("breachTime".into(), breach_time);
        data.insert("overdueBy".into(), overdue_minutes(overdue_by).to_string());
        data.insert("appUrl".into(), app_url.clone());
        data.insert(
            "ticketUrl".into(),
            format!("{app_url}/tickets/{}", tracker.ticket_id),
        );
        data
    }

    // -----------------------------------------------------------------------
    // Scheduling
    // -----------------------------------------------------------------------

    /// Start ticking every `interval`. The first tick fires one interval
    /// after start.
    ///
    /// Every tick runs as its own task, so a slow tick never delays the next
    /// one; overlapping ticks are kept safe by the conditional write alone.
    pub fn start(self: &Arc<Self>) -> Result<PollerHandle, PollerError> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(PollerError::AlreadyRunning);
        }

        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let poller = Arc::clone(self);
        let period = poller.settings.interval.max(Duration::from_millis(1));

        let join = tokio::spawn(async move {
            let mut timer = tokio::time::interval_at(Instant::now() + period, period);
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut in_flight: JoinSet<()> = JoinSet::new();
            info!(interval_ms = period.as_millis() as u64, "SLA poller started");

            loop {
                tokio::select! {
                    _ = timer.tick() => {
                        let p = Arc::clone(&poller);
                        in_flight.spawn(p.run_scheduled_tick());
                    }
                    Some(res) = in_flight.join_next(), if !in_flight.is_empty() => {
                        poller.reap(res);
                    }
                    _ = shutdown_rx.changed() => break,
                }
            }

            if !in_flight.is_empty() {
                info!(in_flight = in_flight.len(), "waiting for in-flight ticks");
            }
            while let Some(res) = in_flight.join_next().await {
                poller.reap(res);
            }
            // Ticks cut short by the timeout may have left breaches behind.
            poller.wait_for_breaches().await;
            poller.running.store(false, Ordering::SeqCst);
            info!("SLA poller stopped");
        });

        Ok(PollerHandle { shutdown_tx, join })
    }

    async fn run_scheduled_tick(self: Arc<Self>) {
        match self.settings.tick_timeout {
            Some(limit) => {
                if tokio::time::timeout(limit, self.tick()).await.is_err() {
                    warn!(
                        timeout_ms = limit.as_millis() as u64,
                        "tick exceeded its time budget; committed breaches finish in the background"
                    );
                    self.stats().totals.timed_out_ticks += 1;
                }
            }
            None => {
                self.tick().await;
            }
        }
    }

    fn reap(&self, res: Result<(), JoinError>) {
        if let Err(e) = res {
            if e.is_panic() {
                error!(error = %e, "tick panicked; scheduler continues");
                self.stats().totals.panicked_ticks += 1;
            }
        }
    }
}

/// Whole minutes overdue, rounded up so a fresh breach never reads "0 min".
fn overdue_minutes(overdue_by: TimeDelta) -> i64 {
    let ms = overdue_by.num_milliseconds().max(0);
    (ms + 59_999) / 60_000
}

/// Counts one running breach task; the last one out wakes `wait_for_breaches`.
struct BreachTaskGuard(Arc<SlaPoller>);

impl BreachTaskGuard {
    fn enter(poller: &Arc<SlaPoller>) -> Self {
        poller.breach_tasks.fetch_add(1, Ordering::SeqCst);
        Self(Arc::clone(poller))
    }
}

impl Drop for BreachTaskGuard {
    fn drop(&mut self) {
        if self.0.breach_tasks.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.0.breach_idle.notify_waiters();
        }
    }
}

// ---------------------------------------------------------------------------
// PollerHandle
// ---------------------------------------------------------------------------

/// Owns a started poller. Dropping the handle without calling `stop` also
/// stops the timer, but doesn't wait for in-flight ticks.
pub struct PollerHandle {
    shutdown_tx: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl PollerHandle {
    /// Stop the timer and wait for in-flight ticks and breach tasks to finish.
    pub async fn stop(self) {
        let _ = self.shutdown_tx.send(true);
        if let Err(e) = self.join.await {
            error!(error = %e, "poller task ended abnormally");
        }
    }
}
