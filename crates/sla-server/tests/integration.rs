use std::sync::Arc;

use axum::http::StatusCode;
use chrono::{TimeDelta, Utc};
use http_body_util::BodyExt;
use sla_core::{MemoryTrackerStore, SlaTracker, TrackerDb, TrackerRepository, TrackerStatus};
use sla_notify::{LogDelivery, NotificationDispatcher, TemplateRenderer};
use sla_server::{build_router, PollerSettings, SlaPoller};
use tempfile::TempDir;
use tower::ServiceExt;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn poller_over(repo: Arc<dyn TrackerRepository>) -> Arc<SlaPoller> {
    let dispatcher = Arc::new(NotificationDispatcher::new(
        TemplateRenderer::default(),
        Arc::new(LogDelivery),
    ));
    Arc::new(SlaPoller::new(repo, dispatcher, PollerSettings::default()))
}

/// Send a GET request via `oneshot` and return (status, parsed JSON body).
async fn get(app: axum::Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let req = axum::http::Request::builder()
        .uri(uri)
        .body(axum::body::Body::empty())
        .unwrap();
    send(app, req).await
}

/// Send an empty POST request via `oneshot`.
async fn post(app: axum::Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let req = axum::http::Request::builder()
        .method("POST")
        .uri(uri)
        .body(axum::body::Body::empty())
        .unwrap();
    send(app, req).await
}

async fn send(
    app: axum::Router,
    req: axum::http::Request<axum::body::Body>,
) -> (StatusCode, serde_json::Value) {
    let response = app.oneshot(req).await.unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
    (status, json)
}

// ---------------------------------------------------------------------------
// Routes
// ---------------------------------------------------------------------------

#[tokio::test]
async fn health_is_ok() {
    let app = build_router(poller_over(Arc::new(MemoryTrackerStore::new())));
    let (status, body) = get(app, "/api/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn poller_status_before_start_is_stopped() {
    let app = build_router(poller_over(Arc::new(MemoryTrackerStore::new())));
    let (status, body) = get(app, "/api/poller").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"], "stopped");
    assert_eq!(body["interval_ms"], 30000);
    assert_eq!(body["ticks"], 0);
    assert!(body["last_tick"].is_null());
}

#[tokio::test]
async fn running_trackers_are_listed() {
    let running = SlaTracker::new("T1", "Response Time", None);
    let paused = SlaTracker::new("T2", "Resolution Time", None);
    let store = Arc::new(MemoryTrackerStore::with_trackers([
        running.clone(),
        paused.clone(),
    ]));
    store.force_status(paused.id, TrackerStatus::Paused);

    let app = build_router(poller_over(store));
    let (status, body) = get(app, "/api/trackers/running").await;
    assert_eq!(status, StatusCode::OK);
    let list = body.as_array().unwrap();
    assert_eq!(list.len(), 1);
    assert_eq!(list[0]["ticket_id"], "T1");
}

#[tokio::test]
async fn store_failure_is_service_unavailable() {
    let store = Arc::new(MemoryTrackerStore::new());
    store.fail_list_running(true);
    let app = build_router(poller_over(store));
    let (status, body) = get(app, "/api/trackers/running").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(body["error"].as_str().is_some());
}

#[tokio::test]
async fn manual_tick_breaches_and_updates_status() {
    let overdue = SlaTracker::new("T9", "Response Time", Some(Utc::now() - TimeDelta::minutes(3)));
    let store = Arc::new(MemoryTrackerStore::with_trackers([overdue.clone()]));
    let poller = poller_over(store.clone());

    let (status, report) = post(build_router(poller.clone()), "/api/poller/tick").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["checked"], 1);
    assert_eq!(report["breached"], 1);
    assert_eq!(report["notified"], 1);
    assert_eq!(store.get(overdue.id).unwrap().status, TrackerStatus::Breached);
    assert_eq!(store.history_for_ticket("T9").len(), 1);

    let (_, status_body) = get(build_router(poller), "/api/poller").await;
    assert_eq!(status_body["ticks"], 1);
    assert_eq!(status_body["totals"]["breached"], 1);
    assert_eq!(status_body["last_tick"]["breached"], 1);
}

#[tokio::test]
async fn manual_tick_against_redb_store() {
    let dir = TempDir::new().unwrap();
    let db = TrackerDb::open(&dir.path().join("trackers.redb")).unwrap();
    let overdue = SlaTracker::new("T1", "Response Time", Some(Utc::now() - TimeDelta::seconds(5)));
    let upcoming = SlaTracker::new("T2", "Response Time", Some(Utc::now() + TimeDelta::hours(1)));
    db.insert(&overdue).unwrap();
    db.insert(&upcoming).unwrap();

    let app = build_router(poller_over(Arc::new(db.clone())));
    let (status, report) = post(app, "/api/poller/tick").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["checked"], 2);
    assert_eq!(report["breached"], 1);

    assert_eq!(db.get(overdue.id).unwrap().status, TrackerStatus::Breached);
    assert_eq!(db.get(upcoming.id).unwrap().status, TrackerStatus::Running);
    let history = db.history_for_ticket("T1").unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].new_status, "sla_breached");
}

#[tokio::test]
async fn unknown_route_is_404() {
    let app = build_router(poller_over(Arc::new(MemoryTrackerStore::new())));
    let (status, _) = get(app, "/api/nope").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
