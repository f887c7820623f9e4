use axum::extract::State;
use axum::Json;
use sla_core::{SlaTracker, TrackerRepository};

use crate::error::AppError;
use crate::state::AppState;

/// GET /api/trackers/running: what the next tick will evaluate.
pub async fn list_running(State(app): State<AppState>) -> Result<Json<Vec<SlaTracker>>, AppError> {
    let trackers = app.poller.repository().list_running().await?;
    Ok(Json(trackers))
}
