use axum::extract::State;
use axum::Json;

use crate::poller::{PollerStatus, TickReport};
use crate::state::AppState;

/// GET /api/poller: scheduler state, last tick and running totals.
pub async fn get_status(State(app): State<AppState>) -> Json<PollerStatus> {
    Json(app.poller.status())
}

/// POST /api/poller/tick: run one pass now, alongside any scheduled ticks.
///
/// A client disconnect drops the wait, not the breaches already found.
pub async fn run_tick(State(app): State<AppState>) -> Json<TickReport> {
    Json(app.poller.tick().await)
}
