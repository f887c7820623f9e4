//! SLA poller runtime: the scheduler plus a small status API for operators.

pub mod clock;
pub mod error;
pub mod poller;
pub mod routes;
pub mod state;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use clock::{Clock, ManualClock, SystemClock};
pub use poller::{
    PollerError, PollerHandle, PollerSettings, PollerState, PollerStatus, SlaPoller, TickReport,
    BREACH_TEMPLATE,
};
pub use state::AppState;

/// Build the status router. Used by `serve_on` and by integration tests.
pub fn build_router(poller: Arc<SlaPoller>) -> Router {
    let app_state = AppState::new(poller);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/health", get(routes::health::health))
        // Poller
        .route("/api/poller", get(routes::poller::get_status))
        .route("/api/poller/tick", post(routes::poller::run_tick))
        // Trackers
        .route(
            "/api/trackers/running",
            get(routes::trackers::list_running),
        )
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(app_state)
}

/// Serve the status API on a pre-bound listener until `shutdown` resolves.
///
/// Taking a bound listener lets the caller pass port 0 and read back the
/// port the OS picked.
pub async fn serve_on(
    poller: Arc<SlaPoller>,
    listener: tokio::net::TcpListener,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let port = listener.local_addr()?.port();
    let app = build_router(poller);

    tracing::info!("SLA status API listening on http://localhost:{port}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}
