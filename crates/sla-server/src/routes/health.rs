use axum::Json;

/// GET /api/health. Liveness only; the tracker store is not checked.
pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}
