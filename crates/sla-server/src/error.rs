use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use sla_core::SlaError;

// ---------------------------------------------------------------------------
// AppError
// ---------------------------------------------------------------------------

/// Unified error type for HTTP responses.
#[derive(Debug)]
pub struct AppError(pub anyhow::Error);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match self.0.downcast_ref::<SlaError>() {
            Some(SlaError::TrackerNotFound(_)) => StatusCode::NOT_FOUND,
            Some(SlaError::InvalidStatus(_)) => StatusCode::BAD_REQUEST,
            Some(SlaError::InvalidTransition { .. }) => StatusCode::CONFLICT,
            Some(SlaError::Store(_)) => StatusCode::SERVICE_UNAVAILABLE,
            Some(
                SlaError::InvalidConfig(_)
                | SlaError::Io(_)
                | SlaError::Yaml(_)
                | SlaError::Json(_),
            )
            | None => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = serde_json::json!({ "error": self.0.to_string() });
        (status, axum::Json(body)).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}
