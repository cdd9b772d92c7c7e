use axum::response::{IntoResponse, Response};

use crate::state::AppState;

/// `GET /health` status probe.
pub fn handler(state: &AppState) -> Response {
    axum::Json(serde_json::json!({
        "status": "ok",
        "service": "deskflow",
        "uptime_secs": state.uptime_secs(),
    }))
    .into_response()
}
