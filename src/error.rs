use axum::response::{IntoResponse, Response};
use http::StatusCode;

/// Canonical error type used across all modules.
///
/// The variants mirror the failure taxonomy of the relay: the first four are
/// unrecoverable for the request and map directly to an HTTP status, the last
/// two are recovered locally by the stream engine and never reach the client
/// as an HTTP error.
#[derive(Debug, thiserror::Error)]
pub enum EdgeError {
    #[error("Invalid request: {0}")]
    RequestMalformed(String),
    #[error("Method Not Allowed")]
    MethodNotAllowed,
    #[error("Missing configuration: {0}")]
    ConfigMissing(String),
    #[error("Upstream error: status={status}, message={message}")]
    UpstreamUnavailable { status: u16, message: String },
    #[error("Department unavailable: status={status} {status_text}")]
    DepartmentUnavailable { status: u16, status_text: String },
    #[error("Decode error: {0}")]
    Decode(String),
}

impl EdgeError {
    /// True when the stream engine may absorb this error and keep streaming.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            EdgeError::DepartmentUnavailable { .. } | EdgeError::Decode(_)
        )
    }
}

/// Map an error to the HTTP status it surfaces as when unrecoverable.
#[must_use]
pub fn http_status_for(err: &EdgeError) -> StatusCode {
    match err {
        EdgeError::RequestMalformed(_) => StatusCode::BAD_REQUEST,
        EdgeError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
        EdgeError::ConfigMissing(_)
        | EdgeError::UpstreamUnavailable { .. }
        | EdgeError::DepartmentUnavailable { .. }
        | EdgeError::Decode(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Malformed requests answer with a JSON `{"error": ...}` body; everything
/// else is plain text. Recoverable variants only land here if a handler gives
/// up on recovery, in which case a plain 500 is the honest answer.
impl IntoResponse for EdgeError {
    fn into_response(self) -> Response {
        let status = http_status_for(&self);
        match self {
            EdgeError::RequestMalformed(message) => (
                status,
                axum::Json(serde_json::json!({ "error": message })),
            )
                .into_response(),
            EdgeError::MethodNotAllowed => (status, "Method Not Allowed").into_response(),
            other => (status, other.to_string()).into_response(),
        }
    }
}
