use std::sync::Arc;

use axum::body::Body;
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use http::header::{CACHE_CONTROL, CONNECTION, CONTENT_TYPE};
use http::{HeaderMap, HeaderValue, StatusCode};

use crate::engine::classifier::Turn;
use crate::engine::relay_stream;
use crate::error::EdgeError;
use crate::protocol::ChatRequest;
use crate::state::AppState;

const THREAD_ID_HEADER: &str = "lb-thread-id";

/// Handle `POST /`: validate the request, run the first classification turn,
/// and answer with the relayed SSE stream.
///
/// The first upstream turn happens here, before the response is committed,
/// so an unavailable upstream is still a clean 500 with no partial SSE body.
pub async fn handler(state: Arc<AppState>, headers: &HeaderMap, body: Bytes) -> Response {
    if let Some(name) = state.missing_credential() {
        tracing::error!(credential = %name, "refusing request, credential missing");
        return EdgeError::ConfigMissing(name).into_response();
    }

    let request: ChatRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(err) => {
            return EdgeError::RequestMalformed(format!("Invalid request body: {err}"))
                .into_response()
        }
    };
    if request.messages.is_empty() {
        return EdgeError::RequestMalformed("Invalid or empty messages array".to_string())
            .into_response();
    }

    // The body's threadId wins over the header when both are present.
    let thread_id = request
        .thread_id
        .clone()
        .or_else(|| header_thread_id(headers));

    let turn = match state
        .classifier
        .begin_turn(&state.transport, &request.messages, thread_id.as_deref())
        .await
    {
        Ok(turn) => turn,
        Err(err) => {
            tracing::error!(error = %err, "first upstream turn failed");
            return err.into_response();
        }
    };

    sse_response(state, turn)
}

fn header_thread_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get(THREAD_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

fn sse_response(state: Arc<AppState>, turn: Turn) -> Response {
    let thread_id = turn.thread_id.clone().unwrap_or_default();
    let thread_id_value =
        HeaderValue::from_str(&thread_id).unwrap_or_else(|_| HeaderValue::from_static(""));

    let mut response = Response::new(Body::from_stream(relay_stream(state, turn)));
    *response.status_mut() = StatusCode::OK;
    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/event-stream"));
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(CONNECTION, HeaderValue::from_static("keep-alive"));
    headers.insert(THREAD_ID_HEADER, thread_id_value);
    response
}
