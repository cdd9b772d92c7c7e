use std::convert::Infallible;
use std::sync::Arc;

use axum::body::{self, Body};
use axum::http::{Method, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use http::header::{
    HeaderValue, ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS,
    ACCESS_CONTROL_ALLOW_ORIGIN, ACCESS_CONTROL_EXPOSE_HEADERS,
};

use crate::api::{chat, health};
use crate::error::EdgeError;
use crate::state::AppState;

const DEFAULT_BODY_LIMIT_BYTES: usize = 2 * 1024 * 1024;

/// Dispatch a raw HTTP request to the matching handler.
///
/// The surface is method-gated: `OPTIONS` answers the CORS preflight for any
/// path, `POST /` is the chat endpoint, `GET /health` is the status probe,
/// and every other method gets a 405. CORS headers are stamped on every
/// response on the way out.
///
/// # Errors
///
/// This function currently never returns `Err` and uses `Infallible`.
pub async fn dispatch_request(
    state: Arc<AppState>,
    request: Request<Body>,
) -> Result<Response, Infallible> {
    let (parts, request_body) = request.into_parts();
    let allowed_origin = state.config.cors.allowed_origin.clone();
    let path = parts.uri.path();

    let response = if parts.method == Method::OPTIONS {
        StatusCode::NO_CONTENT.into_response()
    } else if parts.method == Method::POST {
        if path == "/" {
            match read_request_body(request_body).await {
                Ok(body_bytes) => chat::handler(state, &parts.headers, body_bytes).await,
                Err(response) => response,
            }
        } else {
            StatusCode::NOT_FOUND.into_response()
        }
    } else if parts.method == Method::GET && path == "/health" {
        health::handler(&state)
    } else {
        EdgeError::MethodNotAllowed.into_response()
    };

    Ok(apply_cors(response, &allowed_origin))
}

fn apply_cors(mut response: Response, allowed_origin: &str) -> Response {
    let origin = HeaderValue::from_str(allowed_origin)
        .unwrap_or_else(|_| HeaderValue::from_static("*"));
    let headers = response.headers_mut();
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, origin);
    headers.insert(
        ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("POST, OPTIONS"),
    );
    headers.insert(
        ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type, lb-thread-id"),
    );
    headers.insert(
        ACCESS_CONTROL_EXPOSE_HEADERS,
        HeaderValue::from_static("lb-thread-id"),
    );
    response
}

async fn read_request_body(request_body: Body) -> Result<bytes::Bytes, Response> {
    body::to_bytes(request_body, DEFAULT_BODY_LIMIT_BYTES)
        .await
        .map_err(|_| {
            (
                StatusCode::PAYLOAD_TOO_LARGE,
                "Request body too large (max 2MiB)",
            )
                .into_response()
        })
}
