use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::response::Response;
use axum::routing::post;
use axum::{Json, Router};
use deskflow_rs::config::{
    AppConfig, ClassifierMode, CorsConfig, DepartmentConfig, DepartmentsConfig, FeaturesConfig,
    ServerConfig, UpstreamConfig,
};
use deskflow_rs::routing::dispatch_request;
use deskflow_rs::state::AppState;
use serde_json::{json, Value};

fn build_state(
    upstream_url: String,
    department_url: String,
    mode: ClassifierMode,
) -> Arc<AppState> {
    let department = |url: &str| DepartmentConfig {
        chat_url: url.to_string(),
        api_key: "dept-secret".to_string(),
    };
    let config = AppConfig {
        server: ServerConfig::default(),
        upstream: UpstreamConfig {
            chat_url: upstream_url,
            api_key: "upstream-secret".to_string(),
            model: "gpt-4o-mini".to_string(),
            classifier_mode: mode,
        },
        departments: DepartmentsConfig {
            sports: department(&department_url),
            electronics: department(&department_url),
            travel: department(&department_url),
        },
        cors: CorsConfig::default(),
        features: FeaturesConfig::default(),
    };
    Arc::new(AppState::new(config))
}

async fn spawn_server(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind mock server");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    format!("http://{addr}")
}

// -- SSE fixture builders (upstream side) --

fn role_chunk(id: &str) -> Value {
    json!({
        "id": id, "created": 1_700_000_000_u64, "model": "gpt-4o-mini",
        "choices": [{"index": 0, "delta": {"role": "assistant"}, "finish_reason": null}]
    })
}

fn content_chunk(id: &str, text: &str) -> Value {
    json!({
        "id": id, "created": 1_700_000_000_u64, "model": "gpt-4o-mini",
        "choices": [{"index": 0, "delta": {"content": text}, "finish_reason": null}]
    })
}

fn tool_call_chunk(id: &str, name: Option<&str>, arguments: &str) -> Value {
    let function = match name {
        Some(name) => json!({"name": name, "arguments": arguments}),
        None => json!({"arguments": arguments}),
    };
    json!({
        "id": id, "created": 1_700_000_000_u64, "model": "gpt-4o-mini",
        "choices": [{
            "index": 0,
            "delta": {"tool_calls": [{"index": 0, "function": function}]},
            "finish_reason": null
        }]
    })
}

fn finish_chunk(id: &str, reason: &str) -> Value {
    json!({
        "id": id, "created": 1_700_000_000_u64, "model": "gpt-4o-mini",
        "choices": [{"index": 0, "delta": {}, "finish_reason": reason}]
    })
}

fn sse_body(frames: &[Value]) -> String {
    let mut out = String::new();
    for frame in frames {
        out.push_str("data: ");
        out.push_str(&frame.to_string());
        out.push_str("\n\n");
    }
    out.push_str("data: [DONE]\n\n");
    out
}

fn sse_response_with_thread(body: String, thread_id: &str) -> Response {
    Response::builder()
        .header("content-type", "text/event-stream")
        .header("lb-thread-id", thread_id)
        .body(Body::from(body))
        .expect("build mock response")
}

/// An upstream whose first turn emits a sports tool call split across two
/// fragments and whose second (summary) turn emits plain content.
fn streaming_upstream(
    calls: Arc<AtomicUsize>,
    seen: Arc<Mutex<Vec<Value>>>,
) -> Router {
    Router::new().route(
        "/chat",
        post(move |Json(request): Json<Value>| {
            let calls = calls.clone();
            let seen = seen.clone();
            async move {
                seen.lock().unwrap().push(request);
                let turn = calls.fetch_add(1, Ordering::SeqCst);
                let body = if turn == 0 {
                    sse_body(&[
                        role_chunk("chatcmpl-1"),
                        tool_call_chunk(
                            "chatcmpl-1",
                            Some("call_sports_department"),
                            "{\"customerQuery\":",
                        ),
                        tool_call_chunk("chatcmpl-1", None, "\"my sneakers broke\"}"),
                        finish_chunk("chatcmpl-1", "tool_calls"),
                    ])
                } else {
                    sse_body(&[
                        role_chunk("chatcmpl-2"),
                        content_chunk("chatcmpl-2", "Your sports ticket has been filed."),
                        finish_chunk("chatcmpl-2", "stop"),
                    ])
                };
                sse_response_with_thread(body, "thread-123")
            }
        }),
    )
}

fn recording_department(seen: Arc<Mutex<Vec<Value>>>, completion: &'static str) -> Router {
    Router::new().route(
        "/chat",
        post(move |Json(request): Json<Value>| {
            let seen = seen.clone();
            async move {
                seen.lock().unwrap().push(request);
                Json(json!({ "completion": completion }))
            }
        }),
    )
}

fn failing_department(status: StatusCode) -> Router {
    Router::new().route("/chat", post(move || async move { status }))
}

async fn post_chat(state: Arc<AppState>, body: Value) -> Response {
    let request = Request::builder()
        .method("POST")
        .uri("/")
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(&body).expect("serialize")))
        .expect("build request");
    dispatch_request(state, request).await.expect("dispatch")
}

async fn body_string(response: Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read response body");
    String::from_utf8(bytes.to_vec()).expect("utf-8 body")
}

/// Decode `(id, content)` of every content frame in an outgoing SSE body.
fn content_frames(body: &str) -> Vec<(String, String)> {
    body.split("\n\n")
        .filter_map(|frame| frame.strip_prefix("data: "))
        .filter(|payload| *payload != "[DONE]")
        .filter_map(|payload| serde_json::from_str::<Value>(payload).ok())
        .filter_map(|event| {
            let content = event["choices"][0]["delta"]["content"].as_str()?.to_string();
            let id = event["id"].as_str().unwrap_or_default().to_string();
            Some((id, content))
        })
        .collect()
}

#[tokio::test]
async fn test_streaming_sports_flow_end_to_end() {
    let upstream_calls = Arc::new(AtomicUsize::new(0));
    let upstream_seen = Arc::new(Mutex::new(Vec::new()));
    let department_seen = Arc::new(Mutex::new(Vec::new()));

    let upstream_url = spawn_server(streaming_upstream(
        Arc::clone(&upstream_calls),
        Arc::clone(&upstream_seen),
    ))
    .await;
    let department_url = spawn_server(recording_department(
        Arc::clone(&department_seen),
        r#"{"Ticket No.": 42, "Classification": "sports"}"#,
    ))
    .await;

    let state = build_state(
        format!("{upstream_url}/chat"),
        format!("{department_url}/chat"),
        ClassifierMode::Incremental,
    );

    let response = post_chat(
        state,
        json!({"messages": [{"role": "user", "content": "my sneakers broke"}]}),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get("content-type").unwrap(),
        "text/event-stream"
    );
    assert_eq!(response.headers().get("lb-thread-id").unwrap(), "thread-123");
    assert_eq!(
        response.headers().get("access-control-allow-origin").unwrap(),
        "*"
    );

    let body = body_string(response).await;
    assert!(body.ends_with("data: [DONE]\n\n"), "body was: {body}");
    assert_eq!(body.matches("[DONE]").count(), 1);

    let frames = content_frames(&body);
    // Department splice first (stamped with the triggering turn's envelope),
    // then the summary turn's content.
    assert_eq!(
        frames[0],
        ("chatcmpl-1".to_string(), "Ticket No. 42".to_string())
    );
    assert_eq!(
        frames[1],
        (
            "chatcmpl-2".to_string(),
            "Your sports ticket has been filed.".to_string()
        )
    );

    // The department received the extracted customer query on the thread the
    // upstream assigned.
    let department_requests = department_seen.lock().unwrap();
    assert_eq!(department_requests.len(), 1);
    assert_eq!(
        department_requests[0]["messages"][0]["content"],
        "my sneakers broke"
    );
    assert_eq!(department_requests[0]["threadId"], "thread-123");

    // The upstream was consulted twice: classification, then summary.
    let upstream_requests = upstream_seen.lock().unwrap();
    assert_eq!(upstream_requests.len(), 2);
    assert_eq!(
        upstream_requests[1]["messages"][0]["content"],
        "Summarize the current status for the customer."
    );
    assert_eq!(upstream_requests[1]["threadId"], "thread-123");
}

#[tokio::test]
async fn test_department_failure_degrades_to_apology() {
    let upstream_calls = Arc::new(AtomicUsize::new(0));
    let upstream_seen = Arc::new(Mutex::new(Vec::new()));

    let upstream_url = spawn_server(streaming_upstream(
        Arc::clone(&upstream_calls),
        upstream_seen,
    ))
    .await;
    let department_url = spawn_server(failing_department(StatusCode::SERVICE_UNAVAILABLE)).await;

    let state = build_state(
        format!("{upstream_url}/chat"),
        format!("{department_url}/chat"),
        ClassifierMode::Incremental,
    );

    let response = post_chat(
        state,
        json!({"messages": [{"role": "user", "content": "my sneakers broke"}]}),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_string(response).await;
    assert!(body.ends_with("data: [DONE]\n\n"), "body was: {body}");

    let frames = content_frames(&body);
    let apology = &frames[0].1;
    assert!(apology.contains("sports"), "apology was: {apology}");
    assert!(apology.contains("503"), "apology was: {apology}");
    assert!(apology.contains("unavailable"), "apology was: {apology}");
}

#[tokio::test]
async fn test_empty_messages_rejected_without_upstream_call() {
    let upstream_calls = Arc::new(AtomicUsize::new(0));
    let upstream_seen = Arc::new(Mutex::new(Vec::new()));
    let upstream_url = spawn_server(streaming_upstream(
        Arc::clone(&upstream_calls),
        upstream_seen,
    ))
    .await;
    let department_url = spawn_server(failing_department(StatusCode::SERVICE_UNAVAILABLE)).await;

    let state = build_state(
        format!("{upstream_url}/chat"),
        format!("{department_url}/chat"),
        ClassifierMode::Incremental,
    );

    let response = post_chat(state, json!({"messages": []})).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = body_string(response).await;
    let payload: Value = serde_json::from_str(&body).expect("json error body");
    assert_eq!(payload["error"], "Invalid or empty messages array");
    assert_eq!(upstream_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_method_gating_and_preflight() {
    let upstream_url = spawn_server(streaming_upstream(
        Arc::new(AtomicUsize::new(0)),
        Arc::new(Mutex::new(Vec::new())),
    ))
    .await;
    let state = build_state(
        format!("{upstream_url}/chat"),
        format!("{upstream_url}/chat"),
        ClassifierMode::Incremental,
    );

    let request = Request::builder()
        .method("DELETE")
        .uri("/")
        .body(Body::empty())
        .expect("build request");
    let response = dispatch_request(Arc::clone(&state), request)
        .await
        .expect("dispatch");
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(
        response.headers().get("access-control-allow-origin").unwrap(),
        "*"
    );
    assert_eq!(body_string(response).await, "Method Not Allowed");

    let request = Request::builder()
        .method("OPTIONS")
        .uri("/")
        .body(Body::empty())
        .expect("build request");
    let response = dispatch_request(state, request).await.expect("dispatch");
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert_eq!(
        response
            .headers()
            .get("access-control-allow-methods")
            .unwrap(),
        "POST, OPTIONS"
    );
    assert_eq!(
        response
            .headers()
            .get("access-control-allow-headers")
            .unwrap(),
        "Content-Type, lb-thread-id"
    );
}

#[tokio::test]
async fn test_upstream_failure_is_clean_500() {
    let upstream_url = spawn_server(Router::new().route(
        "/chat",
        post(|| async { StatusCode::BAD_GATEWAY }),
    ))
    .await;
    let state = build_state(
        format!("{upstream_url}/chat"),
        format!("{upstream_url}/chat"),
        ClassifierMode::Incremental,
    );

    let response = post_chat(
        state,
        json!({"messages": [{"role": "user", "content": "hello"}]}),
    )
    .await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let body = body_string(response).await;
    assert!(body.contains("Upstream error"), "body was: {body}");
    assert!(!body.contains("data:"), "no partial SSE body expected");
}

#[tokio::test]
async fn test_body_thread_id_wins_over_header() {
    let upstream_seen = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&upstream_seen);
    // Upstream with no thread id header and no tool calls.
    let upstream_url = spawn_server(Router::new().route(
        "/chat",
        post(move |Json(request): Json<Value>| {
            let seen = seen.clone();
            async move {
                seen.lock().unwrap().push(request);
                Response::builder()
                    .header("content-type", "text/event-stream")
                    .body(Body::from(sse_body(&[
                        content_chunk("chatcmpl-7", "Hi there."),
                        finish_chunk("chatcmpl-7", "stop"),
                    ])))
                    .expect("build mock response")
            }
        }),
    ))
    .await;

    let state = build_state(
        format!("{upstream_url}/chat"),
        format!("{upstream_url}/chat"),
        ClassifierMode::Incremental,
    );

    let request = Request::builder()
        .method("POST")
        .uri("/")
        .header("content-type", "application/json")
        .header("lb-thread-id", "header-thread")
        .body(Body::from(
            serde_json::to_vec(&json!({
                "messages": [{"role": "user", "content": "hi"}],
                "threadId": "body-thread"
            }))
            .expect("serialize"),
        ))
        .expect("build request");
    let response = dispatch_request(state, request).await.expect("dispatch");

    assert_eq!(response.status(), StatusCode::OK);
    // Upstream returned no thread id, so the caller's body value echoes back.
    assert_eq!(
        response.headers().get("lb-thread-id").unwrap(),
        "body-thread"
    );
    let body = body_string(response).await;
    assert!(body.contains("Hi there."));
    assert!(body.ends_with("data: [DONE]\n\n"));

    let upstream_requests = upstream_seen.lock().unwrap();
    assert_eq!(upstream_requests[0]["threadId"], "body-thread");
}

#[tokio::test]
async fn test_single_shot_classifier_flow() {
    let upstream_calls = Arc::new(AtomicUsize::new(0));
    let calls = Arc::clone(&upstream_calls);
    let upstream_url = spawn_server(Router::new().route(
        "/chat",
        post(move |Json(_): Json<Value>| {
            let calls = calls.clone();
            async move {
                let turn = calls.fetch_add(1, Ordering::SeqCst);
                let completion = if turn == 0 {
                    json!({
                        "id": "chatcmpl-10", "created": 1_700_000_000_u64, "model": "gpt-4o-mini",
                        "choices": [{
                            "message": {
                                "tool_calls": [{
                                    "function": {
                                        "name": "call_electronics_department",
                                        "arguments": "{\"customerQuery\":\"my headset hisses\"}"
                                    }
                                }]
                            },
                            "finish_reason": "tool_calls"
                        }]
                    })
                } else {
                    json!({
                        "id": "chatcmpl-11", "created": 1_700_000_001_u64, "model": "gpt-4o-mini",
                        "choices": [{
                            "message": { "content": "The electronics team has your case." },
                            "finish_reason": "stop"
                        }]
                    })
                };
                Json(completion)
            }
        }),
    ))
    .await;

    let department_seen = Arc::new(Mutex::new(Vec::new()));
    let department_url = spawn_server(recording_department(
        Arc::clone(&department_seen),
        r#"{"Case": "opened"}"#,
    ))
    .await;

    let state = build_state(
        format!("{upstream_url}/chat"),
        format!("{department_url}/chat"),
        ClassifierMode::SingleShot,
    );

    let response = post_chat(
        state,
        json!({"messages": [{"role": "user", "content": "my headset hisses"}]}),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_string(response).await;
    assert!(body.ends_with("data: [DONE]\n\n"), "body was: {body}");

    let frames = content_frames(&body);
    assert_eq!(frames[0], ("chatcmpl-10".to_string(), "Case opened".to_string()));
    assert_eq!(
        frames[1],
        (
            "chatcmpl-11".to_string(),
            "The electronics team has your case.".to_string()
        )
    );

    let department_requests = department_seen.lock().unwrap();
    assert_eq!(
        department_requests[0]["messages"][0]["content"],
        "my headset hisses"
    );
    assert_eq!(upstream_calls.load(Ordering::SeqCst), 2);
}
