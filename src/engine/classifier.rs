/// Classifier capability: how an upstream classification turn is obtained.
///
/// Two capabilities exist behind one seam. `Incremental` streams the turn and
/// lets the engine watch for tool-call deltas inline; `SingleShot` buffers a
/// non-streaming completion and reads the tool call off it. Both feed the
/// same splice-and-dispatch path in the engine.
use crate::config::{ClassifierMode, UpstreamConfig};
use crate::error::EdgeError;
use crate::protocol::{ChatMessage, Completion, Envelope};
use crate::stream::CompletedToolCall;
use crate::transport::HttpTransport;

/// Prompt for the follow-up turn issued after a department dispatch.
pub const SUMMARY_PROMPT: &str = "Summarize the current status for the customer.";

const THREAD_ID_HEADER: &str = "lb-thread-id";

/// A turn that resolved in one exchange (single-shot capability).
#[derive(Debug)]
pub struct ResolvedTurn {
    pub envelope: Envelope,
    pub content: Option<String>,
    pub tool_call: Option<CompletedToolCall>,
}

/// The body of one upstream turn.
pub enum TurnBody {
    /// Incremental SSE body, re-streamed while watching for tool calls.
    Streamed(reqwest::Response),
    /// Fully-buffered completion.
    Resolved(ResolvedTurn),
}

/// One upstream turn plus the thread id the upstream answered with.
pub struct Turn {
    pub body: TurnBody,
    pub thread_id: Option<String>,
}

/// Client for the upstream chatbot that performs classification turns.
pub struct Classifier {
    mode: ClassifierMode,
    chat_url: String,
    api_key: String,
    model: String,
    tools: serde_json::Value,
}

impl Classifier {
    #[must_use]
    pub fn new(upstream: &UpstreamConfig) -> Self {
        Self {
            mode: upstream.classifier_mode,
            chat_url: upstream.chat_url.clone(),
            api_key: upstream.api_key.clone(),
            model: upstream.model.clone(),
            tools: crate::departments::tool_specs(),
        }
    }

    #[must_use]
    pub fn missing_credential(&self) -> bool {
        self.api_key.is_empty()
    }

    /// First turn of an exchange, seeded by the caller's messages.
    ///
    /// # Errors
    ///
    /// Returns [`EdgeError::UpstreamUnavailable`] on transport failure, a
    /// non-success status, or (single-shot) an unreadable completion body.
    pub async fn begin_turn(
        &self,
        transport: &HttpTransport,
        messages: &[ChatMessage],
        thread_id: Option<&str>,
    ) -> Result<Turn, EdgeError> {
        let messages = serde_json::to_value(messages)
            .map_err(|err| EdgeError::Decode(format!("failed to serialize messages: {err}")))?;
        self.run_turn(transport, messages, thread_id).await
    }

    /// Follow-up turn on the same thread after a department dispatch.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`Classifier::begin_turn`].
    pub async fn summary_turn(
        &self,
        transport: &HttpTransport,
        thread_id: Option<&str>,
    ) -> Result<Turn, EdgeError> {
        let messages = serde_json::to_value([ChatMessage::user(SUMMARY_PROMPT)])
            .map_err(|err| EdgeError::Decode(format!("failed to serialize messages: {err}")))?;
        self.run_turn(transport, messages, thread_id).await
    }

    async fn run_turn(
        &self,
        transport: &HttpTransport,
        messages: serde_json::Value,
        thread_id: Option<&str>,
    ) -> Result<Turn, EdgeError> {
        let mut body = serde_json::json!({
            "model": self.model,
            "messages": messages,
            "tools": self.tools,
            "stream": self.mode == ClassifierMode::Incremental,
        });
        if let Some(thread_id) = thread_id {
            body["threadId"] = serde_json::Value::String(thread_id.to_string());
        }

        let response = transport
            .post_json(&self.chat_url, &self.api_key, &body)
            .await
            .map_err(|err| EdgeError::UpstreamUnavailable {
                status: 0,
                message: err.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(EdgeError::UpstreamUnavailable {
                status: status.as_u16(),
                message: status
                    .canonical_reason()
                    .unwrap_or("Unknown Status")
                    .to_string(),
            });
        }

        // The upstream's thread id wins; fall back to the caller's.
        let thread_id = response
            .headers()
            .get(THREAD_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .filter(|value| !value.is_empty())
            .map(str::to_string)
            .or_else(|| thread_id.map(str::to_string));

        match self.mode {
            ClassifierMode::Incremental => Ok(Turn {
                body: TurnBody::Streamed(response),
                thread_id,
            }),
            ClassifierMode::SingleShot => {
                let raw = response
                    .text()
                    .await
                    .map_err(|err| EdgeError::UpstreamUnavailable {
                        status: status.as_u16(),
                        message: format!("failed to read completion body: {err}"),
                    })?;
                let completion: Completion = serde_json::from_str(&raw).map_err(|err| {
                    EdgeError::UpstreamUnavailable {
                        status: status.as_u16(),
                        message: format!("invalid completion payload: {err}"),
                    }
                })?;
                Ok(Turn {
                    body: TurnBody::Resolved(resolve_completion(completion)),
                    thread_id,
                })
            }
        }
    }
}

fn resolve_completion(completion: Completion) -> ResolvedTurn {
    let envelope = completion.envelope();
    let Some(choice) = completion.choices.into_iter().next() else {
        return ResolvedTurn {
            envelope,
            content: None,
            tool_call: None,
        };
    };

    let content = choice.message.content.filter(|content| !content.is_empty());
    let tool_call = choice
        .message
        .tool_calls
        .and_then(|calls| calls.into_iter().next())
        .and_then(|call| match serde_json::from_str(&call.function.arguments) {
            Ok(arguments) => Some(CompletedToolCall {
                name: call.function.name,
                arguments,
            }),
            Err(err) => {
                tracing::debug!(
                    function = %call.function.name,
                    error = %err,
                    "dropping tool call with malformed arguments"
                );
                None
            }
        });

    ResolvedTurn {
        envelope,
        content,
        tool_call,
    }
}
