/// Wire types shared between the ingress handler, the upstream chatbot, and
/// the department backends.
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Ingress request
// ---------------------------------------------------------------------------

/// Body of a `POST` chat request from the client.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
    #[serde(default, rename = "threadId")]
    pub thread_id: Option<String>,
}

/// One conversation message. Unknown fields are carried along so the message
/// reaches the upstream chatbot unmodified.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    #[serde(default)]
    pub content: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl ChatMessage {
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
            extra: serde_json::Map::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Upstream streaming chunks
// ---------------------------------------------------------------------------

/// One decoded upstream SSE chunk (`chat.completion.chunk` shape).
#[derive(Debug, Clone, Deserialize)]
pub struct StreamChunk {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub created: u64,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub choices: Vec<StreamChoice>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StreamChoice {
    #[serde(default)]
    pub index: u32,
    #[serde(default)]
    pub delta: StreamDelta,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StreamDelta {
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub tool_calls: Option<Vec<ToolCallFragment>>,
}

/// One incremental piece of a tool call. The first fragment carries the
/// function name; later fragments carry argument text only.
#[derive(Debug, Clone, Deserialize)]
pub struct ToolCallFragment {
    #[serde(default)]
    pub index: u32,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub function: Option<FunctionFragment>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FunctionFragment {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub arguments: Option<String>,
}

/// Envelope fields every outgoing frame copies from the upstream event that
/// triggered its emission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub id: String,
    pub created: u64,
    pub model: String,
}

impl Envelope {
    #[must_use]
    pub fn of_chunk(chunk: &StreamChunk) -> Self {
        Self {
            id: chunk.id.clone(),
            created: chunk.created,
            model: chunk.model.clone(),
        }
    }
}

/// One decoded upstream event, reduced to what the stream engine acts on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatDelta {
    Content(String),
    ToolCall {
        index: u32,
        name: Option<String>,
        arguments: String,
    },
}

/// Decode the deltas of one stream chunk into a caller-provided buffer.
pub fn decode_deltas(chunk: &StreamChunk, out: &mut Vec<ChatDelta>) {
    for choice in &chunk.choices {
        decode_choice_deltas(choice, out);
    }
}

/// Decode the deltas of a single choice.
///
/// Empty content deltas and fragments carrying neither a name nor argument
/// text are skipped; role-only deltas produce nothing.
pub fn decode_choice_deltas(choice: &StreamChoice, out: &mut Vec<ChatDelta>) {
    if let Some(content) = &choice.delta.content {
        if !content.is_empty() {
            out.push(ChatDelta::Content(content.clone()));
        }
    }

    if let Some(tool_calls) = &choice.delta.tool_calls {
        for fragment in tool_calls {
            let Some(function) = &fragment.function else {
                continue;
            };
            let arguments = function.arguments.clone().unwrap_or_default();
            if function.name.is_none() && arguments.is_empty() {
                continue;
            }
            out.push(ChatDelta::ToolCall {
                index: fragment.index,
                name: function.name.clone(),
                arguments,
            });
        }
    }
}

// ---------------------------------------------------------------------------
// Upstream non-streaming completion (single-shot classifier)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct Completion {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub created: u64,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub choices: Vec<CompletionChoice>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CompletionChoice {
    #[serde(default)]
    pub message: CompletionMessage,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CompletionMessage {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub tool_calls: Option<Vec<CompletedToolCallWire>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CompletedToolCallWire {
    pub function: CompletedFunctionWire,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CompletedFunctionWire {
    pub name: String,
    #[serde(default)]
    pub arguments: String,
}

impl Completion {
    #[must_use]
    pub fn envelope(&self) -> Envelope {
        Envelope {
            id: self.id.clone(),
            created: self.created,
            model: self.model.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Department reply
// ---------------------------------------------------------------------------

/// Body of a successful department response. `completion` holds a string that
/// is itself either JSON or plain text; rendering happens in `departments`.
#[derive(Debug, Clone, Deserialize)]
pub struct DepartmentReply {
    pub completion: String,
}
