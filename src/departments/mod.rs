/// Department registry and dispatch.
///
/// Three fixed specialized backends answer customer queries. The upstream
/// chatbot selects one by emitting a tool call; the dispatcher maps the
/// function name to a department, performs one bearer-authenticated POST,
/// and renders the completion payload into plain content text.
use serde_json::Value;

use crate::config::DepartmentsConfig;
use crate::error::EdgeError;
use crate::protocol::DepartmentReply;
use crate::transport::HttpTransport;

/// One of the fixed downstream department backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DepartmentKey {
    Sports,
    Electronics,
    Travel,
}

impl DepartmentKey {
    pub const ALL: [DepartmentKey; 3] = [
        DepartmentKey::Sports,
        DepartmentKey::Electronics,
        DepartmentKey::Travel,
    ];

    /// Map a tool-call function name to a department. Unknown names yield
    /// `None` and the caller ignores the call entirely.
    #[must_use]
    pub fn from_function_name(name: &str) -> Option<Self> {
        match name {
            "call_sports_department" => Some(DepartmentKey::Sports),
            "call_electronics_department" => Some(DepartmentKey::Electronics),
            "call_travel_department" => Some(DepartmentKey::Travel),
            _ => None,
        }
    }

    #[must_use]
    pub fn function_name(self) -> &'static str {
        match self {
            DepartmentKey::Sports => "call_sports_department",
            DepartmentKey::Electronics => "call_electronics_department",
            DepartmentKey::Travel => "call_travel_department",
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            DepartmentKey::Sports => "sports",
            DepartmentKey::Electronics => "electronics",
            DepartmentKey::Travel => "travel",
        }
    }

    fn tool_description(self) -> &'static str {
        match self {
            DepartmentKey::Sports => {
                "Route a customer query about sports gear or sports orders to the sports department"
            }
            DepartmentKey::Electronics => {
                "Route a customer query about electronics products to the electronics department"
            }
            DepartmentKey::Travel => {
                "Route a customer query about bookings or trips to the travel department"
            }
        }
    }

    /// The function-calling tool spec advertised to the upstream chatbot.
    #[must_use]
    pub fn tool_spec(self) -> Value {
        serde_json::json!({
            "type": "function",
            "function": {
                "name": self.function_name(),
                "description": self.tool_description(),
                "parameters": {
                    "type": "object",
                    "properties": {
                        "customerQuery": {
                            "type": "string",
                            "description": "The customer's message, verbatim"
                        }
                    },
                    "required": ["customerQuery"]
                }
            }
        })
    }
}

/// All department tool specs, in registry order.
#[must_use]
pub fn tool_specs() -> Value {
    Value::Array(DepartmentKey::ALL.iter().map(|key| key.tool_spec()).collect())
}

/// Render a department completion payload.
///
/// The payload string is optimistically parsed as a JSON object and rendered
/// as `"{first key} {first value}"`; anything else falls back to the raw
/// string. Only the first pair is rendered, in document order.
#[must_use]
pub fn render_completion(completion: &str) -> String {
    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(completion) {
        if let Some((key, value)) = map.iter().next() {
            let rendered = match value {
                Value::String(text) => text.clone(),
                other => other.to_string(),
            };
            return format!("{key} {rendered}");
        }
    }
    completion.to_string()
}

struct DepartmentRoute {
    chat_url: String,
    api_key: String,
}

/// Performs the synchronous mid-stream department call.
pub struct Dispatcher {
    routes: [DepartmentRoute; 3],
}

impl Dispatcher {
    #[must_use]
    pub fn new(config: &DepartmentsConfig) -> Self {
        let route = |department: &crate::config::DepartmentConfig| DepartmentRoute {
            chat_url: department.chat_url.clone(),
            api_key: department.api_key.clone(),
        };
        Self {
            routes: [
                route(&config.sports),
                route(&config.electronics),
                route(&config.travel),
            ],
        }
    }

    fn route(&self, key: DepartmentKey) -> &DepartmentRoute {
        match key {
            DepartmentKey::Sports => &self.routes[0],
            DepartmentKey::Electronics => &self.routes[1],
            DepartmentKey::Travel => &self.routes[2],
        }
    }

    /// True when some department credential resolved to an empty string.
    #[must_use]
    pub fn missing_credential(&self) -> Option<DepartmentKey> {
        DepartmentKey::ALL
            .into_iter()
            .find(|key| self.route(*key).api_key.is_empty())
    }

    /// Dispatch one customer query to a department and return the rendered
    /// completion text.
    ///
    /// # Errors
    ///
    /// Returns [`EdgeError::DepartmentUnavailable`] on transport failure,
    /// timeout, or a non-success HTTP status. The caller converts this into
    /// an apology chunk rather than aborting the stream.
    pub async fn dispatch(
        &self,
        transport: &HttpTransport,
        key: DepartmentKey,
        customer_query: &str,
        thread_id: Option<&str>,
    ) -> Result<String, EdgeError> {
        let route = self.route(key);
        let mut body = serde_json::json!({
            "messages": [{ "role": "user", "content": customer_query }],
        });
        if let Some(thread_id) = thread_id {
            body["threadId"] = Value::String(thread_id.to_string());
        }

        let response = transport
            .post_json(&route.chat_url, &route.api_key, &body)
            .await
            .map_err(|err| EdgeError::DepartmentUnavailable {
                status: 0,
                status_text: err.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(EdgeError::DepartmentUnavailable {
                status: status.as_u16(),
                status_text: status
                    .canonical_reason()
                    .unwrap_or("Unknown Status")
                    .to_string(),
            });
        }

        let raw = response
            .text()
            .await
            .map_err(|err| EdgeError::DepartmentUnavailable {
                status: status.as_u16(),
                status_text: format!("failed to read body: {err}"),
            })?;

        match serde_json::from_str::<DepartmentReply>(&raw) {
            Ok(reply) => Ok(render_completion(&reply.completion)),
            Err(err) => {
                // Unparseable completion payload: pass the raw text through.
                tracing::debug!(
                    department = key.as_str(),
                    error = %err,
                    "department reply is not a completion object, forwarding raw text"
                );
                Ok(raw)
            }
        }
    }
}
