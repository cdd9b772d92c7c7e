/// Accumulates fragments of a single in-flight tool call.
///
/// The upstream emits a tool call as a named first fragment followed by any
/// number of argument-text fragments. The accumulator buffers them until the
/// argument text is syntactically complete, then hands the finished call to
/// the caller and returns to idle.
use serde_json::Value;

/// A tool call whose argument buffer resolved to well-formed JSON.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletedToolCall {
    pub name: String,
    pub arguments: Value,
}

impl CompletedToolCall {
    /// The customer query carried in the call's arguments, empty if absent.
    #[must_use]
    pub fn customer_query(&self) -> &str {
        self.arguments
            .get("customerQuery")
            .and_then(Value::as_str)
            .unwrap_or_default()
    }
}

#[derive(Debug, Default)]
struct PendingToolCall {
    name: String,
    arguments: String,
}

/// Two-state machine: idle, or accumulating exactly one pending call.
///
/// Only one call is tracked at a time. A named fragment arriving while a
/// call is already pending overwrites the pending state; this drops the
/// half-built call and is a known limitation of the upstream contract, not
/// an error.
#[derive(Debug, Default)]
pub struct ToolCallAccumulator {
    pending: Option<PendingToolCall>,
}

impl ToolCallAccumulator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_accumulating(&self) -> bool {
        self.pending.is_some()
    }

    /// Feed one fragment. Returns the completed call once the buffered
    /// argument text ends with `}` and parses as JSON.
    ///
    /// The completion test is deliberately a heuristic: a parse failure means
    /// "not yet complete" and accumulation continues. A `}` inside a string
    /// value therefore never resolves the call early unless the whole buffer
    /// happens to parse.
    pub fn feed(&mut self, name: Option<&str>, arguments_fragment: &str) -> Option<CompletedToolCall> {
        match (name, self.pending.as_mut()) {
            (Some(name), _) => {
                self.pending = Some(PendingToolCall {
                    name: name.to_string(),
                    arguments: arguments_fragment.to_string(),
                });
            }
            (None, Some(pending)) => pending.arguments.push_str(arguments_fragment),
            // Argument text with no call in flight; nothing to attach it to.
            (None, None) => return None,
        }

        self.try_resolve()
    }

    fn try_resolve(&mut self) -> Option<CompletedToolCall> {
        let pending = self.pending.as_ref()?;
        if !pending.arguments.trim_end().ends_with('}') {
            return None;
        }
        let arguments: Value = serde_json::from_str(&pending.arguments).ok()?;
        let pending = self.pending.take()?;
        Some(CompletedToolCall {
            name: pending.name,
            arguments,
        })
    }

    /// Drop any pending call. Used when the stream ends before resolution;
    /// an abandoned call is a no-op, not an error.
    pub fn reset(&mut self) {
        self.pending = None;
    }
}
