/// Outgoing SSE frame construction.
///
/// Every frame the client receives has the same `chat.completion.chunk`
/// shape, whether the content came from the upstream model or from a
/// department completion. The envelope fields are always copied from the
/// upstream event that triggered the emission.
use crate::protocol::Envelope;
use crate::util::{push_json_string_escaped, push_u64_decimal};

fn push_chunk_prefix(out: &mut String, envelope: &Envelope) {
    out.push_str("data: {\"id\":");
    push_json_string_escaped(out, &envelope.id);
    out.push_str(",\"object\":\"chat.completion.chunk\",\"created\":");
    push_u64_decimal(out, envelope.created);
    out.push_str(",\"model\":");
    push_json_string_escaped(out, &envelope.model);
}

/// Format one content frame: `data: {...}\n\n`.
#[must_use]
pub fn content_frame(envelope: &Envelope, index: u32, text: &str) -> String {
    let mut out = String::with_capacity(128 + envelope.id.len() + envelope.model.len() + text.len());
    push_chunk_prefix(&mut out, envelope);
    out.push_str(",\"choices\":[{\"index\":");
    push_u64_decimal(&mut out, u64::from(index));
    out.push_str(",\"delta\":{\"content\":");
    push_json_string_escaped(&mut out, text);
    out.push_str("},\"finish_reason\":null}]}\n\n");
    out
}

/// Format an assistant role announcement frame.
#[must_use]
pub fn role_frame(envelope: &Envelope, index: u32, role: &str) -> String {
    let mut out = String::with_capacity(128 + envelope.id.len() + envelope.model.len() + role.len());
    push_chunk_prefix(&mut out, envelope);
    out.push_str(",\"choices\":[{\"index\":");
    push_u64_decimal(&mut out, u64::from(index));
    out.push_str(",\"delta\":{\"role\":");
    push_json_string_escaped(&mut out, role);
    out.push_str("},\"finish_reason\":null}]}\n\n");
    out
}

/// Format a finish frame with an empty delta.
#[must_use]
pub fn finish_frame(envelope: &Envelope, index: u32, reason: &str) -> String {
    let mut out = String::with_capacity(128 + envelope.id.len() + envelope.model.len() + reason.len());
    push_chunk_prefix(&mut out, envelope);
    out.push_str(",\"choices\":[{\"index\":");
    push_u64_decimal(&mut out, u64::from(index));
    out.push_str(",\"delta\":{},\"finish_reason\":");
    push_json_string_escaped(&mut out, reason);
    out.push_str("}]}\n\n");
    out
}
