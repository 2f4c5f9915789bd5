//! Actual token usage reported by the upstream.

use serde_json::Value;

/// How much of a streamed response is kept for usage extraction.
pub const SSE_TAIL_BYTES: usize = 8192;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActualUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

fn first_u64(usage: &Value, keys: &[&str]) -> Option<u64> {
    keys.iter().find_map(|key| usage.get(*key).and_then(Value::as_u64))
}

/// Read a `usage` (or `usageMetadata`) object.
pub fn extract_usage_from_json(usage: &Value) -> Option<ActualUsage> {
    let input = first_u64(usage, &["prompt_tokens", "input_tokens", "promptTokenCount"]);
    let output = first_u64(usage, &["completion_tokens", "output_tokens", "candidatesTokenCount"]);

    match (input, output) {
        (None, None) => first_u64(usage, &["total_tokens", "totalTokenCount"])
            .map(|total| ActualUsage { input_tokens: 0, output_tokens: total }),
        (input, output) => Some(ActualUsage {
            input_tokens: input.unwrap_or(0),
            output_tokens: output.unwrap_or(0),
        }),
    }
}

/// Usage of a complete JSON response body.
pub fn usage_from_body(body: &[u8]) -> Option<ActualUsage> {
    let json: Value = serde_json::from_slice(body).ok()?;
    let usage = json.get("usage").or_else(|| json.get("usageMetadata"))?;
    if usage.is_null() {
        return None;
    }
    extract_usage_from_json(usage)
}

/// Usage from the last `data:` event that carries one.
pub fn usage_from_sse_tail(tail: &[u8]) -> Option<ActualUsage> {
    let text = String::from_utf8_lossy(tail);
    text.lines()
        .rev()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(str::trim)
        .filter(|data| data.contains("\"usage"))
        .find_map(|data| usage_from_body(data.as_bytes()))
}

/// Append `chunk` to `tail`, keeping only the last [`SSE_TAIL_BYTES`].
pub fn push_tail(tail: &mut Vec<u8>, chunk: &[u8]) {
    if chunk.len() >= SSE_TAIL_BYTES {
        tail.clear();
        tail.extend_from_slice(&chunk[chunk.len() - SSE_TAIL_BYTES..]);
        return;
    }
    tail.extend_from_slice(chunk);
    if tail.len() > SSE_TAIL_BYTES {
        let excess = tail.len() - SSE_TAIL_BYTES;
        tail.drain(..excess);
    }
}
