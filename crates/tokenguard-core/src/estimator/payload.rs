//! Completion request shape, as far as estimation cares.
//!
//! Unknown fields are ignored; the original bytes are what gets forwarded.

use serde::Deserialize;
use serde_json::Value;

/// Chat or text completion request body.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct CompletionRequest {
    pub model: Option<String>,
    pub messages: Option<Vec<ChatMessage>>,
    pub prompt: Option<Prompt>,
    #[serde(alias = "max_completion_tokens")]
    pub max_tokens: Option<u64>,
    pub stream: bool,
}

impl CompletionRequest {
    /// Parse a request body. An empty body is an empty request.
    pub fn from_slice(body: &[u8]) -> Result<Self, serde_json::Error> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }
        serde_json::from_slice(body)
    }
}

/// One role/content pair of a conversation.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct ChatMessage {
    pub role: String,
    pub content: Option<MessageContent>,
}

/// Message content: plain text, multimodal parts, or anything else.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<Value>),
    Other(Value),
}

impl ChatMessage {
    /// Text that counts toward the estimate.
    ///
    /// Parts contribute their `text` fields; non-text parts count nothing.
    pub fn content_text(&self) -> String {
        match &self.content {
            None => String::new(),
            Some(MessageContent::Text(text)) => text.clone(),
            Some(MessageContent::Parts(parts)) => parts
                .iter()
                .filter_map(|part| match part {
                    Value::String(s) => Some(s.as_str()),
                    Value::Object(obj) => obj.get("text").and_then(Value::as_str),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join(" "),
            Some(MessageContent::Other(Value::Null)) => String::new(),
            Some(MessageContent::Other(value)) => value.to_string(),
        }
    }
}

/// Legacy completion prompt.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Prompt {
    Single(String),
    Batch(Vec<String>),
}

impl Prompt {
    pub fn texts(&self) -> Vec<&str> {
        match self {
            Self::Single(s) => vec![s.as_str()],
            Self::Batch(items) => items.iter().map(String::as_str).collect(),
        }
    }
}
