//! Wire payloads and the transport seam between the dispatcher and the inference endpoint

use async_trait::async_trait;
use dispatch_common::RequestError;
use serde::Serialize;
use serde_json::Value;

pub mod http;
#[cfg(feature = "mock")]
pub mod mock;

pub use http::HttpTransport;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletionPayload {
    pub model: String,
    pub prompt: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub ignore_eos: bool,
    pub stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repetition_penalty: Option<f32>,
    pub skip_special_tokens: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub stop: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: &str, content: impl Into<String>) -> Self {
        Self { role: role.to_string(), content: content.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatPayload {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
    pub temperature: f32,
    pub stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repetition_penalty: Option<f32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub stop: Vec<String>,
}

/// A single request body, serialized as the bare inner object.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Payload {
    Completion(CompletionPayload),
    Chat(ChatPayload),
}

impl Payload {
    pub fn path(&self) -> &'static str {
        match self {
            Payload::Completion(_) => "/v1/completions",
            Payload::Chat(_) => "/v1/chat/completions",
        }
    }

    /// The prompt as the endpoint sees it: the completion prompt, or the last user message.
    pub fn user_text(&self) -> &str {
        match self {
            Payload::Completion(p) => &p.prompt,
            Payload::Chat(p) => p
                .messages
                .iter()
                .rev()
                .find(|m| m.role == "user")
                .map(|m| m.content.as_str())
                .unwrap_or_default(),
        }
    }
}

/// Sends one payload and returns the endpoint's JSON reply. Any failure is a
/// [`RequestError`]; interpreting the reply is left to the caller.
#[async_trait]
pub trait CompletionTransport: Send + Sync {
    async fn send(&self, payload: &Payload) -> Result<Value, RequestError>;
}
