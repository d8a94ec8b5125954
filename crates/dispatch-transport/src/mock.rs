use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use dispatch_common::RequestError;
use serde_json::{json, Value};

use crate::{CompletionTransport, Payload};

#[derive(Debug, Clone)]
pub enum MockReply {
    Json(Value),
    Fail(RequestError),
    /// Never answers; only a caller-side timeout ends the request.
    Hang,
}

/// Scripted endpoint keyed by the payload's user text. Unscripted prompts get
/// an `echo:<text>` reply shaped for the payload kind.
#[derive(Default)]
pub struct MockTransport {
    script: Mutex<HashMap<String, MockReply>>,
    latency: Duration,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl MockTransport {
    pub fn new() -> Self { Self::default() }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn on(self, prompt: impl Into<String>, reply: MockReply) -> Self {
        if let Ok(mut script) = self.script.lock() {
            script.insert(prompt.into(), reply);
        }
        self
    }

    pub fn calls(&self) -> usize { self.calls.load(Ordering::SeqCst) }
    pub fn peak_in_flight(&self) -> usize { self.peak.load(Ordering::SeqCst) }

    fn scripted(&self, key: &str) -> Option<MockReply> {
        self.script.lock().ok().and_then(|s| s.get(key).cloned())
    }
}

pub fn completion_reply(text: &str) -> Value {
    json!({ "object": "text_completion", "choices": [{ "index": 0, "text": text, "finish_reason": "stop" }] })
}

pub fn chat_reply(text: &str) -> Value {
    json!({
        "object": "chat.completion",
        "choices": [{ "index": 0, "message": { "role": "assistant", "content": text }, "finish_reason": "stop" }]
    })
}

struct InFlight<'a>(&'a AtomicUsize);
impl Drop for InFlight<'_> { fn drop(&mut self) { self.0.fetch_sub(1, Ordering::SeqCst); } }

#[async_trait]
impl CompletionTransport for MockTransport {
    async fn send(&self, payload: &Payload) -> Result<Value, RequestError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlight(&self.in_flight);

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        let key = payload.user_text();
        match self.scripted(key) {
            Some(MockReply::Json(v)) => Ok(v),
            Some(MockReply::Fail(e)) => Err(e),
            Some(MockReply::Hang) => std::future::pending().await,
            None => {
                let text = format!("echo:{key}");
                Ok(match payload {
                    Payload::Completion(_) => completion_reply(&text),
                    Payload::Chat(_) => chat_reply(&text),
                })
            }
        }
    }
}
