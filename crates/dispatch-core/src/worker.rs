use std::sync::Arc;
use std::time::Duration;

use dispatch_common::config::{DispatchConfig, EndpointKind, SamplingParams};
use dispatch_common::RequestError;
use dispatch_transport::{ChatMessage, ChatPayload, CompletionPayload, CompletionTransport, Payload};
use serde::Deserialize;
use serde_json::Value;

use crate::format::{PromptFormatter, PromptTemplate};
use crate::gate::GatePermit;
use crate::source::PromptRecord;
use crate::store::{Outcome, ResultStore};

#[derive(Debug, Clone)]
pub struct RequestSettings {
    pub model: String,
    pub endpoint: EndpointKind,
    pub sampling: SamplingParams,
    pub system_prompt: Option<String>,
    pub timeout: Duration,
}

impl From<&DispatchConfig> for RequestSettings {
    fn from(cfg: &DispatchConfig) -> Self {
        Self {
            model: cfg.model.clone(),
            endpoint: cfg.endpoint,
            sampling: cfg.sampling(),
            system_prompt: cfg.system_prompt(),
            timeout: cfg.timeout(),
        }
    }
}

/// Executes single requests and records their outcome in the shared store.
#[derive(Clone)]
pub struct RequestWorker {
    transport: Arc<dyn CompletionTransport>,
    formatter: Arc<dyn PromptFormatter>,
    template: Option<Arc<PromptTemplate>>,
    settings: Arc<RequestSettings>,
    store: Arc<ResultStore>,
}

impl RequestWorker {
    pub fn new(
        transport: Arc<dyn CompletionTransport>,
        formatter: Arc<dyn PromptFormatter>,
        template: Option<Arc<PromptTemplate>>,
        settings: Arc<RequestSettings>,
        store: Arc<ResultStore>,
    ) -> Self {
        Self { transport, formatter, template, settings, store }
    }

    /// Runs one admitted request to a terminal outcome and writes it to
    /// `slot`. The permit is held for the duration and released when this
    /// returns or is dropped. Returns whether the request succeeded.
    pub async fn run(&self, slot: usize, record: PromptRecord, permit: GatePermit) -> bool {
        let _permit = permit;
        let request = dispatch_obs::request_started();
        let result = self.execute(&record).await;
        let elapsed = request.finish(result.is_ok());

        let succeeded = result.is_ok();
        let outcome = match result {
            Ok(text) => {
                tracing::debug!(target: "dispatch", id = record.id, ?elapsed, "request succeeded");
                Outcome::Response(text)
            }
            Err(e) => {
                tracing::warn!(target: "dispatch", id = record.id, ?elapsed, "request failed: {}", e);
                Outcome::Error(e.to_string())
            }
        };
        self.record(slot, record.id, outcome);
        succeeded
    }

    /// Marks a record failed without sending it, for requests that never got admitted.
    pub fn reject(&self, slot: usize, record: &PromptRecord, reason: &str) {
        tracing::warn!(target: "dispatch", id = record.id, "request not sent: {}", reason);
        self.record(slot, record.id, Outcome::Error(reason.to_string()));
    }

    fn record(&self, slot: usize, id: usize, outcome: Outcome) {
        if let Err(e) = self.store.write(slot, outcome) {
            tracing::error!(target: "dispatch", id, "{}", e);
        }
    }

    pub async fn execute(&self, record: &PromptRecord) -> Result<String, RequestError> {
        let payload = self.build_payload(&record.text);
        let reply = match tokio::time::timeout(self.settings.timeout, self.transport.send(&payload)).await {
            Ok(reply) => reply?,
            Err(_) => return Err(RequestError::Timeout(self.settings.timeout)),
        };
        extract_text(self.settings.endpoint, &reply)
    }

    pub fn build_payload(&self, text: &str) -> Payload {
        let rendered = match &self.template {
            Some(template) => template.render(text),
            None => text.to_string(),
        };
        let s = &self.settings;
        let stop = if s.sampling.ignore_eos { Vec::new() } else { s.sampling.stop.clone() };
        match s.endpoint {
            EndpointKind::Completions => Payload::Completion(CompletionPayload {
                model: s.model.clone(),
                prompt: self.formatter.format(&rendered),
                max_tokens: s.sampling.max_tokens,
                temperature: s.sampling.temperature,
                ignore_eos: s.sampling.ignore_eos,
                stream: false,
                seed: s.sampling.seed,
                top_p: s.sampling.top_p,
                repetition_penalty: s.sampling.repetition_penalty,
                skip_special_tokens: s.sampling.skip_special_tokens,
                stop,
            }),
            EndpointKind::Chat => {
                let mut messages = Vec::with_capacity(2);
                if let Some(system) = &s.system_prompt {
                    messages.push(ChatMessage::new("system", system.clone()));
                }
                messages.push(ChatMessage::new("user", rendered));
                Payload::Chat(ChatPayload {
                    model: s.model.clone(),
                    messages,
                    max_tokens: s.sampling.max_tokens,
                    temperature: s.sampling.temperature,
                    stream: false,
                    seed: s.sampling.seed,
                    top_p: s.sampling.top_p,
                    repetition_penalty: s.sampling.repetition_penalty,
                    stop,
                })
            }
        }
    }
}

#[derive(Deserialize)]
struct Reply {
    #[serde(default)]
    choices: Option<Vec<Choice>>,
}

#[derive(Deserialize)]
struct Choice {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    message: Option<ChoiceMessage>,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Pulls the generated text out of the first choice. A reply without
/// choices is a failure, never an empty response.
pub fn extract_text(kind: EndpointKind, reply: &Value) -> Result<String, RequestError> {
    let reply = Reply::deserialize(reply).map_err(|e| RequestError::MalformedReply(e.to_string()))?;
    let Some(first) = reply.choices.and_then(|c| c.into_iter().next()) else {
        return Err(RequestError::MissingChoices);
    };
    let text = match kind {
        EndpointKind::Completions => first.text,
        EndpointKind::Chat => first.message.and_then(|m| m.content),
    };
    text.ok_or_else(|| RequestError::MalformedReply(match kind {
        EndpointKind::Completions => "first choice has no `text`".into(),
        EndpointKind::Chat => "first choice has no `message.content`".into(),
    }))
}
