//! Shared error types and configuration for the dispatch workspace

use std::path::PathBuf;
use std::time::Duration;

pub type Result<T> = core::result::Result<T, DispatchError>;

/// Errors that abort a whole batch.
#[derive(thiserror::Error, Debug)]
pub enum DispatchError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{}:{line}: {reason}", path.display())]
    Load { path: PathBuf, line: usize, reason: String },
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("result slot {slot}: {reason}")]
    Store { slot: usize, reason: &'static str },
    #[error("failed to write {}: {reason}", path.display())]
    Output { path: PathBuf, reason: String },
    #[error("worker task failed: {0}")]
    Join(String),
    #[error("admission gate closed")]
    GateClosed,
}

/// Errors confined to a single request. These never abort the batch; they
/// end up as the error outcome of the request's result record.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum RequestError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("endpoint returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("malformed reply: {0}")]
    MalformedReply(String),
    #[error("reply has no choices")]
    MissingChoices,
}

pub mod config {
    use serde::{Deserialize, Serialize};
    use std::env;
    use std::path::{Path, PathBuf};
    use std::str::FromStr;
    use std::time::Duration;

    use crate::{DispatchError, Result};

    pub const DEFAULT_STOP: [&str; 5] = ["<|end_of_text|>", "<|eot_id|>", "<|endoftext|>", "<|im_end|>", "<|eom_id|>"];

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
    #[serde(rename_all = "lowercase")]
    pub enum EndpointKind {
        /// `/v1/completions`, prompt formatted client side
        #[default]
        Completions,
        /// `/v1/chat/completions`, server applies its chat template
        Chat,
    }

    impl FromStr for EndpointKind {
        type Err = String;
        fn from_str(s: &str) -> core::result::Result<Self, Self::Err> {
            match s.to_ascii_lowercase().as_str() {
                "completions" | "completion" => Ok(Self::Completions),
                "chat" => Ok(Self::Chat),
                other => Err(format!("unknown endpoint kind `{other}` (expected completions or chat)")),
            }
        }
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
    #[serde(rename_all = "lowercase")]
    pub enum ExecutionStrategy {
        /// One task per admitted request, spawned only after admission.
        #[default]
        Tasks,
        /// K long-lived workers pulling requests from a queue.
        Pool,
    }

    impl FromStr for ExecutionStrategy {
        type Err = String;
        fn from_str(s: &str) -> core::result::Result<Self, Self::Err> {
            match s.to_ascii_lowercase().as_str() {
                "tasks" | "task" => Ok(Self::Tasks),
                "pool" => Ok(Self::Pool),
                other => Err(format!("unknown strategy `{other}` (expected tasks or pool)")),
            }
        }
    }

    pub const DEFAULT_CHAT_SYSTEM_PROMPT: &str = "You are a helpful assistant.";

    /// Resolved sampling parameters for one endpoint kind.
    #[derive(Debug, Clone, PartialEq)]
    pub struct SamplingParams {
        pub max_tokens: u32,
        pub temperature: f32,
        pub ignore_eos: bool,
        pub seed: Option<u64>,
        pub top_p: Option<f32>,
        pub repetition_penalty: Option<f32>,
        pub skip_special_tokens: bool,
        /// Only sent when `ignore_eos` is false.
        pub stop: Vec<String>,
    }

    impl SamplingParams {
        /// Completions run greedy with a fixed seed and the end-of-turn stop
        /// list; chat uses the server's template with nucleus sampling.
        pub fn for_endpoint(kind: EndpointKind) -> Self {
            match kind {
                EndpointKind::Completions => Self {
                    max_tokens: 8192,
                    temperature: 0.0,
                    ignore_eos: false,
                    seed: Some(42),
                    top_p: None,
                    repetition_penalty: None,
                    skip_special_tokens: true,
                    stop: DEFAULT_STOP.iter().map(|s| s.to_string()).collect(),
                },
                EndpointKind::Chat => Self {
                    max_tokens: 8192,
                    temperature: 0.7,
                    ignore_eos: false,
                    seed: None,
                    top_p: Some(0.8),
                    repetition_penalty: Some(1.05),
                    skip_special_tokens: true,
                    stop: Vec::new(),
                },
            }
        }
    }

    /// Sampling values set explicitly in YAML or on the command line. Unset
    /// fields fall back to the endpoint's defaults.
    #[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
    #[serde(default)]
    pub struct SamplingOverrides {
        pub max_tokens: Option<u32>,
        pub temperature: Option<f32>,
        pub ignore_eos: Option<bool>,
        pub seed: Option<u64>,
        pub top_p: Option<f32>,
        pub repetition_penalty: Option<f32>,
        pub skip_special_tokens: Option<bool>,
        pub stop: Option<Vec<String>>,
    }

    impl SamplingOverrides {
        pub fn resolve(&self, kind: EndpointKind) -> SamplingParams {
            let mut p = SamplingParams::for_endpoint(kind);
            if let Some(v) = self.max_tokens { p.max_tokens = v; }
            if let Some(v) = self.temperature { p.temperature = v; }
            if let Some(v) = self.ignore_eos { p.ignore_eos = v; }
            if let Some(v) = self.seed { p.seed = Some(v); }
            if let Some(v) = self.top_p { p.top_p = Some(v); }
            if let Some(v) = self.repetition_penalty { p.repetition_penalty = Some(v); }
            if let Some(v) = self.skip_special_tokens { p.skip_special_tokens = v; }
            if let Some(v) = &self.stop { p.stop = v.clone(); }
            p
        }
    }

    #[derive(Debug, Clone, Deserialize, Serialize)]
    #[serde(default)]
    pub struct DispatchConfig {
        pub model: String,
        pub base_url: String,
        pub input_path: PathBuf,
        pub results_path: PathBuf,
        pub stats_path: Option<PathBuf>,
        pub concurrency: usize,
        pub timeout_secs: u64,
        pub endpoint: EndpointKind,
        pub strategy: ExecutionStrategy,
        pub sampling: SamplingOverrides,
        /// An empty string disables the chat endpoint's default system turn.
        pub system_prompt: Option<String>,
        pub template_path: Option<PathBuf>,
    }

    impl Default for DispatchConfig {
        fn default() -> Self {
            Self {
                model: "llama2-7b-hf".into(),
                base_url: "localhost:8001".into(),
                input_path: PathBuf::from("prompts.jsonl"),
                results_path: PathBuf::from("results.jsonl"),
                stats_path: None,
                concurrency: 10,
                timeout_secs: 1200,
                endpoint: EndpointKind::default(),
                strategy: ExecutionStrategy::default(),
                sampling: SamplingOverrides::default(),
                system_prompt: None,
                template_path: None,
            }
        }
    }

    impl DispatchConfig {
        /// Defaults, then the YAML file named by `DISPATCH_CONFIG`, then `DISPATCH_*` overrides.
        pub fn load() -> Result<Self> {
            let mut cfg = match env::var("DISPATCH_CONFIG") {
                Ok(path) => Self::from_yaml_file(path)?,
                Err(_) => Self::default(),
            };
            cfg.apply_overrides(|key| env::var(key).ok());
            Ok(cfg)
        }

        pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
            let path = path.as_ref();
            let text = std::fs::read_to_string(path)
                .map_err(|source| DispatchError::Io { path: path.to_path_buf(), source })?;
            serde_yaml::from_str(&text)
                .map_err(|e| DispatchError::Config(format!("{}: {e}", path.display())))
        }

        /// Unparsable numeric or enum values are ignored, like unset ones.
        pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
            if let Some(v) = lookup("DISPATCH_MODEL") { self.model = v; }
            if let Some(v) = lookup("DISPATCH_URL") { self.base_url = v; }
            if let Some(v) = lookup("DISPATCH_INPUT") { self.input_path = PathBuf::from(v); }
            if let Some(v) = lookup("DISPATCH_RESULTS") { self.results_path = PathBuf::from(v); }
            if let Some(v) = lookup("DISPATCH_STATS") { self.stats_path = Some(PathBuf::from(v)); }
            if let Some(v) = lookup("DISPATCH_CONCURRENCY").and_then(|v| v.parse().ok()) { self.concurrency = v; }
            if let Some(v) = lookup("DISPATCH_TIMEOUT_SECS").and_then(|v| v.parse().ok()) { self.timeout_secs = v; }
            if let Some(v) = lookup("DISPATCH_ENDPOINT").and_then(|v| v.parse().ok()) { self.endpoint = v; }
            if let Some(v) = lookup("DISPATCH_STRATEGY").and_then(|v| v.parse().ok()) { self.strategy = v; }
        }

        pub fn validate(&self) -> Result<()> {
            if self.concurrency == 0 {
                return Err(DispatchError::Config("concurrency must be at least 1".into()));
            }
            if self.model.trim().is_empty() {
                return Err(DispatchError::Config("model name is empty".into()));
            }
            if self.base_url.trim().is_empty() {
                return Err(DispatchError::Config("endpoint base URL is empty".into()));
            }
            if self.timeout_secs == 0 {
                return Err(DispatchError::Config("request timeout must be positive".into()));
            }
            Ok(())
        }

        pub fn sampling(&self) -> SamplingParams { self.sampling.resolve(self.endpoint) }

        /// Configured system prompt; chat falls back to a generic assistant turn.
        pub fn system_prompt(&self) -> Option<String> {
            match (&self.system_prompt, self.endpoint) {
                (Some(text), _) if text.is_empty() => None,
                (Some(text), _) => Some(text.clone()),
                (None, EndpointKind::Chat) => Some(DEFAULT_CHAT_SYSTEM_PROMPT.to_string()),
                (None, EndpointKind::Completions) => None,
            }
        }

        pub fn timeout(&self) -> Duration { Duration::from_secs(self.timeout_secs) }

        pub fn base_url(&self) -> String { normalize_base_url(&self.base_url) }

        /// Configured stats path, or `<input without extension>_stats.json`.
        pub fn stats_path(&self) -> PathBuf {
            if let Some(path) = &self.stats_path {
                return path.clone();
            }
            let stem = self.input_path.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_else(|| "batch".into());
            self.input_path.with_file_name(format!("{stem}_stats.json"))
        }
    }

    pub fn normalize_base_url(raw: &str) -> String {
        let trimmed = raw.trim().trim_end_matches('/');
        if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
            trimmed.to_string()
        } else {
            format!("http://{trimmed}")
        }
    }
}
