use std::path::Path;

use dispatch_common::{DispatchError, Result};

/// Turns a raw prompt into the text sent as a completion prompt.
pub trait PromptFormatter: Send + Sync {
    fn format(&self, text: &str) -> String;
}

pub struct RawFormatter;

impl PromptFormatter for RawFormatter {
    fn format(&self, text: &str) -> String { text.to_string() }
}

/// Single-turn ChatML (Qwen-style) with the assistant turn left open.
#[derive(Default)]
pub struct ChatMlFormatter {
    system: Option<String>,
}

impl ChatMlFormatter {
    pub fn new(system: Option<String>) -> Self { Self { system } }
}

impl PromptFormatter for ChatMlFormatter {
    fn format(&self, text: &str) -> String {
        let mut out = String::with_capacity(text.len() + 96);
        if let Some(system) = &self.system {
            out.push_str("<|im_start|>system\n");
            out.push_str(system);
            out.push_str("<|im_end|>\n");
        }
        out.push_str("<|im_start|>user\n");
        out.push_str(text);
        out.push_str("<|im_end|>\n<|im_start|>assistant\n");
        out
    }
}

#[derive(Debug, Clone)]
pub struct PromptTemplate {
    body: String,
}

impl PromptTemplate {
    pub const PLACEHOLDER: &'static str = "{{text}}";

    pub fn new(body: impl Into<String>) -> Result<Self> {
        let body = body.into();
        if !body.contains(Self::PLACEHOLDER) {
            return Err(DispatchError::Config(format!("prompt template lacks the {} placeholder", Self::PLACEHOLDER)));
        }
        Ok(Self { body })
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let body = std::fs::read_to_string(path).map_err(|source| DispatchError::Io { path: path.to_path_buf(), source })?;
        Self::new(body.trim())
    }

    pub fn render(&self, text: &str) -> String {
        self.body.replace(Self::PLACEHOLDER, text)
    }
}
