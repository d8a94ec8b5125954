use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use dispatch_common::{DispatchError, Result};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptRecord {
    /// Zero-based position among the non-blank input lines.
    pub id: usize,
    pub text: String,
}

/// Reads a JSONL prompt file. Any bad line fails the whole load.
pub fn load_prompts(path: impl AsRef<Path>) -> Result<Vec<PromptRecord>> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|source| DispatchError::Io { path: path.to_path_buf(), source })?;
    let records = parse_prompts(BufReader::new(file), path)?;
    tracing::debug!(target: "dispatch", "loaded {} prompts from {}", records.len(), path.display());
    Ok(records)
}

pub fn parse_prompts<R: BufRead>(reader: R, path: &Path) -> Result<Vec<PromptRecord>> {
    let mut records = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line.map_err(|source| DispatchError::Io { path: path.to_path_buf(), source })?;
        if line.trim().is_empty() {
            continue;
        }
        let load_err = |reason: String| DispatchError::Load { path: path.to_path_buf(), line: idx + 1, reason };
        let value: Value = serde_json::from_str(&line).map_err(|e| load_err(format!("invalid JSON: {e}")))?;
        let Value::Object(mut fields) = value else {
            return Err(load_err("record is not a JSON object".into()));
        };
        let text = match fields.remove("prompt") {
            Some(Value::String(text)) => text,
            Some(_) => return Err(load_err("`prompt` is not a string".into())),
            None => return Err(load_err("missing required field `prompt`".into())),
        };
        records.push(PromptRecord { id: records.len(), text });
    }
    Ok(records)
}
