use std::sync::OnceLock;

use dispatch_common::{DispatchError, Result};

use crate::source::PromptRecord;

pub const UNRECORDED: &str = "worker exited without recording a result";

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Response(String),
    Error(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResultRecord {
    pub id: usize,
    pub prompt: String,
    pub outcome: Outcome,
}

impl ResultRecord {
    pub fn response(&self) -> Option<&str> {
        match &self.outcome { Outcome::Response(text) => Some(text), Outcome::Error(_) => None }
    }
    pub fn error(&self) -> Option<&str> {
        match &self.outcome { Outcome::Error(msg) => Some(msg), Outcome::Response(_) => None }
    }
    pub fn is_success(&self) -> bool { matches!(self.outcome, Outcome::Response(_)) }
}

struct Slot {
    id: usize,
    prompt: String,
    outcome: OnceLock<Outcome>,
}

/// One write-once slot per submitted prompt, addressed by submission
/// position. Each slot keeps its record's id, so ids need not be `0..N`.
/// Writers to distinct slots never contend; the slot vector never grows.
pub struct ResultStore {
    slots: Box<[Slot]>,
}

impl ResultStore {
    pub fn new(prompts: &[PromptRecord]) -> Self {
        let slots = prompts.iter().map(|p| Slot { id: p.id, prompt: p.text.clone(), outcome: OnceLock::new() }).collect();
        Self { slots }
    }

    pub fn len(&self) -> usize { self.slots.len() }
    pub fn is_empty(&self) -> bool { self.slots.is_empty() }

    pub fn write(&self, slot: usize, outcome: Outcome) -> Result<()> {
        let cell = self.slots.get(slot).ok_or(DispatchError::Store { slot, reason: "no such slot" })?;
        cell.outcome.set(outcome).map_err(|_| DispatchError::Store { slot, reason: "already written" })
    }

    pub fn outcome(&self, slot: usize) -> Option<&Outcome> {
        self.slots.get(slot).and_then(|s| s.outcome.get())
    }

    pub fn completed(&self) -> usize {
        self.slots.iter().filter(|s| s.outcome.get().is_some()).count()
    }

    /// Records in submission order. A slot nobody wrote becomes an error
    /// outcome so every record still yields exactly one result.
    pub fn finish(self) -> Vec<ResultRecord> {
        self.slots
            .into_vec()
            .into_iter()
            .map(|slot| {
                let outcome = slot.outcome.into_inner().unwrap_or_else(|| {
                    tracing::error!(target: "dispatch", id = slot.id, "{}", UNRECORDED);
                    Outcome::Error(UNRECORDED.to_string())
                });
                ResultRecord { id: slot.id, prompt: slot.prompt, outcome }
            })
            .collect()
    }
}
