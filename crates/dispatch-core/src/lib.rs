//! Bounded-concurrency batch dispatch: load prompts, admit at most K at a
//! time, collect results in submission order, summarize.

pub mod dispatcher;
pub mod format;
pub mod gate;
pub mod output;
pub mod source;
pub mod stats;
pub mod store;
pub mod worker;

pub use dispatcher::{BatchOutcome, Dispatcher};
pub use gate::{ConcurrencyGate, GatePermit};
pub use source::{load_prompts, PromptRecord};
pub use stats::BatchStats;
pub use store::{Outcome, ResultRecord, ResultStore};
pub use worker::{RequestSettings, RequestWorker};
