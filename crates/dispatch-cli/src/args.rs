use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use dispatch_common::config::{DispatchConfig, EndpointKind, ExecutionStrategy};

#[derive(Parser, Debug)]
#[command(name = "dispatch", version, about = "Batch text generation against an OpenAI-compatible endpoint")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Send every prompt in the input file and write results and stats
    Run(RunArgs),
    /// Validate an input file without sending anything
    Check(CheckArgs),
    Version,
}

/// Flags override values from `DISPATCH_CONFIG` and `DISPATCH_*`.
#[derive(Args, Debug, Default)]
pub struct RunArgs {
    #[arg(short, long)]
    pub model: Option<String>,
    /// Endpoint base URL, e.g. localhost:8001
    #[arg(short, long)]
    pub url: Option<String>,
    #[arg(long)]
    pub input_file: Option<PathBuf>,
    #[arg(long)]
    pub results_file: Option<PathBuf>,
    /// Defaults to <input>_stats.json
    #[arg(long)]
    pub stats_file: Option<PathBuf>,
    /// Maximum requests in flight
    #[arg(short = 'c', long)]
    pub concurrent_request: Option<usize>,
    #[arg(long)]
    pub endpoint: Option<EndpointKind>,
    #[arg(long)]
    pub strategy: Option<ExecutionStrategy>,
    #[arg(long)]
    pub timeout_secs: Option<u64>,
    #[arg(long)]
    pub max_tokens: Option<u32>,
    #[arg(long)]
    pub temperature: Option<f32>,
    #[arg(long)]
    pub ignore_eos: bool,
    #[arg(long)]
    pub system_prompt: Option<String>,
    /// Template file with a {{text}} placeholder
    #[arg(long)]
    pub template: Option<PathBuf>,
    /// Write prometheus metrics here after the run
    #[arg(long)]
    pub metrics_file: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct CheckArgs {
    pub input_file: PathBuf,
}

impl RunArgs {
    pub fn apply(&self, cfg: &mut DispatchConfig) {
        if let Some(v) = &self.model { cfg.model = v.clone(); }
        if let Some(v) = &self.url { cfg.base_url = v.clone(); }
        if let Some(v) = &self.input_file { cfg.input_path = v.clone(); }
        if let Some(v) = &self.results_file { cfg.results_path = v.clone(); }
        if let Some(v) = &self.stats_file { cfg.stats_path = Some(v.clone()); }
        if let Some(v) = self.concurrent_request { cfg.concurrency = v; }
        if let Some(v) = self.endpoint { cfg.endpoint = v; }
        if let Some(v) = self.strategy { cfg.strategy = v; }
        if let Some(v) = self.timeout_secs { cfg.timeout_secs = v; }
        if let Some(v) = self.max_tokens { cfg.sampling.max_tokens = Some(v); }
        if let Some(v) = self.temperature { cfg.sampling.temperature = Some(v); }
        if self.ignore_eos { cfg.sampling.ignore_eos = Some(true); }
        if let Some(v) = &self.system_prompt { cfg.system_prompt = Some(v.clone()); }
        if let Some(v) = &self.template { cfg.template_path = Some(v.clone()); }
    }
}
