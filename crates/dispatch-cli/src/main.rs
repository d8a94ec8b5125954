use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use dispatch_common::config::DispatchConfig;
use dispatch_core::output::{write_results, write_stats};
use dispatch_core::{load_prompts, Dispatcher, ResultRecord};
use dispatch_transport::HttpTransport;
use indicatif::{ProgressBar, ProgressStyle};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod args;

use args::{CheckArgs, Cli, Commands, RunArgs};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    match cli.command {
        Commands::Run(args) => run(args).await,
        Commands::Check(args) => check(args),
        Commands::Version => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

async fn run(args: RunArgs) -> anyhow::Result<()> {
    let mut cfg = DispatchConfig::load().context("failed to load configuration")?;
    args.apply(&mut cfg);
    cfg.validate()?;
    dispatch_obs::init();

    // Load errors end the run here, before any request is sent.
    let prompts = load_prompts(&cfg.input_path)?;
    let transport = HttpTransport::new(&cfg.base_url, cfg.timeout())?;
    tracing::info!(target: "dispatch", "sending {} prompts to {} ({:?})", prompts.len(), cfg.base_url(), cfg.endpoint);

    let dispatcher = Dispatcher::new(&cfg, Arc::new(transport))?.with_progress(progress_bar()?);
    let outcome = dispatcher.run(prompts).await?;

    write_results(&cfg.results_path, &outcome.records)?;
    let stats_path = cfg.stats_path();
    write_stats(&stats_path, &outcome.stats)?;
    if let Some(path) = &args.metrics_file {
        std::fs::write(path, dispatch_obs::render()).with_context(|| format!("failed to write metrics to {}", path.display()))?;
    }

    report_failures(&outcome.records);
    println!("{}", outcome.stats);
    println!("Results written to {}", cfg.results_path.display());
    println!("Statistics written to {}", stats_path.display());
    Ok(())
}

fn check(args: CheckArgs) -> anyhow::Result<()> {
    let prompts = load_prompts(&args.input_file)?;
    println!("{}: {} prompts", args.input_file.display(), prompts.len());
    Ok(())
}

fn report_failures(records: &[ResultRecord]) {
    for record in records {
        if let Some(error) = record.error() {
            tracing::warn!(target: "dispatch", id = record.id, prompt = %record.prompt, "failed: {}", error);
        }
    }
}

fn progress_bar() -> anyhow::Result<ProgressBar> {
    let bar = ProgressBar::new(0);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg} ({eta})")?
            .progress_chars("#>-"),
    );
    Ok(bar)
}

fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
    );

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
