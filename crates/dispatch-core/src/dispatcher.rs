use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use dispatch_common::config::{DispatchConfig, EndpointKind, ExecutionStrategy};
use dispatch_common::{DispatchError, Result};
use dispatch_transport::CompletionTransport;
use indicatif::ProgressBar;
use tokio::sync::{mpsc, Mutex};
use tokio::task::{JoinError, JoinSet};

use crate::format::{ChatMlFormatter, PromptFormatter, PromptTemplate, RawFormatter};
use crate::gate::ConcurrencyGate;
use crate::source::PromptRecord;
use crate::stats::BatchStats;
use crate::store::{ResultRecord, ResultStore};
use crate::worker::{RequestSettings, RequestWorker};

#[derive(Debug)]
pub struct BatchOutcome {
    /// In submission order.
    pub records: Vec<ResultRecord>,
    pub stats: BatchStats,
}

pub struct Dispatcher {
    gate: Arc<ConcurrencyGate>,
    strategy: ExecutionStrategy,
    transport: Arc<dyn CompletionTransport>,
    formatter: Arc<dyn PromptFormatter>,
    template: Option<Arc<PromptTemplate>>,
    settings: Arc<RequestSettings>,
    progress: ProgressBar,
}

impl Dispatcher {
    pub fn new(config: &DispatchConfig, transport: Arc<dyn CompletionTransport>) -> Result<Self> {
        config.validate()?;
        let formatter: Arc<dyn PromptFormatter> = match config.endpoint {
            EndpointKind::Completions => Arc::new(ChatMlFormatter::new(config.system_prompt())),
            EndpointKind::Chat => Arc::new(RawFormatter),
        };
        let template = match &config.template_path {
            Some(path) => Some(Arc::new(PromptTemplate::from_file(path)?)),
            None => None,
        };
        Ok(Self {
            gate: Arc::new(ConcurrencyGate::new(config.concurrency)?),
            strategy: config.strategy,
            transport,
            formatter,
            template,
            settings: Arc::new(RequestSettings::from(config)),
            progress: ProgressBar::hidden(),
        })
    }

    pub fn with_formatter(mut self, formatter: Arc<dyn PromptFormatter>) -> Self {
        self.formatter = formatter;
        self
    }

    pub fn with_template(mut self, template: PromptTemplate) -> Self {
        self.template = Some(Arc::new(template));
        self
    }

    /// Advanced once per finished request; its length is set to the batch size.
    pub fn with_progress(mut self, bar: ProgressBar) -> Self {
        self.progress = bar;
        self
    }

    pub fn gate(&self) -> &ConcurrencyGate { &self.gate }

    /// Runs every prompt to a terminal outcome. Individual request failures
    /// are recorded, never returned.
    pub async fn run(&self, prompts: Vec<PromptRecord>) -> Result<BatchOutcome> {
        let total = prompts.len();
        let store = Arc::new(ResultStore::new(&prompts));
        let worker = RequestWorker::new(
            self.transport.clone(),
            self.formatter.clone(),
            self.template.clone(),
            self.settings.clone(),
            store.clone(),
        );
        let progress = Arc::new(Progress::new(self.progress.clone(), total));
        tracing::info!(target: "dispatch", total, concurrency = self.gate.limit(), strategy = ?self.strategy, "dispatching batch");

        let started = Instant::now();
        match self.strategy {
            ExecutionStrategy::Tasks => self.run_tasks(&worker, prompts, &progress).await,
            ExecutionStrategy::Pool => self.run_pool(&worker, prompts, &progress).await,
        }
        let elapsed = started.elapsed();
        progress.finish();

        drop(worker);
        let store = Arc::try_unwrap(store).map_err(|_| DispatchError::Join("result store still referenced after join".into()))?;
        let records = store.finish();
        let stats = BatchStats::compute(&records, elapsed);
        tracing::info!(target: "dispatch", "{}", stats);
        Ok(BatchOutcome { records, stats })
    }

    /// Admission first, then spawn: at most K tasks exist at any time.
    async fn run_tasks(&self, worker: &RequestWorker, prompts: Vec<PromptRecord>, progress: &Arc<Progress>) {
        let mut tasks = JoinSet::new();
        for (slot, record) in prompts.into_iter().enumerate() {
            let permit = match self.gate.acquire().await {
                Ok(permit) => permit,
                Err(e) => {
                    worker.reject(slot, &record, &e.to_string());
                    progress.advance(false);
                    continue;
                }
            };
            let worker = worker.clone();
            let progress = progress.clone();
            tasks.spawn(async move {
                let succeeded = worker.run(slot, record, permit).await;
                progress.advance(succeeded);
            });
            while let Some(joined) = tasks.try_join_next() {
                reap(joined);
            }
        }
        while let Some(joined) = tasks.join_next().await {
            reap(joined);
        }
    }

    /// K long-lived workers draining a shared queue, each still admitted
    /// through the gate per request.
    async fn run_pool(&self, worker: &RequestWorker, prompts: Vec<PromptRecord>, progress: &Arc<Progress>) {
        let workers = self.gate.limit().min(prompts.len());
        let (tx, rx) = mpsc::channel::<(usize, PromptRecord)>(self.gate.limit());
        let rx = Arc::new(Mutex::new(rx));
        let mut pool = JoinSet::new();
        for _ in 0..workers {
            let rx = rx.clone();
            let gate = self.gate.clone();
            let worker = worker.clone();
            let progress = progress.clone();
            pool.spawn(async move {
                loop {
                    let next = rx.lock().await.recv().await;
                    let Some((slot, record)) = next else { break };
                    let succeeded = match gate.acquire().await {
                        Ok(permit) => worker.run(slot, record, permit).await,
                        Err(e) => {
                            worker.reject(slot, &record, &e.to_string());
                            false
                        }
                    };
                    progress.advance(succeeded);
                }
            });
        }
        for job in prompts.into_iter().enumerate() {
            if tx.send(job).await.is_err() {
                tracing::error!(target: "dispatch", "worker pool exited before the queue drained");
                break;
            }
        }
        drop(tx);
        while let Some(joined) = pool.join_next().await {
            reap(joined);
        }
    }
}

fn reap(joined: std::result::Result<(), JoinError>) {
    if let Err(e) = joined {
        tracing::error!(target: "dispatch", "worker task failed: {}", e);
    }
}

struct Progress {
    bar: ProgressBar,
    failed: AtomicUsize,
}

impl Progress {
    fn new(bar: ProgressBar, total: usize) -> Self {
        bar.set_length(total as u64);
        bar.set_position(0);
        Self { bar, failed: AtomicUsize::new(0) }
    }

    fn advance(&self, succeeded: bool) {
        if !succeeded {
            let failed = self.failed.fetch_add(1, Ordering::Relaxed) + 1;
            self.bar.set_message(format!("{failed} failed"));
        }
        self.bar.inc(1);
    }

    fn finish(&self) {
        let failed = self.failed.load(Ordering::Relaxed);
        self.bar.finish_with_message(format!("{failed} failed"));
    }
}
