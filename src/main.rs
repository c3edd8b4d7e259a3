use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use chrono::Utc;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use copyforge::batch::{Batch, BatchCoordinator};
use copyforge::cli::{Cli, Command, QuotaAction};
use copyforge::config::ForgeConfig;
use copyforge::events::{EventSink, FanoutSink, TracingSink};
use copyforge::processor::{JobDecision, JobProcessor};
use copyforge::provider::{ContentProvider, HttpProvider, ProviderSelector};
use copyforge::qc::HeuristicEvaluator;
use copyforge::quota::QuotaGuard;
use copyforge::state_machine::{Job, JobInput};
use copyforge::store::{BatchStore, CheckpointStore, FileStore, JobStore, QuotaStore};
use copyforge::{ForgeError, telemetry, ui};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    telemetry::init(cli.verbose);

    let config = match &cli.config {
        Some(path) => ForgeConfig::load_from(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => ForgeConfig::load()?,
    }
    .with_overrides(cli.chunk_size, cli.concurrency)?;

    let store = Arc::new(
        FileStore::open(&config.store_dir)
            .with_context(|| format!("opening store at {}", config.store_dir))?,
    );
    let app = App { config, store };

    match cli.command {
        Command::Submit { file, run } => {
            let inputs: Vec<JobInput> = read_json(&file)?;
            // Submitting only persists records; no provider is needed.
            let quota = app.quota().await?;
            let coordinator =
                app.coordinator(ProviderSelector::new(Vec::new()), quota, Arc::new(TracingSink));
            let batch = coordinator.submit(inputs, app.config.chunk_size).await?;
            println!("{}", batch.id);
            if run {
                app.run_batch(&batch.id).await?;
            }
        }
        Command::Run { batch_id } | Command::Resume { batch_id } => {
            app.run_batch(&batch_id).await?;
        }
        Command::Status { batch_id } => {
            let mut batch = app.load_batch(&batch_id).await?;
            if let Some(record) = app.store.load_checkpoint(&batch.id).await? {
                batch.advance_checkpoint(record.checkpoint_index);
            }
            ui::print_batch(&batch);
        }
        Command::Job { file, id } => match (file, id) {
            (_, Some(id)) => app.resume_job(&id).await?,
            (Some(file), None) => app.run_job(read_json(&file)?).await?,
            (None, None) => bail!("pass a job file or --id"),
        },
        Command::Quota { action } => {
            let quota = app.quota().await?;
            if let QuotaAction::Reset = action {
                quota.reset();
                app.store.save_quota(&quota.usage()).await?;
            }
            ui::print_quota(&quota.usage(), &app.config.quota);
        }
    }

    Ok(())
}

struct App {
    config: ForgeConfig,
    store: Arc<FileStore>,
}

impl App {
    async fn load_batch(&self, batch_id: &str) -> Result<Batch> {
        self.store
            .get_batch(batch_id)
            .await?
            .with_context(|| format!("batch {batch_id} not found"))
    }

    async fn quota(&self) -> Result<Arc<QuotaGuard>> {
        let stored = self.store.load_quota().await?;
        let today = Utc::now().date_naive();
        Ok(Arc::new(QuotaGuard::restore(&self.config.quota, stored, today)))
    }

    /// Builds one HTTP provider per configured entry whose API key is present.
    fn selector(&self) -> Result<ProviderSelector> {
        let mut providers: Vec<Arc<dyn ContentProvider>> = Vec::new();
        for provider in &self.config.providers {
            let key = match provider.api_key() {
                Ok(key) => key,
                Err(e) => {
                    warn!(provider = %provider.name, error = %e, "provider skipped");
                    continue;
                }
            };
            providers.push(Arc::new(HttpProvider::new(provider.clone(), key)?));
        }
        if providers.is_empty() {
            bail!("no provider has an API key; set one of the configured api_key_env variables");
        }
        Ok(ProviderSelector::new(providers))
    }

    fn processor(
        &self,
        selector: ProviderSelector,
        quota: Arc<QuotaGuard>,
        events: Arc<dyn EventSink>,
    ) -> JobProcessor {
        JobProcessor::new(
            selector,
            Arc::new(HeuristicEvaluator::new(self.config.qc.clone())),
            quota,
            self.store.clone(),
            events,
            self.config.quota.estimated_cost_usd,
        )
        .with_quota_store(self.store.clone())
    }

    fn coordinator(
        &self,
        selector: ProviderSelector,
        quota: Arc<QuotaGuard>,
        events: Arc<dyn EventSink>,
    ) -> BatchCoordinator {
        BatchCoordinator::new(
            Arc::new(self.processor(selector, quota, events)),
            self.store.clone(),
            self.store.clone(),
            self.store.clone(),
            self.config.concurrency,
        )
    }

    async fn run_batch(&self, batch_id: &str) -> Result<()> {
        let mut batch = self.load_batch(batch_id).await?;
        let selector = self.selector()?;
        let quota = self.quota().await?;

        let progress = Arc::new(ui::BatchProgress::start(&batch));
        let sinks: Vec<Arc<dyn EventSink>> = vec![
            Arc::new(TracingSink) as Arc<dyn EventSink>,
            progress.clone() as Arc<dyn EventSink>,
        ];
        let events: Arc<dyn EventSink> = Arc::new(FanoutSink::new(sinks));
        let coordinator = self.coordinator(selector, quota, events);

        let cancel = CancellationToken::new();
        let on_ctrl_c = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received, stopping at the next chunk boundary");
                on_ctrl_c.cancel();
            }
        });

        let result = coordinator.run(&mut batch, &cancel).await;
        progress.finish();

        let report = result?;
        ui::print_report(&report);
        Ok(())
    }

    async fn job_processor(&self) -> Result<JobProcessor> {
        let selector = self.selector()?;
        let quota = self.quota().await?;
        Ok(self.processor(selector, quota, Arc::new(TracingSink)))
    }

    async fn run_job(&self, input: JobInput) -> Result<()> {
        let processor = self.job_processor().await?;
        let spinner = ui::JobSpinner::start(&input);
        let result = processor.submit(input).await;
        finish_job(spinner, result)
    }

    /// Retries a stored job, typically one the quota deferred earlier.
    async fn resume_job(&self, job_id: &str) -> Result<()> {
        let job = self
            .store
            .get_job(job_id)
            .await?
            .with_context(|| format!("job {job_id} not found"))?;
        let processor = self.job_processor().await?;
        let spinner = ui::JobSpinner::start(&job.input);
        let result = processor.resume(job_id).await;
        finish_job(spinner, result)
    }
}

fn finish_job(
    spinner: ui::JobSpinner,
    result: Result<(Job, JobDecision), ForgeError>,
) -> Result<()> {
    let (job, decision) = result?;
    match decision {
        JobDecision::Terminal(_) => spinner.complete(&job),
        JobDecision::Deferred(reason) => spinner.deferred(reason),
    }
    info!(job_id = %job.id, "job stored");
    Ok(())
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let contents =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("parsing {}", path.display()))
}
