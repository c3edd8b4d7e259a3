use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::model::{Batch, BatchStats, BatchStatus, CheckpointRecord};
use crate::error::ForgeError;
use crate::processor::{JobDecision, JobProcessor};
use crate::state_machine::{Job, JobInput, JobStatus};
use crate::store::{BatchStore, CheckpointStore, JobStore};

/// How a call to [`BatchCoordinator::run`] ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchRunOutcome {
    /// Every chunk is checkpointed; the batch is `Completed`.
    Completed,
    /// Quota deferred at least one job; the batch stays `Processing`.
    Deferred,
    /// Cancelled at a chunk barrier; the batch stays `Processing`.
    Cancelled,
    /// The batch was not in a runnable status; nothing was done.
    NotRunnable(BatchStatus),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchRunReport {
    pub batch_id: String,
    pub outcome: BatchRunOutcome,
    /// Chunks processed during this run, including a re-entered partial chunk.
    pub chunks_processed: usize,
    pub checkpoint: usize,
    pub stats: BatchStats,
}

/// What happened to one job id within a chunk.
enum Dispatch {
    /// Already terminal before this run touched it.
    Skipped,
    Processed { before: JobStatus, decision: JobDecision },
}

#[derive(Default)]
struct ChunkSummary {
    processed: usize,
    skipped: usize,
    deferred: usize,
}

/// Processes a batch in fixed-size chunks with a durable checkpoint after each.
///
/// Chunks run strictly in order; jobs inside a chunk run concurrently up to
/// `concurrency`. The checkpoint for chunk `k` is written only after every
/// job in it has reached a terminal status, so a restart resumes at the
/// first chunk that was not fully resolved.
pub struct BatchCoordinator {
    processor: Arc<JobProcessor>,
    jobs: Arc<dyn JobStore>,
    batches: Arc<dyn BatchStore>,
    checkpoints: Arc<dyn CheckpointStore>,
    concurrency: usize,
}

impl BatchCoordinator {
    pub fn new(
        processor: Arc<JobProcessor>,
        jobs: Arc<dyn JobStore>,
        batches: Arc<dyn BatchStore>,
        checkpoints: Arc<dyn CheckpointStore>,
        concurrency: usize,
    ) -> Self {
        Self {
            processor,
            jobs,
            batches,
            checkpoints,
            concurrency: concurrency.max(1),
        }
    }

    /// Creates `Pending` jobs for `inputs` and a `Pending` batch over them.
    pub async fn submit(
        &self,
        inputs: Vec<JobInput>,
        chunk_size: usize,
    ) -> Result<Batch, ForgeError> {
        let mut job_ids = Vec::with_capacity(inputs.len());
        let mut batch_jobs = Vec::with_capacity(inputs.len());
        for input in inputs {
            let job = Job::new(input);
            job_ids.push(job.id.clone());
            batch_jobs.push(job);
        }
        let batch = Batch::new(job_ids, chunk_size)?;

        for job in &batch_jobs {
            self.jobs.put_job(job).await?;
        }
        self.batches.put_batch(&batch).await?;

        info!(
            batch_id = %batch.id,
            jobs = batch.job_ids.len(),
            chunks = batch.chunk_count(),
            chunk_size,
            "batch submitted"
        );
        Ok(batch)
    }

    /// Loads a persisted batch and runs it from its checkpoint.
    pub async fn resume(
        &self,
        batch_id: &str,
        cancel: &CancellationToken,
    ) -> Result<BatchRunReport, ForgeError> {
        let mut batch = self
            .batches
            .get_batch(batch_id)
            .await?
            .ok_or_else(|| ForgeError::BatchNotFound(batch_id.to_string()))?;
        self.run(&mut batch, cancel).await
    }

    #[tracing::instrument(skip_all, fields(batch_id = %batch.id))]
    pub async fn run(
        &self,
        batch: &mut Batch,
        cancel: &CancellationToken,
    ) -> Result<BatchRunReport, ForgeError> {
        if !batch.status.is_runnable() {
            debug!(status = %batch.status, "batch not runnable");
            return Ok(self.report(batch, BatchRunOutcome::NotRunnable(batch.status), 0));
        }

        if let Err(e) = self.prepare(batch).await {
            return Err(self.fail(batch, e).await);
        }

        let chunk_count = batch.chunk_count();
        let start = batch.checkpoint;
        info!(start_chunk = start, chunk_count, "batch run starting");

        let mut chunks_processed = 0;
        for k in start..chunk_count {
            if cancel.is_cancelled() {
                info!(chunk = k, "batch cancelled at chunk barrier");
                return Ok(self.report(batch, BatchRunOutcome::Cancelled, chunks_processed));
            }

            let summary = match self.run_chunk(batch, k).await {
                Ok(summary) => summary,
                Err(e) => return Err(self.fail(batch, e).await),
            };
            chunks_processed += 1;

            if summary.deferred > 0 {
                // The checkpoint stays on this chunk so resume picks the deferred jobs up.
                batch.updated_at = chrono::Utc::now();
                if let Err(e) = self.batches.put_batch(batch).await {
                    return Err(self.fail(batch, e.into()).await);
                }
                info!(
                    chunk = k,
                    deferred = summary.deferred,
                    "quota exhausted, batch paused"
                );
                return Ok(self.report(batch, BatchRunOutcome::Deferred, chunks_processed));
            }

            if let Err(e) = self.commit_checkpoint(batch, k + 1).await {
                return Err(self.fail(batch, e).await);
            }
            info!(
                chunk = k,
                processed = summary.processed,
                skipped = summary.skipped,
                checkpoint = batch.checkpoint,
                "chunk complete"
            );
        }

        batch.set_status(BatchStatus::Completed)?;
        if let Err(e) = self.batches.put_batch(batch).await {
            return Err(self.fail(batch, e.into()).await);
        }
        info!(
            delivered = batch.stats.delivered,
            blocked = batch.stats.blocked,
            aborted = batch.stats.aborted,
            "batch completed"
        );
        Ok(self.report(batch, BatchRunOutcome::Completed, chunks_processed))
    }

    /// Restores the checkpoint, marks the batch `Processing` and recounts stats.
    async fn prepare(&self, batch: &mut Batch) -> Result<(), ForgeError> {
        if let Some(record) = self.checkpoints.load_checkpoint(&batch.id).await? {
            batch.advance_checkpoint(record.checkpoint_index);
        }
        batch.set_status(BatchStatus::Processing)?;
        batch.stats = self.recount(batch).await?;
        self.batches.put_batch(batch).await?;
        Ok(())
    }

    async fn recount(&self, batch: &Batch) -> Result<BatchStats, ForgeError> {
        let mut stats = BatchStats::default();
        for id in &batch.job_ids {
            let job = self
                .jobs
                .get_job(id)
                .await?
                .ok_or_else(|| ForgeError::JobNotFound(id.clone()))?;
            stats.record(job.status);
        }
        Ok(stats)
    }

    async fn run_chunk(&self, batch: &mut Batch, k: usize) -> Result<ChunkSummary, ForgeError> {
        let ids = batch.chunk(k).to_vec();
        debug!(chunk = k, jobs = ids.len(), "dispatching chunk");

        let results: Vec<Result<Dispatch, ForgeError>> = stream::iter(ids)
            .map(|id| self.dispatch(id))
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let mut summary = ChunkSummary::default();
        let mut first_error = None;
        for result in results {
            match result {
                Ok(Dispatch::Skipped) => summary.skipped += 1,
                Ok(Dispatch::Processed { before, decision }) => {
                    summary.processed += 1;
                    match decision {
                        JobDecision::Terminal(after) => batch.stats.shift(before, after),
                        JobDecision::Deferred(_) => summary.deferred += 1,
                    }
                }
                Err(e) => {
                    error!(chunk = k, error = %e, "job dispatch failed");
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(summary),
        }
    }

    /// Loads one job and hands it to the processor unless it is already terminal.
    async fn dispatch(&self, id: String) -> Result<Dispatch, ForgeError> {
        let mut job = self
            .jobs
            .get_job(&id)
            .await?
            .ok_or(ForgeError::JobNotFound(id))?;

        if job.is_terminal() {
            debug!(job_id = %job.id, status = %job.status, "already terminal, skipping");
            return Ok(Dispatch::Skipped);
        }

        let before = job.status;
        let decision = self.processor.process(&mut job).await?;
        Ok(Dispatch::Processed { before, decision })
    }

    /// Writes the checkpoint record, then mirrors it onto the batch.
    async fn commit_checkpoint(&self, batch: &mut Batch, index: usize) -> Result<(), ForgeError> {
        self.checkpoints
            .save_checkpoint(&CheckpointRecord::new(&batch.id, index))
            .await?;
        batch.advance_checkpoint(index);
        self.batches.put_batch(batch).await?;
        Ok(())
    }

    /// Marks the batch `Failed` without touching the checkpoint.
    async fn fail(&self, batch: &mut Batch, err: ForgeError) -> ForgeError {
        error!(error = %err, checkpoint = batch.checkpoint, "batch failed");
        if batch.set_status(BatchStatus::Failed).is_ok()
            && let Err(e) = self.batches.put_batch(batch).await
        {
            warn!(error = %e, "could not record batch failure");
        }
        err
    }

    fn report(
        &self,
        batch: &Batch,
        outcome: BatchRunOutcome,
        chunks_processed: usize,
    ) -> BatchRunReport {
        BatchRunReport {
            batch_id: batch.id.clone(),
            outcome,
            chunks_processed,
            checkpoint: batch.checkpoint,
            stats: batch.stats,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    use crate::config::QuotaConfig;
    use crate::error::PersistenceError;
    use crate::events::{CompletionEvent, EventSink};
    use crate::provider::{ContentProvider, ProviderSelector};
    use crate::qc::{QcIssue, QcReport};
    use crate::quota::{QuotaGuard, QuotaUsage};
    use crate::store::{MemoryStore, QuotaStore};
    use crate::testing::{ScriptedEvaluator, ScriptedProvider, sample_input};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Notify;

    /// Fails the save of one specific checkpoint index.
    struct FlakyCheckpoints {
        inner: Arc<MemoryStore>,
        fail_at: usize,
    }

    #[async_trait]
    impl CheckpointStore for FlakyCheckpoints {
        async fn load_checkpoint(
            &self,
            batch_id: &str,
        ) -> Result<Option<CheckpointRecord>, PersistenceError> {
            self.inner.load_checkpoint(batch_id).await
        }

        async fn save_checkpoint(&self, record: &CheckpointRecord) -> Result<(), PersistenceError> {
            if record.checkpoint_index == self.fail_at {
                return Err(PersistenceError::Unavailable("disk went away".into()));
            }
            self.inner.save_checkpoint(record).await
        }
    }

    /// Cancels the token when the first job completes.
    struct CancelOnFirstEvent(CancellationToken);

    impl EventSink for CancelOnFirstEvent {
        fn emit(&self, _event: CompletionEvent) {
            self.0.cancel();
        }
    }

    /// Wakes a waiter once `after` jobs have completed.
    struct NotifyAfter {
        seen: AtomicUsize,
        after: usize,
        notify: Arc<Notify>,
    }

    impl EventSink for NotifyAfter {
        fn emit(&self, _event: CompletionEvent) {
            if self.seen.fetch_add(1, Ordering::SeqCst) + 1 == self.after {
                self.notify.notify_one();
            }
        }
    }

    struct Setup {
        store: Arc<MemoryStore>,
        provider: Arc<ScriptedProvider>,
        quota: Arc<QuotaGuard>,
        coordinator: BatchCoordinator,
    }

    struct Options {
        checkpoints: Option<Arc<dyn CheckpointStore>>,
        evaluator: ScriptedEvaluator,
        quota: QuotaConfig,
        usage: Option<QuotaUsage>,
        events: Arc<dyn EventSink>,
        concurrency: usize,
    }

    impl Default for Options {
        fn default() -> Self {
            Self {
                checkpoints: None,
                evaluator: ScriptedEvaluator::new(),
                quota: QuotaConfig {
                    cost_ceiling_usd: 1000.0,
                    job_ceiling: 100_000,
                    estimated_cost_usd: 0.05,
                },
                usage: None,
                events: Arc::new(crate::testing::RecordingSink::default()),
                concurrency: 4,
            }
        }
    }

    fn setup(store: Arc<MemoryStore>, options: Options) -> Setup {
        let provider = Arc::new(ScriptedProvider::new("primary"));
        let quota = Arc::new(match options.usage {
            Some(usage) => QuotaGuard::with_usage(&options.quota, usage),
            None => QuotaGuard::new(&options.quota),
        });
        let providers: Vec<Arc<dyn ContentProvider>> = vec![provider.clone()];
        let processor = Arc::new(
            JobProcessor::new(
                ProviderSelector::new(providers),
                Arc::new(options.evaluator),
                quota.clone(),
                store.clone(),
                options.events,
                options.quota.estimated_cost_usd,
            )
            .with_quota_store(store.clone()),
        );
        let checkpoints = options
            .checkpoints
            .unwrap_or_else(|| store.clone() as Arc<dyn CheckpointStore>);
        let coordinator = BatchCoordinator::new(
            processor,
            store.clone(),
            store.clone(),
            checkpoints,
            options.concurrency,
        );
        Setup {
            store,
            provider,
            quota,
            coordinator,
        }
    }

    fn inputs(n: usize) -> Vec<JobInput> {
        (0..n).map(|_| sample_input()).collect()
    }

    async fn job(store: &MemoryStore, id: &str) -> Job {
        store.get_job(id).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn full_run_checkpoints_every_chunk() {
        let s = setup(Arc::new(MemoryStore::new()), Options::default());
        let mut batch = s.coordinator.submit(inputs(60), 25).await.unwrap();

        let report = s
            .coordinator
            .run(&mut batch, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.outcome, BatchRunOutcome::Completed);
        assert_eq!(report.checkpoint, 3);
        assert_eq!(report.chunks_processed, 3);
        assert_eq!(report.stats.delivered, 60);
        assert_eq!(batch.status, BatchStatus::Completed);
        assert_eq!(s.provider.calls(), 60);

        let record = s.store.load_checkpoint(&batch.id).await.unwrap().unwrap();
        assert_eq!(record.checkpoint_index, 3);
        let stored = s.store.get_batch(&batch.id).await.unwrap().unwrap();
        assert_eq!(stored.status, BatchStatus::Completed);
        assert_eq!(stored.checkpoint, 3);
    }

    // Scenario 5: crash after chunk 3 is checkpointed.
    #[tokio::test]
    async fn restart_after_checkpoint_failure_resumes_without_redispatch() {
        let store = Arc::new(MemoryStore::new());
        let first = setup(
            store.clone(),
            Options {
                checkpoints: Some(Arc::new(FlakyCheckpoints {
                    inner: store.clone(),
                    fail_at: 4,
                })),
                ..Options::default()
            },
        );
        let mut batch = first.coordinator.submit(inputs(175), 25).await.unwrap();
        assert_eq!(batch.chunk_count(), 7);

        let err = first
            .coordinator
            .run(&mut batch, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ForgeError::Persistence(_)));
        assert_eq!(batch.status, BatchStatus::Failed);
        assert_eq!(batch.checkpoint, 3);
        assert_eq!(first.provider.calls(), 100);
        let record = store.load_checkpoint(&batch.id).await.unwrap().unwrap();
        assert_eq!(record.checkpoint_index, 3);

        let early: Vec<Job> = {
            let mut v = Vec::new();
            for id in &batch.job_ids[..75] {
                v.push(job(&store, id).await);
            }
            v
        };

        // Fresh process over the same durable state.
        let second = setup(store.clone(), Options::default());
        let report = second
            .coordinator
            .resume(&batch.id, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.outcome, BatchRunOutcome::Completed);
        assert_eq!(report.checkpoint, 7);
        assert_eq!(report.chunks_processed, 4);
        assert_eq!(report.stats.delivered, 175);
        // Chunk 4 was already resolved before the crash; only chunks 5-7 generate.
        assert_eq!(second.provider.calls(), 75);

        for before in early {
            let after = job(&store, &before.id).await;
            assert_eq!(after.attempt_count, before.attempt_count);
            assert_eq!(after.updated_at, before.updated_at);
        }
    }

    // Scenario 5, seeded: checkpoint=3 persisted, chunk 4 untouched.
    #[tokio::test]
    async fn resume_only_reprocesses_jobs_at_or_after_checkpoint() {
        let store = Arc::new(MemoryStore::new());
        let s = setup(store.clone(), Options::default());
        let mut batch = s.coordinator.submit(inputs(175), 25).await.unwrap();

        // Chunks 1-3 finished in an earlier process.
        for id in &batch.job_ids[..75] {
            let mut j = job(&store, id).await;
            j.status = JobStatus::Delivered;
            store.put_job(&j).await.unwrap();
        }
        store
            .save_checkpoint(&CheckpointRecord::new(&batch.id, 3))
            .await
            .unwrap();
        batch.status = BatchStatus::Processing;
        store.put_batch(&batch).await.unwrap();

        let report = s
            .coordinator
            .resume(&batch.id, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.outcome, BatchRunOutcome::Completed);
        assert_eq!(report.chunks_processed, 4);
        assert_eq!(s.provider.calls(), 100);
        for id in &batch.job_ids[..75] {
            assert_eq!(job(&store, id).await.attempt_count, 0);
        }
        for id in &batch.job_ids[75..] {
            assert_eq!(job(&store, id).await.attempt_count, 1);
        }
    }

    // Scenario 6: cost ceiling reached mid-chunk.
    #[tokio::test]
    async fn quota_exhaustion_pauses_batch_on_current_chunk() {
        let store = Arc::new(MemoryStore::new());
        let s = setup(
            store.clone(),
            Options {
                // Each draft costs 0.01 and reserves 0.05: 28 jobs fit under 0.325.
                quota: QuotaConfig {
                    cost_ceiling_usd: 0.325,
                    job_ceiling: 1000,
                    estimated_cost_usd: 0.05,
                },
                concurrency: 1,
                ..Options::default()
            },
        );
        let mut batch = s.coordinator.submit(inputs(50), 25).await.unwrap();

        let report = s
            .coordinator
            .run(&mut batch, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.outcome, BatchRunOutcome::Deferred);
        assert_eq!(batch.status, BatchStatus::Processing);
        assert_eq!(report.checkpoint, 1);
        assert_eq!(report.stats.delivered, 28);
        assert_eq!(report.stats.pending, 22);
        for id in &batch.job_ids[28..50] {
            let j = job(&store, id).await;
            assert_eq!(j.status, JobStatus::Pending);
            assert_eq!(j.attempt_count, 0);
        }
        let record = store.load_checkpoint(&batch.id).await.unwrap().unwrap();
        assert_eq!(record.checkpoint_index, 1);

        // Next period: the same chunk is re-entered and the batch finishes.
        s.quota.reset();
        let report = s
            .coordinator
            .resume(&batch.id, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(report.outcome, BatchRunOutcome::Completed);
        assert_eq!(report.checkpoint, 2);
        assert_eq!(report.stats.delivered, 50);
        assert_eq!(s.provider.calls(), 50);
    }

    #[tokio::test]
    async fn job_level_failures_do_not_fail_the_batch() {
        let s = setup(
            Arc::new(MemoryStore::new()),
            Options {
                evaluator: ScriptedEvaluator::new()
                    .then(QcReport::blocked(10, vec![QcIssue::signoff("legal_risk")])),
                concurrency: 1,
                ..Options::default()
            },
        );
        let mut all = inputs(3);
        all.push(JobInput::new("a.com", "", "best tool"));
        let mut batch = s.coordinator.submit(all, 2).await.unwrap();

        let report = s
            .coordinator
            .run(&mut batch, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.outcome, BatchRunOutcome::Completed);
        assert_eq!(report.stats.blocked, 1);
        assert_eq!(report.stats.delivered, 2);
        assert_eq!(report.stats.aborted, 1);
        assert_eq!(report.stats.total(), 4);
    }

    #[tokio::test]
    async fn cancellation_stops_at_the_next_barrier() {
        let cancel = CancellationToken::new();
        let s = setup(
            Arc::new(MemoryStore::new()),
            Options {
                events: Arc::new(CancelOnFirstEvent(cancel.clone())),
                ..Options::default()
            },
        );
        let mut batch = s.coordinator.submit(inputs(50), 10).await.unwrap();

        let report = s.coordinator.run(&mut batch, &cancel).await.unwrap();

        assert_eq!(report.outcome, BatchRunOutcome::Cancelled);
        assert_eq!(report.chunks_processed, 1);
        assert_eq!(report.checkpoint, 1);
        assert_eq!(batch.status, BatchStatus::Processing);
        // In-flight jobs of the first chunk ran to completion.
        assert_eq!(s.provider.calls(), 10);
    }

    #[tokio::test]
    async fn completed_batch_is_not_rerun() {
        let s = setup(Arc::new(MemoryStore::new()), Options::default());
        let mut batch = s.coordinator.submit(inputs(5), 5).await.unwrap();
        let token = CancellationToken::new();
        s.coordinator.run(&mut batch, &token).await.unwrap();

        let report = s.coordinator.run(&mut batch, &token).await.unwrap();
        assert_eq!(
            report.outcome,
            BatchRunOutcome::NotRunnable(BatchStatus::Completed)
        );
        assert_eq!(s.provider.calls(), 5);
    }

    #[tokio::test]
    async fn empty_batch_completes_immediately() {
        let s = setup(Arc::new(MemoryStore::new()), Options::default());
        let mut batch = s.coordinator.submit(Vec::new(), 25).await.unwrap();
        let report = s
            .coordinator
            .run(&mut batch, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(report.outcome, BatchRunOutcome::Completed);
        assert_eq!(report.checkpoint, 0);
    }

    #[tokio::test]
    async fn missing_job_fails_batch_without_advancing() {
        let store = Arc::new(MemoryStore::new());
        let s = setup(store.clone(), Options::default());
        let mut batch = Batch::new(vec!["ghost".into()], 1).unwrap();
        store.put_batch(&batch).await.unwrap();

        let err = s
            .coordinator
            .run(&mut batch, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ForgeError::JobNotFound(_)));
        assert_eq!(batch.status, BatchStatus::Failed);
        assert_eq!(batch.checkpoint, 0);
        assert!(store.load_checkpoint(&batch.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn resume_unknown_batch_is_an_error() {
        let s = setup(Arc::new(MemoryStore::new()), Options::default());
        let err = s
            .coordinator
            .resume("nope", &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ForgeError::BatchNotFound(_)));
    }

    #[tokio::test]
    async fn submit_rejects_zero_chunk_size() {
        let s = setup(Arc::new(MemoryStore::new()), Options::default());
        let err = s.coordinator.submit(inputs(2), 0).await.unwrap_err();
        assert!(matches!(err, ForgeError::Config(_)));
        assert!(s.store.list_job_ids().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn quota_survives_a_run_dropped_mid_batch() {
        let store = Arc::new(MemoryStore::new());
        let limits = QuotaConfig {
            cost_ceiling_usd: 1000.0,
            job_ceiling: 80,
            estimated_cost_usd: 0.05,
        };
        let notify = Arc::new(Notify::new());
        let first = setup(
            store.clone(),
            Options {
                quota: limits.clone(),
                events: Arc::new(NotifyAfter {
                    seen: AtomicUsize::new(0),
                    after: 60,
                    notify: notify.clone(),
                }),
                ..Options::default()
            },
        );
        let mut batch = first.coordinator.submit(inputs(175), 25).await.unwrap();

        // The process dies mid-chunk: the run future is dropped without returning.
        let cancel = CancellationToken::new();
        tokio::select! {
            result = first.coordinator.run(&mut batch, &cancel) => {
                panic!("run finished before being dropped: {result:?}");
            }
            _ = notify.notified() => {}
        }
        let first_calls = first.provider.calls();
        assert!(first_calls >= 60);
        drop(first);

        let stored = store.load_quota().await.unwrap().expect("quota persisted during the run");
        assert!(stored.jobs as usize >= first_calls);

        let second = setup(
            store.clone(),
            Options {
                quota: limits.clone(),
                usage: Some(stored),
                ..Options::default()
            },
        );
        let report = second
            .coordinator
            .resume(&batch.id, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.outcome, BatchRunOutcome::Deferred);
        assert!(first_calls + second.provider.calls() <= limits.job_ceiling as usize);
        assert_eq!(second.quota.usage().jobs, limits.job_ceiling);
        let persisted = store.load_quota().await.unwrap().unwrap();
        assert_eq!(persisted, second.quota.usage());
    }
}
