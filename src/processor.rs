use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::error::ForgeError;
use crate::events::{CompletionEvent, EventSink};
use crate::hash::content_hash;
use crate::provider::{Generation, GenerationRequest, ProviderError, ProviderSelector};
use crate::qc::{QcEvaluator, QcReport, QcStatus};
use crate::quota::{Admission, DenyReason, QuotaGuard};
use crate::rescue::{Progress, RescueDecision, RescuePolicy};
use crate::state_machine::{Job, JobInput, JobStatus, Phase, Resolution, StateMachine};
use crate::store::{JobStore, QuotaStore};

/// Where a call to [`JobProcessor::process`] left the job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobDecision {
    Terminal(JobStatus),
    /// Quota denied admission; the job is still `Pending` and untouched.
    Deferred(DenyReason),
}

impl JobDecision {
    pub fn is_deferred(&self) -> bool {
        matches!(self, JobDecision::Deferred(_))
    }
}

/// Drives one job from `Pending` to a terminal status.
///
/// At most two generation calls are made per job: the first draft and, when
/// QC fails with only auto-fixable issues, one rescue draft.
pub struct JobProcessor {
    selector: ProviderSelector,
    evaluator: Arc<dyn QcEvaluator>,
    quota: Arc<QuotaGuard>,
    jobs: Arc<dyn JobStore>,
    events: Arc<dyn EventSink>,
    estimated_cost_usd: f64,
    quota_store: Option<Arc<dyn QuotaStore>>,
    // Serializes quota snapshots so an older one never lands after a newer one.
    quota_write: tokio::sync::Mutex<()>,
}

impl JobProcessor {
    pub fn new(
        selector: ProviderSelector,
        evaluator: Arc<dyn QcEvaluator>,
        quota: Arc<QuotaGuard>,
        jobs: Arc<dyn JobStore>,
        events: Arc<dyn EventSink>,
        estimated_cost_usd: f64,
    ) -> Self {
        Self {
            selector,
            evaluator,
            quota,
            jobs,
            events,
            estimated_cost_usd,
            quota_store: None,
            quota_write: tokio::sync::Mutex::new(()),
        }
    }

    /// Persists quota usage after every admission and every charge.
    pub fn with_quota_store(mut self, store: Arc<dyn QuotaStore>) -> Self {
        self.quota_store = Some(store);
        self
    }

    pub fn quota(&self) -> &QuotaGuard {
        &self.quota
    }

    /// Single-job entry point: creates, persists and processes a job.
    pub async fn submit(&self, input: JobInput) -> Result<(Job, JobDecision), ForgeError> {
        let mut job = Job::new(input);
        self.jobs.put_job(&job).await?;
        let decision = self.process(&mut job).await?;
        Ok((job, decision))
    }

    /// Loads a stored job, e.g. one deferred by quota, and processes it again.
    pub async fn resume(&self, job_id: &str) -> Result<(Job, JobDecision), ForgeError> {
        let mut job = self
            .jobs
            .get_job(job_id)
            .await?
            .ok_or_else(|| ForgeError::JobNotFound(job_id.to_string()))?;
        let decision = self.process(&mut job).await?;
        Ok((job, decision))
    }

    /// Runs the job's lifecycle.
    ///
    /// Calling this on a terminal job is a no-op. Only persistence failures
    /// are returned as errors; everything that goes wrong with the job itself
    /// ends in a terminal status instead.
    #[tracing::instrument(skip_all, fields(job_id = %job.id))]
    pub async fn process(&self, job: &mut Job) -> Result<JobDecision, ForgeError> {
        match job.status {
            status if status.is_terminal() => return Ok(JobDecision::Terminal(status)),
            JobStatus::Running => {
                warn!(attempts = job.attempt_count, "job was interrupted mid-flight");
                return self.finish(job, JobStatus::Aborted, Resolution::Interrupted).await;
            }
            _ => {}
        }

        if let Err(e) = job.input.validate() {
            warn!(error = %e, "job input rejected");
            return self
                .finish(job, JobStatus::Aborted, Resolution::InvalidInput(e.to_string()))
                .await;
        }

        let reserved_usd = match self.quota.admit(self.estimated_cost_usd) {
            Admission::Granted { reserved_usd } => reserved_usd,
            Admission::Denied(reason) => {
                info!(%reason, "job deferred by quota");
                return Ok(JobDecision::Deferred(reason));
            }
        };

        // The admission is durable before any provider is called.
        if let Err(e) = self.persist_quota().await {
            self.quota.release(reserved_usd);
            return Err(e);
        }

        StateMachine::start(job)?;

        let request = GenerationRequest::new(job.input.clone());
        let draft = match self.write(job, &request).await {
            Ok(draft) => draft,
            Err(e) => {
                // Nothing was generated; hand the reservation back.
                self.quota.release(reserved_usd);
                return Err(e);
            }
        };
        self.quota
            .settle(reserved_usd, draft.as_ref().map_or(0.0, |g| g.cost_usd));
        self.persist_quota().await?;
        let draft = match draft {
            Ok(draft) => draft,
            Err(e) => return self.generation_failed(job, e).await,
        };
        self.accept_draft(job, draft);

        let report = match self.evaluate(job).await {
            Ok(report) => report,
            Err(e) => return self.evaluation_failed(job, e).await,
        };

        match RescuePolicy::decide(job, &report) {
            RescueDecision::NotNeeded => {
                self.finish(job, JobStatus::Delivered, Resolution::Passed).await
            }
            RescueDecision::RequiresSignoff(codes) => {
                self.finish(job, JobStatus::Blocked, Resolution::RequiresSignoff(codes))
                    .await
            }
            RescueDecision::Exhausted => {
                self.finish(job, JobStatus::Blocked, Resolution::RescueFailed).await
            }
            RescueDecision::Attempt(request) => self.rescue(job, request).await,
        }
    }

    async fn rescue(
        &self,
        job: &mut Job,
        request: GenerationRequest,
    ) -> Result<JobDecision, ForgeError> {
        debug!(phase = %Phase::Rescue, "attempting rescue");
        job.rescue_count = 1;

        let draft = self.write(job, &request).await?;
        let draft = match draft {
            Ok(draft) => {
                self.quota.charge(draft.cost_usd);
                self.persist_quota().await?;
                draft
            }
            Err(e) => return self.generation_failed(job, e).await,
        };

        let rescue_hash = content_hash(&draft.text);
        if RescuePolicy::check_progress(job.last_content_hash.as_deref(), &rescue_hash)
            == Progress::NoProgress
        {
            job.record_usage(draft.tokens_used, draft.cost_usd);
            warn!(hash = %rescue_hash, "rescue made no progress: draft unchanged");
            return self
                .finish(job, JobStatus::Aborted, Resolution::RescueNoProgress)
                .await;
        }
        self.accept_draft(job, draft);

        let mut report = match self.evaluate(job).await {
            Ok(report) => report,
            Err(e) => return self.evaluation_failed(job, e).await,
        };

        if report.status.is_pass() {
            report.status = QcStatus::PassWithAutoFix;
            job.qc_report = Some(report);
            return self
                .finish(job, JobStatus::Delivered, Resolution::PassedAfterRescue)
                .await;
        }

        // The second report is final regardless of what it contains.
        match RescuePolicy::decide(job, &report) {
            RescueDecision::RequiresSignoff(codes) => {
                self.finish(job, JobStatus::Blocked, Resolution::RequiresSignoff(codes))
                    .await
            }
            _ => self.finish(job, JobStatus::Blocked, Resolution::RescueFailed).await,
        }
    }

    /// Records the attempt durably, then makes one selector call.
    async fn write(
        &self,
        job: &mut Job,
        request: &GenerationRequest,
    ) -> Result<Result<Generation, ProviderError>, ForgeError> {
        job.attempt_count += 1;
        self.jobs.put_job(job).await?;
        debug!(phase = %Phase::Write, attempt = job.attempt_count, "generating draft");
        Ok(self.selector.generate(request).await)
    }

    async fn persist_quota(&self) -> Result<(), ForgeError> {
        let Some(store) = &self.quota_store else {
            return Ok(());
        };
        let _guard = self.quota_write.lock().await;
        store.save_quota(&self.quota.usage()).await?;
        Ok(())
    }

    fn accept_draft(&self, job: &mut Job, draft: Generation) {
        job.record_usage(draft.tokens_used, draft.cost_usd);
        job.last_content_hash = Some(content_hash(&draft.text));
        job.content = Some(draft.text);
        debug!(provider = %draft.provider, cost_usd = draft.cost_usd, "draft accepted");
    }

    async fn evaluate(&self, job: &mut Job) -> Result<QcReport, ProviderError> {
        debug!(phase = %Phase::Qc, "evaluating draft");
        let text = job.content.as_deref().unwrap_or_default();
        let report = self.evaluator.evaluate(&job.input, text).await?;
        debug!(
            status = %report.status,
            score = report.overall_score,
            issues = report.issues.len(),
            "qc report"
        );
        job.qc_report = Some(report.clone());
        Ok(report)
    }

    async fn generation_failed(
        &self,
        job: &mut Job,
        err: ProviderError,
    ) -> Result<JobDecision, ForgeError> {
        warn!(error = %err, "generation failed");
        self.finish(
            job,
            JobStatus::Aborted,
            Resolution::GenerationFailed(err.to_string()),
        )
        .await
    }

    async fn evaluation_failed(
        &self,
        job: &mut Job,
        err: ProviderError,
    ) -> Result<JobDecision, ForgeError> {
        warn!(error = %err, "qc evaluation failed");
        self.finish(
            job,
            JobStatus::Aborted,
            Resolution::EvaluationFailed(err.to_string()),
        )
        .await
    }

    /// Terminal transition: persist first, then emit the single completion event.
    async fn finish(
        &self,
        job: &mut Job,
        status: JobStatus,
        resolution: Resolution,
    ) -> Result<JobDecision, ForgeError> {
        StateMachine::finish(job, status, resolution)?;
        self.jobs.put_job(job).await?;

        let resolution = job
            .resolution
            .as_ref()
            .map(|r| r.to_string())
            .unwrap_or_default();
        info!(
            status = %job.status,
            %resolution,
            attempts = job.attempt_count,
            rescued = job.rescued(),
            cost_usd = job.cost_usd,
            "job finished"
        );
        self.events.emit(CompletionEvent::from_job(job));
        Ok(JobDecision::Terminal(status))
    }
}
