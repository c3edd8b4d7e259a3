use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;
use uuid::Uuid;

use crate::error::ValidationError;
use crate::qc::QcReport;

/// Immutable generation request for one article.
///
/// Missing fields deserialize as blank so that they surface as a
/// `ValidationError` on the job rather than rejecting the whole submission.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct JobInput {
    pub publisher_domain: String,
    pub target_url: String,
    pub anchor_text: String,
}

impl JobInput {
    pub fn new(
        publisher_domain: impl Into<String>,
        target_url: impl Into<String>,
        anchor_text: impl Into<String>,
    ) -> Self {
        Self {
            publisher_domain: publisher_domain.into(),
            target_url: target_url.into(),
            anchor_text: anchor_text.into(),
        }
    }

    /// Checks that all three fields are present and well formed.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let domain = self.publisher_domain.trim();
        if domain.is_empty() {
            return Err(ValidationError::MissingField("publisherDomain"));
        }
        if self.target_url.trim().is_empty() {
            return Err(ValidationError::MissingField("targetUrl"));
        }
        if self.anchor_text.trim().is_empty() {
            return Err(ValidationError::MissingField("anchorText"));
        }

        // A publisher domain is a host, not a URL.
        let looks_like_host = !domain.contains(['/', ':', ' ', '@']) && domain.contains('.');
        if !looks_like_host || url::Host::parse(domain).is_err() {
            return Err(ValidationError::InvalidDomain(domain.to_string()));
        }

        match Url::parse(self.target_url.trim()) {
            Ok(url) if matches!(url.scheme(), "http" | "https") && url.host().is_some() => Ok(()),
            _ => Err(ValidationError::InvalidUrl(self.target_url.clone())),
        }
    }
}

/// Externally observable lifecycle status of a job.
///
/// Monotonic: once `Delivered`, `Blocked` or `Aborted`, it never changes again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Delivered,
    Blocked,
    Aborted,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Delivered | JobStatus::Blocked | JobStatus::Aborted)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Delivered => "delivered",
            JobStatus::Blocked => "blocked",
            JobStatus::Aborted => "aborted",
        };
        f.write_str(s)
    }
}

/// Why a job reached its terminal status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum Resolution {
    /// QC passed on the first draft.
    Passed,
    /// QC passed on the rescue draft.
    PassedAfterRescue,
    /// QC raised issues that need human sign-off.
    RequiresSignoff(Vec<String>),
    /// The rescue draft still failed QC.
    RescueFailed,
    InvalidInput(String),
    GenerationFailed(String),
    /// The QC collaborator could not produce a report.
    EvaluationFailed(String),
    /// The rescue draft hashed identically to the draft it was meant to fix.
    RescueNoProgress,
    /// Found mid-flight after a restart; abandoned to keep the call bound.
    Interrupted,
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Resolution::Passed => write!(f, "passed QC"),
            Resolution::PassedAfterRescue => write!(f, "passed QC after rescue"),
            Resolution::RequiresSignoff(codes) => {
                write!(f, "requires sign-off: {}", codes.join(", "))
            }
            Resolution::RescueFailed => write!(f, "rescue draft failed QC"),
            Resolution::InvalidInput(msg) => write!(f, "invalid input: {msg}"),
            Resolution::GenerationFailed(msg) => write!(f, "generation failed: {msg}"),
            Resolution::EvaluationFailed(msg) => write!(f, "QC evaluation failed: {msg}"),
            Resolution::RescueNoProgress => write!(f, "rescue made no progress"),
            Resolution::Interrupted => write!(f, "interrupted mid-flight"),
        }
    }
}

/// A single article-generation job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub input: JobInput,
    pub status: JobStatus,
    pub status_history: Vec<JobStatus>,
    pub attempt_count: u32,
    pub rescue_count: u32,
    pub last_content_hash: Option<String>,
    /// Most recent draft.
    pub content: Option<String>,
    pub qc_report: Option<QcReport>,
    pub cost_usd: f64,
    pub tokens_used: u64,
    pub resolution: Option<Resolution>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    pub fn new(input: JobInput) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            input,
            status: JobStatus::Pending,
            status_history: Vec::new(),
            attempt_count: 0,
            rescue_count: 0,
            last_content_hash: None,
            content: None,
            qc_report: None,
            cost_usd: 0.0,
            tokens_used: 0,
            resolution: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn rescued(&self) -> bool {
        self.rescue_count > 0
    }

    /// Adds one generation call's consumption. Never decreases either counter.
    pub fn record_usage(&mut self, tokens: u64, cost_usd: f64) {
        self.tokens_used = self.tokens_used.saturating_add(tokens);
        if cost_usd.is_finite() && cost_usd > 0.0 {
            self.cost_usd += cost_usd;
        }
    }
}
