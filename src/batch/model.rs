use std::fmt;
use std::ops::Range;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ForgeError;
use crate::state_machine::JobStatus;

pub const DEFAULT_CHUNK_SIZE: usize = 25;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    Pending,
    Processing,
    ReadyForReview,
    InReview,
    Completed,
    Failed,
}

impl BatchStatus {
    /// Legal edges. `ReadyForReview` and `InReview` belong to review tooling
    /// outside the coordinator; the coordinator itself only moves between
    /// `Pending`, `Processing`, `Completed` and `Failed`.
    pub fn allows(self, to: BatchStatus) -> bool {
        use BatchStatus::*;
        match (self, to) {
            (from, to) if from == to => true,
            (Pending, Processing) => true,
            (Processing, Completed | Failed) => true,
            (Failed, Processing) => true,
            (Completed, ReadyForReview) => true,
            (ReadyForReview, InReview) => true,
            (InReview, Completed) => true,
            (Pending | Processing | ReadyForReview | InReview | Completed | Failed, _) => false,
        }
    }

    /// Whether the coordinator may (re)enter `run` from this status.
    pub fn is_runnable(self) -> bool {
        matches!(
            self,
            BatchStatus::Pending | BatchStatus::Processing | BatchStatus::Failed
        )
    }
}

impl fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BatchStatus::Pending => "pending",
            BatchStatus::Processing => "processing",
            BatchStatus::ReadyForReview => "ready_for_review",
            BatchStatus::InReview => "in_review",
            BatchStatus::Completed => "completed",
            BatchStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Job counts by status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchStats {
    pub pending: usize,
    pub running: usize,
    pub delivered: usize,
    pub blocked: usize,
    pub aborted: usize,
}

impl BatchStats {
    pub fn record(&mut self, status: JobStatus) {
        match status {
            JobStatus::Pending => self.pending += 1,
            JobStatus::Running => self.running += 1,
            JobStatus::Delivered => self.delivered += 1,
            JobStatus::Blocked => self.blocked += 1,
            JobStatus::Aborted => self.aborted += 1,
        }
    }

    /// Moves one job from `from` to `to`.
    pub fn shift(&mut self, from: JobStatus, to: JobStatus) {
        if from == to {
            return;
        }
        let slot = match from {
            JobStatus::Pending => &mut self.pending,
            JobStatus::Running => &mut self.running,
            JobStatus::Delivered => &mut self.delivered,
            JobStatus::Blocked => &mut self.blocked,
            JobStatus::Aborted => &mut self.aborted,
        };
        *slot = slot.saturating_sub(1);
        self.record(to);
    }

    pub fn terminal(&self) -> usize {
        self.delivered + self.blocked + self.aborted
    }

    pub fn total(&self) -> usize {
        self.pending + self.running + self.terminal()
    }
}

/// Durable progress marker; one record per batch, overwritten in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckpointRecord {
    pub batch_id: String,
    pub checkpoint_index: usize,
    pub updated_at: DateTime<Utc>,
}

impl CheckpointRecord {
    pub fn new(batch_id: impl Into<String>, checkpoint_index: usize) -> Self {
        Self {
            batch_id: batch_id.into(),
            checkpoint_index,
            updated_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Batch {
    pub id: String,
    /// Processing order.
    pub job_ids: Vec<String>,
    pub chunk_size: usize,
    pub status: BatchStatus,
    /// Number of fully completed chunks.
    pub checkpoint: usize,
    pub stats: BatchStats,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Batch {
    pub fn new(job_ids: Vec<String>, chunk_size: usize) -> Result<Self, ForgeError> {
        if chunk_size == 0 {
            return Err(ForgeError::Config("chunk_size must be positive".into()));
        }
        let now = Utc::now();
        Ok(Self {
            id: Uuid::new_v4().to_string(),
            stats: BatchStats {
                pending: job_ids.len(),
                ..BatchStats::default()
            },
            job_ids,
            chunk_size,
            status: BatchStatus::Pending,
            checkpoint: 0,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn chunk_count(&self) -> usize {
        self.job_ids.len().div_ceil(self.chunk_size)
    }

    /// Index range of chunk `k`, clamped to the job list.
    pub fn chunk_range(&self, k: usize) -> Range<usize> {
        let start = k.saturating_mul(self.chunk_size).min(self.job_ids.len());
        let end = start.saturating_add(self.chunk_size).min(self.job_ids.len());
        start..end
    }

    pub fn chunk(&self, k: usize) -> &[String] {
        &self.job_ids[self.chunk_range(k)]
    }

    pub fn set_status(&mut self, to: BatchStatus) -> Result<(), ForgeError> {
        if !self.status.allows(to) {
            return Err(ForgeError::IllegalBatchTransition {
                batch_id: self.id.clone(),
                from: self.status,
                to,
            });
        }
        self.status = to;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Advances the checkpoint. Never moves backwards or past the last chunk.
    pub fn advance_checkpoint(&mut self, to: usize) {
        let to = to.min(self.chunk_count());
        if to > self.checkpoint {
            self.checkpoint = to;
            self.updated_at = Utc::now();
        }
    }
}
