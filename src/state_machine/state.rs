use std::fmt;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::job::{Job, JobStatus, Resolution};

/// Internal sub-phases of a `Running` job.
///
/// Each job flows through: WRITE → QC → (RESCUE → WRITE → QC) → terminal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    Write,
    Qc,
    Rescue,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Write => write!(f, "WRITE"),
            Phase::Qc => write!(f, "QC"),
            Phase::Rescue => write!(f, "RESCUE"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("illegal job transition {from} -> {to} for job {job_id}")]
pub struct IllegalTransition {
    pub job_id: String,
    pub from: JobStatus,
    pub to: JobStatus,
}

/// The result of applying a status change to a job.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// The job entered `Running`.
    Started,
    /// The job reached a terminal status.
    Finished(JobStatus),
}

/// Applies status changes to a `Job` using a closed transition table.
pub struct StateMachine;

impl StateMachine {
    /// Whether `from -> to` is a legal edge.
    ///
    /// `Pending → Aborted` covers validation failures and stale `Running`
    /// remnants are aborted directly.
    pub fn allows(from: JobStatus, to: JobStatus) -> bool {
        use JobStatus::*;
        match (from, to) {
            (Pending, Running) => true,
            (Pending, Aborted) => true,
            (Pending, Pending | Delivered | Blocked) => false,
            (Running, Delivered | Blocked | Aborted) => true,
            (Running, Pending | Running) => false,
            (Delivered | Blocked | Aborted, _) => false,
        }
    }

    /// Moves the job from `Pending` to `Running`.
    pub fn start(job: &mut Job) -> Result<Transition, IllegalTransition> {
        Self::apply(job, JobStatus::Running)?;
        Ok(Transition::Started)
    }

    /// Moves the job to a terminal status and records why.
    pub fn finish(
        job: &mut Job,
        status: JobStatus,
        resolution: Resolution,
    ) -> Result<Transition, IllegalTransition> {
        if !status.is_terminal() {
            return Err(IllegalTransition {
                job_id: job.id.clone(),
                from: job.status,
                to: status,
            });
        }
        Self::apply(job, status)?;
        job.resolution = Some(resolution);
        Ok(Transition::Finished(status))
    }

    fn apply(job: &mut Job, to: JobStatus) -> Result<(), IllegalTransition> {
        if !Self::allows(job.status, to) {
            return Err(IllegalTransition {
                job_id: job.id.clone(),
                from: job.status,
                to,
            });
        }
        job.status_history.push(job.status);
        job.status = to;
        job.updated_at = Utc::now();
        Ok(())
    }
}
