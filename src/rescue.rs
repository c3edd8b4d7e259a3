//! One-shot automatic remediation of a failed QC report.
//!
//! A job gets at most one rescue, and only when every QC issue is
//! auto-fixable. The rescue draft is compared by content hash with the draft
//! it replaces; an identical hash means the rescue changed nothing.

use crate::provider::GenerationRequest;
use crate::qc::{QcFailure, QcReport};
use crate::state_machine::Job;

pub const MAX_RESCUES: u32 = 1;

/// Whether a failed report may be rescued.
#[derive(Debug, Clone, PartialEq)]
pub enum RescueDecision {
    /// Regenerate with these instructions.
    Attempt(GenerationRequest),
    /// Needs human sign-off for these issue codes.
    RequiresSignoff(Vec<String>),
    /// The job already used its rescue.
    Exhausted,
    /// The report is not a failure.
    NotNeeded,
}

/// Outcome of the loop-detection guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    Changed,
    NoProgress,
}

pub struct RescuePolicy;

impl RescuePolicy {
    pub fn decide(job: &Job, report: &QcReport) -> RescueDecision {
        match report.failure() {
            None => RescueDecision::NotNeeded,
            Some(QcFailure::RequiresSignoff(codes)) => RescueDecision::RequiresSignoff(codes),
            Some(QcFailure::AutoFixable) if job.rescue_count >= MAX_RESCUES => {
                RescueDecision::Exhausted
            }
            Some(QcFailure::AutoFixable) => RescueDecision::Attempt(
                GenerationRequest::with_instructions(job.input.clone(), Self::instructions(report)),
            ),
        }
    }

    /// Remediation instructions listing every issue from the failed report.
    pub fn instructions(report: &QcReport) -> String {
        let mut out = format!(
            "A previous draft of this article failed quality control with a score of {}/100. \
             Rewrite it so that every issue below is resolved:",
            report.overall_score
        );
        if report.issues.is_empty() {
            out.push_str("\n- overall quality is below the acceptance threshold");
        }
        for issue in &report.issues {
            out.push_str("\n- ");
            out.push_str(&issue.code);
            if let Some(description) = &issue.description {
                out.push_str(": ");
                out.push_str(description);
            }
        }
        out
    }

    pub fn check_progress(previous_hash: Option<&str>, rescue_hash: &str) -> Progress {
        match previous_hash {
            Some(previous) if previous == rescue_hash => Progress::NoProgress,
            _ => Progress::Changed,
        }
    }
}
