//! Per-job completion events.
//!
//! The processor emits exactly one [`CompletionEvent`] after a job's terminal
//! transition has been persisted. Sinks are fire-and-forget: `emit` cannot
//! fail and nothing is acknowledged.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, warn};

use crate::qc::QcStatus;
use crate::state_machine::{Job, JobStatus};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionEvent {
    pub job_id: String,
    pub status: JobStatus,
    pub qc_status: Option<QcStatus>,
    pub score: Option<u8>,
    pub cost_usd: f64,
    pub rescued: bool,
}

impl CompletionEvent {
    pub fn from_job(job: &Job) -> Self {
        Self {
            job_id: job.id.clone(),
            status: job.status,
            qc_status: job.qc_report.as_ref().map(|r| r.status),
            score: job.qc_report.as_ref().map(|r| r.overall_score),
            cost_usd: job.cost_usd,
            rescued: job.rescued(),
        }
    }
}

pub trait EventSink: Send + Sync {
    fn emit(&self, event: CompletionEvent);
}

/// Logs each event through `tracing` at debug level.
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: CompletionEvent) {
        let qc_status = event
            .qc_status
            .map(|s| s.to_string())
            .unwrap_or_else(|| "none".to_string());
        debug!(
            job_id = %event.job_id,
            status = %event.status,
            qc_status = %qc_status,
            score = event.score.unwrap_or(0),
            cost_usd = event.cost_usd,
            rescued = event.rescued,
            "job completed"
        );
    }
}

/// Forwards events to an unbounded channel for a live subscriber.
pub struct ChannelSink {
    tx: UnboundedSender<CompletionEvent>,
}

impl ChannelSink {
    pub fn new(tx: UnboundedSender<CompletionEvent>) -> Self {
        Self { tx }
    }
}

impl EventSink for ChannelSink {
    fn emit(&self, event: CompletionEvent) {
        // A dropped receiver only means nobody is listening anymore.
        if self.tx.send(event).is_err() {
            warn!("completion event dropped: subscriber closed");
        }
    }
}

/// Delivers each event to every inner sink.
pub struct FanoutSink {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl FanoutSink {
    pub fn new(sinks: Vec<Arc<dyn EventSink>>) -> Self {
        Self { sinks }
    }
}

impl EventSink for FanoutSink {
    fn emit(&self, event: CompletionEvent) {
        for sink in &self.sinks {
            sink.emit(event.clone());
        }
    }
}
