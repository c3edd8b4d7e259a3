//! Admission control over cumulative spend and job count.
//!
//! The guard is the only mutable state shared by concurrent job workers. All
//! checks and increments happen under one lock, so two workers can never be
//! admitted against the same remaining headroom.

use std::sync::{Mutex, MutexGuard};

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::QuotaConfig;

/// Counters for one accounting period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuotaUsage {
    pub period: NaiveDate,
    pub spent_usd: f64,
    pub jobs: u64,
}

impl QuotaUsage {
    pub fn empty(period: NaiveDate) -> Self {
        Self {
            period,
            spent_usd: 0.0,
            jobs: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    CostCeiling,
    JobCeiling,
}

impl std::fmt::Display for DenyReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DenyReason::CostCeiling => write!(f, "cost ceiling reached"),
            DenyReason::JobCeiling => write!(f, "job ceiling reached"),
        }
    }
}

/// Outcome of an admission request. Denial is backpressure, not an error.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Admission {
    /// Admitted; `reserved_usd` has been added to spend until settled.
    Granted { reserved_usd: f64 },
    Denied(DenyReason),
}

pub struct QuotaGuard {
    cost_ceiling_usd: f64,
    job_ceiling: u64,
    usage: Mutex<QuotaUsage>,
}

impl QuotaGuard {
    pub fn new(config: &QuotaConfig) -> Self {
        Self::with_usage(config, QuotaUsage::empty(Utc::now().date_naive()))
    }

    /// Resumes from previously persisted counters.
    pub fn with_usage(config: &QuotaConfig, usage: QuotaUsage) -> Self {
        Self {
            cost_ceiling_usd: config.cost_ceiling_usd,
            job_ceiling: config.job_ceiling,
            usage: Mutex::new(usage),
        }
    }

    /// Restores persisted counters; counters from an earlier period are dropped.
    pub fn restore(config: &QuotaConfig, stored: Option<QuotaUsage>, today: NaiveDate) -> Self {
        let usage = match stored {
            Some(usage) if usage.period == today => usage,
            Some(stale) => {
                info!(stale = %stale.period, %today, "quota period rolled over");
                QuotaUsage::empty(today)
            }
            None => QuotaUsage::empty(today),
        };
        Self::with_usage(config, usage)
    }

    fn lock(&self) -> MutexGuard<'_, QuotaUsage> {
        self.usage.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Admits one job whose first generation call is estimated at `estimated_usd`.
    ///
    /// Denies once admitting would push spend past the cost ceiling or the job
    /// count past the job ceiling. On success the estimate is reserved and the
    /// job counted.
    pub fn admit(&self, estimated_usd: f64) -> Admission {
        let estimated_usd = estimated_usd.max(0.0);
        let mut usage = self.lock();

        if usage.jobs >= self.job_ceiling {
            debug!(jobs = usage.jobs, ceiling = self.job_ceiling, "quota denied: job ceiling");
            return Admission::Denied(DenyReason::JobCeiling);
        }
        if usage.spent_usd + estimated_usd > self.cost_ceiling_usd {
            debug!(
                spent_usd = usage.spent_usd,
                ceiling_usd = self.cost_ceiling_usd,
                "quota denied: cost ceiling"
            );
            return Admission::Denied(DenyReason::CostCeiling);
        }

        usage.jobs += 1;
        usage.spent_usd += estimated_usd;
        Admission::Granted {
            reserved_usd: estimated_usd,
        }
    }

    /// Replaces a reservation with the actual cost of the call it covered.
    pub fn settle(&self, reserved_usd: f64, actual_usd: f64) {
        let mut usage = self.lock();
        usage.spent_usd = (usage.spent_usd - reserved_usd.max(0.0) + actual_usd.max(0.0)).max(0.0);
    }

    /// Undoes an admission whose job never reached a generation call.
    pub fn release(&self, reserved_usd: f64) {
        let mut usage = self.lock();
        usage.jobs = usage.jobs.saturating_sub(1);
        usage.spent_usd = (usage.spent_usd - reserved_usd.max(0.0)).max(0.0);
    }

    /// Adds spend that was not reserved (the rescue call).
    pub fn charge(&self, actual_usd: f64) {
        let mut usage = self.lock();
        usage.spent_usd += actual_usd.max(0.0);
    }

    /// Clears both counters; called on period rollover by the host.
    pub fn reset(&self) {
        self.reset_to(Utc::now().date_naive());
    }

    pub fn reset_to(&self, period: NaiveDate) {
        let mut usage = self.lock();
        info!(period = %period, spent_usd = usage.spent_usd, jobs = usage.jobs, "quota reset");
        *usage = QuotaUsage::empty(period);
    }

    pub fn usage(&self) -> QuotaUsage {
        self.lock().clone()
    }
}
