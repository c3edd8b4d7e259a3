use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use super::{BatchStore, CheckpointStore, JobStore, QuotaStore};
use crate::batch::{Batch, CheckpointRecord};
use crate::error::PersistenceError;
use crate::quota::QuotaUsage;
use crate::state_machine::Job;

#[derive(Default)]
struct Tables {
    jobs: HashMap<String, Job>,
    /// Insertion order, so `list_job_ids` is stable.
    job_order: Vec<String>,
    batches: HashMap<String, Batch>,
    batch_order: Vec<String>,
    checkpoints: HashMap<String, CheckpointRecord>,
    quota: Option<QuotaUsage>,
}

/// Process-local store backing every persistence contract.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl JobStore for MemoryStore {
    async fn get_job(&self, id: &str) -> Result<Option<Job>, PersistenceError> {
        Ok(self.tables().jobs.get(id).cloned())
    }

    async fn put_job(&self, job: &Job) -> Result<(), PersistenceError> {
        let mut tables = self.tables();
        if tables.jobs.insert(job.id.clone(), job.clone()).is_none() {
            tables.job_order.push(job.id.clone());
        }
        Ok(())
    }

    async fn list_job_ids(&self) -> Result<Vec<String>, PersistenceError> {
        Ok(self.tables().job_order.clone())
    }
}

#[async_trait]
impl BatchStore for MemoryStore {
    async fn get_batch(&self, id: &str) -> Result<Option<Batch>, PersistenceError> {
        Ok(self.tables().batches.get(id).cloned())
    }

    async fn put_batch(&self, batch: &Batch) -> Result<(), PersistenceError> {
        let mut tables = self.tables();
        if tables.batches.insert(batch.id.clone(), batch.clone()).is_none() {
            tables.batch_order.push(batch.id.clone());
        }
        Ok(())
    }

    async fn list_batch_ids(&self) -> Result<Vec<String>, PersistenceError> {
        Ok(self.tables().batch_order.clone())
    }
}

#[async_trait]
impl CheckpointStore for MemoryStore {
    async fn load_checkpoint(
        &self,
        batch_id: &str,
    ) -> Result<Option<CheckpointRecord>, PersistenceError> {
        Ok(self.tables().checkpoints.get(batch_id).cloned())
    }

    async fn save_checkpoint(&self, record: &CheckpointRecord) -> Result<(), PersistenceError> {
        self.tables()
            .checkpoints
            .insert(record.batch_id.clone(), record.clone());
        Ok(())
    }
}

#[async_trait]
impl QuotaStore for MemoryStore {
    async fn load_quota(&self) -> Result<Option<QuotaUsage>, PersistenceError> {
        Ok(self.tables().quota.clone())
    }

    async fn save_quota(&self, usage: &QuotaUsage) -> Result<(), PersistenceError> {
        self.tables().quota = Some(usage.clone());
        Ok(())
    }
}
