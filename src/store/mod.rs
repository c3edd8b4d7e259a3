//! Persistence contracts used by the processor and the coordinator.
//!
//! Each batch has exactly one writer, so implementations need per-record
//! atomicity only: a write either lands completely or not at all.

pub mod file;
pub mod memory;

use async_trait::async_trait;

use crate::batch::{Batch, CheckpointRecord};
use crate::error::PersistenceError;
use crate::quota::QuotaUsage;
use crate::state_machine::Job;

pub use file::FileStore;
pub use memory::MemoryStore;

#[async_trait]
pub trait JobStore: Send + Sync {
    async fn get_job(&self, id: &str) -> Result<Option<Job>, PersistenceError>;

    async fn put_job(&self, job: &Job) -> Result<(), PersistenceError>;

    async fn list_job_ids(&self) -> Result<Vec<String>, PersistenceError>;
}

#[async_trait]
pub trait BatchStore: Send + Sync {
    async fn get_batch(&self, id: &str) -> Result<Option<Batch>, PersistenceError>;

    async fn put_batch(&self, batch: &Batch) -> Result<(), PersistenceError>;

    async fn list_batch_ids(&self) -> Result<Vec<String>, PersistenceError>;
}

#[async_trait]
pub trait CheckpointStore: Send + Sync {
    async fn load_checkpoint(
        &self,
        batch_id: &str,
    ) -> Result<Option<CheckpointRecord>, PersistenceError>;

    /// Overwrites the batch's single checkpoint record.
    async fn save_checkpoint(&self, record: &CheckpointRecord) -> Result<(), PersistenceError>;
}

#[async_trait]
pub trait QuotaStore: Send + Sync {
    async fn load_quota(&self) -> Result<Option<QuotaUsage>, PersistenceError>;

    async fn save_quota(&self, usage: &QuotaUsage) -> Result<(), PersistenceError>;
}
