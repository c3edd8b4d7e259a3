//! JSON file store rooted at a directory.
//!
//! Layout: `jobs/<id>.json`, `batches/<id>.json`, `checkpoints/<batch>.json`
//! and `quota.json`. Every write goes to a temporary file in the target
//! directory and is renamed over the old record, so readers see either the
//! previous or the new version and never a torn file.

use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tempfile::NamedTempFile;

use super::{BatchStore, CheckpointStore, JobStore, QuotaStore};
use crate::batch::{Batch, CheckpointRecord};
use crate::error::PersistenceError;
use crate::quota::QuotaUsage;
use crate::state_machine::Job;

const JOBS: &str = "jobs";
const BATCHES: &str = "batches";
const CHECKPOINTS: &str = "checkpoints";
const QUOTA_FILE: &str = "quota.json";

pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Opens (and creates if needed) a store under `root`.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, PersistenceError> {
        let root = root.into();
        for dir in [JOBS, BATCHES, CHECKPOINTS] {
            let path = root.join(dir);
            std::fs::create_dir_all(&path).map_err(|source| PersistenceError::Write {
                what: path.display().to_string(),
                source,
            })?;
        }
        Ok(Self { root })
    }

    fn record_path(&self, table: &str, key: &str) -> Result<PathBuf, PersistenceError> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(PersistenceError::InvalidKey(key.to_string()));
        }
        Ok(self.root.join(table).join(format!("{key}.json")))
    }

    async fn read<T: DeserializeOwned>(path: PathBuf) -> Result<Option<T>, PersistenceError> {
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(PersistenceError::Read {
                    what: path.display().to_string(),
                    source,
                });
            }
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|source| PersistenceError::Corrupt {
                what: path.display().to_string(),
                source,
            })
    }

    async fn write<T: Serialize>(path: PathBuf, value: &T) -> Result<(), PersistenceError> {
        let bytes = serde_json::to_vec_pretty(value).map_err(|source| PersistenceError::Corrupt {
            what: path.display().to_string(),
            source,
        })?;

        tokio::task::spawn_blocking(move || write_atomic(&path, &bytes))
            .await
            .map_err(|e| PersistenceError::Unavailable(format!("write task failed: {e}")))?
    }

    async fn list(&self, table: &str) -> Result<Vec<String>, PersistenceError> {
        let dir = self.root.join(table);
        let read_err = |source: std::io::Error| PersistenceError::Read {
            what: dir.display().to_string(),
            source,
        };
        let mut entries = tokio::fs::read_dir(&dir).await.map_err(read_err)?;
        let mut ids = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(read_err)? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json")
                && let Some(stem) = path.file_stem().and_then(|s| s.to_str())
            {
                ids.push(stem.to_string());
            }
        }
        ids.sort();
        Ok(ids)
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), PersistenceError> {
    let write_err = |source: std::io::Error| PersistenceError::Write {
        what: path.display().to_string(),
        source,
    };
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = NamedTempFile::new_in(dir).map_err(write_err)?;
    tmp.write_all(bytes).map_err(write_err)?;
    tmp.as_file().sync_all().map_err(write_err)?;
    tmp.persist(path).map_err(|e| write_err(e.error))?;
    Ok(())
}

#[async_trait]
impl JobStore for FileStore {
    async fn get_job(&self, id: &str) -> Result<Option<Job>, PersistenceError> {
        Self::read(self.record_path(JOBS, id)?).await
    }

    async fn put_job(&self, job: &Job) -> Result<(), PersistenceError> {
        Self::write(self.record_path(JOBS, &job.id)?, job).await
    }

    async fn list_job_ids(&self) -> Result<Vec<String>, PersistenceError> {
        self.list(JOBS).await
    }
}

#[async_trait]
impl BatchStore for FileStore {
    async fn get_batch(&self, id: &str) -> Result<Option<Batch>, PersistenceError> {
        Self::read(self.record_path(BATCHES, id)?).await
    }

    async fn put_batch(&self, batch: &Batch) -> Result<(), PersistenceError> {
        Self::write(self.record_path(BATCHES, &batch.id)?, batch).await
    }

    async fn list_batch_ids(&self) -> Result<Vec<String>, PersistenceError> {
        self.list(BATCHES).await
    }
}

#[async_trait]
impl CheckpointStore for FileStore {
    async fn load_checkpoint(
        &self,
        batch_id: &str,
    ) -> Result<Option<CheckpointRecord>, PersistenceError> {
        Self::read(self.record_path(CHECKPOINTS, batch_id)?).await
    }

    async fn save_checkpoint(&self, record: &CheckpointRecord) -> Result<(), PersistenceError> {
        Self::write(self.record_path(CHECKPOINTS, &record.batch_id)?, record).await
    }
}

#[async_trait]
impl QuotaStore for FileStore {
    async fn load_quota(&self) -> Result<Option<QuotaUsage>, PersistenceError> {
        Self::read(self.root.join(QUOTA_FILE)).await
    }

    async fn save_quota(&self, usage: &QuotaUsage) -> Result<(), PersistenceError> {
        Self::write(self.root.join(QUOTA_FILE), usage).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state_machine::JobStatus;
    use crate::testing::sample_input;
    use chrono::NaiveDate;

    #[tokio::test]
    async fn job_round_trip_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();

        let mut job = Job::new(sample_input());
        job.status = JobStatus::Delivered;
        store.put_job(&job).await.unwrap();

        let loaded = store.get_job(&job.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, JobStatus::Delivered);
        assert_eq!(loaded.input, job.input);
        assert_eq!(store.list_job_ids().await.unwrap(), vec![job.id.clone()]);
    }

    #[tokio::test]
    async fn missing_record_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        assert!(store.get_batch("nope").await.unwrap().is_none());
        assert!(store.load_checkpoint("nope").await.unwrap().is_none());
        assert!(store.load_quota().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn checkpoint_overwrite_leaves_no_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        for k in 1..=3 {
            store
                .save_checkpoint(&CheckpointRecord::new("batch-1", k))
                .await
                .unwrap();
        }
        let record = store.load_checkpoint("batch-1").await.unwrap().unwrap();
        assert_eq!(record.checkpoint_index, 3);

        let files: Vec<_> = std::fs::read_dir(dir.path().join(CHECKPOINTS))
            .unwrap()
            .collect();
        assert_eq!(files.len(), 1);
    }

    #[tokio::test]
    async fn path_traversal_key_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        let err = store.get_job("../etc/passwd").await.unwrap_err();
        assert!(matches!(err, PersistenceError::InvalidKey(_)));
    }

    #[tokio::test]
    async fn corrupt_record_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        std::fs::write(dir.path().join(BATCHES).join("bad.json"), b"{not json").unwrap();
        let err = store.get_batch("bad").await.unwrap_err();
        assert!(matches!(err, PersistenceError::Corrupt { .. }));
    }

    #[tokio::test]
    async fn quota_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        let usage = QuotaUsage {
            period: NaiveDate::from_ymd_opt(2026, 10, 19).unwrap(),
            spent_usd: 1.25,
            jobs: 7,
        };
        store.save_quota(&usage).await.unwrap();
        assert_eq!(store.load_quota().await.unwrap(), Some(usage));
    }
}
