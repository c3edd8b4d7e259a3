use thiserror::Error;

pub use crate::provider::ProviderError;
use crate::batch::BatchStatus;
use crate::state_machine::IllegalTransition;

#[derive(Debug, Error)]
pub enum ForgeError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Batch not found: {0}")]
    BatchNotFound(String),

    #[error("Invalid job input: {0}")]
    Validation(#[from] ValidationError),

    #[error("Generation failed: {0}")]
    Provider(#[from] ProviderError),

    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    #[error(transparent)]
    IllegalTransition(#[from] IllegalTransition),

    #[error("illegal batch transition {from} -> {to} for batch {batch_id}")]
    IllegalBatchTransition {
        batch_id: String,
        from: BatchStatus,
        to: BatchStatus,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Malformed job input. Fatal to the job, never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("required field `{0}` is missing or blank")]
    MissingField(&'static str),

    #[error("`targetUrl` is not a valid http(s) URL: {0}")]
    InvalidUrl(String),

    #[error("`publisherDomain` is not a bare domain name: {0}")]
    InvalidDomain(String),
}

/// Failure of a job, batch, checkpoint or quota write/read.
///
/// Escalates to batch-level failure. The last good checkpoint is never
/// overwritten by a failing write.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("failed to write {what}: {source}")]
    Write {
        what: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read {what}: {source}")]
    Read {
        what: String,
        #[source]
        source: std::io::Error,
    },

    #[error("corrupt record {what}: {source}")]
    Corrupt {
        what: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid record key: {0}")]
    InvalidKey(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}
