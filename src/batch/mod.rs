//! Chunked, resumable batch processing.

mod coordinator;
mod model;

pub use coordinator::{BatchCoordinator, BatchRunOutcome, BatchRunReport};
pub use model::{Batch, BatchStats, BatchStatus, CheckpointRecord, DEFAULT_CHUNK_SIZE};
