//! Bounded article generation: one draft, one QC pass, at most one rescue,
//! processed in resumable, checkpointed batches under a daily quota.

pub mod batch;
pub mod cli;
pub mod config;
pub mod error;
pub mod events;
pub mod hash;
pub mod processor;
pub mod provider;
pub mod qc;
pub mod quota;
pub mod rescue;
pub mod state_machine;
pub mod store;
pub mod telemetry;
pub mod ui;

#[cfg(test)]
mod testing;

pub use error::ForgeError;
