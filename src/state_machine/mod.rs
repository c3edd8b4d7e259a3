mod job;
mod state;

pub use job::{Job, JobInput, JobStatus, Resolution};
pub use state::{IllegalTransition, Phase, StateMachine, Transition};
