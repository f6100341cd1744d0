mod job;
mod state;

pub use job::{
    Attempt, GenerationResult, Job, JobError, JobId, JobSnapshot, Origin, ResultArtifact,
};
pub use state::{JobState, StateMachine, TransitionError};
