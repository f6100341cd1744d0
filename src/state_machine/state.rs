use std::fmt;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::job::Job;

/// Lifecycle of a generation job.
///
/// PENDING → RUNNING → (SUCCEEDED | FAILED). RUNNING re-enters itself on
/// every retry or fallback; a job may also fail straight from PENDING when
/// it is cancelled before its first attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Succeeded | JobState::Failed)
    }

    pub fn can_transition_to(&self, next: JobState) -> bool {
        matches!(
            (self, next),
            (JobState::Pending, JobState::Running)
                | (JobState::Running, JobState::Running)
                | (JobState::Running, JobState::Succeeded)
                | (JobState::Pending, JobState::Failed)
                | (JobState::Running, JobState::Failed)
        )
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobState::Pending => write!(f, "PENDING"),
            JobState::Running => write!(f, "RUNNING"),
            JobState::Succeeded => write!(f, "SUCCEEDED"),
            JobState::Failed => write!(f, "FAILED"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid job transition {from} -> {to}")]
pub struct TransitionError {
    pub from: JobState,
    pub to: JobState,
}

/// Applies state transitions to a `Job`.
pub struct StateMachine;

impl StateMachine {
    /// Moves `job` to `next`, stamping `updated_at` (and `finished_at` on a
    /// terminal state). Terminal jobs never move again.
    pub fn transition(job: &mut Job, next: JobState) -> Result<(), TransitionError> {
        if !job.state.can_transition_to(next) {
            return Err(TransitionError {
                from: job.state,
                to: next,
            });
        }
        let now = Utc::now();
        job.state = next;
        job.updated_at = now;
        if next.is_terminal() {
            job.finished_at = Some(now);
        }
        Ok(())
    }
}
