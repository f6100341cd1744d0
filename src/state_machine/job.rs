use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use super::state::{JobState, StateMachine, TransitionError};
use crate::classifier::Classification;
use crate::provider::MediaArtifact;
use crate::request::GenerationKind;

/// Unique job identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for JobId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Whether the result came from the first provider of the resolved chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    Primary,
    Fallback,
}

/// The deliverable of a succeeded job, tagged by kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ResultArtifact {
    Text { content: String },
    Video(MediaArtifact),
    Audio(MediaArtifact),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationResult {
    pub provider: String,
    pub origin: Origin,
    pub artifact: ResultArtifact,
}

/// One provider call and how it was classified.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attempt {
    pub number: u32,
    pub provider: String,
    pub classification: Classification,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub latency_ms: u64,
    pub started_at: DateTime<Utc>,
}

/// Why a job ended in FAILED.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobError {
    #[error("all providers exhausted ({}); last outcome: {last}", .chain.join(" -> "))]
    ExhaustedProviders {
        chain: Vec<String>,
        last: Classification,
        detail: Option<String>,
    },
    #[error("job cancelled")]
    Cancelled,
}

/// A tracked generation request, from submission to terminal outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub kind: GenerationKind,
    pub state: JobState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub attempts: Vec<Attempt>,
    /// 0 to 100, never decreases.
    pub progress: u8,
    /// Provider of the attempt in flight or last finished.
    pub current_provider: Option<String>,
    pub result: Option<GenerationResult>,
    pub error: Option<JobError>,
}

impl Job {
    pub fn new(kind: GenerationKind) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new(),
            kind,
            state: JobState::Pending,
            created_at: now,
            updated_at: now,
            finished_at: None,
            attempts: Vec::new(),
            progress: 0,
            current_provider: None,
            result: None,
            error: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Marks the job RUNNING on `provider`. Returns the number the attempt
    /// will be recorded under.
    pub fn begin_attempt(&mut self, provider: &str) -> Result<u32, TransitionError> {
        StateMachine::transition(self, JobState::Running)?;
        self.current_provider = Some(provider.to_string());
        Ok(self.next_attempt_number())
    }

    /// Appends a finished attempt. Numbers are assigned here, so they are
    /// always 1, 2, 3...
    pub fn record_attempt(
        &mut self,
        provider: &str,
        classification: Classification,
        detail: Option<String>,
        latency: Duration,
        started_at: DateTime<Utc>,
    ) -> Result<&Attempt, TransitionError> {
        if self.state != JobState::Running {
            return Err(TransitionError {
                from: self.state,
                to: JobState::Running,
            });
        }
        let number = self.next_attempt_number();
        self.attempts.push(Attempt {
            number,
            provider: provider.to_string(),
            classification,
            detail,
            latency_ms: latency.as_millis() as u64,
            started_at,
        });
        self.updated_at = Utc::now();
        Ok(&self.attempts[self.attempts.len() - 1])
    }

    fn next_attempt_number(&self) -> u32 {
        self.attempts.len() as u32 + 1
    }

    /// Attempts already recorded against `provider`.
    pub fn attempts_for(&self, provider: &str) -> u32 {
        self.attempts.iter().filter(|a| a.provider == provider).count() as u32
    }

    /// Raises progress to `progress` (capped at 100). Lower values and
    /// updates outside RUNNING are ignored.
    pub fn advance_progress(&mut self, progress: u8) {
        if self.state == JobState::Running && progress > self.progress {
            self.progress = progress.min(100);
            self.updated_at = Utc::now();
        }
    }

    pub fn succeed(&mut self, result: GenerationResult) -> Result<(), TransitionError> {
        StateMachine::transition(self, JobState::Succeeded)?;
        self.progress = 100;
        self.current_provider = Some(result.provider.clone());
        self.result = Some(result);
        Ok(())
    }

    pub fn fail(&mut self, error: JobError) -> Result<(), TransitionError> {
        StateMachine::transition(self, JobState::Failed)?;
        self.error = Some(error);
        Ok(())
    }
}

/// Read model handed to pollers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSnapshot {
    pub id: JobId,
    pub kind: GenerationKind,
    pub state: JobState,
    pub progress: u8,
    pub provider: Option<String>,
    pub attempts: Vec<Attempt>,
    pub result: Option<GenerationResult>,
    pub error: Option<JobError>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub elapsed_ms: i64,
}

impl JobSnapshot {
    pub fn from_job(job: &Job) -> Self {
        let end = job.finished_at.unwrap_or_else(Utc::now);
        Self {
            id: job.id,
            kind: job.kind,
            state: job.state,
            progress: job.progress,
            provider: job.current_provider.clone(),
            attempts: job.attempts.clone(),
            result: job.result.clone(),
            error: job.error.clone(),
            created_at: job.created_at,
            updated_at: job.updated_at,
            finished_at: job.finished_at,
            elapsed_ms: (end - job.created_at).num_milliseconds(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Optimized text, for succeeded text jobs.
    pub fn text(&self) -> Option<&str> {
        match &self.result.as_ref()?.artifact {
            ResultArtifact::Text { content } => Some(content),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_result(provider: &str) -> GenerationResult {
        GenerationResult {
            provider: provider.into(),
            origin: Origin::Primary,
            artifact: ResultArtifact::Text {
                content: "done".into(),
            },
        }
    }

    #[test]
    fn job_creation_defaults() {
        let job = Job::new(GenerationKind::Video);
        assert_eq!(job.state, JobState::Pending);
        assert_eq!(job.progress, 0);
        assert!(job.attempts.is_empty());
        assert!(job.result.is_none());
        assert!(job.error.is_none());
    }

    #[test]
    fn attempts_are_numbered_sequentially() {
        let mut job = Job::new(GenerationKind::Text);
        for provider in ["a", "a", "b"] {
            let n = job.begin_attempt(provider).unwrap();
            let attempt = job
                .record_attempt(provider, Classification::RateLimited, None, Duration::ZERO, Utc::now())
                .unwrap();
            assert_eq!(attempt.number, n);
        }
        let numbers: Vec<u32> = job.attempts.iter().map(|a| a.number).collect();
        assert_eq!(numbers, vec![1, 2, 3]);
        assert_eq!(job.attempts_for("a"), 2);
        assert_eq!(job.attempts_for("b"), 1);
        assert_eq!(job.attempts_for("c"), 0);
    }

    #[test]
    fn progress_never_decreases() {
        let mut job = Job::new(GenerationKind::Video);
        job.advance_progress(40);
        assert_eq!(job.progress, 0, "pending jobs report no progress");

        job.begin_attempt("wan").unwrap();
        job.advance_progress(40);
        job.advance_progress(10);
        assert_eq!(job.progress, 40);
        job.advance_progress(250);
        assert_eq!(job.progress, 100);
    }

    #[test]
    fn succeed_sets_result_and_full_progress() {
        let mut job = Job::new(GenerationKind::Text);
        job.begin_attempt("zhipu").unwrap();
        job.succeed(text_result("zhipu")).unwrap();
        assert_eq!(job.state, JobState::Succeeded);
        assert_eq!(job.progress, 100);
        assert!(job.result.is_some());
        assert!(job.error.is_none());
    }

    #[test]
    fn terminal_job_rejects_further_changes() {
        let mut job = Job::new(GenerationKind::Text);
        job.fail(JobError::Cancelled).unwrap();

        assert!(job.begin_attempt("a").is_err());
        assert!(job.succeed(text_result("a")).is_err());
        assert!(job.fail(JobError::Cancelled).is_err());
        assert!(
            job.record_attempt("a", Classification::Success, None, Duration::ZERO, Utc::now())
                .is_err()
        );
        assert!(job.result.is_none());
        assert_eq!(job.error, Some(JobError::Cancelled));
    }

    #[test]
    fn job_error_display() {
        let err = JobError::ExhaustedProviders {
            chain: vec!["a".into(), "b".into()],
            last: Classification::RateLimited,
            detail: None,
        };
        assert_eq!(err.to_string(), "all providers exhausted (a -> b); last outcome: rate limited");
        assert_eq!(JobError::Cancelled.to_string(), "job cancelled");
    }

    #[test]
    fn snapshot_reflects_job() {
        let mut job = Job::new(GenerationKind::Text);
        job.begin_attempt("zhipu").unwrap();
        job.succeed(text_result("zhipu")).unwrap();

        let snap = JobSnapshot::from_job(&job);
        assert_eq!(snap.id, job.id);
        assert_eq!(snap.text(), Some("done"));
        assert_eq!(snap.provider.as_deref(), Some("zhipu"));
        assert!(snap.is_terminal());
        assert!(snap.elapsed_ms >= 0);
    }

    #[test]
    fn snapshot_serializes_tagged_artifact() {
        let mut job = Job::new(GenerationKind::Video);
        job.begin_attempt("wan").unwrap();
        job.succeed(GenerationResult {
            provider: "wan".into(),
            origin: Origin::Fallback,
            artifact: ResultArtifact::Video(MediaArtifact::at("http://x/view?filename=a.mp4")),
        })
        .unwrap();

        let json = serde_json::to_value(JobSnapshot::from_job(&job)).unwrap();
        assert_eq!(json["state"], "succeeded");
        assert_eq!(json["result"]["origin"], "fallback");
        assert_eq!(json["result"]["artifact"]["kind"], "video");
        assert_eq!(json["result"]["artifact"]["location"], "http://x/view?filename=a.mp4");
    }

    #[test]
    fn job_id_parses_back() {
        let id = JobId::new();
        assert_eq!(id.to_string().parse::<JobId>().unwrap(), id);
        assert!("not-a-uuid".parse::<JobId>().is_err());
    }
}
