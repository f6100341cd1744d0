use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{debug, info, instrument, warn};

use crate::classifier::{Classification, classify};
use crate::policy::{Decision, PolicyEngine};
use crate::provider::{
    self, FailureDescriptor, ProviderAdapter, ProviderDescriptor, ProviderOutput, RawOutcome,
    TrackOutcome,
};
use crate::request::{GenerationKind, GenerationRequest};
use crate::router::ProviderChain;
use crate::state_machine::{GenerationResult, JobError, ResultArtifact};
use crate::tracker::JobEntry;

/// Consecutive failed status checks tolerated before an attempt is abandoned.
const MAX_UNREACHABLE: u32 = 3;
/// Progress added per status check when the provider reports none.
const HEARTBEAT_STEP: u8 = 5;
const HEARTBEAT_CEILING: u8 = 95;
/// Progress reported while a task is still running never reaches 100.
const RUNNING_CEILING: u8 = 99;

/// How long-running provider tasks are followed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackingSettings {
    pub poll_interval: Duration,
    pub track_timeout: Duration,
}

impl Default for TrackingSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(3),
            track_timeout: Duration::from_secs(600),
        }
    }
}

/// Outcome of one attempt once the provider has been called (and, for
/// asynchronous tasks, followed to the end).
#[derive(Debug, Clone, PartialEq)]
enum AttemptOutcome {
    Success(ResultArtifact),
    Failure {
        classification: Classification,
        detail: String,
        retry_after: Option<Duration>,
    },
}

impl AttemptOutcome {
    fn failed(classification: Classification, detail: impl Into<String>) -> Self {
        Self::Failure {
            classification,
            detail: detail.into(),
            retry_after: None,
        }
    }

    fn classification(&self) -> Classification {
        match self {
            Self::Success(_) => Classification::Success,
            Self::Failure { classification, .. } => *classification,
        }
    }

    fn detail(&self) -> Option<String> {
        match self {
            Self::Success(_) => None,
            Self::Failure { detail, .. } => Some(detail.clone()),
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Success(_) => None,
            Self::Failure { retry_after, .. } => *retry_after,
        }
    }
}

/// Drives jobs through their provider chain, one attempt at a time.
pub struct JobOrchestrator {
    adapters: HashMap<String, Arc<dyn ProviderAdapter>>,
    tracking: TrackingSettings,
}

impl JobOrchestrator {
    pub fn new(
        adapters: HashMap<String, Arc<dyn ProviderAdapter>>,
        tracking: TrackingSettings,
    ) -> Self {
        Self { adapters, tracking }
    }

    pub fn tracking(&self) -> TrackingSettings {
        self.tracking
    }

    /// Runs `entry`'s job to a terminal state, unless it is cancelled first.
    ///
    /// Every suspension point races the job's cancellation token; once the
    /// token fires the in-flight call is dropped and its result discarded.
    #[instrument(skip_all, fields(job = %entry.id(), kind = %chain.kind()))]
    pub async fn drive(
        &self,
        entry: Arc<JobEntry>,
        request: Arc<GenerationRequest>,
        chain: ProviderChain,
    ) {
        let cancel = entry.cancellation().clone();
        let mut position = 0;

        loop {
            let Some(descriptor) = chain.get(position) else {
                return;
            };
            let provider = descriptor.id.as_str();

            let attempt = match entry.update(|job| job.begin_attempt(provider)) {
                Ok(number) => number,
                Err(err) => {
                    debug!(%err, "job already settled, stopping driver");
                    return;
                }
            };
            debug!(provider, attempt, "attempt started");

            let started_at = Utc::now();
            let clock = Instant::now();
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!(provider, attempt, "attempt abandoned after cancellation");
                    return;
                }
                outcome = self.attempt(&entry, &request, descriptor) => outcome,
            };
            let latency = clock.elapsed();
            let classification = outcome.classification();

            let decision = entry.update(|job| {
                // Cancelled while the call was in flight.
                if job.is_terminal() {
                    return None;
                }
                job.record_attempt(provider, classification, outcome.detail(), latency, started_at)
                    .ok()?;
                let decision = PolicyEngine::decide(
                    job,
                    classification,
                    &chain,
                    position,
                    outcome.retry_after(),
                );
                let settled = match (&decision, outcome) {
                    (Decision::Succeed(origin), AttemptOutcome::Success(artifact)) => {
                        job.succeed(GenerationResult {
                            provider: provider.to_string(),
                            origin: *origin,
                            artifact,
                        })
                    }
                    (Decision::FailTerminal, outcome) => job.fail(JobError::ExhaustedProviders {
                        chain: chain.ids(),
                        last: classification,
                        detail: outcome.detail(),
                    }),
                    _ => Ok(()),
                };
                settled.ok()?;
                Some(decision)
            });

            let Some(decision) = decision else {
                debug!(provider, attempt, "attempt result discarded");
                return;
            };

            match decision {
                Decision::Succeed(origin) => {
                    info!(provider, attempt, ?origin, latency_ms = latency.as_millis() as u64, "job succeeded");
                    return;
                }
                Decision::FailTerminal => {
                    warn!(provider, attempt, %classification, "all providers exhausted, job failed");
                    return;
                }
                Decision::RetrySame { delay } => {
                    warn!(
                        provider,
                        attempt,
                        %classification,
                        delay_ms = delay.as_millis() as u64,
                        "retrying provider"
                    );
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                Decision::Advance { position: next, provider: to } => {
                    warn!(from = provider, to = %to, attempt, %classification, "falling back to next provider");
                    position = next;
                }
            }
        }
    }

    /// One call to the provider at the current chain position, followed to
    /// completion when the provider answers with a task token.
    async fn attempt(
        &self,
        entry: &JobEntry,
        request: &GenerationRequest,
        descriptor: &ProviderDescriptor,
    ) -> AttemptOutcome {
        let Some(adapter) = self.adapters.get(&descriptor.id) else {
            return AttemptOutcome::failed(
                Classification::Permanent,
                format!("no adapter registered for provider {}", descriptor.id),
            );
        };
        let kind = request.kind();

        let raw = match provider::invoke(adapter.as_ref(), request, descriptor).await {
            RawOutcome::Success(ProviderOutput::Accepted { token })
                if kind != GenerationKind::Text && !token.trim().is_empty() =>
            {
                debug!(provider = %descriptor.id, token = %token, "task accepted, tracking");
                self.follow(entry, adapter.as_ref(), &token, descriptor).await
            }
            raw => raw,
        };
        settle(kind, raw)
    }

    /// Polls a provider task until it finishes, fails, goes silent or runs
    /// past the tracking timeout.
    async fn follow(
        &self,
        entry: &JobEntry,
        adapter: &dyn ProviderAdapter,
        token: &str,
        descriptor: &ProviderDescriptor,
    ) -> RawOutcome {
        let deadline = Instant::now() + self.tracking.track_timeout;
        let mut unreachable = 0;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                warn!(provider = %descriptor.id, token = %token, "task tracking timed out");
                return RawOutcome::Failure(FailureDescriptor::timeout(self.tracking.track_timeout));
            }
            tokio::time::sleep(self.tracking.poll_interval.min(remaining)).await;

            match provider::track(adapter, token, descriptor).await {
                TrackOutcome::Running { progress } => {
                    unreachable = 0;
                    entry.update(|job| {
                        let next = match progress {
                            Some(p) => p.min(RUNNING_CEILING),
                            None => job
                                .progress
                                .saturating_add(HEARTBEAT_STEP)
                                .min(HEARTBEAT_CEILING),
                        };
                        job.advance_progress(next);
                    });
                }
                TrackOutcome::Finished(artifact) => {
                    return RawOutcome::Success(ProviderOutput::Media(artifact));
                }
                TrackOutcome::Rejected(failure) => return RawOutcome::Failure(failure),
                TrackOutcome::Unreachable(failure) => {
                    unreachable += 1;
                    if unreachable > MAX_UNREACHABLE {
                        return RawOutcome::Failure(failure);
                    }
                    warn!(
                        provider = %descriptor.id,
                        token = %token,
                        failures = unreachable,
                        error = %failure.summary(),
                        "status check failed"
                    );
                }
            }
        }
    }
}

/// Classifies a raw outcome and checks its payload fits the request kind.
fn settle(kind: GenerationKind, raw: RawOutcome) -> AttemptOutcome {
    let classification = classify(&raw);
    let output = match raw {
        RawOutcome::Failure(failure) => {
            return AttemptOutcome::Failure {
                classification,
                detail: failure.summary(),
                retry_after: failure.retry_after,
            };
        }
        RawOutcome::Success(_) if classification != Classification::Success => {
            return AttemptOutcome::failed(classification, "provider returned an empty result");
        }
        RawOutcome::Success(output) => output,
    };

    match (kind, output) {
        (GenerationKind::Text, ProviderOutput::Text(content)) => {
            AttemptOutcome::Success(ResultArtifact::Text { content })
        }
        (GenerationKind::Video, ProviderOutput::Media(artifact)) => {
            AttemptOutcome::Success(ResultArtifact::Video(artifact))
        }
        (GenerationKind::Audio, ProviderOutput::Media(artifact)) => {
            AttemptOutcome::Success(ResultArtifact::Audio(artifact))
        }
        (kind, output) => {
            let got = match output {
                ProviderOutput::Text(_) => "text",
                ProviderOutput::Media(_) => "media",
                ProviderOutput::Accepted { .. } => "a task token",
            };
            AttemptOutcome::failed(
                Classification::Permanent,
                format!("provider returned {got} for a {kind} request"),
            )
        }
    }
}
