//! Caller-facing façade: submit, poll, cancel and wait.
//!
//! `submit` validates the request, resolves its provider chain, records a
//! PENDING job and spawns the task that drives it; it never blocks on a
//! provider. Everything else is a read or an explicit control operation on
//! the job store.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::classifier::Classification;
use crate::config::GenrelayConfig;
use crate::error::Result;
use crate::orchestrator::{JobOrchestrator, TrackingSettings};
use crate::provider::{self, ProviderAdapter, ProviderDescriptor};
use crate::request::{GenerationKind, GenerationRequest, OptimizeMode};
use crate::router::{ProviderChain, ProviderRouter};
use crate::state_machine::{Job, JobId, JobSnapshot};
use crate::tracker::{CancelOutcome, JobStore};

/// Timing knobs of a dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchSettings {
    /// How long [`Dispatcher::run`] waits for a text job before handing
    /// back a pending handle.
    pub text_wait: Duration,
    pub tracking: TrackingSettings,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            text_wait: Duration::from_secs(15),
            tracking: TrackingSettings::default(),
        }
    }
}

/// Returned by `submit`: enough to poll the job later.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobHandle {
    pub id: JobId,
    pub kind: GenerationKind,
    /// Provider ids in the order they will be tried.
    pub chain: Vec<String>,
}

/// Result of [`Dispatcher::run`].
#[derive(Debug, Clone)]
pub enum Submission {
    /// The job settled within the wait window.
    Finished(JobSnapshot),
    /// The job is still in flight; poll it with the handle.
    Pending(JobHandle),
}

/// Outcome of [`Dispatcher::test_provider`]: one canned request, one attempt.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderCheck {
    pub provider: String,
    pub kind: GenerationKind,
    pub classification: Classification,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub latency_ms: u64,
}

impl ProviderCheck {
    pub fn is_ok(&self) -> bool {
        self.classification == Classification::Success
    }
}

/// Small request of `kind` used to check a provider end to end.
fn check_request(kind: GenerationKind) -> GenerationRequest {
    match kind {
        GenerationKind::Text => {
            GenerationRequest::text("This is a test sentence.", OptimizeMode::Creative)
        }
        GenerationKind::Video => GenerationRequest::video("A slow pan across a quiet lake"),
        GenerationKind::Audio => GenerationRequest::audio("This is a test."),
    }
}

pub struct Dispatcher {
    router: ProviderRouter,
    orchestrator: Arc<JobOrchestrator>,
    jobs: Arc<JobStore>,
    text_wait: Duration,
}

impl Dispatcher {
    pub fn new(
        router: ProviderRouter,
        adapters: HashMap<String, Arc<dyn ProviderAdapter>>,
        settings: DispatchSettings,
    ) -> Self {
        Self {
            router,
            orchestrator: Arc::new(JobOrchestrator::new(adapters, settings.tracking)),
            jobs: Arc::new(JobStore::new()),
            text_wait: settings.text_wait,
        }
    }

    /// Builds adapters for every configured provider. Providers whose API key
    /// variable is unset are skipped with a warning.
    pub fn from_config(config: &GenrelayConfig) -> Result<Self> {
        let client = reqwest::Client::new();
        let mut descriptors = Vec::new();
        let mut adapters = HashMap::new();

        for provider_config in &config.providers {
            let api_key = match provider_config.resolve_api_key() {
                Ok(key) => key,
                Err(err) => {
                    warn!(provider = %provider_config.id, %err, "provider skipped");
                    continue;
                }
            };
            let adapter = provider::build_adapter(provider_config, api_key, &client)?;
            adapters.insert(provider_config.id.clone(), adapter);
            descriptors.push(provider_config.descriptor());
        }

        info!(providers = descriptors.len(), "dispatcher ready");
        Ok(Self::new(
            ProviderRouter::new(descriptors),
            adapters,
            config.dispatch_settings(),
        ))
    }

    /// Creates a job for `request` and starts driving it.
    ///
    /// Must be called from within a Tokio runtime. Invalid requests are
    /// rejected before any job exists.
    #[instrument(skip_all, fields(kind = %request.kind()))]
    pub fn submit(&self, request: GenerationRequest) -> Result<JobHandle> {
        request.validate()?;
        let chain = self
            .router
            .resolve(request.kind(), request.provider_hint.as_deref())?;
        let handle = self.start(request, chain);
        info!(job = %handle.id, chain = ?handle.chain, "job submitted");
        Ok(handle)
    }

    /// Submits every request on its own. Each gets its own job, or its own
    /// error, in input order.
    pub fn submit_batch(&self, requests: Vec<GenerationRequest>) -> Vec<Result<JobHandle>> {
        let total = requests.len();
        let results: Vec<Result<JobHandle>> =
            requests.into_iter().map(|r| self.submit(r)).collect();
        let rejected = results.iter().filter(|r| r.is_err()).count();
        info!(total, rejected, "batch submitted");
        results
    }

    fn start(&self, request: GenerationRequest, chain: ProviderChain) -> JobHandle {
        let entry = self.jobs.insert(Job::new(chain.kind()));
        let handle = JobHandle {
            id: entry.id(),
            kind: chain.kind(),
            chain: chain.ids(),
        };

        let orchestrator = Arc::clone(&self.orchestrator);
        let request = Arc::new(request);
        tokio::spawn(async move { orchestrator.drive(entry, request, chain).await });

        handle
    }

    /// Sends one canned request to provider `id` alone, without retries or
    /// fallback, and reports how that single attempt went. The check job is
    /// dropped from the store afterwards.
    #[instrument(skip(self))]
    pub async fn test_provider(&self, id: &str) -> Result<ProviderCheck> {
        let chain = self.router.only(id)?.without_retries();
        let kind = chain.kind();
        let limit = chain.get(0).map(|p| p.timeout).unwrap_or_default()
            + self.orchestrator.tracking().track_timeout;

        let handle = self.start(check_request(kind), chain);
        let snapshot = self.wait(handle.id, limit).await?;
        if !snapshot.is_terminal() {
            self.jobs.cancel(handle.id)?;
        }
        self.jobs.forget(handle.id)?;

        let check = match snapshot.attempts.first() {
            Some(attempt) => ProviderCheck {
                provider: id.to_string(),
                kind,
                classification: attempt.classification,
                detail: attempt.detail.clone(),
                latency_ms: attempt.latency_ms,
            },
            None => ProviderCheck {
                provider: id.to_string(),
                kind,
                classification: Classification::Transient,
                detail: Some(format!("no answer within {}s", limit.as_secs())),
                latency_ms: limit.as_millis() as u64,
            },
        };
        info!(provider = id, classification = %check.classification, "provider checked");
        Ok(check)
    }

    /// Current state of a job. Never changes it.
    pub fn poll(&self, id: JobId) -> Result<JobSnapshot> {
        self.jobs.snapshot(id)
    }

    pub fn cancel(&self, id: JobId) -> Result<CancelOutcome> {
        self.jobs.cancel(id)
    }

    /// Waits until the job is terminal or `timeout` elapses, then returns
    /// its snapshot either way.
    pub async fn wait(&self, id: JobId, timeout: Duration) -> Result<JobSnapshot> {
        let entry = self.jobs.get(id)?;
        if tokio::time::timeout(timeout, entry.wait_terminal())
            .await
            .is_err()
        {
            info!(job = %id, timeout_ms = timeout.as_millis() as u64, "wait timed out");
        }
        Ok(entry.snapshot())
    }

    /// Submits `request` and applies the per-kind wait discipline: text is
    /// awaited up to the configured window, media returns at once.
    pub async fn run(&self, request: GenerationRequest) -> Result<Submission> {
        let handle = self.submit(request)?;
        if handle.kind == GenerationKind::Text {
            let snapshot = self.wait(handle.id, self.text_wait).await?;
            if snapshot.is_terminal() {
                return Ok(Submission::Finished(snapshot));
            }
        }
        Ok(Submission::Pending(handle))
    }

    /// Removes a terminal job. Returns `false` if it is still in flight.
    pub fn forget(&self, id: JobId) -> Result<bool> {
        self.jobs.forget(id)
    }

    /// Evicts terminal jobs older than `older_than`.
    pub fn purge_finished(&self, older_than: Duration) -> usize {
        self.jobs.purge_finished(older_than)
    }

    /// Every configured provider, grouped by kind in chain order.
    pub fn providers(&self) -> Vec<&ProviderDescriptor> {
        GenerationKind::ALL
            .iter()
            .flat_map(|kind| self.router.chain(*kind))
            .collect()
    }

    /// Number of jobs currently held.
    pub fn job_count(&self) -> usize {
        self.jobs.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::Classification;
    use crate::error::GenrelayError;
    use crate::provider::{SimStep, SimulatedAdapter};
    use crate::request::OptimizeMode;
    use crate::state_machine::{JobError, JobState, Origin, ResultArtifact};

    fn settings() -> DispatchSettings {
        DispatchSettings {
            text_wait: Duration::from_secs(2),
            tracking: TrackingSettings {
                poll_interval: Duration::from_millis(2),
                track_timeout: Duration::from_secs(5),
            },
        }
    }

    fn quick(id: &str, kind: GenerationKind, retries: u32) -> ProviderDescriptor {
        ProviderDescriptor::new(id, kind)
            .with_max_retries(retries)
            .with_backoff(Duration::from_millis(1), Duration::from_millis(5))
    }

    fn dispatcher(
        providers: Vec<(ProviderDescriptor, Arc<SimulatedAdapter>)>,
        settings: DispatchSettings,
    ) -> Dispatcher {
        let mut descriptors = Vec::new();
        let mut adapters: HashMap<String, Arc<dyn ProviderAdapter>> = HashMap::new();
        for (descriptor, adapter) in providers {
            adapters.insert(descriptor.id.clone(), adapter);
            descriptors.push(descriptor);
        }
        Dispatcher::new(ProviderRouter::new(descriptors), adapters, settings)
    }

    fn finished(submission: Submission) -> JobSnapshot {
        match submission {
            Submission::Finished(snapshot) => snapshot,
            Submission::Pending(handle) => panic!("job {} still pending", handle.id),
        }
    }

    async fn wait_until_running(d: &Dispatcher, id: JobId) {
        for _ in 0..200 {
            if d.poll(id).unwrap().state == JobState::Running {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("job {id} never started");
    }

    #[tokio::test]
    async fn exhausted_chain_records_every_attempt() {
        let a = Arc::new(SimulatedAdapter::new("a", vec![SimStep::Fail(429)]));
        let b = Arc::new(SimulatedAdapter::new("b", vec![SimStep::Fail(429)]));
        let d = dispatcher(
            vec![
                (quick("a", GenerationKind::Text, 1), a.clone()),
                (quick("b", GenerationKind::Text, 0), b.clone()),
            ],
            settings(),
        );

        let snap = finished(
            d.run(GenerationRequest::text("hello", OptimizeMode::Creative))
                .await
                .unwrap(),
        );
        assert_eq!(snap.state, JobState::Failed);
        assert_eq!(snap.attempts.len(), 3);
        let numbers: Vec<u32> = snap.attempts.iter().map(|a| a.number).collect();
        assert_eq!(numbers, vec![1, 2, 3]);
        assert!(matches!(snap.error, Some(JobError::ExhaustedProviders { .. })));
        assert!(snap.result.is_none());
        assert_eq!((a.calls(), b.calls()), (2, 1));
    }

    #[tokio::test]
    async fn primary_success_never_touches_fallback() {
        let a = Arc::new(SimulatedAdapter::reliable("a"));
        let b = Arc::new(SimulatedAdapter::reliable("b"));
        let d = dispatcher(
            vec![
                (quick("a", GenerationKind::Text, 1), a.clone()),
                (quick("b", GenerationKind::Text, 0), b.clone()),
            ],
            settings(),
        );

        let snap = finished(
            d.run(GenerationRequest::text("hello", OptimizeMode::Seo))
                .await
                .unwrap(),
        );
        assert_eq!(snap.state, JobState::Succeeded);
        assert_eq!(snap.attempts.len(), 1);
        assert_eq!(snap.text(), Some("[a] hello"));
        assert_eq!(snap.result.as_ref().map(|r| r.origin), Some(Origin::Primary));
        assert!(snap.error.is_none());
        assert_eq!(b.calls(), 0);
    }

    #[tokio::test]
    async fn permanent_failure_skips_retries() {
        let a = Arc::new(SimulatedAdapter::new("a", vec![SimStep::Fail(400)]));
        let b = Arc::new(SimulatedAdapter::reliable("b"));
        let d = dispatcher(
            vec![
                (quick("a", GenerationKind::Text, 3), a.clone()),
                (quick("b", GenerationKind::Text, 0), b.clone()),
            ],
            settings(),
        );

        let snap = finished(
            d.run(GenerationRequest::text("hello", OptimizeMode::Social))
                .await
                .unwrap(),
        );
        assert_eq!(a.calls(), 1);
        assert_eq!(snap.attempts[0].classification, Classification::Permanent);
        assert_eq!(snap.state, JobState::Succeeded);
        assert_eq!(snap.result.unwrap().origin, Origin::Fallback);
    }

    #[tokio::test]
    async fn cancel_running_job_discards_in_flight_call() {
        let a = Arc::new(SimulatedAdapter::new("a", vec![SimStep::Hang]));
        let d = dispatcher(vec![(quick("a", GenerationKind::Text, 0), a)], settings());

        let handle = d
            .submit(GenerationRequest::text("hello", OptimizeMode::Creative))
            .unwrap();
        wait_until_running(&d, handle.id).await;

        assert_eq!(d.cancel(handle.id).unwrap(), CancelOutcome::Cancelled);
        let snap = d.wait(handle.id, Duration::from_millis(100)).await.unwrap();
        assert_eq!(snap.state, JobState::Failed);
        assert_eq!(snap.error, Some(JobError::Cancelled));
        assert!(snap.attempts.is_empty());
        assert!(snap.result.is_none());

        assert_eq!(d.cancel(handle.id).unwrap(), CancelOutcome::AlreadyTerminal);
    }

    #[tokio::test]
    async fn cancel_during_backoff_stops_retries() {
        let a = Arc::new(SimulatedAdapter::new("a", vec![SimStep::Fail(503)]));
        let descriptor = ProviderDescriptor::new("a", GenerationKind::Text)
            .with_max_retries(5)
            .with_backoff(Duration::from_secs(30), Duration::from_secs(30));
        let d = dispatcher(vec![(descriptor, a.clone())], settings());

        let handle = d
            .submit(GenerationRequest::text("hello", OptimizeMode::Creative))
            .unwrap();
        for _ in 0..200 {
            if !d.poll(handle.id).unwrap().attempts.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        d.cancel(handle.id).unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        let snap = d.poll(handle.id).unwrap();
        assert_eq!(snap.error, Some(JobError::Cancelled));
        assert_eq!(snap.attempts.len(), 1);
        assert_eq!(a.calls(), 1);
    }

    #[tokio::test]
    async fn media_jobs_return_pending_then_settle() {
        let wan = Arc::new(SimulatedAdapter::reliable("wan"));
        let d = dispatcher(vec![(quick("wan", GenerationKind::Video, 0), wan)], settings());

        let Submission::Pending(handle) = d.run(GenerationRequest::video("sunset")).await.unwrap()
        else {
            panic!("video jobs never block");
        };
        assert_eq!(handle.chain, vec!["wan"]);

        let snap = d.wait(handle.id, Duration::from_secs(2)).await.unwrap();
        assert_eq!(snap.state, JobState::Succeeded);
        assert_eq!(snap.progress, 100);
        assert!(matches!(
            snap.result.map(|r| r.artifact),
            Some(ResultArtifact::Video(_))
        ));
    }

    #[tokio::test]
    async fn slow_text_job_comes_back_pending() {
        let a = Arc::new(SimulatedAdapter::new(
            "a",
            vec![SimStep::Slow(Duration::from_millis(300))],
        ));
        let mut s = settings();
        s.text_wait = Duration::from_millis(20);
        let d = dispatcher(vec![(quick("a", GenerationKind::Text, 0), a)], s);

        let submission = d
            .run(GenerationRequest::text("hello", OptimizeMode::Creative))
            .await
            .unwrap();
        let Submission::Pending(handle) = submission else {
            panic!("expected pending submission");
        };
        let snap = d.wait(handle.id, Duration::from_secs(2)).await.unwrap();
        assert_eq!(snap.state, JobState::Succeeded);
    }

    #[tokio::test]
    async fn invalid_request_creates_no_job() {
        let d = dispatcher(
            vec![(
                quick("a", GenerationKind::Text, 0),
                Arc::new(SimulatedAdapter::reliable("a")),
            )],
            settings(),
        );
        let err = d
            .submit(GenerationRequest::text("   ", OptimizeMode::Creative))
            .unwrap_err();
        assert!(matches!(err, GenrelayError::InvalidRequest(_)));
        assert_eq!(d.job_count(), 0);

        let err = d.submit(GenerationRequest::audio("hi")).unwrap_err();
        assert!(matches!(err, GenrelayError::NoProviders(GenerationKind::Audio)));
        assert_eq!(d.job_count(), 0);
    }

    #[tokio::test]
    async fn provider_hint_goes_first() {
        let a = Arc::new(SimulatedAdapter::reliable("a"));
        let b = Arc::new(SimulatedAdapter::reliable("b"));
        let d = dispatcher(
            vec![
                (quick("a", GenerationKind::Text, 0), a.clone()),
                (quick("b", GenerationKind::Text, 0), b.clone()),
            ],
            settings(),
        );

        let snap = finished(
            d.run(GenerationRequest::text("hi", OptimizeMode::Creative).with_provider("b"))
                .await
                .unwrap(),
        );
        assert_eq!(snap.text(), Some("[b] hi"));
        assert_eq!(snap.result.unwrap().origin, Origin::Primary);
        assert_eq!(a.calls(), 0);
    }

    #[tokio::test]
    async fn batch_rejects_bad_requests_individually() {
        let a = Arc::new(SimulatedAdapter::reliable("a"));
        let d = dispatcher(vec![(quick("a", GenerationKind::Text, 0), a.clone())], settings());

        let results = d.submit_batch(vec![
            GenerationRequest::text("first", OptimizeMode::Creative),
            GenerationRequest::text("  ", OptimizeMode::Creative),
            GenerationRequest::audio("no audio providers here"),
            GenerationRequest::text("last", OptimizeMode::Seo),
        ]);
        assert_eq!(results.len(), 4);
        assert!(matches!(results[1], Err(GenrelayError::InvalidRequest(_))));
        assert!(matches!(results[2], Err(GenrelayError::NoProviders(GenerationKind::Audio))));
        assert_eq!(d.job_count(), 2);

        let mut texts = Vec::new();
        for result in [&results[0], &results[3]] {
            let handle = result.as_ref().unwrap();
            let snap = d.wait(handle.id, Duration::from_secs(2)).await.unwrap();
            assert_eq!(snap.state, JobState::Succeeded);
            texts.push(snap.text().map(str::to_string));
        }
        assert_eq!(texts, vec![Some("[a] first".into()), Some("[a] last".into())]);
        assert_eq!(a.calls(), 2);
    }

    #[tokio::test]
    async fn provider_check_reports_success() {
        let a = Arc::new(SimulatedAdapter::reliable("a"));
        let b = Arc::new(SimulatedAdapter::reliable("b"));
        let d = dispatcher(
            vec![
                (quick("a", GenerationKind::Text, 0), a.clone()),
                (quick("b", GenerationKind::Text, 0), b.clone()),
            ],
            settings(),
        );

        let check = d.test_provider("b").await.unwrap();
        assert!(check.is_ok());
        assert_eq!(check.provider, "b");
        assert_eq!(check.kind, GenerationKind::Text);
        assert!(check.detail.is_none());
        assert_eq!((a.calls(), b.calls()), (0, 1));
        assert_eq!(d.job_count(), 0);
    }

    #[tokio::test]
    async fn provider_check_makes_a_single_attempt() {
        let a = Arc::new(SimulatedAdapter::new("a", vec![SimStep::Fail(429)]));
        let b = Arc::new(SimulatedAdapter::reliable("b"));
        let d = dispatcher(
            vec![
                (quick("a", GenerationKind::Text, 3), a.clone()),
                (quick("b", GenerationKind::Text, 0), b.clone()),
            ],
            settings(),
        );

        let check = d.test_provider("a").await.unwrap();
        assert!(!check.is_ok());
        assert_eq!(check.classification, Classification::RateLimited);
        assert!(check.detail.is_some());
        assert_eq!((a.calls(), b.calls()), (1, 0));
    }

    #[tokio::test]
    async fn provider_check_follows_media_tasks() {
        let wan = Arc::new(SimulatedAdapter::reliable("wan"));
        let d = dispatcher(vec![(quick("wan", GenerationKind::Video, 0), wan)], settings());

        let check = d.test_provider("wan").await.unwrap();
        assert!(check.is_ok());
        assert_eq!(check.kind, GenerationKind::Video);
    }

    #[tokio::test]
    async fn provider_check_of_unknown_id_fails() {
        let d = dispatcher(Vec::new(), settings());
        assert!(matches!(
            d.test_provider("sora").await,
            Err(GenrelayError::ProviderNotConfigured(id)) if id == "sora"
        ));
    }

    #[tokio::test]
    async fn unknown_job_ids_are_errors() {
        let d = dispatcher(Vec::new(), settings());
        let id = JobId::new();
        assert!(matches!(d.poll(id), Err(GenrelayError::JobNotFound(_))));
        assert!(d.cancel(id).is_err());
        assert!(d.wait(id, Duration::from_millis(1)).await.is_err());
    }

    #[tokio::test]
    async fn forget_and_purge() {
        let d = dispatcher(
            vec![(
                quick("a", GenerationKind::Text, 0),
                Arc::new(SimulatedAdapter::reliable("a")),
            )],
            settings(),
        );
        let first = finished(
            d.run(GenerationRequest::text("one", OptimizeMode::Creative))
                .await
                .unwrap(),
        );
        finished(
            d.run(GenerationRequest::text("two", OptimizeMode::Creative))
                .await
                .unwrap(),
        );

        assert!(d.forget(first.id).unwrap());
        assert!(d.poll(first.id).is_err());
        assert_eq!(d.purge_finished(Duration::ZERO), 1);
        assert_eq!(d.job_count(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_jobs_do_not_interfere() {
        let a = Arc::new(SimulatedAdapter::new("a", vec![SimStep::Fail(429)]));
        let b = Arc::new(SimulatedAdapter::reliable("b"));
        let d = Arc::new(dispatcher(
            vec![
                (quick("a", GenerationKind::Text, 1), a.clone()),
                (quick("b", GenerationKind::Text, 0), b.clone()),
            ],
            settings(),
        ));

        let handles: Vec<JobHandle> = (0..50)
            .map(|i| {
                d.submit(GenerationRequest::text(format!("job {i}"), OptimizeMode::Concise))
                    .unwrap()
            })
            .collect();

        for (i, handle) in handles.iter().enumerate() {
            let snap = d.wait(handle.id, Duration::from_secs(5)).await.unwrap();
            assert_eq!(snap.state, JobState::Succeeded, "job {i}");
            let trail: Vec<(u32, &str)> = snap
                .attempts
                .iter()
                .map(|a| (a.number, a.provider.as_str()))
                .collect();
            assert_eq!(trail, vec![(1, "a"), (2, "a"), (3, "b")], "job {i}");
            assert_eq!(snap.text(), Some(format!("[b] job {i}").as_str()));
            assert_eq!(snap.result.as_ref().map(|r| r.origin), Some(Origin::Fallback));
        }
        assert_eq!(a.calls(), 100);
        assert_eq!(b.calls(), 50);
    }

    #[test]
    fn from_config_skips_providers_without_keys() {
        let mut config = GenrelayConfig::demo();
        let mut keyed = crate::config::ProviderConfig::simulated("keyed", GenerationKind::Text, Vec::new());
        keyed.api_key_env = Some("GENRELAY_TEST_DISPATCH_KEY_NEVER_SET".into());
        config.providers.push(keyed);

        let d = Dispatcher::from_config(&config).unwrap();
        let ids: Vec<&str> = d.providers().iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["sim-busy", "sim-steady", "sim-video", "sim-tts"]);
    }

    #[test]
    fn providers_listed_by_kind_in_chain_order() {
        let d = dispatcher(
            vec![
                (
                    quick("tts", GenerationKind::Audio, 0),
                    Arc::new(SimulatedAdapter::reliable("tts")),
                ),
                (
                    quick("late", GenerationKind::Text, 0).with_priority(5),
                    Arc::new(SimulatedAdapter::reliable("late")),
                ),
                (
                    quick("early", GenerationKind::Text, 0).with_priority(1),
                    Arc::new(SimulatedAdapter::reliable("early")),
                ),
            ],
            settings(),
        );
        let ids: Vec<&str> = d.providers().iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["early", "late", "tts"]);
    }
}
