//! Scripted provider for demos and tests.
//!
//! Each call consumes the next [`SimStep`] of the script; once the script is
//! exhausted the last step repeats, so `["fail:429"]` is a provider that is
//! always rate limited and an empty script always succeeds.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Deserialize;

use super::{FailureDescriptor, MediaArtifact, ProviderAdapter, ProviderOutput, RawOutcome, TrackOutcome};
use crate::error::GenrelayError;
use crate::request::{GenerationRequest, Payload};

const PROGRESS_STEP: u8 = 25;

/// One scripted response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub enum SimStep {
    Ok,
    Fail(u16),
    /// Succeeds after sleeping.
    Slow(Duration),
    /// Never answers.
    Hang,
}

impl FromStr for SimStep {
    type Err = GenrelayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad = || GenrelayError::Config(format!("invalid simulated step: {s}"));
        match s.split_once(':') {
            None if s == "ok" => Ok(SimStep::Ok),
            None if s == "hang" => Ok(SimStep::Hang),
            Some(("fail", code)) => code.parse().map(SimStep::Fail).map_err(|_| bad()),
            Some(("slow", ms)) => ms
                .parse()
                .map(|ms| SimStep::Slow(Duration::from_millis(ms)))
                .map_err(|_| bad()),
            _ => Err(bad()),
        }
    }
}

impl TryFrom<String> for SimStep {
    type Error = GenrelayError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl fmt::Display for SimStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SimStep::Ok => write!(f, "ok"),
            SimStep::Fail(code) => write!(f, "fail:{code}"),
            SimStep::Slow(d) => write!(f, "slow:{}", d.as_millis()),
            SimStep::Hang => write!(f, "hang"),
        }
    }
}

pub struct SimulatedAdapter {
    id: String,
    script: Vec<SimStep>,
    calls: AtomicUsize,
    tasks: Mutex<HashMap<String, u8>>,
}

impl SimulatedAdapter {
    pub fn new(id: impl Into<String>, script: Vec<SimStep>) -> Self {
        Self {
            id: id.into(),
            script,
            calls: AtomicUsize::new(0),
            tasks: Mutex::new(HashMap::new()),
        }
    }

    /// Always succeeds.
    pub fn reliable(id: impl Into<String>) -> Self {
        Self::new(id, Vec::new())
    }

    /// Number of `call` invocations so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn step(&self, n: usize) -> SimStep {
        self.script
            .get(n)
            .or_else(|| self.script.last())
            .copied()
            .unwrap_or(SimStep::Ok)
    }

    fn succeed(&self, request: &GenerationRequest, n: usize) -> RawOutcome {
        match &request.payload {
            Payload::Text { text, .. } => {
                RawOutcome::Success(ProviderOutput::Text(format!("[{}] {}", self.id, text.trim())))
            }
            Payload::Video { .. } | Payload::Audio { .. } => {
                let token = format!("{}-task-{}", self.id, n + 1);
                self.tasks.lock().insert(token.clone(), 0);
                RawOutcome::Success(ProviderOutput::Accepted { token })
            }
        }
    }
}

#[async_trait]
impl ProviderAdapter for SimulatedAdapter {
    fn id(&self) -> &str {
        &self.id
    }

    async fn call(&self, request: &GenerationRequest) -> RawOutcome {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        match self.step(n) {
            SimStep::Ok => self.succeed(request, n),
            SimStep::Fail(code) => RawOutcome::Failure(FailureDescriptor::http(
                code,
                format!("simulated failure from {}", self.id),
            )),
            SimStep::Slow(delay) => {
                tokio::time::sleep(delay).await;
                self.succeed(request, n)
            }
            SimStep::Hang => std::future::pending().await,
        }
    }

    async fn status(&self, token: &str) -> TrackOutcome {
        let mut tasks = self.tasks.lock();
        let Some(progress) = tasks.get_mut(token) else {
            return TrackOutcome::Rejected(FailureDescriptor::http(404, format!("unknown task {token}")));
        };
        *progress = progress.saturating_add(PROGRESS_STEP).min(100);
        if *progress < 100 {
            return TrackOutcome::Running {
                progress: Some(*progress),
            };
        }
        TrackOutcome::Finished(MediaArtifact {
            location: format!("sim://{}/{token}", self.id),
            duration_secs: Some(5.0),
            size_bytes: Some(1_048_576),
            format: None,
        })
    }
}
