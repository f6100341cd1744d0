//! Uniform access to third-party generation backends.
//!
//! Every backend implements [`ProviderAdapter`]. Adapters issue exactly one
//! outbound call per invocation and never retry on their own; the
//! [`invoke`] and [`track`] wrappers bound each call by the provider's
//! configured timeout.

pub mod chat;
pub mod comfyui;
pub mod simulated;
pub mod task_api;
pub mod types;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{instrument, warn};

use crate::config::{Protocol, ProviderConfig};
use crate::error::{GenrelayError, Result};
use crate::request::{GenerationKind, GenerationRequest};

pub use chat::ChatAdapter;
pub use comfyui::ComfyUiAdapter;
pub use simulated::{SimStep, SimulatedAdapter};
pub use task_api::TaskApiAdapter;

/// Static policy data for one provider: where it sits in its kind's chain
/// and how hard to push it before falling back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderDescriptor {
    pub id: String,
    pub kind: GenerationKind,
    /// Lower ranks are tried first.
    pub priority: u32,
    pub timeout: Duration,
    pub max_retries: u32,
    pub backoff_base: Duration,
    pub backoff_cap: Duration,
}

impl ProviderDescriptor {
    pub fn new(id: impl Into<String>, kind: GenerationKind) -> Self {
        Self {
            id: id.into(),
            kind,
            priority: 0,
            timeout: Duration::from_secs(30),
            max_retries: 2,
            backoff_base: Duration::from_millis(1000),
            backoff_cap: Duration::from_secs(30),
        }
    }

    pub fn with_priority(mut self, priority: u32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_backoff(mut self, base: Duration, cap: Duration) -> Self {
        self.backoff_base = base;
        self.backoff_cap = cap;
        self
    }

    /// Exponential backoff after `tries` attempts on this provider.
    /// delay = base * 2^(tries - 1), capped at `backoff_cap`.
    pub fn backoff_for(&self, tries: u32) -> Duration {
        let factor = 2u32
            .checked_pow(tries.saturating_sub(1))
            .unwrap_or(u32::MAX);
        self.backoff_base
            .checked_mul(factor)
            .unwrap_or(self.backoff_cap)
            .min(self.backoff_cap)
    }
}

/// Reference to a generated media file. The bytes stay with the provider
/// or the storage collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaArtifact {
    /// URL or path where the artifact can be fetched.
    pub location: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
}

impl MediaArtifact {
    pub fn at(location: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            duration_secs: None,
            size_bytes: None,
            format: None,
        }
    }
}

/// Payload of a successful provider call.
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderOutput {
    /// Finished text (text optimization).
    Text(String),
    /// Finished media, returned synchronously.
    Media(MediaArtifact),
    /// The provider started a long-running task identified by `token`.
    Accepted { token: String },
}

/// What went wrong on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureDescriptor {
    /// HTTP-like status; `None` for transport failures and timeouts.
    pub status: Option<u16>,
    pub body: String,
    pub retry_after: Option<Duration>,
}

const SUMMARY_BODY_CHARS: usize = 200;

impl FailureDescriptor {
    pub fn http(status: u16, body: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            body: body.into(),
            retry_after: None,
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self {
            status: None,
            body: message.into(),
            retry_after: None,
        }
    }

    pub fn timeout(after: Duration) -> Self {
        Self::transport(format!("timed out after {}ms", after.as_millis()))
    }

    pub fn with_retry_after(mut self, retry_after: Option<Duration>) -> Self {
        self.retry_after = retry_after;
        self
    }

    /// Short human-readable form for the attempts audit trail.
    pub fn summary(&self) -> String {
        let body: String = self.body.chars().take(SUMMARY_BODY_CHARS).collect();
        match self.status {
            Some(status) => format!("status {status}: {body}"),
            None => body,
        }
    }
}

impl From<reqwest::Error> for FailureDescriptor {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => Self::http(status.as_u16(), err.to_string()),
            None => Self::transport(err.to_string()),
        }
    }
}

/// Raw result of one provider call, before classification.
#[derive(Debug, Clone, PartialEq)]
pub enum RawOutcome {
    Success(ProviderOutput),
    Failure(FailureDescriptor),
}

/// Result of one status query against a long-running provider task.
#[derive(Debug, Clone, PartialEq)]
pub enum TrackOutcome {
    Running { progress: Option<u8> },
    Finished(MediaArtifact),
    /// The provider reports the task itself failed.
    Rejected(FailureDescriptor),
    /// The status query failed; the task may still be alive.
    Unreachable(FailureDescriptor),
}

/// One external generation backend.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    fn id(&self) -> &str;

    /// Issues exactly one outbound call for `request`.
    async fn call(&self, request: &GenerationRequest) -> RawOutcome;

    /// Queries a task previously started by [`call`](Self::call).
    async fn status(&self, token: &str) -> TrackOutcome {
        TrackOutcome::Rejected(FailureDescriptor::http(
            400,
            format!("provider {} does not run asynchronous tasks (token {token})", self.id()),
        ))
    }
}

/// Calls `adapter`, turning a timeout into a transient failure.
#[instrument(skip_all, fields(provider = %descriptor.id))]
pub async fn invoke(
    adapter: &dyn ProviderAdapter,
    request: &GenerationRequest,
    descriptor: &ProviderDescriptor,
) -> RawOutcome {
    match tokio::time::timeout(descriptor.timeout, adapter.call(request)).await {
        Ok(outcome) => outcome,
        Err(_) => {
            warn!(timeout_ms = descriptor.timeout.as_millis() as u64, "provider call timed out");
            RawOutcome::Failure(FailureDescriptor::timeout(descriptor.timeout))
        }
    }
}

/// Queries task `token`, turning a timeout into an unreachable status.
#[instrument(skip_all, fields(provider = %descriptor.id))]
pub async fn track(
    adapter: &dyn ProviderAdapter,
    token: &str,
    descriptor: &ProviderDescriptor,
) -> TrackOutcome {
    match tokio::time::timeout(descriptor.timeout, adapter.status(token)).await {
        Ok(outcome) => outcome,
        Err(_) => {
            warn!(token = %token, "status query timed out");
            TrackOutcome::Unreachable(FailureDescriptor::timeout(descriptor.timeout))
        }
    }
}

/// Turns a non-success HTTP response into a failure descriptor, keeping the
/// `retry-after` hint of 429 responses.
pub(crate) async fn failure_from_response(response: reqwest::Response) -> FailureDescriptor {
    let status = response.status();
    let retry_after = response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs);
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "unknown error".to_string());
    FailureDescriptor::http(status.as_u16(), body).with_retry_after(retry_after)
}

/// Builds the adapter for one configured provider.
pub fn build_adapter(
    config: &ProviderConfig,
    api_key: Option<String>,
    client: &reqwest::Client,
) -> Result<Arc<dyn ProviderAdapter>> {
    let endpoint = || {
        config.endpoint.clone().ok_or_else(|| {
            GenrelayError::Config(format!("provider {} requires an endpoint", config.id))
        })
    };

    let adapter: Arc<dyn ProviderAdapter> = match config.protocol {
        Protocol::Chat | Protocol::Qwen => Arc::new(ChatAdapter::new(
            config.id.clone(),
            config.protocol,
            endpoint()?,
            config.model.clone().unwrap_or_default(),
            api_key,
            client.clone(),
        )),
        Protocol::Comfyui => Arc::new(ComfyUiAdapter::new(
            config.id.clone(),
            endpoint()?,
            client.clone(),
        )),
        Protocol::Task => Arc::new(TaskApiAdapter::new(
            config.id.clone(),
            endpoint()?,
            config.model.clone(),
            api_key,
            client.clone(),
        )),
        Protocol::Simulated => Arc::new(SimulatedAdapter::new(
            config.id.clone(),
            config.script.clone(),
        )),
    };
    Ok(adapter)
}
