use async_trait::async_trait;
use reqwest::Client;
use tracing::instrument;

use super::types::{TaskAccepted, TaskState, TaskStatus, TaskSubmission};
use super::{
    FailureDescriptor, MediaArtifact, ProviderAdapter, ProviderOutput, RawOutcome, TrackOutcome,
    failure_from_response,
};
use crate::request::GenerationRequest;

/// Hosted generation service exposing a submit/poll task API
/// (speech synthesis, hosted video models).
pub struct TaskApiAdapter {
    id: String,
    base_url: String,
    model: Option<String>,
    api_key: Option<String>,
    client: Client,
}

impl TaskApiAdapter {
    pub fn new(
        id: String,
        base_url: String,
        model: Option<String>,
        api_key: Option<String>,
        client: Client,
    ) -> Self {
        Self {
            id,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            api_key,
            client,
        }
    }

    fn authorized(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }
}

fn interpret(status: TaskStatus) -> TrackOutcome {
    match status.status {
        TaskState::Succeeded => match status.output {
            Some(output) => TrackOutcome::Finished(MediaArtifact {
                location: output.url,
                duration_secs: output.duration,
                size_bytes: output.size,
                format: output.format,
            }),
            None => TrackOutcome::Rejected(FailureDescriptor::http(
                500,
                "task succeeded without output",
            )),
        },
        TaskState::Failed => TrackOutcome::Rejected(FailureDescriptor::http(
            500,
            status.error.unwrap_or_else(|| "task failed".to_string()),
        )),
        TaskState::Queued | TaskState::Running | TaskState::Unknown => TrackOutcome::Running {
            progress: status.progress.map(|p| p.clamp(0.0, 100.0) as u8),
        },
    }
}

#[async_trait]
impl ProviderAdapter for TaskApiAdapter {
    fn id(&self) -> &str {
        &self.id
    }

    #[instrument(skip_all, fields(provider = %self.id))]
    async fn call(&self, request: &GenerationRequest) -> RawOutcome {
        let body = TaskSubmission {
            model: self.model.as_deref(),
            kind: request.kind(),
            input: &request.payload,
        };
        let builder = self
            .client
            .post(format!("{}/tasks", self.base_url))
            .json(&body);

        let response = match self.authorized(builder).send().await {
            Ok(r) => r,
            Err(e) => return RawOutcome::Failure(e.into()),
        };

        if !response.status().is_success() {
            return RawOutcome::Failure(failure_from_response(response).await);
        }

        match response.json::<TaskAccepted>().await {
            Ok(accepted) => RawOutcome::Success(ProviderOutput::Accepted {
                token: accepted.task_id,
            }),
            Err(e) => RawOutcome::Failure(FailureDescriptor::transport(format!(
                "unreadable task acknowledgment: {e}"
            ))),
        }
    }

    #[instrument(skip_all, fields(provider = %self.id, token = %token))]
    async fn status(&self, token: &str) -> TrackOutcome {
        let builder = self.client.get(format!("{}/tasks/{token}", self.base_url));
        let response = match self.authorized(builder).send().await {
            Ok(r) => r,
            Err(e) => return TrackOutcome::Unreachable(e.into()),
        };

        let code = response.status();
        if code == reqwest::StatusCode::NOT_FOUND {
            // Unknown task.
            return TrackOutcome::Rejected(failure_from_response(response).await);
        }
        if !code.is_success() {
            return TrackOutcome::Unreachable(failure_from_response(response).await);
        }

        match response.json::<TaskStatus>().await {
            Ok(status) => interpret(status),
            Err(e) => TrackOutcome::Unreachable(FailureDescriptor::transport(format!(
                "unreadable task status: {e}"
            ))),
        }
    }
}
