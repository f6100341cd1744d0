use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, instrument};

use super::types::{ChatMessage, ChatRequest, CompletionBody, QwenInput, QwenParameters, QwenRequest};
use super::{FailureDescriptor, ProviderAdapter, ProviderOutput, RawOutcome, failure_from_response};
use crate::config::Protocol;
use crate::request::{GenerationRequest, Payload};

const SYSTEM_PROMPT: &str =
    "You are a professional copy editor who improves the quality and expressiveness of text.";
const MAX_TOKENS: u32 = 4000;
const TEMPERATURE: f32 = 0.7;

/// Text optimization through an OpenAI-compatible chat API
/// (OpenAI, Zhipu GLM, Moonshot, Doubao) or the DashScope dialect (Qwen).
pub struct ChatAdapter {
    id: String,
    protocol: Protocol,
    base_url: String,
    model: String,
    api_key: Option<String>,
    client: Client,
}

impl ChatAdapter {
    pub fn new(
        id: String,
        protocol: Protocol,
        base_url: String,
        model: String,
        api_key: Option<String>,
        client: Client,
    ) -> Self {
        Self {
            id,
            protocol,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            api_key,
            client,
        }
    }

    fn url(&self) -> String {
        match self.protocol {
            Protocol::Qwen => format!("{}/services/aigc/text-generation/generation", self.base_url),
            _ => format!("{}/chat/completions", self.base_url),
        }
    }

    fn body(&self, prompt: String) -> serde_json::Result<serde_json::Value> {
        let messages = vec![ChatMessage::system(SYSTEM_PROMPT), ChatMessage::user(prompt)];
        match self.protocol {
            Protocol::Qwen => serde_json::to_value(QwenRequest {
                model: self.model.clone(),
                input: QwenInput { messages },
                parameters: QwenParameters {
                    max_tokens: MAX_TOKENS,
                    temperature: TEMPERATURE,
                },
            }),
            _ => serde_json::to_value(ChatRequest {
                model: self.model.clone(),
                messages,
                max_tokens: MAX_TOKENS,
                temperature: TEMPERATURE,
            }),
        }
    }
}

#[async_trait]
impl ProviderAdapter for ChatAdapter {
    fn id(&self) -> &str {
        &self.id
    }

    #[instrument(skip_all, fields(provider = %self.id, model = %self.model))]
    async fn call(&self, request: &GenerationRequest) -> RawOutcome {
        let Payload::Text {
            text,
            mode,
            custom_prompt,
        } = &request.payload
        else {
            return RawOutcome::Failure(FailureDescriptor::http(
                400,
                format!("{} only serves text optimization", self.id),
            ));
        };

        let body = match self.body(mode.render(text, custom_prompt.as_deref())) {
            Ok(body) => body,
            Err(e) => return RawOutcome::Failure(FailureDescriptor::http(400, e.to_string())),
        };

        let mut builder = self.client.post(self.url()).json(&body);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = match builder.send().await {
            Ok(r) => r,
            Err(e) => return RawOutcome::Failure(e.into()),
        };

        if !response.status().is_success() {
            return RawOutcome::Failure(failure_from_response(response).await);
        }

        let status = response.status().as_u16();
        match response.json::<CompletionBody>().await {
            Ok(completion) => {
                let text = completion.into_text().unwrap_or_default();
                debug!(chars = text.chars().count(), "completion received");
                RawOutcome::Success(ProviderOutput::Text(text))
            }
            // Unreadable 2xx bodies reach the classifier as failures.
            Err(e) => RawOutcome::Failure(FailureDescriptor::http(
                status,
                format!("unreadable completion: {e}"),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::{Classification, classify};
    use crate::request::OptimizeMode;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn adapter(server: &MockServer, protocol: Protocol) -> ChatAdapter {
        ChatAdapter::new(
            "zhipu".into(),
            protocol,
            server.uri(),
            "glm-4".into(),
            Some("sk-test".into()),
            Client::new(),
        )
    }

    #[tokio::test]
    async fn openai_compatible_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(serde_json::json!({"model": "glm-4", "max_tokens": 4000})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"role": "assistant", "content": "Polished."}}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let req = GenerationRequest::text("rough", OptimizeMode::Creative);
        let outcome = adapter(&server, Protocol::Chat).call(&req).await;
        assert_eq!(outcome, RawOutcome::Success(ProviderOutput::Text("Polished.".into())));
    }

    #[tokio::test]
    async fn qwen_dialect_uses_dashscope_path() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/services/aigc/text-generation/generation"))
            .and(body_partial_json(serde_json::json!({"parameters": {"max_tokens": 4000}})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "output": {"text": "通义结果"}
            })))
            .mount(&server)
            .await;

        let req = GenerationRequest::text("原文", OptimizeMode::Concise);
        let outcome = adapter(&server, Protocol::Qwen).call(&req).await;
        assert_eq!(outcome, RawOutcome::Success(ProviderOutput::Text("通义结果".into())));
    }

    #[tokio::test]
    async fn rate_limit_keeps_retry_after() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(429)
                    .insert_header("retry-after", "7")
                    .set_body_string("too many requests"),
            )
            .mount(&server)
            .await;

        let req = GenerationRequest::text("x", OptimizeMode::Creative);
        let outcome = adapter(&server, Protocol::Chat).call(&req).await;
        match &outcome {
            RawOutcome::Failure(f) => {
                assert_eq!(f.status, Some(429));
                assert_eq!(f.retry_after, Some(std::time::Duration::from_secs(7)));
            }
            other => panic!("expected failure, got {other:?}"),
        }
        assert_eq!(classify(&outcome), Classification::RateLimited);
    }

    #[tokio::test]
    async fn auth_error_is_permanent() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("invalid api key"))
            .mount(&server)
            .await;

        let req = GenerationRequest::text("x", OptimizeMode::Creative);
        let outcome = adapter(&server, Protocol::Chat).call(&req).await;
        assert_eq!(classify(&outcome), Classification::Permanent);
    }

    #[tokio::test]
    async fn unreadable_success_is_not_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>gateway</html>"))
            .mount(&server)
            .await;

        let req = GenerationRequest::text("x", OptimizeMode::Creative);
        let outcome = adapter(&server, Protocol::Chat).call(&req).await;
        assert_eq!(classify(&outcome), Classification::Transient);
    }

    #[tokio::test]
    async fn rejects_non_text_payload_without_calling() {
        let server = MockServer::start().await;
        let req = GenerationRequest::video("sunset");
        let outcome = adapter(&server, Protocol::Chat).call(&req).await;
        assert_eq!(classify(&outcome), Classification::Permanent);
        assert!(server.received_requests().await.unwrap().is_empty());
    }
}
