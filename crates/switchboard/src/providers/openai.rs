use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::Value;
use tracing::debug;

use super::base::{ChatMessage, Completion, Provider, ToolSpec};
use super::errors::ProviderError;
use super::formats::create_request;
use super::formats::response_to_completion;
use crate::config::ProviderConfig;
use crate::model::ModelConfig;

pub const OPENAI_DEFAULT_HOST: &str = "https://api.openai.com";
pub const OPENAI_CHAT_PATH: &str = "v1/chat/completions";
pub const OPENAI_DEFAULT_TIMEOUT_SECS: u64 = 600;

/// Reasoning provider speaking the OpenAI-compatible chat-completions API.
/// Works against any host that honors the format.
#[derive(Debug, Clone)]
pub struct OpenAiProvider {
    client: reqwest::Client,
    host: String,
    api_key: String,
    model: ModelConfig,
}

impl OpenAiProvider {
    pub fn new(
        host: String,
        api_key: String,
        model: ModelConfig,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::ExecutionError(format!("client build failed: {e}")))?;

        Ok(OpenAiProvider {
            client,
            host,
            api_key,
            model,
        })
    }

    /// Builds the provider described by the service configuration, resolving the
    /// API key through the configured environment variable. A missing key is an
    /// operator error surfaced at boot, not a runtime degradation.
    pub fn from_config(config: &ProviderConfig) -> anyhow::Result<Self> {
        let api_key = std::env::var(&config.api_key_env).map_err(|_| {
            anyhow::anyhow!(
                "provider API key environment variable {} is not set",
                config.api_key_env
            )
        })?;

        let mut model = ModelConfig::new(config.model.clone());
        if let Some(temperature) = config.temperature {
            model = model.with_temperature(temperature);
        }

        Ok(OpenAiProvider::new(
            config.host.clone(),
            api_key,
            model,
            Duration::from_secs(config.timeout_secs),
        )?)
    }

    async fn post(&self, payload: &Value) -> Result<Value, ProviderError> {
        let url = format!("{}/{}", self.host.trim_end_matches('/'), OPENAI_CHAT_PATH);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(payload)
            .send()
            .await?;
        handle_response(response).await
    }
}

async fn handle_response(response: reqwest::Response) -> Result<Value, ProviderError> {
    let status = response.status();
    let payload = response.json::<Value>().await.ok();
    let detail = || {
        payload
            .as_ref()
            .and_then(|p| p.pointer("/error/message"))
            .and_then(|m| m.as_str())
            .unwrap_or("no error detail")
            .to_string()
    };

    match status {
        StatusCode::OK => payload
            .ok_or_else(|| ProviderError::ResponseParse("response body was not JSON".to_string())),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            Err(ProviderError::Authentication(detail()))
        }
        StatusCode::TOO_MANY_REQUESTS => Err(ProviderError::RateLimitExceeded(detail())),
        status if status.is_server_error() => Err(ProviderError::ServerError(detail())),
        status => Err(ProviderError::RequestFailed(format!(
            "{status}: {}",
            detail()
        ))),
    }
}

#[async_trait]
impl Provider for OpenAiProvider {
    fn name(&self) -> &'static str {
        "openai"
    }

    fn get_model_config(&self) -> ModelConfig {
        self.model.clone()
    }

    async fn complete(
        &self,
        system: &str,
        messages: &[ChatMessage],
        tools: &[ToolSpec],
    ) -> Result<Completion, ProviderError> {
        let payload = create_request(&self.model, system, messages, tools);
        let response = self.post(&payload).await?;
        let completion = response_to_completion(&response)?;

        debug!(
            model = %self.model.model_name,
            input_tokens = ?completion.usage.input_tokens,
            output_tokens = ?completion.usage.output_tokens,
            tool_calls = completion.tool_calls.len(),
            "chat completion"
        );

        Ok(completion)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider_for(server: &MockServer) -> OpenAiProvider {
        OpenAiProvider::new(
            server.uri(),
            "test-key".to_string(),
            ModelConfig::new("gpt-4o"),
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn completes_text_reply() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer test-key"))
            .and(body_partial_json(json!({ "model": "gpt-4o" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{ "message": { "content": "All quiet." } }],
                "usage": { "prompt_tokens": 7, "completion_tokens": 2, "total_tokens": 9 }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let provider = provider_for(&server);
        let completion = provider
            .complete("system", &[ChatMessage::user("status?")], &[])
            .await
            .unwrap();

        assert_eq!(completion.text.as_deref(), Some("All quiet."));
        assert!(!completion.has_tool_calls());
        assert_eq!(completion.usage.total_tokens, Some(9));
    }

    #[tokio::test]
    async fn completes_tool_call_reply() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{ "message": {
                    "content": null,
                    "tool_calls": [{
                        "id": "call-1",
                        "type": "function",
                        "function": { "name": "web-search", "arguments": "{\"task\":\"weather\"}" }
                    }]
                }}]
            })))
            .mount(&server)
            .await;

        let provider = provider_for(&server);
        let completion = provider
            .complete(
                "system",
                &[ChatMessage::user("what's the weather?")],
                &[ToolSpec::new("web-search", "Search the web", json!({"type": "object"}))],
            )
            .await
            .unwrap();

        assert!(completion.text.is_none());
        assert_eq!(completion.tool_calls[0].name, "web-search");
    }

    #[tokio::test]
    async fn unauthorized_maps_to_authentication_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "error": { "message": "bad key" }
            })))
            .mount(&server)
            .await;

        let error = provider_for(&server)
            .complete("system", &[ChatMessage::user("q")], &[])
            .await
            .unwrap_err();

        match error {
            ProviderError::Authentication(detail) => assert_eq!(detail, "bad key"),
            other => panic!("expected Authentication, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn rate_limit_and_server_errors_keep_their_kinds() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_json(json!({})))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_json(json!({})))
            .mount(&server)
            .await;

        let provider = provider_for(&server);
        let first = provider
            .complete("system", &[ChatMessage::user("q")], &[])
            .await
            .unwrap_err();
        assert!(matches!(first, ProviderError::RateLimitExceeded(_)));

        let second = provider
            .complete("system", &[ChatMessage::user("q")], &[])
            .await
            .unwrap_err();
        assert!(matches!(second, ProviderError::ServerError(_)));
    }

    #[test]
    fn from_config_requires_the_key_variable() {
        let config = ProviderConfig {
            host: OPENAI_DEFAULT_HOST.to_string(),
            model: "gpt-4o".to_string(),
            api_key_env: "SWITCHBOARD_TEST_KEY_THAT_IS_NOT_SET".to_string(),
            timeout_secs: 30,
            temperature: None,
        };
        assert!(OpenAiProvider::from_config(&config).is_err());
    }
}
