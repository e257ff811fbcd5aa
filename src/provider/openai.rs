//! Cloud provider adapter for OpenAI-compatible chat completion APIs.

use super::{CallParams, ProviderClient, ProviderError, ProviderErrorKind};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

const DEFAULT_OPENAI_URL: &str = "https://api.openai.com";

/// Provider variant issuing completions against a hosted OpenAI-compatible API.
pub struct OpenAiProvider {
    http: Client,
    base_url: String,
    api_key: String,
}

impl OpenAiProvider {
    /// Build an adapter for the given base URL and API key.
    pub fn new(base_url: Option<String>, api_key: String) -> Self {
        let http = Client::builder()
            .user_agent("docdigest/openai")
            .build()
            .expect("Failed to construct reqwest::Client for OpenAI");
        Self {
            http,
            base_url: base_url.unwrap_or_else(|| DEFAULT_OPENAI_URL.to_string()),
            api_key,
        }
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1/chat/completions",
            self.base_url.trim_end_matches('/')
        )
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: String,
}

fn classify_status(status: StatusCode) -> ProviderErrorKind {
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        ProviderErrorKind::Auth
    } else if status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
    {
        ProviderErrorKind::Transient
    } else if status.is_client_error() {
        ProviderErrorKind::InvalidRequest
    } else {
        ProviderErrorKind::Unknown
    }
}

#[async_trait]
impl ProviderClient for OpenAiProvider {
    async fn call(
        &self,
        prompt: &str,
        params: &CallParams,
        timeout: Duration,
    ) -> Result<String, ProviderError> {
        let payload = json!({
            "model": params.model,
            "temperature": params.temperature,
            "messages": [
                { "role": "user", "content": prompt }
            ]
        });

        let response = self
            .http
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .timeout(timeout)
            .json(&payload)
            .send()
            .await
            .map_err(|error| {
                if error.is_timeout() {
                    ProviderError::timeout(format!("chat completion timed out: {error}"))
                } else {
                    ProviderError::transient(format!(
                        "failed to reach {}: {error}",
                        self.base_url
                    ))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::new(
                classify_status(status),
                format!("provider returned {status}: {body}"),
            ));
        }

        let body: ChatResponse = response.json().await.map_err(|error| {
            ProviderError::new(
                ProviderErrorKind::Unknown,
                format!("failed to decode chat response: {error}"),
            )
        })?;

        let content = body
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| {
                ProviderError::new(
                    ProviderErrorKind::Unknown,
                    "chat response contained no choices",
                )
            })?;

        Ok(content.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{Method::POST, MockServer};

    fn client_for(server: &MockServer) -> OpenAiProvider {
        OpenAiProvider::new(Some(server.base_url()), "test-key".into())
    }

    #[tokio::test]
    async fn extracts_first_choice() {
        let server = MockServer::start_async().await;
        let client = client_for(&server);

        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/v1/chat/completions")
                    .header("authorization", "Bearer test-key");
                then.status(200).json_body(json!({
                    "choices": [
                        { "message": { "role": "assistant", "content": "Condensed." } }
                    ]
                }));
            })
            .await;

        let text = client
            .call("Summarize", &CallParams::for_model("gpt-4o-mini"), Duration::from_secs(5))
            .await
            .expect("completion");

        mock.assert();
        assert_eq!(text, "Condensed.");
    }

    #[tokio::test]
    async fn maps_unauthorized_to_auth() {
        let server = MockServer::start_async().await;
        let client = client_for(&server);

        server
            .mock_async(|when, then| {
                when.method(POST).path("/v1/chat/completions");
                then.status(401).body("invalid key");
            })
            .await;

        let error = client
            .call("Summarize", &CallParams::for_model("gpt-4o-mini"), Duration::from_secs(5))
            .await
            .expect_err("auth error");

        assert_eq!(error.kind, ProviderErrorKind::Auth);
        assert!(!error.kind.is_retryable());
    }

    #[tokio::test]
    async fn maps_rate_limit_to_transient() {
        let server = MockServer::start_async().await;
        let client = client_for(&server);

        server
            .mock_async(|when, then| {
                when.method(POST).path("/v1/chat/completions");
                then.status(429);
            })
            .await;

        let error = client
            .call("Summarize", &CallParams::for_model("gpt-4o-mini"), Duration::from_secs(5))
            .await
            .expect_err("rate limited");

        assert_eq!(error.kind, ProviderErrorKind::Transient);
        assert!(error.kind.is_retryable());
    }

    #[tokio::test]
    async fn maps_bad_request_to_invalid_request() {
        let server = MockServer::start_async().await;
        let client = client_for(&server);

        server
            .mock_async(|when, then| {
                when.method(POST).path("/v1/chat/completions");
                then.status(400).body("unknown model");
            })
            .await;

        let error = client
            .call("Summarize", &CallParams::for_model("nope"), Duration::from_secs(5))
            .await
            .expect_err("bad request");

        assert_eq!(error.kind, ProviderErrorKind::InvalidRequest);
    }
}
