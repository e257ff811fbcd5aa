//! Local provider adapter backed by an Ollama runtime.

use super::{CallParams, ProviderClient, ProviderError, ProviderErrorKind};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

const DEFAULT_OLLAMA_URL: &str = "http://127.0.0.1:11434";

/// Provider variant issuing completions against a local Ollama runtime.
pub struct OllamaProvider {
    http: Client,
    base_url: String,
}

impl OllamaProvider {
    /// Build an adapter for the given base URL, falling back to the local default.
    pub fn new(base_url: Option<String>) -> Self {
        let http = Client::builder()
            .user_agent("docdigest/ollama")
            .build()
            .expect("Failed to construct reqwest::Client for Ollama");
        Self {
            http,
            base_url: base_url.unwrap_or_else(|| DEFAULT_OLLAMA_URL.to_string()),
        }
    }

    #[cfg(test)]
    pub(crate) fn with_base_url(base_url: String) -> Self {
        Self::new(Some(base_url))
    }

    fn endpoint(&self) -> String {
        format!("{}/api/generate", self.base_url.trim_end_matches('/'))
    }
}

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    response: String,
    done: bool,
}

#[async_trait]
impl ProviderClient for OllamaProvider {
    async fn call(
        &self,
        prompt: &str,
        params: &CallParams,
        timeout: Duration,
    ) -> Result<String, ProviderError> {
        let payload = json!({
            "model": params.model,
            "prompt": prompt,
            "stream": false,
            "options": {
                "temperature": params.temperature,
            }
        });

        let response = self
            .http
            .post(self.endpoint())
            .timeout(timeout)
            .json(&payload)
            .send()
            .await
            .map_err(|error| {
                if error.is_timeout() {
                    ProviderError::timeout(format!("Ollama call timed out: {error}"))
                } else {
                    ProviderError::transient(format!(
                        "failed to reach Ollama at {}: {error}",
                        self.base_url
                    ))
                }
            })?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(ProviderError::new(
                ProviderErrorKind::InvalidRequest,
                format!("Ollama endpoint {} returned 404 (model missing?)", self.endpoint()),
            ));
        }
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(ProviderError::new(
                ProviderErrorKind::Auth,
                format!("Ollama rejected credentials with {status}"),
            ));
        }
        if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::transient(format!(
                "Ollama returned {status}: {body}"
            )));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::new(
                ProviderErrorKind::Unknown,
                format!("Ollama returned {status}: {body}"),
            ));
        }

        let body: OllamaResponse = response.json().await.map_err(|error| {
            ProviderError::new(
                ProviderErrorKind::Unknown,
                format!("failed to decode Ollama response: {error}"),
            )
        })?;

        if !body.done {
            return Err(ProviderError::new(
                ProviderErrorKind::Unknown,
                "Ollama response incomplete (streaming not supported)",
            ));
        }

        Ok(body.response.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{Method::POST, MockServer};

    fn params() -> CallParams {
        CallParams::for_model("llama3.1")
    }

    #[tokio::test]
    async fn handles_successful_response() {
        let server = MockServer::start_async().await;
        let client = OllamaProvider::with_base_url(server.base_url());

        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/api/generate");
                then.status(200).json_body(json!({
                    "response": "Summary text",
                    "done": true
                }));
            })
            .await;

        let text = client
            .call("Summarize", &params(), Duration::from_secs(5))
            .await
            .expect("completion");

        mock.assert();
        assert_eq!(text, "Summary text");
    }

    #[tokio::test]
    async fn maps_server_error_to_transient() {
        let server = MockServer::start_async().await;
        let client = OllamaProvider::with_base_url(server.base_url());

        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/generate");
                then.status(500).body("boom");
            })
            .await;

        let error = client
            .call("Summarize", &params(), Duration::from_secs(5))
            .await
            .expect_err("error response");

        assert_eq!(error.kind, ProviderErrorKind::Transient);
    }

    #[tokio::test]
    async fn maps_missing_model_to_invalid_request() {
        let server = MockServer::start_async().await;
        let client = OllamaProvider::with_base_url(server.base_url());

        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/generate");
                then.status(404);
            })
            .await;

        let error = client
            .call("Summarize", &params(), Duration::from_secs(5))
            .await
            .expect_err("error response");

        assert_eq!(error.kind, ProviderErrorKind::InvalidRequest);
    }

    #[tokio::test]
    async fn incomplete_stream_is_unknown() {
        let server = MockServer::start_async().await;
        let client = OllamaProvider::with_base_url(server.base_url());

        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/generate");
                then.status(200).json_body(json!({
                    "response": "partial",
                    "done": false
                }));
            })
            .await;

        let error = client
            .call("Summarize", &params(), Duration::from_secs(5))
            .await
            .expect_err("error response");

        assert_eq!(error.kind, ProviderErrorKind::Unknown);
    }
}
