//! Language-model provider abstraction and bundled adapters.
//!
//! Providers form a closed set selected by configuration: a local Ollama-style
//! runtime and an OpenAI-compatible cloud API. Each variant only has to satisfy
//! [`ProviderClient::call`]; timeout enforcement, retries, and circuit breaking
//! live in the gateway, not here.

mod ollama;
mod openai;

pub use ollama::OllamaProvider;
pub use openai::OpenAiProvider;

use crate::config::{Config, SummarizerProvider};
use async_trait::async_trait;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Classification of provider failures, deciding retry eligibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderErrorKind {
    /// Temporary condition (connection refused, 429, 5xx); safe to retry.
    Transient,
    /// The call did not complete within the allotted time; safe to retry.
    Timeout,
    /// Credentials were rejected; retrying cannot help.
    Auth,
    /// The request itself was malformed or referenced an unknown model.
    InvalidRequest,
    /// Anything the adapter could not classify; not retried, but logged.
    Unknown,
}

impl ProviderErrorKind {
    /// Whether the gateway may retry a call that failed with this kind.
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::Transient | Self::Timeout)
    }
}

impl fmt::Display for ProviderErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Transient => "transient",
            Self::Timeout => "timeout",
            Self::Auth => "auth",
            Self::InvalidRequest => "invalid_request",
            Self::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// Error surfaced by a provider adapter for a single call.
#[derive(Debug, Clone, Error)]
#[error("provider call failed ({kind}): {message}")]
pub struct ProviderError {
    /// Failure classification used for retry decisions.
    pub kind: ProviderErrorKind,
    /// Human-readable detail from the adapter or transport.
    pub message: String,
}

impl ProviderError {
    /// Build an error with the given kind and message.
    pub fn new(kind: ProviderErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Shorthand for a [`ProviderErrorKind::Transient`] error.
    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Transient, message)
    }

    /// Shorthand for a [`ProviderErrorKind::Timeout`] error.
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Timeout, message)
    }
}

/// Parameters accompanying a provider call.
#[derive(Debug, Clone)]
pub struct CallParams {
    /// Fully qualified model identifier understood by the provider.
    pub model: String,
    /// Sampling temperature; kept low for reproducible summaries.
    pub temperature: f32,
}

impl CallParams {
    /// Parameters for the given model with the default temperature.
    pub fn for_model(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            temperature: 0.1,
        }
    }
}

/// Interface implemented by language-model providers.
#[async_trait]
pub trait ProviderClient: Send + Sync {
    /// Send a prompt and return the provider's text completion.
    ///
    /// `timeout` is advisory: adapters propagate it to their transport where
    /// supported, while the gateway enforces it regardless.
    async fn call(
        &self,
        prompt: &str,
        params: &CallParams,
        timeout: Duration,
    ) -> Result<String, ProviderError>;
}

/// Build a provider client matching the current configuration.
pub fn get_provider_client(config: &Config) -> Box<dyn ProviderClient> {
    match config.summarizer_provider {
        SummarizerProvider::Local => Box::new(OllamaProvider::new(config.ollama_url.clone())),
        SummarizerProvider::Cloud => Box::new(OpenAiProvider::new(
            config.openai_base_url.clone(),
            config
                .openai_api_key
                .clone()
                .expect("OPENAI_API_KEY validated during config load"),
        )),
    }
}
