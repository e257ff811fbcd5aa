use crate::gateway::GatewayConfig;
use crate::pipeline::{ChunkConfig, PipelineConfig};
use serde::Deserialize;
use std::env;
use std::sync::OnceLock;
use std::time::Duration;
use thiserror::Error;

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required environment variable was not provided.
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

/// Runtime configuration for the Docdigest pipeline.
#[derive(Debug, Deserialize)]
pub struct Config {
    /// Provider backend used for chunk and reduction calls.
    pub summarizer_provider: SummarizerProvider,
    /// Model identifier passed to the provider.
    pub summarizer_model: String,
    /// Optional override for the local Ollama runtime URL.
    pub ollama_url: Option<String>,
    /// Optional override for the cloud provider base URL.
    pub openai_base_url: Option<String>,
    /// API key for the cloud provider (required when `summarizer_provider` is `cloud`).
    pub openai_api_key: Option<String>,
    /// Maximum chunk size in characters.
    pub chunk_max_chars: usize,
    /// Overlap carried from the previous chunk's tail, in characters.
    pub chunk_overlap_chars: usize,
    /// Window before the chunk budget in which boundary breaks are preferred.
    pub chunk_boundary_tolerance: usize,
    /// Per-call provider timeout in milliseconds.
    pub provider_timeout_ms: u64,
    /// Maximum provider attempts per chunk, including the first call.
    pub provider_max_attempts: u32,
    /// Base backoff delay in milliseconds.
    pub provider_base_delay_ms: u64,
    /// Backoff delay cap in milliseconds.
    pub provider_max_delay_ms: u64,
    /// Whether backoff delays carry random jitter.
    pub provider_backoff_jitter: bool,
    /// Consecutive failures before the circuit opens.
    pub breaker_failure_threshold: u32,
    /// Cool-down period for an open circuit, in milliseconds.
    pub breaker_cooldown_ms: u64,
    /// Whether the breaker is scoped to one document or shared across a batch.
    pub breaker_scope: BreakerScope,
    /// Maximum number of documents processed concurrently.
    pub batch_concurrency: usize,
    /// Maximum concurrent chunk calls within one document.
    pub chunk_fan_out: usize,
    /// Failed-chunk fraction at which a document is considered failed.
    pub failed_chunk_threshold: f64,
    /// Word budget requested from the provider for summaries.
    pub summary_max_words: usize,
}

/// Supported provider backends for the summarization pipeline.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SummarizerProvider {
    /// Local Ollama runtime.
    Local,
    /// Hosted OpenAI-compatible API.
    Cloud,
}

/// Scope of the circuit breaker shared by gateway instances.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BreakerScope {
    /// Each document's gateway keeps its own breaker.
    Document,
    /// One breaker is shared across every document in a batch.
    Batch,
}

impl Config {
    /// Load configuration from environment variables, performing validation along the way.
    pub fn from_env() -> Result<Self, ConfigError> {
        let summarizer_provider = load_env_optional("SUMMARIZER_PROVIDER")
            .map(|value| {
                value
                    .parse()
                    .map_err(|()| ConfigError::InvalidValue("SUMMARIZER_PROVIDER".to_string()))
            })
            .transpose()?
            .unwrap_or(SummarizerProvider::Local);

        let openai_api_key = load_env_optional("OPENAI_API_KEY");
        if summarizer_provider == SummarizerProvider::Cloud && openai_api_key.is_none() {
            return Err(ConfigError::MissingVariable("OPENAI_API_KEY".to_string()));
        }

        let failed_chunk_threshold =
            parse_env_or("FAILED_CHUNK_THRESHOLD", 0.5_f64)?;
        if !(0.0..=1.0).contains(&failed_chunk_threshold) || failed_chunk_threshold == 0.0 {
            return Err(ConfigError::InvalidValue(
                "FAILED_CHUNK_THRESHOLD".to_string(),
            ));
        }

        Ok(Self {
            summarizer_provider,
            summarizer_model: load_env("SUMMARIZER_MODEL")?,
            ollama_url: load_env_optional("OLLAMA_URL"),
            openai_base_url: load_env_optional("OPENAI_BASE_URL"),
            openai_api_key,
            chunk_max_chars: parse_env_or("CHUNK_MAX_CHARS", 4000)?,
            chunk_overlap_chars: parse_env_or("CHUNK_OVERLAP_CHARS", 200)?,
            chunk_boundary_tolerance: parse_env_or("CHUNK_BOUNDARY_TOLERANCE", 200)?,
            provider_timeout_ms: parse_env_or("PROVIDER_TIMEOUT_MS", 30_000)?,
            provider_max_attempts: parse_env_or("PROVIDER_MAX_ATTEMPTS", 3)?,
            provider_base_delay_ms: parse_env_or("PROVIDER_BASE_DELAY_MS", 500)?,
            provider_max_delay_ms: parse_env_or("PROVIDER_MAX_DELAY_MS", 8_000)?,
            provider_backoff_jitter: parse_env_or("PROVIDER_BACKOFF_JITTER", true)?,
            breaker_failure_threshold: parse_env_or("BREAKER_FAILURE_THRESHOLD", 5)?,
            breaker_cooldown_ms: parse_env_or("BREAKER_COOLDOWN_MS", 30_000)?,
            breaker_scope: load_env_optional("BREAKER_SCOPE")
                .map(|value| {
                    value
                        .parse()
                        .map_err(|()| ConfigError::InvalidValue("BREAKER_SCOPE".to_string()))
                })
                .transpose()?
                .unwrap_or(BreakerScope::Document),
            batch_concurrency: parse_env_or("BATCH_CONCURRENCY", 4)?,
            chunk_fan_out: parse_env_or("CHUNK_FAN_OUT", 2)?,
            failed_chunk_threshold,
            summary_max_words: parse_env_or("SUMMARY_MAX_WORDS", 120)?,
        })
    }

    /// Chunker settings derived from this configuration.
    pub fn chunk_config(&self) -> ChunkConfig {
        ChunkConfig {
            max_chunk_size: self.chunk_max_chars,
            overlap_size: self.chunk_overlap_chars,
            boundary_tolerance: self.chunk_boundary_tolerance,
        }
    }

    /// Gateway settings derived from this configuration.
    pub fn gateway_config(&self) -> GatewayConfig {
        GatewayConfig {
            request_timeout: Duration::from_millis(self.provider_timeout_ms),
            max_attempts: self.provider_max_attempts,
            base_delay: Duration::from_millis(self.provider_base_delay_ms),
            max_delay: Duration::from_millis(self.provider_max_delay_ms),
            jitter: self.provider_backoff_jitter,
            breaker_failure_threshold: self.breaker_failure_threshold,
            breaker_cooldown: Duration::from_millis(self.breaker_cooldown_ms),
        }
    }

    /// Orchestration settings derived from this configuration.
    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            chunk: self.chunk_config(),
            chunk_fan_out: self.chunk_fan_out.max(1),
            failed_chunk_threshold: self.failed_chunk_threshold,
            summary_max_words: self.summary_max_words,
            model: self.summarizer_model.clone(),
        }
    }
}

fn load_env(key: &str) -> Result<String, ConfigError> {
    env::var(key).map_err(|_| ConfigError::MissingVariable(key.to_string()))
}

fn load_env_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_env_or<T: std::str::FromStr>(key: &str, default: T) -> Result<T, ConfigError> {
    load_env_optional(key)
        .map(|value| {
            value
                .parse()
                .map_err(|_| ConfigError::InvalidValue(key.to_string()))
        })
        .transpose()
        .map(|parsed| parsed.unwrap_or(default))
}

impl std::str::FromStr for SummarizerProvider {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "local" | "ollama" => Ok(Self::Local),
            "cloud" | "openai" => Ok(Self::Cloud),
            _ => Err(()),
        }
    }
}

impl std::str::FromStr for BreakerScope {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "document" => Ok(Self::Document),
            "batch" => Ok(Self::Batch),
            _ => Err(()),
        }
    }
}

/// Global configuration cache populated during process start.
pub static CONFIG: OnceLock<Config> = OnceLock::new();

/// Retrieve the loaded configuration, panicking if initialization has not occurred.
pub fn get_config() -> &'static Config {
    CONFIG.get().expect("Config not initialized")
}

/// Load configuration from the environment and install it in the global cache.
pub fn init_config() {
    dotenvy::dotenv().ok();
    let config = Config::from_env().expect("Failed to load config from environment");
    tracing::debug!(
        provider = ?config.summarizer_provider,
        model = %config.summarizer_model,
        batch_concurrency = config.batch_concurrency,
        chunk_fan_out = config.chunk_fan_out,
        "Loaded configuration"
    );
    CONFIG.set(config).expect("Failed to set config");
}
