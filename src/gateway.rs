//! Provider gateway: timeout, retry with backoff, and circuit breaking.
//!
//! The gateway wraps a [`ProviderClient`] with the call discipline the pipeline
//! relies on:
//!
//! - Per-call timeout: the in-flight future is dropped on expiry and the
//!   attempt is treated as a `Timeout` failure.
//! - Retry with exponential backoff (base delay doubled per attempt, capped,
//!   optional ±25% jitter) for `Transient` and `Timeout` failures only.
//! - A circuit breaker that short-circuits calls after a run of consecutive
//!   failures until a cool-down elapses, then admits a trial call.
//!
//! Breaker state is the only mutable state here and lives behind a single
//! [`CircuitBreaker`], which can be shared across gateways when a batch-wide
//! scope is configured.

use crate::metrics::PipelineMetrics;
use crate::provider::{CallParams, ProviderClient, ProviderError, ProviderErrorKind};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;

/// Call discipline settings for a [`ProviderGateway`].
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Upper bound on a single provider call.
    pub request_timeout: Duration,
    /// Total attempts per call, including the first one.
    pub max_attempts: u32,
    /// Backoff delay before the first retry.
    pub base_delay: Duration,
    /// Cap applied to the exponential backoff.
    pub max_delay: Duration,
    /// Whether delays carry ±25% random jitter.
    pub jitter: bool,
    /// Consecutive failures before the circuit opens.
    pub breaker_failure_threshold: u32,
    /// How long an open circuit rejects calls before admitting a trial.
    pub breaker_cooldown: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
            jitter: true,
            breaker_failure_threshold: 5,
            breaker_cooldown: Duration::from_secs(30),
        }
    }
}

/// Errors yielded by the gateway once its discipline is exhausted.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The circuit is open; the call was rejected without reaching the provider.
    #[error("provider unavailable: circuit open for another {remaining:?}")]
    Unavailable {
        /// Time left until the breaker admits a trial call.
        remaining: Duration,
    },
    /// Every attempt failed with a retryable error.
    #[error("provider call failed after {attempts} attempts: {source}")]
    Exhausted {
        /// Number of attempts actually issued.
        attempts: u32,
        /// The final attempt's error.
        #[source]
        source: ProviderError,
    },
    /// The provider failed with an error that must not be retried.
    #[error("provider rejected the call: {0}")]
    NonRetryable(#[source] ProviderError),
}

impl GatewayError {
    /// The provider failure kind behind this error, when one exists.
    pub fn provider_kind(&self) -> Option<ProviderErrorKind> {
        match self {
            Self::Unavailable { .. } => None,
            Self::Exhausted { source, .. } => Some(source.kind),
            Self::NonRetryable(source) => Some(source.kind),
        }
    }
}

#[derive(Debug, Default)]
struct BreakerState {
    consecutive_failures: u32,
    open_until: Option<Instant>,
}

/// Consecutive-failure circuit breaker shared by gateway instances.
///
/// All transitions happen under one lock so shared-scope breakers never lose
/// updates between concurrent documents.
#[derive(Debug)]
pub struct CircuitBreaker {
    threshold: u32,
    cooldown: Duration,
    state: Mutex<BreakerState>,
}

impl CircuitBreaker {
    /// Create a closed breaker with the given threshold and cool-down.
    pub fn new(threshold: u32, cooldown: Duration) -> Self {
        Self {
            threshold: threshold.max(1),
            cooldown,
            state: Mutex::new(BreakerState::default()),
        }
    }

    /// Admit or reject a call. Returns the remaining cool-down when open.
    ///
    /// Once the cool-down has elapsed the breaker admits a trial call; the
    /// next recorded failure re-opens it, a success closes it.
    fn admit(&self) -> Result<(), Duration> {
        let mut state = self.state.lock().expect("breaker lock poisoned");
        match state.open_until {
            Some(deadline) => {
                let now = Instant::now();
                if now < deadline {
                    Err(deadline - now)
                } else {
                    state.open_until = None;
                    Ok(())
                }
            }
            None => Ok(()),
        }
    }

    /// Record a successful call, closing the breaker.
    fn record_success(&self) {
        let mut state = self.state.lock().expect("breaker lock poisoned");
        state.consecutive_failures = 0;
        state.open_until = None;
    }

    /// Record a failed call. Returns `true` when this failure opened the circuit.
    fn record_failure(&self) -> bool {
        let mut state = self.state.lock().expect("breaker lock poisoned");
        state.consecutive_failures = state.consecutive_failures.saturating_add(1);
        if state.consecutive_failures >= self.threshold && state.open_until.is_none() {
            state.open_until = Some(Instant::now() + self.cooldown);
            true
        } else {
            false
        }
    }

    #[cfg(test)]
    fn consecutive_failures(&self) -> u32 {
        self.state
            .lock()
            .expect("breaker lock poisoned")
            .consecutive_failures
    }
}

/// Wraps a provider client with timeout, retry/backoff, and circuit breaking.
pub struct ProviderGateway {
    client: Arc<dyn ProviderClient>,
    config: GatewayConfig,
    breaker: Arc<CircuitBreaker>,
    metrics: Arc<PipelineMetrics>,
}

impl ProviderGateway {
    /// Build a gateway owning its own breaker.
    pub fn new(
        client: Arc<dyn ProviderClient>,
        config: GatewayConfig,
        metrics: Arc<PipelineMetrics>,
    ) -> Self {
        let breaker = Arc::new(CircuitBreaker::new(
            config.breaker_failure_threshold,
            config.breaker_cooldown,
        ));
        Self::with_breaker(client, config, breaker, metrics)
    }

    /// Build a gateway over an externally shared breaker (batch scope).
    pub fn with_breaker(
        client: Arc<dyn ProviderClient>,
        config: GatewayConfig,
        breaker: Arc<CircuitBreaker>,
        metrics: Arc<PipelineMetrics>,
    ) -> Self {
        Self {
            client,
            config,
            breaker,
            metrics,
        }
    }

    /// Issue a provider call under the configured discipline.
    pub async fn summarize(
        &self,
        prompt: &str,
        params: &CallParams,
    ) -> Result<String, GatewayError> {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;

            if let Err(remaining) = self.breaker.admit() {
                return Err(GatewayError::Unavailable { remaining });
            }

            let outcome = tokio::time::timeout(
                self.config.request_timeout,
                self.client.call(prompt, params, self.config.request_timeout),
            )
            .await;

            let error = match outcome {
                Ok(Ok(text)) => {
                    self.breaker.record_success();
                    return Ok(text);
                }
                Ok(Err(error)) => error,
                Err(_) => ProviderError::timeout(format!(
                    "no response within {:?}",
                    self.config.request_timeout
                )),
            };

            if self.breaker.record_failure() {
                self.metrics.record_breaker_trip();
                tracing::warn!(
                    cooldown = ?self.config.breaker_cooldown,
                    "Provider circuit opened after consecutive failures"
                );
            }

            if !error.kind.is_retryable() {
                if error.kind == ProviderErrorKind::Unknown {
                    tracing::warn!(error = %error, "Unclassified provider failure; not retrying");
                }
                return Err(GatewayError::NonRetryable(error));
            }

            if attempt >= max_attempts {
                return Err(GatewayError::Exhausted {
                    attempts: attempt,
                    source: error,
                });
            }

            self.metrics.record_retry();
            let delay = self.backoff_delay(attempt);
            tracing::debug!(
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Retrying provider call"
            );
            tokio::time::sleep(delay).await;
        }
    }

    /// Delay before the retry following `attempt` (1-indexed).
    fn backoff_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        let scaled = self
            .config
            .base_delay
            .saturating_mul(2_u32.saturating_pow(exponent));
        let capped = scaled.min(self.config.max_delay);

        if !self.config.jitter {
            return capped;
        }

        let capped_ms = capped.as_millis() as u64;
        let jitter = capped_ms / 4;
        if jitter == 0 {
            return capped;
        }
        let offset = fastrand::u64(0..=jitter * 2);
        Duration::from_millis(capped_ms - jitter + offset)
    }
}
