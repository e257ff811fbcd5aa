//! Shared doubles for pipeline tests.

use crate::gateway::GatewayConfig;
use crate::parser::{DocumentParser, ParsingError};
use crate::pipeline::types::Document;
use crate::provider::{CallParams, ProviderClient, ProviderError, ProviderErrorKind};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

type Respond = dyn Fn(u32, &str) -> Result<String, ProviderError> + Send + Sync;

/// Provider double driven by a closure over (call number, prompt).
pub(crate) struct ScriptedProvider {
    respond: Box<Respond>,
    calls: AtomicU32,
    in_flight: AtomicU32,
    max_in_flight: AtomicU32,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedProvider {
    pub(crate) fn new(
        respond: impl Fn(u32, &str) -> Result<String, ProviderError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            respond: Box::new(respond),
            calls: AtomicU32::new(0),
            in_flight: AtomicU32::new(0),
            max_in_flight: AtomicU32::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// A provider that answers every prompt with a canned chunk response.
    pub(crate) fn canned() -> Self {
        Self::new(|call, _| Ok(canned_summary(call)))
    }

    /// A provider that always fails with the given kind.
    pub(crate) fn always_err(kind: ProviderErrorKind) -> Self {
        Self::new(move |_, _| Err(ProviderError::new(kind, "scripted failure")))
    }

    pub(crate) fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn max_in_flight(&self) -> u32 {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub(crate) fn prompts(&self) -> Vec<String> {
        self.prompts.lock().expect("prompt log poisoned").clone()
    }
}

#[async_trait]
impl ProviderClient for ScriptedProvider {
    async fn call(
        &self,
        prompt: &str,
        _params: &CallParams,
        _timeout: Duration,
    ) -> Result<String, ProviderError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        let in_flight = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(in_flight, Ordering::SeqCst);
        self.prompts
            .lock()
            .expect("prompt log poisoned")
            .push(prompt.to_string());

        // Yield once so overlapping calls are observable under a paused clock.
        tokio::time::sleep(Duration::from_millis(1)).await;

        let result = (self.respond)(call, prompt);
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

/// Deterministic chunk-style response for the given call number.
pub(crate) fn canned_summary(call: u32) -> String {
    format!("Summary {call}.\nKey points:\n- point {call}")
}

/// Gateway settings tuned for paused-clock tests.
pub(crate) fn fast_gateway_config() -> GatewayConfig {
    GatewayConfig {
        request_timeout: Duration::from_millis(200),
        max_attempts: 3,
        base_delay: Duration::from_millis(5),
        max_delay: Duration::from_millis(50),
        jitter: false,
        breaker_failure_threshold: 100,
        breaker_cooldown: Duration::from_secs(30),
    }
}

/// Parser double resolving paths from an in-memory map.
pub(crate) struct StaticParser {
    documents: HashMap<String, Document>,
}

impl StaticParser {
    pub(crate) fn new(documents: Vec<Document>) -> Self {
        Self {
            documents: documents
                .into_iter()
                .map(|document| (document.origin.clone(), document))
                .collect(),
        }
    }
}

#[async_trait]
impl DocumentParser for StaticParser {
    async fn extract(&self, path: &Path) -> Result<Document, ParsingError> {
        self.documents
            .get(&path.display().to_string())
            .cloned()
            .ok_or_else(|| ParsingError::UnsupportedFormat(path.to_path_buf()))
    }
}
