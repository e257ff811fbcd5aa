//! Batch coordination: bounded fan-out of the pipeline across documents.
//!
//! The coordinator runs up to `concurrency` document orchestrators at a time
//! and returns their results in submission order regardless of completion
//! order. One document's failure never touches its siblings; every submitted
//! path gets exactly one entry in the returned [`BatchResult`]. Depending on
//! the configured breaker scope, documents either keep their own circuit
//! breaker or share a single one across the whole batch.

use crate::config::BreakerScope;
use crate::gateway::{CircuitBreaker, GatewayConfig, ProviderGateway};
use crate::metrics::PipelineMetrics;
use crate::parser::DocumentParser;
use crate::provider::ProviderClient;
use futures_util::future::join_all;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::orchestrator::{DocumentOrchestrator, PipelineConfig};
use super::progress::ProgressTracker;
use super::types::{BatchResult, DocumentResult, DocumentStatus};

/// Batch-level knobs not covered by the per-document pipeline settings.
#[derive(Debug, Clone)]
pub struct BatchOptions {
    /// Maximum number of documents processed concurrently.
    pub concurrency: usize,
    /// Whether circuit-breaker state is per document or shared batch-wide.
    pub breaker_scope: BreakerScope,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            concurrency: 4,
            breaker_scope: BreakerScope::Document,
        }
    }
}

/// Fans the document pipeline out over a batch of paths.
pub struct BatchCoordinator {
    parser: Arc<dyn DocumentParser>,
    client: Arc<dyn ProviderClient>,
    gateway_config: GatewayConfig,
    pipeline_config: PipelineConfig,
    options: BatchOptions,
    progress: Arc<ProgressTracker>,
    metrics: Arc<PipelineMetrics>,
    cancel: CancellationToken,
}

impl BatchCoordinator {
    /// Build a coordinator over the given capabilities and settings.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        parser: Arc<dyn DocumentParser>,
        client: Arc<dyn ProviderClient>,
        gateway_config: GatewayConfig,
        pipeline_config: PipelineConfig,
        options: BatchOptions,
        progress: Arc<ProgressTracker>,
        metrics: Arc<PipelineMetrics>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            parser,
            client,
            gateway_config,
            pipeline_config,
            options,
            progress,
            metrics,
            cancel,
        }
    }

    /// Process every path, returning one result per path in submission order.
    ///
    /// The batch is done once every document has reached `Done` or `Failed`;
    /// no document is ever silently dropped.
    pub async fn run(&self, paths: &[PathBuf]) -> BatchResult {
        let clock = Instant::now();
        let batch_id = Uuid::new_v4().to_string();
        self.progress.set_documents_total(paths.len());
        tracing::info!(
            batch = %batch_id,
            documents = paths.len(),
            concurrency = self.options.concurrency,
            "Batch started"
        );

        let semaphore = Arc::new(Semaphore::new(self.options.concurrency.max(1)));
        let shared_breaker = match self.options.breaker_scope {
            BreakerScope::Batch => Some(Arc::new(CircuitBreaker::new(
                self.gateway_config.breaker_failure_threshold,
                self.gateway_config.breaker_cooldown,
            ))),
            BreakerScope::Document => None,
        };

        let runs = paths.iter().map(|path| {
            let semaphore = semaphore.clone();
            let parser = self.parser.clone();
            let progress = self.progress.clone();
            let orchestrator = self.orchestrator_for(shared_breaker.as_ref());

            async move {
                let _permit = semaphore.acquire().await.expect("batch semaphore closed");
                let result = orchestrator.run_path(parser.as_ref(), path).await;
                progress.document_completed();
                result
            }
        });

        // join_all keeps submission order even when later documents finish first.
        let documents = join_all(runs).await;

        let succeeded = count_status(&documents, DocumentStatus::Ok);
        let degraded = count_status(&documents, DocumentStatus::Degraded);
        let failed = count_status(&documents, DocumentStatus::Failed);
        let elapsed_ms = clock.elapsed().as_millis() as u64;
        tracing::info!(
            batch = %batch_id,
            succeeded,
            degraded,
            failed,
            elapsed_ms,
            "Batch finished"
        );

        BatchResult {
            batch_id,
            documents,
            succeeded,
            degraded,
            failed,
            elapsed_ms,
        }
    }

    fn orchestrator_for(&self, shared_breaker: Option<&Arc<CircuitBreaker>>) -> DocumentOrchestrator {
        let gateway = match shared_breaker {
            Some(breaker) => ProviderGateway::with_breaker(
                self.client.clone(),
                self.gateway_config.clone(),
                breaker.clone(),
                self.metrics.clone(),
            ),
            None => ProviderGateway::new(
                self.client.clone(),
                self.gateway_config.clone(),
                self.metrics.clone(),
            ),
        };
        DocumentOrchestrator::new(
            Arc::new(gateway),
            self.pipeline_config.clone(),
            self.progress.clone(),
            self.metrics.clone(),
            self.cancel.clone(),
        )
    }
}

fn count_status(documents: &[DocumentResult], status: DocumentStatus) -> usize {
    documents
        .iter()
        .filter(|document| document.status == status)
        .count()
}
