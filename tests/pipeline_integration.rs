use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use docdigest::gateway::GatewayConfig;
use docdigest::metrics::PipelineMetrics;
use docdigest::parser::TextFileParser;
use docdigest::pipeline::{
    BatchCoordinator, BatchOptions, ChunkConfig, DocumentStatus, Phase, PipelineConfig,
    ProgressScope, ProgressTracker,
};
use docdigest::provider::{
    CallParams, OllamaProvider, ProviderClient, ProviderError, ProviderErrorKind,
};
use httpmock::{Method::POST, MockServer};
use serde_json::json;
use tokio_util::sync::CancellationToken;

/// Provider double answering every prompt with a fixed-format summary.
struct CannedProvider {
    calls: AtomicU32,
    response_delay: Option<Duration>,
    error_kind: Option<ProviderErrorKind>,
}

impl CannedProvider {
    fn ok() -> Self {
        Self {
            calls: AtomicU32::new(0),
            response_delay: None,
            error_kind: None,
        }
    }

    fn slow(delay: Duration) -> Self {
        Self {
            response_delay: Some(delay),
            ..Self::ok()
        }
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProviderClient for CannedProvider {
    async fn call(
        &self,
        _prompt: &str,
        _params: &CallParams,
        _timeout: Duration,
    ) -> Result<String, ProviderError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.response_delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(kind) = self.error_kind {
            return Err(ProviderError::new(kind, "scripted failure"));
        }
        Ok(format!("Summary {call}.\nKey points:\n- point {call}"))
    }
}

fn gateway_config() -> GatewayConfig {
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

fn pipeline_config() -> PipelineConfig {
    PipelineConfig {
        chunk: ChunkConfig {
            max_chunk_size: 200,
            overlap_size: 20,
            boundary_tolerance: 40,
        },
        chunk_fan_out: 2,
        failed_chunk_threshold: 0.5,
        summary_max_words: 120,
        model: "test-model".to_string(),
    }
}

fn coordinator(
    client: Arc<dyn ProviderClient>,
    gateway: GatewayConfig,
    progress: Arc<ProgressTracker>,
) -> BatchCoordinator {
    BatchCoordinator::new(
        Arc::new(TextFileParser),
        client,
        gateway,
        pipeline_config(),
        BatchOptions::default(),
        progress,
        Arc::new(PipelineMetrics::new()),
        CancellationToken::new(),
    )
}

/// Write fixture files into a fresh directory under the system temp dir.
fn write_fixtures(label: &str, files: &[(&str, &str)]) -> Vec<PathBuf> {
    let dir = std::env::temp_dir().join(format!("docdigest-it-{label}-{}", std::process::id()));
    std::fs::create_dir_all(&dir).expect("create fixture dir");
    files
        .iter()
        .map(|(name, contents)| {
            let path = dir.join(name);
            std::fs::write(&path, contents).expect("write fixture");
            path
        })
        .collect()
}

#[tokio::test]
async fn batch_over_real_files_isolates_the_unsupported_one() {
    let report = "The quarterly report covers revenue, costs, and hiring.\n\n".repeat(8);
    let mut paths = write_fixtures(
        "batch",
        &[
            ("report.txt", report.as_str()),
            ("notes.md", "# Notes\n\nA single short section."),
        ],
    );
    // An explicit submission the bundled parser cannot handle.
    paths.insert(1, PathBuf::from("slides.docx"));

    let progress = Arc::new(ProgressTracker::new());
    let mut events = progress.subscribe();
    let provider = Arc::new(CannedProvider::ok());
    let coordinator = coordinator(provider.clone(), gateway_config(), progress.clone());

    let result = coordinator.run(&paths).await;

    assert_eq!(result.documents.len(), 3);
    assert_eq!(result.succeeded, 2);
    assert_eq!(result.failed, 1);

    // Submission order survives concurrent completion.
    assert!(result.documents[0].origin.ends_with("report.txt"));
    assert!(result.documents[1].origin.ends_with("slides.docx"));
    assert!(result.documents[2].origin.ends_with("notes.md"));

    let report_result = &result.documents[0];
    assert_eq!(report_result.status, DocumentStatus::Ok);
    assert!(report_result.chunks.len() > 1);
    for (expected, chunk) in report_result.chunks.iter().enumerate() {
        assert_eq!(chunk.index, expected);
    }
    let summary = report_result.summary.as_ref().expect("summary present");
    assert!(!summary.overview.is_empty());
    assert!(!summary.key_points.is_empty());

    assert_eq!(result.documents[1].status, DocumentStatus::Failed);

    // The rollup reached its totals and a batch Done event was delivered.
    let rollup = progress.batch_progress();
    assert_eq!(rollup.documents_completed, 3);
    assert_eq!(rollup.chunks_completed, rollup.chunks_total);
    let mut saw_done = false;
    while let Ok(event) = events.try_recv() {
        if event.scope == ProgressScope::Batch && event.phase == Phase::Done {
            assert_eq!(event.completed, 3);
            saw_done = true;
        }
    }
    assert!(saw_done);
}

#[tokio::test(start_paused = true)]
async fn slow_provider_times_out_every_chunk_after_three_attempts() {
    let text = "A sentence of filler text for the chunker to split apart.\n\n".repeat(12);
    let paths = write_fixtures("timeout", &[("slow.txt", text.as_str())]);

    let provider = Arc::new(CannedProvider::slow(Duration::from_millis(500)));
    let coordinator = coordinator(
        provider.clone(),
        gateway_config(),
        Arc::new(ProgressTracker::new()),
    );

    let result = coordinator.run(&paths).await;

    let document = &result.documents[0];
    assert_eq!(document.status, DocumentStatus::Failed);
    assert!(document.chunks.len() > 1);
    for chunk in &document.chunks {
        let error = chunk.error.as_ref().expect("timeout detail");
        assert_eq!(error.kind, Some(ProviderErrorKind::Timeout));
    }
    // Exactly max_attempts calls per chunk, no more.
    assert_eq!(provider.calls() as usize, document.chunks.len() * 3);
}

#[tokio::test]
async fn ollama_provider_drives_the_pipeline_over_http() {
    let paths = write_fixtures("ollama", &[("memo.txt", "One memo, short enough for a single chunk.")]);

    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST).path("/api/generate");
            then.status(200).json_body(json!({
                "response": "A memo about one thing.\nKey points:\n- one thing",
                "done": true
            }));
        })
        .await;

    let client: Arc<dyn ProviderClient> =
        Arc::new(OllamaProvider::new(Some(server.base_url())));
    let coordinator = coordinator(client, gateway_config(), Arc::new(ProgressTracker::new()));

    let result = coordinator.run(&paths).await;

    mock.assert();
    assert_eq!(result.succeeded, 1);
    let summary = result.documents[0].summary.as_ref().expect("summary");
    assert_eq!(summary.overview, "A memo about one thing.");
    assert_eq!(summary.key_points, vec!["one thing"]);
}
