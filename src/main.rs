use anyhow::{Context, Result, bail};
use clap::Parser;
use docdigest::config;
use docdigest::logging;
use docdigest::metrics::PipelineMetrics;
use docdigest::parser::{DocumentFormat, TextFileParser};
use docdigest::pipeline::{
    BatchCoordinator, BatchOptions, BatchResult, DocumentStatus, ProgressScope, ProgressTracker,
};
use docdigest::provider;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use walkdir::WalkDir;

#[derive(Parser)]
#[command(
    name = "docdigest",
    about = "Condense documents into structured summaries through a provider pipeline"
)]
struct Cli {
    /// Files or directories to summarize. Directories are walked for
    /// supported extensions.
    #[arg(required = true)]
    inputs: Vec<PathBuf>,
    /// Print the full batch result as JSON instead of the report.
    #[arg(long)]
    json: bool,
    /// Stream progress events to stderr while the batch runs.
    #[arg(long)]
    progress: bool,
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    config::init_config();
    logging::init_tracing();
    let config = config::get_config();

    let paths = collect_inputs(&cli.inputs)?;
    if paths.is_empty() {
        bail!("no supported documents found in the given inputs");
    }

    let progress = Arc::new(ProgressTracker::new());
    let metrics = Arc::new(PipelineMetrics::new());
    let cancel = CancellationToken::new();

    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received; letting in-flight calls settle");
            interrupt.cancel();
        }
    });

    if cli.progress {
        spawn_progress_printer(progress.clone());
    }

    let client: Arc<dyn provider::ProviderClient> =
        Arc::from(provider::get_provider_client(config));
    let coordinator = BatchCoordinator::new(
        Arc::new(TextFileParser),
        client,
        config.gateway_config(),
        config.pipeline_config(),
        BatchOptions {
            concurrency: config.batch_concurrency,
            breaker_scope: config.breaker_scope,
        },
        progress,
        metrics.clone(),
        cancel,
    );

    let result = coordinator.run(&paths).await;

    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&result).context("failed to serialize batch result")?
        );
    } else {
        print_report(&result);
    }

    let snapshot = metrics.snapshot();
    tracing::debug!(
        documents_summarized = snapshot.documents_summarized,
        documents_failed = snapshot.documents_failed,
        provider_retries = snapshot.provider_retries,
        breaker_trips = snapshot.breaker_trips,
        "Pipeline metrics"
    );

    if result.succeeded + result.degraded == 0 {
        bail!("no document produced a usable summary");
    }
    Ok(())
}

/// Expand the CLI inputs into a flat, ordered list of candidate files.
///
/// Explicit file arguments are kept as given, even with an unsupported
/// extension, so the batch result reports the failure instead of hiding the
/// input. Directories contribute only files with known extensions.
fn collect_inputs(inputs: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for input in inputs {
        if input.is_dir() {
            let mut found: Vec<PathBuf> = WalkDir::new(input)
                .sort_by_file_name()
                .into_iter()
                .filter_map(std::result::Result::ok)
                .filter(|entry| {
                    entry.file_type().is_file() && DocumentFormat::from_path(entry.path()).is_some()
                })
                .map(|entry| entry.into_path())
                .collect();
            paths.append(&mut found);
        } else if input.exists() {
            paths.push(input.clone());
        } else {
            bail!("input {} does not exist", input.display());
        }
    }
    Ok(paths)
}

fn spawn_progress_printer(progress: Arc<ProgressTracker>) {
    let mut events = progress.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match &event.scope {
                ProgressScope::Batch => {
                    eprintln!(
                        "[batch] {:?}: {}/{}",
                        event.phase, event.completed, event.total
                    );
                }
                ProgressScope::Document(id) => {
                    eprintln!(
                        "[{id}] {:?}: {}/{}",
                        event.phase, event.completed, event.total
                    );
                }
            }
        }
    });
}

fn print_report(result: &BatchResult) {
    for document in &result.documents {
        match document.status {
            DocumentStatus::Failed => {
                let reason = document
                    .failure
                    .as_ref()
                    .map_or_else(|| "unknown".to_string(), ToString::to_string);
                println!("✗ {}: {reason}", document.origin);
            }
            status => {
                let marker = if status == DocumentStatus::Degraded {
                    "~"
                } else {
                    "✓"
                };
                println!("{marker} {}", document.origin);
                if let Some(summary) = &document.summary {
                    println!("  {}", summary.overview);
                    for point in &summary.key_points {
                        println!("  - {point}");
                    }
                    if let Some(items) = &summary.action_items {
                        println!("  Action items:");
                        for item in items {
                            println!("  - {item}");
                        }
                    }
                }
                for warning in &document.warnings {
                    println!("  ! {warning}");
                }
            }
        }
        println!();
    }

    println!(
        "{} succeeded, {} degraded, {} failed in {} ms",
        result.succeeded, result.degraded, result.failed, result.elapsed_ms
    );
}
