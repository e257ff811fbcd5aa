//! Reduction step: folds ordered chunk results into one document summary.

use crate::gateway::ProviderGateway;
use crate::provider::CallParams;
use std::collections::HashSet;
use std::sync::Arc;

use super::summarize::bullet_text;
use super::types::{ChunkResult, ChunkStatus, ReductionError, Summary};

/// Outcome of reducing one document's chunk results.
#[derive(Debug)]
pub enum ReductionOutcome {
    /// A usable summary was assembled.
    Completed {
        /// The merged summary.
        summary: Summary,
        /// Whether any sub-step failed along the way.
        degraded: bool,
        /// Failed ordinals and fallback notes.
        warnings: Vec<String>,
    },
    /// Too many chunks failed to fabricate anything useful.
    ThresholdExceeded {
        /// Chunks whose calls failed.
        failed: usize,
        /// Total chunk count.
        total: usize,
    },
}

/// Merges ordered chunk results, running a second unifying pass when needed.
pub struct Reducer {
    gateway: Arc<ProviderGateway>,
    params: CallParams,
    max_words: usize,
    failed_threshold: f64,
}

impl Reducer {
    /// Build a reducer over the given gateway and model.
    pub fn new(
        gateway: Arc<ProviderGateway>,
        model: &str,
        max_words: usize,
        failed_threshold: f64,
    ) -> Self {
        Self {
            gateway,
            params: CallParams::for_model(model),
            max_words,
            failed_threshold,
        }
    }

    /// Fold ordered chunk results into a summary, applying the failure policy.
    ///
    /// Re-running over the same inputs yields the same outcome shape; the only
    /// nondeterminism is the provider's own output in the unifying pass.
    pub async fn reduce(&self, results: &[ChunkResult]) -> ReductionOutcome {
        let total = results.len();
        let failed = results
            .iter()
            .filter(|result| result.status == ChunkStatus::Failed)
            .count();

        if total > 0 && failed as f64 / total as f64 >= self.failed_threshold {
            return ReductionOutcome::ThresholdExceeded { failed, total };
        }

        let ok_results: Vec<&ChunkResult> = results
            .iter()
            .filter(|result| result.status == ChunkStatus::Ok)
            .collect();

        let mut warnings: Vec<String> = results
            .iter()
            .filter(|result| result.status == ChunkStatus::Failed)
            .map(|result| {
                let detail = result
                    .error
                    .as_ref()
                    .map(|error| error.message.clone())
                    .unwrap_or_else(|| "unknown error".to_string());
                format!("chunk {} failed: {detail}", result.index)
            })
            .collect();

        let key_points = dedupe_key_points(&ok_results);
        let mut degraded = failed > 0;

        let (overview, action_items) = if ok_results.len() == 1 {
            (ok_results[0].summary.clone(), None)
        } else {
            let summaries: Vec<&str> = ok_results
                .iter()
                .map(|result| result.summary.as_str())
                .collect();
            let prompt = build_reduction_prompt(&summaries, self.max_words);
            match self.gateway.summarize(&prompt, &self.params).await {
                Ok(text) => parse_reduction_response(&text),
                Err(error) => {
                    let error = ReductionError::from(error);
                    tracing::warn!(
                        error = %error,
                        "Unifying pass failed; falling back to concatenated summaries"
                    );
                    warnings.push(error.to_string());
                    degraded = true;
                    (summaries.join("\n\n"), None)
                }
            }
        };

        ReductionOutcome::Completed {
            summary: Summary {
                overview,
                key_points,
                action_items,
            },
            degraded,
            warnings,
        }
    }
}

/// De-duplicate key points across chunks, case-insensitively, in ordinal order.
fn dedupe_key_points(results: &[&ChunkResult]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut points = Vec::new();
    for result in results {
        for point in &result.key_points {
            let trimmed = point.trim();
            if trimmed.is_empty() {
                continue;
            }
            if seen.insert(trimmed.to_lowercase()) {
                points.push(trimmed.to_string());
            }
        }
    }
    points
}

/// Build the prompt for the unifying second pass.
pub(crate) fn build_reduction_prompt(summaries: &[&str], max_words: usize) -> String {
    let mut prompt = String::new();
    prompt.push_str(&format!(
        "System: You merge partial summaries of one document into a single coherent overview. Prefer neutral tone. Avoid speculation. Write a single paragraph of at most {max_words} words. If the material calls for follow-ups, add an 'Action items:' list of short bullets.\n\n"
    ));
    prompt.push_str("Merge the following partial summaries, in order:\n");
    for (position, summary) in summaries.iter().enumerate() {
        prompt.push_str(&format!("{}. {summary}\n", position + 1));
    }
    prompt
}

/// Split a unifying-pass response into the overview and optional action items.
pub(crate) fn parse_reduction_response(text: &str) -> (String, Option<Vec<String>>) {
    let mut overview_lines = Vec::new();
    let mut action_items = Vec::new();
    let mut in_items = false;

    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.eq_ignore_ascii_case("action items:") {
            in_items = true;
            continue;
        }
        if in_items {
            if let Some(item) = bullet_text(trimmed) {
                action_items.push(item.to_string());
            }
        } else if !trimmed.is_empty() {
            overview_lines.push(trimmed);
        }
    }

    let items = if action_items.is_empty() {
        None
    } else {
        Some(action_items)
    };
    (overview_lines.join(" "), items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::PipelineMetrics;
    use crate::pipeline::test_support::{ScriptedProvider, fast_gateway_config};
    use crate::provider::ProviderErrorKind;

    fn reducer_over(provider: Arc<ScriptedProvider>, threshold: f64) -> Reducer {
        let gateway = Arc::new(ProviderGateway::new(
            provider,
            fast_gateway_config(),
            Arc::new(PipelineMetrics::new()),
        ));
        Reducer::new(gateway, "test-model", 120, threshold)
    }

    fn ok_result(index: usize, summary: &str, points: &[&str]) -> ChunkResult {
        ChunkResult::ok(
            index,
            summary.to_string(),
            points.iter().map(|point| point.to_string()).collect(),
        )
    }

    fn failed_result(index: usize) -> ChunkResult {
        let mut result = ChunkResult::skipped(index);
        result.status = ChunkStatus::Failed;
        result.error = Some(super::super::types::ChunkError {
            kind: Some(ProviderErrorKind::Timeout),
            message: "no response".into(),
        });
        result
    }

    #[tokio::test(start_paused = true)]
    async fn single_ok_chunk_passes_through_without_second_pass() {
        let provider = Arc::new(ScriptedProvider::canned());
        let reducer = reducer_over(provider.clone(), 0.5);

        let results = [ok_result(0, "Only chunk.", &["alpha"])];
        let outcome = reducer.reduce(&results).await;

        let ReductionOutcome::Completed {
            summary, degraded, ..
        } = outcome
        else {
            panic!("expected completed outcome");
        };
        assert_eq!(summary.overview, "Only chunk.");
        assert_eq!(summary.key_points, vec!["alpha"]);
        assert!(!degraded);
        assert_eq!(provider.calls(), 0, "no unifying pass for one chunk");
    }

    #[tokio::test(start_paused = true)]
    async fn multiple_chunks_run_a_unifying_pass() {
        let provider = Arc::new(ScriptedProvider::new(|_, prompt| {
            assert!(prompt.contains("Merge the following partial summaries"));
            Ok("Unified overview.\nAction items:\n- follow up".to_string())
        }));
        let reducer = reducer_over(provider.clone(), 0.5);

        let results = [
            ok_result(0, "First part.", &["Alpha", "beta"]),
            ok_result(1, "Second part.", &["ALPHA", "gamma"]),
        ];
        let outcome = reducer.reduce(&results).await;

        let ReductionOutcome::Completed {
            summary, degraded, ..
        } = outcome
        else {
            panic!("expected completed outcome");
        };
        assert_eq!(summary.overview, "Unified overview.");
        assert_eq!(summary.action_items, Some(vec!["follow up".to_string()]));
        // Case-insensitive dedupe keeps the first spelling.
        assert_eq!(summary.key_points, vec!["Alpha", "beta", "gamma"]);
        assert!(!degraded);
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failures_below_threshold_degrade_with_warnings() {
        let provider = Arc::new(ScriptedProvider::new(|_, _| Ok("Overview.".to_string())));
        let reducer = reducer_over(provider, 0.5);

        let results = [
            ok_result(0, "First part.", &[]),
            failed_result(1),
            ok_result(2, "Third part.", &[]),
        ];
        let outcome = reducer.reduce(&results).await;

        let ReductionOutcome::Completed {
            degraded, warnings, ..
        } = outcome
        else {
            panic!("expected completed outcome");
        };
        assert!(degraded);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("chunk 1 failed"));
    }

    #[tokio::test(start_paused = true)]
    async fn threshold_met_fails_the_document() {
        let provider = Arc::new(ScriptedProvider::canned());
        let reducer = reducer_over(provider, 0.5);

        let results = [
            ok_result(0, "First part.", &[]),
            failed_result(1),
            failed_result(2),
            ok_result(3, "Fourth part.", &[]),
        ];
        let outcome = reducer.reduce(&results).await;

        assert!(matches!(
            outcome,
            ReductionOutcome::ThresholdExceeded { failed: 2, total: 4 }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn unifying_pass_failure_falls_back_to_concatenation() {
        let provider = Arc::new(ScriptedProvider::always_err(ProviderErrorKind::Transient));
        let reducer = reducer_over(provider, 0.5);

        let results = [
            ok_result(0, "First part.", &[]),
            ok_result(1, "Second part.", &[]),
        ];
        let outcome = reducer.reduce(&results).await;

        let ReductionOutcome::Completed {
            summary,
            degraded,
            warnings,
        } = outcome
        else {
            panic!("expected completed outcome");
        };
        assert_eq!(summary.overview, "First part.\n\nSecond part.");
        assert!(degraded);
        assert!(warnings.iter().any(|warning| warning.contains("reduction pass failed")));
    }

    #[tokio::test(start_paused = true)]
    async fn reduce_is_idempotent_over_the_same_inputs() {
        let results = [
            ok_result(0, "First part.", &["alpha"]),
            ok_result(1, "Second part.", &["beta"]),
        ];

        let mut outcomes = Vec::new();
        for _ in 0..2 {
            let provider = Arc::new(ScriptedProvider::new(|_, _| {
                Ok("Stable overview.".to_string())
            }));
            let reducer = reducer_over(provider, 0.5);
            outcomes.push(reducer.reduce(&results).await);
        }

        let summaries: Vec<Summary> = outcomes
            .into_iter()
            .map(|outcome| match outcome {
                ReductionOutcome::Completed { summary, .. } => summary,
                ReductionOutcome::ThresholdExceeded { .. } => panic!("unexpected failure"),
            })
            .collect();
        assert_eq!(summaries[0], summaries[1]);
    }
}
