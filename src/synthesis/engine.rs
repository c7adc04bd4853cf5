//! Map-reduce orchestration of model calls into one synthesis result.
//!
//! The engine owns the lifecycle of chunks and partial summaries for the
//! duration of one request. A single chunk takes the fast path (one structured
//! call, no map phase); multiple chunks are condensed concurrently through a
//! bounded pool, joined, and merged by one reduce call. Results are keyed by
//! chunk index so ordering is deterministic regardless of completion order.

use futures_util::StreamExt;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::completion::{CompletionClient, CompletionError, CompletionRequest};
use crate::config::Config;
use crate::documents::DocumentStore;

use super::chunking::{
    build_token_counter, chunk_fragments, determine_chunk_budget, expected_output_tokens,
};
use super::parser::{parse_partial, parse_structured_response, render_full_summary, truncate_words};
use super::prompt::{build_final_prompt, build_map_prompt, build_reduce_prompt};
use super::relevance::gather_fragments;
use super::types::{PartialSummary, SummaryRequest, SynthesisError, SynthesisResult};
use super::usage::{CallUsage, UsageTracker};

const DEFAULT_CONTEXT_WINDOW: usize = 32_000;
const DEFAULT_CHUNK_OVERLAP: usize = 64;
const DEFAULT_RELEVANCE_FLOOR: f64 = 0.35;
const DEFAULT_MAP_CONCURRENCY: usize = 5;
const DEFAULT_RETRY_ATTEMPTS: usize = 3;
const DEFAULT_RETRY_BASE_DELAY: Duration = Duration::from_millis(250);
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Words below which a per-chunk condensation target is never pushed, so
/// small chunks are not truncated into uselessness.
const MAP_PARTIAL_FLOOR_WORDS: usize = 80;
/// Allowed overshoot of the requested word budget, in percent.
const WORD_TOLERANCE_PCT: usize = 10;

/// Tunable parameters for one synthesizer instance.
#[derive(Debug, Clone)]
pub struct SynthesisConfig {
    /// Completion model identifier passed to the provider.
    pub model: String,
    /// Context window of the completion model, in tokens.
    pub context_window: usize,
    /// Explicit per-chunk token budget override.
    pub chunk_budget: Option<usize>,
    /// Token overlap carried between adjacent chunks.
    pub chunk_overlap: usize,
    /// Minimum relevance score a document must reach to be synthesized.
    pub relevance_floor: f64,
    /// Upper bound on concurrent map-phase calls.
    pub map_concurrency: usize,
    /// Attempts per model call before giving up on it.
    pub retry_attempts: usize,
    /// Backoff before the second attempt; doubles per further attempt.
    pub retry_base_delay: Duration,
    /// Wall-clock budget for the whole synthesis run.
    pub timeout: Duration,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            model: "llama3.1".to_string(),
            context_window: DEFAULT_CONTEXT_WINDOW,
            chunk_budget: None,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
            relevance_floor: DEFAULT_RELEVANCE_FLOOR,
            map_concurrency: DEFAULT_MAP_CONCURRENCY,
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
            retry_base_delay: DEFAULT_RETRY_BASE_DELAY,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl SynthesisConfig {
    /// Derive synthesis parameters from the loaded environment configuration.
    pub fn from_config(config: &Config) -> Self {
        let defaults = Self::default();
        Self {
            model: config.completion_model.clone(),
            context_window: config.context_window.unwrap_or(defaults.context_window),
            chunk_budget: config.chunk_budget,
            chunk_overlap: config.chunk_overlap.unwrap_or(defaults.chunk_overlap),
            relevance_floor: config.relevance_floor.unwrap_or(defaults.relevance_floor),
            map_concurrency: config.map_concurrency.unwrap_or(defaults.map_concurrency),
            retry_attempts: config.retry_attempts.unwrap_or(defaults.retry_attempts),
            retry_base_delay: defaults.retry_base_delay,
            timeout: config
                .timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
        }
    }
}

/// Coordinates relevance filtering, chunking, model calls, and parsing for
/// one request at a time.
///
/// The synthesizer owns a long-lived handle to the completion client;
/// construct it once and share it through an `Arc` if multiple surfaces need
/// it.
pub struct Synthesizer {
    client: Arc<dyn CompletionClient + Send + Sync>,
    config: SynthesisConfig,
}

impl Synthesizer {
    /// Build a synthesizer over an injected completion capability.
    pub fn new(client: Arc<dyn CompletionClient + Send + Sync>, config: SynthesisConfig) -> Self {
        Self { client, config }
    }

    /// Produce one [`SynthesisResult`] for the request, or a typed failure.
    ///
    /// The whole run is bounded by the configured timeout; once exceeded,
    /// in-flight model calls are abandoned and the request fails with
    /// [`SynthesisError::SynthesisTimeout`].
    pub async fn synthesize(
        &self,
        request: &SummaryRequest,
        store: &dyn DocumentStore,
    ) -> Result<SynthesisResult, SynthesisError> {
        let timeout = self.config.timeout;
        match tokio::time::timeout(timeout, self.run(request, store)).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(?timeout, "Synthesis exceeded wall-clock budget");
                Err(SynthesisError::SynthesisTimeout(timeout))
            }
        }
    }

    async fn run(
        &self,
        request: &SummaryRequest,
        store: &dyn DocumentStore,
    ) -> Result<SynthesisResult, SynthesisError> {
        let started = Instant::now();
        tracing::info!(
            role = %request.role(),
            documents = request.document_ids().len(),
            max_length = request.max_length(),
            "Starting synthesis"
        );

        let fragments = gather_fragments(store, request, self.config.relevance_floor).await?;
        let token_counter = build_token_counter(&self.config.model)
            .map_err(|error| SynthesisError::SynthesisFailed(error.to_string()))?;
        let budget = determine_chunk_budget(
            self.config.chunk_budget,
            self.config.context_window,
            request.max_length(),
        );
        let chunks = chunk_fragments(
            &fragments,
            budget,
            self.config.chunk_overlap,
            &token_counter,
        )
        .map_err(|error| SynthesisError::SynthesisFailed(error.to_string()))?;
        if chunks.is_empty() {
            return Err(SynthesisError::SynthesisFailed(
                "requested documents contained no text".into(),
            ));
        }
        tracing::debug!(
            chunks = chunks.len(),
            budget,
            overlap = self.config.chunk_overlap,
            "Chunked input"
        );

        let mut tracker = UsageTracker::new();
        let (final_text, contributing) = if chunks.len() == 1 {
            // Fast path: no map phase, one structured call.
            let chunk = &chunks[0];
            let prompt = build_final_prompt(request, &chunk.text, request.max_length());
            let (text, records) = self
                .call_with_retry(prompt, expected_output_tokens(request.max_length()))
                .await
                .map_err(|error| {
                    SynthesisError::SynthesisFailed(format!("model call failed: {error}"))
                })?;
            tracker.record_all(records);
            (text, chunk.document_ids.clone())
        } else {
            let partials = self.map_phase(request, &chunks, &mut tracker).await?;
            let contributing: BTreeSet<String> = partials
                .iter()
                .filter(|partial| !partial.text.is_empty())
                .flat_map(|partial| partial.evidence_ids.iter().cloned())
                .collect();

            let prompt = build_reduce_prompt(request, &partials, request.max_length());
            let (text, records) = self
                .call_with_retry(prompt, expected_output_tokens(request.max_length()))
                .await
                .map_err(|error| {
                    SynthesisError::SynthesisFailed(format!("reduce call failed: {error}"))
                })?;
            tracker.record_all(records);
            (text, contributing)
        };

        let parsed = parse_structured_response(&final_text, request.document_ids());
        let mut sections = parsed.sections;
        // Never leave an empty evidence set when source text exists; attribute
        // to the union of contributing documents, in request order.
        let fallback_evidence: Vec<String> = request
            .document_ids()
            .iter()
            .filter(|id| contributing.contains(*id))
            .cloned()
            .collect();
        for section in &mut sections {
            if section.evidence_ids.is_empty() && !section.body.is_empty() {
                section.evidence_ids = fallback_evidence.clone();
            }
        }

        let word_limit =
            request.max_length() + request.max_length() * WORD_TOLERANCE_PCT / 100;
        let full_summary = truncate_words(&render_full_summary(&sections), word_limit);

        let usage = tracker.totals();
        let elapsed = started.elapsed();
        tracing::info!(
            sections = sections.len(),
            total_tokens = usage.total_tokens,
            calls = usage.calls,
            elapsed_ms = elapsed.as_millis() as u64,
            degraded = parsed.degraded,
            "Synthesis completed"
        );

        Ok(SynthesisResult {
            sections,
            full_summary,
            usage,
            elapsed,
            degraded: parsed.degraded,
            model_used: self.config.model.clone(),
        })
    }

    /// Condense every chunk through the bounded pool and join before returning.
    ///
    /// A chunk whose call exhausts retries contributes an empty partial; the
    /// run only fails when every chunk does.
    async fn map_phase(
        &self,
        request: &SummaryRequest,
        chunks: &[super::types::Chunk],
        tracker: &mut UsageTracker,
    ) -> Result<Vec<PartialSummary>, SynthesisError> {
        let per_chunk_words =
            (request.max_length() / chunks.len()).max(MAP_PARTIAL_FLOOR_WORDS);
        let max_tokens = expected_output_tokens(per_chunk_words);

        let calls = chunks.iter().map(|chunk| {
            let prompt = build_map_prompt(request, chunk, per_chunk_words);
            async move {
                match self.call_with_retry(prompt, max_tokens).await {
                    Ok((text, records)) => (parse_partial(&text, chunk), records),
                    Err(error) => {
                        tracing::warn!(
                            chunk = chunk.index,
                            %error,
                            "Map call exhausted retries; contributing empty partial"
                        );
                        (PartialSummary::empty(chunk.index), Vec::new())
                    }
                }
            }
        });

        let outcomes: Vec<(PartialSummary, Vec<CallUsage>)> = futures_util::stream::iter(calls)
            .buffer_unordered(self.config.map_concurrency.max(1))
            .collect()
            .await;

        // Join barrier passed: every chunk's outcome is known. Aggregation
        // happens here, on a single task.
        let mut partials = Vec::with_capacity(outcomes.len());
        for (partial, records) in outcomes {
            tracker.record_all(records);
            partials.push(partial);
        }
        partials.sort_by_key(|partial| partial.chunk_index);

        if partials.iter().all(|partial| partial.text.is_empty()) {
            return Err(SynthesisError::SynthesisFailed(
                "all map-phase calls failed".into(),
            ));
        }
        Ok(partials)
    }

    async fn call_with_retry(
        &self,
        prompt: String,
        max_tokens: usize,
    ) -> Result<(String, Vec<CallUsage>), CompletionError> {
        let attempts = self.config.retry_attempts.max(1);
        let mut delay = self.config.retry_base_delay;
        let mut last_error = None;

        for attempt in 1..=attempts {
            let call_started = Instant::now();
            let request = CompletionRequest {
                model: self.config.model.clone(),
                prompt: prompt.clone(),
                max_tokens,
            };
            match self.client.complete(request).await {
                Ok(completion) => {
                    let record = CallUsage {
                        tokens: completion.usage,
                        latency: call_started.elapsed(),
                    };
                    return Ok((completion.text, vec![record]));
                }
                Err(error) => {
                    tracing::warn!(attempt, attempts, %error, "Completion call failed");
                    last_error = Some(error);
                    if attempt < attempts {
                        tokio::time::sleep(delay).await;
                        delay *= 2;
                    }
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            CompletionError::GenerationFailed("no completion attempts were made".into())
        }))
    }
}
