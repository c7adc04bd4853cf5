//! Chunk budgets, token counting, and fragment packing.
//!
//! The chunker turns an ordered fragment list into token-bounded chunks:
//!
//! - Budget: derived from the completion model's context window minus reserved
//!   space for prompt scaffolding and the expected output, clamped to a
//!   conservative range; callers can override it explicitly.
//! - Packing: whole fragments are packed greedily; a fragment that alone
//!   exceeds the budget is split at sentence/paragraph boundaries (never
//!   mid-word) via `semchunk`.
//! - Overlap: every chunk after the first starts with a token-limited tail of
//!   its predecessor so synthesis does not lose meaning at cut points.
//! - Token counting: `tiktoken` encodings when the model is known, otherwise
//!   a whitespace counter (typical for locally aliased Ollama models).

use anyhow::Error as TokenizerError;
use semchunk_rs::Chunker;
use std::collections::BTreeSet;
use std::sync::Arc;
use thiserror::Error;
use tiktoken_rs::{
    CoreBPE, cl100k_base, get_bpe_from_model, o200k_base, p50k_base, p50k_edit, r50k_base,
};

use super::types::{Chunk, DocumentFragment};

pub(crate) type TokenCounter = Arc<dyn Fn(&str) -> usize + Send + Sync>;

const MIN_CHUNK_BUDGET: usize = 256;
const MAX_CHUNK_BUDGET: usize = 4096;
/// Tokens reserved for the instruction template wrapped around chunk content.
const PROMPT_SCAFFOLDING_TOKENS: usize = 512;

/// Errors produced while turning fragments into chunks.
#[derive(Debug, Error)]
pub enum ChunkingError {
    /// The derived or overridden token budget was zero.
    #[error("chunk budget must be greater than zero")]
    InvalidChunkBudget,
    /// Tokenizer resources were unavailable for the configured encoding.
    #[error("failed to initialize tokenizer for model '{model}': {source}")]
    Tokenizer {
        /// Model or encoding name we attempted to load.
        model: String,
        /// Underlying error raised by the tokenizer library.
        #[source]
        source: TokenizerError,
    },
}

/// Determine the per-chunk token budget, respecting an explicit override.
///
/// Without an override the budget is the context window minus reserved prompt
/// scaffolding and the expected output (`max_length` words with a generous
/// words-to-tokens margin), clamped into `[256, 4096]`.
pub(crate) fn determine_chunk_budget(
    override_budget: Option<usize>,
    context_window: usize,
    max_length_words: usize,
) -> usize {
    if let Some(explicit) = override_budget {
        return explicit.max(1);
    }

    let reserved = PROMPT_SCAFFOLDING_TOKENS + expected_output_tokens(max_length_words);
    let base = context_window.saturating_sub(reserved).max(1);
    base.clamp(MIN_CHUNK_BUDGET, MAX_CHUNK_BUDGET)
}

/// Completion-token allowance for a call targeting `words` words of output.
pub(crate) fn expected_output_tokens(words: usize) -> usize {
    (words * 2).max(256)
}

/// Build a token counter for the configured completion model.
///
/// Uses `tiktoken` encodings when the model (or an explicit encoding name) is
/// known and falls back to whitespace counting otherwise. The fallback is
/// logged at `warn` level so the approximation is visible in diagnostics.
pub(crate) fn build_token_counter(model: &str) -> Result<TokenCounter, ChunkingError> {
    let normalized = model.trim();
    match get_bpe_from_model(normalized) {
        Ok(encoding) => Ok(counter_from_encoding(encoding)),
        Err(model_err) => {
            if let Some(candidate) = encoding_from_name(normalized) {
                let encoding = candidate.map_err(|source| ChunkingError::Tokenizer {
                    model: normalized.to_string(),
                    source,
                })?;
                return Ok(counter_from_encoding(encoding));
            }
            tracing::warn!(
                model = normalized,
                error = %model_err,
                "Tokenizer unavailable for model; falling back to whitespace counter"
            );
            Ok(whitespace_counter())
        }
    }
}

fn counter_from_encoding(encoding: CoreBPE) -> TokenCounter {
    let encoding = Arc::new(encoding);
    Arc::new(move |segment: &str| encoding.encode_ordinary(segment).len())
}

fn encoding_from_name(name: &str) -> Option<Result<CoreBPE, TokenizerError>> {
    match name {
        "cl100k_base" => Some(cl100k_base()),
        "o200k_base" => Some(o200k_base()),
        "p50k_base" => Some(p50k_base()),
        "p50k_edit" => Some(p50k_edit()),
        "r50k_base" | "gpt2" => Some(r50k_base()),
        _ => None,
    }
}

pub(crate) fn whitespace_counter() -> TokenCounter {
    Arc::new(|segment: &str| {
        let tokens = segment.split_whitespace().count();
        if tokens == 0 && !segment.is_empty() {
            1
        } else {
            tokens
        }
    })
}

fn fragment_block(fragment: &DocumentFragment) -> String {
    format!(
        "--- Document {} ---\n{}\n",
        fragment.document_id,
        fragment.text.trim()
    )
}

/// Split ordered fragments into token-bounded chunks with overlap.
///
/// Each chunk carries the ids of the fragments packed into it. Fragments with
/// whitespace-only text are skipped; an empty fragment list (or all-empty
/// texts) yields an empty chunk list.
pub(crate) fn chunk_fragments(
    fragments: &[DocumentFragment],
    budget: usize,
    overlap: usize,
    token_counter: &TokenCounter,
) -> Result<Vec<Chunk>, ChunkingError> {
    if budget == 0 {
        return Err(ChunkingError::InvalidChunkBudget);
    }

    let mut base: Vec<(String, BTreeSet<String>)> = Vec::new();
    let mut current_text = String::new();
    let mut current_ids: BTreeSet<String> = BTreeSet::new();

    let mut flush = |text: &mut String, ids: &mut BTreeSet<String>, out: &mut Vec<_>| {
        if !text.trim().is_empty() {
            out.push((std::mem::take(text), std::mem::take(ids)));
        } else {
            text.clear();
            ids.clear();
        }
    };

    for fragment in fragments {
        if fragment.text.trim().is_empty() {
            continue;
        }
        let block = fragment_block(fragment);
        let block_tokens = token_counter.as_ref()(&block);

        if block_tokens > budget {
            // Oversized fragment: close the open chunk, then split the
            // fragment internally at semantic boundaries.
            flush(&mut current_text, &mut current_ids, &mut base);
            let counter = token_counter.clone();
            let splitter = Chunker::new(
                budget,
                Box::new(move |segment: &str| counter.as_ref()(segment)),
            );
            for piece in splitter.chunk(&block) {
                if piece.trim().is_empty() {
                    continue;
                }
                let mut ids = BTreeSet::new();
                ids.insert(fragment.document_id.clone());
                base.push((piece, ids));
            }
            continue;
        }

        let candidate = if current_text.is_empty() {
            block.clone()
        } else {
            format!("{current_text}\n{block}")
        };
        if !current_text.is_empty() && token_counter.as_ref()(&candidate) > budget {
            flush(&mut current_text, &mut current_ids, &mut base);
            current_text = block;
        } else {
            current_text = candidate;
        }
        current_ids.insert(fragment.document_id.clone());
    }
    flush(&mut current_text, &mut current_ids, &mut base);

    Ok(apply_overlap(base, budget, overlap, token_counter))
}

/// Prefix every chunk after the first with a token-limited tail of its
/// predecessor's base text, re-trimming to the budget as needed.
fn apply_overlap(
    base: Vec<(String, BTreeSet<String>)>,
    budget: usize,
    overlap: usize,
    token_counter: &TokenCounter,
) -> Vec<Chunk> {
    let effective_overlap = overlap.min(budget.saturating_sub(1));

    let mut chunks = Vec::with_capacity(base.len());
    let mut previous_text: Option<String> = None;

    for (index, (text, document_ids)) in base.into_iter().enumerate() {
        let combined = match (&previous_text, effective_overlap) {
            (Some(previous), limit) if limit > 0 => {
                build_overlapped_text(previous, &text, limit, budget, token_counter)
            }
            _ => text.clone(),
        };
        chunks.push(Chunk {
            index,
            text: combined,
            document_ids,
        });
        previous_text = Some(text);
    }

    chunks
}

fn build_overlapped_text(
    previous: &str,
    current: &str,
    overlap: usize,
    budget: usize,
    token_counter: &TokenCounter,
) -> String {
    let tail = tail_with_token_limit(previous, overlap, token_counter);
    if tail.is_empty() {
        return current.to_string();
    }

    let mut combined = String::with_capacity(tail.len() + current.len() + 1);
    combined.push_str(tail);
    if !tail.ends_with(char::is_whitespace) && !current.starts_with(char::is_whitespace) {
        combined.push(' ');
    }
    combined.push_str(current);
    trim_to_token_budget(&combined, budget, token_counter)
}

fn tail_with_token_limit<'a>(
    text: &'a str,
    token_limit: usize,
    token_counter: &TokenCounter,
) -> &'a str {
    if token_limit == 0 {
        return "";
    }

    let trimmed_text = text.trim_start();
    if token_counter.as_ref()(trimmed_text) <= token_limit {
        return trimmed_text;
    }

    let len = text.len();
    let mut start = 0;

    while start < len {
        let next_start = text[start..]
            .char_indices()
            .nth(1)
            .map(|(offset, _)| start + offset)
            .unwrap_or(len);
        start = next_start;
        let candidate = text[start..].trim_start();
        if token_counter.as_ref()(candidate) <= token_limit {
            return candidate;
        }
    }

    ""
}

fn trim_to_token_budget(text: &str, token_budget: usize, token_counter: &TokenCounter) -> String {
    if token_budget == 0 {
        return String::new();
    }

    if token_counter.as_ref()(text) <= token_budget {
        return text.to_string();
    }

    let len = text.len();
    let mut start = 0;

    while start < len {
        let next_start = text[start..]
            .char_indices()
            .nth(1)
            .map(|(offset, _)| start + offset)
            .unwrap_or(len);
        start = next_start;
        let candidate = text[start..].trim_start();
        if token_counter.as_ref()(candidate) <= token_budget {
            return candidate.to_string();
        }
    }

    String::new()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fragment(id: &str, text: &str) -> DocumentFragment {
        DocumentFragment {
            document_id: id.to_string(),
            text: text.to_string(),
            relevance: 1.0,
        }
    }

    #[test]
    fn budget_prefers_override() {
        assert_eq!(determine_chunk_budget(Some(42), 32_000, 500), 42);
    }

    #[test]
    fn budget_subtracts_reserved_space_and_clamps() {
        // 32000 - 512 - 1000 = 30488, clamped to the 4096 ceiling.
        assert_eq!(determine_chunk_budget(None, 32_000, 500), 4096);
        // Tiny window still yields the floor.
        assert_eq!(determine_chunk_budget(None, 1_000, 500), 256);
    }

    #[test]
    fn small_fragments_share_one_chunk() {
        let fragments = vec![fragment("doc-1", "alpha beta"), fragment("doc-2", "gamma")];
        let chunks = chunk_fragments(&fragments, 64, 0, &whitespace_counter()).unwrap();
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].document_ids.contains("doc-1"));
        assert!(chunks[0].document_ids.contains("doc-2"));
        assert!(chunks[0].text.contains("--- Document doc-1 ---"));
    }

    #[test]
    fn fragments_split_across_chunks_when_budget_is_tight() {
        let fragments = vec![
            fragment("doc-1", "one two three four five six"),
            fragment("doc-2", "seven eight nine ten eleven twelve"),
        ];
        let chunks = chunk_fragments(&fragments, 12, 0, &whitespace_counter()).unwrap();
        assert_eq!(chunks.len(), 2);
        assert_eq!(
            chunks[0].document_ids.iter().collect::<Vec<_>>(),
            vec!["doc-1"]
        );
        assert_eq!(
            chunks[1].document_ids.iter().collect::<Vec<_>>(),
            vec!["doc-2"]
        );
    }

    #[test]
    fn oversized_fragment_is_split_internally() {
        let long_text = (0..60)
            .map(|i| format!("word{i}"))
            .collect::<Vec<_>>()
            .join(" ");
        let chunks =
            chunk_fragments(&[fragment("doc-1", &long_text)], 16, 0, &whitespace_counter())
                .unwrap();
        assert!(chunks.len() > 1);
        let counter = whitespace_counter();
        for chunk in &chunks {
            assert!(counter.as_ref()(&chunk.text) <= 16);
            assert!(chunk.document_ids.contains("doc-1"));
        }
    }

    #[test]
    fn overlap_carries_previous_tail_within_budget() {
        let fragments = vec![
            fragment("doc-1", "one two three four five six"),
            fragment("doc-2", "seven eight nine ten eleven twelve"),
        ];
        let counter = whitespace_counter();
        let chunks = chunk_fragments(&fragments, 12, 3, &counter).unwrap();
        assert_eq!(chunks.len(), 2);
        assert!(counter.as_ref()(&chunks[1].text) <= 12);
        // Tail of the first chunk's base text leads the second chunk.
        assert!(chunks[1].text.starts_with("five six"));
        // Overlap does not extend document attribution.
        assert!(!chunks[1].document_ids.contains("doc-1"));
    }

    #[test]
    fn zero_budget_is_rejected() {
        let error =
            chunk_fragments(&[fragment("doc-1", "text")], 0, 0, &whitespace_counter()).unwrap_err();
        assert!(matches!(error, ChunkingError::InvalidChunkBudget));
    }

    #[test]
    fn whitespace_only_fragments_yield_no_chunks() {
        let chunks =
            chunk_fragments(&[fragment("doc-1", "   ")], 64, 0, &whitespace_counter()).unwrap();
        assert!(chunks.is_empty());
    }

    #[test]
    fn unknown_model_falls_back_to_whitespace_counting() {
        let counter = build_token_counter("totally-unknown-model").unwrap();
        assert_eq!(counter.as_ref()("three plain words"), 3);
    }

    #[test]
    fn chunk_ordinals_are_sequential() {
        let fragments = vec![
            fragment("doc-1", "one two three four five six"),
            fragment("doc-2", "seven eight nine ten eleven twelve"),
            fragment("doc-3", "a b c d e f g h"),
        ];
        let chunks = chunk_fragments(&fragments, 12, 0, &whitespace_counter()).unwrap();
        for (expected, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.index, expected);
        }
    }
}
