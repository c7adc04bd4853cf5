//! Core data types and error definitions for the synthesis pipeline.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;
use thiserror::Error;

use super::usage::UsageTotals;

/// Smallest accepted summary length in words.
pub const MIN_SUMMARY_WORDS: usize = 50;
/// Largest accepted summary length in words.
pub const MAX_SUMMARY_WORDS: usize = 2000;
/// Default summary length applied when the caller does not specify one.
pub const DEFAULT_SUMMARY_WORDS: usize = 500;
/// Upper bound on the number of documents a single request may reference.
pub const MAX_REQUEST_DOCUMENTS: usize = 50;

/// Audience a summary is tailored for. The set is closed; unknown role
/// strings are rejected before the synthesis core is invoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StakeholderRole {
    /// Technical audience concerned with specifications and quality.
    Developer,
    /// Delivery audience concerned with scope and timelines.
    Contractor,
    /// Design audience concerned with intent and compliance.
    Architect,
    /// Commissioning audience concerned with progress and budget.
    Client,
    /// Coordination audience concerned with status and risk.
    ProjectManager,
    /// Legal audience concerned with obligations and disputes.
    Legal,
    /// Financial audience concerned with costs and forecasts.
    Finance,
    /// Leadership audience concerned with strategy and decisions.
    Executive,
}

/// Error produced when a role string falls outside the enumerated set.
#[derive(Debug, Error)]
#[error("unknown stakeholder role: '{0}'")]
pub struct InvalidRoleError(
    /// The rejected role string.
    pub String,
);

impl StakeholderRole {
    /// Wire representation used in prompts and persisted records.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Developer => "developer",
            Self::Contractor => "contractor",
            Self::Architect => "architect",
            Self::Client => "client",
            Self::ProjectManager => "project_manager",
            Self::Legal => "legal",
            Self::Finance => "finance",
            Self::Executive => "executive",
        }
    }
}

impl std::str::FromStr for StakeholderRole {
    type Err = InvalidRoleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "developer" => Ok(Self::Developer),
            "contractor" => Ok(Self::Contractor),
            "architect" => Ok(Self::Architect),
            "client" => Ok(Self::Client),
            "project_manager" => Ok(Self::ProjectManager),
            "legal" => Ok(Self::Legal),
            "finance" => Ok(Self::Finance),
            "executive" => Ok(Self::Executive),
            other => Err(InvalidRoleError(other.to_string())),
        }
    }
}

impl std::fmt::Display for StakeholderRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validated synthesis request. Immutable once accepted.
#[derive(Debug, Clone)]
pub struct SummaryRequest {
    role: StakeholderRole,
    document_ids: Vec<String>,
    focus_areas: Vec<String>,
    max_length: usize,
}

impl SummaryRequest {
    /// Validate and construct a request.
    ///
    /// Document ids must number between 1 and [`MAX_REQUEST_DOCUMENTS`], be
    /// non-empty, and be unique. `max_length` defaults to
    /// [`DEFAULT_SUMMARY_WORDS`] and must fall within
    /// [`MIN_SUMMARY_WORDS`]..=[`MAX_SUMMARY_WORDS`].
    pub fn new(
        role: StakeholderRole,
        document_ids: Vec<String>,
        focus_areas: Vec<String>,
        max_length: Option<usize>,
    ) -> Result<Self, SynthesisError> {
        if document_ids.is_empty() {
            return Err(SynthesisError::InvalidRequest(
                "at least one document id is required".into(),
            ));
        }
        if document_ids.len() > MAX_REQUEST_DOCUMENTS {
            return Err(SynthesisError::InvalidRequest(format!(
                "too many document ids: {} (maximum {MAX_REQUEST_DOCUMENTS})",
                document_ids.len()
            )));
        }
        if document_ids.iter().any(|id| id.trim().is_empty()) {
            return Err(SynthesisError::InvalidRequest(
                "document ids must be non-empty".into(),
            ));
        }
        let mut seen = BTreeSet::new();
        for id in &document_ids {
            if !seen.insert(id.as_str()) {
                return Err(SynthesisError::InvalidRequest(format!(
                    "duplicate document id: '{id}'"
                )));
            }
        }
        let max_length = max_length.unwrap_or(DEFAULT_SUMMARY_WORDS);
        if !(MIN_SUMMARY_WORDS..=MAX_SUMMARY_WORDS).contains(&max_length) {
            return Err(SynthesisError::InvalidRequest(format!(
                "max_length {max_length} outside {MIN_SUMMARY_WORDS}..={MAX_SUMMARY_WORDS}"
            )));
        }

        Ok(Self {
            role,
            document_ids,
            focus_areas: focus_areas
                .into_iter()
                .map(|area| area.trim().to_string())
                .filter(|area| !area.is_empty())
                .collect(),
            max_length,
        })
    }

    /// Stakeholder role the summary is addressed to.
    pub fn role(&self) -> StakeholderRole {
        self.role
    }

    /// Ordered document identifiers in scope for this request.
    pub fn document_ids(&self) -> &[String] {
        &self.document_ids
    }

    /// Optional focus-area terms used for relevance scoring and prompting.
    pub fn focus_areas(&self) -> &[String] {
        &self.focus_areas
    }

    /// Target summary length in words.
    pub fn max_length(&self) -> usize {
        self.max_length
    }
}

/// A document's extracted text annotated with its relevance score.
///
/// Produced by the relevance scorer; downstream stages read it but never
/// mutate it.
#[derive(Debug, Clone)]
pub struct DocumentFragment {
    /// Identifier of the source document.
    pub document_id: String,
    /// Raw extracted text of the document.
    pub text: String,
    /// Relevance against the request's focus areas, 0.0..=1.0.
    pub relevance: f64,
}

/// A token-bounded slice of concatenated fragment text.
///
/// Ephemeral; exists only for the duration of one synthesis run.
#[derive(Debug, Clone)]
pub struct Chunk {
    /// Ordinal position within the run.
    pub index: usize,
    /// Chunk text, including any leading overlap from the previous chunk.
    pub text: String,
    /// Identifiers of the fragments packed into this chunk.
    pub document_ids: BTreeSet<String>,
}

/// Condensed model output for one chunk during the map phase.
#[derive(Debug, Clone)]
pub struct PartialSummary {
    /// Index of the chunk this partial was produced from.
    pub chunk_index: usize,
    /// Condensed text; empty when the chunk's calls exhausted retries.
    pub text: String,
    /// Evidence ids, always a subset of the chunk's document ids.
    pub evidence_ids: BTreeSet<String>,
}

impl PartialSummary {
    /// Fallback partial recorded when a chunk's map call exhausted retries.
    pub fn empty(chunk_index: usize) -> Self {
        Self {
            chunk_index,
            text: String::new(),
            evidence_ids: BTreeSet::new(),
        }
    }
}

/// One titled section of the final summary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummarySection {
    /// Section heading.
    pub title: String,
    /// Narrative body of the section.
    pub body: String,
    /// Ordinal position within the summary.
    pub position: usize,
    /// Short key points extracted for the section.
    pub key_points: Vec<String>,
    /// Evidence ids, always a subset of the request's document ids.
    pub evidence_ids: Vec<String>,
}

/// Terminal output of one synthesis run. Created once, never mutated.
#[derive(Debug, Clone)]
pub struct SynthesisResult {
    /// Ordered summary sections.
    pub sections: Vec<SummarySection>,
    /// Concatenated summary text, bounded by the requested word budget.
    pub full_summary: String,
    /// Aggregated token usage across every model call issued.
    pub usage: UsageTotals,
    /// Wall-clock time spent producing the result.
    pub elapsed: Duration,
    /// Set when the parser fell back to the single-section degraded output.
    pub degraded: bool,
    /// Model identifier the completions were generated with.
    pub model_used: String,
}

/// Failures surfaced by the synthesis core.
#[derive(Debug, Error)]
pub enum SynthesisError {
    /// A requested document id could not be resolved by the store.
    #[error("document not found: '{0}'")]
    DocumentNotFound(String),
    /// Request validation failed before any model call was made.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    /// Model calls failed beyond what the pipeline can degrade around.
    #[error("synthesis failed: {0}")]
    SynthesisFailed(String),
    /// The overall wall-clock budget was exceeded.
    #[error("synthesis timed out after {0:?}")]
    SynthesisTimeout(Duration),
}
