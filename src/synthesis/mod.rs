//! Multi-document synthesis pipeline: relevance filtering, chunking,
//! map-reduce model calls, and structured output parsing.

pub mod chunking;
mod engine;
mod parser;
pub mod prompt;
pub mod relevance;
pub mod types;
pub mod usage;

pub use chunking::ChunkingError;
pub use engine::{SynthesisConfig, Synthesizer};
pub use types::{
    Chunk, DocumentFragment, InvalidRoleError, PartialSummary, StakeholderRole, SummaryRequest,
    SummarySection, SynthesisError, SynthesisResult,
};
pub use usage::{CallUsage, UsageTotals, UsageTracker};
