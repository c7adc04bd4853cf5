//! Job and result record shapes consumed by the persistence collaborator.
//!
//! The core does not persist anything itself; these serde shapes exist so the
//! surrounding service can store job lifecycle state and synthesis output in
//! a compatible format.

use serde::{Deserialize, Serialize};
use time::{OffsetDateTime, format_description::well_known::Rfc3339};
use uuid::Uuid;

use crate::synthesis::{SynthesisError, SynthesisResult};

/// Lifecycle state of a summary job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Accepted, not yet started.
    Pending,
    /// Synthesis in progress.
    Processing,
    /// Synthesis finished and the result is available.
    Completed,
    /// Synthesis failed; `error_message` explains why.
    Failed,
}

/// Persisted job record tracking one synthesis request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    /// Unique job identifier.
    pub id: String,
    /// Current lifecycle state.
    pub status: JobStatus,
    /// Human-readable failure description, set on `Failed`.
    pub error_message: Option<String>,
    /// Model the summary was generated with, set on `Completed`.
    pub model_used: Option<String>,
    /// Total tokens consumed, set on `Completed`.
    pub tokens_used: Option<u64>,
    /// Processing time in seconds, set on `Completed`.
    pub processing_time: Option<f64>,
    /// Creation timestamp, RFC 3339.
    pub created_at: String,
    /// Completion or failure timestamp, RFC 3339.
    pub completed_at: Option<String>,
}

fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_default()
}

impl JobRecord {
    /// Create a pending job with a fresh identifier.
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            status: JobStatus::Pending,
            error_message: None,
            model_used: None,
            tokens_used: None,
            processing_time: None,
            created_at: now_rfc3339(),
            completed_at: None,
        }
    }

    /// Mark the job as picked up for synthesis.
    pub fn mark_processing(&mut self) {
        self.status = JobStatus::Processing;
    }

    /// Mark the job as completed, recording usage metadata from the result.
    pub fn mark_completed(&mut self, result: &SynthesisResult) {
        self.status = JobStatus::Completed;
        self.model_used = Some(result.model_used.clone());
        self.tokens_used = Some(result.usage.total_tokens);
        self.processing_time = Some(result.elapsed.as_secs_f64());
        self.completed_at = Some(now_rfc3339());
    }

    /// Mark the job as failed with the error's display text.
    pub fn mark_failed(&mut self, error: &SynthesisError) {
        self.status = JobStatus::Failed;
        self.error_message = Some(error.to_string());
        self.completed_at = Some(now_rfc3339());
    }
}

impl Default for JobRecord {
    fn default() -> Self {
        Self::new()
    }
}

/// One persisted summary section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectionRecord {
    /// Section heading.
    pub title: String,
    /// Narrative body of the section.
    pub content: String,
    /// Display order.
    pub order: usize,
    /// Short key points extracted for the section.
    pub key_points: Vec<String>,
    /// Document ids supporting the section.
    pub evidence_ids: Vec<String>,
}

/// Persisted synthesis output for a completed job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultRecord {
    /// Identifier derived from the job id.
    pub summary_id: String,
    /// Ordered summary sections.
    pub sections: Vec<SectionRecord>,
    /// Concatenated summary text.
    pub full_summary: String,
    /// Generation timestamp, RFC 3339.
    pub generated_at: String,
}

impl ResultRecord {
    /// Build the persisted shape from a synthesis result.
    pub fn from_result(job_id: &str, result: &SynthesisResult) -> Self {
        Self {
            summary_id: format!("sum_{job_id}"),
            sections: result
                .sections
                .iter()
                .map(|section| SectionRecord {
                    title: section.title.clone(),
                    content: section.body.clone(),
                    order: section.position,
                    key_points: section.key_points.clone(),
                    evidence_ids: section.evidence_ids.clone(),
                })
                .collect(),
            full_summary: result.full_summary.clone(),
            generated_at: now_rfc3339(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synthesis::{SummarySection, UsageTotals};
    use std::time::Duration;

    fn result() -> SynthesisResult {
        SynthesisResult {
            sections: vec![SummarySection {
                title: "Project Status".into(),
                body: "On schedule.".into(),
                position: 0,
                key_points: vec!["Milestone met".into()],
                evidence_ids: vec!["doc-1".into()],
            }],
            full_summary: "## Project Status\n\nOn schedule.".into(),
            usage: UsageTotals {
                prompt_tokens: 900,
                completion_tokens: 100,
                total_tokens: 1000,
                calls: 2,
                call_time: Duration::from_millis(800),
            },
            elapsed: Duration::from_millis(1200),
            degraded: false,
            model_used: "llama3.1".into(),
        }
    }

    #[test]
    fn job_lifecycle_transitions() {
        let mut job = JobRecord::new();
        assert_eq!(job.status, JobStatus::Pending);
        assert!(job.completed_at.is_none());

        job.mark_processing();
        assert_eq!(job.status, JobStatus::Processing);

        job.mark_completed(&result());
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.tokens_used, Some(1000));
        assert_eq!(job.model_used.as_deref(), Some("llama3.1"));
        assert!(job.completed_at.is_some());
    }

    #[test]
    fn failed_jobs_carry_the_error_message() {
        let mut job = JobRecord::new();
        job.mark_failed(&SynthesisError::DocumentNotFound("doc-7".into()));
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.error_message.as_deref().unwrap().contains("doc-7"));
    }

    #[test]
    fn status_serializes_lowercase() {
        let json = serde_json::to_string(&JobStatus::Processing).unwrap();
        assert_eq!(json, "\"processing\"");
    }

    #[test]
    fn result_record_mirrors_sections() {
        let record = ResultRecord::from_result("job-1", &result());
        assert_eq!(record.summary_id, "sum_job-1");
        assert_eq!(record.sections.len(), 1);
        assert_eq!(record.sections[0].order, 0);
        assert_eq!(record.sections[0].evidence_ids, vec!["doc-1"]);
    }
}
