//! Relevance scoring and filtering of documents ahead of synthesis.
//!
//! Scoring is lexical: documents earn credit for containing the request's
//! focus-area terms and the role profile's keywords. Without focus areas every
//! document scores 1.0 and nothing is filtered.

use crate::documents::{DocumentStore, DocumentStoreError};

use super::types::{DocumentFragment, StakeholderRole, SummaryRequest, SynthesisError};

const BASE_SCORE: f64 = 0.5;
const FOCUS_AREA_WEIGHT: f64 = 0.1;
const ROLE_KEYWORD_WEIGHT: f64 = 0.05;

/// Score one document's text against the focus areas and role keywords.
pub fn score_document(text: &str, focus_areas: &[String], role: StakeholderRole) -> f64 {
    if focus_areas.is_empty() {
        return 1.0;
    }

    let haystack = text.to_lowercase();
    let mut score = BASE_SCORE;

    for area in focus_areas {
        if haystack.contains(&area.to_lowercase()) {
            score += FOCUS_AREA_WEIGHT;
        }
    }
    for keyword in role.profile().keywords {
        if haystack.contains(keyword) {
            score += ROLE_KEYWORD_WEIGHT;
        }
    }

    score.min(1.0)
}

/// Fetch, score, and filter every document referenced by the request.
///
/// Fails fast with [`SynthesisError::DocumentNotFound`] before any model call
/// when an id cannot be resolved. Fragments scoring below `floor` are dropped;
/// if that would leave nothing, the single best fragment is kept. The output
/// is ordered by score descending, stable over the request's document order.
pub async fn gather_fragments(
    store: &dyn DocumentStore,
    request: &SummaryRequest,
    floor: f64,
) -> Result<Vec<DocumentFragment>, SynthesisError> {
    let mut fragments = Vec::with_capacity(request.document_ids().len());
    for document_id in request.document_ids() {
        let text = store.fetch(document_id).await.map_err(|error| match error {
            DocumentStoreError::NotFound(id) => SynthesisError::DocumentNotFound(id),
            DocumentStoreError::Unavailable(message) => SynthesisError::SynthesisFailed(format!(
                "document store unavailable while fetching '{document_id}': {message}"
            )),
        })?;
        let relevance = score_document(&text, request.focus_areas(), request.role());
        fragments.push(DocumentFragment {
            document_id: document_id.clone(),
            text,
            relevance,
        });
    }

    fragments.sort_by(|a, b| {
        b.relevance
            .partial_cmp(&a.relevance)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let surviving: Vec<DocumentFragment> = fragments
        .iter()
        .filter(|fragment| fragment.relevance >= floor)
        .cloned()
        .collect();

    if surviving.is_empty() {
        // Highest-scoring fragment is first after the sort.
        let best = fragments
            .into_iter()
            .next()
            .ok_or_else(|| SynthesisError::InvalidRequest("no documents to score".into()))?;
        tracing::warn!(
            document_id = %best.document_id,
            relevance = best.relevance,
            floor,
            "All documents below relevance floor; keeping best fragment"
        );
        return Ok(vec![best]);
    }

    let dropped = request.document_ids().len() - surviving.len();
    if dropped > 0 {
        tracing::debug!(dropped, floor, "Filtered low-relevance documents");
    }
    Ok(surviving)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::documents::InMemoryDocumentStore;
    use crate::synthesis::types::StakeholderRole;

    fn request(focus: Vec<String>) -> SummaryRequest {
        SummaryRequest::new(
            StakeholderRole::Finance,
            vec!["doc-1".into(), "doc-2".into()],
            focus,
            None,
        )
        .unwrap()
    }

    #[test]
    fn no_focus_areas_scores_everything_full() {
        let score = score_document("anything at all", &[], StakeholderRole::Finance);
        assert_eq!(score, 1.0);
    }

    #[test]
    fn focus_hits_raise_the_score() {
        let focus = vec!["budget".to_string(), "schedule".to_string()];
        let with_hit = score_document("Budget overrun reported.", &focus, StakeholderRole::Legal);
        let without = score_document("Nothing of note.", &focus, StakeholderRole::Legal);
        assert!(with_hit > without);
        assert_eq!(without, BASE_SCORE);
    }

    #[test]
    fn role_keywords_contribute_and_score_is_clamped() {
        let focus: Vec<String> = (0..10).map(|i| format!("term{i}")).collect();
        let text = focus.join(" ") + " cost budget payment forecast";
        let score = score_document(&text, &focus, StakeholderRole::Finance);
        assert_eq!(score, 1.0);
    }

    #[tokio::test]
    async fn missing_document_fails_fast() {
        let mut store = InMemoryDocumentStore::new();
        store.insert("doc-1", "text");
        let error = gather_fragments(&store, &request(Vec::new()), 0.35)
            .await
            .unwrap_err();
        assert!(matches!(error, SynthesisError::DocumentNotFound(id) if id == "doc-2"));
    }

    #[tokio::test]
    async fn fragments_are_ordered_by_score() {
        let mut store = InMemoryDocumentStore::new();
        store.insert("doc-1", "unrelated notes");
        store.insert("doc-2", "budget variance and cost forecast");
        let fragments = gather_fragments(
            &store,
            &request(vec!["budget".into()]),
            0.0,
        )
        .await
        .unwrap();
        assert_eq!(fragments[0].document_id, "doc-2");
        assert!(fragments[0].relevance > fragments[1].relevance);
    }

    #[tokio::test]
    async fn floor_never_leaves_zero_fragments() {
        let mut store = InMemoryDocumentStore::new();
        store.insert("doc-1", "unrelated");
        store.insert("doc-2", "also unrelated");
        let fragments = gather_fragments(
            &store,
            &request(vec!["asbestos".into()]),
            0.9,
        )
        .await
        .unwrap();
        assert_eq!(fragments.len(), 1);
    }
}
