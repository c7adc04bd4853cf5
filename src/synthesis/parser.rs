//! Extraction of structured sections from model responses.
//!
//! The parser pattern-matches the structure the prompts request (titled
//! sections, key-point bullets, `Sources:` lines) rather than assuming
//! machine-perfect output. A response with no recognizable sections degrades
//! to a single "Summary" section holding the raw text instead of failing the
//! run; evidence ids the request never supplied are dropped as hallucinations.

use std::collections::BTreeSet;

use super::types::{Chunk, PartialSummary, SummarySection};

/// Outcome of parsing a final model response.
#[derive(Debug)]
pub(crate) struct ParsedOutput {
    /// Sections in response order.
    pub sections: Vec<SummarySection>,
    /// Set when the fallback single-section path was taken.
    pub degraded: bool,
}

/// Parse a final (reduce or single-shot) response into sections.
///
/// `allowed_ids` is the request's document id set; evidence outside it is
/// silently discarded. Zero parsed sections produce the degraded fallback:
/// one section titled "Summary" with the raw text and every allowed id as
/// evidence.
pub(crate) fn parse_structured_response(response: &str, allowed_ids: &[String]) -> ParsedOutput {
    let mut sections: Vec<SummarySection> = Vec::new();
    let mut current: Option<SectionDraft> = None;

    for raw_line in response.lines() {
        let line = raw_line.trim();
        if let Some(title) = heading(line) {
            if let Some(draft) = current.take() {
                push_section(&mut sections, draft, allowed_ids);
            }
            current = Some(SectionDraft::new(title));
            continue;
        }

        let Some(draft) = current.as_mut() else {
            // Preamble before the first heading is ignored.
            continue;
        };

        let plain = line.trim_matches('*').trim();
        if plain.eq_ignore_ascii_case("key points:") || plain.eq_ignore_ascii_case("key points") {
            draft.in_key_points = true;
            continue;
        }
        if let Some(rest) = strip_prefix_ci(plain, "sources:") {
            draft.evidence.extend(split_ids(rest));
            draft.in_key_points = false;
            continue;
        }
        if draft.in_key_points {
            if let Some(point) = bullet(line) {
                draft.key_points.push(point.to_string());
                continue;
            }
            if line.is_empty() {
                draft.in_key_points = false;
                continue;
            }
        }
        if !line.is_empty() {
            if !draft.body.is_empty() {
                draft.body.push(' ');
            }
            draft.body.push_str(line);
        }
    }
    if let Some(draft) = current.take() {
        push_section(&mut sections, draft, allowed_ids);
    }

    if sections.is_empty() {
        tracing::warn!("Model response had no recognizable sections; using degraded fallback");
        return ParsedOutput {
            sections: vec![SummarySection {
                title: "Summary".to_string(),
                body: response.trim().to_string(),
                position: 0,
                key_points: Vec::new(),
                evidence_ids: allowed_ids.to_vec(),
            }],
            degraded: true,
        };
    }

    ParsedOutput {
        sections,
        degraded: false,
    }
}

struct SectionDraft {
    title: String,
    body: String,
    key_points: Vec<String>,
    evidence: Vec<String>,
    in_key_points: bool,
}

impl SectionDraft {
    fn new(title: &str) -> Self {
        Self {
            title: title.to_string(),
            body: String::new(),
            key_points: Vec::new(),
            evidence: Vec::new(),
            in_key_points: false,
        }
    }
}

fn push_section(sections: &mut Vec<SummarySection>, draft: SectionDraft, allowed_ids: &[String]) {
    let mut seen = BTreeSet::new();
    let evidence_ids: Vec<String> = draft
        .evidence
        .into_iter()
        .filter(|id| allowed_ids.iter().any(|allowed| allowed == id))
        .filter(|id| seen.insert(id.clone()))
        .collect();

    sections.push(SummarySection {
        title: draft.title,
        body: draft.body.trim().to_string(),
        position: sections.len(),
        key_points: draft.key_points,
        evidence_ids,
    });
}

/// Parse a map-phase response into a partial summary for one chunk.
///
/// Evidence comes from a trailing `Sources:` line intersected with the
/// chunk's own document ids; when the model omits the line (or names only
/// unknown ids) the chunk's ids are used, so the partial's evidence is always
/// a subset of the chunk's documents and never empty while text exists.
pub(crate) fn parse_partial(response: &str, chunk: &Chunk) -> PartialSummary {
    let mut body_lines: Vec<&str> = Vec::new();
    let mut stated: Vec<String> = Vec::new();

    for raw_line in response.lines() {
        let plain = raw_line.trim().trim_matches('*').trim();
        if let Some(rest) = strip_prefix_ci(plain, "sources:") {
            stated.extend(split_ids(rest));
        } else {
            body_lines.push(raw_line);
        }
    }

    let text = body_lines.join("\n").trim().to_string();
    let mut evidence_ids: BTreeSet<String> = stated
        .into_iter()
        .filter(|id| chunk.document_ids.contains(id))
        .collect();
    if evidence_ids.is_empty() && !text.is_empty() {
        evidence_ids = chunk.document_ids.clone();
    }

    PartialSummary {
        chunk_index: chunk.index,
        text,
        evidence_ids,
    }
}

fn heading(line: &str) -> Option<&str> {
    let rest = line.strip_prefix("## ").or_else(|| line.strip_prefix("# "))?;
    let title = rest.trim().trim_matches('*').trim();
    (!title.is_empty()).then_some(title)
}

fn bullet(line: &str) -> Option<&str> {
    let point = line
        .strip_prefix("- ")
        .or_else(|| line.strip_prefix("* "))?
        .trim();
    (!point.is_empty()).then_some(point)
}

fn strip_prefix_ci<'a>(line: &'a str, prefix: &str) -> Option<&'a str> {
    if line.len() >= prefix.len()
        && line.is_char_boundary(prefix.len())
        && line[..prefix.len()].eq_ignore_ascii_case(prefix)
    {
        Some(line[prefix.len()..].trim())
    } else {
        None
    }
}

fn split_ids(rest: &str) -> Vec<String> {
    rest.split([',', ';'])
        .map(|id| id.trim().trim_matches(['.', '`', '\'', '"']).to_string())
        .filter(|id| !id.is_empty())
        .collect()
}

/// Render sections into the concatenated full-summary text.
pub(crate) fn render_full_summary(sections: &[SummarySection]) -> String {
    let mut parts = Vec::new();
    for section in sections {
        let mut block = format!("## {}\n\n{}", section.title, section.body);
        if !section.key_points.is_empty() {
            block.push_str("\n\nKey Points:\n");
            for point in &section.key_points {
                block.push_str(&format!("- {point}\n"));
            }
        }
        parts.push(block);
    }
    parts.join("\n\n")
}

/// Truncate text at a word boundary once it exceeds `max_words`.
///
/// No marker is appended; the output stays plain words.
pub(crate) fn truncate_words(text: &str, max_words: usize) -> String {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.len() <= max_words {
        return text.to_string();
    }
    words[..max_words].join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn allowed() -> Vec<String> {
        vec!["doc-1".into(), "doc-2".into(), "doc-3".into()]
    }

    const RESPONSE: &str = "\
## Financial Summary\n\
Costs are tracking 4% over the approved budget.\n\
Key Points:\n\
- Budget variance driven by steel prices\n\
- Contingency remains available\n\
Sources: doc-1, doc-2\n\
\n\
## Cash Flow\n\
Payments to subcontractors are current.\n\
Key Points:\n\
- No overdue invoices\n\
Sources: doc-3, doc-99\n";

    #[test]
    fn parses_sections_key_points_and_evidence() {
        let parsed = parse_structured_response(RESPONSE, &allowed());
        assert!(!parsed.degraded);
        assert_eq!(parsed.sections.len(), 2);

        let first = &parsed.sections[0];
        assert_eq!(first.title, "Financial Summary");
        assert!(first.body.contains("4% over"));
        assert_eq!(first.key_points.len(), 2);
        assert_eq!(first.evidence_ids, vec!["doc-1", "doc-2"]);
        assert_eq!(first.position, 0);
        assert_eq!(parsed.sections[1].position, 1);
    }

    #[test]
    fn hallucinated_evidence_is_dropped_silently() {
        let parsed = parse_structured_response(RESPONSE, &allowed());
        assert_eq!(parsed.sections[1].evidence_ids, vec!["doc-3"]);
    }

    #[test]
    fn unstructured_response_degrades_to_single_summary_section() {
        let parsed = parse_structured_response("Just a plain paragraph.", &allowed());
        assert!(parsed.degraded);
        assert_eq!(parsed.sections.len(), 1);
        assert_eq!(parsed.sections[0].title, "Summary");
        assert_eq!(parsed.sections[0].body, "Just a plain paragraph.");
        assert_eq!(parsed.sections[0].evidence_ids, allowed());
    }

    #[test]
    fn tolerates_bold_markers() {
        let response = "## **Project Status**\nOn track.\n**Key Points:**\n- Milestone met\n**Sources:** doc-1\n";
        let parsed = parse_structured_response(response, &allowed());
        assert!(!parsed.degraded);
        assert_eq!(parsed.sections[0].title, "Project Status");
        assert_eq!(parsed.sections[0].key_points, vec!["Milestone met"]);
        assert_eq!(parsed.sections[0].evidence_ids, vec!["doc-1"]);
    }

    fn chunk() -> Chunk {
        Chunk {
            index: 2,
            text: "content".into(),
            document_ids: ["doc-1".to_string(), "doc-2".to_string()]
                .into_iter()
                .collect(),
        }
    }

    #[test]
    fn partial_extracts_stated_sources_within_chunk() {
        let partial = parse_partial("Condensed text here.\nSources: doc-2, doc-9", &chunk());
        assert_eq!(partial.chunk_index, 2);
        assert_eq!(partial.text, "Condensed text here.");
        assert_eq!(
            partial.evidence_ids.iter().collect::<Vec<_>>(),
            vec!["doc-2"]
        );
    }

    #[test]
    fn partial_falls_back_to_chunk_documents() {
        let partial = parse_partial("Condensed text with no source line.", &chunk());
        assert_eq!(partial.evidence_ids, chunk().document_ids);
    }

    #[test]
    fn render_and_truncate_respect_word_budget() {
        let sections = vec![SummarySection {
            title: "Summary".into(),
            body: "one two three four five six seven eight".into(),
            position: 0,
            key_points: vec!["a point".into()],
            evidence_ids: vec!["doc-1".into()],
        }];
        let rendered = render_full_summary(&sections);
        assert!(rendered.starts_with("## Summary"));
        assert!(rendered.contains("- a point"));

        let truncated = truncate_words(&rendered, 5);
        assert_eq!(truncated, "## Summary one two three");
    }
}
