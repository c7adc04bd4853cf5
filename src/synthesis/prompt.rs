//! Deterministic prompt construction for the map and reduce phases.
//!
//! Each stakeholder role maps to a static profile (emphasis themes, canonical
//! section titles, relevance keywords). Prompts are rendered by substituting
//! role, focus areas, and length into fixed templates; the same inputs always
//! produce the same text.

use std::collections::BTreeSet;
use std::fmt::Write as _;

use super::types::{Chunk, PartialSummary, StakeholderRole, SummaryRequest};

/// Static per-role prompt configuration.
#[derive(Debug)]
pub struct RoleProfile {
    /// Themes the summary should emphasize for this audience.
    pub emphasis: &'static str,
    /// Canonical section titles the model is steered toward.
    pub sections: [&'static str; 4],
    /// Keywords used by the relevance scorer for this role.
    pub keywords: [&'static str; 4],
}

impl StakeholderRole {
    /// Look up the static profile for this role.
    pub fn profile(&self) -> &'static RoleProfile {
        match self {
            Self::Developer => &RoleProfile {
                emphasis: "technical specifications, building codes, construction methods, and quality standards",
                sections: [
                    "Technical Overview",
                    "Quality Standards",
                    "Compliance Requirements",
                    "Key Risks",
                ],
                keywords: ["technical", "specification", "code", "quality"],
            },
            Self::Contractor => &RoleProfile {
                emphasis: "project scope, timelines, resources, change orders, and deliverables",
                sections: [
                    "Project Scope",
                    "Timeline & Milestones",
                    "Resource Requirements",
                    "Change Management",
                ],
                keywords: ["scope", "timeline", "resource", "deliverable"],
            },
            Self::Architect => &RoleProfile {
                emphasis: "design intent, specifications, building codes, and design changes",
                sections: [
                    "Design Overview",
                    "Specifications",
                    "Code Compliance",
                    "Design Changes",
                ],
                keywords: ["design", "specification", "code", "compliance"],
            },
            Self::Client => &RoleProfile {
                emphasis: "project progress, budget status, timeline, and quality outcomes",
                sections: [
                    "Project Status",
                    "Budget Summary",
                    "Timeline",
                    "Quality Assurance",
                ],
                keywords: ["progress", "budget", "timeline", "quality"],
            },
            Self::ProjectManager => &RoleProfile {
                emphasis: "overall status, risks, issues, resource allocation, and stakeholder coordination",
                sections: [
                    "Executive Summary",
                    "Risk & Issues",
                    "Resource Status",
                    "Key Decisions",
                ],
                keywords: ["status", "risk", "resource", "stakeholder"],
            },
            Self::Legal => &RoleProfile {
                emphasis: "contractual obligations, compliance, claims, disputes, and liability",
                sections: [
                    "Contractual Overview",
                    "Compliance Status",
                    "Claims & Disputes",
                    "Risk Exposure",
                ],
                keywords: ["contract", "compliance", "claim", "dispute"],
            },
            Self::Finance => &RoleProfile {
                emphasis: "costs, budget variance, payment status, and financial forecasts",
                sections: [
                    "Financial Summary",
                    "Budget Variance",
                    "Cash Flow",
                    "Financial Risks",
                ],
                keywords: ["cost", "budget", "payment", "forecast"],
            },
            Self::Executive => &RoleProfile {
                emphasis: "high-level status, strategic risks, financial health, and key decisions needed",
                sections: [
                    "Executive Summary",
                    "Strategic Overview",
                    "Financial Health",
                    "Critical Actions",
                ],
                keywords: ["status", "risk", "financial", "decision"],
            },
        }
    }
}

fn focus_line(request: &SummaryRequest) -> String {
    if request.focus_areas().is_empty() {
        request.role().profile().emphasis.to_string()
    } else {
        request.focus_areas().join(", ")
    }
}

fn system_preamble(request: &SummaryRequest, target_words: usize) -> String {
    let profile = request.role().profile();
    format!(
        "System: You are an expert project analyst generating stakeholder-specific summaries.\n\
         Stakeholder role: {role}\n\
         Primary focus: {emphasis}\n\
         Target length: {target_words} words\n\n",
        role = request.role(),
        emphasis = profile.emphasis,
    )
}

/// Render the map-phase prompt condensing one chunk.
///
/// The model is asked for a plain condensed passage plus a `Sources:` line
/// naming the document ids it drew from.
pub fn build_map_prompt(request: &SummaryRequest, chunk: &Chunk, target_words: usize) -> String {
    let mut prompt = system_preamble(request, target_words);
    let _ = write!(
        prompt,
        "Condense the following excerpt of the project documents into at most {target_words} words, \
         keeping only material relevant to: {focus}.\n\
         End your answer with a line of the form 'Sources: <comma-separated document ids>' listing \
         the document ids your condensed text draws on.\n\n\
         Excerpt:\n{content}\n",
        focus = focus_line(request),
        content = chunk.text,
    );
    prompt
}

fn structured_instructions(request: &SummaryRequest, target_words: usize) -> String {
    let profile = request.role().profile();
    format!(
        "Produce a structured summary of at most {target_words} words with the following sections:\n\
         {sections}\n\n\
         Format each section as:\n\
         ## <section title>\n\
         <section narrative>\n\
         Key Points:\n\
         - <2 to 4 short points>\n\
         Sources: <comma-separated document ids supporting the section>\n\n\
         Focus specifically on: {focus}.\n",
        sections = profile.sections.join(", "),
        focus = focus_line(request),
    )
}

/// Render the single-call prompt used when the input fits in one chunk.
pub fn build_final_prompt(request: &SummaryRequest, content: &str, target_words: usize) -> String {
    let mut prompt = system_preamble(request, target_words);
    prompt.push_str(&structured_instructions(request, target_words));
    let _ = write!(prompt, "\nDocuments:\n{content}\n");
    prompt
}

/// Render the reduce-phase prompt merging partial summaries, in chunk order.
pub fn build_reduce_prompt(
    request: &SummaryRequest,
    partials: &[PartialSummary],
    target_words: usize,
) -> String {
    let mut prompt = system_preamble(request, target_words);
    prompt.push_str(&structured_instructions(request, target_words));
    prompt.push_str(
        "\nMerge the following partial summaries into one coherent summary, preserving which \
         source documents underlie each point.\n\n",
    );
    for partial in partials {
        if partial.text.trim().is_empty() {
            continue;
        }
        let sources = format_id_set(&partial.evidence_ids);
        let _ = write!(
            prompt,
            "Partial summary {index} (sources: {sources}):\n{text}\n\n",
            index = partial.chunk_index + 1,
            text = partial.text.trim(),
        );
    }
    prompt
}

fn format_id_set(ids: &BTreeSet<String>) -> String {
    if ids.is_empty() {
        "unspecified".to_string()
    } else {
        ids.iter().cloned().collect::<Vec<_>>().join(", ")
    }
}
