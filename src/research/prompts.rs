//! Prompt builders for supervisor, researcher and report calls.

use crate::research::state::{CompressedView, SessionSnapshot};
use crate::research::types::{FindingStatus, ResearchTopic, SearchStrategy};
use crate::types::Document;
use std::fmt::Write;

/// Characters of document text shown per candidate during screening
const SCREEN_TEXT_CHARS: usize = 400;
/// Characters of document text shown per document during compression
const COMPRESS_TEXT_CHARS: usize = 3000;

pub const SUPERVISOR_SYSTEM: &str = "You are the lead of a literature research session. \
You never search yourself: you decide what to investigate next and delegate each topic to \
a researcher who returns compressed findings.\n\
On every turn invoke exactly one action:\n\
- think: reflect on what is known and what is missing\n\
- conduct_research: dispatch one topic per call (you may call it several times in one turn)\n\
- research_complete: finish when the findings answer the question\n\
Prefer specific, searchable topics with academic keywords. Do not repeat topics that \
already returned findings.";

pub const SUPERVISOR_STRICT_SUFFIX: &str = "\n\nYour previous reply could not be parsed. \
Reply ONLY by invoking one of the declared actions. If you cannot invoke actions, reply \
with a single JSON object of the form \
{\"action\": \"<think|conduct_research|research_complete>\", \"arguments\": {...}} \
and nothing else.";

pub const RESEARCHER_SYSTEM: &str = "You are a research assistant working on a single \
topic. Judge documents strictly on their relevance to the topic and only report what the \
documents actually say.";

pub const REPORT_SYSTEM: &str = "You write research reports in Markdown. Answer the \
question using only the findings provided, cite sources with their bracketed numbers like \
[3], and say plainly where evidence is missing. Do not write a reference list.";

pub fn supervisor_prompt(view: &CompressedView, max_topics: usize, allow_reflect: bool) -> String {
    let mut prompt = String::new();
    let _ = writeln!(prompt, "## Research question\n{}\n", view.question);
    let _ = writeln!(
        prompt,
        "## Budget\nRounds completed: {}. Rounds remaining: {}. Time remaining: {}s.\n",
        view.rounds_completed,
        view.remaining_rounds,
        view.remaining_time.as_secs()
    );

    if view.findings.is_empty() {
        prompt.push_str("## Findings so far\nNone yet.\n\n");
    } else {
        prompt.push_str("## Findings so far\n");
        for finding in &view.findings {
            let _ = writeln!(
                prompt,
                "### Round {}: {}",
                finding.round, finding.topic
            );
            match finding.status {
                FindingStatus::Found => {
                    let _ = writeln!(
                        prompt,
                        "{} ({} documents)",
                        finding.summary, finding.documents_selected
                    );
                    for point in &finding.key_points {
                        let _ = writeln!(prompt, "- {}", point);
                    }
                }
                FindingStatus::NoEvidence => prompt.push_str("No evidence found.\n"),
                FindingStatus::TimedOut => prompt.push_str("Researcher timed out.\n"),
            }
            if let Some(gaps) = &finding.gaps {
                let _ = writeln!(prompt, "Gaps: {}", gaps);
            }
            prompt.push('\n');
        }
    }

    if !view.reflections.is_empty() {
        prompt.push_str("## Your earlier reflections\n");
        for reflection in view.reflections.iter().rev().take(3).rev() {
            let _ = writeln!(prompt, "- {}", reflection);
        }
        prompt.push('\n');
    }

    if let Some(hypothesis) = &view.hypothesis {
        let _ = writeln!(prompt, "## Working hypothesis\n{}\n", hypothesis);
    }

    if view.saturation_hint {
        prompt.push_str(
            "Note: the last rounds added almost no new documents; evidence appears saturated.\n\n",
        );
    }

    let _ = write!(
        prompt,
        "Decide the next step. Dispatch at most {} topics this round.",
        max_topics
    );
    if !allow_reflect {
        prompt.push_str(" Reflection is exhausted for this round: dispatch or complete.");
    }
    prompt
}

pub fn screening_prompt(topic: &ResearchTopic, candidates: &[Document]) -> String {
    let mut prompt = topic_header(topic);
    prompt.push_str(
        "\nScore each candidate 1-5 for relevance (5 = directly addresses the topic, \
         1 = unrelated) and invoke screen_documents with every evaluation.\n\n## Candidates\n",
    );
    for (i, doc) in candidates.iter().enumerate() {
        let _ = writeln!(prompt, "[{}] {}", i + 1, doc.title);
        let mut meta = Vec::new();
        if let Some(year) = doc.citation.year {
            meta.push(year.to_string());
        }
        if let Some(count) = doc.citation.citation_count {
            meta.push(format!("{} citations", count));
        }
        if !meta.is_empty() {
            let _ = writeln!(prompt, "    ({})", meta.join(", "));
        }
        if !doc.summary.is_empty() {
            let _ = writeln!(prompt, "    {}", truncate(&doc.summary, SCREEN_TEXT_CHARS));
        }
    }
    prompt
}

/// `texts` pairs each selected document with the text Step C may use.
pub fn compression_prompt(topic: &ResearchTopic, texts: &[(&Document, String)]) -> String {
    let mut prompt = topic_header(topic);
    prompt.push_str(
        "\nUsing ONLY the documents below, invoke summarize_findings with a 150-300 word \
         summary, supporting excerpts tagged with their document number, 3-5 key points and \
         any gaps.\n\n## Documents\n",
    );
    for (i, (doc, text)) in texts.iter().enumerate() {
        let _ = writeln!(prompt, "[{}] {}", i + 1, doc.title);
        let _ = writeln!(prompt, "{}\n", truncate(text, COMPRESS_TEXT_CHARS));
    }
    prompt
}

pub fn report_prompt(snapshot: &SessionSnapshot, termination: &str) -> String {
    let mut prompt = String::new();
    let _ = writeln!(prompt, "## Question\n{}\n", snapshot.question);
    let _ = writeln!(prompt, "Research ended: {}\n", termination);

    if let Some(hypothesis) = &snapshot.hypothesis {
        let _ = writeln!(prompt, "## Working hypothesis\n{}\n", hypothesis);
    }

    prompt.push_str("## Findings\n");
    for finding in snapshot.findings().filter(|f| f.has_evidence()) {
        let _ = writeln!(prompt, "### {}\n{}", finding.topic().description, finding.summary());
        for point in finding.key_points() {
            let _ = writeln!(prompt, "- {}", point);
        }
        for excerpt in finding.excerpts() {
            if let Some(number) = snapshot.citation_number(&excerpt.document_id) {
                let _ = writeln!(prompt, "> [{}] {}", number, excerpt.text);
            }
        }
        prompt.push('\n');
    }

    prompt.push_str("## Sources\n");
    for entry in &snapshot.documents {
        let _ = writeln!(prompt, "[{}] {}", entry.citation_number, entry.document.title);
    }
    prompt.push_str("\nWrite the report with an introduction, a section per theme and a conclusion.");
    prompt
}

fn topic_header(topic: &ResearchTopic) -> String {
    let mut header = format!("## Topic\n{}\n", topic.description);
    if topic.strategy == SearchStrategy::Comparison {
        header.push_str("This is a comparison: prefer documents that contrast approaches.\n");
    }
    if !topic.focus_points.is_empty() {
        let _ = writeln!(header, "Focus on: {}", topic.focus_points.join("; "));
    }
    header
}

/// Cut `text` to at most `max` characters on a char boundary.
pub(crate) fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::research::state::SessionState;
    use std::time::Duration;

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("héllo", 2), "hé");
        assert_eq!(truncate("short", 100), "short");
    }

    #[test]
    fn test_supervisor_prompt_mentions_budget_and_cap() {
        let state = SessionState::new("compare method A and method B");
        let view = state.compressed_view(10, Duration::from_secs(250));
        let prompt = supervisor_prompt(&view, 3, false);

        assert!(prompt.contains("compare method A and method B"));
        assert!(prompt.contains("Rounds remaining: 10"));
        assert!(prompt.contains("at most 3 topics"));
        assert!(prompt.contains("Reflection is exhausted"));
    }

    #[test]
    fn test_screening_prompt_numbers_candidates() {
        let topic = ResearchTopic::new("A characteristics");
        let docs = vec![
            Document::new("d1", "First paper", "about A"),
            Document::new("d2", "Second paper", "about B"),
        ];
        let prompt = screening_prompt(&topic, &docs);
        assert!(prompt.contains("[1] First paper"));
        assert!(prompt.contains("[2] Second paper"));
    }
}
