//! Report Synthesis
//!
//! Turns the full session snapshot into a markdown report. The language
//! model writes the prose when one is configured; the reference list and
//! the termination note are always generated here from the document union,
//! so citation numbers match the session's stable numbering.
//!
//! - [`ReportSynthesizer`] - Collaborator trait used by the orchestrator
//! - [`MarkdownReportSynthesizer`] - Default implementation
//! - [`ResearchReport`] - What a finished session hands back

use crate::llm::LLMClient;
use crate::research::prompts::{self, REPORT_SYSTEM};
use crate::research::state::{DocumentEntry, SessionSnapshot};
use crate::research::types::{FindingStatus, TerminationVerdict};
use crate::types::Result;
use async_trait::async_trait;
use serde::Serialize;
use std::fmt::Write;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

pub const NO_RESEARCH_FOUND: &str = "No relevant research found";

/// Final output of a research session
#[derive(Debug, Clone, Serialize)]
pub struct ResearchReport {
    pub session_id: Uuid,
    pub question: String,
    pub verdict: TerminationVerdict,
    pub markdown: String,
    pub metadata: ReportMetadata,
    pub snapshot: SessionSnapshot,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportMetadata {
    pub elapsed: Duration,
    pub rounds: u32,
    pub reflections: usize,
    pub documents_searched: usize,
    pub documents_selected: usize,
}

impl ReportMetadata {
    pub fn from_snapshot(snapshot: &SessionSnapshot, elapsed: Duration) -> Self {
        Self {
            elapsed,
            rounds: snapshot.rounds.len() as u32,
            reflections: snapshot.reflection_count(),
            documents_searched: snapshot.documents_searched(),
            documents_selected: snapshot.documents.len(),
        }
    }
}

/// Downstream collaborator receiving the full session at termination
#[async_trait]
pub trait ReportSynthesizer: Send + Sync {
    async fn synthesize(
        &self,
        snapshot: &SessionSnapshot,
        verdict: &TerminationVerdict,
    ) -> Result<String>;
}

/// Markdown report writer with an optional language model for prose.
#[derive(Clone, Default)]
pub struct MarkdownReportSynthesizer {
    llm: Option<Arc<dyn LLMClient>>,
}

impl MarkdownReportSynthesizer {
    pub fn new(llm: Arc<dyn LLMClient>) -> Self {
        Self { llm: Some(llm) }
    }

    /// Synthesizer that never calls a model
    pub fn deterministic() -> Self {
        Self { llm: None }
    }
}

#[async_trait]
impl ReportSynthesizer for MarkdownReportSynthesizer {
    async fn synthesize(
        &self,
        snapshot: &SessionSnapshot,
        verdict: &TerminationVerdict,
    ) -> Result<String> {
        if !snapshot.has_evidence() {
            return Ok(empty_report(snapshot, verdict));
        }

        let Some(llm) = &self.llm else {
            return Ok(fallback_report(snapshot, verdict));
        };

        let prompt = prompts::report_prompt(snapshot, &verdict.reason());
        match llm.generate_with_system(REPORT_SYSTEM, &prompt).await {
            Ok(body) if !body.trim().is_empty() => {
                let mut report = format!("# {}\n\n{}\n", snapshot.question, body.trim());
                append_references(&mut report, &snapshot.documents);
                append_termination(&mut report, verdict);
                Ok(report)
            }
            Ok(_) => {
                tracing::warn!("Report model returned no text, using deterministic report");
                Ok(fallback_report(snapshot, verdict))
            }
            Err(e) => {
                tracing::warn!("Report generation failed, using deterministic report: {}", e);
                Ok(fallback_report(snapshot, verdict))
            }
        }
    }
}

/// Deterministic report built straight from the findings.
pub fn fallback_report(snapshot: &SessionSnapshot, verdict: &TerminationVerdict) -> String {
    if !snapshot.has_evidence() {
        return empty_report(snapshot, verdict);
    }

    let mut report = format!("# {}\n\n## Findings\n", snapshot.question);
    for finding in snapshot.findings() {
        let _ = writeln!(report, "\n### {}\n", finding.topic().description);
        match finding.status() {
            FindingStatus::Found => {
                let _ = writeln!(report, "{}", finding.summary());
                if !finding.key_points().is_empty() {
                    report.push('\n');
                    for point in finding.key_points() {
                        let _ = writeln!(report, "- {}", point);
                    }
                }
                let citations: Vec<String> = finding
                    .selected()
                    .iter()
                    .filter_map(|d| snapshot.citation_number(&d.id))
                    .map(|n| format!("[{}]", n))
                    .collect();
                if !citations.is_empty() {
                    let _ = writeln!(report, "\nSources: {}", citations.join(" "));
                }
            }
            FindingStatus::NoEvidence => report.push_str("No evidence found for this topic.\n"),
            FindingStatus::TimedOut => report.push_str("Research on this topic timed out.\n"),
        }
        if let Some(gaps) = finding.gaps() {
            let _ = writeln!(report, "\n_Gaps: {}_", gaps);
        }
    }

    if let Some(hypothesis) = &snapshot.hypothesis {
        let _ = writeln!(report, "\n## Conclusion\n\n{}", hypothesis);
    }

    append_references(&mut report, &snapshot.documents);
    append_termination(&mut report, verdict);
    report
}

fn empty_report(snapshot: &SessionSnapshot, verdict: &TerminationVerdict) -> String {
    let mut report = format!(
        "# {}\n\n{} for this question. Try rephrasing it or widening its scope.\n",
        snapshot.question, NO_RESEARCH_FOUND
    );
    append_termination(&mut report, verdict);
    report
}

fn append_references(report: &mut String, documents: &[DocumentEntry]) {
    if documents.is_empty() {
        return;
    }
    report.push_str("\n## References\n\n");
    for entry in documents {
        let citation = &entry.document.citation;
        let _ = write!(
            report,
            "[{}] {}",
            entry.citation_number,
            citation.author_line()
        );
        if let Some(year) = citation.year {
            let _ = write!(report, " ({})", year);
        }
        let _ = write!(report, ". {}.", entry.document.title);
        if let Some(venue) = &citation.venue {
            let _ = write!(report, " {}.", venue);
        }
        if let Some(url) = &citation.url {
            let _ = write!(report, " {}", url);
        }
        report.push('\n');
    }
}

fn append_termination(report: &mut String, verdict: &TerminationVerdict) {
    let _ = write!(report, "\n---\n_Research ended: {}._\n", verdict.reason());
}
