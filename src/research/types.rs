//! Research data model: topics, findings, traces and verdicts.

use crate::types::Document;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

// ============= Topics =============

/// How widely a researcher should cast its search
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchStrategy {
    /// Exploratory search
    #[default]
    Broad,
    /// Narrow, in-depth search; halves the per-keyword result limit
    Focused,
    /// Side-by-side comparison of approaches
    Comparison,
}

impl SearchStrategy {
    pub fn per_keyword_limit(self, configured: usize) -> usize {
        match self {
            SearchStrategy::Focused => (configured / 2).max(1),
            SearchStrategy::Broad | SearchStrategy::Comparison => configured,
        }
    }
}

/// One unit of delegated investigation.
///
/// Created by the supervisor when it dispatches, consumed by exactly one
/// researcher invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchTopic {
    pub description: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub strategy: SearchStrategy,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub focus_points: Vec<String>,
}

impl ResearchTopic {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            keywords: Vec::new(),
            strategy: SearchStrategy::default(),
            focus_points: Vec::new(),
        }
    }

    pub fn with_keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keywords = keywords.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_strategy(mut self, strategy: SearchStrategy) -> Self {
        self.strategy = strategy;
        self
    }
}

// ============= Findings =============

/// A supporting quotation tied to the document it came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Excerpt {
    pub document_id: String,
    pub text: String,
}

/// Outcome marker carried by every finding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingStatus {
    Found,
    /// Every search came back empty or nothing survived screening
    NoEvidence,
    /// The researcher exceeded its per-invocation deadline
    TimedOut,
}

/// A researcher's compact, citable output for one topic.
///
/// Fields are private so the excerpt-citation invariant holds for every
/// value: each excerpt references a document in `selected`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompressedFinding {
    id: Uuid,
    topic: ResearchTopic,
    status: FindingStatus,
    summary: String,
    key_points: Vec<String>,
    gaps: Option<String>,
    excerpts: Vec<Excerpt>,
    selected: Vec<Document>,
    documents_searched: usize,
    created_at: DateTime<Utc>,
}

impl CompressedFinding {
    /// Build a finding, dropping any excerpt whose document is not selected.
    pub fn new(
        topic: ResearchTopic,
        summary: impl Into<String>,
        excerpts: Vec<Excerpt>,
        selected: Vec<Document>,
        documents_searched: usize,
    ) -> Self {
        let selected_ids: HashSet<&str> = selected.iter().map(|d| d.id.as_str()).collect();
        let (kept, dropped): (Vec<Excerpt>, Vec<Excerpt>) = excerpts
            .into_iter()
            .partition(|e| selected_ids.contains(e.document_id.as_str()));

        if !dropped.is_empty() {
            tracing::warn!(
                topic = %topic.description,
                dropped = dropped.len(),
                "Dropped excerpts citing documents outside the selected set"
            );
        }

        let status = if selected.is_empty() {
            FindingStatus::NoEvidence
        } else {
            FindingStatus::Found
        };

        Self {
            id: Uuid::new_v4(),
            topic,
            status,
            summary: summary.into(),
            key_points: Vec::new(),
            gaps: None,
            excerpts: kept,
            selected,
            documents_searched,
            created_at: Utc::now(),
        }
    }

    /// The explicit "no evidence found" finding.
    pub fn no_evidence(topic: ResearchTopic, documents_searched: usize) -> Self {
        let mut finding = Self::new(
            topic,
            String::new(),
            Vec::new(),
            Vec::new(),
            documents_searched,
        );
        finding.gaps = Some("No evidence found; try different keywords".to_string());
        finding
    }

    /// Marker for a researcher that ran out of time.
    pub fn timed_out(topic: ResearchTopic) -> Self {
        let mut finding = Self::new(topic, String::new(), Vec::new(), Vec::new(), 0);
        finding.status = FindingStatus::TimedOut;
        finding
    }

    pub fn with_key_points(mut self, key_points: Vec<String>) -> Self {
        self.key_points = key_points;
        self
    }

    pub fn with_gaps(mut self, gaps: Option<String>) -> Self {
        self.gaps = gaps.filter(|g| !g.trim().is_empty());
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn topic(&self) -> &ResearchTopic {
        &self.topic
    }

    pub fn status(&self) -> FindingStatus {
        self.status
    }

    pub fn summary(&self) -> &str {
        &self.summary
    }

    pub fn key_points(&self) -> &[String] {
        &self.key_points
    }

    pub fn gaps(&self) -> Option<&str> {
        self.gaps.as_deref()
    }

    pub fn excerpts(&self) -> &[Excerpt] {
        &self.excerpts
    }

    pub fn selected(&self) -> &[Document] {
        &self.selected
    }

    pub fn documents_searched(&self) -> usize {
        self.documents_searched
    }

    pub fn documents_selected(&self) -> usize {
        self.selected.len()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn has_evidence(&self) -> bool {
        self.status == FindingStatus::Found
    }

    /// Check the excerpt-citation invariant.
    pub fn citations_are_consistent(&self) -> bool {
        self.excerpts
            .iter()
            .all(|e| self.selected.iter().any(|d| d.id == e.document_id))
    }
}

// ============= Raw Traces =============

/// A screening judgment recorded for audit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScreeningDecision {
    pub document_id: String,
    pub score: u8,
    pub reason: String,
    pub selected: bool,
}

/// The full material behind one finding.
///
/// Kept in the session's audit store and handed to report synthesis; the
/// supervisor's working context never contains it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawTrace {
    pub finding_id: Uuid,
    pub topic: ResearchTopic,
    pub keywords: Vec<String>,
    pub failed_keywords: Vec<String>,
    pub candidates: Vec<Document>,
    pub screening: Vec<ScreeningDecision>,
    pub used_fallback_screening: bool,
    pub used_fallback_compression: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_response: Option<String>,
}

impl RawTrace {
    pub fn new(topic: ResearchTopic, keywords: Vec<String>) -> Self {
        Self {
            finding_id: Uuid::nil(),
            topic,
            keywords,
            failed_keywords: Vec::new(),
            candidates: Vec::new(),
            screening: Vec::new(),
            used_fallback_screening: false,
            used_fallback_compression: false,
            model_response: None,
        }
    }
}

/// What one researcher invocation hands back to the merge path.
#[derive(Debug, Clone)]
pub struct ResearchOutput {
    pub finding: CompressedFinding,
    pub trace: RawTrace,
}

impl ResearchOutput {
    pub fn new(finding: CompressedFinding, mut trace: RawTrace) -> Self {
        trace.finding_id = finding.id();
        Self { finding, trace }
    }
}

// ============= Verdicts =============

/// Outcome of a round; exactly one terminal verdict closes a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "verdict", content = "detail", rename_all = "snake_case")]
pub enum TerminationVerdict {
    Continue,
    Complete(String),
    RoundBudgetExceeded,
    TimedOut,
    Cancelled,
    Failed(String),
}

impl TerminationVerdict {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TerminationVerdict::Continue)
    }

    /// Human-readable termination reason used to annotate reports
    pub fn reason(&self) -> String {
        match self {
            TerminationVerdict::Continue => "research in progress".to_string(),
            TerminationVerdict::Complete(reason) => reason.clone(),
            TerminationVerdict::RoundBudgetExceeded => "round budget exhausted".to_string(),
            TerminationVerdict::TimedOut => "session timed out".to_string(),
            TerminationVerdict::Cancelled => "cancelled by operator".to_string(),
            TerminationVerdict::Failed(cause) => format!("failed: {}", cause),
        }
    }
}

impl std::fmt::Display for TerminationVerdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TerminationVerdict::Continue => write!(f, "continue"),
            TerminationVerdict::Complete(reason) => write!(f, "complete: {}", reason),
            TerminationVerdict::RoundBudgetExceeded => write!(f, "round_budget_exceeded"),
            TerminationVerdict::TimedOut => write!(f, "timed_out"),
            TerminationVerdict::Cancelled => write!(f, "cancelled"),
            TerminationVerdict::Failed(cause) => write!(f, "failed: {}", cause),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(id: &str) -> Document {
        Document::new(id, format!("Title {}", id), "summary")
    }

    #[test]
    fn test_excerpts_outside_selection_are_dropped() {
        let finding = CompressedFinding::new(
            ResearchTopic::new("A characteristics"),
            "A is fast",
            vec![
                Excerpt {
                    document_id: "d1".into(),
                    text: "A is fast".into(),
                },
                Excerpt {
                    document_id: "stray".into(),
                    text: "unrelated".into(),
                },
            ],
            vec![doc("d1"), doc("d2")],
            30,
        );

        assert_eq!(finding.excerpts().len(), 1);
        assert!(finding.citations_are_consistent());
        assert_eq!(finding.status(), FindingStatus::Found);
    }

    #[test]
    fn test_no_evidence_marker() {
        let finding = CompressedFinding::no_evidence(ResearchTopic::new("nothing"), 0);
        assert_eq!(finding.status(), FindingStatus::NoEvidence);
        assert!(finding.summary().is_empty());
        assert!(finding.selected().is_empty());
        assert!(finding.gaps().is_some());
    }

    #[test]
    fn test_focused_strategy_halves_limit() {
        assert_eq!(SearchStrategy::Focused.per_keyword_limit(15), 7);
        assert_eq!(SearchStrategy::Focused.per_keyword_limit(1), 1);
        assert_eq!(SearchStrategy::Broad.per_keyword_limit(15), 15);
    }

    #[test]
    fn test_research_output_links_trace() {
        let finding = CompressedFinding::no_evidence(ResearchTopic::new("t"), 0);
        let trace = RawTrace::new(ResearchTopic::new("t"), vec![]);
        let output = ResearchOutput::new(finding.clone(), trace);
        assert_eq!(output.trace.finding_id, finding.id());
    }

    #[test]
    fn test_verdict_serialization() {
        let json = serde_json::to_string(&TerminationVerdict::Complete("enough".into())).unwrap();
        assert_eq!(json, r#"{"verdict":"complete","detail":"enough"}"#);

        let json = serde_json::to_string(&TerminationVerdict::TimedOut).unwrap();
        assert_eq!(json, r#"{"verdict":"timed_out"}"#);
        assert!(!TerminationVerdict::Continue.is_terminal());
        assert!(TerminationVerdict::Cancelled.is_terminal());
    }
}
