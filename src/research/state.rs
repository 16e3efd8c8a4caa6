//! Session state and merge discipline
//!
//! [`SessionState`] is the single source of truth for one research session.
//! It is owned through a [`SessionStore`] handle shared by the orchestrator
//! and the supervisor; every mutation happens inside a short synchronous
//! critical section, so researchers running in parallel never observe each
//! other and the lock is never held across an `.await`.
//!
//! Two update semantics exist:
//! - append fields: round records, the document union and raw traces only
//!   ever grow;
//! - override fields: the working hypothesis is replaced outright by
//!   [`StateUpdate::OverrideHypothesis`].

use crate::research::types::{
    CompressedFinding, Excerpt, FindingStatus, RawTrace, ResearchOutput, ResearchTopic,
};
use crate::types::{AppError, Document, Result};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Rounds that must pass before evidence can be called saturated.
const SATURATION_MIN_ROUNDS: usize = 3;
/// A dispatch round adding at most this many documents counts as stale.
const SATURATION_MAX_NEW_DOCUMENTS: usize = 1;

/// What closed a round record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundKind {
    Dispatch,
    Reflection,
    Completion,
}

/// A sealed, immutable round of the session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundRecord {
    pub number: u32,
    pub kind: RoundKind,
    pub reflections: Vec<String>,
    pub topics: Vec<ResearchTopic>,
    pub findings: Vec<CompressedFinding>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_reason: Option<String>,
    /// Sealed early by cancellation or the session deadline
    #[serde(default)]
    pub interrupted: bool,
    /// Documents this round added to the union
    pub new_documents: usize,
    pub sealed_at: DateTime<Utc>,
}

/// A document in the session-wide union with its stable citation number.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentEntry {
    /// 1-based, assigned on first insertion and never changed
    pub citation_number: usize,
    pub document: Document,
    pub excerpts: Vec<Excerpt>,
    pub first_seen_round: u32,
}

/// Tagged state update applied outside the finding merge path.
#[derive(Debug, Clone, PartialEq)]
pub enum StateUpdate {
    /// Append reflection text to the open round record
    AppendReflection(String),
    /// Replace the working hypothesis; `None` resets it
    OverrideHypothesis(Option<String>),
}

/// Result of merging one finding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    Merged,
    /// Same finding id delivered twice; nothing changed
    Duplicate,
}

/// The round currently being built.
#[derive(Debug, Clone)]
struct OpenRound {
    number: u32,
    reflections: Vec<String>,
    topics: Vec<ResearchTopic>,
    /// One slot per dispatched topic, in dispatch order
    slots: Vec<Option<ResearchOutput>>,
}

impl OpenRound {
    fn is_empty(&self) -> bool {
        self.reflections.is_empty() && self.topics.is_empty()
    }
}

/// All state for one research session.
#[derive(Debug)]
pub struct SessionState {
    session_id: Uuid,
    question: String,
    started_at: DateTime<Utc>,
    rounds: Vec<RoundRecord>,
    open: Option<OpenRound>,
    documents: Vec<DocumentEntry>,
    document_index: HashMap<String, usize>,
    traces: Vec<RawTrace>,
    hypothesis: Option<String>,
    merged_findings: HashSet<Uuid>,
}

impl SessionState {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            question: question.into(),
            started_at: Utc::now(),
            rounds: Vec::new(),
            open: None,
            documents: Vec::new(),
            document_index: HashMap::new(),
            traces: Vec::new(),
            hypothesis: None,
            merged_findings: HashSet::new(),
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn question(&self) -> &str {
        &self.question
    }

    /// Number of sealed round records
    pub fn rounds_completed(&self) -> u32 {
        self.rounds.len() as u32
    }

    pub fn rounds(&self) -> &[RoundRecord] {
        &self.rounds
    }

    pub fn documents(&self) -> &[DocumentEntry] {
        &self.documents
    }

    pub fn traces(&self) -> &[RawTrace] {
        &self.traces
    }

    pub fn hypothesis(&self) -> Option<&str> {
        self.hypothesis.as_deref()
    }

    pub fn has_open_round(&self) -> bool {
        self.open.is_some()
    }

    /// Number of the open round, if any
    pub fn open_round_number(&self) -> Option<u32> {
        self.open.as_ref().map(|r| r.number)
    }

    /// Reflections attached to the open round so far
    pub fn open_reflection_count(&self) -> usize {
        self.open.as_ref().map_or(0, |r| r.reflections.len())
    }

    /// Open the next round record.
    pub fn open_round(&mut self) -> Result<u32> {
        if self.open.is_some() {
            return Err(AppError::StateCorruption(
                "Cannot open a round while another is open".to_string(),
            ));
        }
        let number = self.rounds_completed() + 1;
        self.open = Some(OpenRound {
            number,
            reflections: Vec::new(),
            topics: Vec::new(),
            slots: Vec::new(),
        });
        Ok(number)
    }

    pub fn apply(&mut self, update: StateUpdate) -> Result<()> {
        match update {
            StateUpdate::AppendReflection(text) => {
                self.open_mut()?.reflections.push(text);
            }
            StateUpdate::OverrideHypothesis(hypothesis) => {
                self.hypothesis = hypothesis.filter(|h| !h.trim().is_empty());
            }
        }
        Ok(())
    }

    /// Record the topics dispatched in the open round.
    pub fn begin_dispatch(&mut self, topics: Vec<ResearchTopic>) -> Result<()> {
        let open = self.open_mut()?;
        if !open.topics.is_empty() {
            return Err(AppError::StateCorruption(format!(
                "Round {} already dispatched",
                open.number
            )));
        }
        open.slots = vec![None; topics.len()];
        open.topics = topics;
        Ok(())
    }

    /// Merge one researcher's output into its topic slot.
    ///
    /// Idempotent per finding id. Documents join the session union only
    /// when the round seals, folded in dispatch order.
    pub fn merge_finding(&mut self, slot: usize, output: ResearchOutput) -> Result<MergeOutcome> {
        let finding_id = output.finding.id();
        if self.merged_findings.contains(&finding_id) {
            tracing::debug!(%finding_id, "Ignoring duplicate finding delivery");
            return Ok(MergeOutcome::Duplicate);
        }

        let open = self.open_mut()?;
        let number = open.number;
        let target = open.slots.get_mut(slot).ok_or_else(|| {
            AppError::StateCorruption(format!("Round {} has no topic slot {}", number, slot))
        })?;
        if target.is_some() {
            return Err(AppError::StateCorruption(format!(
                "Topic slot {} of round {} merged twice",
                slot, number
            )));
        }
        *target = Some(output);
        self.merged_findings.insert(finding_id);
        Ok(MergeOutcome::Merged)
    }

    /// Whether every topic dispatched in the open round has merged
    pub fn dispatch_complete(&self) -> bool {
        self.open
            .as_ref()
            .is_some_and(|r| !r.topics.is_empty() && r.slots.iter().all(Option::is_some))
    }

    /// Seal a dispatch round; every topic must have merged.
    pub fn seal_dispatch(&mut self) -> Result<&RoundRecord> {
        if !self.dispatch_complete() {
            return Err(AppError::StateCorruption(
                "Dispatch round sealed before all topics merged".to_string(),
            ));
        }
        self.seal_open(RoundKind::Dispatch, None, false)
    }

    /// Seal a reflection-only round.
    pub fn seal_reflection(&mut self) -> Result<&RoundRecord> {
        if self.open.as_ref().is_some_and(|r| !r.topics.is_empty()) {
            return Err(AppError::StateCorruption(
                "Reflection round cannot carry dispatched topics".to_string(),
            ));
        }
        self.seal_open(RoundKind::Reflection, None, false)
    }

    /// Seal the open round as the completion record.
    pub fn seal_completion(&mut self, reason: impl Into<String>) -> Result<&RoundRecord> {
        if self.open.as_ref().is_some_and(|r| !r.topics.is_empty()) {
            return Err(AppError::StateCorruption(
                "Completion sealed over an in-flight dispatch".to_string(),
            ));
        }
        self.seal_open(RoundKind::Completion, Some(reason.into()), false)
    }

    /// Seal whatever the open round holds after cancellation or deadline.
    ///
    /// Missing topic slots are left out. A round with neither reflections
    /// nor topics is discarded instead of sealed.
    pub fn seal_interrupted(&mut self) -> Result<Option<&RoundRecord>> {
        match &self.open {
            None => Ok(None),
            Some(open) if open.is_empty() => {
                self.open = None;
                Ok(None)
            }
            Some(open) => {
                let kind = if open.topics.is_empty() {
                    RoundKind::Reflection
                } else {
                    RoundKind::Dispatch
                };
                self.seal_open(kind, None, true).map(Some)
            }
        }
    }

    fn seal_open(
        &mut self,
        kind: RoundKind,
        completion_reason: Option<String>,
        interrupted: bool,
    ) -> Result<&RoundRecord> {
        let open = self
            .open
            .take()
            .ok_or_else(|| AppError::StateCorruption("No open round to seal".to_string()))?;

        let mut findings = Vec::new();
        let mut new_documents = 0;
        for output in open.slots.into_iter().flatten() {
            new_documents += self.fold_documents(&output.finding, open.number);
            self.traces.push(output.trace);
            findings.push(output.finding);
        }

        self.rounds.push(RoundRecord {
            number: open.number,
            kind,
            reflections: open.reflections,
            topics: open.topics,
            findings,
            completion_reason,
            interrupted,
            new_documents,
            sealed_at: Utc::now(),
        });

        self.rounds
            .last()
            .ok_or_else(|| AppError::StateCorruption("Sealed round vanished".to_string()))
    }

    /// First-writer-wins metadata, concatenated excerpts. Returns how many
    /// documents were new to the union.
    fn fold_documents(&mut self, finding: &CompressedFinding, round: u32) -> usize {
        let mut added = 0;
        for document in finding.selected() {
            let excerpts = finding
                .excerpts()
                .iter()
                .filter(|e| e.document_id == document.id)
                .cloned();

            match self.document_index.get(&document.id) {
                Some(&position) => self.documents[position].excerpts.extend(excerpts),
                None => {
                    let position = self.documents.len();
                    self.documents.push(DocumentEntry {
                        citation_number: position + 1,
                        document: document.clone(),
                        excerpts: excerpts.collect(),
                        first_seen_round: round,
                    });
                    self.document_index.insert(document.id.clone(), position);
                    added += 1;
                }
            }
        }
        added
    }

    fn open_mut(&mut self) -> Result<&mut OpenRound> {
        self.open
            .as_mut()
            .ok_or_else(|| AppError::StateCorruption("No open round".to_string()))
    }

    /// Whether recent dispatch rounds stopped adding new documents
    pub fn evidence_saturated(&self) -> bool {
        if self.rounds.len() < SATURATION_MIN_ROUNDS {
            return false;
        }
        let recent: Vec<usize> = self
            .rounds
            .iter()
            .rev()
            .filter(|r| r.kind == RoundKind::Dispatch)
            .take(2)
            .map(|r| r.new_documents)
            .collect();
        recent.len() == 2 && recent.iter().all(|n| *n <= SATURATION_MAX_NEW_DOCUMENTS)
    }

    /// The bounded view the supervisor decides from. Never contains raw
    /// traces or candidate lists.
    pub fn compressed_view(&self, max_rounds: u32, remaining_time: Duration) -> CompressedView {
        let findings = self
            .rounds
            .iter()
            .flat_map(|round| {
                round.findings.iter().map(move |f| FindingDigest {
                    round: round.number,
                    topic: f.topic().description.clone(),
                    status: f.status(),
                    summary: f.summary().to_string(),
                    key_points: f.key_points().to_vec(),
                    gaps: f.gaps().map(str::to_string),
                    documents_selected: f.documents_selected(),
                })
            })
            .collect();

        let mut reflections: Vec<String> = self
            .rounds
            .iter()
            .flat_map(|r| r.reflections.iter().cloned())
            .collect();
        if let Some(open) = &self.open {
            reflections.extend(open.reflections.iter().cloned());
        }

        let rounds_completed = self.rounds_completed();
        CompressedView {
            question: self.question.clone(),
            rounds_completed,
            remaining_rounds: max_rounds.saturating_sub(rounds_completed),
            remaining_time,
            findings,
            reflections,
            hypothesis: self.hypothesis.clone(),
            total_documents: self.documents.len(),
            saturation_hint: self.evidence_saturated(),
        }
    }

    /// Full copy of the session for report synthesis.
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            session_id: self.session_id,
            question: self.question.clone(),
            started_at: self.started_at,
            rounds: self.rounds.clone(),
            documents: self.documents.clone(),
            traces: self.traces.clone(),
            hypothesis: self.hypothesis.clone(),
        }
    }
}

/// One finding as the supervisor sees it.
#[derive(Debug, Clone, Serialize)]
pub struct FindingDigest {
    pub round: u32,
    pub topic: String,
    pub status: FindingStatus,
    pub summary: String,
    pub key_points: Vec<String>,
    pub gaps: Option<String>,
    pub documents_selected: usize,
}

/// Supervisor's working context
#[derive(Debug, Clone, Serialize)]
pub struct CompressedView {
    pub question: String,
    pub rounds_completed: u32,
    pub remaining_rounds: u32,
    pub remaining_time: Duration,
    pub findings: Vec<FindingDigest>,
    pub reflections: Vec<String>,
    pub hypothesis: Option<String>,
    pub total_documents: usize,
    pub saturation_hint: bool,
}

/// Uncompressed session contents handed to report synthesis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub session_id: Uuid,
    pub question: String,
    pub started_at: DateTime<Utc>,
    pub rounds: Vec<RoundRecord>,
    pub documents: Vec<DocumentEntry>,
    pub traces: Vec<RawTrace>,
    pub hypothesis: Option<String>,
}

impl SessionSnapshot {
    pub fn findings(&self) -> impl Iterator<Item = &CompressedFinding> {
        self.rounds.iter().flat_map(|r| r.findings.iter())
    }

    pub fn has_evidence(&self) -> bool {
        self.findings().any(CompressedFinding::has_evidence)
    }

    pub fn reflection_count(&self) -> usize {
        self.rounds.iter().map(|r| r.reflections.len()).sum()
    }

    pub fn documents_searched(&self) -> usize {
        self.findings().map(CompressedFinding::documents_searched).sum()
    }

    pub fn citation_number(&self, document_id: &str) -> Option<usize> {
        self.documents
            .iter()
            .find(|e| e.document.id == document_id)
            .map(|e| e.citation_number)
    }
}

/// Shared handle to one session's state.
///
/// Cloning the handle shares the state. Closures passed to [`read`] and
/// [`update`] run under the lock and must not block.
///
/// [`read`]: SessionStore::read
/// [`update`]: SessionStore::update
#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<Mutex<SessionState>>,
}

impl SessionStore {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(SessionState::new(question))),
        }
    }

    pub fn read<R>(&self, f: impl FnOnce(&SessionState) -> R) -> R {
        f(&self.inner.lock())
    }

    pub fn update<R>(&self, f: impl FnOnce(&mut SessionState) -> R) -> R {
        f(&mut self.inner.lock())
    }

    pub fn merge_finding(&self, slot: usize, output: ResearchOutput) -> Result<MergeOutcome> {
        self.update(|state| state.merge_finding(slot, output))
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.read(SessionState::snapshot)
    }

    pub fn session_id(&self) -> Uuid {
        self.read(SessionState::session_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::research::types::RawTrace;

    fn doc(id: &str) -> Document {
        Document::new(id, format!("Title {}", id), format!("Summary of {}", id))
    }

    fn output(topic: &str, docs: Vec<Document>, excerpt_text: &str) -> ResearchOutput {
        let topic = ResearchTopic::new(topic);
        let excerpts = docs
            .iter()
            .map(|d| Excerpt {
                document_id: d.id.clone(),
                text: format!("{} ({})", excerpt_text, d.id),
            })
            .collect();
        let finding = CompressedFinding::new(topic.clone(), "summary", excerpts, docs, 10);
        ResearchOutput::new(finding, RawTrace::new(topic, vec![]))
    }

    fn dispatched(topics: &[&str]) -> SessionState {
        let mut state = SessionState::new("compare A and B");
        state.open_round().unwrap();
        state
            .begin_dispatch(topics.iter().map(|t| ResearchTopic::new(*t)).collect())
            .unwrap();
        state
    }

    #[test]
    fn test_merge_is_idempotent_per_finding() {
        let mut state = dispatched(&["A", "B"]);
        let a = output("A", vec![doc("d1"), doc("d2")], "a");

        assert_eq!(state.merge_finding(0, a.clone()).unwrap(), MergeOutcome::Merged);
        assert_eq!(state.merge_finding(0, a).unwrap(), MergeOutcome::Duplicate);
        assert!(!state.dispatch_complete());

        state.merge_finding(1, output("B", vec![doc("d3")], "b")).unwrap();
        state.seal_dispatch().unwrap();

        assert_eq!(state.documents().len(), 3);
        assert_eq!(state.rounds()[0].findings.len(), 2);
        assert_eq!(state.traces().len(), 2);
    }

    #[test]
    fn test_union_order_follows_dispatch_not_completion() {
        let mut state = dispatched(&["A", "B"]);
        // B completes first
        state
            .merge_finding(1, output("B", vec![doc("shared"), doc("b1")], "from B"))
            .unwrap();
        state
            .merge_finding(0, output("A", vec![doc("a1"), doc("shared")], "from A"))
            .unwrap();
        state.seal_dispatch().unwrap();

        let ids: Vec<&str> = state.documents().iter().map(|e| e.document.id.as_str()).collect();
        assert_eq!(ids, vec!["a1", "shared", "b1"]);

        let shared = &state.documents()[1];
        assert_eq!(shared.citation_number, 2);
        assert_eq!(shared.excerpts.len(), 2);
        assert!(shared.excerpts[0].text.starts_with("from A"));
        assert!(shared.excerpts[1].text.starts_with("from B"));
    }

    #[test]
    fn test_first_writer_wins_metadata() {
        let mut state = dispatched(&["A", "B"]);
        let first = Document::new("dup", "Original title", "first");
        let second = Document::new("dup", "Other title", "second");
        state.merge_finding(1, output("B", vec![second], "b")).unwrap();
        state.merge_finding(0, output("A", vec![first], "a")).unwrap();
        state.seal_dispatch().unwrap();

        assert_eq!(state.documents().len(), 1);
        assert_eq!(state.documents()[0].document.title, "Original title");
    }

    #[test]
    fn test_citation_numbers_are_stable_across_rounds() {
        let mut state = dispatched(&["A"]);
        state.merge_finding(0, output("A", vec![doc("d1")], "a")).unwrap();
        state.seal_dispatch().unwrap();

        state.open_round().unwrap();
        state.begin_dispatch(vec![ResearchTopic::new("B")]).unwrap();
        state
            .merge_finding(0, output("B", vec![doc("d2"), doc("d1")], "b"))
            .unwrap();
        state.seal_dispatch().unwrap();

        let snapshot = state.snapshot();
        assert_eq!(snapshot.citation_number("d1"), Some(1));
        assert_eq!(snapshot.citation_number("d2"), Some(2));
        assert_eq!(state.rounds()[1].new_documents, 1);
    }

    #[test]
    fn test_seal_dispatch_requires_all_topics() {
        let mut state = dispatched(&["A", "B"]);
        state.merge_finding(0, output("A", vec![doc("d1")], "a")).unwrap();
        assert!(matches!(
            state.seal_dispatch(),
            Err(AppError::StateCorruption(_))
        ));
    }

    #[test]
    fn test_interrupted_round_keeps_completed_subset() {
        let mut state = dispatched(&["A", "B", "C"]);
        state.merge_finding(2, output("C", vec![doc("c1")], "c")).unwrap();

        let record = state.seal_interrupted().unwrap().unwrap();
        assert!(record.interrupted);
        assert_eq!(record.topics.len(), 3);
        assert_eq!(record.findings.len(), 1);
        assert!(!state.has_open_round());
    }

    #[test]
    fn test_empty_interrupted_round_is_discarded() {
        let mut state = SessionState::new("q");
        state.open_round().unwrap();
        assert!(state.seal_interrupted().unwrap().is_none());
        assert_eq!(state.rounds_completed(), 0);
    }

    #[test]
    fn test_reflection_appends_and_hypothesis_overrides() {
        let mut state = SessionState::new("q");
        state.open_round().unwrap();
        state
            .apply(StateUpdate::AppendReflection("first".into()))
            .unwrap();
        state
            .apply(StateUpdate::AppendReflection("second".into()))
            .unwrap();
        state
            .apply(StateUpdate::OverrideHypothesis(Some("A wins".into())))
            .unwrap();
        state
            .apply(StateUpdate::OverrideHypothesis(Some("B wins".into())))
            .unwrap();

        assert_eq!(state.open_reflection_count(), 2);
        assert_eq!(state.hypothesis(), Some("B wins"));

        state.apply(StateUpdate::OverrideHypothesis(None)).unwrap();
        assert_eq!(state.hypothesis(), None);
    }

    #[test]
    fn test_reflection_without_open_round_is_corruption() {
        let mut state = SessionState::new("q");
        let err = state
            .apply(StateUpdate::AppendReflection("orphan".into()))
            .unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_compressed_view_excludes_raw_material() {
        let mut state = dispatched(&["A"]);
        state
            .merge_finding(0, output("A", vec![doc("d1"), doc("d2")], "a"))
            .unwrap();
        state.seal_dispatch().unwrap();

        let view = state.compressed_view(10, Duration::from_secs(100));
        assert_eq!(view.rounds_completed, 1);
        assert_eq!(view.remaining_rounds, 9);
        assert_eq!(view.findings.len(), 1);
        assert_eq!(view.findings[0].documents_selected, 2);

        let json = serde_json::to_string(&view).unwrap();
        assert!(!json.contains("candidates"));
        assert!(!json.contains("Summary of d1"));
    }

    #[test]
    fn test_saturation_after_two_stale_rounds() {
        let mut state = dispatched(&["A"]);
        state
            .merge_finding(0, output("A", vec![doc("d1"), doc("d2")], "a"))
            .unwrap();
        state.seal_dispatch().unwrap();

        for topic in ["B", "C"] {
            state.open_round().unwrap();
            state.begin_dispatch(vec![ResearchTopic::new(topic)]).unwrap();
            state.merge_finding(0, output(topic, vec![doc("d1")], topic)).unwrap();
            state.seal_dispatch().unwrap();
        }

        assert!(state.evidence_saturated());
        assert!(state.compressed_view(10, Duration::ZERO).saturation_hint);
    }
}
