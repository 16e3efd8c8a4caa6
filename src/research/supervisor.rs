//! Supervisor decision loop
//!
//! Once per step the supervisor shows the language model the compressed
//! session view and the closed action set, then acts on the single action
//! it gets back:
//!
//! - `Reflect` appends reasoning to the open round and re-decides;
//! - `Dispatch` fans topics out to researchers in a [`JoinSet`], merges
//!   each result as it arrives and seals the round once all have merged;
//! - `Complete` seals a completion record and ends the loop.
//!
//! Round budget, the session deadline and cancellation are enforced here
//! regardless of what the model asks for.

use crate::llm::LLMClient;
use crate::research::actions::{parse_supervisor_action, supervisor_tools, SupervisorAction};
use crate::research::events::{EventSink, SessionEvent};
use crate::research::prompts::{self, SUPERVISOR_STRICT_SUFFIX, SUPERVISOR_SYSTEM};
use crate::research::researcher::Researcher;
use crate::research::state::{RoundRecord, SessionStore, StateUpdate};
use crate::research::types::{
    CompressedFinding, RawTrace, ResearchOutput, ResearchTopic, TerminationVerdict,
};
use crate::types::{AppError, Result};
use crate::utils::toml_config::SessionConfig;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::{JoinError, JoinSet};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Reason recorded when the model cannot produce a usable decision
pub const DECISION_UNAVAILABLE: &str = "decision-unavailable";

/// Decision attempts per step: the first plus one stricter retry
const DECISION_ATTEMPTS: usize = 2;

/// Supervisor state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorPhase {
    Deciding,
    Dispatching,
    AwaitingResults,
    Terminated,
}

impl SupervisorPhase {
    fn can_advance_to(self, next: SupervisorPhase) -> bool {
        use SupervisorPhase::*;
        matches!(
            (self, next),
            (Deciding, Dispatching)
                | (Dispatching, AwaitingResults)
                | (AwaitingResults, Deciding)
                | (Deciding | Dispatching | AwaitingResults, Terminated)
        )
    }
}

#[derive(Debug, Clone)]
pub struct SupervisorSettings {
    pub max_rounds: u32,
    pub topics_per_round_cap: usize,
    pub researcher_timeout: Duration,
    pub reflect_consumes_round: bool,
    pub max_reflections_per_round: u32,
}

impl From<&SessionConfig> for SupervisorSettings {
    fn from(config: &SessionConfig) -> Self {
        Self {
            max_rounds: config.max_rounds,
            topics_per_round_cap: config.topics_per_round_cap,
            researcher_timeout: config.researcher_timeout(),
            reflect_consumes_round: config.reflect_consumes_round,
            max_reflections_per_round: config.max_reflections_per_round,
        }
    }
}

/// What one researcher task hands back to the merge loop
enum TaskOutcome {
    Finished(ResearchOutput),
    TimedOut(ResearchTopic),
    Cancelled,
}

/// How a dispatch round ended
enum DispatchEnd {
    Merged,
    Interrupted(TerminationVerdict),
}

pub struct Supervisor {
    llm: Arc<dyn LLMClient>,
    researcher: Researcher,
    store: SessionStore,
    settings: SupervisorSettings,
    deadline: Instant,
    cancel: CancellationToken,
    events: EventSink,
    phase: SupervisorPhase,
}

impl Supervisor {
    pub fn new(
        llm: Arc<dyn LLMClient>,
        researcher: Researcher,
        store: SessionStore,
        settings: SupervisorSettings,
        deadline: Instant,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            llm,
            researcher,
            store,
            settings,
            deadline,
            cancel,
            events: EventSink::default(),
            phase: SupervisorPhase::Deciding,
        }
    }

    pub fn with_events(mut self, events: EventSink) -> Self {
        self.events = events;
        self
    }

    pub fn phase(&self) -> SupervisorPhase {
        self.phase
    }

    /// Drive the session until a terminal verdict.
    ///
    /// Only fatal errors (state corruption) are returned as `Err`; any other
    /// internal failure becomes [`TerminationVerdict::Failed`].
    pub async fn run(&mut self) -> Result<TerminationVerdict> {
        if self.phase == SupervisorPhase::Terminated {
            return Err(AppError::StateCorruption(
                "Supervisor already terminated".to_string(),
            ));
        }

        let verdict = match self.run_loop().await {
            Ok(verdict) => verdict,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                tracing::error!("Supervisor loop failed: {}", e);
                self.seal_interrupted()?;
                TerminationVerdict::Failed(e.to_string())
            }
        };

        self.advance(SupervisorPhase::Terminated)?;
        tracing::info!(
            session_id = %self.store.session_id(),
            verdict = %verdict,
            "Supervisor terminated"
        );
        Ok(verdict)
    }

    async fn run_loop(&mut self) -> Result<TerminationVerdict> {
        loop {
            if self.cancel.is_cancelled() {
                self.seal_interrupted()?;
                return Ok(TerminationVerdict::Cancelled);
            }
            if Instant::now() >= self.deadline {
                self.seal_interrupted()?;
                return Ok(TerminationVerdict::TimedOut);
            }

            let round = match self.store.read(|s| s.open_round_number()) {
                Some(round) => round,
                None => {
                    if self.store.read(|s| s.rounds_completed()) >= self.settings.max_rounds {
                        tracing::info!(
                            max_rounds = self.settings.max_rounds,
                            "Round budget exhausted"
                        );
                        return Ok(TerminationVerdict::RoundBudgetExceeded);
                    }
                    let round = self.store.update(|s| s.open_round())?;
                    tracing::info!(session_id = %self.store.session_id(), round, "Round opened");
                    self.events.emit(SessionEvent::RoundOpened { round });
                    round
                }
            };

            let action = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    self.seal_interrupted()?;
                    return Ok(TerminationVerdict::Cancelled);
                }
                _ = tokio::time::sleep_until(self.deadline) => {
                    self.seal_interrupted()?;
                    return Ok(TerminationVerdict::TimedOut);
                }
                action = self.decide() => action,
            };

            match action {
                SupervisorAction::Reflect {
                    thought,
                    hypothesis,
                } => {
                    tracing::info!(round, "Reflecting");
                    self.store.update(|s| {
                        s.apply(StateUpdate::AppendReflection(thought.clone()))?;
                        if hypothesis.is_some() {
                            s.apply(StateUpdate::OverrideHypothesis(hypothesis))?;
                        }
                        Ok::<_, AppError>(())
                    })?;
                    self.events.emit(SessionEvent::Reflected { round, thought });

                    if self.settings.reflect_consumes_round {
                        let record = self.store.update(|s| s.seal_reflection().cloned())?;
                        self.emit_sealed(&record);
                    }
                }
                SupervisorAction::Dispatch(topics) => {
                    if let DispatchEnd::Interrupted(verdict) = self.dispatch(round, topics).await? {
                        return Ok(verdict);
                    }
                }
                SupervisorAction::Complete { reason, summary } => {
                    tracing::info!(round, reason = %reason, "Research complete");
                    if let Some(summary) = summary.filter(|s| !s.trim().is_empty()) {
                        self.store
                            .update(|s| s.apply(StateUpdate::OverrideHypothesis(Some(summary))))?;
                    }
                    let record = self
                        .store
                        .update(|s| s.seal_completion(reason.clone()).cloned())?;
                    self.emit_sealed(&record);
                    return Ok(TerminationVerdict::Complete(reason));
                }
            }
        }
    }

    fn reflect_allowed(&self) -> bool {
        self.settings.reflect_consumes_round
            || self.store.read(|s| s.open_reflection_count())
                < self.settings.max_reflections_per_round as usize
    }

    /// Ask the model for one action, retrying once with a stricter prompt.
    async fn decide(&self) -> SupervisorAction {
        let allow_reflect = self.reflect_allowed();
        let tools = supervisor_tools(allow_reflect);
        let remaining = self.deadline.saturating_duration_since(Instant::now());
        let view = self
            .store
            .read(|s| s.compressed_view(self.settings.max_rounds, remaining));
        let prompt =
            prompts::supervisor_prompt(&view, self.settings.topics_per_round_cap, allow_reflect);
        tracing::debug!(prompt_chars = prompt.len(), "Deciding");

        for attempt in 1..=DECISION_ATTEMPTS {
            let system = if attempt == 1 {
                SUPERVISOR_SYSTEM.to_string()
            } else {
                format!("{}{}", SUPERVISOR_SYSTEM, SUPERVISOR_STRICT_SUFFIX)
            };

            let decision = self
                .llm
                .generate_with_tools(&system, &prompt, &tools)
                .await
                .and_then(|response| parse_supervisor_action(&response));

            match decision {
                Ok(SupervisorAction::Reflect { .. }) if !allow_reflect => {
                    tracing::warn!(attempt, "Reflection requested after the per-round limit");
                }
                Ok(action) => {
                    tracing::debug!(attempt, action = action.name(), "Decision parsed");
                    return action;
                }
                Err(e) => tracing::warn!(attempt, "Decision failed: {}", e),
            }
        }

        tracing::warn!("No usable decision, completing with partial results");
        SupervisorAction::Complete {
            reason: DECISION_UNAVAILABLE.to_string(),
            summary: None,
        }
    }

    async fn dispatch(&mut self, round: u32, mut topics: Vec<ResearchTopic>) -> Result<DispatchEnd> {
        if topics.len() > self.settings.topics_per_round_cap {
            tracing::warn!(
                requested = topics.len(),
                cap = self.settings.topics_per_round_cap,
                "Truncating dispatched topics to the per-round cap"
            );
            topics.truncate(self.settings.topics_per_round_cap);
        }

        self.advance(SupervisorPhase::Dispatching)?;
        self.store.update(|s| s.begin_dispatch(topics.clone()))?;
        tracing::info!(round, topics = topics.len(), "Dispatching researchers");
        self.events.emit(SessionEvent::Dispatched {
            round,
            topics: topics.iter().map(|t| t.description.clone()).collect(),
        });

        let mut tasks = JoinSet::new();
        for (slot, topic) in topics.into_iter().enumerate() {
            let researcher = self.researcher.clone();
            let token = self.cancel.child_token();
            let limit = self.settings.researcher_timeout;
            tasks.spawn(async move {
                let fallback = topic.clone();
                let outcome = match tokio::time::timeout(limit, researcher.research(topic, token)).await {
                    Ok(Some(output)) => TaskOutcome::Finished(output),
                    Ok(None) => TaskOutcome::Cancelled,
                    Err(_) => TaskOutcome::TimedOut(fallback),
                };
                (slot, outcome)
            });
        }
        self.advance(SupervisorPhase::AwaitingResults)?;

        let mut failure = None;
        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    return self.interrupt(round, &mut tasks, TerminationVerdict::Cancelled);
                }
                _ = tokio::time::sleep_until(self.deadline) => {
                    return self.interrupt(round, &mut tasks, TerminationVerdict::TimedOut);
                }
                joined = tasks.join_next() => match joined {
                    Some(joined) => {
                        if let Some(cause) = self.absorb(round, joined)? {
                            failure.get_or_insert(cause);
                        }
                    }
                    None => break,
                },
            }
        }

        if let Some(cause) = failure {
            self.seal_interrupted()?;
            return Ok(DispatchEnd::Interrupted(TerminationVerdict::Failed(cause)));
        }

        let record = self.store.update(|s| s.seal_dispatch().cloned())?;
        self.emit_sealed(&record);
        self.advance(SupervisorPhase::Deciding)?;
        Ok(DispatchEnd::Merged)
    }

    /// Keep results that already finished, abort the rest, seal the round.
    fn interrupt(
        &self,
        round: u32,
        tasks: &mut JoinSet<(usize, TaskOutcome)>,
        verdict: TerminationVerdict,
    ) -> Result<DispatchEnd> {
        while let Some(joined) = tasks.try_join_next() {
            self.absorb(round, joined)?;
        }
        let outstanding = tasks.len();
        tasks.abort_all();
        tracing::info!(round, outstanding, verdict = %verdict, "Round interrupted");
        self.seal_interrupted()?;
        Ok(DispatchEnd::Interrupted(verdict))
    }

    /// Merge one joined task. Returns the panic cause for a crashed task.
    fn absorb(
        &self,
        round: u32,
        joined: std::result::Result<(usize, TaskOutcome), JoinError>,
    ) -> Result<Option<String>> {
        let (slot, outcome) = match joined {
            Ok(done) => done,
            Err(e) if e.is_cancelled() => return Ok(None),
            Err(e) => {
                tracing::error!(round, "Researcher task failed: {}", e);
                return Ok(Some(format!("researcher task failed: {}", e)));
            }
        };

        let output = match outcome {
            TaskOutcome::Finished(output) => output,
            TaskOutcome::TimedOut(topic) => {
                tracing::warn!(round, topic = %topic.description, "Researcher timed out");
                ResearchOutput::new(
                    CompressedFinding::timed_out(topic.clone()),
                    RawTrace::new(topic, Vec::new()),
                )
            }
            TaskOutcome::Cancelled => return Ok(None),
        };

        let topic = output.finding.topic().description.clone();
        let status = output.finding.status();
        let documents_selected = output.finding.documents_selected();
        self.store.merge_finding(slot, output)?;
        tracing::info!(round, topic = %topic, ?status, documents_selected, "Finding merged");
        self.events.emit(SessionEvent::FindingMerged {
            round,
            topic,
            status,
            documents_selected,
        });
        Ok(None)
    }

    fn seal_interrupted(&self) -> Result<()> {
        if let Some(record) = self.store.update(|s| s.seal_interrupted().map(|r| r.cloned()))? {
            self.emit_sealed(&record);
        }
        Ok(())
    }

    fn emit_sealed(&self, record: &RoundRecord) {
        tracing::info!(
            round = record.number,
            kind = ?record.kind,
            findings = record.findings.len(),
            new_documents = record.new_documents,
            "Round sealed"
        );
        self.events.emit(SessionEvent::RoundSealed {
            round: record.number,
            findings: record.findings.len(),
            new_documents: record.new_documents,
        });
    }

    fn advance(&mut self, next: SupervisorPhase) -> Result<()> {
        if !self.phase.can_advance_to(next) {
            return Err(AppError::StateCorruption(format!(
                "Illegal supervisor transition {:?} -> {:?}",
                self.phase, next
            )));
        }
        self.phase = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use SupervisorPhase::*;

    #[rstest]
    #[case(Deciding, Dispatching, true)]
    #[case(Dispatching, AwaitingResults, true)]
    #[case(AwaitingResults, Deciding, true)]
    #[case(AwaitingResults, Terminated, true)]
    #[case(Deciding, AwaitingResults, false)]
    #[case(Dispatching, Deciding, false)]
    #[case(Terminated, Deciding, false)]
    #[case(Terminated, Terminated, false)]
    fn test_phase_transitions(
        #[case] from: SupervisorPhase,
        #[case] to: SupervisorPhase,
        #[case] legal: bool,
    ) {
        assert_eq!(from.can_advance_to(to), legal);
    }
}
