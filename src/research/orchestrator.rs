//! Research orchestrator: one session from question to report.
//!
//! The orchestrator owns the session store, starts the supervisor, enforces
//! the hard session deadline on top of the supervisor's own checks and hands
//! the full snapshot to report synthesis for every terminal verdict.

use crate::evidence::EvidenceSource;
use crate::llm::LLMClient;
use crate::report::{
    fallback_report, MarkdownReportSynthesizer, ReportMetadata, ReportSynthesizer, ResearchReport,
};
use crate::research::events::{EventSink, SessionEvent};
use crate::research::researcher::Researcher;
use crate::research::state::SessionStore;
use crate::research::supervisor::Supervisor;
use crate::research::types::TerminationVerdict;
use crate::types::{AppError, Result};
use crate::utils::toml_config::SessionConfig;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Runs research sessions; each call to [`run`](Self::run) is independent,
/// so one orchestrator can serve several sessions concurrently.
pub struct ResearchOrchestrator {
    supervisor_llm: Arc<dyn LLMClient>,
    researcher_llm: Arc<dyn LLMClient>,
    source: Arc<dyn EvidenceSource>,
    synthesizer: Arc<dyn ReportSynthesizer>,
    config: SessionConfig,
    events: EventSink,
}

impl ResearchOrchestrator {
    /// Orchestrator using `llm` for every call, including the report.
    pub fn new(
        llm: Arc<dyn LLMClient>,
        source: Arc<dyn EvidenceSource>,
        config: SessionConfig,
    ) -> Self {
        Self {
            supervisor_llm: llm.clone(),
            researcher_llm: llm.clone(),
            source,
            synthesizer: Arc::new(MarkdownReportSynthesizer::new(llm)),
            config,
            events: EventSink::default(),
        }
    }

    /// Use a separate (usually cheaper) model for screening and compression
    pub fn with_researcher_llm(mut self, llm: Arc<dyn LLMClient>) -> Self {
        self.researcher_llm = llm;
        self
    }

    pub fn with_synthesizer(mut self, synthesizer: Arc<dyn ReportSynthesizer>) -> Self {
        self.synthesizer = synthesizer;
        self
    }

    pub fn with_events(mut self, sender: mpsc::UnboundedSender<SessionEvent>) -> Self {
        self.events = EventSink::new(sender);
        self
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Run one session to a report.
    ///
    /// Every terminal verdict, including timeouts, cancellation and failed
    /// decisions, produces a report. Only state corruption returns `Err`.
    pub async fn run(&self, question: &str, cancel: CancellationToken) -> Result<ResearchReport> {
        let question = question.trim();
        if question.is_empty() {
            return Err(AppError::InvalidInput(
                "Research question must not be empty".to_string(),
            ));
        }
        self.config
            .validate()
            .map_err(|e| AppError::Configuration(e.to_string()))?;

        let started = Instant::now();
        let deadline = started + self.config.session_timeout();
        let store = SessionStore::new(question);
        let session_id = store.session_id();

        tracing::info!(
            %session_id,
            max_rounds = self.config.max_rounds,
            timeout_secs = self.config.session_timeout_seconds,
            "Research session started"
        );
        self.events.emit(SessionEvent::SessionStarted {
            session_id,
            question: question.to_string(),
        });

        let researcher = Researcher::new(
            self.researcher_llm.clone(),
            self.source.clone(),
            (&self.config).into(),
        );
        let mut supervisor = Supervisor::new(
            self.supervisor_llm.clone(),
            researcher,
            store.clone(),
            (&self.config).into(),
            deadline,
            cancel,
        )
        .with_events(self.events.clone());

        let verdict = match tokio::time::timeout_at(deadline, supervisor.run()).await {
            Ok(verdict) => verdict?,
            Err(_) => {
                // Supervisor dropped mid-step; its researcher tasks are aborted
                tracing::warn!(%session_id, "Session deadline reached");
                store.update(|s| s.seal_interrupted().map(|_| ()))?;
                TerminationVerdict::TimedOut
            }
        };
        drop(supervisor);

        tracing::info!(%session_id, verdict = %verdict, "Research session terminated");
        self.events.emit(SessionEvent::Terminated {
            verdict: verdict.clone(),
        });

        let snapshot = store.snapshot();
        let synthesis = tokio::time::timeout(
            self.config.synthesis_timeout(),
            self.synthesizer.synthesize(&snapshot, &verdict),
        );
        let markdown = match synthesis.await {
            Ok(Ok(markdown)) if !markdown.trim().is_empty() => markdown,
            Ok(Ok(_)) => fallback_report(&snapshot, &verdict),
            Ok(Err(e)) => {
                tracing::warn!(%session_id, "Report synthesis failed: {}", e);
                fallback_report(&snapshot, &verdict)
            }
            Err(_) => {
                tracing::warn!(
                    %session_id,
                    timeout_secs = self.config.synthesis_timeout_seconds,
                    "Report synthesis timed out, using deterministic report"
                );
                fallback_report(&snapshot, &verdict)
            }
        };

        let metadata = ReportMetadata::from_snapshot(&snapshot, started.elapsed());
        tracing::info!(
            %session_id,
            rounds = metadata.rounds,
            documents = metadata.documents_selected,
            elapsed_ms = metadata.elapsed.as_millis() as u64,
            "Report ready"
        );
        self.events.emit(SessionEvent::ReportReady { session_id });

        Ok(ResearchReport {
            session_id,
            question: question.to_string(),
            verdict,
            markdown,
            metadata,
            snapshot,
        })
    }
}
