//! Research Orchestration Engine
//!
//! A supervisor decides, round by round, whether to reflect, dispatch topics
//! to isolated researchers or finish. Researchers search an evidence source,
//! screen and compress what they find; their findings merge into a single
//! session state through a serialized merge point. The supervisor only ever
//! sees a compressed view of that state, while report synthesis receives the
//! full snapshot once the session terminates.
//!
//! # Architecture
//!
//! - [`orchestrator::ResearchOrchestrator`] - Session lifetime, deadline, cancellation
//! - [`supervisor::Supervisor`] - Decision loop and phase state machine
//! - [`researcher::Researcher`] - Search, screen, compress for one topic
//! - [`state::SessionStore`] - Session state and merge discipline
//! - [`actions`] - Closed action sets declared to the language model
//!
//! # Usage
//!
//! ```ignore
//! use deepdive::research::ResearchOrchestrator;
//! use tokio_util::sync::CancellationToken;
//!
//! let orchestrator = ResearchOrchestrator::new(llm, source, config.session.clone());
//! let report = orchestrator
//!     .run("compare method A and method B", CancellationToken::new())
//!     .await?;
//!
//! println!("{}", report.markdown);
//! ```

/// Closed supervisor and researcher action sets.
pub mod actions;
/// Progress events.
pub mod events;
/// Session lifetime management.
pub mod orchestrator;
/// Prompt builders.
pub mod prompts;
/// Per-topic research worker.
pub mod researcher;
/// Session state, round records and merge discipline.
pub mod state;
/// Supervisor decision loop.
pub mod supervisor;
/// Topics, findings, traces and verdicts.
pub mod types;

pub use events::SessionEvent;
pub use orchestrator::ResearchOrchestrator;
pub use researcher::{Researcher, ResearcherSettings};
pub use state::{SessionSnapshot, SessionStore};
pub use supervisor::{Supervisor, SupervisorPhase, SupervisorSettings};
pub use types::{
    CompressedFinding, FindingStatus, ResearchTopic, SearchStrategy, TerminationVerdict,
};
