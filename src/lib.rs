//! # deepdive
//!
//! A multi-round literature research engine. A supervisor model decides,
//! round by round, whether to reflect, dispatch topics to researchers or
//! finish; researchers search an evidence source, screen the candidates and
//! compress them into small, citable findings; the session ends in a
//! markdown report with stable citation numbers.
//!
//! ## Quick Start (Library Usage)
//!
//! ```rust,ignore
//! use deepdive::{DeepdiveConfig, OpenAlexSource, ResearchOrchestrator};
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! let config = DeepdiveConfig::load_or_default("deepdive.toml")?;
//! let llm = config.provider()?.create_client()?;
//! let source = Arc::new(OpenAlexSource::new(None, None, config.evidence_timeout())?);
//!
//! let report = ResearchOrchestrator::new(llm, source, config.session.clone())
//!     .run("compare method A and method B", CancellationToken::new())
//!     .await?;
//! println!("{}", report.markdown);
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `openai` | OpenAI-compatible client, also used for Ollama (default) |
//!
//! ## Modules
//!
//! - [`research`] - Orchestrator, supervisor, researchers and session state
//! - [`evidence`] - Evidence sources (OpenAlex)
//! - [`llm`] - Language-model gateway
//! - [`report`] - Report synthesis
//! - [`types`] - Common types and error handling
//! - [`utils`] - Configuration

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(rustdoc::missing_crate_level_docs)]

/// Command-line parsing and terminal output.
pub mod cli;
/// Evidence sources.
pub mod evidence;
/// LLM provider clients and abstractions.
pub mod llm;
/// Report synthesis.
pub mod report;
/// Research orchestration engine.
pub mod research;
/// Core types and errors.
pub mod types;
/// Configuration utilities.
pub mod utils;

// Re-export commonly used types
pub use evidence::{EvidenceSource, OpenAlexSource};
pub use llm::{LLMClient, LLMResponse, Provider};
pub use report::{MarkdownReportSynthesizer, ReportSynthesizer, ResearchReport};
pub use research::{ResearchOrchestrator, SessionEvent, TerminationVerdict};
pub use types::{AppError, Result};
pub use utils::toml_config::{DeepdiveConfig, SessionConfig};
