//! Language-Model Gateway
//!
//! This module provides the interface the research engine uses to reach a
//! language model. Everything above this module only sees the
//! [`LLMClient`] trait, so tests substitute scripted clients and the binary
//! picks a provider from configuration.
//!
//! # Architecture
//!
//! - [`LLMClient`] - The core trait that all providers implement
//! - [`LLMResponse`] - Text plus any structured action invocations
//! - [`Provider`] - Runtime provider selection from configuration
//!
//! # Supported Providers
//!
//! Enable providers via Cargo features:
//! - `openai` - OpenAI API and compatible endpoints, including Ollama's `/v1`
//!
//! # Example
//!
//! ```ignore
//! use deepdive::llm::Provider;
//!
//! let client = Provider::Ollama {
//!     base_url: "http://localhost:11434".to_string(),
//!     model: "qwen2.5:7b".to_string(),
//! }
//! .create_client()?;
//!
//! let response = client.generate("What is 2+2?").await?;
//! ```

/// Core LLM client trait and response types.
pub mod client;

#[cfg(feature = "openai")]
pub mod openai;

pub use client::{LLMClient, LLMResponse, Provider};
