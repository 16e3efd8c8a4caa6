//! Language-model gateway abstractions
//!
//! The research engine treats the language model as an unreliable remote
//! call: a prompt goes in together with the set of actions the model may
//! invoke, and either a structured action invocation or free-form text
//! comes back. Both the supervisor and the researchers talk to the model
//! exclusively through [`LLMClient`].

use crate::types::{AppError, Result, ToolCall, ToolDefinition};
use async_trait::async_trait;
use std::sync::Arc;

/// Generic LLM client trait for provider abstraction
///
/// Implementations must be safe to call concurrently; researchers of the
/// same round share one client.
#[async_trait]
pub trait LLMClient: Send + Sync {
    /// Generate a completion from a prompt
    async fn generate(&self, prompt: &str) -> Result<String>;

    /// Generate with system prompt
    async fn generate_with_system(&self, system: &str, prompt: &str) -> Result<String>;

    /// Generate with a declared set of invocable actions
    ///
    /// The response carries any action invocations in `tool_calls`; a model
    /// that answers in plain text leaves it empty.
    async fn generate_with_tools(
        &self,
        system: &str,
        prompt: &str,
        tools: &[ToolDefinition],
    ) -> Result<LLMResponse>;

    /// Get the model name/identifier
    fn model_name(&self) -> &str;
}

/// Response from an LLM generation request
#[derive(Debug, Clone, Default)]
pub struct LLMResponse {
    /// The text content of the response
    pub content: String,
    /// Any tool calls requested by the model
    pub tool_calls: Vec<ToolCall>,
    /// The reason generation stopped (e.g., "stop", "tool_calls", "length")
    pub finish_reason: String,
}

impl LLMResponse {
    /// A plain-text response with no action invocation.
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            tool_calls: Vec::new(),
            finish_reason: "stop".to_string(),
        }
    }

    /// A response invoking exactly one action.
    pub fn action(name: impl Into<String>, arguments: serde_json::Value) -> Self {
        let name = name.into();
        Self {
            content: String::new(),
            tool_calls: vec![ToolCall {
                id: format!("call_{}", name),
                name,
                arguments,
            }],
            finish_reason: "tool_calls".to_string(),
        }
    }
}

/// Provider enum for runtime selection
///
/// | Provider | Tool Calling | Notes |
/// |----------|--------------|-------|
/// | OpenAI | ✅ | Any OpenAI-compatible endpoint |
/// | Ollama | ✅ | Served through Ollama's OpenAI-compatible `/v1` API |
#[derive(Debug, Clone)]
pub enum Provider {
    /// OpenAI API provider (including Azure OpenAI and compatible APIs)
    ///
    /// # Example
    /// ```rust,ignore
    /// let provider = Provider::OpenAI {
    ///     api_key: "sk-...".to_string(),
    ///     api_base: "https://api.openai.com/v1".to_string(),
    ///     model: "gpt-4o-mini".to_string(),
    /// };
    /// ```
    OpenAI {
        api_key: String,
        api_base: String,
        model: String,
    },

    /// Ollama local LLM provider
    ///
    /// Models with function calling support (`llama3.1`, `qwen2.5`) are
    /// required for structured decisions; others fall back to the JSON
    /// text protocol.
    Ollama { base_url: String, model: String },
}

impl Provider {
    /// Create a client instance for this provider
    ///
    /// # Errors
    ///
    /// Returns an error if the crate was built without the `openai` feature.
    pub fn create_client(&self) -> Result<Arc<dyn LLMClient>> {
        match self {
            #[cfg(feature = "openai")]
            Provider::OpenAI {
                api_key,
                api_base,
                model,
            } => Ok(Arc::new(super::openai::OpenAIClient::new(
                api_key.clone(),
                api_base.clone(),
                model.clone(),
            ))),

            #[cfg(feature = "openai")]
            Provider::Ollama { base_url, model } => Ok(Arc::new(
                super::openai::OpenAIClient::new(
                    "ollama".to_string(),
                    format!("{}/v1", base_url.trim_end_matches('/')),
                    model.clone(),
                ),
            )),

            #[cfg(not(feature = "openai"))]
            other => Err(AppError::Configuration(format!(
                "Provider '{}' requires the `openai` feature",
                other.name()
            ))),
        }
    }

    /// Get a human-readable name for this provider
    pub fn name(&self) -> &'static str {
        match self {
            Provider::OpenAI { .. } => "OpenAI",
            Provider::Ollama { .. } => "Ollama",
        }
    }

    /// The model identifier this provider will be asked for
    pub fn model(&self) -> &str {
        match self {
            Provider::OpenAI { model, .. } | Provider::Ollama { model, .. } => model,
        }
    }

    /// Same provider, different model
    pub fn with_model(&self, model: impl Into<String>) -> Self {
        let model = model.into();
        match self {
            Provider::OpenAI {
                api_key, api_base, ..
            } => Provider::OpenAI {
                api_key: api_key.clone(),
                api_base: api_base.clone(),
                model,
            },
            Provider::Ollama { base_url, .. } => Provider::Ollama {
                base_url: base_url.clone(),
                model,
            },
        }
    }
}

/// Helper used by clients to reject empty completions uniformly.
pub(crate) fn non_empty(content: Option<String>, provider: &str) -> Result<String> {
    content
        .filter(|c| !c.trim().is_empty())
        .ok_or_else(|| AppError::LLM(format!("No response from {}", provider)))
}
