//! TOML-based configuration for deepdive
//!
//! This module provides declarative configuration for the research session,
//! the language-model provider and the evidence source via a TOML file
//! (`deepdive.toml`). Secrets never live in the file: it names environment
//! variables, and `.env` is loaded before they are resolved.

use crate::llm::Provider;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration structure loaded from deepdive.toml
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeepdiveConfig {
    #[serde(default)]
    pub session: SessionConfig,

    #[serde(default)]
    pub provider: ProviderConfig,

    /// Optional override for researcher calls (screening, compression)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub researcher_provider: Option<ResearcherProviderConfig>,

    #[serde(default)]
    pub evidence: EvidenceConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

// ============= Session Configuration =============

/// Inclusive bounds for how many documents screening keeps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScreenTarget {
    pub min: usize,
    pub max: usize,
}

impl Default for ScreenTarget {
    fn default() -> Self {
        Self { min: 3, max: 5 }
    }
}

/// Knobs governing one research session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_max_rounds")]
    pub max_rounds: u32,

    #[serde(default = "default_session_timeout")]
    pub session_timeout_seconds: u64,

    #[serde(default = "default_topics_per_round_cap")]
    pub topics_per_round_cap: usize,

    #[serde(default = "default_per_keyword_result_limit")]
    pub per_keyword_result_limit: usize,

    #[serde(default = "default_keywords_per_topic_cap")]
    pub keywords_per_topic_cap: usize,

    #[serde(default)]
    pub screened_result_target: ScreenTarget,

    #[serde(default)]
    pub use_fulltext: bool,

    /// Deadline for a single researcher invocation
    #[serde(default = "default_researcher_timeout")]
    pub researcher_timeout_seconds: u64,

    /// Grace period for report synthesis once the session has ended
    #[serde(default = "default_synthesis_timeout")]
    pub synthesis_timeout_seconds: u64,

    /// Whether a Reflect decision seals its own round and spends budget
    #[serde(default)]
    pub reflect_consumes_round: bool,

    #[serde(default = "default_max_reflections_per_round")]
    pub max_reflections_per_round: u32,

    /// Screening scores run 1-5; documents below this are dropped
    #[serde(default = "default_min_relevance_score")]
    pub min_relevance_score: u8,
}

fn default_max_rounds() -> u32 {
    10
}

fn default_session_timeout() -> u64 {
    300
}

fn default_topics_per_round_cap() -> usize {
    3
}

fn default_per_keyword_result_limit() -> usize {
    15
}

fn default_keywords_per_topic_cap() -> usize {
    3
}

fn default_researcher_timeout() -> u64 {
    120
}

fn default_synthesis_timeout() -> u64 {
    60
}

fn default_max_reflections_per_round() -> u32 {
    3
}

fn default_min_relevance_score() -> u8 {
    3
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_rounds: default_max_rounds(),
            session_timeout_seconds: default_session_timeout(),
            topics_per_round_cap: default_topics_per_round_cap(),
            per_keyword_result_limit: default_per_keyword_result_limit(),
            keywords_per_topic_cap: default_keywords_per_topic_cap(),
            screened_result_target: ScreenTarget::default(),
            use_fulltext: false,
            researcher_timeout_seconds: default_researcher_timeout(),
            synthesis_timeout_seconds: default_synthesis_timeout(),
            reflect_consumes_round: false,
            max_reflections_per_round: default_max_reflections_per_round(),
            min_relevance_score: default_min_relevance_score(),
        }
    }
}

impl SessionConfig {
    pub fn session_timeout(&self) -> Duration {
        Duration::from_secs(self.session_timeout_seconds)
    }

    pub fn researcher_timeout(&self) -> Duration {
        Duration::from_secs(self.researcher_timeout_seconds)
    }

    pub fn synthesis_timeout(&self) -> Duration {
        Duration::from_secs(self.synthesis_timeout_seconds)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::ValidationError(msg.to_string()));

        if self.max_rounds == 0 {
            return invalid("session.max_rounds must be at least 1");
        }
        if self.session_timeout_seconds == 0 {
            return invalid("session.session_timeout_seconds must be at least 1");
        }
        if self.researcher_timeout_seconds == 0 {
            return invalid("session.researcher_timeout_seconds must be at least 1");
        }
        if self.synthesis_timeout_seconds == 0 {
            return invalid("session.synthesis_timeout_seconds must be at least 1");
        }
        if self.topics_per_round_cap == 0 {
            return invalid("session.topics_per_round_cap must be at least 1");
        }
        if self.keywords_per_topic_cap == 0 {
            return invalid("session.keywords_per_topic_cap must be at least 1");
        }
        if self.per_keyword_result_limit == 0 {
            return invalid("session.per_keyword_result_limit must be at least 1");
        }
        if self.screened_result_target.min > self.screened_result_target.max {
            return invalid("session.screened_result_target.min exceeds max");
        }
        if self.screened_result_target.max == 0 {
            return invalid("session.screened_result_target.max must be at least 1");
        }
        if !(1..=5).contains(&self.min_relevance_score) {
            return invalid("session.min_relevance_score must be between 1 and 5");
        }
        Ok(())
    }
}

// ============= Provider Configuration =============

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ProviderConfig {
    Ollama {
        #[serde(default = "default_ollama_url")]
        base_url: String,
        model: String,
    },
    OpenAI {
        /// Environment variable containing API key
        #[serde(default = "default_openai_key_env")]
        api_key_env: String,
        #[serde(default = "default_openai_base")]
        api_base: String,
        model: String,
    },
}

fn default_ollama_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_openai_base() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_openai_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

impl Default for ProviderConfig {
    fn default() -> Self {
        ProviderConfig::Ollama {
            base_url: default_ollama_url(),
            model: "qwen2.5:7b".to_string(),
        }
    }
}

/// Researchers share the supervisor's endpoint but may use another model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearcherProviderConfig {
    pub model: String,
}

// ============= Evidence Configuration =============

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidenceConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// Contact address for OpenAlex's polite pool
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mailto: Option<String>,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_request_timeout() -> u64 {
    30
}

impl Default for EvidenceConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            mailto: None,
            request_timeout_secs: default_request_timeout(),
        }
    }
}

// ============= Logging Configuration =============

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

// ============= Configuration Loading & Validation =============

/// Errors that can occur during configuration loading
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read configuration file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Environment variable '{0}' referenced in config is not set")]
    MissingEnvVar(String),
}

impl DeepdiveConfig {
    /// Load configuration from a TOML file and validate it
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        let config: DeepdiveConfig = toml::from_str(&content)?;

        config.validate()?;

        Ok(config)
    }

    /// Load from `path` if it exists, otherwise fall back to defaults
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        match Self::load(path) {
            Err(ConfigError::FileNotFound(path)) => {
                tracing::info!("No configuration at {:?}, using defaults", path);
                Ok(Self::default())
            }
            other => other,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.session.validate()?;

        let model = match &self.provider {
            ProviderConfig::Ollama { model, .. } | ProviderConfig::OpenAI { model, .. } => model,
        };
        if model.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "provider.model must not be empty".to_string(),
            ));
        }
        if let Some(researcher) = &self.researcher_provider {
            if researcher.model.trim().is_empty() {
                return Err(ConfigError::ValidationError(
                    "researcher_provider.model must not be empty".to_string(),
                ));
            }
        }
        if self.evidence.request_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "evidence.request_timeout_secs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Get a resolved value from an env var reference
    pub fn resolve_env(&self, env_name: &str) -> Option<String> {
        std::env::var(env_name).ok().filter(|v| !v.is_empty())
    }

    /// Build the supervisor's provider, resolving secrets from the environment
    pub fn provider(&self) -> Result<Provider, ConfigError> {
        match &self.provider {
            ProviderConfig::Ollama { base_url, model } => Ok(Provider::Ollama {
                base_url: base_url.clone(),
                model: model.clone(),
            }),
            ProviderConfig::OpenAI {
                api_key_env,
                api_base,
                model,
            } => {
                let api_key = self
                    .resolve_env(api_key_env)
                    .ok_or_else(|| ConfigError::MissingEnvVar(api_key_env.clone()))?;
                Ok(Provider::OpenAI {
                    api_key,
                    api_base: api_base.clone(),
                    model: model.clone(),
                })
            }
        }
    }

    /// Provider for researcher calls; same endpoint, optionally cheaper model
    pub fn researcher_provider(&self) -> Result<Provider, ConfigError> {
        let provider = self.provider()?;
        Ok(match &self.researcher_provider {
            Some(researcher) => provider.with_model(researcher.model.clone()),
            None => provider,
        })
    }

    /// Short provider description for display
    pub fn provider_label(&self) -> String {
        match &self.provider {
            ProviderConfig::Ollama { model, .. } => format!("ollama ({})", model),
            ProviderConfig::OpenAI { model, .. } => format!("openai ({})", model),
        }
    }

    pub fn evidence_timeout(&self) -> Duration {
        Duration::from_secs(self.evidence.request_timeout_secs)
    }
}
