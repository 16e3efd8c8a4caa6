use serde::{Deserialize, Serialize};

// ============= Tool Types =============

/// A structured action the language model is allowed to invoke.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// An action invocation returned by the language model.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: serde_json::Value,
}

// ============= Evidence Types =============

/// Structured citation metadata attached to a [`Document`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CitationFields {
    #[serde(default)]
    pub authors: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub venue: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub citation_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl CitationFields {
    /// Short author string used in reference lists ("A, B et al.").
    pub fn author_line(&self) -> String {
        match self.authors.len() {
            0 => "Unknown".to_string(),
            1 | 2 => self.authors.join(", "),
            _ => format!("{} et al.", self.authors[..2].join(", ")),
        }
    }
}

/// A candidate source produced by an evidence source.
///
/// Documents are never mutated after creation; the session keeps the first
/// copy it sees for any given identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub title: String,
    pub summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_text: Option<String>,
    #[serde(default)]
    pub citation: CitationFields,
}

impl Document {
    pub fn new(id: impl Into<String>, title: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            summary: summary.into(),
            full_text: None,
            citation: CitationFields::default(),
        }
    }

    pub fn with_citation(mut self, citation: CitationFields) -> Self {
        self.citation = citation;
        self
    }

    pub fn with_full_text(mut self, text: impl Into<String>) -> Self {
        self.full_text = Some(text.into());
        self
    }
}

// ============= Error Types =============

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("External call failed: {0}")]
    ExternalCall(String),

    #[error("LLM error: {0}")]
    LLM(String),

    #[error("Unparseable decision: {0}")]
    UnparseableDecision(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Session state corrupted: {0}")]
    StateCorruption(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Only a corrupted session aborts without producing a report.
    pub fn is_fatal(&self) -> bool {
        matches!(self, AppError::StateCorruption(_))
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        AppError::ExternalCall(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_author_line() {
        let mut citation = CitationFields::default();
        assert_eq!(citation.author_line(), "Unknown");

        citation.authors = vec!["Vaswani".to_string(), "Shazeer".to_string()];
        assert_eq!(citation.author_line(), "Vaswani, Shazeer");

        citation.authors.push("Parmar".to_string());
        assert_eq!(citation.author_line(), "Vaswani, Shazeer et al.");
    }

    #[test]
    fn test_only_state_corruption_is_fatal() {
        assert!(AppError::StateCorruption("x".into()).is_fatal());
        assert!(!AppError::ExternalCall("x".into()).is_fatal());
        assert!(!AppError::UnparseableDecision("x".into()).is_fatal());
    }

    #[test]
    fn test_document_serialization_skips_empty_fields() {
        let doc = Document::new("W1", "Attention Is All You Need", "We propose the Transformer.");
        let json = serde_json::to_string(&doc).unwrap();
        assert!(!json.contains("full_text"));
        assert!(!json.contains("venue"));

        let back: Document = serde_json::from_str(&json).unwrap();
        assert_eq!(back, doc);
    }
}
