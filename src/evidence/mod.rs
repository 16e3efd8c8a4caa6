//! Evidence Sources
//!
//! An evidence source turns a search string into a bounded list of candidate
//! [`Document`]s. Researchers call it once per keyword so that a failure for
//! one keyword never hides the results of another.
//!
//! - [`EvidenceSource`] - The trait every backend implements
//! - [`openalex::OpenAlexSource`] - Scholarly works via the OpenAlex API

use crate::types::{AppError, Document, Result};
use async_trait::async_trait;

/// OpenAlex works search.
pub mod openalex;

pub use openalex::OpenAlexSource;

/// Source of candidate documents for a research topic.
///
/// Implementations must be safe to call concurrently from several
/// researchers. Errors are per call and must never be fatal to the caller.
#[async_trait]
pub trait EvidenceSource: Send + Sync {
    /// Short identifier used in logs and raw traces
    fn name(&self) -> &str;

    /// Search for documents about `topic` using `keyword_hints`, returning at
    /// most `per_keyword_limit` documents per keyword.
    async fn search(
        &self,
        topic: &str,
        keyword_hints: &[String],
        per_keyword_limit: usize,
    ) -> Result<Vec<Document>>;

    /// Retrieve the full text of a document that did not ship with one.
    ///
    /// Sources that cannot retrieve full text keep this default; callers fall
    /// back to the document summary.
    async fn fetch_full_text(&self, document: &Document) -> Result<String> {
        Err(AppError::NotFound(format!(
            "Full text not available from {} for '{}'",
            self.name(),
            document.id
        )))
    }
}
