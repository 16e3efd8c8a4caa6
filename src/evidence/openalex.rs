//! OpenAlex evidence source
//!
//! Searches the OpenAlex works index. OpenAlex ships abstracts as an
//! inverted index (word -> positions), which is reassembled into plain text
//! before it reaches a researcher.

use crate::evidence::EvidenceSource;
use crate::types::{AppError, CitationFields, Document, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://api.openalex.org";

/// OpenAlex caps `per-page` at 200.
const MAX_PER_PAGE: usize = 200;

/// Evidence source backed by the OpenAlex works API
pub struct OpenAlexSource {
    client: reqwest::Client,
    base_url: String,
    mailto: Option<String>,
}

impl OpenAlexSource {
    pub fn new(base_url: Option<String>, mailto: Option<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("deepdive/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AppError::Configuration(format!("HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            mailto,
        })
    }

    async fn search_keyword(&self, keyword: &str, limit: usize) -> Result<Vec<Document>> {
        let per_page = limit.clamp(1, MAX_PER_PAGE).to_string();
        let mut query = vec![("search", keyword.to_string()), ("per-page", per_page)];
        if let Some(mailto) = &self.mailto {
            query.push(("mailto", mailto.clone()));
        }

        let response = self
            .client
            .get(format!("{}/works", self.base_url))
            .query(&query)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(AppError::ExternalCall(format!(
                "OpenAlex returned {} for '{}'",
                response.status(),
                keyword
            )));
        }

        let page: WorksPage = response.json().await?;
        Ok(page
            .results
            .into_iter()
            .filter_map(Work::into_document)
            .take(limit)
            .collect())
    }
}

#[async_trait]
impl EvidenceSource for OpenAlexSource {
    fn name(&self) -> &str {
        "openalex"
    }

    async fn search(
        &self,
        topic: &str,
        keyword_hints: &[String],
        per_keyword_limit: usize,
    ) -> Result<Vec<Document>> {
        if keyword_hints.is_empty() {
            return self.search_keyword(topic, per_keyword_limit).await;
        }

        let mut documents = Vec::new();
        for keyword in keyword_hints {
            documents.extend(self.search_keyword(keyword, per_keyword_limit).await?);
        }
        Ok(documents)
    }
}

// ============= Wire Types =============

#[derive(Debug, Deserialize)]
struct WorksPage {
    #[serde(default)]
    results: Vec<Work>,
}

#[derive(Debug, Deserialize)]
struct Work {
    id: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    publication_year: Option<i32>,
    #[serde(default)]
    cited_by_count: Option<u32>,
    #[serde(default)]
    doi: Option<String>,
    #[serde(default)]
    authorships: Vec<Authorship>,
    #[serde(default)]
    abstract_inverted_index: Option<HashMap<String, Vec<usize>>>,
    #[serde(default)]
    primary_location: Option<Location>,
}

#[derive(Debug, Deserialize)]
struct Authorship {
    author: Author,
}

#[derive(Debug, Deserialize)]
struct Author {
    #[serde(default)]
    display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Location {
    #[serde(default)]
    landing_page_url: Option<String>,
    #[serde(default)]
    source: Option<Venue>,
}

#[derive(Debug, Deserialize)]
struct Venue {
    #[serde(default)]
    display_name: Option<String>,
}

impl Work {
    fn into_document(self) -> Option<Document> {
        let non_blank = |t: &String| !t.trim().is_empty();
        let title = self
            .title
            .filter(non_blank)
            .or(self.display_name.filter(non_blank))?;

        let summary = self
            .abstract_inverted_index
            .as_ref()
            .map(reconstruct_abstract)
            .unwrap_or_default();

        let (venue, landing_page) = match self.primary_location {
            Some(location) => (
                location.source.and_then(|s| s.display_name),
                location.landing_page_url,
            ),
            None => (None, None),
        };

        let citation = CitationFields {
            authors: self
                .authorships
                .into_iter()
                .filter_map(|a| a.author.display_name)
                .take(3)
                .collect(),
            year: self.publication_year,
            venue,
            citation_count: self.cited_by_count,
            url: self.doi.or(landing_page),
        };

        Some(Document::new(self.id, title, summary).with_citation(citation))
    }
}

/// Rebuild abstract text from OpenAlex's `word -> [positions]` index.
pub(crate) fn reconstruct_abstract(index: &HashMap<String, Vec<usize>>) -> String {
    let mut positioned: Vec<(usize, &str)> = index
        .iter()
        .flat_map(|(word, positions)| positions.iter().map(move |p| (*p, word.as_str())))
        .collect();
    positioned.sort_unstable_by_key(|(position, _)| *position);

    positioned
        .into_iter()
        .map(|(_, word)| word)
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_reconstruct_abstract_orders_by_position() {
        let mut index = HashMap::new();
        index.insert("attention".to_string(), vec![1]);
        index.insert("Self".to_string(), vec![0]);
        index.insert("matters".to_string(), vec![2, 4]);
        index.insert("really".to_string(), vec![3]);

        assert_eq!(
            reconstruct_abstract(&index),
            "Self attention matters really matters"
        );
    }

    #[test]
    fn test_work_without_title_is_skipped() {
        let work: Work = serde_json::from_value(json!({
            "id": "https://openalex.org/W1",
            "title": "   "
        }))
        .unwrap();
        assert!(work.into_document().is_none());
    }

    #[test]
    fn test_blank_title_falls_back_to_display_name() {
        let work: Work = serde_json::from_value(json!({
            "id": "https://openalex.org/W3",
            "title": "",
            "display_name": "Deep Residual Learning for Image Recognition"
        }))
        .unwrap();
        let doc = work.into_document().unwrap();
        assert_eq!(doc.title, "Deep Residual Learning for Image Recognition");
    }

    #[test]
    fn test_work_maps_citation_fields() {
        let work: Work = serde_json::from_value(json!({
            "id": "https://openalex.org/W2741809807",
            "display_name": "Attention Is All You Need",
            "publication_year": 2017,
            "cited_by_count": 90000,
            "doi": "https://doi.org/10.48550/arxiv.1706.03762",
            "authorships": [
                {"author": {"display_name": "Ashish Vaswani"}},
                {"author": {"display_name": "Noam Shazeer"}}
            ],
            "abstract_inverted_index": {"The": [0], "Transformer": [1]},
            "primary_location": {"source": {"display_name": "NeurIPS"}}
        }))
        .unwrap();

        let doc = work.into_document().unwrap();
        assert_eq!(doc.title, "Attention Is All You Need");
        assert_eq!(doc.summary, "The Transformer");
        assert_eq!(doc.citation.year, Some(2017));
        assert_eq!(doc.citation.citation_count, Some(90000));
        assert_eq!(doc.citation.venue.as_deref(), Some("NeurIPS"));
        assert_eq!(doc.citation.authors.len(), 2);
        assert!(doc.citation.url.unwrap().contains("1706.03762"));
    }
}
