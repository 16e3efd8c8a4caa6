//! Researcher: one topic in, one compressed finding out.
//!
//! A researcher runs three steps with an isolated working context:
//! 1. search the evidence source once per keyword, concurrently, and
//!    deduplicate candidates by title similarity;
//! 2. screen candidates with a relevance judgment call;
//! 3. compress the selected documents into a summary with cited excerpts.
//!
//! Failures of the evidence source or the model degrade the finding (empty
//! results, lexical screening, extractive summary) and never propagate.

use crate::evidence::EvidenceSource;
use crate::llm::{LLMClient, LLMResponse};
use crate::research::actions::{
    parse_screening, parse_summary, screen_tool, summarize_tool, Evaluation,
};
use crate::research::prompts::{self, RESEARCHER_SYSTEM};
use crate::research::types::{
    CompressedFinding, Excerpt, RawTrace, ResearchOutput, ResearchTopic, ScreeningDecision,
};
use crate::types::Document;
use crate::utils::toml_config::{ScreenTarget, SessionConfig};
use futures::future::join_all;
use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Titles with token overlap at or above this are the same document.
const TITLE_SIMILARITY_THRESHOLD: f64 = 0.9;
/// Longest leading sentence kept by extractive compression
const EXTRACT_CHARS: usize = 300;

/// The slice of session configuration a researcher needs
#[derive(Debug, Clone)]
pub struct ResearcherSettings {
    pub keywords_per_topic_cap: usize,
    pub per_keyword_result_limit: usize,
    pub screened_result_target: ScreenTarget,
    pub min_relevance_score: u8,
    pub use_fulltext: bool,
}

impl From<&SessionConfig> for ResearcherSettings {
    fn from(config: &SessionConfig) -> Self {
        Self {
            keywords_per_topic_cap: config.keywords_per_topic_cap,
            per_keyword_result_limit: config.per_keyword_result_limit,
            screened_result_target: config.screened_result_target,
            min_relevance_score: config.min_relevance_score,
            use_fulltext: config.use_fulltext,
        }
    }
}

impl Default for ResearcherSettings {
    fn default() -> Self {
        Self::from(&SessionConfig::default())
    }
}

#[derive(Clone)]
pub struct Researcher {
    llm: Arc<dyn LLMClient>,
    source: Arc<dyn EvidenceSource>,
    settings: ResearcherSettings,
}

impl Researcher {
    pub fn new(
        llm: Arc<dyn LLMClient>,
        source: Arc<dyn EvidenceSource>,
        settings: ResearcherSettings,
    ) -> Self {
        Self {
            llm,
            source,
            settings,
        }
    }

    /// Run one topic to completion, or return `None` once `cancel` fires.
    pub async fn research(
        &self,
        topic: ResearchTopic,
        cancel: CancellationToken,
    ) -> Option<ResearchOutput> {
        let description = topic.description.clone();
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::info!(topic = %description, "Researcher cancelled");
                None
            }
            output = self.run(topic) => Some(output),
        }
    }

    /// Search, screen and compress one topic.
    pub async fn run(&self, topic: ResearchTopic) -> ResearchOutput {
        let keywords = self.keywords_for(&topic);
        let mut trace = RawTrace::new(topic.clone(), keywords.clone());

        let (raw, failed) = self.search(&topic, &keywords).await;
        let documents_searched = raw.len();
        trace.failed_keywords = failed;
        trace.candidates = dedup_by_title(raw);

        tracing::info!(
            topic = %topic.description,
            searched = documents_searched,
            unique = trace.candidates.len(),
            "Search complete"
        );

        if trace.candidates.is_empty() {
            let finding = CompressedFinding::no_evidence(topic, documents_searched);
            return ResearchOutput::new(finding, trace);
        }

        let selected = self.screen(&topic, &mut trace).await;
        if selected.is_empty() {
            tracing::info!(topic = %topic.description, "No candidate passed screening");
            let finding = CompressedFinding::no_evidence(topic, documents_searched);
            return ResearchOutput::new(finding, trace);
        }

        let finding = self
            .compress(topic, selected, documents_searched, &mut trace)
            .await;
        ResearchOutput::new(finding, trace)
    }

    fn keywords_for(&self, topic: &ResearchTopic) -> Vec<String> {
        let cap = self.settings.keywords_per_topic_cap.max(1);
        if topic.keywords.is_empty() {
            derive_keywords(&topic.description, cap)
        } else {
            topic.keywords.iter().take(cap).cloned().collect()
        }
    }

    // ============= Step A: search =============

    async fn search(
        &self,
        topic: &ResearchTopic,
        keywords: &[String],
    ) -> (Vec<Document>, Vec<String>) {
        let limit = topic
            .strategy
            .per_keyword_limit(self.settings.per_keyword_result_limit);

        let searches = keywords.iter().map(|keyword| async move {
            let result = self
                .source
                .search(&topic.description, std::slice::from_ref(keyword), limit)
                .await;
            (keyword, result)
        });

        let mut documents = Vec::new();
        let mut failed = Vec::new();
        for (keyword, result) in join_all(searches).await {
            match result {
                Ok(mut found) => {
                    found.truncate(limit);
                    documents.extend(found);
                }
                Err(e) => {
                    tracing::warn!(
                        source = self.source.name(),
                        keyword = %keyword,
                        "Keyword search failed: {}",
                        e
                    );
                    failed.push(keyword.clone());
                }
            }
        }
        (documents, failed)
    }

    // ============= Step B: screen =============

    async fn screen(&self, topic: &ResearchTopic, trace: &mut RawTrace) -> Vec<Document> {
        let candidates = &trace.candidates;
        let prompt = prompts::screening_prompt(topic, candidates);
        tracing::debug!(topic = %topic.description, prompt_chars = prompt.len(), "Screening");

        let scores = match self
            .llm
            .generate_with_tools(RESEARCHER_SYSTEM, &prompt, &[screen_tool()])
            .await
            .and_then(|response| parse_screening(&response))
        {
            Ok(evaluations) => model_scores(&evaluations, candidates.len()),
            Err(e) => {
                tracing::warn!(
                    topic = %topic.description,
                    "Screening call failed, ranking lexically: {}",
                    e
                );
                trace.used_fallback_screening = true;
                lexical_scores(topic, candidates)
            }
        };

        let threshold = if trace.used_fallback_screening {
            1
        } else {
            self.settings.min_relevance_score
        };

        let mut ranked: Vec<(usize, u8)> = scores
            .iter()
            .enumerate()
            .filter(|(_, (score, _))| *score >= threshold)
            .map(|(i, (score, _))| (i, *score))
            .collect();
        ranked.sort_by(|a, b| {
            b.1.cmp(&a.1)
                .then_with(|| by_citations_then_year(&candidates[a.0], &candidates[b.0]))
        });
        ranked.truncate(self.settings.screened_result_target.max);

        let chosen: HashSet<usize> = ranked.iter().map(|(i, _)| *i).collect();
        trace.screening = candidates
            .iter()
            .zip(scores)
            .enumerate()
            .map(|(i, (doc, (score, reason)))| ScreeningDecision {
                document_id: doc.id.clone(),
                score,
                reason,
                selected: chosen.contains(&i),
            })
            .collect();

        if ranked.len() < self.settings.screened_result_target.min {
            tracing::debug!(
                topic = %topic.description,
                selected = ranked.len(),
                target = self.settings.screened_result_target.min,
                "Fewer relevant documents than targeted"
            );
        }

        ranked
            .into_iter()
            .map(|(i, _)| trace.candidates[i].clone())
            .collect()
    }

    // ============= Step C: compress =============

    async fn compress(
        &self,
        topic: ResearchTopic,
        selected: Vec<Document>,
        documents_searched: usize,
        trace: &mut RawTrace,
    ) -> CompressedFinding {
        let texts = self.source_texts(&selected).await;
        let pairs: Vec<(&Document, String)> = selected.iter().zip(texts).collect();
        let prompt = prompts::compression_prompt(&topic, &pairs);
        tracing::debug!(topic = %topic.description, prompt_chars = prompt.len(), "Compressing");

        let response = self
            .llm
            .generate_with_tools(RESEARCHER_SYSTEM, &prompt, &[summarize_tool()])
            .await;

        let parsed = response.and_then(|response| {
            let summary = parse_summary(&response)?;
            Ok((summary, raw_response(&response)))
        });

        match parsed {
            Ok((summary, raw)) => {
                drop(pairs);
                trace.model_response = Some(raw);
                let excerpts = summary
                    .excerpts
                    .into_iter()
                    .filter_map(|e| {
                        let doc = e.document_index.checked_sub(1).and_then(|i| selected.get(i))?;
                        Some(Excerpt {
                            document_id: doc.id.clone(),
                            text: e.text,
                        })
                    })
                    .collect();
                CompressedFinding::new(
                    topic,
                    summary.summary,
                    excerpts,
                    selected,
                    documents_searched,
                )
                .with_key_points(summary.key_points)
                .with_gaps(summary.gaps)
            }
            Err(e) => {
                tracing::warn!(
                    topic = %topic.description,
                    "Compression call failed, extracting: {}",
                    e
                );
                trace.used_fallback_compression = true;
                extractive_finding(topic, &pairs, documents_searched)
            }
        }
    }

    /// Text Step C may read for each document, in order.
    async fn source_texts(&self, selected: &[Document]) -> Vec<String> {
        if !self.settings.use_fulltext {
            return selected.iter().map(readable_text).collect();
        }

        join_all(selected.iter().map(|doc| async move {
            if let Some(text) = doc.full_text.as_ref().filter(|t| !t.trim().is_empty()) {
                return text.clone();
            }
            match self.source.fetch_full_text(doc).await {
                Ok(text) if !text.trim().is_empty() => text,
                Ok(_) => readable_text(doc),
                Err(e) => {
                    tracing::debug!(document = %doc.id, "Full text unavailable, using summary: {}", e);
                    readable_text(doc)
                }
            }
        }))
        .await
    }
}

fn readable_text(doc: &Document) -> String {
    if doc.summary.trim().is_empty() {
        doc.title.clone()
    } else {
        doc.summary.clone()
    }
}

fn raw_response(response: &LLMResponse) -> String {
    match response.tool_calls.first() {
        Some(call) => call.arguments.to_string(),
        None => response.content.clone(),
    }
}

fn extractive_finding(
    topic: ResearchTopic,
    pairs: &[(&Document, String)],
    documents_searched: usize,
) -> CompressedFinding {
    let excerpts: Vec<Excerpt> = pairs
        .iter()
        .map(|(doc, text)| Excerpt {
            document_id: doc.id.clone(),
            text: leading_sentence(text).to_string(),
        })
        .collect();
    let summary = excerpts
        .iter()
        .map(|e| e.text.as_str())
        .collect::<Vec<_>>()
        .join(" ");
    let selected = pairs.iter().map(|(doc, _)| (*doc).clone()).collect();
    CompressedFinding::new(topic, summary, excerpts, selected, documents_searched)
}

fn leading_sentence(text: &str) -> &str {
    let text = text.trim();
    let end = text
        .find(". ")
        .map(|i| i + 1)
        .unwrap_or(text.len());
    prompts::truncate(&text[..end], EXTRACT_CHARS)
}

/// Split a topic description into up to `cap` search keywords.
pub(crate) fn derive_keywords(description: &str, cap: usize) -> Vec<String> {
    let mut normalized = description.to_string();
    for separator in [" versus ", " vs. ", " vs ", " and "] {
        normalized = normalized.replace(separator, ",");
    }

    let mut seen = HashSet::new();
    let keywords: Vec<String> = normalized
        .split([',', ';'])
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .filter(|k| seen.insert(k.to_lowercase()))
        .take(cap)
        .map(str::to_string)
        .collect();

    if keywords.is_empty() {
        vec![description.trim().to_string()]
    } else {
        keywords
    }
}

fn title_tokens(title: &str) -> Vec<String> {
    title
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

fn titles_match(a: &[String], b: &[String]) -> bool {
    // A title with no words carries no identity; only the id can match it
    if a.is_empty() || b.is_empty() {
        return false;
    }
    if a == b {
        return true;
    }
    let a: HashSet<&String> = a.iter().collect();
    let b: HashSet<&String> = b.iter().collect();
    let union = a.union(&b).count();
    let shared = a.intersection(&b).count();
    shared as f64 / union as f64 >= TITLE_SIMILARITY_THRESHOLD
}

/// Drop repeated documents, keeping the first occurrence.
pub(crate) fn dedup_by_title(documents: Vec<Document>) -> Vec<Document> {
    let mut kept: Vec<(Vec<String>, Document)> = Vec::with_capacity(documents.len());
    for doc in documents {
        let tokens = title_tokens(&doc.title);
        let duplicate = kept
            .iter()
            .any(|(seen, existing)| existing.id == doc.id || titles_match(seen, &tokens));
        if !duplicate {
            kept.push((tokens, doc));
        }
    }
    kept.into_iter().map(|(_, doc)| doc).collect()
}

/// Per-candidate `(score, reason)`; candidates the model skipped score 0.
fn model_scores(evaluations: &[Evaluation], count: usize) -> Vec<(u8, String)> {
    let mut scores = vec![(0u8, "not evaluated".to_string()); count];
    for evaluation in evaluations {
        if let Some(slot) = evaluation
            .index
            .checked_sub(1)
            .and_then(|i| scores.get_mut(i))
        {
            *slot = (evaluation.score, evaluation.reason.clone());
        }
    }
    scores
}

/// Term-overlap ranking used when the screening call fails.
fn lexical_scores(topic: &ResearchTopic, candidates: &[Document]) -> Vec<(u8, String)> {
    let terms: HashSet<String> = std::iter::once(topic.description.as_str())
        .chain(topic.keywords.iter().map(String::as_str))
        .chain(topic.focus_points.iter().map(String::as_str))
        .flat_map(title_tokens)
        .filter(|t| t.chars().count() > 2)
        .collect();

    candidates
        .iter()
        .map(|doc| {
            let text: HashSet<String> = title_tokens(&doc.title)
                .into_iter()
                .chain(title_tokens(&doc.summary))
                .collect();
            let overlap = terms.intersection(&text).count();
            let score = if overlap == 0 {
                0
            } else {
                (overlap + 1).min(5) as u8
            };
            (score, format!("{} matching terms", overlap))
        })
        .collect()
}

fn by_citations_then_year(a: &Document, b: &Document) -> Ordering {
    b.citation
        .citation_count
        .unwrap_or(0)
        .cmp(&a.citation.citation_count.unwrap_or(0))
        .then_with(|| b.citation.year.unwrap_or(0).cmp(&a.citation.year.unwrap_or(0)))
}
