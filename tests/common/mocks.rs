//! Mock implementations for testing.
//!
//! Scripted language-model clients and in-memory evidence sources shared by
//! the integration tests, so sessions run without any network access.

#![allow(dead_code)]

use async_trait::async_trait;
use deepdive::llm::{LLMClient, LLMResponse};
use deepdive::types::{AppError, CitationFields, Document, Result, ToolDefinition};
use deepdive::EvidenceSource;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

// ============= Supervisor LLM =============

/// One scripted supervisor reply.
#[derive(Clone)]
pub enum Step {
    Reply(LLMResponse),
    Fail,
}

/// A request the scripted client received.
#[derive(Debug, Clone)]
pub struct Call {
    pub system: String,
    pub prompt: String,
    pub tools: Vec<String>,
}

/// Supervisor client replaying a fixed script.
///
/// Once the script runs out it keeps answering with `fallback`.
pub struct ScriptedLLM {
    script: Mutex<VecDeque<Step>>,
    fallback: Step,
    calls: Mutex<Vec<Call>>,
}

impl ScriptedLLM {
    pub fn new(script: Vec<Step>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            fallback: Step::Reply(complete("script exhausted")),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// A client that answers every call with the same step.
    pub fn always(step: Step) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: step,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

#[async_trait]
impl LLMClient for ScriptedLLM {
    async fn generate(&self, _prompt: &str) -> Result<String> {
        Err(AppError::LLM("Scripted supervisor has no text mode".to_string()))
    }

    async fn generate_with_system(&self, _system: &str, _prompt: &str) -> Result<String> {
        Err(AppError::LLM("Scripted supervisor has no text mode".to_string()))
    }

    async fn generate_with_tools(
        &self,
        system: &str,
        prompt: &str,
        tools: &[ToolDefinition],
    ) -> Result<LLMResponse> {
        self.calls.lock().push(Call {
            system: system.to_string(),
            prompt: prompt.to_string(),
            tools: tools.iter().map(|t| t.name.clone()).collect(),
        });

        let step = self
            .script
            .lock()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());
        match step {
            Step::Reply(response) => Ok(response),
            Step::Fail => Err(AppError::LLM("Mock LLM failure".to_string())),
        }
    }

    fn model_name(&self) -> &str {
        "scripted-supervisor"
    }
}

pub fn dispatch(topics: &[(&str, &[&str])]) -> Step {
    let mut response = LLMResponse::default();
    for (i, (topic, keywords)) in topics.iter().enumerate() {
        let call = LLMResponse::action(
            "conduct_research",
            json!({"topic": topic, "search_keywords": keywords}),
        );
        response.tool_calls.extend(call.tool_calls.into_iter().map(|mut c| {
            c.id = format!("call_{}", i);
            c
        }));
    }
    response.finish_reason = "tool_calls".to_string();
    Step::Reply(response)
}

pub fn think(thought: &str) -> Step {
    Step::Reply(LLMResponse::action("think", json!({ "thought": thought })))
}

pub fn complete(reason: &str) -> LLMResponse {
    LLMResponse::action("research_complete", json!({ "reason": reason }))
}

pub fn finish(reason: &str) -> Step {
    Step::Reply(complete(reason))
}

/// Gateway that answers its first decision and then never returns.
pub struct StallingLLM {
    first: Mutex<Option<LLMResponse>>,
}

impl StallingLLM {
    pub fn after(first: Step) -> Self {
        let first = match first {
            Step::Reply(response) => Some(response),
            Step::Fail => None,
        };
        Self {
            first: Mutex::new(first),
        }
    }

    async fn stall<T>() -> Result<T> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Err(AppError::LLM("stalled gateway woke up".to_string()))
    }
}

#[async_trait]
impl LLMClient for StallingLLM {
    async fn generate(&self, _prompt: &str) -> Result<String> {
        Self::stall().await
    }

    async fn generate_with_system(&self, _system: &str, _prompt: &str) -> Result<String> {
        Self::stall().await
    }

    async fn generate_with_tools(
        &self,
        _system: &str,
        _prompt: &str,
        _tools: &[ToolDefinition],
    ) -> Result<LLMResponse> {
        let first = self.first.lock().take();
        match first {
            Some(response) => Ok(response),
            None => Self::stall().await,
        }
    }

    fn model_name(&self) -> &str {
        "stalling"
    }
}

// ============= Researcher LLM =============

/// Researcher client: scores every candidate the same, summarizes with one
/// excerpt per listed document.
pub struct ResearcherLLM {
    score: u8,
    fail_screening: bool,
    fail_summary: bool,
    prompts: Mutex<Vec<String>>,
}

impl ResearcherLLM {
    pub fn new() -> Self {
        Self {
            score: 4,
            fail_screening: false,
            fail_summary: false,
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn scoring(score: u8) -> Self {
        Self {
            score,
            ..Self::new()
        }
    }

    pub fn failing_screening(mut self) -> Self {
        self.fail_screening = true;
        self
    }

    pub fn failing_summary(mut self) -> Self {
        self.fail_summary = true;
        self
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().clone()
    }
}

impl Default for ResearcherLLM {
    fn default() -> Self {
        Self::new()
    }
}

/// Count `[n] ` listing lines in a prompt.
fn listed_documents(prompt: &str) -> usize {
    prompt
        .lines()
        .filter(|line| {
            line.strip_prefix('[')
                .and_then(|rest| rest.split_once("] "))
                .is_some_and(|(n, _)| n.parse::<usize>().is_ok())
        })
        .count()
}

#[async_trait]
impl LLMClient for ResearcherLLM {
    async fn generate(&self, prompt: &str) -> Result<String> {
        self.generate_with_system("", prompt).await
    }

    async fn generate_with_system(&self, _system: &str, _prompt: &str) -> Result<String> {
        Ok("## Answer\nMethod A is faster than method B [1].".to_string())
    }

    async fn generate_with_tools(
        &self,
        _system: &str,
        prompt: &str,
        tools: &[ToolDefinition],
    ) -> Result<LLMResponse> {
        self.prompts.lock().push(prompt.to_string());
        let count = listed_documents(prompt);

        match tools.first().map(|t| t.name.as_str()) {
            Some("screen_documents") => {
                if self.fail_screening {
                    return Err(AppError::LLM("screening unavailable".to_string()));
                }
                let evaluations: Vec<Value> = (1..=count)
                    .map(|i| json!({"index": i, "score": self.score, "reason": "relevant"}))
                    .collect();
                Ok(LLMResponse::action(
                    "screen_documents",
                    json!({ "evaluations": evaluations }),
                ))
            }
            Some("summarize_findings") => {
                if self.fail_summary {
                    return Ok(LLMResponse::text("I cannot summarize that."));
                }
                let excerpts: Vec<Value> = (1..=count)
                    .map(|i| json!({"document_index": i, "text": format!("excerpt {}", i)}))
                    .collect();
                Ok(LLMResponse::action(
                    "summarize_findings",
                    json!({
                        "summary": "The selected documents agree on the topic.",
                        "excerpts": excerpts,
                        "key_points": ["point one", "point two"],
                        "gaps": "No benchmarks after 2023"
                    }),
                ))
            }
            _ => Err(AppError::LLM("unexpected action set".to_string())),
        }
    }

    fn model_name(&self) -> &str {
        "mock-researcher"
    }
}

// ============= Evidence sources =============

/// Deterministic source producing `per_keyword` documents per keyword.
pub struct InMemorySource {
    per_keyword: usize,
}

impl InMemorySource {
    pub fn new(per_keyword: usize) -> Self {
        Self { per_keyword }
    }
}

pub fn document_for(keyword: &str, i: usize) -> Document {
    let slug = keyword.to_lowercase().replace(' ', "-");
    Document::new(
        format!("{}-{}", slug, i),
        format!("Study {} on {}", i, keyword),
        format!("Findings about {} from study {}. Further detail follows.", keyword, i),
    )
    .with_citation(CitationFields {
        authors: vec![format!("Author {}", i)],
        year: Some(2000 + i as i32),
        citation_count: Some((i * 10) as u32),
        ..Default::default()
    })
}

#[async_trait]
impl EvidenceSource for InMemorySource {
    fn name(&self) -> &str {
        "in-memory"
    }

    async fn search(
        &self,
        topic: &str,
        keyword_hints: &[String],
        per_keyword_limit: usize,
    ) -> Result<Vec<Document>> {
        let keyword = keyword_hints.first().map(String::as_str).unwrap_or(topic);
        Ok((1..=self.per_keyword.min(per_keyword_limit))
            .map(|i| document_for(keyword, i))
            .collect())
    }
}

/// Source that never finds anything.
pub struct EmptySource;

#[async_trait]
impl EvidenceSource for EmptySource {
    fn name(&self) -> &str {
        "empty"
    }

    async fn search(&self, _topic: &str, _hints: &[String], _limit: usize) -> Result<Vec<Document>> {
        Ok(Vec::new())
    }
}

/// Source failing for keywords containing any of `failing`.
pub struct FlakySource {
    inner: InMemorySource,
    failing: Vec<String>,
}

impl FlakySource {
    pub fn failing_for(failing: &[&str]) -> Self {
        Self {
            inner: InMemorySource::new(5),
            failing: failing.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Fails for every keyword
    pub fn always() -> Self {
        Self::failing_for(&[""])
    }
}

#[async_trait]
impl EvidenceSource for FlakySource {
    fn name(&self) -> &str {
        "flaky"
    }

    async fn search(&self, topic: &str, hints: &[String], limit: usize) -> Result<Vec<Document>> {
        let keyword = hints.first().map(String::as_str).unwrap_or(topic);
        if self.failing.iter().any(|f| keyword.contains(f.as_str())) {
            return Err(AppError::ExternalCall(format!("search failed for {}", keyword)));
        }
        self.inner.search(topic, hints, limit).await
    }
}

/// Source that sleeps before answering for topics containing `slow_for`.
pub struct SlowSource {
    inner: InMemorySource,
    slow_for: Vec<String>,
    delay: Duration,
}

impl SlowSource {
    /// Every topic is slow
    pub fn all(delay: Duration) -> Self {
        Self::only(&[""], delay)
    }

    pub fn only(topics: &[&str], delay: Duration) -> Self {
        Self {
            inner: InMemorySource::new(5),
            slow_for: topics.iter().map(|s| s.to_string()).collect(),
            delay,
        }
    }
}

#[async_trait]
impl EvidenceSource for SlowSource {
    fn name(&self) -> &str {
        "slow"
    }

    async fn search(&self, topic: &str, hints: &[String], limit: usize) -> Result<Vec<Document>> {
        if self.slow_for.iter().any(|s| topic.contains(s.as_str())) {
            tokio::time::sleep(self.delay).await;
        }
        self.inner.search(topic, hints, limit).await
    }
}

/// Source whose search panics, simulating a crashed researcher.
pub struct PanickingSource;

#[async_trait]
impl EvidenceSource for PanickingSource {
    fn name(&self) -> &str {
        "panicking"
    }

    async fn search(&self, _topic: &str, _hints: &[String], _limit: usize) -> Result<Vec<Document>> {
        panic!("evidence source crashed")
    }
}

/// Source with documents carrying full text, some fetchable on demand.
pub struct FullTextSource {
    pub documents: Vec<Document>,
}

#[async_trait]
impl EvidenceSource for FullTextSource {
    fn name(&self) -> &str {
        "fulltext"
    }

    async fn search(&self, _topic: &str, _hints: &[String], _limit: usize) -> Result<Vec<Document>> {
        Ok(self.documents.clone())
    }

    async fn fetch_full_text(&self, document: &Document) -> Result<String> {
        if document.id == "fetchable" {
            Ok("FETCHED FULL TEXT body".to_string())
        } else {
            Err(AppError::NotFound(document.id.clone()))
        }
    }
}

pub fn shared<T>(value: T) -> Arc<T> {
    Arc::new(value)
}
