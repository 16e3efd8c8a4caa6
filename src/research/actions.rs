//! Closed action sets declared to the language model
//!
//! The supervisor may invoke exactly `think`, `conduct_research` and
//! `research_complete`; the researcher may invoke `screen_documents` and
//! `summarize_findings`. Responses are parsed into closed enums, so the
//! control flow never depends on open-ended model output. Models without
//! native tool calling may answer with a JSON object in the message text
//! instead (`{"action": "...", "arguments": {...}}`), which is accepted too.

use crate::llm::LLMResponse;
use crate::research::types::{ResearchTopic, SearchStrategy};
use crate::types::{AppError, Result, ToolCall, ToolDefinition};
use serde::Deserialize;
use serde_json::{json, Value};

pub const THINK: &str = "think";
pub const CONDUCT_RESEARCH: &str = "conduct_research";
pub const RESEARCH_COMPLETE: &str = "research_complete";
pub const SCREEN_DOCUMENTS: &str = "screen_documents";
pub const SUMMARIZE_FINDINGS: &str = "summarize_findings";

// ============= Supervisor =============

/// One supervisor decision
#[derive(Debug, Clone, PartialEq)]
pub enum SupervisorAction {
    Reflect {
        thought: String,
        /// Replaces the working hypothesis when present
        hypothesis: Option<String>,
    },
    Dispatch(Vec<ResearchTopic>),
    Complete {
        reason: String,
        summary: Option<String>,
    },
}

impl SupervisorAction {
    pub fn name(&self) -> &'static str {
        match self {
            SupervisorAction::Reflect { .. } => THINK,
            SupervisorAction::Dispatch(_) => CONDUCT_RESEARCH,
            SupervisorAction::Complete { .. } => RESEARCH_COMPLETE,
        }
    }
}

/// Action definitions offered to the supervisor.
///
/// `think` is left out once the open round has used up its reflections.
pub fn supervisor_tools(allow_reflect: bool) -> Vec<ToolDefinition> {
    let mut tools = Vec::with_capacity(3);
    if allow_reflect {
        tools.push(ToolDefinition {
            name: THINK.to_string(),
            description: "Reflect on what is known, what is missing and what to do next. \
                          Does not search."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "thought": {
                        "type": "string",
                        "description": "Current state of the research, gaps, and the plan"
                    },
                    "hypothesis": {
                        "type": "string",
                        "description": "Optional working answer; replaces any previous one"
                    }
                },
                "required": ["thought"]
            }),
        });
    }
    tools.push(ToolDefinition {
        name: CONDUCT_RESEARCH.to_string(),
        description: "Dispatch one research topic to a researcher, which searches the \
                      literature and returns compressed findings. Call once per topic."
            .to_string(),
        parameters: json!({
            "type": "object",
            "properties": {
                "topic": {
                    "type": "string",
                    "description": "Specific, searchable research topic"
                },
                "search_keywords": {
                    "type": "array",
                    "items": {"type": "string"},
                    "description": "2-4 academic search keywords"
                },
                "strategy": {
                    "type": "string",
                    "enum": ["broad", "focused", "comparison"],
                    "description": "broad = explore, focused = go deep, comparison = contrast approaches"
                },
                "focus_points": {
                    "type": "array",
                    "items": {"type": "string"},
                    "description": "Aspects to pay particular attention to"
                }
            },
            "required": ["topic"]
        }),
    });
    tools.push(ToolDefinition {
        name: RESEARCH_COMPLETE.to_string(),
        description: "Finish the research when the findings are sufficient to answer the \
                      question."
            .to_string(),
        parameters: json!({
            "type": "object",
            "properties": {
                "reason": {
                    "type": "string",
                    "description": "Why the research is sufficient"
                },
                "summary": {
                    "type": "string",
                    "description": "Optional short summary of the answer"
                }
            },
            "required": ["reason"]
        }),
    });
    tools
}

#[derive(Debug, Deserialize)]
struct ThinkArgs {
    thought: String,
    #[serde(default)]
    hypothesis: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResearchArgs {
    topic: String,
    #[serde(default)]
    search_keywords: Vec<String>,
    #[serde(default)]
    strategy: Option<SearchStrategy>,
    #[serde(default)]
    focus_points: Vec<String>,
}

/// `conduct_research` may also arrive as `{"topics": [...]}`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ResearchPayload {
    Many { topics: Vec<ResearchArgs> },
    One(ResearchArgs),
}

#[derive(Debug, Deserialize)]
struct CompleteArgs {
    reason: String,
    #[serde(default)]
    summary: Option<String>,
}

impl From<ResearchArgs> for ResearchTopic {
    fn from(args: ResearchArgs) -> Self {
        ResearchTopic {
            description: args.topic.trim().to_string(),
            keywords: args
                .search_keywords
                .into_iter()
                .map(|k| k.trim().to_string())
                .filter(|k| !k.is_empty())
                .collect(),
            strategy: args.strategy.unwrap_or_default(),
            focus_points: args.focus_points,
        }
    }
}

/// Parse a supervisor response into exactly one action.
///
/// The first recognised invocation decides the kind; every
/// `conduct_research` invocation in the response contributes a topic.
pub fn parse_supervisor_action(response: &LLMResponse) -> Result<SupervisorAction> {
    let calls = invocations(response)?;
    let first = calls
        .first()
        .ok_or_else(|| AppError::UnparseableDecision("Response invoked no action".to_string()))?;

    match first.name.as_str() {
        THINK => {
            let args: ThinkArgs = decode(first)?;
            if args.thought.trim().is_empty() {
                return Err(AppError::UnparseableDecision("Empty reflection".to_string()));
            }
            Ok(SupervisorAction::Reflect {
                thought: args.thought,
                hypothesis: args.hypothesis.filter(|h| !h.trim().is_empty()),
            })
        }
        CONDUCT_RESEARCH => {
            let mut topics = Vec::new();
            for call in calls.iter().filter(|c| c.name == CONDUCT_RESEARCH) {
                match decode::<ResearchPayload>(call)? {
                    ResearchPayload::Many { topics: many } => {
                        topics.extend(many.into_iter().map(ResearchTopic::from))
                    }
                    ResearchPayload::One(one) => topics.push(one.into()),
                }
            }
            topics.retain(|t| !t.description.is_empty());
            if topics.is_empty() {
                return Err(AppError::UnparseableDecision(
                    "conduct_research without a topic".to_string(),
                ));
            }
            Ok(SupervisorAction::Dispatch(topics))
        }
        RESEARCH_COMPLETE => {
            let args: CompleteArgs = decode(first)?;
            let reason = args.reason.trim();
            Ok(SupervisorAction::Complete {
                reason: if reason.is_empty() {
                    "research complete".to_string()
                } else {
                    reason.to_string()
                },
                summary: args.summary,
            })
        }
        other => Err(AppError::UnparseableDecision(format!(
            "Unknown action '{}'",
            other
        ))),
    }
}

// ============= Researcher =============

/// Action definition for the screening judgment call
pub fn screen_tool() -> ToolDefinition {
    ToolDefinition {
        name: SCREEN_DOCUMENTS.to_string(),
        description: "Score every candidate document for relevance to the topic.".to_string(),
        parameters: json!({
            "type": "object",
            "properties": {
                "evaluations": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "index": {"type": "integer", "description": "Candidate number as listed"},
                            "score": {"type": "integer", "minimum": 1, "maximum": 5},
                            "reason": {"type": "string"}
                        },
                        "required": ["index", "score"]
                    }
                }
            },
            "required": ["evaluations"]
        }),
    }
}

/// Action definition for the compression call
pub fn summarize_tool() -> ToolDefinition {
    ToolDefinition {
        name: SUMMARIZE_FINDINGS.to_string(),
        description: "Summarize what the selected documents say about the topic, quoting \
                      supporting excerpts by document number."
            .to_string(),
        parameters: json!({
            "type": "object",
            "properties": {
                "summary": {"type": "string", "description": "150-300 word synthesis"},
                "excerpts": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "document_index": {"type": "integer"},
                            "text": {"type": "string"}
                        },
                        "required": ["document_index", "text"]
                    }
                },
                "key_points": {"type": "array", "items": {"type": "string"}},
                "gaps": {"type": "string", "description": "What the documents do not cover"}
            },
            "required": ["summary"]
        }),
    }
}

/// One relevance judgment; `index` is 1-based as listed in the prompt.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Evaluation {
    pub index: usize,
    pub score: u8,
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Deserialize)]
struct ScreenArgs {
    evaluations: Vec<Evaluation>,
}

pub fn parse_screening(response: &LLMResponse) -> Result<Vec<Evaluation>> {
    let call = expect_call(response, SCREEN_DOCUMENTS)?;
    let args: ScreenArgs = decode(&call)?;
    Ok(args
        .evaluations
        .into_iter()
        .map(|e| Evaluation {
            score: e.score.clamp(1, 5),
            ..e
        })
        .collect())
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct IndexedExcerpt {
    pub document_index: usize,
    pub text: String,
}

/// Parsed compression output, still keyed by listing position
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Summary {
    pub summary: String,
    #[serde(default)]
    pub excerpts: Vec<IndexedExcerpt>,
    #[serde(default)]
    pub key_points: Vec<String>,
    #[serde(default)]
    pub gaps: Option<String>,
}

pub fn parse_summary(response: &LLMResponse) -> Result<Summary> {
    let call = expect_call(response, SUMMARIZE_FINDINGS)?;
    let summary: Summary = decode(&call)?;
    if summary.summary.trim().is_empty() {
        return Err(AppError::UnparseableDecision("Empty summary".to_string()));
    }
    Ok(summary)
}

// ============= Shared parsing =============

fn expect_call(response: &LLMResponse, name: &str) -> Result<ToolCall> {
    invocations(response)?
        .into_iter()
        .find(|c| c.name == name)
        .ok_or_else(|| AppError::UnparseableDecision(format!("Expected '{}' invocation", name)))
}

/// Native tool calls, else a JSON object embedded in the text.
fn invocations(response: &LLMResponse) -> Result<Vec<ToolCall>> {
    if !response.tool_calls.is_empty() {
        return Ok(response.tool_calls.clone());
    }

    let value = extract_json(&response.content).ok_or_else(|| {
        AppError::UnparseableDecision("Response contains no action invocation".to_string())
    })?;

    let name = value
        .get("action")
        .or_else(|| value.get("name"))
        .and_then(Value::as_str)
        .ok_or_else(|| AppError::UnparseableDecision("JSON response names no action".to_string()))?
        .to_string();
    let arguments = value
        .get("arguments")
        .or_else(|| value.get("parameters"))
        .cloned()
        .unwrap_or(Value::Null);

    Ok(vec![ToolCall {
        id: format!("text_{}", name),
        name,
        arguments,
    }])
}

fn decode<T: for<'de> Deserialize<'de>>(call: &ToolCall) -> Result<T> {
    serde_json::from_value(call.arguments.clone()).map_err(|e| {
        AppError::UnparseableDecision(format!("Bad arguments for '{}': {}", call.name, e))
    })
}

/// Pull the outermost JSON object out of free text, tolerating code fences.
pub(crate) fn extract_json(text: &str) -> Option<Value> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str(&text[start..=end]).ok()
}
