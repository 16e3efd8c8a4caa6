//! LLM gateway tests against a mocked OpenAI-compatible endpoint.
//!
//! Ollama is reached through the same client via its `/v1` endpoint, so
//! these cover both providers.

#![cfg(feature = "openai")]

use deepdive::research::actions::{parse_supervisor_action, supervisor_tools, SupervisorAction};
use deepdive::{AppError, Provider};
use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

// ============= Helper Functions =============

fn completion(message: serde_json::Value, finish_reason: &str) -> serde_json::Value {
    json!({
        "id": "chatcmpl-1",
        "object": "chat.completion",
        "created": 1_700_000_000,
        "model": "qwen2.5:7b",
        "choices": [{
            "index": 0,
            "message": message,
            "finish_reason": finish_reason
        }],
        "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}
    })
}

fn ollama(server: &MockServer) -> Provider {
    Provider::Ollama {
        base_url: server.uri(),
        model: "qwen2.5:7b".to_string(),
    }
}

// ============= Text Generation =============

#[tokio::test]
async fn test_generate_with_system_returns_text() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_partial_json(json!({"model": "qwen2.5:7b"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion(
            json!({"role": "assistant", "content": "## Report\nA beats B [1]."}),
            "stop",
        )))
        .expect(1)
        .mount(&server)
        .await;

    let client = ollama(&server).create_client().unwrap();
    let text = client
        .generate_with_system("You write reports.", "Summarize")
        .await
        .unwrap();
    assert_eq!(text, "## Report\nA beats B [1].");
    assert_eq!(client.model_name(), "qwen2.5:7b");
}

#[tokio::test]
async fn test_empty_completion_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion(
            json!({"role": "assistant", "content": "   "}),
            "stop",
        )))
        .mount(&server)
        .await;

    let client = ollama(&server).create_client().unwrap();
    let result = client.generate("Hello").await;
    assert!(matches!(result, Err(AppError::LLM(_))));
}

#[tokio::test]
async fn test_client_error_status_is_llm_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": {
                "message": "model not found",
                "type": "invalid_request_error",
                "param": null,
                "code": null
            }
        })))
        .mount(&server)
        .await;

    let client = ollama(&server).create_client().unwrap();
    let result = client.generate("Hello").await;
    assert!(matches!(result, Err(AppError::LLM(_))));
}

// ============= Action Invocation =============

#[tokio::test]
async fn test_tool_call_round_trip_to_supervisor_action() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_partial_json(json!({"tool_choice": "auto"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion(
            json!({
                "role": "assistant",
                "content": null,
                "tool_calls": [
                    {
                        "id": "call_1",
                        "type": "function",
                        "function": {
                            "name": "conduct_research",
                            "arguments": "{\"topic\": \"A characteristics\", \"search_keywords\": [\"method A\"]}"
                        }
                    },
                    {
                        "id": "call_2",
                        "type": "function",
                        "function": {
                            "name": "conduct_research",
                            "arguments": "{\"topic\": \"B characteristics\"}"
                        }
                    }
                ]
            }),
            "tool_calls",
        )))
        .expect(1)
        .mount(&server)
        .await;

    let client = ollama(&server).create_client().unwrap();
    let response = client
        .generate_with_tools("system", "decide", &supervisor_tools(true))
        .await
        .unwrap();

    assert_eq!(response.tool_calls.len(), 2);
    assert_eq!(response.finish_reason, "toolcalls");

    match parse_supervisor_action(&response).unwrap() {
        SupervisorAction::Dispatch(topics) => {
            assert_eq!(topics.len(), 2);
            assert_eq!(topics[0].description, "A characteristics");
            assert_eq!(topics[0].keywords, vec!["method A"]);
            assert!(topics[1].keywords.is_empty());
        }
        other => panic!("Expected dispatch, got {:?}", other),
    }
}

#[tokio::test]
async fn test_malformed_tool_arguments_become_unparseable_decision() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion(
            json!({
                "role": "assistant",
                "content": null,
                "tool_calls": [{
                    "id": "call_1",
                    "type": "function",
                    "function": {"name": "research_complete", "arguments": "{not json"}
                }]
            }),
            "tool_calls",
        )))
        .mount(&server)
        .await;

    let client = ollama(&server).create_client().unwrap();
    let response = client
        .generate_with_tools("system", "decide", &supervisor_tools(true))
        .await
        .unwrap();

    assert_eq!(response.tool_calls[0].arguments, serde_json::Value::Null);
    assert!(matches!(
        parse_supervisor_action(&response),
        Err(AppError::UnparseableDecision(_))
    ));
}
