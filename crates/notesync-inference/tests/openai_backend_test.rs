//! OpenAI-compatible backend against a mock HTTP server.

#![cfg(feature = "openai")]

use notesync_core::{Error, GenerationBackend};
use notesync_inference::openai::{OpenAIBackend, OpenAIConfig};
use notesync_inference::Summarizer;
use std::sync::Arc;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config_for(server: &MockServer) -> OpenAIConfig {
    OpenAIConfig {
        base_url: server.uri(),
        api_key: Some("test-key".to_string()),
        gen_model: "test-gen".to_string(),
        timeout_seconds: 10,
        ..Default::default()
    }
}

fn chat_response(content: serde_json::Value) -> serde_json::Value {
    serde_json::json!({
        "id": "chatcmpl-123",
        "choices": [{
            "index": 0,
            "message": { "role": "assistant", "content": content },
            "finish_reason": "stop"
        }],
        "usage": { "prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15 }
    })
}

#[tokio::test]
async fn test_generation_sends_summary_parameters() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("Authorization", "Bearer test-key"))
        .and(body_partial_json(serde_json::json!({
            "model": "test-gen",
            "max_tokens": 150,
            "messages": [
                { "role": "system", "content": "be brief" },
                { "role": "user", "content": "Groceries" }
            ]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_response("Buy food.".into())))
        .expect(1)
        .mount(&server)
        .await;

    let backend = OpenAIBackend::new(config_for(&server)).unwrap();
    let out = backend
        .generate_with_system("be brief", "Groceries")
        .await
        .unwrap();
    assert_eq!(out, "Buy food.");
}

#[tokio::test]
async fn test_generation_without_system_prompt() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_partial_json(serde_json::json!({
            "messages": [{ "role": "user", "content": "hi" }]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_response("hello".into())))
        .expect(1)
        .mount(&server)
        .await;

    let backend = OpenAIBackend::new(config_for(&server)).unwrap();
    assert_eq!(backend.generate("hi").await.unwrap(), "hello");
}

#[tokio::test]
async fn test_auth_failure_maps_to_config_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
            "error": { "message": "Incorrect API key", "type": "invalid_request_error", "code": "invalid_api_key" }
        })))
        .mount(&server)
        .await;

    let backend = OpenAIBackend::new(config_for(&server)).unwrap();
    let err = backend.generate("x").await.unwrap_err();
    assert!(matches!(err, Error::Config(ref msg) if msg.contains("Incorrect API key")));
    assert!(!err.is_transient());
}

#[tokio::test]
async fn test_server_error_is_transient() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(503).set_body_string("upstream down"))
        .mount(&server)
        .await;

    let backend = OpenAIBackend::new(config_for(&server)).unwrap();
    let err = backend.generate("x").await.unwrap_err();
    assert!(err.is_transient(), "{:?}", err);
}

#[tokio::test]
async fn test_null_content_yields_empty_and_summarizer_rejects() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(chat_response(serde_json::Value::Null)),
        )
        .mount(&server)
        .await;

    let backend = OpenAIBackend::new(config_for(&server)).unwrap();
    assert_eq!(backend.generate("x").await.unwrap(), "");

    let summarizer = Summarizer::new(Arc::new(backend));
    assert!(matches!(
        summarizer.summarize("x").await,
        Err(Error::Inference(_))
    ));
}
