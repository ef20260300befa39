//! HTTP enrichment trigger against a mock server.

use serde_json::json;
use uuid::Uuid;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use notesync_client::{EnrichmentConfig, HttpEnrichmentClient};
use notesync_core::{EnrichmentRequest, EnrichmentTrigger, Error};

fn client_for(server: &MockServer) -> HttpEnrichmentClient {
    HttpEnrichmentClient::new(EnrichmentConfig {
        url: format!("{}/generateNoteSummary", server.uri()),
        timeout_seconds: 5,
    })
    .unwrap()
}

#[tokio::test]
async fn test_posts_camel_case_body() {
    let server = MockServer::start().await;
    let id = Uuid::now_v7();

    Mock::given(method("POST"))
        .and(path("/generateNoteSummary"))
        .and(header("content-type", "application/json"))
        .and(body_json(json!({
            "noteId": id.to_string(),
            "title": "Groceries",
            "content": "milk, eggs"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"summary": "A list."})))
        .expect(1)
        .mount(&server)
        .await;

    client_for(&server)
        .request_summary(EnrichmentRequest::new(id, "Groceries", "milk, eggs"))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_error_body_is_surfaced() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({"error": "Missing noteId"})))
        .mount(&server)
        .await;

    let err = client_for(&server)
        .request_summary(EnrichmentRequest::new(Uuid::nil(), "t", ""))
        .await
        .unwrap_err();

    match err {
        Error::Request(message) => {
            assert!(message.contains("400"));
            assert!(message.contains("Missing noteId"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_server_error_without_body() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let result = client_for(&server)
        .request_summary(EnrichmentRequest::new(Uuid::nil(), "t", "c"))
        .await;
    assert!(matches!(result, Err(Error::Request(_))));
}

#[tokio::test]
async fn test_unreachable_service() {
    let client = HttpEnrichmentClient::new(EnrichmentConfig {
        url: "http://127.0.0.1:1/generateNoteSummary".to_string(),
        timeout_seconds: 2,
    })
    .unwrap();

    let result = client
        .request_summary(EnrichmentRequest::new(Uuid::nil(), "t", "c"))
        .await;
    assert!(matches!(result, Err(Error::Request(_))));
}
