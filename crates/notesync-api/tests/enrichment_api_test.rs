//! Enrichment endpoint over a real listener.

use std::sync::Arc;

use serde_json::{json, Value};
use uuid::Uuid;

use notesync_api::{router, AppState};
use notesync_core::{NewNote, RemoteStore};
use notesync_inference::mock::MockGenerationBackend;
use notesync_inference::Summarizer;
use notesync_store::{Fault, MemoryRemoteStore, StoreOp};

struct TestServer {
    base: String,
    store: MemoryRemoteStore,
    backend: MockGenerationBackend,
    client: reqwest::Client,
}

async fn spawn_server(backend: MockGenerationBackend) -> TestServer {
    let store = MemoryRemoteStore::new();
    let state = AppState::new(
        Summarizer::new(Arc::new(backend.clone())),
        Arc::new(store.clone()),
    );
    let app = router(state, None);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestServer {
        base: format!("http://{}", addr),
        store,
        backend,
        client: reqwest::Client::new(),
    }
}

impl TestServer {
    async fn note(&self, title: &str, body: &str) -> Uuid {
        self.store
            .create(NewNote {
                owner_id: "alice".to_string(),
                title: title.to_string(),
                body: body.to_string(),
            })
            .await
            .unwrap()
    }

    async fn post(&self, path: &str, body: Value) -> (u16, Value) {
        let response = self
            .client
            .post(format!("{}{}", self.base, path))
            .json(&body)
            .send()
            .await
            .unwrap();
        let status = response.status().as_u16();
        let body = response.json::<Value>().await.unwrap_or(Value::Null);
        (status, body)
    }
}

#[tokio::test]
async fn test_summary_written_back_to_note() {
    let server =
        spawn_server(MockGenerationBackend::new().with_fixed_response("  A grocery list.  ")).await;
    let id = server.note("Groceries", "milk, eggs").await;
    let before = server.store.get(id).unwrap();

    let (status, body) = server
        .post(
            "/generateNoteSummary",
            json!({"noteId": id.to_string(), "title": "Groceries", "content": "milk, eggs"}),
        )
        .await;

    assert_eq!(status, 200);
    assert_eq!(body["summary"], "A grocery list.");

    let after = server.store.get(id).unwrap();
    assert_eq!(after.summary.as_deref(), Some("A grocery list."));
    assert_eq!(after.title, before.title);
    assert_eq!(after.body, before.body);
    assert!(after.updated_at > before.updated_at);

    let calls = server.backend.get_calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].prompt, "Groceries\n\nmilk, eggs");
}

#[tokio::test]
async fn test_versioned_route_is_equivalent() {
    let server = spawn_server(MockGenerationBackend::new()).await;
    let id = server.note("", "body only").await;

    let (status, body) = server
        .post(
            "/api/v1/notes/summary",
            json!({"noteId": id.to_string(), "content": "body only"}),
        )
        .await;

    assert_eq!(status, 200);
    assert_eq!(body["summary"], "Mock summary.");
    assert_eq!(server.backend.get_calls()[0].prompt, "body only");
}

#[tokio::test]
async fn test_null_title_summarizes_content() {
    let server = spawn_server(MockGenerationBackend::new()).await;
    let id = server.note("", "x").await;

    let (status, body) = server
        .post(
            "/generateNoteSummary",
            json!({"noteId": id.to_string(), "title": null, "content": "x"}),
        )
        .await;

    assert_eq!(status, 200);
    assert_eq!(body["summary"], "Mock summary.");
    assert_eq!(server.backend.get_calls()[0].prompt, "x");
}

#[tokio::test]
async fn test_missing_note_id_is_bad_request() {
    let server = spawn_server(MockGenerationBackend::new()).await;

    for payload in [
        json!({"title": "t", "content": "c"}),
        json!({"noteId": "", "title": "t", "content": "c"}),
    ] {
        let (status, body) = server.post("/generateNoteSummary", payload).await;
        assert_eq!(status, 400);
        assert_eq!(body["error"], "Missing noteId");
    }
    assert_eq!(server.backend.generate_call_count(), 0);
}

#[tokio::test]
async fn test_empty_text_is_bad_request() {
    let server = spawn_server(MockGenerationBackend::new()).await;
    let id = server.note("", "").await;

    let (status, body) = server
        .post(
            "/generateNoteSummary",
            json!({"noteId": id.to_string(), "title": "", "content": "  \n "}),
        )
        .await;

    assert_eq!(status, 400);
    assert!(body["error"].is_string());
    assert_eq!(server.backend.generate_call_count(), 0);
    assert!(server.store.get(id).unwrap().summary.is_none());
}

#[tokio::test]
async fn test_malformed_json_is_bad_request() {
    let server = spawn_server(MockGenerationBackend::new()).await;

    let response = server
        .client
        .post(format!("{}/generateNoteSummary", server.base))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status().as_u16(), 400);
    let body: Value = response.json().await.unwrap();
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn test_generation_failure_is_generic_500() {
    let server =
        spawn_server(MockGenerationBackend::new().with_failure("upstream exploded")).await;
    let id = server.note("t", "c").await;

    let (status, body) = server
        .post(
            "/generateNoteSummary",
            json!({"noteId": id.to_string(), "title": "t", "content": "c"}),
        )
        .await;

    assert_eq!(status, 500);
    assert_eq!(body["error"], "Failed to generate summary");
    assert!(server.store.get(id).unwrap().summary.is_none());
}

#[tokio::test]
async fn test_blank_generation_is_500() {
    let server = spawn_server(MockGenerationBackend::new().with_fixed_response("   ")).await;
    let id = server.note("t", "c").await;

    let (status, _) = server
        .post(
            "/generateNoteSummary",
            json!({"noteId": id.to_string(), "title": "t", "content": "c"}),
        )
        .await;

    assert_eq!(status, 500);
    assert!(server.store.get(id).unwrap().summary.is_none());
}

#[tokio::test]
async fn test_store_failure_is_generic_500() {
    let server = spawn_server(MockGenerationBackend::new()).await;
    let id = server.note("t", "c").await;
    server.store.inject_fault(StoreOp::Patch, Fault::PermissionDenied);

    let (status, body) = server
        .post(
            "/generateNoteSummary",
            json!({"noteId": id.to_string(), "title": "t", "content": "c"}),
        )
        .await;

    assert_eq!(status, 500);
    assert_eq!(body["error"], "Failed to save summary");
}

#[tokio::test]
async fn test_unknown_note_is_500() {
    let server = spawn_server(MockGenerationBackend::new()).await;

    let (status, _) = server
        .post(
            "/generateNoteSummary",
            json!({"noteId": Uuid::now_v7().to_string(), "title": "t", "content": "c"}),
        )
        .await;

    assert_eq!(status, 500);
}

#[tokio::test]
async fn test_non_post_is_method_not_allowed() {
    let server = spawn_server(MockGenerationBackend::new()).await;

    let response = server
        .client
        .get(format!("{}/generateNoteSummary", server.base))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status().as_u16(), 405);
}

#[tokio::test]
async fn test_cors_allows_any_origin() {
    let server = spawn_server(MockGenerationBackend::new()).await;

    let response = server
        .client
        .request(
            reqwest::Method::OPTIONS,
            format!("{}/generateNoteSummary", server.base),
        )
        .header("origin", "https://notes.example.com")
        .header("access-control-request-method", "POST")
        .send()
        .await
        .unwrap();

    assert!(response.status().is_success());
    assert_eq!(
        response
            .headers()
            .get("access-control-allow-origin")
            .and_then(|v| v.to_str().ok()),
        Some("*")
    );
}

#[tokio::test]
async fn test_health() {
    let server = spawn_server(MockGenerationBackend::new()).await;
    let response = server
        .client
        .get(format!("{}/health", server.base))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "healthy");
}
