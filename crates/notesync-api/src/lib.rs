//! # notesync-api
//!
//! Enrichment service: `POST /generateNoteSummary` summarizes a note's text
//! and writes the summary back through the remote store. The client sees the
//! result through its subscription like any other change.

pub mod config;
pub mod error;
pub mod handlers;

use std::path::Path;
use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use notesync_core::RemoteStore;
use notesync_inference::Summarizer;

pub use config::{ServerConfig, StoreKind};
pub use error::ApiError;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub summarizer: Summarizer,
    pub store: Arc<dyn RemoteStore>,
}

impl AppState {
    pub fn new(summarizer: Summarizer, store: Arc<dyn RemoteStore>) -> Self {
        Self { summarizer, store }
    }
}

/// Build the router. Other methods on the summary routes get 405.
///
/// Any origin may call the service; it is invoked from browsers.
pub fn router(state: AppState, blob_root: Option<&Path>) -> Router {
    let mut app = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/generateNoteSummary", post(handlers::generate_note_summary))
        .route(
            "/api/v1/notes/summary",
            post(handlers::generate_note_summary),
        );

    if let Some(root) = blob_root {
        app = app.nest_service("/blobs", ServeDir::new(root));
    }

    app.layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive()),
    )
    .with_state(state)
}
