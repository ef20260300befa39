//! HTTP handlers.

use std::time::Instant;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use tracing::{error, info};
use uuid::Uuid;

use notesync_core::{EnrichmentRequest, EnrichmentResponse, NotePatch};

use crate::error::ApiError;
use crate::AppState;

pub async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Summarize a note and write the summary back to it.
pub async fn generate_note_summary(
    State(state): State<AppState>,
    payload: Result<Json<EnrichmentRequest>, JsonRejection>,
) -> Result<Json<EnrichmentResponse>, ApiError> {
    let Json(request) = payload?;
    let start = Instant::now();

    let note_id = match request.note_id.as_deref().map(str::trim) {
        None | Some("") => return Err(ApiError::BadRequest("Missing noteId".to_string())),
        Some(raw) => Uuid::parse_str(raw)
            .map_err(|_| ApiError::BadRequest(format!("Invalid noteId: {}", raw)))?,
    };

    let text = request.text();
    if text.is_empty() {
        return Err(ApiError::BadRequest("No content to summarize".to_string()));
    }

    let summary = state.summarizer.summarize(&text).await.map_err(|e| {
        error!(
            subsystem = "api",
            component = "enrichment",
            note_id = %note_id,
            model = %state.summarizer.model_name(),
            error = %e,
            "Summary generation failed"
        );
        ApiError::Internal("Failed to generate summary")
    })?;

    state
        .store
        .patch(note_id, NotePatch::summary(summary.clone()))
        .await
        .map_err(|e| {
            error!(
                subsystem = "api",
                component = "enrichment",
                note_id = %note_id,
                error = %e,
                "Summary write failed"
            );
            ApiError::Internal("Failed to save summary")
        })?;

    info!(
        subsystem = "api",
        component = "enrichment",
        op = "generate_note_summary",
        note_id = %note_id,
        prompt_len = text.len(),
        response_len = summary.len(),
        duration_ms = start.elapsed().as_millis() as u64,
        "Summary stored"
    );
    Ok(Json(EnrichmentResponse { summary }))
}
