//! AI text generation endpoint

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use serde::Serialize;

use crate::assist::GenerateRequest;
use crate::server::{AppState, ServerError};

/// Longest prompt accepted, in characters
pub const MAX_PROMPT_CHARS: usize = 4000;

/// Generated text
#[derive(Debug, Serialize)]
pub struct GenerateResponse {
    text: String,
}

/// `POST /api/generate`
pub async fn generate(
    State(state): State<Arc<AppState>>,
    Json(request): Json<GenerateRequest>,
) -> Result<Json<GenerateResponse>, ServerError> {
    if request.prompt.trim().is_empty() {
        return Err(ServerError::BadRequest("prompt is empty".into()));
    }
    if request.prompt.chars().count() > MAX_PROMPT_CHARS {
        return Err(ServerError::BadRequest(format!(
            "prompt is longer than {MAX_PROMPT_CHARS} characters"
        )));
    }

    let llm = state.llm.as_ref().ok_or(ServerError::NotConfigured("LLM"))?;
    let text = llm.generate(&request).await.map_err(ServerError::upstream)?;

    Ok(Json(GenerateResponse { text }))
}
