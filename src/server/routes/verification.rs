//! Badge lookup endpoint

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};

use crate::server::{AppState, ServerError};
use crate::verification::{VerificationStatus, is_valid_did, is_verified};

/// `GET /api/verification/{did}`
pub async fn status(
    State(state): State<Arc<AppState>>,
    Path(did): Path<String>,
) -> Result<Json<VerificationStatus>, ServerError> {
    if !is_valid_did(&did) {
        return Err(ServerError::BadRequest(format!("invalid DID: {did}")));
    }
    let app_did = state.app_did().await?;
    let status = is_verified(&state.public, app_did, &did)
        .await
        .map_err(ServerError::upstream)?;
    Ok(Json(status))
}
