//! In-memory view counters

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use serde::Serialize;

use crate::server::{AppState, ServerError};

/// Longest accepted counter key
pub const MAX_KEY_LEN: usize = 512;

/// A counter value
#[derive(Debug, Serialize)]
pub struct ViewCount {
    key: String,
    views: u64,
}

fn check_key(key: &str) -> Result<(), ServerError> {
    if key.trim().is_empty() || key.len() > MAX_KEY_LEN {
        return Err(ServerError::BadRequest("invalid view key".into()));
    }
    Ok(())
}

/// `GET /api/views/{key}`
pub async fn get_views(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
) -> Result<Json<ViewCount>, ServerError> {
    check_key(&key)?;
    let views = state.views.get(&key).map_or(0, |v| *v);
    Ok(Json(ViewCount { key, views }))
}

/// `POST /api/views/{key}`
pub async fn record_view(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
) -> Result<Json<ViewCount>, ServerError> {
    check_key(&key)?;
    let views = {
        let mut entry = state.views.entry(key.clone()).or_insert(0);
        *entry += 1;
        *entry
    };
    Ok(Json(ViewCount { key, views }))
}
