//! Read-only proxy to the public Bluesky API

use std::sync::Arc;

use axum::extract::{Path, RawQuery, State};
use axum::http::{HeaderValue, header};
use axum::response::{IntoResponse, Response};

use crate::server::{AppState, ServerError};

/// `com.atproto.*` methods that are safe to expose
const ATPROTO_READS: &[&str] = &[
    "com.atproto.identity.resolveHandle",
    "com.atproto.repo.getRecord",
    "com.atproto.repo.listRecords",
    "com.atproto.repo.describeRepo",
];

/// Whether `nsid` names a read-only method the proxy may forward
pub fn is_allowed(nsid: &str) -> bool {
    let well_formed = !nsid.is_empty()
        && nsid.len() <= 128
        && nsid.split('.').count() >= 3
        && nsid.split('.').all(|seg| !seg.is_empty())
        && nsid.chars().all(|c| c.is_ascii_alphanumeric() || c == '.');
    if !well_formed {
        return false;
    }

    if let Some(rest) = nsid.strip_prefix("app.bsky.") {
        let method = rest.rsplit('.').next().unwrap_or_default();
        return method.starts_with("get") || method.starts_with("search");
    }

    ATPROTO_READS.contains(&nsid)
}

/// `GET /api/bsky/{nsid}?…`
pub async fn proxy(
    State(state): State<Arc<AppState>>,
    Path(nsid): Path<String>,
    RawQuery(query): RawQuery,
) -> Result<Response, ServerError> {
    if !is_allowed(&nsid) {
        return Err(ServerError::BadRequest(format!("method not allowed: {nsid}")));
    }

    let (status, content_type, body) = state
        .public
        .xrpc()
        .forward(&nsid, query.as_deref())
        .await
        .map_err(ServerError::upstream)?;

    tracing::debug!(%nsid, %status, "proxied");

    let mut response = (status, body).into_response();
    let content_type = content_type
        .and_then(|ct| HeaderValue::from_str(&ct).ok())
        .unwrap_or_else(|| HeaderValue::from_static("application/json"));
    response.headers_mut().insert(header::CONTENT_TYPE, content_type);
    Ok(response)
}
