//! Unauthenticated client for the public AppView

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;

use super::PostLookup;
use super::bluesky::{fetch_posts, resolve_handle};
use super::records::{APP_COLLECTION, RawRecord, RecordEntry};
use super::xrpc::{Xrpc, XrpcError};
use crate::models::{Post, Profile};

/// Public, read-only Bluesky API
pub const PUBLIC_API_URL: &str = "https://public.api.bsky.app";

/// Read-only client that needs no session
#[derive(Debug, Clone)]
pub struct PublicClient {
    xrpc: Xrpc,
}

impl Default for PublicClient {
    fn default() -> Self {
        Self::new(PUBLIC_API_URL)
    }
}

impl PublicClient {
    /// Client for the AppView at `base`
    pub fn new(base: &str) -> Self {
        Self {
            xrpc: Xrpc::new(base),
        }
    }

    /// Base URL
    pub fn base(&self) -> &str {
        self.xrpc.base()
    }

    /// Underlying XRPC endpoint
    pub const fn xrpc(&self) -> &Xrpc {
        &self.xrpc
    }

    /// A profile by handle or DID
    pub async fn profile(&self, actor: &str) -> Result<Profile> {
        self.xrpc
            .query("app.bsky.actor.getProfile", &[("actor", actor)])
            .await
            .with_context(|| format!("Failed to fetch profile {actor}"))
    }

    /// Resolve a handle to a DID
    pub async fn resolve_handle(&self, handle: &str) -> Result<String> {
        resolve_handle(&self.xrpc, handle).await
    }

    /// Read any record as raw JSON; `None` when it doesn't exist
    pub async fn get_record<T: DeserializeOwned>(
        &self,
        repo: &str,
        collection: &str,
        rkey: &str,
    ) -> Result<Option<T>> {
        #[derive(serde::Deserialize)]
        struct Envelope<T> {
            value: T,
        }

        let result: Result<Envelope<T>, XrpcError> = self
            .xrpc
            .query(
                "com.atproto.repo.getRecord",
                &[("repo", repo), ("collection", collection), ("rkey", rkey)],
            )
            .await;

        match result {
            Ok(envelope) => Ok(Some(envelope.value)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e).with_context(|| format!("Failed to read {collection}/{rkey} from {repo}")),
        }
    }

    /// Read an app record from someone's repository
    pub async fn get_app_record(&self, repo: &str, rkey: &str) -> Result<Option<RecordEntry>> {
        let result: Result<RawRecord, XrpcError> = self
            .xrpc
            .query(
                "com.atproto.repo.getRecord",
                &[("repo", repo), ("collection", APP_COLLECTION), ("rkey", rkey)],
            )
            .await;

        match result {
            Ok(raw) => Ok(raw.decode()),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e).with_context(|| format!("Failed to read app record {rkey} from {repo}")),
        }
    }
}

impl PostLookup for PublicClient {
    async fn posts(&self, uris: &[String]) -> Result<Vec<Post>> {
        fetch_posts(&self.xrpc, uris).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::AppRecord;
    use axum::extract::Query;
    use axum::http::StatusCode;
    use axum::routing::get;
    use axum::{Json, Router};
    use serde_json::{Value, json};
    use std::collections::HashMap;

    fn mock() -> Router {
        Router::new().route(
            "/xrpc/com.atproto.repo.getRecord",
            get(|Query(q): Query<HashMap<String, String>>| async move {
                match q["rkey"].as_str() {
                    "did:plc:paid" => Ok(Json(json!({
                        "uri": "at://did:plc:app/app.skyloft.state/did:plc:paid",
                        "cid": "c",
                        "value": {
                            "$type": APP_COLLECTION, "kind": "verification",
                            "subject": "did:plc:paid", "orderId": "O1",
                            "amount": "5.00", "currency": "USD",
                            "verifiedAt": "2024-01-01T00:00:00Z"
                        }
                    }))),
                    "boom" => Err((StatusCode::INTERNAL_SERVER_ERROR, Json(json!({"error": "InternalServerError"})))),
                    _ => Err((
                        StatusCode::BAD_REQUEST,
                        Json(json!({"error": "RecordNotFound", "message": "Could not locate record"})),
                    )),
                }
            }),
        )
    }

    #[tokio::test]
    async fn test_get_app_record() {
        let base = crate::testutil::serve(mock()).await;
        let client = PublicClient::new(&base);

        let entry = client.get_app_record("did:plc:app", "did:plc:paid").await.unwrap().unwrap();
        assert!(matches!(entry.value, AppRecord::Verification { ref order_id, .. } if order_id == "O1"));

        assert!(client.get_app_record("did:plc:app", "did:plc:nobody").await.unwrap().is_none());
        assert!(client.get_app_record("did:plc:app", "boom").await.is_err());
    }

    #[tokio::test]
    async fn test_get_record_raw() {
        let base = crate::testutil::serve(mock()).await;
        let client = PublicClient::new(&base);

        let value: Value = client
            .get_record("did:plc:app", APP_COLLECTION, "did:plc:paid")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(value["kind"], "verification");
    }
}
