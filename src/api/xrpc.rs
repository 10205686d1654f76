//! Minimal XRPC transport over reqwest
//!
//! Queries are `GET /xrpc/{nsid}?params`, procedures are `POST /xrpc/{nsid}`
//! with a JSON body. Non-2xx responses carry `{error, message}` and are
//! surfaced as [`XrpcError::Api`].

use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors returned by XRPC calls
#[derive(Debug, Error)]
pub enum XrpcError {
    /// The server answered with an error body
    #[error("{method} failed ({status}): {error}: {message}")]
    Api {
        /// NSID of the method that failed
        method: String,
        /// HTTP status code
        status: u16,
        /// Error name, e.g. `ExpiredToken`
        error: String,
        /// Human-readable message
        message: String,
    },
    /// Transport failure
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// Response body didn't match the expected shape
    #[error("{method}: unexpected response: {source}")]
    Decode {
        /// NSID of the method
        method: String,
        /// Underlying JSON error
        source: serde_json::Error,
    },
}

impl XrpcError {
    /// The access token expired and the session needs a refresh
    pub fn is_expired_token(&self) -> bool {
        matches!(self, Self::Api { error, .. } if error == "ExpiredToken")
    }

    /// The requested record, post or actor doesn't exist
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::Api {
                status,
                error,
                message,
                ..
            } => {
                *status == 404
                    || matches!(error.as_str(), "RecordNotFound" | "NotFound")
                    || message.contains("Could not locate record")
            }
            _ => false,
        }
    }

    /// HTTP status, when the server answered
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// An XRPC endpoint, optionally authenticated with a bearer token
#[derive(Debug, Clone)]
pub struct Xrpc {
    http: Client,
    base: String,
    token: Option<String>,
}

impl Xrpc {
    /// Create an unauthenticated endpoint
    pub fn new(base: &str) -> Self {
        Self::with_client(Client::new(), base)
    }

    /// Create an endpoint sharing an existing HTTP client
    pub fn with_client(http: Client, base: &str) -> Self {
        Self {
            http,
            base: base.trim_end_matches('/').to_string(),
            token: None,
        }
    }

    /// Base URL (no trailing slash)
    pub fn base(&self) -> &str {
        &self.base
    }

    /// Underlying HTTP client
    pub const fn http(&self) -> &Client {
        &self.http
    }

    /// Set the bearer token used for subsequent calls
    pub fn set_token(&mut self, token: Option<String>) {
        self.token = token;
    }

    /// Builder-style variant of [`Self::set_token`]
    pub fn authed(mut self, token: &str) -> Self {
        self.token = Some(token.to_string());
        self
    }

    fn url(&self, method: &str) -> String {
        format!("{}/xrpc/{}", self.base, method)
    }

    fn auth(&self, req: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    /// Call a query method
    pub async fn query<T, Q>(&self, method: &str, params: &Q) -> Result<T, XrpcError>
    where
        T: DeserializeOwned,
        Q: Serialize + ?Sized,
    {
        tracing::debug!(method, "xrpc query");
        let req = self.auth(self.http.get(self.url(method)).query(params));
        let bytes = send(method, req).await?;
        decode(method, &bytes)
    }

    /// Call a procedure with a JSON body
    pub async fn procedure<T, B>(&self, method: &str, body: &B) -> Result<T, XrpcError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        tracing::debug!(method, "xrpc procedure");
        let req = self.auth(self.http.post(self.url(method)).json(body));
        let bytes = send(method, req).await?;
        decode(method, &bytes)
    }

    /// Call a procedure whose output is ignored
    pub async fn procedure_unit<B>(&self, method: &str, body: &B) -> Result<(), XrpcError>
    where
        B: Serialize + ?Sized,
    {
        tracing::debug!(method, "xrpc procedure");
        let req = self.auth(self.http.post(self.url(method)).json(body));
        send(method, req).await.map(|_| ())
    }

    /// Call a procedure with no input body (e.g. `refreshSession`)
    pub async fn procedure_empty<T: DeserializeOwned>(&self, method: &str) -> Result<T, XrpcError> {
        let req = self.auth(self.http.post(self.url(method)));
        let bytes = send(method, req).await?;
        decode(method, &bytes)
    }

    /// Call a procedure with a raw binary body (`uploadBlob`)
    pub async fn upload<T: DeserializeOwned>(
        &self,
        method: &str,
        content_type: &str,
        data: Vec<u8>,
    ) -> Result<T, XrpcError> {
        tracing::debug!(method, size = data.len(), "xrpc upload");
        let req = self.auth(
            self.http
                .post(self.url(method))
                .header(reqwest::header::CONTENT_TYPE, content_type)
                .body(data),
        );
        let bytes = send(method, req).await?;
        decode(method, &bytes)
    }

    /// Forward a raw query string and hand back status, content type and body untouched
    pub async fn forward(
        &self,
        method: &str,
        raw_query: Option<&str>,
    ) -> Result<(StatusCode, Option<String>, bytes::Bytes), XrpcError> {
        let mut url = self.url(method);
        if let Some(q) = raw_query.filter(|q| !q.is_empty()) {
            url.push('?');
            url.push_str(q);
        }
        let response = self.auth(self.http.get(url)).send().await?;
        let status = response.status();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.bytes().await?;
        Ok((status, content_type, body))
    }
}

async fn send(method: &str, req: RequestBuilder) -> Result<bytes::Bytes, XrpcError> {
    let response = req.send().await?;
    let status = response.status();
    let bytes = response.bytes().await?;

    if status.is_success() {
        return Ok(bytes);
    }

    let body: ErrorBody = serde_json::from_slice(&bytes).unwrap_or_default();
    let err = XrpcError::Api {
        method: method.to_string(),
        status: status.as_u16(),
        error: body.error.unwrap_or_else(|| "Unknown".to_string()),
        message: body
            .message
            .unwrap_or_else(|| String::from_utf8_lossy(&bytes).into_owned()),
    };
    tracing::debug!(%err, "xrpc error");
    Err(err)
}

fn decode<T: DeserializeOwned>(method: &str, bytes: &[u8]) -> Result<T, XrpcError> {
    let bytes: &[u8] = if bytes.is_empty() { b"null" } else { bytes };
    serde_json::from_slice(bytes).map_err(|source| XrpcError::Decode {
        method: method.to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Json, Router, http::StatusCode as AxStatus, routing::get};
    use serde_json::{Value, json};

    fn api_error(status: u16, error: &str, message: &str) -> XrpcError {
        XrpcError::Api {
            method: "m".into(),
            status,
            error: error.into(),
            message: message.into(),
        }
    }

    #[test]
    fn test_error_classification() {
        assert!(api_error(400, "ExpiredToken", "Token has expired").is_expired_token());
        assert!(!api_error(401, "AuthRequired", "").is_expired_token());

        assert!(api_error(400, "RecordNotFound", "").is_not_found());
        assert!(api_error(400, "InvalidRequest", "Could not locate record: at://x").is_not_found());
        assert!(api_error(404, "Unknown", "").is_not_found());
        assert!(!api_error(500, "InternalServerError", "").is_not_found());
    }

    #[tokio::test]
    async fn test_query_sends_params_and_token() {
        let router = Router::new().route(
            "/xrpc/app.bsky.actor.getProfile",
            get(
                |headers: axum::http::HeaderMap,
                 axum::extract::Query(q): axum::extract::Query<std::collections::HashMap<String, String>>| async move {
                    let auth = headers
                        .get("authorization")
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or_default()
                        .to_string();
                    Json(json!({"actor": q.get("actor"), "auth": auth}))
                },
            ),
        );
        let base = crate::testutil::serve(router).await;

        let xrpc = Xrpc::new(&base).authed("jwt-1");
        let out: Value = xrpc
            .query("app.bsky.actor.getProfile", &[("actor", "bob.test")])
            .await
            .unwrap();
        assert_eq!(out["actor"], "bob.test");
        assert_eq!(out["auth"], "Bearer jwt-1");
    }

    #[tokio::test]
    async fn test_error_body_is_typed() {
        let router = Router::new().route(
            "/xrpc/app.bsky.feed.getTimeline",
            get(|| async {
                (
                    AxStatus::BAD_REQUEST,
                    Json(json!({"error": "ExpiredToken", "message": "Token has expired"})),
                )
            }),
        );
        let base = crate::testutil::serve(router).await;

        let err = Xrpc::new(&base)
            .query::<Value, _>("app.bsky.feed.getTimeline", &[("limit", "1")])
            .await
            .unwrap_err();
        assert!(err.is_expired_token());
        assert_eq!(err.status(), Some(400));
    }

    #[tokio::test]
    async fn test_non_json_error_keeps_body_text() {
        let router = Router::new().route(
            "/xrpc/x.y.z",
            get(|| async { (AxStatus::BAD_GATEWAY, "upstream down") }),
        );
        let base = crate::testutil::serve(router).await;

        let err = Xrpc::new(&base).query::<Value, _>("x.y.z", &[] as &[(&str, &str)]).await.unwrap_err();
        match err {
            XrpcError::Api { error, message, .. } => {
                assert_eq!(error, "Unknown");
                assert_eq!(message, "upstream down");
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
