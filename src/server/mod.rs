//! Companion HTTP service
//!
//! Small stateless handlers the terminal client leans on for things it
//! can't do alone: a read-only proxy to the public Bluesky API, AI text
//! generation, PayPal checkout for verification badges, badge lookups and
//! in-memory view counters.

pub mod error;
pub mod routes;
pub mod state;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::Router;
use axum::routing::{get, post};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::config::{Secrets, ServerConfig};

pub use error::ServerError;
pub use state::AppState;

/// Run the service until Ctrl-C or SIGTERM
pub async fn run_server(config: ServerConfig, secrets: Secrets) -> Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.bind, config.port)
        .parse()
        .with_context(|| format!("Invalid bind address {}:{}", config.bind, config.port))?;
    let timeout = config.timeout_secs;

    let state = Arc::new(AppState::new(config, secrets));
    let app = create_router(state, timeout);

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!("Skyloft companion listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Build the router with all routes and middleware
pub fn create_router(state: Arc<AppState>, timeout_secs: u64) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let middleware = ServiceBuilder::new()
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(timeout_secs)))
        .layer(cors);

    Router::new()
        .route("/health", get(routes::health::health_check))
        .route("/api/bsky/{nsid}", get(routes::bsky::proxy))
        .route("/api/generate", post(routes::generate::generate))
        .route("/api/paypal/orders", post(routes::paypal::create_order))
        .route("/api/paypal/orders/{id}/capture", post(routes::paypal::capture_order))
        .route("/paypal/return", get(routes::paypal::paypal_return))
        .route("/paypal/cancel", get(routes::paypal::paypal_cancel))
        .route("/api/verification/{did}", get(routes::verification::status))
        .route(
            "/api/views/{key}",
            get(routes::views::get_views).post(routes::views::record_view),
        )
        .layer(middleware)
        .with_state(state)
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => warn!("Received Ctrl+C, shutting down"),
        () = terminate => warn!("Received SIGTERM, shutting down"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::companion::CompanionClient;
    use axum::body::{Body, to_bytes};
    use axum::extract::{Path, Query, RawQuery, State};
    use axum::http::{Request, StatusCode};
    use axum::{Json, Router};
    use serde_json::{Value, json};
    use std::collections::HashMap;
    use std::sync::Mutex;
    use tower::ServiceExt;

    type Repo = Arc<Mutex<HashMap<String, Value>>>;

    /// One mock standing in for the AppView, the app account's PDS, PayPal and the LLM
    fn upstream(repo: Repo) -> Router {
        Router::new()
            .route(
                "/xrpc/app.bsky.actor.getProfile",
                get(|RawQuery(q): RawQuery| async move {
                    Json(json!({"did": "did:plc:bob", "handle": "bob.test", "query": q}))
                }),
            )
            .route(
                "/xrpc/app.bsky.feed.getPostThread",
                get(|| async {
                    (StatusCode::BAD_REQUEST, Json(json!({"error": "NotFound", "message": "Post not found"})))
                }),
            )
            .route(
                "/xrpc/com.atproto.identity.resolveHandle",
                get(|| async { Json(json!({"did": "did:plc:app"})) }),
            )
            .route(
                "/xrpc/com.atproto.server.createSession",
                post(|| async {
                    Json(json!({"did": "did:plc:app", "handle": "app.test",
                                "accessJwt": "a", "refreshJwt": "r"}))
                }),
            )
            .route(
                "/xrpc/com.atproto.repo.putRecord",
                post(|State(repo): State<Repo>, Json(body): Json<Value>| async move {
                    let rkey = body["rkey"].as_str().unwrap().to_string();
                    repo.lock().unwrap().insert(rkey.clone(), body["record"].clone());
                    Json(json!({"uri": format!("at://did:plc:app/app.skyloft.state/{rkey}"), "cid": "c"}))
                }),
            )
            .route(
                "/xrpc/com.atproto.repo.getRecord",
                get(|State(repo): State<Repo>, Query(q): Query<HashMap<String, String>>| async move {
                    match repo.lock().unwrap().get(&q["rkey"]) {
                        Some(value) => Ok(Json(json!({
                            "uri": format!("at://{}/{}/{}", q["repo"], q["collection"], q["rkey"]),
                            "cid": "c",
                            "value": value
                        }))),
                        None => Err((
                            StatusCode::BAD_REQUEST,
                            Json(json!({"error": "RecordNotFound", "message": "Could not locate record"})),
                        )),
                    }
                }),
            )
            .route(
                "/v1/oauth2/token",
                post(|| async { Json(json!({"access_token": "tok", "expires_in": 3600})) }),
            )
            .route(
                "/v2/checkout/orders",
                post(|Json(body): Json<Value>| async move {
                    let did = body["purchase_units"][0]["custom_id"].as_str().unwrap().to_string();
                    Json(json!({
                        "id": "ORDER1",
                        "status": "CREATED",
                        "links": [{"href": format!("https://paypal.test/approve?did={did}"), "rel": "payer-action"}]
                    }))
                }),
            )
            .route(
                "/v2/checkout/orders/{id}/capture",
                post(|State(repo): State<Repo>, Path(id): Path<String>| async move {
                    // PayPal refuses to capture an order twice
                    let marker = format!("captured:{id}");
                    if repo.lock().unwrap().insert(marker, json!(true)).is_some() {
                        return Err((
                            StatusCode::UNPROCESSABLE_ENTITY,
                            Json(json!({
                                "name": "UNPROCESSABLE_ENTITY",
                                "details": [{"issue": "ORDER_ALREADY_CAPTURED"}]
                            })),
                        ));
                    }
                    let status = if id == "PENDING1" { "PAYER_ACTION_REQUIRED" } else { "COMPLETED" };
                    Ok(Json(paypal_order(&id, status)))
                }),
            )
            .route(
                "/v2/checkout/orders/{id}",
                get(|Path(id): Path<String>| async move { Json(paypal_order(&id, "COMPLETED")) }),
            )
            .route(
                "/chat/completions",
                post(|Json(body): Json<Value>| async move {
                    let user = body["messages"][1]["content"].as_str().unwrap_or_default().to_string();
                    if user.contains("fail") {
                        return Err((StatusCode::INTERNAL_SERVER_ERROR, "model crashed"));
                    }
                    Ok(Json(json!({"choices": [{"message": {"content": format!("echo: {user}")}}]})))
                }),
            )
            .with_state(repo)
    }

    fn paypal_order(id: &str, status: &str) -> Value {
        json!({
            "id": id,
            "status": status,
            "purchase_units": [{"payments": {"captures": [{
                "custom_id": "did:plc:buyer",
                "amount": {"currency_code": "USD", "value": "5.00"}
            }]}}]
        })
    }

    async fn configured() -> (Arc<AppState>, Repo) {
        let repo = Repo::default();
        let base = crate::testutil::serve(upstream(repo.clone())).await;

        let mut config = ServerConfig::default();
        config.public_api = base.clone();
        config.app_pds = base.clone();
        config.app_handle = "app.test".into();
        config.llm.base_url = base.clone();
        config.paypal.base_url = base;

        let secrets = Secrets {
            llm_api_key: Some("sk".into()),
            paypal: Some(("id".into(), "secret".into())),
            app_password: Some("pw".into()),
        };
        (Arc::new(AppState::new(config, secrets)), repo)
    }

    fn bare() -> Router {
        let state = Arc::new(AppState::new(ServerConfig::default(), Secrets::default()));
        create_router(state, 30)
    }

    async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Vec<u8>) {
        let mut req = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(v) => {
                req = req.header("content-type", "application/json");
                Body::from(v.to_string())
            }
            None => Body::empty(),
        };
        let response = app.clone().oneshot(req.body(body).unwrap()).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, bytes.to_vec())
    }

    fn json_of(bytes: &[u8]) -> Value {
        serde_json::from_slice(bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let (status, body) = call(&bare(), "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        let body = json_of(&body);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["version"], crate::VERSION);
        assert_eq!(body["llm"], false);
    }

    #[tokio::test]
    async fn test_unconfigured_providers_are_503() {
        let app = bare();
        let (status, body) = call(&app, "POST", "/api/generate", Some(json!({"prompt": "hi"}))).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(json_of(&body)["status"], 503);

        let (status, _) = call(&app, "POST", "/api/paypal/orders", Some(json!({"did": "did:plc:abc"}))).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_generate_validation_and_errors() {
        let (state, _) = configured().await;
        let app = create_router(state, 30);

        let (status, _) = call(&app, "POST", "/api/generate", Some(json!({"prompt": "   "}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = call(
            &app,
            "POST",
            "/api/generate",
            Some(json!({"prompt": "tidy this", "mode": "improve"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json_of(&body)["text"], "echo: tidy this");

        let (status, _) = call(&app, "POST", "/api/generate", Some(json!({"prompt": "please fail"}))).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn test_proxy_forwards_allowed_methods_only() {
        let (state, _) = configured().await;
        let app = create_router(state, 30);

        let (status, body) = call(&app, "GET", "/api/bsky/app.bsky.actor.getProfile?actor=bob.test", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json_of(&body)["query"], "actor=bob.test");

        // upstream errors are relayed as-is
        let (status, body) = call(&app, "GET", "/api/bsky/app.bsky.feed.getPostThread?uri=at://x", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json_of(&body)["error"], "NotFound");

        let (status, _) = call(&app, "GET", "/api/bsky/com.atproto.repo.deleteRecord", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_view_counts() {
        let app = bare();
        let (_, body) = call(&app, "GET", "/api/views/post-1", None).await;
        assert_eq!(json_of(&body)["views"], 0);

        let mut tasks = Vec::new();
        for _ in 0..20 {
            let app = app.clone();
            tasks.push(tokio::spawn(async move { call(&app, "POST", "/api/views/post-1", None).await }));
        }
        for task in tasks {
            assert_eq!(task.await.unwrap().0, StatusCode::OK);
        }

        let (_, body) = call(&app, "GET", "/api/views/post-1", None).await;
        assert_eq!(json_of(&body)["views"], 20);
        let (_, body) = call(&app, "GET", "/api/views/other", None).await;
        assert_eq!(json_of(&body)["views"], 0);
    }

    #[tokio::test]
    async fn test_order_rejects_bad_did() {
        let (state, _) = configured().await;
        let app = create_router(state, 30);
        let (status, _) = call(&app, "POST", "/api/paypal/orders", Some(json!({"did": "bob.test"}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_purchase_flow_end_to_end() {
        let (state, repo) = configured().await;
        let base = crate::testutil::serve(create_router(state, 30)).await;
        let companion = CompanionClient::new(&base);

        let before = companion.verification("did:plc:buyer").await.unwrap();
        assert!(!before.verified);

        let order = companion.create_order("did:plc:buyer").await.unwrap();
        assert_eq!(order.id, "ORDER1");
        assert!(order.approve_url.ends_with("did=did:plc:buyer"));

        let report = companion.capture_order(&order.id).await.unwrap();
        assert!(report.verified);
        assert_eq!(report.did.as_deref(), Some("did:plc:buyer"));

        let stored = repo.lock().unwrap().get("did:plc:buyer").cloned().unwrap();
        assert_eq!(stored["$type"], "app.skyloft.state");
        assert_eq!(stored["kind"], "verification");
        assert_eq!(stored["orderId"], "ORDER1");

        let after = companion.verification("did:plc:buyer").await.unwrap();
        assert!(after.verified);
        assert!(after.verified_at.is_some());
    }

    #[tokio::test]
    async fn test_pending_capture_issues_no_badge() {
        let (state, repo) = configured().await;
        let app = create_router(state, 30);
        let (status, body) = call(&app, "POST", "/api/paypal/orders/PENDING1/capture", None).await;
        assert_eq!(status, StatusCode::OK);
        let body = json_of(&body);
        assert_eq!(body["verified"], false);
        assert_eq!(body["status"], "PAYER_ACTION_REQUIRED");
        assert!(repo.lock().unwrap().get("did:plc:buyer").is_none());
    }

    #[tokio::test]
    async fn test_capture_after_return_page_still_verifies() {
        let (state, _) = configured().await;
        let base = crate::testutil::serve(create_router(state.clone(), 30)).await;
        let app = create_router(state, 30);

        let (_, body) = call(&app, "GET", "/paypal/return?token=ORDER1&PayerID=P1", None).await;
        assert!(String::from_utf8(body).unwrap().contains("is now verified"));

        // the CLI captures again once the user is back in the terminal
        let report = CompanionClient::new(&base).capture_order("ORDER1").await.unwrap();
        assert_eq!(report.status, "COMPLETED");
        assert!(report.verified);
        assert_eq!(report.did.as_deref(), Some("did:plc:buyer"));
    }

    #[tokio::test]
    async fn test_return_page_captures_and_escapes() {
        let (state, _) = configured().await;
        let app = create_router(state, 30);

        let (status, body) = call(&app, "GET", "/paypal/return?token=ORDER9&PayerID=P1", None).await;
        assert_eq!(status, StatusCode::OK);
        let html = String::from_utf8(body).unwrap();
        assert!(html.contains("<code>did:plc:buyer</code> is now verified"));

        let (_, body) = call(&app, "GET", "/paypal/return?token=%3Cscript%3E", None).await;
        let html = String::from_utf8(body).unwrap();
        assert!(!html.contains("<script>"));
        assert!(html.contains("Payment failed"));

        let (status, body) = call(&app, "GET", "/paypal/cancel", None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(String::from_utf8(body).unwrap().contains("cancelled"));
    }

    #[tokio::test]
    async fn test_companion_client_views_and_generate() {
        let (state, _) = configured().await;
        let base = crate::testutil::serve(create_router(state, 30)).await;
        let companion = CompanionClient::new(&base);

        assert_eq!(companion.record_view("article/1").await.unwrap(), 1);
        assert_eq!(companion.record_view("article/1").await.unwrap(), 2);
        assert_eq!(companion.views("article/1").await.unwrap(), 2);

        let text = companion
            .generate(&crate::assist::GenerateRequest {
                prompt: "hello".into(),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(text, "echo: hello");

        let err = companion
            .generate(&crate::assist::GenerateRequest::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("prompt is empty"));
    }
}
