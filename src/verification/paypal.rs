//! PayPal REST client: OAuth2 client credentials, orders and captures

use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::Mutex;

use crate::config::PaypalConfig;

/// Refresh the token this long before PayPal says it expires
const TOKEN_SLACK: Duration = Duration::from_secs(60);

/// PayPal issue code for a capture of an already captured order
const ALREADY_CAPTURED: &str = "ORDER_ALREADY_CAPTURED";

/// What to charge for and where to send the buyer afterwards
#[derive(Debug, Clone)]
pub struct OrderRequest {
    /// Amount as a decimal string, e.g. `5.00`
    pub amount: String,
    /// ISO currency code
    pub currency: String,
    /// Opaque value echoed back on capture; we store the buyer's DID here
    pub custom_id: String,
    /// Line description
    pub description: String,
    /// Where PayPal redirects after approval
    pub return_url: String,
    /// Where PayPal redirects on cancel
    pub cancel_url: String,
}

/// A created order
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CreatedOrder {
    /// Order id
    pub id: String,
    /// Order status, `CREATED` normally
    pub status: String,
    /// Link the buyer must visit to approve
    pub approve_url: String,
}

/// Result of capturing an order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capture {
    /// Order id
    pub order_id: String,
    /// Order status after capture, `COMPLETED` on success
    pub status: String,
    /// `custom_id` set at creation
    pub custom_id: Option<String>,
    /// Captured amount
    pub amount: Option<String>,
    /// Captured currency
    pub currency: Option<String>,
}

impl Capture {
    /// Whether the money moved
    pub fn is_completed(&self) -> bool {
        self.status == "COMPLETED"
    }
}

/// PayPal REST API client
pub struct PaypalClient {
    http: Client,
    base: String,
    client_id: String,
    client_secret: String,
    brand_name: String,
    token: Mutex<Option<(String, Instant)>>,
}

impl std::fmt::Debug for PaypalClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaypalClient").field("base", &self.base).finish_non_exhaustive()
    }
}

impl PaypalClient {
    /// Client for the configured PayPal environment
    pub fn new(config: &PaypalConfig, client_id: &str, client_secret: &str) -> Self {
        Self {
            http: Client::new(),
            base: config.base_url.trim_end_matches('/').to_string(),
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            brand_name: config.brand_name.clone(),
            token: Mutex::new(None),
        }
    }

    /// A valid access token, fetching a new one when the cached one is stale
    async fn access_token(&self) -> Result<String> {
        let mut cached = self.token.lock().await;
        if let Some((token, expires)) = cached.as_ref()
            && Instant::now() < *expires
        {
            return Ok(token.clone());
        }

        #[derive(Deserialize)]
        struct TokenResponse {
            access_token: String,
            #[serde(default)]
            expires_in: u64,
        }

        let response = self
            .http
            .post(format!("{}/v1/oauth2/token", self.base))
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .context("Failed to reach PayPal")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            bail!("PayPal authentication failed ({status}): {body}");
        }

        let token: TokenResponse = response.json().await.context("Failed to parse PayPal token")?;
        let lifetime = Duration::from_secs(token.expires_in).saturating_sub(TOKEN_SLACK);
        *cached = Some((token.access_token.clone(), Instant::now() + lifetime));
        Ok(token.access_token)
    }

    /// Create a capture-intent order
    pub async fn create_order(&self, order: &OrderRequest) -> Result<CreatedOrder> {
        let token = self.access_token().await?;
        let body = json!({
            "intent": "CAPTURE",
            "purchase_units": [{
                "amount": { "currency_code": order.currency, "value": order.amount },
                "custom_id": order.custom_id,
                "description": order.description,
            }],
            "application_context": {
                "brand_name": self.brand_name,
                "user_action": "PAY_NOW",
                "shipping_preference": "NO_SHIPPING",
                "return_url": order.return_url,
                "cancel_url": order.cancel_url,
            }
        });

        let response = self
            .http
            .post(format!("{}/v2/checkout/orders", self.base))
            .bearer_auth(&token)
            .json(&body)
            .send()
            .await
            .context("Failed to create PayPal order")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            bail!("PayPal order creation failed ({status}): {body}");
        }

        let order: OrderResponse = response.json().await.context("Failed to parse PayPal order")?;
        let approve_url = order
            .links
            .iter()
            .find(|l| l.rel == "approve" || l.rel == "payer-action")
            .map(|l| l.href.clone())
            .context("PayPal order has no approval link")?;

        tracing::info!(order_id = %order.id, "paypal order created");
        Ok(CreatedOrder {
            id: order.id,
            status: order.status,
            approve_url,
        })
    }

    /// Capture an approved order
    pub async fn capture_order(&self, order_id: &str) -> Result<Capture> {
        if order_id.is_empty() || !order_id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
            bail!("Invalid order id");
        }
        let token = self.access_token().await?;

        let response = self
            .http
            .post(format!("{}/v2/checkout/orders/{}/capture", self.base, order_id))
            .bearer_auth(&token)
            .json(&json!({}))
            .send()
            .await
            .context("Failed to capture PayPal order")?;

        let status = response.status();
        let order: OrderResponse = if status.is_success() {
            response.json().await.context("Failed to parse PayPal capture")?
        } else {
            let body = response.text().await.unwrap_or_default();
            // A second capture (return page, then the CLI) is answered with 422
            if status == StatusCode::UNPROCESSABLE_ENTITY && body.contains(ALREADY_CAPTURED) {
                tracing::info!(%order_id, "paypal order already captured");
                self.get_order(order_id, &token).await?
            } else {
                bail!("PayPal capture failed ({status}): {body}");
            }
        };

        tracing::info!(order_id = %order.id, status = %order.status, "paypal order captured");
        Ok(order.into_capture())
    }

    async fn get_order(&self, order_id: &str, token: &str) -> Result<OrderResponse> {
        let response = self
            .http
            .get(format!("{}/v2/checkout/orders/{}", self.base, order_id))
            .bearer_auth(token)
            .send()
            .await
            .context("Failed to fetch PayPal order")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            bail!("PayPal order lookup failed ({status}): {body}");
        }
        response.json().await.context("Failed to parse PayPal order")
    }
}

#[derive(Debug, Deserialize)]
struct OrderResponse {
    id: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    links: Vec<Link>,
    #[serde(default)]
    purchase_units: Vec<PurchaseUnit>,
}

impl OrderResponse {
    fn into_capture(self) -> Capture {
        let unit = self.purchase_units.into_iter().next();
        let capture = unit
            .as_ref()
            .and_then(|u| u.payments.as_ref())
            .and_then(|p| p.captures.first());

        let custom_id = capture
            .and_then(|c| c.custom_id.clone())
            .or_else(|| unit.as_ref().and_then(|u| u.custom_id.clone()));
        let amount = capture.and_then(|c| c.amount.as_ref());

        Capture {
            order_id: self.id,
            status: self.status,
            custom_id,
            amount: amount.map(|a| a.value.clone()),
            currency: amount.map(|a| a.currency_code.clone()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct Link {
    href: String,
    rel: String,
}

#[derive(Debug, Deserialize)]
struct PurchaseUnit {
    #[serde(default)]
    custom_id: Option<String>,
    #[serde(default)]
    payments: Option<Payments>,
}

#[derive(Debug, Deserialize)]
struct Payments {
    #[serde(default)]
    captures: Vec<CaptureView>,
}

#[derive(Debug, Deserialize)]
struct CaptureView {
    #[serde(default)]
    custom_id: Option<String>,
    #[serde(default)]
    amount: Option<Money>,
}

#[derive(Debug, Deserialize)]
struct Money {
    currency_code: String,
    value: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::{Path, State};
    use axum::http::HeaderMap;
    use axum::routing::post;
    use axum::{Form, Json, Router};
    use serde_json::Value;
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn mock(token_calls: Arc<AtomicUsize>) -> Router {
        Router::new()
            .route(
                "/v1/oauth2/token",
                post(
                    |State(calls): State<Arc<AtomicUsize>>,
                     headers: HeaderMap,
                     Form(form): Form<HashMap<String, String>>| async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        assert!(headers["authorization"].to_str().unwrap().starts_with("Basic "));
                        assert_eq!(form["grant_type"], "client_credentials");
                        Json(json!({"access_token": "A21", "expires_in": 32400, "token_type": "Bearer"}))
                    },
                ),
            )
            .route(
                "/v2/checkout/orders",
                post(|headers: HeaderMap, Json(body): Json<Value>| async move {
                    assert_eq!(headers["authorization"], "Bearer A21");
                    let unit = &body["purchase_units"][0];
                    Json(json!({
                        "id": "5O190127TN364715T",
                        "status": "CREATED",
                        "links": [
                            {"href": "https://api.sandbox.paypal.com/v2/checkout/orders/5O190127TN364715T", "rel": "self"},
                            {"href": format!("https://www.sandbox.paypal.com/checkoutnow?token=5O1&did={}", unit["custom_id"].as_str().unwrap()), "rel": "approve"}
                        ]
                    }))
                }),
            )
            .route(
                "/v2/checkout/orders/{id}/capture",
                post(|Path(id): Path<String>| async move {
                    Json(json!({
                        "id": id,
                        "status": "COMPLETED",
                        "purchase_units": [{
                            "reference_id": "default",
                            "payments": {"captures": [{
                                "id": "3C679366HH908993F",
                                "status": "COMPLETED",
                                "custom_id": "did:plc:buyer",
                                "amount": {"currency_code": "USD", "value": "5.00"}
                            }]}
                        }]
                    }))
                }),
            )
            .with_state(token_calls)
    }

    fn request() -> OrderRequest {
        OrderRequest {
            amount: "5.00".into(),
            currency: "USD".into(),
            custom_id: "did:plc:buyer".into(),
            description: "Verification badge".into(),
            return_url: "http://localhost/paypal/return".into(),
            cancel_url: "http://localhost/paypal/cancel".into(),
        }
    }

    #[tokio::test]
    async fn test_create_and_capture() {
        let calls = Arc::new(AtomicUsize::new(0));
        let base = crate::testutil::serve(mock(calls.clone())).await;
        let config = PaypalConfig {
            base_url: base,
            ..PaypalConfig::default()
        };
        let client = PaypalClient::new(&config, "id", "secret");

        let order = client.create_order(&request()).await.unwrap();
        assert_eq!(order.id, "5O190127TN364715T");
        assert!(order.approve_url.contains("did=did:plc:buyer"));

        let capture = client.capture_order(&order.id).await.unwrap();
        assert!(capture.is_completed());
        assert_eq!(capture.custom_id.as_deref(), Some("did:plc:buyer"));
        assert_eq!(capture.amount.as_deref(), Some("5.00"));

        // token fetched once and reused
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    fn completed_order(id: &str) -> Value {
        json!({
            "id": id,
            "status": "COMPLETED",
            "purchase_units": [{
                "payments": {"captures": [{
                    "status": "COMPLETED",
                    "custom_id": "did:plc:buyer",
                    "amount": {"currency_code": "USD", "value": "5.00"}
                }]}
            }]
        })
    }

    #[tokio::test]
    async fn test_second_capture_reads_the_order() {
        use axum::http::StatusCode;
        use axum::response::IntoResponse;
        use axum::routing::get;

        let captures = Arc::new(AtomicUsize::new(0));
        let router = Router::new()
            .route(
                "/v1/oauth2/token",
                post(|| async { Json(json!({"access_token": "A21", "expires_in": 32400})) }),
            )
            .route(
                "/v2/checkout/orders/{id}/capture",
                post(|State(captures): State<Arc<AtomicUsize>>, Path(id): Path<String>| async move {
                    if captures.fetch_add(1, Ordering::SeqCst) == 0 {
                        Json(completed_order(&id)).into_response()
                    } else {
                        (
                            StatusCode::UNPROCESSABLE_ENTITY,
                            Json(json!({
                                "name": "UNPROCESSABLE_ENTITY",
                                "details": [{"issue": "ORDER_ALREADY_CAPTURED"}]
                            })),
                        )
                            .into_response()
                    }
                }),
            )
            .route(
                "/v2/checkout/orders/{id}",
                get(|Path(id): Path<String>| async move { Json(completed_order(&id)) }),
            )
            .with_state(captures.clone());
        let config = PaypalConfig {
            base_url: crate::testutil::serve(router).await,
            ..PaypalConfig::default()
        };
        let client = PaypalClient::new(&config, "id", "secret");

        let first = client.capture_order("ORDER1").await.unwrap();
        let second = client.capture_order("ORDER1").await.unwrap();
        assert_eq!(captures.load(Ordering::SeqCst), 2);
        assert_eq!(first, second);
        assert!(second.is_completed());
        assert_eq!(second.custom_id.as_deref(), Some("did:plc:buyer"));
    }

    #[tokio::test]
    async fn test_other_capture_errors_fail() {
        use axum::http::StatusCode;

        let router = Router::new()
            .route(
                "/v1/oauth2/token",
                post(|| async { Json(json!({"access_token": "A21", "expires_in": 32400})) }),
            )
            .route(
                "/v2/checkout/orders/{id}/capture",
                post(|| async {
                    (
                        StatusCode::UNPROCESSABLE_ENTITY,
                        Json(json!({"details": [{"issue": "ORDER_NOT_APPROVED"}]})),
                    )
                }),
            );
        let config = PaypalConfig {
            base_url: crate::testutil::serve(router).await,
            ..PaypalConfig::default()
        };
        let client = PaypalClient::new(&config, "id", "secret");

        let err = client.capture_order("ORDER1").await.unwrap_err();
        assert!(err.to_string().contains("ORDER_NOT_APPROVED"));
    }

    #[tokio::test]
    async fn test_rejects_bad_order_id() {
        let config = PaypalConfig {
            base_url: "http://127.0.0.1:9".into(),
            ..PaypalConfig::default()
        };
        let client = PaypalClient::new(&config, "id", "secret");
        assert!(client.capture_order("../../v1/identity").await.is_err());
    }
}
