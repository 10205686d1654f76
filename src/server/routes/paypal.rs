//! Badge purchase endpoints and the PayPal return pages

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::response::Html;
use serde::{Deserialize, Serialize};

use crate::server::{AppState, ServerError};
use crate::verification::{self, CaptureReport, is_valid_did};

/// Body of `POST /api/paypal/orders`
#[derive(Debug, Deserialize)]
pub struct CreateOrderBody {
    did: String,
}

/// Created order as returned to the client
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderResponse {
    id: String,
    approve_url: String,
}

/// `POST /api/paypal/orders`
pub async fn create_order(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateOrderBody>,
) -> Result<Json<CreateOrderResponse>, ServerError> {
    let did = body.did.trim();
    if !is_valid_did(did) {
        return Err(ServerError::BadRequest(format!("invalid DID: {did}")));
    }
    let paypal = state.paypal.as_ref().ok_or(ServerError::NotConfigured("PayPal"))?;

    let order = verification::badge_order(&state.config, did)
        .map_err(|e| ServerError::BadRequest(e.to_string()))?;
    let created = paypal.create_order(&order).await.map_err(ServerError::upstream)?;

    Ok(Json(CreateOrderResponse {
        id: created.id,
        approve_url: created.approve_url,
    }))
}

/// `POST /api/paypal/orders/{id}/capture`
pub async fn capture_order(
    State(state): State<Arc<AppState>>,
    Path(order_id): Path<String>,
) -> Result<Json<CaptureReport>, ServerError> {
    capture_and_verify(&state, &order_id).await.map(Json)
}

async fn capture_and_verify(state: &AppState, order_id: &str) -> Result<CaptureReport, ServerError> {
    if order_id.is_empty() || !order_id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
        return Err(ServerError::BadRequest("invalid order id".into()));
    }
    let paypal = state.paypal.as_ref().ok_or(ServerError::NotConfigured("PayPal"))?;

    let capture = paypal.capture_order(order_id).await.map_err(ServerError::upstream)?;
    if !capture.is_completed() {
        tracing::info!(%order_id, status = %capture.status, "capture not completed");
        return Ok(CaptureReport {
            status: capture.status,
            did: capture.custom_id,
            verified: false,
        });
    }

    let records = state.app_records().await?;
    let status = verification::verify_capture(&records, &capture)
        .await
        .map_err(ServerError::upstream)?;

    Ok(CaptureReport {
        status: capture.status,
        did: Some(status.did),
        verified: status.verified,
    })
}

/// Query PayPal appends to the return URL
#[derive(Debug, Deserialize)]
pub struct ReturnQuery {
    #[serde(default)]
    token: Option<String>,
    #[serde(rename = "PayerID", default)]
    payer_id: Option<String>,
}

/// `GET /paypal/return`: capture the approved order and show the outcome
pub async fn paypal_return(State(state): State<Arc<AppState>>, Query(query): Query<ReturnQuery>) -> Html<String> {
    let Some(order_id) = query.token.filter(|t| !t.is_empty()) else {
        return page("Payment", "<p>Missing order token.</p>");
    };
    tracing::debug!(%order_id, payer = ?query.payer_id, "paypal return");

    match capture_and_verify(&state, &order_id).await {
        Ok(report) if report.verified => {
            let did = report.did.unwrap_or_default();
            page(
                "Verified",
                &format!(
                    "<p>Payment complete. <code>{}</code> is now verified.</p>\
                     <p>You can close this window and return to Skyloft.</p>",
                    html_escape::encode_text(&did)
                ),
            )
        }
        Ok(report) => page(
            "Payment pending",
            &format!(
                "<p>Order <code>{}</code> is {}. No badge was issued yet.</p>",
                html_escape::encode_text(&order_id),
                html_escape::encode_text(&report.status)
            ),
        ),
        Err(e) => page(
            "Payment failed",
            &format!("<p>{}</p>", html_escape::encode_text(&e.to_string())),
        ),
    }
}

/// `GET /paypal/cancel`
pub async fn paypal_cancel() -> Html<String> {
    page("Payment cancelled", "<p>No payment was taken. You can close this window.</p>")
}

fn page(title: &str, body: &str) -> Html<String> {
    Html(format!(
        "<!doctype html><html><head><meta charset=\"utf-8\"><title>{title} · Skyloft</title>\
         <style>body{{font-family:system-ui,sans-serif;max-width:32rem;margin:4rem auto;padding:0 1rem}}</style>\
         </head><body><h1>{title}</h1>{body}</body></html>",
        title = html_escape::encode_text(title),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_escapes_title() {
        let Html(html) = page("<b>x</b>", "<p>ok</p>");
        assert!(html.contains("<h1>&lt;b&gt;x&lt;/b&gt;</h1>"));
        assert!(html.contains("<p>ok</p>"));
    }
}
