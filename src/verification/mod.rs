//! Paid verification badges
//!
//! A buyer pays through PayPal with their DID attached to the order. Once
//! the capture completes, the app account writes a `verification` record
//! keyed by that DID into its own repository. Anyone can then check a badge
//! by reading the record through the public API.

pub mod paypal;

use anyhow::{Context, Result, bail, ensure};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::api::{AppRecord, AppRecords, BlueskyClient, PublicClient, RecordStore};
use crate::config::{Secrets, ServerConfig};

pub use paypal::{Capture, CreatedOrder, OrderRequest, PaypalClient};

/// Badge state of one account
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct VerificationStatus {
    /// The account
    pub did: String,
    /// Whether a badge record exists
    pub verified: bool,
    /// When the badge was granted
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verified_at: Option<String>,
}

/// Outcome of capturing a badge order
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CaptureReport {
    /// Order status
    pub status: String,
    /// DID the order was for
    #[serde(default)]
    pub did: Option<String>,
    /// Whether a badge was recorded
    pub verified: bool,
}

/// Loose DID syntax check: `did:<method>:<id>`
pub fn is_valid_did(did: &str) -> bool {
    let mut parts = did.splitn(3, ':');
    let (Some("did"), Some(method), Some(id)) = (parts.next(), parts.next(), parts.next()) else {
        return false;
    };
    !method.is_empty()
        && method.chars().all(|c| c.is_ascii_lowercase())
        && !id.is_empty()
        && !id.ends_with(':')
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | ':' | '%' | '-'))
        && did.len() <= 2048
}

/// Build the order for a badge purchase
pub fn badge_order(server: &ServerConfig, did: &str) -> Result<OrderRequest> {
    ensure!(is_valid_did(did), "Invalid DID: {did}");
    let base = server.public_url.trim_end_matches('/');
    Ok(OrderRequest {
        amount: server.paypal.amount.clone(),
        currency: server.paypal.currency.clone(),
        custom_id: did.to_string(),
        description: format!("{} verification badge", server.paypal.brand_name),
        return_url: format!("{base}/paypal/return"),
        cancel_url: format!("{base}/paypal/cancel"),
    })
}

/// Record a badge for a completed capture.
///
/// The DID comes from the order's `custom_id`, never from the caller, so a
/// buyer can only verify the account they paid for.
pub async fn verify_capture<S: RecordStore>(store: &S, capture: &Capture) -> Result<VerificationStatus> {
    if !capture.is_completed() {
        bail!("Payment not completed (status {})", capture.status);
    }
    let did = capture
        .custom_id
        .as_deref()
        .filter(|d| is_valid_did(d))
        .context("Completed order carries no valid DID")?;

    let verified_at = Utc::now().to_rfc3339();
    let record = AppRecord::Verification {
        subject: did.to_string(),
        order_id: capture.order_id.clone(),
        amount: capture.amount.clone().unwrap_or_default(),
        currency: capture.currency.clone().unwrap_or_default(),
        verified_at: verified_at.clone(),
    };
    store.put(did, &record).await?;
    tracing::info!(%did, order_id = %capture.order_id, "verification recorded");

    Ok(VerificationStatus {
        did: did.to_string(),
        verified: true,
        verified_at: Some(verified_at),
    })
}

/// Look a badge up through the public API
pub async fn is_verified(public: &PublicClient, app_repo: &str, did: &str) -> Result<VerificationStatus> {
    ensure!(is_valid_did(did), "Invalid DID: {did}");
    let entry = public.get_app_record(app_repo, did).await?;
    let verified_at = entry.and_then(|e| match e.value {
        AppRecord::Verification { subject, verified_at, .. } if subject == did => Some(verified_at),
        _ => None,
    });
    Ok(VerificationStatus {
        did: did.to_string(),
        verified: verified_at.is_some(),
        verified_at,
    })
}

/// Log in as the app account and return its record store
pub async fn app_account_records(server: &ServerConfig, secrets: &Secrets) -> Result<AppRecords> {
    ensure!(!server.app_handle.is_empty(), "server.app_handle is not configured");
    let password = secrets
        .app_password
        .as_deref()
        .context("SKYLOFT_APP_PASSWORD is not set")?;
    let client = BlueskyClient::login_with_pds(&server.app_handle, password, &server.app_pds)
        .await
        .context("App account login failed")?;
    Ok(client.records())
}
