//! Client for the Skyloft companion service (`skyloft serve`)

use anyhow::{Context, Result, bail};
use reqwest::Client;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;

use crate::assist::GenerateRequest;
use crate::verification::{CaptureReport, CreatedOrder, VerificationStatus};

/// HTTP client for the companion endpoints
#[derive(Debug, Clone)]
pub struct CompanionClient {
    http: Client,
    base: String,
}

impl CompanionClient {
    /// Client for the service at `base`
    pub fn new(base: &str) -> Self {
        Self {
            http: Client::new(),
            base: base.trim_end_matches('/').to_string(),
        }
    }

    async fn read<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        let status = response.status();
        if !status.is_success() {
            #[derive(Deserialize)]
            struct ErrorBody {
                error: String,
            }
            let text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorBody>(&text).map_or(text, |b| b.error);
            bail!("Companion service returned {status}: {message}");
        }
        response.json().await.context("Unexpected response from companion service")
    }

    /// Ask the assistant for text
    pub async fn generate(&self, request: &GenerateRequest) -> Result<String> {
        #[derive(Deserialize)]
        struct Generated {
            text: String,
        }
        let response = self
            .http
            .post(format!("{}/api/generate", self.base))
            .json(request)
            .send()
            .await
            .context("Failed to reach companion service")?;
        Ok(Self::read::<Generated>(response).await?.text)
    }

    /// Start a badge purchase for `did`
    pub async fn create_order(&self, did: &str) -> Result<CreatedOrder> {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct Created {
            id: String,
            #[serde(default)]
            status: String,
            approve_url: String,
        }
        let response = self
            .http
            .post(format!("{}/api/paypal/orders", self.base))
            .json(&json!({ "did": did }))
            .send()
            .await
            .context("Failed to reach companion service")?;
        let created: Created = Self::read(response).await?;
        Ok(CreatedOrder {
            id: created.id,
            status: created.status,
            approve_url: created.approve_url,
        })
    }

    /// Capture an approved order
    pub async fn capture_order(&self, order_id: &str) -> Result<CaptureReport> {
        let response = self
            .http
            .post(format!(
                "{}/api/paypal/orders/{}/capture",
                self.base,
                urlencoding::encode(order_id)
            ))
            .send()
            .await
            .context("Failed to reach companion service")?;
        Self::read(response).await
    }

    /// Badge state of `did`
    pub async fn verification(&self, did: &str) -> Result<VerificationStatus> {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct Status {
            did: String,
            verified: bool,
            #[serde(default)]
            verified_at: Option<String>,
        }
        let response = self
            .http
            .get(format!("{}/api/verification/{}", self.base, urlencoding::encode(did)))
            .send()
            .await
            .context("Failed to reach companion service")?;
        let status: Status = Self::read(response).await?;
        Ok(VerificationStatus {
            did: status.did,
            verified: status.verified,
            verified_at: status.verified_at,
        })
    }

    /// Current view count of `key`
    pub async fn views(&self, key: &str) -> Result<u64> {
        let response = self
            .http
            .get(self.views_url(key))
            .send()
            .await
            .context("Failed to reach companion service")?;
        Ok(Self::read::<ViewCount>(response).await?.views)
    }

    /// Count one view of `key`; returns the new total
    pub async fn record_view(&self, key: &str) -> Result<u64> {
        let response = self
            .http
            .post(self.views_url(key))
            .send()
            .await
            .context("Failed to reach companion service")?;
        Ok(Self::read::<ViewCount>(response).await?.views)
    }

    fn views_url(&self, key: &str) -> String {
        format!("{}/api/views/{}", self.base, urlencoding::encode(key))
    }
}

#[derive(Deserialize)]
struct ViewCount {
    views: u64,
}
