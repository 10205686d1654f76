//! Shared handler state

use std::time::Instant;

use dashmap::DashMap;
use tokio::sync::OnceCell;

use super::error::ServerError;
use crate::api::{AppRecords, PublicClient};
use crate::assist::LlmClient;
use crate::config::{Secrets, ServerConfig};
use crate::verification::{self, PaypalClient};

/// State shared by all handlers
#[derive(Debug)]
pub struct AppState {
    /// Server section of the config
    pub config: ServerConfig,
    /// Secrets from the environment
    pub secrets: Secrets,
    /// Public AppView, for the proxy and badge lookups
    pub public: PublicClient,
    /// LLM provider, when an API key is set
    pub llm: Option<LlmClient>,
    /// PayPal, when client credentials are set
    pub paypal: Option<PaypalClient>,
    /// View counts; live only as long as the process
    pub views: DashMap<String, u64>,
    /// Process start, for uptime
    pub started: Instant,
    app_did: OnceCell<String>,
}

impl AppState {
    /// Build state from config and secrets
    pub fn new(config: ServerConfig, secrets: Secrets) -> Self {
        let llm = secrets
            .llm_api_key
            .as_deref()
            .map(|key| LlmClient::new(&config.llm, key));
        let paypal = secrets
            .paypal
            .as_ref()
            .map(|(id, secret)| PaypalClient::new(&config.paypal, id, secret));

        if llm.is_none() {
            tracing::warn!("LLM API key not set; /api/generate will answer 503");
        }
        if paypal.is_none() {
            tracing::warn!("PayPal credentials not set; payment routes will answer 503");
        }

        Self {
            public: PublicClient::new(&config.public_api),
            config,
            secrets,
            llm,
            paypal,
            views: DashMap::new(),
            started: Instant::now(),
            app_did: OnceCell::new(),
        }
    }

    /// DID of the app account, resolved once from the configured handle
    pub async fn app_did(&self) -> Result<&str, ServerError> {
        let handle = self.config.app_handle.trim();
        if handle.is_empty() {
            return Err(ServerError::NotConfigured("server.app_handle"));
        }
        let did = self
            .app_did
            .get_or_try_init(|| async {
                if handle.starts_with("did:") {
                    Ok(handle.to_string())
                } else {
                    self.public.resolve_handle(handle).await
                }
            })
            .await
            .map_err(ServerError::upstream)?;
        Ok(did.as_str())
    }

    /// Log in as the app account for writing records
    pub async fn app_records(&self) -> Result<AppRecords, ServerError> {
        if self.config.app_handle.trim().is_empty() {
            return Err(ServerError::NotConfigured("server.app_handle"));
        }
        if self.secrets.app_password.is_none() {
            return Err(ServerError::NotConfigured("SKYLOFT_APP_PASSWORD"));
        }
        verification::app_account_records(&self.config, &self.secrets)
            .await
            .map_err(ServerError::upstream)
    }
}
