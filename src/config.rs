//! Configuration module for Skyloft
//!
//! Non-secret settings come from `config.toml`; every field has a default so
//! a missing or partial file is fine. Secrets (API keys, app passwords) are
//! only ever read from the environment, see [`Secrets`].

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::api::bluesky::DEFAULT_PDS_URL;
use crate::api::public::PUBLIC_API_URL;
use crate::embed::render::DEFAULT_MAX_DEPTH;
use crate::theme::Theme;

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Selected theme
    #[serde(default)]
    pub theme: Theme,

    /// Number of posts to fetch per request
    #[serde(default = "default_post_limit")]
    pub post_limit: usize,

    /// How many levels of quoted posts to render before eliding
    #[serde(default = "default_embed_depth")]
    pub embed_depth: usize,

    /// Base URL of the companion service (AI assist, payments, badges)
    #[serde(default = "default_server_url")]
    pub server_url: String,

    /// Companion service settings, used by `skyloft serve`
    #[serde(default)]
    pub server: ServerConfig,
}

/// `[server]` section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address to bind
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Per-request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Public URL of this service, used for payment return links
    #[serde(default = "default_server_url")]
    pub public_url: String,

    /// Public AppView the `/api/bsky` proxy forwards to
    #[serde(default = "default_public_api")]
    pub public_api: String,

    /// PDS of the app account that signs verification records
    #[serde(default = "default_pds")]
    pub app_pds: String,

    /// Handle or DID of the app account
    #[serde(default)]
    pub app_handle: String,

    /// LLM provider
    #[serde(default)]
    pub llm: LlmConfig,

    /// Payment provider
    #[serde(default)]
    pub paypal: PaypalConfig,
}

/// `[server.llm]` section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// OpenAI-compatible API base, e.g. `https://api.openai.com/v1`
    #[serde(default = "default_llm_base")]
    pub base_url: String,

    /// Model name
    #[serde(default = "default_llm_model")]
    pub model: String,

    /// Default completion budget
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

/// `[server.paypal]` section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaypalConfig {
    /// REST API base; sandbox by default
    #[serde(default = "default_paypal_base")]
    pub base_url: String,

    /// Price of a verification badge
    #[serde(default = "default_amount")]
    pub amount: String,

    /// ISO currency code
    #[serde(default = "default_currency")]
    pub currency: String,

    /// Name shown on the approval page
    #[serde(default = "default_brand")]
    pub brand_name: String,
}

fn default_post_limit() -> usize {
    50
}

const fn default_embed_depth() -> usize {
    DEFAULT_MAX_DEPTH
}

fn default_server_url() -> String {
    "http://127.0.0.1:8787".to_string()
}

fn default_bind() -> String {
    "127.0.0.1".to_string()
}

const fn default_port() -> u16 {
    8787
}

const fn default_timeout() -> u64 {
    30
}

fn default_public_api() -> String {
    PUBLIC_API_URL.to_string()
}

fn default_pds() -> String {
    DEFAULT_PDS_URL.to_string()
}

fn default_llm_base() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_llm_model() -> String {
    "gpt-4o-mini".to_string()
}

const fn default_max_tokens() -> u32 {
    300
}

const fn default_temperature() -> f32 {
    0.7
}

fn default_paypal_base() -> String {
    "https://api-m.sandbox.paypal.com".to_string()
}

fn default_amount() -> String {
    "5.00".to_string()
}

fn default_currency() -> String {
    "USD".to_string()
}

fn default_brand() -> String {
    "Skyloft".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            theme: Theme::default(),
            post_limit: default_post_limit(),
            embed_depth: default_embed_depth(),
            server_url: default_server_url(),
            server: ServerConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
            timeout_secs: default_timeout(),
            public_url: default_server_url(),
            public_api: default_public_api(),
            app_pds: default_pds(),
            app_handle: String::new(),
            llm: LlmConfig::default(),
            paypal: PaypalConfig::default(),
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_llm_base(),
            model: default_llm_model(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
        }
    }
}

impl Default for PaypalConfig {
    fn default() -> Self {
        Self {
            base_url: default_paypal_base(),
            amount: default_amount(),
            currency: default_currency(),
            brand_name: default_brand(),
        }
    }
}

impl Config {
    /// Load config from the default path or create default
    pub fn load() -> Result<Self> {
        let path = crate::paths::config_path()?;
        Self::load_from(&path)
    }

    /// Load config from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path).context("Failed to read config file")?;
            toml::from_str(&content).context("Failed to parse config file")
        } else {
            Ok(Self::default())
        }
    }

    /// Save config to the default path
    pub fn save(&self) -> Result<()> {
        let path = crate::paths::config_path()?;
        self.save_to(&path)
    }

    /// Save config to a specific path
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path, content).context("Failed to write config file")?;

        Ok(())
    }
}

/// Environment variable holding the LLM API key
pub const ENV_LLM_API_KEY: &str = "SKYLOFT_LLM_API_KEY";
/// Environment variable holding the PayPal client id
pub const ENV_PAYPAL_CLIENT_ID: &str = "SKYLOFT_PAYPAL_CLIENT_ID";
/// Environment variable holding the PayPal client secret
pub const ENV_PAYPAL_CLIENT_SECRET: &str = "SKYLOFT_PAYPAL_CLIENT_SECRET";
/// Environment variable holding the app account's app password
pub const ENV_APP_PASSWORD: &str = "SKYLOFT_APP_PASSWORD";

/// Secrets for the companion service
#[derive(Clone, Default)]
pub struct Secrets {
    /// LLM API key
    pub llm_api_key: Option<String>,
    /// PayPal client id and secret
    pub paypal: Option<(String, String)>,
    /// App password of the app account
    pub app_password: Option<String>,
}

impl std::fmt::Debug for Secrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Secrets")
            .field("llm_api_key", &self.llm_api_key.is_some())
            .field("paypal", &self.paypal.is_some())
            .field("app_password", &self.app_password.is_some())
            .finish()
    }
}

impl Secrets {
    /// Read secrets from the process environment (after `.env` is loaded)
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read secrets through an arbitrary lookup; blank values count as unset
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let paypal = match (get(ENV_PAYPAL_CLIENT_ID), get(ENV_PAYPAL_CLIENT_SECRET)) {
            (Some(id), Some(secret)) => Some((id, secret)),
            _ => None,
        };

        Self {
            llm_api_key: get(ENV_LLM_API_KEY),
            paypal,
            app_password: get(ENV_APP_PASSWORD),
        }
    }
}
