//! Account model for stored credentials

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::bluesky::DEFAULT_PDS_URL;

/// A stored Bluesky account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    /// Unique identifier
    pub id: Uuid,
    /// Account DID (stable across handle changes)
    pub did: String,
    /// Handle (e.g., user.bsky.social)
    pub handle: String,
    /// Display name (for UI)
    pub display_name: String,
    /// PDS URL the account logs in to
    pub pds_url: String,
    /// Whether this is the default account
    pub is_default: bool,
    /// Avatar URL (cached)
    pub avatar_url: Option<String>,
    /// When the account was added
    pub created_at: DateTime<Utc>,
    /// Last used timestamp
    pub last_used_at: Option<DateTime<Utc>>,
}

impl Account {
    /// Create a new account on the default PDS
    pub fn new(did: &str, handle: &str, display_name: &str) -> Self {
        Self::with_pds(did, handle, display_name, DEFAULT_PDS_URL)
    }

    /// Create a new account with a custom PDS URL
    pub fn with_pds(did: &str, handle: &str, display_name: &str, pds_url: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            did: did.to_string(),
            handle: handle.to_string(),
            display_name: display_name.to_string(),
            pds_url: pds_url.trim_end_matches('/').to_string(),
            is_default: false,
            avatar_url: None,
            created_at: Utc::now(),
            last_used_at: None,
        }
    }

    /// Handle with a leading `@`
    pub fn at_handle(&self) -> String {
        format!("@{}", self.handle)
    }

    /// Get the key for storing credentials
    pub fn keyring_key(&self) -> String {
        format!("skyloft:bluesky:{}", self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pds_trailing_slash_trimmed() {
        let account = Account::with_pds("did:plc:x", "x.test", "X", "https://pds.example/");
        assert_eq!(account.pds_url, "https://pds.example");
        assert_eq!(account.at_handle(), "@x.test");
    }

    #[test]
    fn test_keyring_key_is_per_account() {
        let a = Account::new("did:plc:a", "a.test", "A");
        let b = Account::new("did:plc:a", "a.test", "A");
        assert_ne!(a.keyring_key(), b.keyring_key());
        assert!(a.keyring_key().starts_with("skyloft:bluesky:"));
    }
}
