//! Composer draft model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An unsent post kept locally
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Draft {
    /// Unique identifier
    pub id: Uuid,
    /// Draft text
    pub text: String,
    /// URI of the post being replied to
    pub reply_to: Option<String>,
    /// URI of the post being quoted
    pub quote: Option<String>,
    /// When the draft was first saved
    pub created_at: DateTime<Utc>,
    /// When the draft was last saved
    pub updated_at: DateTime<Utc>,
}

impl Draft {
    /// Create a new draft
    pub fn new(text: &str) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            text: text.to_string(),
            reply_to: None,
            quote: None,
            created_at: now,
            updated_at: now,
        }
    }
}
