//! API clients for Bluesky and the AT Protocol

pub mod bluesky;
pub mod public;
pub mod records;
pub mod xrpc;

use anyhow::Result;

use crate::models::{Account, Post, StrongRef};

pub use bluesky::{BlueskyClient, ImageUpload, PostDraft, Session};
pub use public::PublicClient;
pub use records::{AppRecord, AppRecords, RecordEntry, RecordRef, RecordStore};
pub use xrpc::{Xrpc, XrpcError};

/// A page of posts plus the cursor for the next one
#[derive(Debug, Clone, Default)]
pub struct FeedPage {
    /// Posts in feed order
    pub posts: Vec<Post>,
    /// Cursor for the next page, if there is one
    pub cursor: Option<String>,
}

/// What the view layer needs from a social network client
#[allow(async_fn_in_trait)]
pub trait SocialApi {
    /// Get the home timeline
    async fn timeline(&self, cursor: Option<&str>, limit: usize) -> Result<FeedPage>;

    /// Posts by one account
    async fn author_feed(&self, actor: &str, cursor: Option<&str>, limit: usize) -> Result<FeedPage>;

    /// Search posts
    async fn search_posts(&self, q: &str, cursor: Option<&str>, limit: usize) -> Result<FeedPage>;

    /// Get a post with its ancestors and replies
    async fn thread(&self, uri: &str) -> Result<Vec<Post>>;

    /// Publish a post
    async fn post(&self, draft: &PostDraft) -> Result<StrongRef>;

    /// Like a post
    async fn like(&self, post: &Post) -> Result<String>;

    /// Remove a like
    async fn unlike(&self, post: &Post) -> Result<()>;

    /// Repost a post
    async fn repost(&self, post: &Post) -> Result<String>;

    /// Undo a repost
    async fn unrepost(&self, post: &Post) -> Result<()>;

    /// Follow an account
    async fn follow(&self, did: &str) -> Result<String>;

    /// Delete a follow record
    async fn unfollow(&self, follow_uri: &str) -> Result<()>;
}

/// Hydrates post URIs into full posts
#[allow(async_fn_in_trait)]
pub trait PostLookup {
    /// Fetch posts, keeping the order of `uris` and skipping missing ones
    async fn posts(&self, uris: &[String]) -> Result<Vec<Post>>;
}

/// Whether an error chain bottoms out in an expired access token
pub fn is_expired_token(err: &anyhow::Error) -> bool {
    err.chain()
        .filter_map(|e| e.downcast_ref::<XrpcError>())
        .any(XrpcError::is_expired_token)
}

/// Whether an error chain bottoms out in a not-found response
pub fn is_not_found(err: &anyhow::Error) -> bool {
    err.chain()
        .filter_map(|e| e.downcast_ref::<XrpcError>())
        .any(XrpcError::is_not_found)
}

/// Log in to an account's PDS with its stored app password
pub async fn get_client(account: &Account, app_password: &str) -> Result<BlueskyClient> {
    let pds_url = if account.pds_url.is_empty() {
        bluesky::DEFAULT_PDS_URL
    } else {
        &account.pds_url
    };
    BlueskyClient::login_with_pds(&account.handle, app_password, pds_url).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn test_expired_token_found_through_context() {
        let err: Result<()> = Err(XrpcError::Api {
            method: "app.bsky.feed.getTimeline".into(),
            status: 400,
            error: "ExpiredToken".into(),
            message: "Token has expired".into(),
        })
        .context("Failed to fetch timeline");
        let err = err.unwrap_err();
        assert!(is_expired_token(&err));
        assert!(!is_not_found(&err));

        let plain = anyhow::anyhow!("something else");
        assert!(!is_expired_token(&plain));
    }
}
