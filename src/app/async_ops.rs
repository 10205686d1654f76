//! Async operations for the TUI
//!
//! Uses channels to communicate between the sync TUI loop and a tokio
//! worker task. The worker owns the logged-in clients and re-logs in once
//! when a request fails with an expired token.

use std::collections::HashMap;
use std::future::Future;

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use uuid::Uuid;

use super::state::FeedSource;
use crate::api::{BlueskyClient, FeedPage, PostDraft, get_client, is_expired_token};
use crate::articles::{Article, Articles};
use crate::assist::GenerateRequest;
use crate::auth::CredentialStore;
use crate::bookmarks::Bookmarks;
use crate::companion::CompanionClient;
use crate::models::{Account, Post};

/// Commands sent from the TUI to the async worker
#[derive(Debug, Clone)]
pub enum AsyncCommand {
    /// Load a feed, or its next page when `cursor` is set
    LoadFeed {
        account: Account,
        source: FeedSource,
        cursor: Option<String>,
    },
    /// Like a post
    Like { account: Account, post: Post },
    /// Remove a like
    Unlike { account: Account, post: Post },
    /// Repost a post
    Repost { account: Account, post: Post },
    /// Undo a repost
    Unrepost { account: Account, post: Post },
    /// Follow the author of a post
    Follow { account: Account, did: String, handle: String },
    /// Publish a post
    Post { account: Account, draft: PostDraft },
    /// Bookmark or un-bookmark a post
    ToggleBookmark { account: Account, post: Post },
    /// Reload the bookmarks tab
    LoadBookmarks { account: Account },
    /// Reload the articles tab
    LoadArticles { account: Account },
    /// Delete an article
    DeleteArticle { account: Account, rkey: String },
    /// Count a view of an article
    RecordView { rkey: String },
    /// Ask the assistant to rewrite composer text
    Assist { request: GenerateRequest },
    /// Look up verification badges
    CheckVerified { dids: Vec<String> },
    /// Shutdown the worker
    Shutdown,
}

/// Results sent back from the async worker to the TUI
#[derive(Debug)]
pub enum AsyncResult {
    /// A feed page arrived
    FeedLoaded {
        source: FeedSource,
        page: FeedPage,
        append: bool,
    },
    /// A like was created
    Liked { uri: String, like_uri: String },
    /// A like was deleted
    Unliked { uri: String },
    /// A repost was created
    Reposted { uri: String, repost_uri: String },
    /// A repost was deleted
    Unreposted { uri: String },
    /// Now following someone
    Followed { handle: String },
    /// New post created
    Posted { uri: String },
    /// Bookmark state changed
    BookmarkToggled { post: Post, bookmarked: bool },
    /// Bookmarks reloaded
    BookmarksLoaded { posts: Vec<Post>, uris: Vec<String> },
    /// Articles reloaded
    ArticlesLoaded { articles: Vec<Article> },
    /// An article was deleted
    ArticleDeleted { rkey: String },
    /// Current view count of an article
    ViewCounted { rkey: String, views: u64 },
    /// Assistant output
    Assisted { text: String },
    /// Badge lookups finished; `verified` is the subset with a badge
    VerificationChecked { checked: Vec<String>, verified: Vec<String> },
    /// An error occurred
    Error { message: String },
    /// Status message (for progress updates)
    Status { message: String },
}

/// Channel handles for communicating with the async worker
pub struct AsyncHandle {
    /// Send commands to the worker
    pub cmd_tx: mpsc::Sender<AsyncCommand>,
    /// Receive results from the worker
    pub result_rx: mpsc::Receiver<AsyncResult>,
}

/// Spawn the async worker and return handles
pub fn spawn_worker(companion_url: &str, feed_limit: usize) -> AsyncHandle {
    let (cmd_tx, mut cmd_rx) = mpsc::channel::<AsyncCommand>(32);
    let (result_tx, result_rx) = mpsc::channel::<AsyncResult>(32);

    let mut worker = Worker {
        clients: HashMap::new(),
        credentials: CredentialStore::open()
            .inspect_err(|e| tracing::warn!("credential store unavailable: {e:#}"))
            .ok(),
        companion: CompanionClient::new(companion_url),
        feed_limit,
    };

    tokio::spawn(async move {
        while let Some(cmd) = cmd_rx.recv().await {
            if matches!(cmd, AsyncCommand::Shutdown) {
                break;
            }
            let result = worker.handle(cmd).await.unwrap_or_else(|e| {
                tracing::warn!("async command failed: {e:#}");
                AsyncResult::Error {
                    message: format!("{e:#}"),
                }
            });
            if result_tx.send(result).await.is_err() {
                break;
            }
        }
    });

    AsyncHandle { cmd_tx, result_rx }
}

struct Worker {
    clients: HashMap<Uuid, BlueskyClient>,
    credentials: Option<CredentialStore>,
    companion: CompanionClient,
    feed_limit: usize,
}

impl Worker {
    async fn handle(&mut self, cmd: AsyncCommand) -> Result<AsyncResult> {
        match cmd {
            AsyncCommand::LoadFeed { account, source, cursor } => {
                let append = cursor.is_some();
                let limit = self.feed_limit;
                let page = self
                    .with_client(&account, |client| {
                        let source = source.clone();
                        let cursor = cursor.clone();
                        async move { load_feed(&client, &source, cursor.as_deref(), limit).await }
                    })
                    .await?;
                Ok(AsyncResult::FeedLoaded { source, page, append })
            }
            AsyncCommand::Like { account, post } => {
                let like_uri = self
                    .with_client(&account, |client| {
                        let post = post.clone();
                        async move { client.like(&post).await }
                    })
                    .await
                    .context("Like failed")?;
                Ok(AsyncResult::Liked { uri: post.uri, like_uri })
            }
            AsyncCommand::Unlike { account, post } => {
                self.with_client(&account, |client| {
                    let post = post.clone();
                    async move { client.unlike(&post).await }
                })
                .await
                .context("Unlike failed")?;
                Ok(AsyncResult::Unliked { uri: post.uri })
            }
            AsyncCommand::Repost { account, post } => {
                let repost_uri = self
                    .with_client(&account, |client| {
                        let post = post.clone();
                        async move { client.repost(&post).await }
                    })
                    .await
                    .context("Repost failed")?;
                Ok(AsyncResult::Reposted { uri: post.uri, repost_uri })
            }
            AsyncCommand::Unrepost { account, post } => {
                self.with_client(&account, |client| {
                    let post = post.clone();
                    async move { client.unrepost(&post).await }
                })
                .await
                .context("Undo repost failed")?;
                Ok(AsyncResult::Unreposted { uri: post.uri })
            }
            AsyncCommand::Follow { account, did, handle } => {
                self.with_client(&account, |client| {
                    let did = did.clone();
                    async move { client.follow(&did).await }
                })
                .await
                .context("Follow failed")?;
                Ok(AsyncResult::Followed { handle })
            }
            AsyncCommand::Post { account, draft } => {
                let posted = self
                    .with_client(&account, |client| {
                        let draft = draft.clone();
                        async move { client.post(&draft).await }
                    })
                    .await
                    .context("Post failed")?;
                Ok(AsyncResult::Posted { uri: posted.uri })
            }
            AsyncCommand::ToggleBookmark { account, post } => {
                let bookmarked = self
                    .with_client(&account, |client| {
                        let post = post.clone();
                        async move {
                            let records = client.records();
                            Bookmarks::new(&records).toggle(&post).await
                        }
                    })
                    .await
                    .context("Bookmark failed")?;
                Ok(AsyncResult::BookmarkToggled { post, bookmarked })
            }
            AsyncCommand::LoadBookmarks { account } => {
                let (posts, uris) = self
                    .with_client(&account, |client| async move {
                        let records = client.records();
                        let bookmarks = Bookmarks::new(&records);
                        let uris = bookmarks.list().await?.into_iter().map(|b| b.subject.uri).collect();
                        let posts = bookmarks.hydrate(&client).await?;
                        Ok((posts, uris))
                    })
                    .await
                    .context("Failed to load bookmarks")?;
                Ok(AsyncResult::BookmarksLoaded { posts, uris })
            }
            AsyncCommand::LoadArticles { account } => {
                let articles = self
                    .with_client(&account, |client| async move {
                        let records = client.records();
                        Articles::new(&records).list().await
                    })
                    .await
                    .context("Failed to load articles")?;
                Ok(AsyncResult::ArticlesLoaded { articles })
            }
            AsyncCommand::DeleteArticle { account, rkey } => {
                self.with_client(&account, |client| {
                    let rkey = rkey.clone();
                    async move {
                        let records = client.records();
                        Articles::new(&records).delete(&rkey).await
                    }
                })
                .await
                .context("Failed to delete article")?;
                Ok(AsyncResult::ArticleDeleted { rkey })
            }
            AsyncCommand::RecordView { rkey } => {
                let views = self.companion.record_view(&format!("article/{rkey}")).await?;
                Ok(AsyncResult::ViewCounted { rkey, views })
            }
            AsyncCommand::Assist { request } => {
                let text = self
                    .companion
                    .generate(&request)
                    .await
                    .context("Assistant unavailable")?;
                Ok(AsyncResult::Assisted { text })
            }
            AsyncCommand::CheckVerified { dids } => {
                let mut verified = Vec::new();
                for did in &dids {
                    match self.companion.verification(did).await {
                        Ok(status) if status.verified => verified.push(did.clone()),
                        Ok(_) => {}
                        // badges are cosmetic; a missing companion service isn't worth a status line
                        Err(e) => tracing::debug!(%did, "verification lookup failed: {e:#}"),
                    }
                }
                Ok(AsyncResult::VerificationChecked { checked: dids, verified })
            }
            AsyncCommand::Shutdown => Ok(AsyncResult::Status {
                message: "Shutting down".to_string(),
            }),
        }
    }

    /// Run `op` with the account's client, logging in again once on an expired token
    async fn with_client<T, F, Fut>(&mut self, account: &Account, op: F) -> Result<T>
    where
        F: Fn(BlueskyClient) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let client = self.client(account).await?;
        match op(client).await {
            Err(e) if is_expired_token(&e) => {
                tracing::info!(handle = %account.handle, "session expired, logging in again");
                let client = self.renew(account).await?;
                op(client).await
            }
            other => other,
        }
    }

    async fn client(&mut self, account: &Account) -> Result<BlueskyClient> {
        if let Some(client) = self.clients.get(&account.id) {
            return Ok(client.clone());
        }

        let cached = self
            .credentials
            .as_ref()
            .and_then(|store| store.session(account).ok().flatten());
        let client = match cached {
            Some(session) => BlueskyClient::from_session(&account.pds_url, session),
            None => self.login(account).await?,
        };
        self.clients.insert(account.id, client.clone());
        Ok(client)
    }

    /// Refresh the session, falling back to a password login
    async fn renew(&mut self, account: &Account) -> Result<BlueskyClient> {
        let mut client = match self.clients.remove(&account.id) {
            Some(client) => client,
            None => return self.login(account).await,
        };

        let client = match client.refresh().await {
            Ok(()) => client,
            Err(e) => {
                tracing::debug!("refresh failed, using app password: {e:#}");
                self.login(account).await?
            }
        };
        self.remember(account, &client);
        self.clients.insert(account.id, client.clone());
        Ok(client)
    }

    async fn login(&self, account: &Account) -> Result<BlueskyClient> {
        let store = self.credentials.as_ref().context("Credential store unavailable")?;
        let password = store
            .password(account)?
            .with_context(|| format!("No credentials for @{}; run `skyloft auth`", account.handle))?;
        let client = get_client(account, &password).await?;
        self.remember(account, &client);
        Ok(client)
    }

    fn remember(&self, account: &Account, client: &BlueskyClient) {
        if let Some(store) = &self.credentials
            && let Err(e) = store.store_session(account, client.session())
        {
            tracing::warn!("failed to cache session: {e:#}");
        }
    }
}

async fn load_feed(
    client: &BlueskyClient,
    source: &FeedSource,
    cursor: Option<&str>,
    limit: usize,
) -> Result<FeedPage> {
    match source {
        FeedSource::Home => client.timeline(cursor, limit).await,
        FeedSource::Author { actor } => client.author_feed(actor, cursor, limit).await,
        FeedSource::Search { query } => client.search_posts(query, cursor, limit).await,
        FeedSource::Actor { query } => {
            let actors = client.search_actors(query, 1).await?;
            let actor = actors
                .first()
                .with_context(|| format!("No account matches @{query}"))?;
            client.author_feed(&actor.did, cursor, limit).await
        }
    }
}
