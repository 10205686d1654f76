//! Bluesky (AT Protocol) API client

use std::collections::HashMap;

use anyhow::{Context, Result, bail, ensure};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::embed::EmbedView;
use crate::models::{Author, Post, PostRecord, Profile, ReplyRef, StrongRef, rkey_of};
use crate::richtext::{self, Facet, HandleResolver, MAX_POST_GRAPHEMES};

use super::records::AppRecords;
use super::xrpc::{Xrpc, XrpcError};
use super::{FeedPage, PostLookup, SocialApi};

/// Default PDS URL for Bluesky
pub const DEFAULT_PDS_URL: &str = "https://bsky.social";

/// `getPosts` accepts at most this many URIs per call
pub const GET_POSTS_CHUNK: usize = 25;

/// Images allowed on a single post
pub const MAX_IMAGES: usize = 4;

const POST: &str = "app.bsky.feed.post";
const LIKE: &str = "app.bsky.feed.like";
const REPOST: &str = "app.bsky.feed.repost";
const FOLLOW: &str = "app.bsky.graph.follow";

/// Tokens and identity of a logged-in account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Account DID
    pub did: String,
    /// Account handle
    pub handle: String,
    /// Short-lived access token
    #[serde(rename = "accessJwt")]
    pub access_jwt: String,
    /// Long-lived refresh token
    #[serde(rename = "refreshJwt")]
    pub refresh_jwt: String,
}

/// An image to attach to a new post
#[derive(Debug, Clone)]
pub struct ImageUpload {
    /// Raw image bytes
    pub data: Vec<u8>,
    /// MIME type, e.g. `image/jpeg`
    pub mime: String,
    /// Alt text
    pub alt: String,
}

impl ImageUpload {
    /// Read an image from disk, guessing the MIME type from the extension
    pub fn from_path(path: &std::path::Path, alt: &str) -> Result<Self> {
        let data = std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        let mime = match ext.as_str() {
            "png" => "image/png",
            "gif" => "image/gif",
            "webp" => "image/webp",
            "jpg" | "jpeg" => "image/jpeg",
            other => bail!("Unsupported image type: .{other}"),
        };
        Ok(Self {
            data,
            mime: mime.to_string(),
            alt: alt.to_string(),
        })
    }
}

/// Everything needed to publish a post
#[derive(Debug, Clone, Default)]
pub struct PostDraft {
    /// Post text; facets are detected from it
    pub text: String,
    /// Thread pointers when replying
    pub reply: Option<ReplyRef>,
    /// Post being quoted
    pub quote: Option<StrongRef>,
    /// Images to upload and attach
    pub images: Vec<ImageUpload>,
    /// Language tags
    pub langs: Vec<String>,
}

impl PostDraft {
    /// A plain text post
    pub fn text(text: &str) -> Self {
        Self {
            text: text.to_string(),
            ..Self::default()
        }
    }

    /// Check length and attachment limits
    pub fn validate(&self) -> Result<()> {
        ensure!(
            !self.text.trim().is_empty() || !self.images.is_empty() || self.quote.is_some(),
            "Post is empty"
        );
        let len = richtext::grapheme_len(&self.text);
        ensure!(
            len <= MAX_POST_GRAPHEMES,
            "Post is {len} characters, the limit is {MAX_POST_GRAPHEMES}"
        );
        ensure!(
            self.images.len() <= MAX_IMAGES,
            "At most {MAX_IMAGES} images per post"
        );
        Ok(())
    }
}

/// Bluesky API client bound to a logged-in session
#[derive(Debug, Clone)]
pub struct BlueskyClient {
    xrpc: Xrpc,
    session: Session,
}

impl BlueskyClient {
    /// Login to Bluesky using the default PDS
    pub async fn login(handle: &str, app_password: &str) -> Result<Self> {
        Self::login_with_pds(handle, app_password, DEFAULT_PDS_URL).await
    }

    /// Login to Bluesky with a custom PDS URL
    pub async fn login_with_pds(handle: &str, app_password: &str, pds_url: &str) -> Result<Self> {
        let xrpc = Xrpc::new(pds_url);

        let session: Session = xrpc
            .procedure(
                "com.atproto.server.createSession",
                &json!({ "identifier": handle, "password": app_password }),
            )
            .await
            .context("Bluesky login failed")?;

        tracing::info!(did = %session.did, handle = %session.handle, "logged in");
        Ok(Self::from_session(pds_url, session))
    }

    /// Create a client from an existing session
    pub fn from_session(pds_url: &str, session: Session) -> Self {
        let xrpc = Xrpc::new(pds_url).authed(&session.access_jwt);
        Self { xrpc, session }
    }

    /// Exchange the refresh token for a fresh session
    pub async fn refresh(&mut self) -> Result<()> {
        let refresher = Xrpc::with_client(self.xrpc.http().clone(), self.xrpc.base())
            .authed(&self.session.refresh_jwt);
        let session: Session = refresher
            .procedure_empty("com.atproto.server.refreshSession")
            .await
            .context("Failed to refresh session")?;
        self.xrpc.set_token(Some(session.access_jwt.clone()));
        self.session = session;
        Ok(())
    }

    /// The current session
    pub const fn session(&self) -> &Session {
        &self.session
    }

    /// DID of the logged-in account
    pub fn did(&self) -> &str {
        &self.session.did
    }

    /// Handle of the logged-in account
    pub fn handle(&self) -> &str {
        &self.session.handle
    }

    /// PDS base URL
    pub fn pds_url(&self) -> &str {
        self.xrpc.base()
    }

    /// Authenticated XRPC endpoint
    pub const fn xrpc(&self) -> &Xrpc {
        &self.xrpc
    }

    /// App-state records in this account's repository
    pub fn records(&self) -> AppRecords {
        AppRecords::new(self.xrpc.clone(), &self.session.did)
    }

    // ==================== Reads ====================

    /// Home timeline
    pub async fn timeline(&self, cursor: Option<&str>, limit: usize) -> Result<FeedPage> {
        let mut params = vec![("limit", limit.to_string())];
        if let Some(c) = cursor {
            params.push(("cursor", c.to_string()));
        }
        let out: FeedResponse = self
            .xrpc
            .query("app.bsky.feed.getTimeline", &params)
            .await
            .context("Failed to fetch timeline")?;
        Ok(out.into_page())
    }

    /// Posts and reposts by one account
    pub async fn author_feed(&self, actor: &str, cursor: Option<&str>, limit: usize) -> Result<FeedPage> {
        let mut params = vec![("actor", actor.to_string()), ("limit", limit.to_string())];
        if let Some(c) = cursor {
            params.push(("cursor", c.to_string()));
        }
        let out: FeedResponse = self
            .xrpc
            .query("app.bsky.feed.getAuthorFeed", &params)
            .await
            .with_context(|| format!("Failed to fetch posts by {actor}"))?;
        Ok(out.into_page())
    }

    /// A thread, flattened: ancestors first, then the post, then replies depth-first
    pub async fn thread(&self, uri: &str) -> Result<Vec<Post>> {
        let out: ThreadResponse = self
            .xrpc
            .query("app.bsky.feed.getPostThread", &[("uri", uri), ("depth", "6")])
            .await
            .context("Failed to fetch thread")?;
        Ok(flatten_thread(out.thread))
    }

    /// Hydrate posts by URI, preserving request order and skipping missing ones
    pub async fn posts(&self, uris: &[String]) -> Result<Vec<Post>> {
        fetch_posts(&self.xrpc, uris).await
    }

    /// A profile by handle or DID
    pub async fn profile(&self, actor: &str) -> Result<Profile> {
        self.xrpc
            .query("app.bsky.actor.getProfile", &[("actor", actor)])
            .await
            .with_context(|| format!("Failed to fetch profile {actor}"))
    }

    /// Full-text post search
    pub async fn search_posts(&self, q: &str, cursor: Option<&str>, limit: usize) -> Result<FeedPage> {
        let mut params = vec![("q", q.to_string()), ("limit", limit.to_string())];
        if let Some(c) = cursor {
            params.push(("cursor", c.to_string()));
        }
        let out: SearchPostsResponse = self
            .xrpc
            .query("app.bsky.feed.searchPosts", &params)
            .await
            .context("Post search failed")?;
        Ok(FeedPage {
            posts: out.posts.into_iter().map(PostView::into_post).collect(),
            cursor: out.cursor,
        })
    }

    /// Account search
    pub async fn search_actors(&self, q: &str, limit: usize) -> Result<Vec<Profile>> {
        #[derive(Deserialize)]
        struct Actors {
            actors: Vec<Profile>,
        }
        let out: Actors = self
            .xrpc
            .query(
                "app.bsky.actor.searchActors",
                &[("q", q.to_string()), ("limit", limit.to_string())],
            )
            .await
            .context("Account search failed")?;
        Ok(out.actors)
    }

    /// Resolve a handle to a DID
    pub async fn resolve_handle(&self, handle: &str) -> Result<String> {
        resolve_handle(&self.xrpc, handle).await
    }

    // ==================== Writes ====================

    /// Publish a post; returns its strong ref
    pub async fn post(&self, draft: &PostDraft) -> Result<StrongRef> {
        draft.validate()?;

        let detected = richtext::detect_facets(&draft.text);
        let facets: Vec<Facet> = richtext::resolve_facets(detected, self).await;

        let mut images = Vec::with_capacity(draft.images.len());
        for image in &draft.images {
            let blob = self.upload_blob(image.data.clone(), &image.mime).await?;
            images.push(json!({ "alt": image.alt, "image": blob }));
        }

        let embed = build_embed(images, draft.quote.as_ref());
        let record = NewPost {
            kind: POST,
            text: &draft.text,
            facets,
            reply: draft.reply.as_ref(),
            embed,
            langs: &draft.langs,
            created_at: now(),
        };

        let created = self.create_record(POST, &record).await.context("Failed to post")?;
        tracing::info!(uri = %created.uri, "posted");
        Ok(created)
    }

    /// Delete one of the logged-in account's posts
    pub async fn delete_post(&self, uri: &str) -> Result<()> {
        ensure!(
            uri.starts_with(&format!("at://{}/", self.session.did)),
            "Only your own posts can be deleted"
        );
        self.delete_record(POST, rkey_of(uri)).await.context("Failed to delete post")
    }

    /// Upload a blob; returns the blob ref to embed in a record
    pub async fn upload_blob(&self, data: Vec<u8>, mime: &str) -> Result<Value> {
        #[derive(Deserialize)]
        struct Uploaded {
            blob: Value,
        }
        let out: Uploaded = self
            .xrpc
            .upload("com.atproto.repo.uploadBlob", mime, data)
            .await
            .context("Failed to upload image")?;
        Ok(out.blob)
    }

    /// Like a post; returns the like record URI
    pub async fn like(&self, post: &Post) -> Result<String> {
        let created = self
            .create_record(LIKE, &SubjectRecord::new(LIKE, post.strong_ref()))
            .await
            .context("Failed to like post")?;
        Ok(created.uri)
    }

    /// Remove the viewer's like, if any
    pub async fn unlike(&self, post: &Post) -> Result<()> {
        let Some(like) = &post.viewer_like else {
            return Ok(());
        };
        self.delete_record(LIKE, rkey_of(like)).await.context("Failed to unlike post")
    }

    /// Repost a post; returns the repost record URI
    pub async fn repost(&self, post: &Post) -> Result<String> {
        let created = self
            .create_record(REPOST, &SubjectRecord::new(REPOST, post.strong_ref()))
            .await
            .context("Failed to repost")?;
        Ok(created.uri)
    }

    /// Undo the viewer's repost, if any
    pub async fn unrepost(&self, post: &Post) -> Result<()> {
        let Some(repost) = &post.viewer_repost else {
            return Ok(());
        };
        self.delete_record(REPOST, rkey_of(repost)).await.context("Failed to undo repost")
    }

    /// Follow an account by DID; returns the follow record URI
    pub async fn follow(&self, did: &str) -> Result<String> {
        let record = json!({ "$type": FOLLOW, "subject": did, "createdAt": now() });
        let created = self.create_record(FOLLOW, &record).await.context("Failed to follow")?;
        Ok(created.uri)
    }

    /// Delete a follow record
    pub async fn unfollow(&self, follow_uri: &str) -> Result<()> {
        self.delete_record(FOLLOW, rkey_of(follow_uri)).await.context("Failed to unfollow")
    }

    async fn create_record<T: Serialize>(&self, collection: &str, record: &T) -> Result<StrongRef, XrpcError> {
        self.xrpc
            .procedure(
                "com.atproto.repo.createRecord",
                &json!({ "repo": self.session.did, "collection": collection, "record": record }),
            )
            .await
    }

    async fn delete_record(&self, collection: &str, rkey: &str) -> Result<(), XrpcError> {
        self.xrpc
            .procedure_unit(
                "com.atproto.repo.deleteRecord",
                &json!({ "repo": self.session.did, "collection": collection, "rkey": rkey }),
            )
            .await
    }
}

impl SocialApi for BlueskyClient {
    async fn timeline(&self, cursor: Option<&str>, limit: usize) -> Result<FeedPage> {
        Self::timeline(self, cursor, limit).await
    }

    async fn author_feed(&self, actor: &str, cursor: Option<&str>, limit: usize) -> Result<FeedPage> {
        Self::author_feed(self, actor, cursor, limit).await
    }

    async fn search_posts(&self, q: &str, cursor: Option<&str>, limit: usize) -> Result<FeedPage> {
        Self::search_posts(self, q, cursor, limit).await
    }

    async fn thread(&self, uri: &str) -> Result<Vec<Post>> {
        Self::thread(self, uri).await
    }

    async fn post(&self, draft: &PostDraft) -> Result<StrongRef> {
        Self::post(self, draft).await
    }

    async fn like(&self, post: &Post) -> Result<String> {
        Self::like(self, post).await
    }

    async fn unlike(&self, post: &Post) -> Result<()> {
        Self::unlike(self, post).await
    }

    async fn repost(&self, post: &Post) -> Result<String> {
        Self::repost(self, post).await
    }

    async fn unrepost(&self, post: &Post) -> Result<()> {
        Self::unrepost(self, post).await
    }

    async fn follow(&self, did: &str) -> Result<String> {
        Self::follow(self, did).await
    }

    async fn unfollow(&self, follow_uri: &str) -> Result<()> {
        Self::unfollow(self, follow_uri).await
    }
}

impl PostLookup for BlueskyClient {
    async fn posts(&self, uris: &[String]) -> Result<Vec<Post>> {
        Self::posts(self, uris).await
    }
}

impl HandleResolver for BlueskyClient {
    async fn resolve_handle(&self, handle: &str) -> Result<String> {
        Self::resolve_handle(self, handle).await
    }
}

pub(crate) async fn resolve_handle(xrpc: &Xrpc, handle: &str) -> Result<String> {
    #[derive(Deserialize)]
    struct Resolved {
        did: String,
    }
    let handle = handle.trim_start_matches('@');
    let out: Resolved = xrpc
        .query("com.atproto.identity.resolveHandle", &[("handle", handle)])
        .await
        .with_context(|| format!("Could not resolve @{handle}"))?;
    Ok(out.did)
}

pub(crate) async fn fetch_posts(xrpc: &Xrpc, uris: &[String]) -> Result<Vec<Post>> {
    let mut by_uri: HashMap<String, Post> = HashMap::with_capacity(uris.len());

    for chunk in uris.chunks(GET_POSTS_CHUNK) {
        let params: Vec<(&str, &str)> = chunk.iter().map(|u| ("uris", u.as_str())).collect();
        let out: PostsResponse = xrpc
            .query("app.bsky.feed.getPosts", &params)
            .await
            .context("Failed to fetch posts")?;
        for view in out.posts {
            let post = view.into_post();
            by_uri.insert(post.uri.clone(), post);
        }
    }

    Ok(uris.iter().filter_map(|uri| by_uri.remove(uri)).collect())
}

fn build_embed(images: Vec<Value>, quote: Option<&StrongRef>) -> Option<Value> {
    let media = (!images.is_empty()).then(|| json!({ "$type": "app.bsky.embed.images", "images": images }));
    let record = quote.map(|q| json!({ "$type": "app.bsky.embed.record", "record": q }));

    match (media, record) {
        (Some(media), Some(record)) => Some(json!({
            "$type": "app.bsky.embed.recordWithMedia",
            "record": record,
            "media": media,
        })),
        (media, record) => media.or(record),
    }
}

fn now() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

// ==================== API Types ====================

#[derive(Debug, Serialize)]
struct NewPost<'a> {
    #[serde(rename = "$type")]
    kind: &'static str,
    text: &'a str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    facets: Vec<Facet>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply: Option<&'a ReplyRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    embed: Option<Value>,
    #[serde(skip_serializing_if = "<[String]>::is_empty")]
    langs: &'a [String],
    #[serde(rename = "createdAt")]
    created_at: String,
}

/// Like and repost records share this shape
#[derive(Debug, Serialize)]
struct SubjectRecord {
    #[serde(rename = "$type")]
    kind: &'static str,
    subject: StrongRef,
    #[serde(rename = "createdAt")]
    created_at: String,
}

impl SubjectRecord {
    fn new(kind: &'static str, subject: StrongRef) -> Self {
        Self {
            kind,
            subject,
            created_at: now(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct FeedResponse {
    feed: Vec<FeedViewPost>,
    #[serde(default)]
    cursor: Option<String>,
}

impl FeedResponse {
    fn into_page(self) -> FeedPage {
        FeedPage {
            posts: self.feed.into_iter().map(FeedViewPost::into_post).collect(),
            cursor: self.cursor,
        }
    }
}

#[derive(Debug, Deserialize)]
struct FeedViewPost {
    post: PostView,
    #[serde(default)]
    reason: Option<FeedReason>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "$type")]
enum FeedReason {
    #[serde(rename = "app.bsky.feed.defs#reasonRepost")]
    Repost { by: Author },
    #[serde(other)]
    Other,
}

impl FeedViewPost {
    fn into_post(self) -> Post {
        let mut post = self.post.into_post();
        if let Some(FeedReason::Repost { by }) = self.reason {
            post.reposted_by = Some(by);
        }
        post
    }
}

#[derive(Debug, Deserialize)]
struct PostsResponse {
    posts: Vec<PostView>,
}

#[derive(Debug, Deserialize)]
struct SearchPostsResponse {
    posts: Vec<PostView>,
    #[serde(default)]
    cursor: Option<String>,
}

/// `app.bsky.feed.defs#postView`
#[derive(Debug, Deserialize)]
pub(crate) struct PostView {
    uri: String,
    cid: String,
    author: Author,
    #[serde(default)]
    record: PostRecord,
    #[serde(default)]
    embed: Option<EmbedView>,
    #[serde(rename = "replyCount", default)]
    reply_count: u32,
    #[serde(rename = "repostCount", default)]
    repost_count: u32,
    #[serde(rename = "likeCount", default)]
    like_count: u32,
    #[serde(rename = "quoteCount", default)]
    quote_count: u32,
    #[serde(rename = "indexedAt", default)]
    indexed_at: String,
    #[serde(default)]
    viewer: ViewerState,
}

/// Viewer state for a post (whether current user liked/reposted)
#[derive(Debug, Deserialize, Default)]
struct ViewerState {
    #[serde(default)]
    like: Option<String>,
    #[serde(default)]
    repost: Option<String>,
}

impl PostView {
    pub(crate) fn into_post(self) -> Post {
        let created_at = DateTime::parse_from_rfc3339(&self.record.created_at)
            .or_else(|_| DateTime::parse_from_rfc3339(&self.indexed_at))
            .map_or_else(|_| Utc::now(), |dt| dt.with_timezone(&Utc));

        Post {
            uri: self.uri,
            cid: self.cid,
            author: self.author,
            text: self.record.text,
            facets: self.record.facets,
            embed: self.embed,
            created_at,
            reply_count: self.reply_count,
            repost_count: self.repost_count,
            like_count: self.like_count,
            quote_count: self.quote_count,
            viewer_like: self.viewer.like,
            viewer_repost: self.viewer.repost,
            reply: self.record.reply,
            reposted_by: None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ThreadResponse {
    thread: ThreadNode,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "$type")]
enum ThreadNode {
    #[serde(rename = "app.bsky.feed.defs#threadViewPost")]
    Post {
        post: PostView,
        #[serde(default)]
        parent: Option<Box<ThreadNode>>,
        #[serde(default)]
        replies: Vec<ThreadNode>,
    },
    #[serde(other)]
    Missing,
}

fn flatten_thread(root: ThreadNode) -> Vec<Post> {
    let ThreadNode::Post { post, parent, replies } = root else {
        return Vec::new();
    };

    let mut ancestors = Vec::new();
    let mut next = parent;
    while let Some(node) = next {
        match *node {
            ThreadNode::Post { post, parent, .. } => {
                ancestors.push(post.into_post());
                next = parent;
            }
            ThreadNode::Missing => break,
        }
    }
    ancestors.reverse();

    let mut out = ancestors;
    out.push(post.into_post());
    push_replies(replies, &mut out);
    out
}

fn push_replies(replies: Vec<ThreadNode>, out: &mut Vec<Post>) {
    for reply in replies {
        if let ThreadNode::Post { post, replies, .. } = reply {
            out.push(post.into_post());
            push_replies(replies, out);
        }
    }
}
