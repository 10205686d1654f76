//! Application state

use std::collections::{HashMap, HashSet};

use anyhow::Result;
use uuid::Uuid;

use crate::api::PostDraft;
use crate::articles::Article;
use crate::assist::AssistMode;
use crate::config::Config;
use crate::db::Database;
use crate::models::{Account, Draft, Post};
use crate::richtext::{MAX_POST_GRAPHEMES, grapheme_len};
use crate::theme::Theme;

/// Top-level tabs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum View {
    #[default]
    Timeline,
    Bookmarks,
    Articles,
    Accounts,
}

impl View {
    /// Tabs in display order
    pub const fn all() -> [Self; 4] {
        [Self::Timeline, Self::Bookmarks, Self::Articles, Self::Accounts]
    }

    pub const fn title(self) -> &'static str {
        match self {
            Self::Timeline => "Timeline",
            Self::Bookmarks => "Bookmarks",
            Self::Articles => "Articles",
            Self::Accounts => "Accounts",
        }
    }

    pub const fn next(self) -> Self {
        match self {
            Self::Timeline => Self::Bookmarks,
            Self::Bookmarks => Self::Articles,
            Self::Articles => Self::Accounts,
            Self::Accounts => Self::Timeline,
        }
    }

    pub const fn prev(self) -> Self {
        match self {
            Self::Timeline => Self::Accounts,
            Self::Bookmarks => Self::Timeline,
            Self::Articles => Self::Bookmarks,
            Self::Accounts => Self::Articles,
        }
    }

    pub const fn index(self) -> usize {
        match self {
            Self::Timeline => 0,
            Self::Bookmarks => 1,
            Self::Articles => 2,
            Self::Accounts => 3,
        }
    }
}

/// Modal popups
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    #[default]
    Normal,
    Compose,
    Search,
    Help,
    ThemePicker,
}

/// Where the timeline tab's posts come from
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum FeedSource {
    /// Following feed
    #[default]
    Home,
    /// One account's posts
    Author { actor: String },
    /// Post search results
    Search { query: String },
    /// Best actor match for a query, then their posts
    Actor { query: String },
}

impl FeedSource {
    /// Title shown above the list
    pub fn label(&self) -> String {
        match self {
            Self::Home => "🏠 Home".to_string(),
            Self::Author { actor } => format!("👤 @{}", actor.trim_start_matches('@')),
            Self::Search { query } => format!("🔍 {query}"),
            Self::Actor { query } => format!("🔍 @{query}"),
        }
    }
}

/// Composer buffer and its targets
#[derive(Debug, Clone, Default)]
pub struct ComposeState {
    /// Text being written
    pub text: String,
    /// Post being replied to
    pub reply_to: Option<Post>,
    /// Post being quoted
    pub quote: Option<Post>,
    /// Id of the saved draft this came from
    pub draft_id: Option<Uuid>,
    /// Assist mode used by Ctrl+G
    pub assist_mode: AssistMode,
    /// Waiting on the assistant
    pub assisting: bool,
}

impl ComposeState {
    /// Length in graphemes, the unit the post limit is counted in
    pub fn length(&self) -> usize {
        grapheme_len(&self.text)
    }

    /// Characters left; negative when over the limit
    pub fn remaining(&self) -> i64 {
        MAX_POST_GRAPHEMES as i64 - self.length() as i64
    }

    /// Build the post to publish
    pub fn to_post_draft(&self) -> PostDraft {
        PostDraft {
            text: self.text.trim_end().to_string(),
            reply: self.reply_to.as_ref().map(Post::reply_ref_for_answer),
            quote: self.quote.as_ref().map(Post::strong_ref),
            ..PostDraft::default()
        }
    }

    /// Snapshot for the drafts table
    pub fn to_saved_draft(&self) -> Draft {
        let mut draft = Draft::new(&self.text);
        if let Some(id) = self.draft_id {
            draft.id = id;
        }
        draft.reply_to = self.reply_to.as_ref().map(|p| p.uri.clone());
        draft.quote = self.quote.as_ref().map(|p| p.uri.clone());
        draft
    }
}

/// Application state
pub struct AppState {
    /// Configuration
    pub config: Config,
    /// Database connection
    pub db: Database,
    /// Whether to quit
    pub should_quit: bool,
    /// Current theme
    pub theme: Theme,
    /// Current tab
    pub view: View,
    /// Open popup
    pub mode: Mode,

    /// Stored accounts
    pub accounts: Vec<Account>,
    /// Account everything runs as
    pub active_account: usize,
    /// Cursor in the accounts tab
    pub selected_account: usize,

    /// Timeline tab posts
    pub posts: Vec<Post>,
    /// Selected timeline post
    pub selected_post: usize,
    /// What the timeline shows
    pub source: FeedSource,
    /// Cursor for the next page of `source`
    pub cursor: Option<String>,

    /// Bookmarked posts, newest first
    pub bookmarks: Vec<Post>,
    /// URIs of bookmarked posts
    pub bookmarked: HashSet<String>,
    /// Selected bookmark
    pub selected_bookmark: usize,

    /// Articles, newest first
    pub articles: Vec<Article>,
    /// Selected article
    pub selected_article: usize,
    /// Article view counts by rkey
    pub article_views: HashMap<String, u64>,

    /// Composer
    pub compose: ComposeState,
    /// Search popup input
    pub search_query: String,
    /// Theme picker cursor
    pub theme_picker_index: usize,

    /// DIDs with a verification badge
    pub verified: HashSet<String>,
    /// DIDs already looked up
    pub verification_checked: HashSet<String>,

    /// Status message (bottom bar)
    pub status: String,
    /// Is loading?
    pub loading: bool,

    tick: u64,
}

impl AppState {
    /// Create a new app state; the timeline starts from the offline cache
    pub fn new(config: Config, db: Database) -> Result<Self> {
        let theme = config.theme;
        let accounts = db.get_accounts()?;
        let active_account = accounts.iter().position(|a| a.is_default).unwrap_or(0);
        let posts = match accounts.get(active_account) {
            Some(account) => db.get_cached_posts(&account.did, config.post_limit)?,
            None => Vec::new(),
        };

        Ok(Self {
            config,
            db,
            should_quit: false,
            theme,
            view: View::Timeline,
            mode: Mode::Normal,
            accounts,
            active_account,
            selected_account: active_account,
            posts,
            selected_post: 0,
            source: FeedSource::Home,
            cursor: None,
            bookmarks: Vec::new(),
            bookmarked: HashSet::new(),
            selected_bookmark: 0,
            articles: Vec::new(),
            selected_article: 0,
            article_views: HashMap::new(),
            compose: ComposeState::default(),
            search_query: String::new(),
            theme_picker_index: 0,
            verified: HashSet::new(),
            verification_checked: HashSet::new(),
            status: String::new(),
            loading: false,
            tick: 0,
        })
    }

    /// Tick for animations
    pub fn tick(&mut self) {
        self.tick = self.tick.wrapping_add(1);
    }

    /// Get current tick
    pub const fn current_tick(&self) -> u64 {
        self.tick
    }

    /// Set status message
    pub fn set_status(&mut self, msg: impl Into<String>) {
        self.status = msg.into();
    }

    /// Clear status message
    pub fn clear_status(&mut self) {
        self.status.clear();
    }

    /// The account requests run as
    pub fn account(&self) -> Option<&Account> {
        self.accounts.get(self.active_account)
    }

    /// The post under the cursor in the current tab
    pub fn selected_post(&self) -> Option<&Post> {
        match self.view {
            View::Timeline => self.posts.get(self.selected_post),
            View::Bookmarks => self.bookmarks.get(self.selected_bookmark),
            View::Articles | View::Accounts => None,
        }
    }

    /// The article under the cursor
    pub fn selected_article(&self) -> Option<&Article> {
        self.articles.get(self.selected_article)
    }

    /// Move the cursor down in the current tab; returns true at the last timeline post
    pub fn select_next(&mut self) -> bool {
        let (index, len) = match self.view {
            View::Timeline => (&mut self.selected_post, self.posts.len()),
            View::Bookmarks => (&mut self.selected_bookmark, self.bookmarks.len()),
            View::Articles => (&mut self.selected_article, self.articles.len()),
            View::Accounts => (&mut self.selected_account, self.accounts.len()),
        };
        if len == 0 {
            return false;
        }
        let at_end = *index + 1 >= len;
        *index = (*index + 1).min(len - 1);
        at_end && self.view == View::Timeline
    }

    /// Move the cursor up in the current tab
    pub fn select_prev(&mut self) {
        let index = match self.view {
            View::Timeline => &mut self.selected_post,
            View::Bookmarks => &mut self.selected_bookmark,
            View::Articles => &mut self.selected_article,
            View::Accounts => &mut self.selected_account,
        };
        *index = index.saturating_sub(1);
    }

    /// Jump to the first or last entry of the current tab
    pub fn select_edge(&mut self, last: bool) {
        let (index, len) = match self.view {
            View::Timeline => (&mut self.selected_post, self.posts.len()),
            View::Bookmarks => (&mut self.selected_bookmark, self.bookmarks.len()),
            View::Articles => (&mut self.selected_article, self.articles.len()),
            View::Accounts => (&mut self.selected_account, self.accounts.len()),
        };
        *index = if last { len.saturating_sub(1) } else { 0 };
    }

    /// Show a new page of the timeline, or append to it
    pub fn set_feed(&mut self, source: FeedSource, posts: Vec<Post>, cursor: Option<String>, append: bool) {
        if append && source == self.source {
            let known: HashSet<String> = self.posts.iter().map(|p| p.uri.clone()).collect();
            self.posts
                .extend(posts.into_iter().filter(|p| !known.contains(&p.uri)));
        } else {
            self.posts = posts;
            self.selected_post = 0;
        }
        self.source = source;
        self.cursor = cursor;
    }

    /// Replace the bookmarks tab
    pub fn set_bookmarks(&mut self, posts: Vec<Post>, uris: Vec<String>) {
        self.bookmarks = posts;
        self.bookmarked = uris.into_iter().collect();
        self.selected_bookmark = self.selected_bookmark.min(self.bookmarks.len().saturating_sub(1));
    }

    /// Record a bookmark toggle in both the set and the tab
    pub fn apply_bookmark(&mut self, post: Post, bookmarked: bool) {
        if bookmarked {
            self.bookmarked.insert(post.uri.clone());
            if !self.bookmarks.iter().any(|p| p.uri == post.uri) {
                self.bookmarks.insert(0, post);
            }
        } else {
            self.bookmarked.remove(&post.uri);
            self.bookmarks.retain(|p| p.uri != post.uri);
            self.selected_bookmark = self.selected_bookmark.min(self.bookmarks.len().saturating_sub(1));
        }
    }

    /// Apply `f` to every loaded copy of a post
    pub fn update_post(&mut self, uri: &str, f: impl Fn(&mut Post)) {
        self.posts
            .iter_mut()
            .chain(self.bookmarks.iter_mut())
            .filter(|p| p.uri == uri)
            .for_each(f);
    }

    /// DIDs of loaded authors that haven't been looked up yet
    pub fn unchecked_authors(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.posts
            .iter()
            .chain(self.bookmarks.iter())
            .map(|p| p.author.did.clone())
            .filter(|did| !self.verification_checked.contains(did) && seen.insert(did.clone()))
            .collect()
    }

    /// Switch to another tab
    pub const fn next_view(&mut self) {
        self.view = self.view.next();
    }

    /// Switch to the previous tab
    pub const fn prev_view(&mut self) {
        self.view = self.view.prev();
    }

    /// Cycle through themes
    pub fn next_theme(&mut self) {
        self.theme = self.theme.next();
        self.config.theme = self.theme;
    }

    /// Open an empty composer, restoring the newest draft if there is one
    pub fn open_compose(&mut self) {
        self.compose = ComposeState::default();
        if let Ok(drafts) = self.db.get_drafts()
            && let Some(draft) = drafts.into_iter().find(|d| d.reply_to.is_none() && d.quote.is_none())
        {
            self.compose.text = draft.text;
            self.compose.draft_id = Some(draft.id);
            self.set_status("Restored draft");
        }
        self.mode = Mode::Compose;
    }

    /// Open the composer replying to `post`
    pub fn open_reply(&mut self, post: Post) {
        self.compose = ComposeState {
            text: format!("@{} ", post.author.handle),
            reply_to: Some(post),
            assist_mode: AssistMode::Reply,
            ..ComposeState::default()
        };
        self.mode = Mode::Compose;
    }

    /// Open the composer quoting `post`
    pub fn open_quote(&mut self, post: Post) {
        self.compose = ComposeState {
            quote: Some(post),
            ..ComposeState::default()
        };
        self.mode = Mode::Compose;
    }

    /// Close the composer without posting
    pub fn close_compose(&mut self) {
        self.mode = Mode::Normal;
    }

    /// Persist the composer buffer as a draft
    pub fn save_draft(&mut self) -> Result<()> {
        let draft = self.compose.to_saved_draft();
        self.db.save_draft(&draft)?;
        self.compose.draft_id = Some(draft.id);
        Ok(())
    }

    /// Drop the draft the composer was restored from, once posted
    pub fn discard_draft(&mut self) {
        if let Some(id) = self.compose.draft_id.take()
            && let Err(e) = self.db.delete_draft(id)
        {
            tracing::warn!("failed to delete draft: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Author, ReplyRef, StrongRef};

    fn post(n: u32, did: &str) -> Post {
        Post::new(
            &format!("at://{did}/app.bsky.feed.post/{n}"),
            &format!("cid{n}"),
            Author {
                did: did.into(),
                handle: format!("{}.test", did.rsplit(':').next().unwrap_or_default()),
                ..Default::default()
            },
        )
    }

    fn state() -> AppState {
        AppState::new(Config::default(), Database::open_in_memory().unwrap()).unwrap()
    }

    #[test]
    fn test_selection_clamps_and_signals_end() {
        let mut state = state();
        state.set_feed(FeedSource::Home, vec![post(1, "did:plc:a"), post(2, "did:plc:b")], None, false);

        assert!(!state.select_next());
        assert_eq!(state.selected_post, 1);
        assert!(state.select_next());
        assert_eq!(state.selected_post, 1);

        state.select_prev();
        state.select_prev();
        assert_eq!(state.selected_post, 0);

        state.view = View::Bookmarks;
        assert!(!state.select_next());
        assert!(state.selected_post().is_none());
    }

    #[test]
    fn test_append_skips_duplicates_and_resets_on_new_source() {
        let mut state = state();
        state.set_feed(FeedSource::Home, vec![post(1, "did:plc:a")], Some("c1".into()), false);
        state.set_feed(
            FeedSource::Home,
            vec![post(1, "did:plc:a"), post(2, "did:plc:a")],
            None,
            true,
        );
        assert_eq!(state.posts.len(), 2);
        assert!(state.cursor.is_none());

        state.selected_post = 1;
        let search = FeedSource::Search { query: "rust".into() };
        state.set_feed(search.clone(), vec![post(9, "did:plc:z")], None, true);
        assert_eq!(state.posts.len(), 1);
        assert_eq!(state.selected_post, 0);
        assert_eq!(state.source, search);
    }

    #[test]
    fn test_reply_draft_points_at_thread_root() {
        let mut state = state();
        let mut parent = post(2, "did:plc:b");
        let root = StrongRef {
            uri: "at://did:plc:a/app.bsky.feed.post/1".into(),
            cid: "cid1".into(),
        };
        parent.reply = Some(ReplyRef {
            root: root.clone(),
            parent: root.clone(),
        });

        state.open_reply(parent.clone());
        assert_eq!(state.mode, Mode::Compose);
        assert_eq!(state.compose.text, "@b.test ");
        assert_eq!(state.compose.assist_mode, AssistMode::Reply);

        state.compose.text.push_str("agreed  ");
        let draft = state.compose.to_post_draft();
        assert_eq!(draft.text, "@b.test agreed");
        let reply = draft.reply.unwrap();
        assert_eq!(reply.root, root);
        assert_eq!(reply.parent.uri, parent.uri);
        assert!(draft.quote.is_none());
    }

    #[test]
    fn test_remaining_counts_graphemes() {
        let mut compose = ComposeState::default();
        compose.text = "👩‍👩‍👧".repeat(10);
        assert_eq!(compose.length(), 10);
        assert_eq!(compose.remaining(), 290);
        compose.text = "a".repeat(301);
        assert_eq!(compose.remaining(), -1);
    }

    #[test]
    fn test_drafts_restore_into_composer() {
        let mut state = state();
        state.open_compose();
        state.compose.text = "later".into();
        state.save_draft().unwrap();
        state.close_compose();

        state.open_compose();
        assert_eq!(state.compose.text, "later");
        state.discard_draft();
        assert!(state.db.get_drafts().unwrap().is_empty());
    }

    #[test]
    fn test_update_post_and_bookmarks() {
        let mut state = state();
        let p = post(1, "did:plc:a");
        state.set_feed(FeedSource::Home, vec![p.clone()], None, false);
        state.apply_bookmark(p.clone(), true);
        assert!(state.bookmarked.contains(&p.uri));

        state.update_post(&p.uri, |p| p.like_count += 1);
        assert_eq!(state.posts[0].like_count, 1);
        assert_eq!(state.bookmarks[0].like_count, 1);

        state.apply_bookmark(p.clone(), false);
        assert!(state.bookmarks.is_empty());
        assert!(!state.bookmarked.contains(&p.uri));
    }

    #[test]
    fn test_unchecked_authors_are_unique() {
        let mut state = state();
        state.set_feed(
            FeedSource::Home,
            vec![post(1, "did:plc:a"), post(2, "did:plc:a"), post(3, "did:plc:b")],
            None,
            false,
        );
        state.verification_checked.insert("did:plc:b".into());
        assert_eq!(state.unchecked_authors(), vec!["did:plc:a".to_string()]);
    }
}
