//! TUI Application module

mod async_ops;
mod events;
mod state;
mod ui;

pub use state::{AppState, ComposeState, FeedSource, Mode, View};

use anyhow::Result;
use crossterm::{
    event::{self, Event},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::prelude::*;
use std::io::stdout;
use std::time::Duration;
use tokio::runtime::Runtime;

use crate::config::Config;
use crate::db::Database;

use async_ops::{AsyncCommand, AsyncHandle, AsyncResult, spawn_worker};

/// Run the TUI application
pub fn run(config: Config) -> Result<()> {
    let rt = Runtime::new()?;
    let db = Database::open()?;

    // The worker is a tokio task, so it has to be spawned inside the runtime
    let async_handle = {
        let _guard = rt.enter();
        spawn_worker(&config.server_url, config.post_limit)
    };

    // Initialize terminal
    enable_raw_mode()?;
    let mut stdout = stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;
    terminal.clear()?;

    let result = AppState::new(config, db).and_then(|mut state| {
        if let Some(cmd) = events::refresh(&mut state) {
            let _ = async_handle.cmd_tx.blocking_send(cmd);
        }
        run_app(&mut terminal, &mut state, async_handle)
    });

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    result
}

fn run_app(
    terminal: &mut Terminal<CrosstermBackend<std::io::Stdout>>,
    state: &mut AppState,
    mut async_handle: AsyncHandle,
) -> Result<()> {
    loop {
        // Process any async results
        while let Ok(result) = async_handle.result_rx.try_recv() {
            if let Some(cmd) = handle_async_result(state, result) {
                let _ = async_handle.cmd_tx.blocking_send(cmd);
            }
        }

        // Badge lookups for authors we have not asked about yet
        let dids = state.unchecked_authors();
        if !dids.is_empty() {
            state.verification_checked.extend(dids.iter().cloned());
            let _ = async_handle.cmd_tx.blocking_send(AsyncCommand::CheckVerified { dids });
        }

        terminal.draw(|frame| ui::render(frame, state))?;

        if event::poll(Duration::from_millis(50))?
            && let Event::Key(key) = event::read()?
            && let Some(cmd) = events::handle_key(state, key)
        {
            let _ = async_handle.cmd_tx.blocking_send(cmd);
        }

        // Tick for animations
        state.tick();

        if state.should_quit {
            let _ = async_handle.cmd_tx.blocking_send(AsyncCommand::Shutdown);
            break;
        }
    }

    // Save config on exit
    state.config.save()?;

    Ok(())
}

fn handle_async_result(state: &mut AppState, result: AsyncResult) -> Option<AsyncCommand> {
    match result {
        AsyncResult::FeedLoaded { source, page, append } => {
            if source == FeedSource::Home
                && let Some(did) = state.account().map(|a| a.did.clone())
                && let Err(e) = state.db.cache_posts(&did, &page.posts)
            {
                tracing::warn!("failed to cache timeline: {e:#}");
            }
            let count = page.posts.len();
            state.set_feed(source, page.posts, page.cursor, append);
            state.loading = false;
            if append {
                state.set_status(format!("Loaded {count} more posts"));
            } else {
                state.set_status(format!("Loaded {} posts", state.posts.len()));
            }
            None
        }
        AsyncResult::Liked { uri, like_uri } => {
            state.update_post(&uri, |p| {
                if p.viewer_like.is_none() {
                    p.like_count += 1;
                }
                p.viewer_like = Some(like_uri.clone());
            });
            state.set_status("♥ Liked");
            None
        }
        AsyncResult::Unliked { uri } => {
            state.update_post(&uri, |p| {
                if p.viewer_like.is_some() {
                    p.like_count = p.like_count.saturating_sub(1);
                }
                p.viewer_like = None;
            });
            state.set_status("Unliked");
            None
        }
        AsyncResult::Reposted { uri, repost_uri } => {
            state.update_post(&uri, |p| {
                if p.viewer_repost.is_none() {
                    p.repost_count += 1;
                }
                p.viewer_repost = Some(repost_uri.clone());
            });
            state.set_status("🔁 Reposted");
            None
        }
        AsyncResult::Unreposted { uri } => {
            state.update_post(&uri, |p| {
                if p.viewer_repost.is_some() {
                    p.repost_count = p.repost_count.saturating_sub(1);
                }
                p.viewer_repost = None;
            });
            state.set_status("Repost removed");
            None
        }
        AsyncResult::Followed { handle } => {
            state.set_status(format!("Following @{handle}"));
            None
        }
        AsyncResult::Posted { uri } => {
            tracing::info!(%uri, "post created");
            state.loading = false;
            state.set_status("✅ Posted");
            if state.source == FeedSource::Home {
                return events::refresh(state);
            }
            None
        }
        AsyncResult::BookmarkToggled { post, bookmarked } => {
            state.set_status(if bookmarked { "🔖 Bookmarked" } else { "Bookmark removed" });
            state.apply_bookmark(post, bookmarked);
            None
        }
        AsyncResult::BookmarksLoaded { posts, uris } => {
            state.loading = false;
            state.set_status(format!("{} bookmarks", posts.len()));
            state.set_bookmarks(posts, uris);
            None
        }
        AsyncResult::ArticlesLoaded { articles } => {
            state.loading = false;
            state.set_status(format!("{} articles", articles.len()));
            state.articles = articles;
            state.selected_article = state.selected_article.min(state.articles.len().saturating_sub(1));
            None
        }
        AsyncResult::ArticleDeleted { rkey } => {
            state.articles.retain(|a| a.rkey != rkey);
            state.article_views.remove(&rkey);
            state.selected_article = state.selected_article.min(state.articles.len().saturating_sub(1));
            state.set_status("Article deleted");
            None
        }
        AsyncResult::ViewCounted { rkey, views } => {
            state.article_views.insert(rkey, views);
            None
        }
        AsyncResult::Assisted { text } => {
            state.compose.assisting = false;
            if state.mode == Mode::Compose {
                state.compose.text = text;
                state.set_status("✨ Suggestion ready");
            }
            None
        }
        AsyncResult::VerificationChecked { checked, verified } => {
            state.verification_checked.extend(checked);
            state.verified.extend(verified);
            None
        }
        AsyncResult::Error { message } => {
            state.set_status(format!("❌ {message}"));
            state.loading = false;
            state.compose.assisting = false;
            None
        }
        AsyncResult::Status { message } => {
            state.set_status(message);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::FeedPage;
    use crate::models::{Account, Author, Post};

    fn post(n: u32) -> Post {
        Post::new(
            &format!("at://did:plc:bob/app.bsky.feed.post/{n}"),
            "cid",
            Author {
                did: "did:plc:bob".into(),
                handle: "bob.test".into(),
                ..Default::default()
            },
        )
    }

    fn signed_in() -> AppState {
        let db = Database::open_in_memory().unwrap();
        let mut account = Account::new("did:plc:alice", "alice.test", "Alice");
        account.is_default = true;
        db.upsert_account(&account).unwrap();
        AppState::new(Config::default(), db).unwrap()
    }

    #[test]
    fn test_home_feed_is_cached() {
        let mut state = signed_in();
        let page = FeedPage {
            posts: vec![post(1), post(2)],
            cursor: Some("c1".into()),
        };
        handle_async_result(
            &mut state,
            AsyncResult::FeedLoaded {
                source: FeedSource::Home,
                page,
                append: false,
            },
        );

        assert_eq!(state.posts.len(), 2);
        assert_eq!(state.cursor.as_deref(), Some("c1"));
        assert_eq!(state.db.get_cached_posts("did:plc:alice", 10).unwrap().len(), 2);
    }

    #[test]
    fn test_like_updates_counts_once() {
        let mut state = signed_in();
        state.set_feed(FeedSource::Home, vec![post(1)], None, false);
        let uri = state.posts[0].uri.clone();

        for _ in 0..2 {
            handle_async_result(
                &mut state,
                AsyncResult::Liked {
                    uri: uri.clone(),
                    like_uri: "at://did:plc:alice/app.bsky.feed.like/x".into(),
                },
            );
        }
        assert_eq!(state.posts[0].like_count, 1);
        assert!(state.posts[0].liked());

        handle_async_result(&mut state, AsyncResult::Unliked { uri });
        assert_eq!(state.posts[0].like_count, 0);
        assert!(!state.posts[0].liked());
    }

    #[test]
    fn test_assist_result_only_lands_in_open_composer() {
        let mut state = signed_in();
        state.open_compose();
        state.compose.assisting = true;
        handle_async_result(&mut state, AsyncResult::Assisted { text: "better".into() });
        assert_eq!(state.compose.text, "better");
        assert!(!state.compose.assisting);

        state.close_compose();
        handle_async_result(&mut state, AsyncResult::Assisted { text: "late".into() });
        assert_ne!(state.compose.text, "late");
    }

    #[test]
    fn test_errors_clear_loading() {
        let mut state = signed_in();
        state.loading = true;
        handle_async_result(&mut state, AsyncResult::Error { message: "boom".into() });
        assert!(!state.loading);
        assert!(state.status.contains("boom"));
    }

    #[test]
    fn test_verification_results_are_remembered() {
        let mut state = signed_in();
        handle_async_result(
            &mut state,
            AsyncResult::VerificationChecked {
                checked: vec!["did:plc:bob".into(), "did:plc:eve".into()],
                verified: vec!["did:plc:bob".into()],
            },
        );
        assert!(state.verified.contains("did:plc:bob"));
        assert!(!state.verified.contains("did:plc:eve"));
        assert!(state.verification_checked.contains("did:plc:eve"));
    }
}
