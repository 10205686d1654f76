//! Event handling

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

use super::async_ops::AsyncCommand;
use super::state::{AppState, FeedSource, Mode, View};
use crate::assist::GenerateRequest;
use crate::theme::Theme;

/// Handle key events, returning an optional async command
pub fn handle_key(state: &mut AppState, key: KeyEvent) -> Option<AsyncCommand> {
    match state.mode {
        Mode::ThemePicker => {
            handle_theme_picker_key(state, key);
            return None;
        }
        Mode::Help => {
            if matches!(key.code, KeyCode::Esc | KeyCode::Char('?' | 'q') | KeyCode::Enter) {
                state.mode = Mode::Normal;
            }
            return None;
        }
        Mode::Compose => return handle_compose_key(state, key),
        Mode::Search => return handle_search_key(state, key),
        Mode::Normal => {}
    }

    // Global shortcuts
    match (key.modifiers, key.code) {
        (KeyModifiers::CONTROL, KeyCode::Char('c')) | (_, KeyCode::Char('q')) => {
            state.should_quit = true;
            return None;
        }
        (_, KeyCode::Char('?') | KeyCode::F(1)) => {
            state.mode = Mode::Help;
            return None;
        }
        (_, KeyCode::BackTab) => {
            state.prev_view();
            return on_view_change(state);
        }
        (_, KeyCode::Tab) => {
            state.next_view();
            return on_view_change(state);
        }
        (_, KeyCode::Char('t')) => {
            state.theme_picker_index = Theme::all()
                .iter()
                .position(|t| *t == state.theme.inner())
                .unwrap_or(0);
            state.mode = Mode::ThemePicker;
            return None;
        }
        (_, KeyCode::Char('/')) => {
            state.search_query.clear();
            state.mode = Mode::Search;
            return None;
        }
        (_, KeyCode::Char('n')) => {
            state.open_compose();
            return None;
        }
        (_, KeyCode::Char('j') | KeyCode::Down) => {
            if state.select_next() {
                return load_more(state);
            }
            return None;
        }
        (_, KeyCode::Char('k') | KeyCode::Up) => {
            state.select_prev();
            return None;
        }
        (_, KeyCode::Char('g') | KeyCode::Home) => {
            state.select_edge(false);
            return None;
        }
        (_, KeyCode::Char('G') | KeyCode::End) => {
            state.select_edge(true);
            return None;
        }
        (_, KeyCode::Char('r')) => return refresh(state),
        _ => {}
    }

    match state.view {
        View::Timeline | View::Bookmarks => handle_post_key(state, key),
        View::Articles => handle_articles_key(state, key),
        View::Accounts => handle_accounts_key(state, key),
    }
}

/// Lazily load tabs the first time they're shown
fn on_view_change(state: &mut AppState) -> Option<AsyncCommand> {
    let account = state.account()?.clone();
    match state.view {
        View::Bookmarks if state.bookmarks.is_empty() && !state.loading => {
            state.loading = true;
            Some(AsyncCommand::LoadBookmarks { account })
        }
        View::Articles if state.articles.is_empty() && !state.loading => {
            state.loading = true;
            Some(AsyncCommand::LoadArticles { account })
        }
        _ => None,
    }
}

/// Reload whatever the current tab shows
pub fn refresh(state: &mut AppState) -> Option<AsyncCommand> {
    if state.loading {
        return None;
    }
    let Some(account) = state.account().cloned() else {
        state.set_status("⚠ No account yet; run `skyloft auth`");
        return None;
    };
    let cmd = match state.view {
        View::Timeline | View::Accounts => AsyncCommand::LoadFeed {
            account,
            source: state.source.clone(),
            cursor: None,
        },
        View::Bookmarks => AsyncCommand::LoadBookmarks { account },
        View::Articles => AsyncCommand::LoadArticles { account },
    };
    state.loading = true;
    state.set_status("Refreshing...");
    Some(cmd)
}

fn load_more(state: &mut AppState) -> Option<AsyncCommand> {
    if state.loading {
        return None;
    }
    let cursor = state.cursor.clone()?;
    let account = state.account()?.clone();
    state.loading = true;
    state.set_status("Loading more...");
    Some(AsyncCommand::LoadFeed {
        account,
        source: state.source.clone(),
        cursor: Some(cursor),
    })
}

fn load_source(state: &mut AppState, source: FeedSource) -> Option<AsyncCommand> {
    let account = state.account()?.clone();
    state.view = View::Timeline;
    state.loading = true;
    state.set_status(format!("Loading {}...", source.label()));
    Some(AsyncCommand::LoadFeed {
        account,
        source,
        cursor: None,
    })
}

fn handle_post_key(state: &mut AppState, key: KeyEvent) -> Option<AsyncCommand> {
    // Esc backs out of author feeds and searches
    if key.code == KeyCode::Esc {
        state.clear_status();
        if state.view == View::Timeline && state.source != FeedSource::Home {
            return load_source(state, FeedSource::Home);
        }
        return None;
    }

    let post = state.selected_post()?.clone();
    let Some(account) = state.account().cloned() else {
        state.set_status("⚠ No account yet; run `skyloft auth`");
        return None;
    };

    match key.code {
        KeyCode::Char('R') => {
            state.open_reply(post);
            None
        }
        KeyCode::Char('Q') => {
            state.open_quote(post);
            None
        }
        KeyCode::Char('l') => {
            if post.liked() {
                state.set_status("Unliking...");
                Some(AsyncCommand::Unlike { account, post })
            } else {
                state.set_status("Liking...");
                Some(AsyncCommand::Like { account, post })
            }
        }
        KeyCode::Char('b') => {
            if post.reposted() {
                state.set_status("Undoing repost...");
                Some(AsyncCommand::Unrepost { account, post })
            } else {
                state.set_status("Reposting...");
                Some(AsyncCommand::Repost { account, post })
            }
        }
        KeyCode::Char('m') => {
            state.set_status("Saving bookmark...");
            Some(AsyncCommand::ToggleBookmark { account, post })
        }
        KeyCode::Char('f') => {
            if post.author.did == account.did {
                state.set_status("⚠ That's you");
                return None;
            }
            state.set_status(format!("Following @{}...", post.author.handle));
            Some(AsyncCommand::Follow {
                account,
                did: post.author.did,
                handle: post.author.handle,
            })
        }
        KeyCode::Char('p') => load_source(
            state,
            FeedSource::Author {
                actor: post.author.handle,
            },
        ),
        KeyCode::Char('o') => {
            match open::that(post.web_url()) {
                Ok(()) => state.set_status("✓ Opened in browser"),
                Err(e) => state.set_status(format!("❌ Could not open browser: {e}")),
            }
            None
        }
        _ => None,
    }
}

fn handle_articles_key(state: &mut AppState, key: KeyEvent) -> Option<AsyncCommand> {
    let article = state.selected_article()?.clone();
    match key.code {
        KeyCode::Enter => Some(AsyncCommand::RecordView { rkey: article.rkey }),
        KeyCode::Char('d') => {
            let account = state.account()?.clone();
            state.set_status(format!("Deleting \"{}\"...", article.title));
            Some(AsyncCommand::DeleteArticle {
                account,
                rkey: article.rkey,
            })
        }
        KeyCode::Esc => {
            state.clear_status();
            None
        }
        _ => None,
    }
}

fn handle_accounts_key(state: &mut AppState, key: KeyEvent) -> Option<AsyncCommand> {
    match key.code {
        KeyCode::Enter => {
            let account = state.accounts.get(state.selected_account)?.clone();
            if let Err(e) = state.db.set_default_account(account.id) {
                state.set_status(format!("❌ {e}"));
                return None;
            }
            for a in &mut state.accounts {
                a.is_default = a.id == account.id;
            }
            state.active_account = state.selected_account;
            state.bookmarks.clear();
            state.bookmarked.clear();
            state.articles.clear();
            state.set_status(format!("✓ Switched to {}", account.at_handle()));
            load_source(state, FeedSource::Home)
        }
        KeyCode::Esc => {
            state.clear_status();
            None
        }
        _ => None,
    }
}

fn handle_compose_key(state: &mut AppState, key: KeyEvent) -> Option<AsyncCommand> {
    match (key.modifiers, key.code) {
        (_, KeyCode::Esc) => {
            state.close_compose();
            None
        }
        (KeyModifiers::CONTROL, KeyCode::Enter | KeyCode::Char('p')) => {
            let draft = state.compose.to_post_draft();
            if let Err(e) = draft.validate() {
                state.set_status(format!("⚠ {e}"));
                return None;
            }
            let Some(account) = state.account().cloned() else {
                state.set_status("⚠ No account yet; run `skyloft auth`");
                return None;
            };
            state.discard_draft();
            state.close_compose();
            state.loading = true;
            state.set_status("Posting...");
            Some(AsyncCommand::Post { account, draft })
        }
        (KeyModifiers::CONTROL, KeyCode::Char('s')) => {
            match state.save_draft() {
                Ok(()) => state.set_status("✓ Draft saved"),
                Err(e) => state.set_status(format!("❌ {e}")),
            }
            None
        }
        (KeyModifiers::CONTROL, KeyCode::Char('t')) => {
            state.compose.assist_mode = state.compose.assist_mode.next();
            state.set_status(format!("Assist mode: {}", state.compose.assist_mode));
            None
        }
        (KeyModifiers::CONTROL, KeyCode::Char('g')) => {
            if state.compose.assisting {
                return None;
            }
            if state.compose.text.trim().is_empty() {
                state.set_status("⚠ Write something for the assistant to work with");
                return None;
            }
            state.compose.assisting = true;
            state.set_status(format!("✨ Asking assistant ({})...", state.compose.assist_mode));
            Some(AsyncCommand::Assist {
                request: GenerateRequest {
                    prompt: state.compose.text.clone(),
                    mode: state.compose.assist_mode,
                    context: state.compose.reply_to.as_ref().map(|p| p.text.clone()),
                    max_tokens: None,
                },
            })
        }
        (_, KeyCode::Enter) => {
            state.compose.text.push('\n');
            None
        }
        (_, KeyCode::Backspace) => {
            state.compose.text.pop();
            None
        }
        (m, KeyCode::Char(c)) if !m.contains(KeyModifiers::CONTROL) => {
            state.compose.text.push(c);
            None
        }
        _ => None,
    }
}

fn handle_search_key(state: &mut AppState, key: KeyEvent) -> Option<AsyncCommand> {
    match key.code {
        KeyCode::Esc => {
            state.mode = Mode::Normal;
            state.search_query.clear();
            None
        }
        KeyCode::Enter => {
            let query = state.search_query.trim().to_string();
            state.mode = Mode::Normal;
            state.search_query.clear();
            if query.is_empty() {
                return None;
            }
            let source = match query.strip_prefix('@') {
                Some(actor) if actor.contains('.') || actor.starts_with("did:") => FeedSource::Author {
                    actor: actor.to_string(),
                },
                Some(actor) => FeedSource::Actor {
                    query: actor.to_string(),
                },
                None => FeedSource::Search { query },
            };
            load_source(state, source)
        }
        KeyCode::Char(c) => {
            state.search_query.push(c);
            None
        }
        KeyCode::Backspace => {
            state.search_query.pop();
            None
        }
        _ => None,
    }
}

fn handle_theme_picker_key(state: &mut AppState, key: KeyEvent) {
    let themes = Theme::all();
    let len = themes.len();

    match key.code {
        KeyCode::Esc => {
            // restore the saved theme
            state.theme = state.config.theme;
            state.mode = Mode::Normal;
        }
        KeyCode::Enter => {
            let selected = Theme::from(themes[state.theme_picker_index]);
            state.theme = selected;
            state.config.theme = selected;
            state.mode = Mode::Normal;
            state.set_status(format!("✓ Theme set to {}", selected.name()));
        }
        KeyCode::Down | KeyCode::Char('j') => {
            state.theme_picker_index = (state.theme_picker_index + 1) % len;
            state.theme = Theme::from(themes[state.theme_picker_index]);
        }
        KeyCode::Up | KeyCode::Char('k') => {
            state.theme_picker_index = state.theme_picker_index.checked_sub(1).unwrap_or(len - 1);
            state.theme = Theme::from(themes[state.theme_picker_index]);
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::db::Database;
    use crate::models::{Account, Author, Post};

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn ctrl(c: char) -> KeyEvent {
        KeyEvent::new(KeyCode::Char(c), KeyModifiers::CONTROL)
    }

    fn state_with_post() -> AppState {
        let db = Database::open_in_memory().unwrap();
        db.upsert_account(&Account::new("did:plc:me", "me.test", "Me")).unwrap();
        let mut state = AppState::new(Config::default(), db).unwrap();
        let post = Post::new(
            "at://did:plc:bob/app.bsky.feed.post/1",
            "cid",
            Author {
                did: "did:plc:bob".into(),
                handle: "bob.test".into(),
                ..Default::default()
            },
        );
        state.set_feed(FeedSource::Home, vec![post], Some("next".into()), false);
        state
    }

    #[test]
    fn test_like_toggles_on_viewer_state() {
        let mut state = state_with_post();
        assert!(matches!(handle_key(&mut state, key(KeyCode::Char('l'))), Some(AsyncCommand::Like { .. })));

        state.posts[0].viewer_like = Some("at://did:plc:me/app.bsky.feed.like/x".into());
        assert!(matches!(handle_key(&mut state, key(KeyCode::Char('l'))), Some(AsyncCommand::Unlike { .. })));
    }

    #[test]
    fn test_author_feed_and_escape_home() {
        let mut state = state_with_post();
        match handle_key(&mut state, key(KeyCode::Char('p'))) {
            Some(AsyncCommand::LoadFeed { source, cursor, .. }) => {
                assert_eq!(source, FeedSource::Author { actor: "bob.test".into() });
                assert!(cursor.is_none());
            }
            other => panic!("unexpected {other:?}"),
        }

        state.loading = false;
        state.source = FeedSource::Author { actor: "bob.test".into() };
        match handle_key(&mut state, key(KeyCode::Esc)) {
            Some(AsyncCommand::LoadFeed { source, .. }) => assert_eq!(source, FeedSource::Home),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_moving_past_the_end_loads_next_page() {
        let mut state = state_with_post();
        match handle_key(&mut state, key(KeyCode::Char('j'))) {
            Some(AsyncCommand::LoadFeed { cursor, .. }) => assert_eq!(cursor.as_deref(), Some("next")),
            other => panic!("unexpected {other:?}"),
        }
        // one page at a time
        assert!(handle_key(&mut state, key(KeyCode::Char('j'))).is_none());
    }

    #[test]
    fn test_search_prefixes() {
        let mut state = state_with_post();
        handle_key(&mut state, key(KeyCode::Char('/')));
        assert_eq!(state.mode, Mode::Search);
        for c in "@alice".chars() {
            handle_key(&mut state, key(KeyCode::Char(c)));
        }
        match handle_key(&mut state, key(KeyCode::Enter)) {
            Some(AsyncCommand::LoadFeed { source, .. }) => {
                assert_eq!(source, FeedSource::Actor { query: "alice".into() });
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(state.mode, Mode::Normal);
    }

    #[test]
    fn test_compose_rejects_overlong_post() {
        let mut state = state_with_post();
        handle_key(&mut state, key(KeyCode::Char('n')));
        assert_eq!(state.mode, Mode::Compose);
        state.compose.text = "x".repeat(301);

        assert!(handle_key(&mut state, ctrl('p')).is_none());
        assert_eq!(state.mode, Mode::Compose);
        assert!(state.status.contains("limit"));

        state.compose.text = "hello".into();
        match handle_key(&mut state, ctrl('p')) {
            Some(AsyncCommand::Post { draft, .. }) => assert_eq!(draft.text, "hello"),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(state.mode, Mode::Normal);
    }

    #[test]
    fn test_assist_carries_reply_context() {
        let mut state = state_with_post();
        handle_key(&mut state, key(KeyCode::Char('R')));
        state.posts.clear();
        state.compose.reply_to.as_mut().unwrap().text = "original".into();

        match handle_key(&mut state, ctrl('g')) {
            Some(AsyncCommand::Assist { request }) => {
                assert_eq!(request.context.as_deref(), Some("original"));
                assert_eq!(request.prompt, "@bob.test ");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(handle_key(&mut state, ctrl('g')).is_none());
    }

    #[test]
    fn test_typing_q_in_composer_does_not_quit() {
        let mut state = state_with_post();
        handle_key(&mut state, key(KeyCode::Char('n')));
        handle_key(&mut state, key(KeyCode::Char('q')));
        assert!(!state.should_quit);
        assert_eq!(state.compose.text, "q");
    }
}
