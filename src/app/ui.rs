//! UI rendering for the TUI

use ratatui::{
    Frame,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Block, BorderType, Borders, Clear, List, ListItem, ListState, Paragraph, Tabs, Wrap},
};

use super::state::{AppState, Mode, View};
use crate::embed::EmbedView;
use crate::embed::render::{RenderContext, render_post};
use crate::models::Post;
use crate::richtext::MAX_POST_GRAPHEMES;
use crate::theme::{Theme, ThemeColors};

/// Skyloft icon
const ICON: &str = "🦋";

/// Spinner animation frames
const SPINNER: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];

/// Main render function
pub fn render(frame: &mut Frame, state: &AppState) {
    let colors = state.theme.colors();

    let area = frame.area();
    frame.render_widget(Block::default().style(Style::default().bg(colors.bg)), area);

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Tabs
            Constraint::Min(0),    // Main content
            Constraint::Length(1), // Status bar
        ])
        .split(area);

    render_tabs(frame, state, &colors, chunks[0]);
    match state.view {
        View::Timeline => {
            let title = format!(" {} ", state.source.label());
            render_posts_view(frame, state, &colors, chunks[1], &title, &state.posts, state.selected_post);
        }
        View::Bookmarks => render_posts_view(
            frame,
            state,
            &colors,
            chunks[1],
            " 🔖 Bookmarks ",
            &state.bookmarks,
            state.selected_bookmark,
        ),
        View::Articles => render_articles_view(frame, state, &colors, chunks[1]),
        View::Accounts => render_accounts_view(frame, state, &colors, chunks[1]),
    }
    render_status_bar(frame, state, &colors, chunks[2]);

    match state.mode {
        Mode::Help => render_help_popup(frame, &colors),
        Mode::ThemePicker => render_theme_picker(frame, state, &colors),
        Mode::Compose => render_compose_popup(frame, state, &colors),
        Mode::Search => render_search_popup(frame, state, &colors),
        Mode::Normal => {}
    }
}

fn panel<'a>(title: impl Into<Line<'a>>, colors: &ThemeColors, focused: bool) -> Block<'a> {
    Block::default()
        .title(title)
        .title_style(colors.text_primary())
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .border_style(if focused { colors.block_focus() } else { colors.block() })
}

fn render_tabs(frame: &mut Frame, state: &AppState, colors: &ThemeColors, area: Rect) {
    let titles: Vec<Line> = View::all()
        .iter()
        .map(|v| {
            let dot = if *v == state.view { "●" } else { "○" };
            Line::from(format!("{dot}  {}", v.title()))
        })
        .collect();

    let account = state
        .account()
        .map_or_else(|| "not signed in".to_string(), |a| a.at_handle());

    let tabs = Tabs::new(titles)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_type(BorderType::Rounded)
                .border_style(colors.block())
                .title(Line::from(vec![
                    Span::styled(format!(" {ICON} "), colors.logo_icon()),
                    Span::styled("Skyloft ", colors.logo_text()),
                ]))
                .title(Line::from(format!(" {account} ")).right_aligned()),
        )
        .select(state.view.index())
        .style(colors.tab())
        .highlight_style(colors.tab_active())
        .divider(Span::styled(" │ ", colors.text_muted()));

    frame.render_widget(tabs, area);
}

fn empty_hint<'a>(colors: &ThemeColors, message: &'a str, loading: bool) -> Vec<ListItem<'a>> {
    if loading {
        return vec![ListItem::new(Line::from(Span::styled("  ⏳ Loading...", colors.text_muted())))];
    }
    vec![
        ListItem::new(Line::from("")),
        ListItem::new(Line::from(vec![
            Span::styled("  ℹ ", colors.text_info()),
            Span::styled(message, colors.text_muted()),
        ])),
        ListItem::new(Line::from("")),
        ListItem::new(Line::from(vec![
            Span::styled("  Press ", colors.text_dim()),
            Span::styled("[r]", colors.key_hint()),
            Span::styled(" to refresh", colors.text_dim()),
        ])),
    ]
}

/// Badge, viewer state and attachment markers after the author name
fn post_marks(post: &Post, state: &AppState) -> String {
    let mut marks = String::new();
    if state.verified.contains(&post.author.did) {
        marks.push_str(" ✓");
    }
    if post.liked() {
        marks.push_str(" ♥");
    }
    if post.reposted() {
        marks.push_str(" 🔁");
    }
    if state.bookmarked.contains(&post.uri) {
        marks.push_str(" 🔖");
    }
    match post.embed.as_ref().map(EmbedView::media_count) {
        Some(0) => marks.push_str(" 📎"),
        Some(n) => marks.push_str(&format!(" 📷{n}")),
        None => {}
    }
    marks
}

fn post_item<'a>(post: &Post, state: &AppState, colors: &ThemeColors, width: usize) -> ListItem<'a> {
    let marks = post_marks(post, state);
    let mut header = vec![
        Span::styled(format!(" {}", post.author.name()), colors.text_primary()),
        Span::styled(format!(" · {}", post.relative_time()), colors.text_muted()),
        Span::styled(marks, colors.badge()),
    ];
    if let Some(by) = &post.reposted_by {
        header.insert(0, Span::styled(format!(" 🔁 {}", by.name()), colors.text_dim()));
    }

    let preview = post.preview(width.saturating_sub(4).max(8));
    ListItem::new(vec![
        Line::from(header),
        Line::from(Span::styled(format!("   {preview}"), colors.text())),
        Line::from(""),
    ])
}

fn render_posts_view(
    frame: &mut Frame,
    state: &AppState,
    colors: &ThemeColors,
    area: Rect,
    title: &str,
    posts: &[Post],
    selected: usize,
) {
    let halves = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(45), Constraint::Percentage(55)])
        .split(area);

    let width = halves[0].width.saturating_sub(3) as usize;
    let items: Vec<ListItem> = if posts.is_empty() {
        empty_hint(colors, "Nothing here yet", state.loading)
    } else {
        posts.iter().map(|p| post_item(p, state, colors, width)).collect()
    };

    let more = if state.view == View::Timeline && state.cursor.is_some() {
        " ↓ more"
    } else {
        ""
    };
    let list = List::new(items)
        .block(panel(format!("{title}({}){more} ", posts.len()), colors, true))
        .highlight_style(colors.selected());
    let mut list_state = ListState::default();
    if !posts.is_empty() {
        list_state.select(Some(selected));
    }
    frame.render_stateful_widget(list, halves[0], &mut list_state);

    let detail = panel(" 📝 Post ", colors, false);
    let Some(post) = posts.get(selected) else {
        frame.render_widget(detail, halves[1]);
        return;
    };

    let ctx = RenderContext {
        colors,
        max_depth: state.config.embed_depth,
        verified: &state.verified,
    };
    let mut lines = vec![Line::from("")];
    lines.extend(render_post(post, &ctx));
    if state.bookmarked.contains(&post.uri) {
        lines.push(Line::from(Span::styled("🔖 Bookmarked", colors.text_info())));
    }
    lines.push(Line::from(""));
    lines.push(Line::from(Span::styled(post.web_url(), colors.text_dim())));

    let paragraph = Paragraph::new(lines).block(detail).wrap(Wrap { trim: false });
    frame.render_widget(paragraph, halves[1]);
}

fn render_articles_view(frame: &mut Frame, state: &AppState, colors: &ThemeColors, area: Rect) {
    let halves = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(40), Constraint::Percentage(60)])
        .split(area);

    let items: Vec<ListItem> = if state.articles.is_empty() {
        empty_hint(colors, "No articles; write one with `skyloft articles new`", state.loading)
    } else {
        state
            .articles
            .iter()
            .map(|a| {
                ListItem::new(vec![
                    Line::from(Span::styled(format!(" {}", a.title), colors.text_primary())),
                    Line::from(Span::styled(
                        format!("   {} min read · {}", a.reading_minutes(), a.created_at.get(..10).unwrap_or(a.created_at.as_str())),
                        colors.text_muted(),
                    )),
                    Line::from(""),
                ])
            })
            .collect()
    };

    let list = List::new(items)
        .block(panel(format!(" 📄 Articles ({}) ", state.articles.len()), colors, true))
        .highlight_style(colors.selected());
    let mut list_state = ListState::default();
    if !state.articles.is_empty() {
        list_state.select(Some(state.selected_article));
    }
    frame.render_stateful_widget(list, halves[0], &mut list_state);

    let detail = panel(" 📖 Read ", colors, false);
    let Some(article) = state.selected_article() else {
        frame.render_widget(detail, halves[1]);
        return;
    };

    let mut meta = vec![Span::styled(
        format!("{} words · {} min", article.word_count(), article.reading_minutes()),
        colors.text_muted(),
    )];
    if let Some(views) = state.article_views.get(&article.rkey) {
        meta.push(Span::styled(format!(" · 👁 {views}"), colors.text_muted()));
    }
    if let Some(updated) = &article.updated_at {
        meta.push(Span::styled(format!(" · edited {}", updated.get(..10).unwrap_or(updated.as_str())), colors.text_dim()));
    }

    let mut lines = vec![
        Line::from(""),
        Line::from(Span::styled(article.title.clone(), colors.text_primary().add_modifier(Modifier::BOLD))),
        Line::from(meta),
    ];
    if !article.tags.is_empty() {
        let tags = article.tags.iter().map(|t| format!("#{t}")).collect::<Vec<_>>().join(" ");
        lines.push(Line::from(Span::styled(tags, colors.hashtag())));
    }
    lines.push(Line::from(""));
    lines.extend(article.body.lines().map(|l| Line::from(Span::styled(l.to_string(), colors.text()))));

    let paragraph = Paragraph::new(lines).block(detail).wrap(Wrap { trim: false });
    frame.render_widget(paragraph, halves[1]);
}

fn render_accounts_view(frame: &mut Frame, state: &AppState, colors: &ThemeColors, area: Rect) {
    let items: Vec<ListItem> = if state.accounts.is_empty() {
        vec![
            ListItem::new(Line::from("")),
            ListItem::new(Line::from(vec![
                Span::styled("  No accounts. Run ", colors.text_muted()),
                Span::styled("skyloft auth", colors.key_hint()),
                Span::styled(" to sign in with an app password.", colors.text_muted()),
            ])),
        ]
    } else {
        state
            .accounts
            .iter()
            .enumerate()
            .map(|(i, a)| {
                let active = if i == state.active_account { "● " } else { "  " };
                let badge = if state.verified.contains(&a.did) { " ✓" } else { "" };
                ListItem::new(vec![
                    Line::from(vec![
                        Span::styled(format!(" {active}"), colors.text_success()),
                        Span::styled(a.display_name.clone(), colors.text_primary()),
                        Span::styled(badge, colors.badge()),
                        Span::styled(format!("  {}", a.at_handle()), colors.text_muted()),
                    ]),
                    Line::from(Span::styled(format!("     {} · {}", a.did, a.pds_url), colors.text_dim())),
                    Line::from(""),
                ])
            })
            .collect()
    };

    let list = List::new(items)
        .block(
            panel(" 👥 Accounts ", colors, true)
                .title_bottom(Line::from(" ↵ switch account ").centered()),
        )
        .highlight_style(colors.selected());
    let mut list_state = ListState::default();
    if !state.accounts.is_empty() {
        list_state.select(Some(state.selected_account));
    }
    frame.render_stateful_widget(list, area, &mut list_state);
}

fn render_status_bar(frame: &mut Frame, state: &AppState, colors: &ThemeColors, area: Rect) {
    let loading = if state.loading {
        let frame_idx = (state.current_tick() / 2) as usize % SPINNER.len();
        format!("{} ", SPINNER[frame_idx])
    } else {
        String::new()
    };

    let content = if state.status.is_empty() {
        let mut spans = vec![Span::styled(" ", Style::default()), Span::styled(loading, colors.text_secondary())];
        for (key, what) in [("Tab", "views"), ("n", "post"), ("/", "search"), ("?", "help"), ("q", "quit")] {
            spans.push(Span::styled(key, colors.key_hint()));
            spans.push(Span::styled(format!(": {what}  "), colors.text_muted()));
        }
        spans
    } else {
        vec![
            Span::styled(" ", Style::default()),
            Span::styled(loading, colors.text_secondary()),
            Span::styled(state.status.clone(), colors.text_secondary()),
        ]
    };

    let status = Paragraph::new(Line::from(content)).style(Style::default().bg(colors.bg_secondary));
    frame.render_widget(status, area);
}

const HELP: &[(&str, &[(&str, &str)])] = &[
    (
        "Navigation",
        &[
            ("Tab / Shift+Tab", "Switch views"),
            ("j/k or ↑/↓", "Move (past the end loads more)"),
            ("g/G", "First/last item"),
            ("r", "Refresh"),
            ("Esc", "Back to home feed"),
        ],
    ),
    (
        "Posts",
        &[
            ("n", "New post"),
            ("R", "Reply"),
            ("Q", "Quote"),
            ("l", "Like/unlike"),
            ("b", "Repost/undo"),
            ("m", "Bookmark/unbookmark"),
            ("f", "Follow author"),
            ("p", "Author's posts"),
            ("o", "Open in browser"),
            ("/", "Search (@name for accounts)"),
        ],
    ),
    (
        "Compose",
        &[
            ("Ctrl+P / Ctrl+Enter", "Publish"),
            ("Ctrl+G", "Ask the assistant"),
            ("Ctrl+T", "Cycle assist mode"),
            ("Ctrl+S", "Save draft"),
            ("Esc", "Close"),
        ],
    ),
    (
        "Articles & Accounts",
        &[("Enter", "Read article / switch account"), ("d", "Delete article")],
    ),
    ("General", &[("t", "Theme"), ("?", "Toggle this help"), ("q", "Quit")]),
];

fn render_help_popup(frame: &mut Frame, colors: &ThemeColors) {
    let popup_area = centered_rect(50, 80, frame.area());
    frame.render_widget(Clear, popup_area);

    let mut lines = vec![Line::from("")];
    for (section, keys) in HELP {
        lines.push(Line::from(Span::styled(
            format!("  {section}"),
            colors.text_primary().add_modifier(Modifier::BOLD),
        )));
        for (key, what) in *keys {
            lines.push(Line::from(vec![
                Span::styled(format!("  {key:<22}"), colors.key_hint()),
                Span::styled(*what, colors.text()),
            ]));
        }
        lines.push(Line::from(""));
    }
    lines.push(Line::from(vec![
        Span::styled("  Press ", colors.text_muted()),
        Span::styled("Esc", colors.key_hint()),
        Span::styled(" or ", colors.text_muted()),
        Span::styled("?", colors.key_hint()),
        Span::styled(" to close", colors.text_muted()),
    ]));

    let help = Paragraph::new(lines)
        .block(
            panel(" ⌨ Keyboard Shortcuts ", colors, true).style(Style::default().bg(colors.bg_secondary)),
        )
        .wrap(Wrap { trim: false });
    frame.render_widget(help, popup_area);
}

fn render_theme_picker(frame: &mut Frame, state: &AppState, colors: &ThemeColors) {
    let popup_area = centered_rect(50, 70, frame.area());
    frame.render_widget(Clear, popup_area);

    let themes = Theme::all();
    let items: Vec<ListItem> = themes
        .iter()
        .enumerate()
        .map(|(i, theme_name)| {
            let palette = theme_name.palette();
            let selected = i == state.theme_picker_index;
            let label = format!("  {} {} ", if selected { "▸" } else { " " }, theme_name.display_name());
            let style = if selected {
                Style::default()
                    .fg(palette.accent)
                    .bg(palette.selection)
                    .add_modifier(Modifier::BOLD)
            } else {
                Style::default().fg(palette.fg).bg(colors.bg)
            };

            ListItem::new(Line::from(vec![
                Span::styled(label, style),
                Span::styled("█", Style::default().fg(palette.accent).bg(colors.bg)),
                Span::styled("█", Style::default().fg(palette.secondary).bg(colors.bg)),
                Span::styled("█", Style::default().fg(palette.success).bg(colors.bg)),
                Span::styled("█", Style::default().fg(palette.warning).bg(colors.bg)),
            ]))
        })
        .collect();

    let list = List::new(items).style(Style::default().bg(colors.bg)).block(
        panel(
            format!(" 🎨 Select Theme ({}/{}) ", state.theme_picker_index + 1, themes.len()),
            colors,
            true,
        )
        .style(Style::default().bg(colors.bg))
        .title_bottom(Line::from(" ↑↓ navigate │ ↵ apply │ Esc cancel ").centered()),
    );
    frame.render_widget(list, popup_area);
}

fn render_compose_popup(frame: &mut Frame, state: &AppState, colors: &ThemeColors) {
    let popup_area = centered_rect(60, 55, frame.area());
    frame.render_widget(Clear, popup_area);

    let compose = &state.compose;
    let mut content = vec![Line::from("")];

    if let Some(reply_to) = &compose.reply_to {
        content.push(Line::from(vec![
            Span::styled("  ↩ Replying to ", colors.text_dim()),
            Span::styled(reply_to.author.handle.clone(), colors.text_primary()),
            Span::styled(format!(": {}", reply_to.preview(50)), colors.text_muted()),
        ]));
        content.push(Line::from(""));
    }
    if let Some(quote) = &compose.quote {
        content.push(Line::from(vec![
            Span::styled("  ❝ Quoting ", colors.text_dim()),
            Span::styled(quote.author.handle.clone(), colors.text_primary()),
            Span::styled(format!(": {}", quote.preview(50)), colors.text_muted()),
        ]));
        content.push(Line::from(""));
    }

    let cursor = if state.current_tick() / 5 % 2 == 0 { "▏" } else { " " };
    let mut text_lines: Vec<&str> = compose.text.split('\n').collect();
    let last = text_lines.pop().unwrap_or_default();
    for line in text_lines {
        content.push(Line::from(Span::styled(format!("  {line}"), colors.text())));
    }
    content.push(Line::from(vec![
        Span::styled(format!("  {last}"), colors.text()),
        Span::styled(cursor, colors.text_primary()),
    ]));

    let remaining = compose.remaining();
    let counter_style = if remaining < 0 {
        colors.text_error()
    } else if remaining < 20 {
        colors.text_warning()
    } else {
        colors.text_muted()
    };
    let assist = if compose.assisting {
        format!("✨ {}…", compose.assist_mode)
    } else {
        format!("✨ {}", compose.assist_mode)
    };

    let title = match (&compose.reply_to, &compose.quote) {
        (Some(_), _) => " ↩ Reply ",
        (_, Some(_)) => " ❝ Quote ",
        _ => " ✏ New Post ",
    };
    let block = panel(title, colors, true)
        .style(Style::default().bg(colors.bg))
        .title(Line::from(Span::styled(
            format!(" {}/{MAX_POST_GRAPHEMES} ", compose.length()),
            counter_style,
        )).right_aligned())
        .title_bottom(
            Line::from(format!(" ^P post │ ^G {assist} │ ^T mode │ ^S draft │ Esc close ")).centered(),
        );

    let paragraph = Paragraph::new(content).block(block).wrap(Wrap { trim: false });
    frame.render_widget(paragraph, popup_area);
}

fn render_search_popup(frame: &mut Frame, state: &AppState, colors: &ThemeColors) {
    let area = frame.area();
    let popup_area = Rect {
        x: area.width / 4,
        y: area.height / 3,
        width: area.width / 2,
        height: 5,
    }
    .intersection(area);
    frame.render_widget(Clear, popup_area);

    let content = vec![
        Line::from(""),
        Line::from(vec![
            Span::styled("  🔍 ", colors.text_primary()),
            Span::styled(state.search_query.clone(), colors.text()),
            Span::styled("▏", colors.text_primary()),
        ]),
    ];
    let search = Paragraph::new(content).alignment(Alignment::Left).block(
        panel(" Search posts, or @someone ", colors, true)
            .style(Style::default().bg(colors.bg))
            .title_bottom(Line::from(" ↵ search │ Esc cancel ").centered()),
    );
    frame.render_widget(search, popup_area);
}

const fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_width = r.width * percent_x / 100;
    let popup_height = r.height * percent_y / 100;
    Rect {
        x: r.x + (r.width.saturating_sub(popup_width)) / 2,
        y: r.y + (r.height.saturating_sub(popup_height)) / 2,
        width: popup_width,
        height: popup_height,
    }
}
