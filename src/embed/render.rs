//! Render posts, rich text and embeds into styled terminal lines.
//!
//! Quoted posts are rendered recursively with a gutter per level. Once the
//! nesting reaches `max_depth` the renderer stops and emits a single
//! placeholder line instead.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use ratatui::text::{Line, Span};

use super::{EmbedView, RecordView};
use crate::models::{Author, Post, relative_time};
use crate::richtext::{Facet, SegmentKind, segments, truncate_graphemes};
use crate::theme::ThemeColors;

/// Default nesting limit for quoted content
pub const DEFAULT_MAX_DEPTH: usize = 3;

/// Text shown where nesting is cut off
pub const DEPTH_PLACEHOLDER: &str = "⋯ more quoted content";

const GUTTER: &str = "│ ";
const MAX_DESCRIPTION: usize = 140;

/// Everything the renderer needs besides the post itself
pub struct RenderContext<'a> {
    /// Theme colors
    pub colors: &'a ThemeColors,
    /// Quote nesting limit
    pub max_depth: usize,
    /// DIDs that carry a verification badge
    pub verified: &'a HashSet<String>,
}

/// Render a full post: repost note, author line, text, embeds and counts
pub fn render_post(post: &Post, ctx: &RenderContext<'_>) -> Vec<Line<'static>> {
    let mut lines = Vec::new();

    if let Some(by) = &post.reposted_by {
        lines.push(Line::from(Span::styled(
            format!("🔁 Reposted by {}", by.name()),
            ctx.colors.text_muted(),
        )));
    }

    lines.push(author_line(&post.author, &post.relative_time(), ctx));
    lines.extend(render_rich_text(&post.text, &post.facets, ctx.colors));

    if let Some(embed) = &post.embed {
        lines.extend(render_embed(embed, ctx, 0));
    }

    let like_icon = if post.liked() { "♥" } else { "♡" };
    let repost_icon = if post.reposted() { "🔁" } else { "↻" };
    lines.push(Line::from(Span::styled(
        format!(
            "💬 {}  {} {}  {} {}  ❝ {}",
            post.reply_count, repost_icon, post.repost_count, like_icon, post.like_count, post.quote_count
        ),
        ctx.colors.text_dim(),
    )));

    lines
}

/// Author line: name, badge, handle and time
pub fn author_line(author: &Author, time: &str, ctx: &RenderContext<'_>) -> Line<'static> {
    let mut spans = vec![Span::styled(
        author.name().to_string(),
        ctx.colors.text_primary().add_modifier(ratatui::style::Modifier::BOLD),
    )];

    if ctx.verified.contains(&author.did) {
        spans.push(Span::styled(" ✓", ctx.colors.badge()));
    }

    spans.push(Span::styled(format!(" @{}", author.handle), ctx.colors.text_muted()));

    if !time.is_empty() {
        spans.push(Span::styled(format!(" · {time}"), ctx.colors.text_muted()));
    }

    Line::from(spans)
}

/// Decode facets and emit one styled line per text line
pub fn render_rich_text(text: &str, facets: &[Facet], colors: &ThemeColors) -> Vec<Line<'static>> {
    if text.is_empty() {
        return Vec::new();
    }

    let mut lines = Vec::new();
    let mut current: Vec<Span<'static>> = Vec::new();

    for segment in segments(text, facets) {
        let style = match segment.kind {
            SegmentKind::Plain => colors.text(),
            SegmentKind::Mention { .. } => colors.mention(),
            SegmentKind::Link { .. } => colors.link(),
            SegmentKind::Tag { .. } => colors.hashtag(),
        };

        let mut parts = segment.text.split('\n');
        if let Some(first) = parts.next()
            && !first.is_empty()
        {
            current.push(Span::styled(first.to_string(), style));
        }
        for part in parts {
            lines.push(Line::from(std::mem::take(&mut current)));
            if !part.is_empty() {
                current.push(Span::styled(part.to_string(), style));
            }
        }
    }

    lines.push(Line::from(current));
    lines
}

/// Render an embed at the given nesting depth
pub fn render_embed(embed: &EmbedView, ctx: &RenderContext<'_>, depth: usize) -> Vec<Line<'static>> {
    if depth >= ctx.max_depth {
        return vec![gutter_line(
            ctx,
            Line::from(Span::styled(DEPTH_PLACEHOLDER, ctx.colors.text_muted())),
        )];
    }

    match embed {
        EmbedView::Images { images } => {
            let total = images.len();
            images
                .iter()
                .enumerate()
                .map(|(i, image)| {
                    let alt = if image.alt.is_empty() {
                        "no description"
                    } else {
                        image.alt.as_str()
                    };
                    Line::from(vec![
                        Span::styled(format!("[🖼 Image {}/{}]", i + 1, total), ctx.colors.text_secondary()),
                        Span::styled(format!(" {alt}"), ctx.colors.text_dim()),
                    ])
                })
                .collect()
        }
        EmbedView::Video { alt, .. } => {
            let alt = alt.as_deref().filter(|a| !a.is_empty()).unwrap_or("no description");
            vec![Line::from(vec![
                Span::styled("[🎬 Video]", ctx.colors.text_secondary()),
                Span::styled(format!(" {alt}"), ctx.colors.text_dim()),
            ])]
        }
        EmbedView::External { external } => {
            let title = if external.title.is_empty() {
                external.uri.as_str()
            } else {
                external.title.as_str()
            };
            let mut card = vec![Line::from(Span::styled(
                format!("🔗 {title}"),
                ctx.colors.text_primary(),
            ))];
            if !external.description.is_empty() {
                card.push(Line::from(Span::styled(
                    truncate_graphemes(&external.description, MAX_DESCRIPTION),
                    ctx.colors.text_dim(),
                )));
            }
            card.push(Line::from(Span::styled(external.uri.clone(), ctx.colors.link())));
            with_gutter(ctx, card)
        }
        EmbedView::Record { record } => render_record(record, ctx, depth),
        EmbedView::RecordWithMedia { record, media } => {
            let mut lines = render_embed(media, ctx, depth);
            lines.extend(render_record(&record.record, ctx, depth));
            lines
        }
        EmbedView::Unknown => vec![Line::from(Span::styled(
            "[unsupported embed]",
            ctx.colors.text_muted(),
        ))],
    }
}

fn render_record(record: &RecordView, ctx: &RenderContext<'_>, depth: usize) -> Vec<Line<'static>> {
    let notice = |text: &str| with_gutter(ctx, vec![Line::from(Span::styled(text.to_string(), ctx.colors.text_muted()))]);

    match record {
        RecordView::Post(quoted) => {
            let time = parse_time(&quoted.value.created_at)
                .or_else(|| parse_time(&quoted.indexed_at))
                .map(|at| relative_time(at, Utc::now()))
                .unwrap_or_default();

            let mut inner = vec![author_line(&quoted.author, &time, ctx)];
            inner.extend(render_rich_text(&quoted.value.text, &quoted.value.facets, ctx.colors));
            for embed in &quoted.embeds {
                inner.extend(render_embed(embed, ctx, depth + 1));
            }
            with_gutter(ctx, inner)
        }
        RecordView::NotFound { .. } => notice("Quoted post was deleted"),
        RecordView::Blocked { .. } => notice("Quoted post is unavailable (blocked)"),
        RecordView::Detached { .. } => notice("Quoted post was removed by its author"),
        RecordView::Generator {
            display_name,
            creator,
            ..
        } => notice(&format!("📡 Feed: {display_name} by @{}", creator.handle)),
        RecordView::List { name, creator, .. } => {
            notice(&format!("📋 List: {name} by @{}", creator.handle))
        }
        RecordView::Unknown => notice("[unsupported record]"),
    }
}

fn with_gutter(ctx: &RenderContext<'_>, lines: Vec<Line<'static>>) -> Vec<Line<'static>> {
    lines.into_iter().map(|line| gutter_line(ctx, line)).collect()
}

fn gutter_line(ctx: &RenderContext<'_>, line: Line<'static>) -> Line<'static> {
    let mut spans = Vec::with_capacity(line.spans.len() + 1);
    spans.push(Span::styled(GUTTER, ctx.colors.quote_gutter()));
    spans.extend(line.spans);
    Line::from(spans)
}

fn parse_time(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Flatten styled lines into plain text, one line per row
pub fn to_plain_text(lines: &[Line<'_>]) -> String {
    lines
        .iter()
        .map(|line| line.spans.iter().map(|s| s.content.as_ref()).collect::<String>())
        .collect::<Vec<_>>()
        .join("\n")
}
