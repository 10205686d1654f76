//! Facet detection for composed text

use std::collections::HashMap;
use std::sync::LazyLock;

use anyhow::Result;
use regex_lite::Regex;

use super::{ByteSlice, Facet, FacetFeature};

/// Longest hashtag Bluesky accepts
const MAX_TAG_CHARS: usize = 64;

static MENTION_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?:^|[\s(])(@[a-zA-Z0-9][a-zA-Z0-9.-]*)").ok());
static LINK_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?:^|[\s(])(https?://[^\s]+)").ok());
static TAG_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?:^|\s)([#＃][^\s]+)").ok());

/// A facet found in text, before mentions are resolved to DIDs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Detected {
    /// `@handle`, handle without the `@`
    Mention {
        /// Handle to resolve
        handle: String,
    },
    /// Bare http(s) link
    Link {
        /// Link target
        uri: String,
    },
    /// `#tag`, without the `#`
    Tag {
        /// Tag text
        tag: String,
    },
}

/// A detected facet and its byte range
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectedFacet {
    /// Covered byte range
    pub index: ByteSlice,
    /// What was detected
    pub kind: Detected,
}

/// Resolves handles to DIDs
#[allow(async_fn_in_trait)]
pub trait HandleResolver {
    /// Resolve `handle` (without `@`) to a DID
    async fn resolve_handle(&self, handle: &str) -> Result<String>;
}

/// ASCII, general, CJK and fullwidth punctuation
fn is_punctuation(c: char) -> bool {
    c.is_ascii_punctuation()
        || matches!(c,
            '¡' | '§' | '«' | '¶' | '·' | '»' | '¿'
            | '\u{2010}'..='\u{205E}'
            | '\u{3001}'..='\u{3003}'
            | '\u{3008}'..='\u{3011}'
            | '\u{3014}'..='\u{301F}'
            | '\u{FF01}'..='\u{FF0F}'
            | '\u{FF1A}'..='\u{FF20}'
            | '\u{FF3B}'..='\u{FF40}'
            | '\u{FF5B}'..='\u{FF65}')
}

/// Find mentions, links and hashtags in `text`.
///
/// Results are sorted by start offset and never overlap.
pub fn detect_facets(text: &str) -> Vec<DetectedFacet> {
    let mut found = Vec::new();

    if let Some(re) = MENTION_RE.as_ref() {
        for caps in re.captures_iter(text) {
            let Some(m) = caps.get(1) else { continue };
            let raw = m.as_str().trim_end_matches('.');
            let handle = &raw[1..];
            if is_valid_handle(handle) {
                found.push(DetectedFacet {
                    index: ByteSlice::new(m.start(), m.start() + raw.len()),
                    kind: Detected::Mention {
                        handle: handle.to_lowercase(),
                    },
                });
            }
        }
    }

    if let Some(re) = LINK_RE.as_ref() {
        for caps in re.captures_iter(text) {
            let Some(m) = caps.get(1) else { continue };
            let uri = trim_link(m.as_str());
            let after_scheme = uri.split_once("://").map_or("", |(_, rest)| rest);
            if after_scheme.is_empty() {
                continue;
            }
            found.push(DetectedFacet {
                index: ByteSlice::new(m.start(), m.start() + uri.len()),
                kind: Detected::Link {
                    uri: uri.to_string(),
                },
            });
        }
    }

    if let Some(re) = TAG_RE.as_ref() {
        for caps in re.captures_iter(text) {
            let Some(m) = caps.get(1) else { continue };
            let raw = m.as_str().trim_end_matches(is_punctuation);
            let tag = raw
                .strip_prefix('#')
                .or_else(|| raw.strip_prefix('＃'))
                .unwrap_or_default();
            if tag.is_empty()
                || tag.chars().all(|c| c.is_ascii_digit())
                || tag.chars().count() > MAX_TAG_CHARS
            {
                continue;
            }
            found.push(DetectedFacet {
                index: ByteSlice::new(m.start(), m.start() + raw.len()),
                kind: Detected::Tag {
                    tag: tag.to_string(),
                },
            });
        }
    }

    found.sort_by_key(|f| f.index.byte_start);

    let mut cursor = 0;
    found.retain(|f| {
        if f.index.byte_start < cursor {
            return false;
        }
        cursor = f.index.byte_end;
        true
    });

    found
}

/// Turn detected facets into protocol facets, resolving mentions.
///
/// Mentions whose handle doesn't resolve are dropped; the text stays as
/// typed.
pub async fn resolve_facets<R: HandleResolver>(
    detected: Vec<DetectedFacet>,
    resolver: &R,
) -> Vec<Facet> {
    let mut resolved: HashMap<String, Option<String>> = HashMap::new();
    let mut facets = Vec::with_capacity(detected.len());

    for facet in detected {
        let feature = match facet.kind {
            Detected::Link { uri } => FacetFeature::Link { uri },
            Detected::Tag { tag } => FacetFeature::Tag { tag },
            Detected::Mention { handle } => {
                if !resolved.contains_key(&handle) {
                    let did = match resolver.resolve_handle(&handle).await {
                        Ok(did) => Some(did),
                        Err(e) => {
                            tracing::debug!("Could not resolve @{}: {}", handle, e);
                            None
                        }
                    };
                    resolved.insert(handle.clone(), did);
                }
                match resolved.get(&handle).cloned().flatten() {
                    Some(did) => FacetFeature::Mention { did },
                    None => continue,
                }
            }
        };

        facets.push(Facet {
            index: facet.index,
            features: vec![feature],
        });
    }

    facets
}

fn is_valid_handle(handle: &str) -> bool {
    let labels: Vec<&str> = handle.split('.').collect();
    labels.len() >= 2
        && labels.iter().all(|l| !l.is_empty() && !l.starts_with('-') && !l.ends_with('-'))
        && labels
            .last()
            .is_some_and(|tld| tld.starts_with(|c: char| c.is_ascii_alphabetic()))
}

/// Strip trailing punctuation and an unbalanced closing paren from a link
fn trim_link(raw: &str) -> &str {
    let mut uri = raw.trim_end_matches(['.', ',', ';', ':', '!', '?', '"', '\'']);
    if uri.ends_with(')') && !uri.contains('(') {
        uri = &uri[..uri.len() - 1];
        uri = uri.trim_end_matches(['.', ',', ';', ':', '!', '?']);
    }
    uri
}
