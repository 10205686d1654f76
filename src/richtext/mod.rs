//! Rich text: facet annotations on post text.
//!
//! Bluesky posts carry their links, mentions and hashtags out-of-band as
//! "facets": UTF-8 byte ranges into the text plus a typed feature. This
//! module decodes facets into renderable [`Segment`]s and, on the compose
//! side, detects facets in freshly typed text.

mod detect;
mod segment;

pub use detect::{Detected, DetectedFacet, HandleResolver, detect_facets, resolve_facets};
pub use segment::{Segment, SegmentKind, segments};

use serde::{Deserialize, Serialize};
use unicode_segmentation::UnicodeSegmentation;

/// Maximum post length in grapheme clusters
pub const MAX_POST_GRAPHEMES: usize = 300;

/// Byte range of a facet, end-exclusive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ByteSlice {
    /// First byte covered by the facet
    pub byte_start: usize,
    /// One past the last byte covered by the facet
    pub byte_end: usize,
}

impl ByteSlice {
    /// Create a new byte slice
    pub const fn new(byte_start: usize, byte_end: usize) -> Self {
        Self {
            byte_start,
            byte_end,
        }
    }
}

/// A single facet feature
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "$type")]
pub enum FacetFeature {
    /// Mention of an account by DID
    #[serde(rename = "app.bsky.richtext.facet#mention")]
    Mention {
        /// DID of the mentioned account
        did: String,
    },
    /// Hyperlink
    #[serde(rename = "app.bsky.richtext.facet#link")]
    Link {
        /// Target URI
        uri: String,
    },
    /// Hashtag (without the leading `#`)
    #[serde(rename = "app.bsky.richtext.facet#tag")]
    Tag {
        /// Tag text
        tag: String,
    },
    /// Any feature type this client doesn't know about
    #[serde(other)]
    Unknown,
}

/// A facet: a byte range plus its features
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Facet {
    /// Covered byte range
    pub index: ByteSlice,
    /// Features attached to the range
    #[serde(default)]
    pub features: Vec<FacetFeature>,
}

impl Facet {
    /// Build a facet with a single feature
    pub fn new(byte_start: usize, byte_end: usize, feature: FacetFeature) -> Self {
        Self {
            index: ByteSlice::new(byte_start, byte_end),
            features: vec![feature],
        }
    }
}

/// Length of `text` in grapheme clusters (what Bluesky counts against the limit)
pub fn grapheme_len(text: &str) -> usize {
    text.graphemes(true).count()
}

/// Truncate to at most `max` graphemes, appending an ellipsis when cut
pub fn truncate_graphemes(text: &str, max: usize) -> String {
    if grapheme_len(text) <= max {
        return text.to_string();
    }
    let mut out: String = text.graphemes(true).take(max.saturating_sub(1)).collect();
    out.push('…');
    out
}
