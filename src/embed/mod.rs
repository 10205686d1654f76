//! Post embeds: images, video, link cards and quoted records.
//!
//! These mirror the hydrated `#view` shapes the AppView returns. Quoted
//! posts carry their own `embeds`, so the structure is recursive; see
//! [`render`] for the depth-limited renderer.

pub mod render;

use serde::{Deserialize, Serialize};

use crate::models::{Author, PostRecord};

/// Image in an images embed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageView {
    /// Thumbnail URL
    #[serde(default)]
    pub thumb: String,
    /// Full-size URL
    #[serde(default)]
    pub fullsize: String,
    /// Alt text
    #[serde(default)]
    pub alt: String,
}

/// Link card of an external embed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExternalView {
    /// Link target
    pub uri: String,
    /// Page title
    #[serde(default)]
    pub title: String,
    /// Page description
    #[serde(default)]
    pub description: String,
    /// Card thumbnail URL
    #[serde(default)]
    pub thumb: Option<String>,
}

/// A hydrated embed on a post
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "$type")]
pub enum EmbedView {
    /// Up to four images
    #[serde(rename = "app.bsky.embed.images#view")]
    Images {
        /// The images
        images: Vec<ImageView>,
    },
    /// A video
    #[serde(rename = "app.bsky.embed.video#view")]
    Video {
        /// HLS playlist URL
        #[serde(default)]
        playlist: String,
        /// Poster image URL
        #[serde(default)]
        thumbnail: Option<String>,
        /// Alt text
        #[serde(default)]
        alt: Option<String>,
    },
    /// A link card
    #[serde(rename = "app.bsky.embed.external#view")]
    External {
        /// Card contents
        external: ExternalView,
    },
    /// A quoted record
    #[serde(rename = "app.bsky.embed.record#view")]
    Record {
        /// The quoted record
        record: RecordView,
    },
    /// A quoted record plus media
    #[serde(rename = "app.bsky.embed.recordWithMedia#view")]
    RecordWithMedia {
        /// The quoted record
        record: RecordEmbed,
        /// The attached media
        media: Box<EmbedView>,
    },
    /// Embed type this client doesn't know about
    #[serde(other)]
    Unknown,
}

/// Wrapper around the record of a `recordWithMedia` embed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordEmbed {
    /// The quoted record
    pub record: RecordView,
}

/// A quoted post
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotedPost {
    /// at:// URI of the quoted post
    pub uri: String,
    /// CID of the quoted post
    pub cid: String,
    /// Who wrote it
    pub author: Author,
    /// The post record itself
    #[serde(default)]
    pub value: PostRecord,
    /// Embeds of the quoted post (one level deeper)
    #[serde(default)]
    pub embeds: Vec<EmbedView>,
    /// Number of likes
    #[serde(rename = "likeCount", default)]
    pub like_count: u32,
    /// Number of replies
    #[serde(rename = "replyCount", default)]
    pub reply_count: u32,
    /// Number of reposts
    #[serde(rename = "repostCount", default)]
    pub repost_count: u32,
    /// When it was indexed
    #[serde(rename = "indexedAt", default)]
    pub indexed_at: String,
}

/// The record inside a record embed
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "$type")]
pub enum RecordView {
    /// A quoted post
    #[serde(rename = "app.bsky.embed.record#viewRecord")]
    Post(Box<QuotedPost>),
    /// The quoted record was deleted
    #[serde(rename = "app.bsky.embed.record#viewNotFound")]
    NotFound {
        /// URI of the missing record
        uri: String,
    },
    /// Blocking prevents showing the quoted record
    #[serde(rename = "app.bsky.embed.record#viewBlocked")]
    Blocked {
        /// URI of the blocked record
        uri: String,
    },
    /// The author detached their post from this quote
    #[serde(rename = "app.bsky.embed.record#viewDetached")]
    Detached {
        /// URI of the detached record
        uri: String,
    },
    /// A custom feed
    #[serde(rename = "app.bsky.feed.defs#generatorView")]
    Generator {
        /// Feed URI
        uri: String,
        /// Feed name
        #[serde(rename = "displayName", default)]
        display_name: String,
        /// Feed owner
        creator: Author,
    },
    /// A user list
    #[serde(rename = "app.bsky.graph.defs#listView")]
    List {
        /// List URI
        uri: String,
        /// List name
        #[serde(default)]
        name: String,
        /// Owner
        creator: Author,
    },
    /// Record type this client doesn't know about
    #[serde(other)]
    Unknown,
}

impl EmbedView {
    /// The quoted record, if any
    pub fn record(&self) -> Option<&RecordView> {
        match self {
            Self::Record { record } | Self::RecordWithMedia { record: RecordEmbed { record }, .. } => {
                Some(record)
            }
            _ => None,
        }
    }

    /// Number of media attachments (images count individually)
    pub fn media_count(&self) -> usize {
        match self {
            Self::Images { images } => images.len(),
            Self::Video { .. } => 1,
            Self::RecordWithMedia { media, .. } => media.media_count(),
            _ => 0,
        }
    }
}
