//! Post model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::embed::EmbedView;
use crate::richtext::Facet;

/// Reference to a specific version of a record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrongRef {
    /// at:// URI of the record
    pub uri: String,
    /// Content hash of the record
    pub cid: String,
}

/// Reply pointers of a post record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyRef {
    /// First post of the thread
    pub root: StrongRef,
    /// Post being replied to
    pub parent: StrongRef,
}

/// Basic view of an account, as embedded in posts
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    /// Account DID
    pub did: String,
    /// Current handle
    pub handle: String,
    /// Display name, if set
    #[serde(rename = "displayName", default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// Avatar URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
}

impl Author {
    /// Display name, falling back to the handle
    pub fn name(&self) -> &str {
        match self.display_name.as_deref() {
            Some(name) if !name.trim().is_empty() => name,
            _ => &self.handle,
        }
    }
}

/// The `app.bsky.feed.post` record as stored in a repository
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PostRecord {
    /// Post text
    #[serde(default)]
    pub text: String,
    /// Rich-text annotations
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub facets: Vec<Facet>,
    /// Reply pointers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply: Option<ReplyRef>,
    /// Language tags
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub langs: Vec<String>,
    /// Client-claimed creation time
    #[serde(rename = "createdAt", default)]
    pub created_at: String,
}

/// A post as shown in feeds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    /// at:// URI of the post
    pub uri: String,
    /// CID of the post record (needed for likes/reposts/replies)
    pub cid: String,
    /// Who wrote it
    pub author: Author,
    /// Post text
    pub text: String,
    /// Rich-text annotations over `text`
    pub facets: Vec<Facet>,
    /// Hydrated embed (images, link card, quote...)
    pub embed: Option<EmbedView>,
    /// When the post was created
    pub created_at: DateTime<Utc>,
    /// Number of replies
    pub reply_count: u32,
    /// Number of reposts
    pub repost_count: u32,
    /// Number of likes
    pub like_count: u32,
    /// Number of quotes
    pub quote_count: u32,
    /// URI of the viewer's like record, if liked
    pub viewer_like: Option<String>,
    /// URI of the viewer's repost record, if reposted
    pub viewer_repost: Option<String>,
    /// Reply pointers, if this is a reply
    pub reply: Option<ReplyRef>,
    /// Who reposted this into the feed
    pub reposted_by: Option<Author>,
}

impl Post {
    /// Create an empty post with the given identity
    pub fn new(uri: &str, cid: &str, author: Author) -> Self {
        Self {
            uri: uri.to_string(),
            cid: cid.to_string(),
            author,
            text: String::new(),
            facets: Vec::new(),
            embed: None,
            created_at: Utc::now(),
            reply_count: 0,
            repost_count: 0,
            like_count: 0,
            quote_count: 0,
            viewer_like: None,
            viewer_repost: None,
            reply: None,
            reposted_by: None,
        }
    }

    /// Record key of the post (last URI segment)
    pub fn rkey(&self) -> &str {
        rkey_of(&self.uri)
    }

    /// Strong reference to this post
    pub fn strong_ref(&self) -> StrongRef {
        StrongRef {
            uri: self.uri.clone(),
            cid: self.cid.clone(),
        }
    }

    /// Whether the viewer liked this post
    pub const fn liked(&self) -> bool {
        self.viewer_like.is_some()
    }

    /// Whether the viewer reposted this post
    pub const fn reposted(&self) -> bool {
        self.viewer_repost.is_some()
    }

    /// Web URL of the post on bsky.app
    pub fn web_url(&self) -> String {
        format!(
            "https://bsky.app/profile/{}/post/{}",
            self.author.handle,
            self.rkey()
        )
    }

    /// Reply pointers for answering this post
    pub fn reply_ref_for_answer(&self) -> ReplyRef {
        let parent = self.strong_ref();
        let root = self
            .reply
            .as_ref()
            .map_or_else(|| parent.clone(), |r| r.root.clone());
        ReplyRef { root, parent }
    }

    /// Get a short preview of the content (for list display)
    pub fn preview(&self, max_len: usize) -> String {
        crate::richtext::truncate_graphemes(&self.text.replace('\n', " "), max_len)
    }

    /// Get relative time string (e.g., "5m", "2h", "3d")
    pub fn relative_time(&self) -> String {
        relative_time(self.created_at, Utc::now())
    }
}

/// Last path segment of an at:// URI
pub(crate) fn rkey_of(uri: &str) -> &str {
    uri.rsplit('/').next().unwrap_or(uri)
}

pub(crate) fn relative_time(at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let duration = now.signed_duration_since(at);

    if duration.num_seconds() < 60 {
        format!("{}s", duration.num_seconds().max(0))
    } else if duration.num_minutes() < 60 {
        format!("{}m", duration.num_minutes())
    } else if duration.num_hours() < 24 {
        format!("{}h", duration.num_hours())
    } else if duration.num_days() < 7 {
        format!("{}d", duration.num_days())
    } else {
        at.format("%b %d").to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn author() -> Author {
        Author {
            did: "did:plc:alice".into(),
            handle: "alice.test".into(),
            display_name: None,
            avatar: None,
        }
    }

    #[test]
    fn test_rkey_and_web_url() {
        let post = Post::new("at://did:plc:alice/app.bsky.feed.post/3kabc", "bafy", author());
        assert_eq!(post.rkey(), "3kabc");
        assert_eq!(post.web_url(), "https://bsky.app/profile/alice.test/post/3kabc");
    }

    #[test]
    fn test_author_name_fallback() {
        let mut a = author();
        assert_eq!(a.name(), "alice.test");
        a.display_name = Some("  ".into());
        assert_eq!(a.name(), "alice.test");
        a.display_name = Some("Alice".into());
        assert_eq!(a.name(), "Alice");
    }

    #[test]
    fn test_reply_ref_for_top_level_post() {
        let post = Post::new("at://did:plc:alice/app.bsky.feed.post/1", "c1", author());
        let reply = post.reply_ref_for_answer();
        assert_eq!(reply.root, reply.parent);
        assert_eq!(reply.parent.uri, post.uri);
    }

    #[test]
    fn test_reply_ref_keeps_thread_root() {
        let mut post = Post::new("at://did:plc:alice/app.bsky.feed.post/2", "c2", author());
        post.reply = Some(ReplyRef {
            root: StrongRef {
                uri: "at://did:plc:bob/app.bsky.feed.post/0".into(),
                cid: "c0".into(),
            },
            parent: StrongRef {
                uri: "at://did:plc:bob/app.bsky.feed.post/1".into(),
                cid: "c1".into(),
            },
        });
        let reply = post.reply_ref_for_answer();
        assert_eq!(reply.root.uri, "at://did:plc:bob/app.bsky.feed.post/0");
        assert_eq!(reply.parent.uri, post.uri);
    }

    #[test]
    fn test_relative_time() {
        let now = Utc::now();
        assert_eq!(relative_time(now - Duration::seconds(5), now), "5s");
        assert_eq!(relative_time(now - Duration::minutes(5), now), "5m");
        assert_eq!(relative_time(now - Duration::hours(3), now), "3h");
        assert_eq!(relative_time(now - Duration::days(2), now), "2d");
        // Clock skew never produces negative output
        assert_eq!(relative_time(now + Duration::seconds(30), now), "0s");
    }

    #[test]
    fn test_post_record_parses_facets() {
        let json = r#"{
            "$type": "app.bsky.feed.post",
            "text": "hi #rust",
            "facets": [{"index": {"byteStart": 3, "byteEnd": 8},
                        "features": [{"$type": "app.bsky.richtext.facet#tag", "tag": "rust"}]}],
            "createdAt": "2024-01-01T00:00:00.000Z"
        }"#;
        let record: PostRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.text, "hi #rust");
        assert_eq!(record.facets.len(), 1);
        assert!(record.reply.is_none());
    }
}
