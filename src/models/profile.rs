//! Profile model

use serde::{Deserialize, Serialize};

/// Relationship between the viewer and a profile
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileViewer {
    /// URI of the viewer's follow record, if following
    #[serde(default)]
    pub following: Option<String>,
    /// URI of their follow record for the viewer, if followed back
    #[serde(rename = "followedBy", default)]
    pub followed_by: Option<String>,
    /// Whether the viewer muted the account
    #[serde(default)]
    pub muted: bool,
}

/// Detailed profile view (`app.bsky.actor.defs#profileViewDetailed`)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    /// Account DID
    pub did: String,
    /// Current handle
    pub handle: String,
    /// Display name
    #[serde(rename = "displayName", default)]
    pub display_name: Option<String>,
    /// Bio
    #[serde(default)]
    pub description: Option<String>,
    /// Avatar URL
    #[serde(default)]
    pub avatar: Option<String>,
    /// Follower count
    #[serde(rename = "followersCount", default)]
    pub followers_count: u32,
    /// Follow count
    #[serde(rename = "followsCount", default)]
    pub follows_count: u32,
    /// Post count
    #[serde(rename = "postsCount", default)]
    pub posts_count: u32,
    /// Viewer relationship
    #[serde(default)]
    pub viewer: ProfileViewer,
}

impl Profile {
    /// Display name, falling back to the handle
    pub fn name(&self) -> &str {
        match self.display_name.as_deref() {
            Some(name) if !name.trim().is_empty() => name,
            _ => &self.handle,
        }
    }

    /// Whether the viewer follows this profile
    pub const fn is_followed(&self) -> bool {
        self.viewer.following.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_profile_view() {
        let json = r#"{
            "did": "did:plc:bob",
            "handle": "bob.test",
            "displayName": "Bob",
            "followersCount": 10,
            "followsCount": 3,
            "postsCount": 42,
            "viewer": {"following": "at://did:plc:me/app.bsky.graph.follow/3k", "muted": false}
        }"#;
        let profile: Profile = serde_json::from_str(json).unwrap();
        assert_eq!(profile.name(), "Bob");
        assert_eq!(profile.posts_count, 42);
        assert!(profile.is_followed());
    }

    #[test]
    fn test_parse_minimal_profile() {
        let profile: Profile =
            serde_json::from_str(r#"{"did": "did:plc:x", "handle": "x.test"}"#).unwrap();
        assert_eq!(profile.name(), "x.test");
        assert!(!profile.is_followed());
    }
}
