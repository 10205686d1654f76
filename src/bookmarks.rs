//! Bookmarks stored as app records in the user's repository

use anyhow::Result;
use chrono::Utc;

use crate::api::{AppRecord, PostLookup, RecordStore};
use crate::models::{Post, StrongRef};

/// A saved post reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookmarkEntry {
    /// Record key of the bookmark record
    pub rkey: String,
    /// The bookmarked post
    pub subject: StrongRef,
    /// When it was saved
    pub created_at: String,
}

/// Bookmark operations over a record store
pub struct Bookmarks<'a, S> {
    store: &'a S,
}

impl<'a, S: RecordStore> Bookmarks<'a, S> {
    /// Bookmarks kept in `store`
    pub const fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// All bookmarks, newest first
    pub async fn list(&self) -> Result<Vec<BookmarkEntry>> {
        let mut entries: Vec<BookmarkEntry> = self
            .store
            .list_all()
            .await?
            .into_iter()
            .filter_map(|record| {
                let rkey = record.rkey().to_string();
                match record.value {
                    AppRecord::Bookmark { subject, created_at } => Some(BookmarkEntry {
                        rkey,
                        subject,
                        created_at,
                    }),
                    _ => None,
                }
            })
            .collect();
        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(entries)
    }

    /// Find the bookmark for a post URI
    pub async fn find(&self, uri: &str) -> Result<Option<BookmarkEntry>> {
        Ok(self.list().await?.into_iter().find(|b| b.subject.uri == uri))
    }

    /// Whether a post is bookmarked
    pub async fn contains(&self, uri: &str) -> Result<bool> {
        Ok(self.find(uri).await?.is_some())
    }

    /// Bookmark a post; bookmarking twice keeps the first entry
    pub async fn add(&self, post: &Post) -> Result<BookmarkEntry> {
        if let Some(existing) = self.find(&post.uri).await? {
            tracing::debug!(uri = %post.uri, "already bookmarked");
            return Ok(existing);
        }

        let created_at = Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string();
        let record = AppRecord::Bookmark {
            subject: post.strong_ref(),
            created_at: created_at.clone(),
        };
        let written = self.store.create(&record).await?;
        Ok(BookmarkEntry {
            rkey: written.rkey().to_string(),
            subject: post.strong_ref(),
            created_at,
        })
    }

    /// Remove the bookmark for a post URI; returns whether one existed
    pub async fn remove(&self, uri: &str) -> Result<bool> {
        let Some(entry) = self.find(uri).await? else {
            return Ok(false);
        };
        self.store.delete(&entry.rkey).await?;
        Ok(true)
    }

    /// Toggle; returns `true` when the post is now bookmarked
    pub async fn toggle(&self, post: &Post) -> Result<bool> {
        if self.remove(&post.uri).await? {
            Ok(false)
        } else {
            self.add(post).await?;
            Ok(true)
        }
    }

    /// Fetch the bookmarked posts in bookmark order; deleted posts are skipped
    pub async fn hydrate<L: PostLookup>(&self, lookup: &L) -> Result<Vec<Post>> {
        let uris: Vec<String> = self.list().await?.into_iter().map(|b| b.subject.uri).collect();
        if uris.is_empty() {
            return Ok(Vec::new());
        }
        lookup.posts(&uris).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::records::memory::MemoryStore;
    use crate::models::Author;

    fn post(n: u32) -> Post {
        Post::new(
            &format!("at://did:plc:a/app.bsky.feed.post/{n}"),
            &format!("c{n}"),
            Author::default(),
        )
    }

    struct Lookup(Vec<Post>);

    impl PostLookup for Lookup {
        async fn posts(&self, uris: &[String]) -> Result<Vec<Post>> {
            Ok(uris
                .iter()
                .filter_map(|u| self.0.iter().find(|p| &p.uri == u).cloned())
                .collect())
        }
    }

    #[tokio::test]
    async fn test_add_is_idempotent() {
        let store = MemoryStore::default();
        let bookmarks = Bookmarks::new(&store);

        let first = bookmarks.add(&post(1)).await.unwrap();
        let second = bookmarks.add(&post(1)).await.unwrap();
        assert_eq!(first.rkey, second.rkey);
        assert_eq!(bookmarks.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_remove_and_toggle() {
        let store = MemoryStore::default();
        let bookmarks = Bookmarks::new(&store);

        assert!(!bookmarks.remove(&post(1).uri).await.unwrap());
        assert!(bookmarks.toggle(&post(1)).await.unwrap());
        assert!(bookmarks.contains(&post(1).uri).await.unwrap());
        assert!(!bookmarks.toggle(&post(1)).await.unwrap());
        assert!(bookmarks.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_other_kinds_are_ignored() {
        let store = MemoryStore::default();
        store
            .create(&AppRecord::Setting {
                key: "k".into(),
                value: serde_json::json!(1),
            })
            .await
            .unwrap();
        let bookmarks = Bookmarks::new(&store);
        bookmarks.add(&post(1)).await.unwrap();
        assert_eq!(bookmarks.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_hydrate_skips_deleted_posts() {
        let store = MemoryStore::default();
        let bookmarks = Bookmarks::new(&store);
        for n in 1..=3 {
            bookmarks.add(&post(n)).await.unwrap();
            // keep created_at strictly increasing
            tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        }

        // post 2 was deleted upstream
        let lookup = Lookup(vec![post(1), post(3)]);
        let posts = bookmarks.hydrate(&lookup).await.unwrap();
        let rkeys: Vec<&str> = posts.iter().map(Post::rkey).collect();
        assert_eq!(rkeys, ["3", "1"]);
    }
}
