//! Long-form articles stored as app records

use anyhow::{Result, bail, ensure};
use chrono::Utc;

use crate::api::{AppRecord, RecordStore};
use crate::richtext::truncate_graphemes;

/// Average reading speed used for estimates
pub const WORDS_PER_MINUTE: usize = 200;

/// A stored article
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Article {
    /// Record key
    pub rkey: String,
    /// Title
    pub title: String,
    /// Body text
    pub body: String,
    /// Tags
    pub tags: Vec<String>,
    /// Creation time (RFC 3339)
    pub created_at: String,
    /// Last edit time (RFC 3339)
    pub updated_at: Option<String>,
}

impl Article {
    /// Body preview of at most `max` graphemes on one line
    pub fn excerpt(&self, max: usize) -> String {
        let flat = self.body.split_whitespace().collect::<Vec<_>>().join(" ");
        truncate_graphemes(&flat, max)
    }

    /// Number of whitespace-separated words in the body
    pub fn word_count(&self) -> usize {
        self.body.split_whitespace().count()
    }

    /// Estimated reading time, never less than a minute
    pub fn reading_minutes(&self) -> usize {
        self.word_count().div_ceil(WORDS_PER_MINUTE).max(1)
    }

    fn from_record(rkey: &str, record: AppRecord) -> Option<Self> {
        match record {
            AppRecord::Article {
                title,
                body,
                tags,
                created_at,
                updated_at,
            } => Some(Self {
                rkey: rkey.to_string(),
                title,
                body,
                tags,
                created_at,
                updated_at,
            }),
            _ => None,
        }
    }

    fn to_record(&self) -> AppRecord {
        AppRecord::Article {
            title: self.title.clone(),
            body: self.body.clone(),
            tags: self.tags.clone(),
            created_at: self.created_at.clone(),
            updated_at: self.updated_at.clone(),
        }
    }
}

/// Tags are stored without `#`, lowercased and deduplicated
pub fn normalize_tags<S: AsRef<str>>(tags: &[S]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for tag in tags {
        let tag = tag.as_ref().trim().trim_start_matches('#').to_lowercase();
        if !tag.is_empty() && !out.contains(&tag) {
            out.push(tag);
        }
    }
    out
}

fn timestamp() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

/// Article operations over a record store
pub struct Articles<'a, S> {
    store: &'a S,
}

impl<'a, S: RecordStore> Articles<'a, S> {
    /// Articles kept in `store`
    pub const fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Write a new article
    pub async fn create(&self, title: &str, body: &str, tags: &[String]) -> Result<Article> {
        let title = title.trim();
        ensure!(!title.is_empty(), "Article title cannot be empty");

        let mut article = Article {
            rkey: String::new(),
            title: title.to_string(),
            body: body.to_string(),
            tags: normalize_tags(tags),
            created_at: timestamp(),
            updated_at: None,
        };
        let written = self.store.create(&article.to_record()).await?;
        article.rkey = written.rkey().to_string();
        tracing::info!(rkey = %article.rkey, "article created");
        Ok(article)
    }

    /// One article by record key
    pub async fn get(&self, rkey: &str) -> Result<Option<Article>> {
        Ok(self
            .store
            .get(rkey)
            .await?
            .and_then(|entry| Article::from_record(rkey, entry.value)))
    }

    /// All articles, newest first
    pub async fn list(&self) -> Result<Vec<Article>> {
        let mut articles: Vec<Article> = self
            .store
            .list_all()
            .await?
            .into_iter()
            .filter_map(|entry| {
                let rkey = entry.rkey().to_string();
                Article::from_record(&rkey, entry.value)
            })
            .collect();
        articles.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(articles)
    }

    /// Replace title, body and/or tags of an existing article
    pub async fn update(
        &self,
        rkey: &str,
        title: Option<&str>,
        body: Option<&str>,
        tags: Option<&[String]>,
    ) -> Result<Article> {
        let Some(mut article) = self.get(rkey).await? else {
            bail!("No article {rkey}");
        };

        if let Some(title) = title {
            let title = title.trim();
            ensure!(!title.is_empty(), "Article title cannot be empty");
            article.title = title.to_string();
        }
        if let Some(body) = body {
            article.body = body.to_string();
        }
        if let Some(tags) = tags {
            article.tags = normalize_tags(tags);
        }
        article.updated_at = Some(timestamp());

        self.store.put(rkey, &article.to_record()).await?;
        Ok(article)
    }

    /// Delete an article
    pub async fn delete(&self, rkey: &str) -> Result<()> {
        self.store.delete(rkey).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::records::memory::MemoryStore;

    fn article(body: &str) -> Article {
        Article {
            rkey: "a".into(),
            title: "T".into(),
            body: body.into(),
            tags: Vec::new(),
            created_at: String::new(),
            updated_at: None,
        }
    }

    #[test]
    fn test_reading_stats() {
        assert_eq!(article("").word_count(), 0);
        assert_eq!(article("").reading_minutes(), 1);
        assert_eq!(article(&"word ".repeat(200)).reading_minutes(), 1);
        assert_eq!(article(&"word ".repeat(201)).reading_minutes(), 2);
        assert_eq!(article("one\ntwo\t three").word_count(), 3);
    }

    #[test]
    fn test_excerpt_flattens_whitespace() {
        let a = article("Hello\n\nworld,   this is long");
        assert_eq!(a.excerpt(100), "Hello world, this is long");
        assert_eq!(a.excerpt(11), "Hello worl…");
    }

    #[test]
    fn test_normalize_tags() {
        let tags = normalize_tags(&["#Rust", "rust", " atproto ", "", "#"]);
        assert_eq!(tags, ["rust", "atproto"]);
    }

    #[tokio::test]
    async fn test_create_requires_title() {
        let store = MemoryStore::default();
        let articles = Articles::new(&store);
        assert!(articles.create("   ", "body", &[]).await.is_err());
    }

    #[tokio::test]
    async fn test_crud_cycle() {
        let store = MemoryStore::default();
        let articles = Articles::new(&store);

        let first = articles.create("First", "one two", &["#Notes".into()]).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        let second = articles.create("Second", "three", &[]).await.unwrap();

        let listed: Vec<String> = articles.list().await.unwrap().into_iter().map(|a| a.title).collect();
        assert_eq!(listed, ["Second", "First"]);

        let updated = articles
            .update(&first.rkey, Some("First, revised"), None, None)
            .await
            .unwrap();
        assert_eq!(updated.body, "one two");
        assert_eq!(updated.tags, ["notes"]);
        assert!(updated.updated_at.is_some());

        let fetched = articles.get(&first.rkey).await.unwrap().unwrap();
        assert_eq!(fetched.title, "First, revised");

        articles.delete(&second.rkey).await.unwrap();
        assert!(articles.get(&second.rkey).await.unwrap().is_none());
        assert!(articles.update("missing", Some("x"), None, None).await.is_err());
    }
}
