//! Database module for `SQLite` storage (accounts, drafts, offline post cache)

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::path::Path;
use uuid::Uuid;

use crate::models::{Account, Draft, Post};
use crate::paths;

const ACCOUNT_COLUMNS: &str =
    "id, did, handle, display_name, pds_url, is_default, avatar_url, created_at, last_used_at";

/// Database connection wrapper
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open or create the database at the default location
    pub fn open() -> Result<Self> {
        let path = paths::database_path()?;
        Self::open_path(&path)
    }

    /// Open or create the database at a specific path
    pub fn open_path(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create data directory")?;
        }

        let conn = Connection::open(path).context("Failed to open database")?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// In-memory database, for tests and throwaway sessions
    pub fn open_in_memory() -> Result<Self> {
        let db = Self {
            conn: Connection::open_in_memory().context("Failed to open database")?,
        };
        db.init()?;
        Ok(db)
    }

    fn init(&self) -> Result<()> {
        self.conn.execute_batch(
            r"
            CREATE TABLE IF NOT EXISTS accounts (
                id TEXT PRIMARY KEY,
                did TEXT NOT NULL UNIQUE,
                handle TEXT NOT NULL,
                display_name TEXT NOT NULL,
                pds_url TEXT NOT NULL,
                is_default INTEGER NOT NULL DEFAULT 0,
                avatar_url TEXT,
                created_at TEXT NOT NULL,
                last_used_at TEXT
            );

            CREATE TABLE IF NOT EXISTS drafts (
                id TEXT PRIMARY KEY,
                text TEXT NOT NULL,
                reply_to TEXT,
                quote TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            -- Posts are stored whole as JSON; the columns are only for lookup and ordering
            CREATE TABLE IF NOT EXISTS post_cache (
                account_did TEXT NOT NULL,
                uri TEXT NOT NULL,
                created_at TEXT NOT NULL,
                post_json TEXT NOT NULL,
                cached_at TEXT NOT NULL,
                PRIMARY KEY (account_did, uri)
            );

            CREATE INDEX IF NOT EXISTS idx_post_cache_created ON post_cache(account_did, created_at);
            CREATE INDEX IF NOT EXISTS idx_post_cache_cached_at ON post_cache(cached_at);
            ",
        )?;
        Ok(())
    }

    // ==================== Accounts ====================

    /// Insert an account, or refresh it if the DID is already known
    pub fn upsert_account(&self, account: &Account) -> Result<()> {
        self.conn.execute(
            r"INSERT INTO accounts (id, did, handle, display_name, pds_url, is_default, avatar_url, created_at, last_used_at)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
               ON CONFLICT(did) DO UPDATE SET
                   handle = excluded.handle,
                   display_name = excluded.display_name,
                   pds_url = excluded.pds_url,
                   avatar_url = COALESCE(excluded.avatar_url, accounts.avatar_url)",
            params![
                account.id.to_string(),
                account.did,
                account.handle,
                account.display_name,
                account.pds_url,
                i32::from(account.is_default),
                account.avatar_url,
                account.created_at.to_rfc3339(),
                account.last_used_at.map(|dt| dt.to_rfc3339()),
            ],
        )?;
        Ok(())
    }

    /// Get all accounts
    pub fn get_accounts(&self) -> Result<Vec<Account>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts ORDER BY is_default DESC, handle"
        ))?;
        let accounts = stmt.query_map([], Self::row_to_account)?;
        accounts.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Look an account up by handle or DID
    pub fn find_account(&self, handle_or_did: &str) -> Result<Option<Account>> {
        let key = handle_or_did.trim_start_matches('@');
        self.conn
            .query_row(
                &format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE handle = ?1 OR did = ?1"),
                params![key],
                Self::row_to_account,
            )
            .optional()
            .map_err(Into::into)
    }

    /// The default account, falling back to the most recently used one
    pub fn get_default_account(&self) -> Result<Option<Account>> {
        self.conn
            .query_row(
                &format!(
                    "SELECT {ACCOUNT_COLUMNS} FROM accounts
                     ORDER BY is_default DESC, last_used_at DESC, created_at LIMIT 1"
                ),
                [],
                Self::row_to_account,
            )
            .optional()
            .map_err(Into::into)
    }

    /// Delete an account and its cached posts
    pub fn delete_account(&self, id: Uuid) -> Result<()> {
        let did: Option<String> = self
            .conn
            .query_row("SELECT did FROM accounts WHERE id = ?1", params![id.to_string()], |row| {
                row.get(0)
            })
            .optional()?;
        if let Some(did) = did {
            self.conn
                .execute("DELETE FROM post_cache WHERE account_did = ?1", params![did])?;
        }
        self.conn
            .execute("DELETE FROM accounts WHERE id = ?1", params![id.to_string()])?;
        Ok(())
    }

    /// Make one account the default
    pub fn set_default_account(&self, id: Uuid) -> Result<()> {
        self.conn.execute("UPDATE accounts SET is_default = 0", [])?;
        self.conn.execute(
            "UPDATE accounts SET is_default = 1 WHERE id = ?1",
            params![id.to_string()],
        )?;
        Ok(())
    }

    /// Update last used timestamp
    pub fn update_account_last_used(&self, id: Uuid) -> Result<()> {
        self.conn.execute(
            "UPDATE accounts SET last_used_at = ?2 WHERE id = ?1",
            params![id.to_string(), Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    fn row_to_account(row: &Row<'_>) -> rusqlite::Result<Account> {
        Ok(Account {
            id: parse_uuid(row, 0)?,
            did: row.get(1)?,
            handle: row.get(2)?,
            display_name: row.get(3)?,
            pds_url: row.get(4)?,
            is_default: row.get::<_, i32>(5)? != 0,
            avatar_url: row.get(6)?,
            created_at: parse_time(row, 7)?,
            last_used_at: row
                .get::<_, Option<String>>(8)?
                .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
                .map(|dt| dt.with_timezone(&Utc)),
        })
    }

    // ==================== Drafts ====================

    /// Save a draft, replacing an earlier save of the same draft
    pub fn save_draft(&self, draft: &Draft) -> Result<()> {
        self.conn.execute(
            r"INSERT OR REPLACE INTO drafts (id, text, reply_to, quote, created_at, updated_at)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                draft.id.to_string(),
                draft.text,
                draft.reply_to,
                draft.quote,
                draft.created_at.to_rfc3339(),
                draft.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// All drafts, most recently edited first
    pub fn get_drafts(&self) -> Result<Vec<Draft>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, text, reply_to, quote, created_at, updated_at FROM drafts ORDER BY updated_at DESC",
        )?;
        let drafts = stmt.query_map([], |row| {
            Ok(Draft {
                id: parse_uuid(row, 0)?,
                text: row.get(1)?,
                reply_to: row.get(2)?,
                quote: row.get(3)?,
                created_at: parse_time(row, 4)?,
                updated_at: parse_time(row, 5)?,
            })
        })?;
        drafts.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Delete a draft
    pub fn delete_draft(&self, id: Uuid) -> Result<()> {
        self.conn
            .execute("DELETE FROM drafts WHERE id = ?1", params![id.to_string()])?;
        Ok(())
    }

    // ==================== Post Cache ====================

    /// Cache timeline posts for an account
    pub fn cache_posts(&mut self, account_did: &str, posts: &[Post]) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                r"INSERT OR REPLACE INTO post_cache (account_did, uri, created_at, post_json, cached_at)
                   VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for post in posts {
                let json = serde_json::to_string(post).context("Failed to serialize post")?;
                stmt.execute(params![account_did, post.uri, post.created_at.to_rfc3339(), json, now])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Cached posts for an account, most recent first
    pub fn get_cached_posts(&self, account_did: &str, limit: usize) -> Result<Vec<Post>> {
        let mut stmt = self.conn.prepare(
            "SELECT post_json FROM post_cache WHERE account_did = ?1 ORDER BY created_at DESC LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![account_did, i64::try_from(limit).unwrap_or(i64::MAX)], |row| {
            row.get::<_, String>(0)
        })?;

        let mut posts = Vec::new();
        for json in rows {
            match serde_json::from_str::<Post>(&json?) {
                Ok(post) => posts.push(post),
                // rows written by an older schema are skipped, not fatal
                Err(e) => tracing::debug!("skipping cached post: {e}"),
            }
        }
        Ok(posts)
    }

    /// Clear old cache entries
    pub fn clear_old_cache(&self, max_age_hours: u64) -> Result<usize> {
        let hours = i64::try_from(max_age_hours).unwrap_or(i64::MAX / 3600);
        let cutoff = Utc::now() - chrono::Duration::hours(hours);
        let count = self.conn.execute(
            "DELETE FROM post_cache WHERE cached_at < ?1",
            params![cutoff.to_rfc3339()],
        )?;
        Ok(count)
    }
}

fn conversion_error(idx: usize, err: impl std::error::Error + Send + Sync + 'static) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

fn parse_uuid(row: &Row<'_>, idx: usize) -> rusqlite::Result<Uuid> {
    Uuid::parse_str(&row.get::<_, String>(idx)?).map_err(|e| conversion_error(idx, e))
}

fn parse_time(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&row.get::<_, String>(idx)?)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Author;
    use tempfile::tempdir;

    fn post(uri: &str, minutes_ago: i64) -> Post {
        let mut post = Post::new(
            uri,
            "bafy",
            Author {
                did: "did:plc:alice".into(),
                handle: "alice.test".into(),
                ..Default::default()
            },
        );
        post.text = format!("post {uri}");
        post.created_at = Utc::now() - chrono::Duration::minutes(minutes_ago);
        post
    }

    #[test]
    fn test_database_init_on_disk() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("test.sqlite");
        let _db = Database::open_path(&path).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_account_crud() {
        let db = Database::open_in_memory().unwrap();

        let account = Account::new("did:plc:alice", "alice.test", "Alice");
        db.upsert_account(&account).unwrap();

        let accounts = db.get_accounts().unwrap();
        assert_eq!(accounts.len(), 1);
        assert_eq!(accounts[0].handle, "alice.test");
        assert_eq!(accounts[0].id, account.id);

        assert!(db.find_account("@alice.test").unwrap().is_some());
        assert!(db.find_account("did:plc:alice").unwrap().is_some());
        assert!(db.find_account("bob.test").unwrap().is_none());

        db.delete_account(account.id).unwrap();
        assert!(db.get_accounts().unwrap().is_empty());
    }

    #[test]
    fn test_upsert_keeps_identity_on_handle_change() {
        let db = Database::open_in_memory().unwrap();
        let account = Account::new("did:plc:alice", "alice.test", "Alice");
        db.upsert_account(&account).unwrap();

        let renamed = Account::new("did:plc:alice", "alice.example", "Alice B");
        db.upsert_account(&renamed).unwrap();

        let accounts = db.get_accounts().unwrap();
        assert_eq!(accounts.len(), 1);
        assert_eq!(accounts[0].id, account.id);
        assert_eq!(accounts[0].handle, "alice.example");
    }

    #[test]
    fn test_single_default_account() {
        let db = Database::open_in_memory().unwrap();
        let a = Account::new("did:plc:a", "a.test", "A");
        let b = Account::new("did:plc:b", "b.test", "B");
        db.upsert_account(&a).unwrap();
        db.upsert_account(&b).unwrap();

        db.set_default_account(a.id).unwrap();
        db.set_default_account(b.id).unwrap();

        let defaults: Vec<_> = db.get_accounts().unwrap().into_iter().filter(|a| a.is_default).collect();
        assert_eq!(defaults.len(), 1);
        assert_eq!(db.get_default_account().unwrap().unwrap().did, "did:plc:b");
    }

    #[test]
    fn test_drafts() {
        let db = Database::open_in_memory().unwrap();
        let mut draft = Draft::new("half a thought");
        db.save_draft(&draft).unwrap();

        draft.text = "a whole thought".into();
        draft.updated_at = Utc::now();
        db.save_draft(&draft).unwrap();

        let drafts = db.get_drafts().unwrap();
        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].text, "a whole thought");

        db.delete_draft(draft.id).unwrap();
        assert!(db.get_drafts().unwrap().is_empty());
    }

    #[test]
    fn test_post_cache_is_per_account_and_ordered() {
        let mut db = Database::open_in_memory().unwrap();
        db.cache_posts(
            "did:plc:me",
            &[post("at://x/app.bsky.feed.post/old", 60), post("at://x/app.bsky.feed.post/new", 1)],
        )
        .unwrap();
        db.cache_posts("did:plc:other", &[post("at://x/app.bsky.feed.post/zzz", 0)])
            .unwrap();

        let cached = db.get_cached_posts("did:plc:me", 10).unwrap();
        let uris: Vec<_> = cached.iter().map(|p| p.uri.as_str()).collect();
        assert_eq!(uris, ["at://x/app.bsky.feed.post/new", "at://x/app.bsky.feed.post/old"]);
        assert_eq!(cached[0].author.handle, "alice.test");

        assert_eq!(db.get_cached_posts("did:plc:me", 1).unwrap().len(), 1);
        assert_eq!(db.clear_old_cache(1).unwrap(), 0);
    }
}
