//! App-state records kept in an AT Protocol repository
//!
//! Everything Skyloft stores server-side (bookmarks, articles, verification
//! badges, settings) lives in one custom collection. Each record carries the
//! collection `$type` plus a `kind` discriminator.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::xrpc::{Xrpc, XrpcError};
use crate::models::{StrongRef, rkey_of};

/// Collection holding all app records
pub const APP_COLLECTION: &str = "app.skyloft.state";

const LIST_PAGE: usize = 100;

/// A record value in the app collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum AppRecord {
    /// A saved post
    Bookmark {
        /// The bookmarked post
        subject: StrongRef,
        /// When it was saved
        created_at: String,
    },
    /// A long-form article
    Article {
        /// Title
        title: String,
        /// Body text
        body: String,
        /// Tags
        #[serde(default)]
        tags: Vec<String>,
        /// When it was created
        created_at: String,
        /// When it was last edited
        #[serde(default, skip_serializing_if = "Option::is_none")]
        updated_at: Option<String>,
    },
    /// A paid verification badge, keyed by the verified DID
    Verification {
        /// The verified account
        subject: String,
        /// Payment order that paid for it
        order_id: String,
        /// Amount paid
        amount: String,
        /// Currency of the amount
        currency: String,
        /// When it was granted
        verified_at: String,
    },
    /// Free-form key/value state
    Setting {
        /// Setting name
        key: String,
        /// Setting value
        value: serde_json::Value,
    },
}

impl AppRecord {
    /// Discriminator name as stored in `kind`
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Bookmark { .. } => "bookmark",
            Self::Article { .. } => "article",
            Self::Verification { .. } => "verification",
            Self::Setting { .. } => "setting",
        }
    }
}

#[derive(Serialize, Deserialize)]
struct Stored {
    #[serde(rename = "$type")]
    collection: String,
    #[serde(flatten)]
    record: AppRecord,
}

/// Location of a written record
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RecordRef {
    /// at:// URI
    pub uri: String,
    /// Content hash
    pub cid: String,
}

impl RecordRef {
    /// Record key (last URI segment)
    pub fn rkey(&self) -> &str {
        rkey_of(&self.uri)
    }
}

/// A record read back from the repository
#[derive(Debug, Clone, PartialEq)]
pub struct RecordEntry {
    /// at:// URI
    pub uri: String,
    /// Content hash
    pub cid: String,
    /// Decoded value
    pub value: AppRecord,
}

impl RecordEntry {
    /// Record key (last URI segment)
    pub fn rkey(&self) -> &str {
        rkey_of(&self.uri)
    }
}

/// One page from `listRecords`
#[derive(Debug, Clone, Default)]
pub struct RecordPage {
    /// Records on this page
    pub records: Vec<RecordEntry>,
    /// Cursor for the next page
    pub cursor: Option<String>,
}

/// CRUD over app records
#[allow(async_fn_in_trait)]
pub trait RecordStore {
    /// All records, newest first
    async fn list_all(&self) -> Result<Vec<RecordEntry>>;

    /// One record, `None` if it doesn't exist
    async fn get(&self, rkey: &str) -> Result<Option<RecordEntry>>;

    /// Create a record with a server-assigned key
    async fn create(&self, value: &AppRecord) -> Result<RecordRef>;

    /// Create or overwrite the record at `rkey`
    async fn put(&self, rkey: &str, value: &AppRecord) -> Result<RecordRef>;

    /// Delete a record; missing records are not an error
    async fn delete(&self, rkey: &str) -> Result<()>;
}

/// App records in one repository
#[derive(Debug, Clone)]
pub struct AppRecords {
    xrpc: Xrpc,
    repo: String,
    collection: String,
}

impl AppRecords {
    /// Records in `repo` (a DID) reached through `xrpc`
    pub fn new(xrpc: Xrpc, repo: &str) -> Self {
        Self {
            xrpc,
            repo: repo.to_string(),
            collection: APP_COLLECTION.to_string(),
        }
    }

    /// Repository DID
    pub fn repo(&self) -> &str {
        &self.repo
    }

    /// One page of records
    pub async fn list(&self, cursor: Option<&str>, limit: usize) -> Result<RecordPage> {
        #[derive(Deserialize)]
        struct Listed {
            records: Vec<RawRecord>,
            #[serde(default)]
            cursor: Option<String>,
        }

        let mut params = vec![
            ("repo", self.repo.clone()),
            ("collection", self.collection.clone()),
            ("limit", limit.to_string()),
        ];
        if let Some(c) = cursor {
            params.push(("cursor", c.to_string()));
        }

        let out: Listed = self
            .xrpc
            .query("com.atproto.repo.listRecords", &params)
            .await
            .context("Failed to list app records")?;

        Ok(RecordPage {
            records: out.records.into_iter().filter_map(RawRecord::decode).collect(),
            cursor: out.cursor,
        })
    }

    fn body(&self, rkey: Option<&str>, value: &AppRecord) -> serde_json::Value {
        let record = Stored {
            collection: self.collection.clone(),
            record: value.clone(),
        };
        let mut body = json!({
            "repo": self.repo,
            "collection": self.collection,
            "record": record,
        });
        if let Some(rkey) = rkey {
            body["rkey"] = json!(rkey);
        }
        body
    }
}

impl RecordStore for AppRecords {
    async fn list_all(&self) -> Result<Vec<RecordEntry>> {
        let mut all = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let page = self.list(cursor.as_deref(), LIST_PAGE).await?;
            // Pages may decode to nothing, so only the cursor ends the walk
            let done = page.cursor.is_none() || page.cursor == cursor;
            all.extend(page.records);
            if done {
                break;
            }
            cursor = page.cursor;
        }
        Ok(all)
    }

    async fn get(&self, rkey: &str) -> Result<Option<RecordEntry>> {
        let result: Result<RawRecord, XrpcError> = self
            .xrpc
            .query(
                "com.atproto.repo.getRecord",
                &[
                    ("repo", self.repo.as_str()),
                    ("collection", self.collection.as_str()),
                    ("rkey", rkey),
                ],
            )
            .await;

        match result {
            Ok(raw) => Ok(raw.decode()),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e).with_context(|| format!("Failed to read app record {rkey}")),
        }
    }

    async fn create(&self, value: &AppRecord) -> Result<RecordRef> {
        let body = self.body(None, value);
        let created = self
            .xrpc
            .procedure("com.atproto.repo.createRecord", &body)
            .await
            .with_context(|| format!("Failed to create {} record", value.kind()))?;
        Ok(created)
    }

    async fn put(&self, rkey: &str, value: &AppRecord) -> Result<RecordRef> {
        let body = self.body(Some(rkey), value);
        let written = self
            .xrpc
            .procedure("com.atproto.repo.putRecord", &body)
            .await
            .with_context(|| format!("Failed to write {} record", value.kind()))?;
        Ok(written)
    }

    async fn delete(&self, rkey: &str) -> Result<()> {
        self.xrpc
            .procedure_unit(
                "com.atproto.repo.deleteRecord",
                &json!({ "repo": self.repo, "collection": self.collection, "rkey": rkey }),
            )
            .await
            .with_context(|| format!("Failed to delete app record {rkey}"))
    }
}

#[derive(Deserialize)]
pub(crate) struct RawRecord {
    uri: String,
    #[serde(default)]
    cid: String,
    value: serde_json::Value,
}

impl RawRecord {
    /// Records another client wrote in a shape we don't know are skipped
    pub(crate) fn decode(self) -> Option<RecordEntry> {
        match serde_json::from_value::<Stored>(self.value) {
            Ok(stored) => Some(RecordEntry {
                uri: self.uri,
                cid: self.cid,
                value: stored.record,
            }),
            Err(e) => {
                tracing::debug!(uri = %self.uri, "skipping unreadable app record: {e}");
                None
            }
        }
    }
}

/// In-memory record store for tests
#[cfg(test)]
pub(crate) mod memory {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct MemoryStore {
        records: Mutex<Vec<RecordEntry>>,
        next: Mutex<u32>,
    }

    impl MemoryStore {
        fn upsert(&self, rkey: &str, value: &AppRecord) -> RecordRef {
            let uri = format!("at://did:plc:test/{APP_COLLECTION}/{rkey}");
            let entry = RecordEntry {
                uri: uri.clone(),
                cid: format!("cid-{rkey}"),
                value: value.clone(),
            };
            let mut records = self.records.lock().unwrap();
            records.retain(|r| r.uri != uri);
            // newest first, like listRecords
            records.insert(0, entry);
            RecordRef {
                uri,
                cid: format!("cid-{rkey}"),
            }
        }
    }

    impl RecordStore for MemoryStore {
        async fn list_all(&self) -> Result<Vec<RecordEntry>> {
            Ok(self.records.lock().unwrap().clone())
        }

        async fn get(&self, rkey: &str) -> Result<Option<RecordEntry>> {
            Ok(self
                .records
                .lock()
                .unwrap()
                .iter()
                .find(|r| r.rkey() == rkey)
                .cloned())
        }

        async fn create(&self, value: &AppRecord) -> Result<RecordRef> {
            let rkey = {
                let mut next = self.next.lock().unwrap();
                *next += 1;
                format!("r{:04}", *next)
            };
            Ok(self.upsert(&rkey, value))
        }

        async fn put(&self, rkey: &str, value: &AppRecord) -> Result<RecordRef> {
            Ok(self.upsert(rkey, value))
        }

        async fn delete(&self, rkey: &str) -> Result<()> {
            self.records.lock().unwrap().retain(|r| r.rkey() != rkey);
            Ok(())
        }
    }
}
