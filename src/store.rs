// sapp_unlock_webhook/src/store.rs
// Document store: Redis hashes in production, in-memory map otherwise.

use async_trait::async_trait;
use redis::AsyncCommands;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;

pub const PAYMENTS: &str = "payments";
pub const TRANSACTIONS: &str = "transactions";
pub const USERS: &str = "users";

pub type Document = Map<String, Value>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("corrupt document field: {0}")]
    Json(#[from] serde_json::Error),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Keyed documents grouped in collections.
///
/// `merge` must be atomic per document: the given top-level fields replace
/// their previous values and every other field is left untouched.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn merge(&self, collection: &str, id: &str, fields: Document) -> Result<(), StoreError>;

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError>;
}

// ═══════════════════════════════════════════════════════════════════════════════
// REDIS
// ═══════════════════════════════════════════════════════════════════════════════

/// Each document is a hash at `<namespace>:<collection>:<id>`; each field holds JSON.
#[derive(Clone)]
pub struct RedisStore {
    client: redis::Client,
    namespace: String,
}

impl RedisStore {
    pub fn open(url: &str, namespace: &str) -> Result<Self, redis::RedisError> {
        Ok(Self {
            client: redis::Client::open(url)?,
            namespace: namespace.to_string(),
        })
    }

    fn key(&self, collection: &str, id: &str) -> String {
        format!("{}:{}:{}", self.namespace, collection, id)
    }
}

#[async_trait]
impl DocumentStore for RedisStore {
    async fn merge(&self, collection: &str, id: &str, fields: Document) -> Result<(), StoreError> {
        if fields.is_empty() {
            return Ok(());
        }
        let items = fields
            .iter()
            .map(|(name, value)| Ok((name.clone(), serde_json::to_string(value)?)))
            .collect::<Result<Vec<(String, String)>, serde_json::Error>>()?;

        let mut con = self.client.get_multiplexed_async_connection().await?;
        // Single HSET with all fields keeps the merge atomic for the document.
        let _: () = con.hset_multiple(self.key(collection, id), &items[..]).await?;
        Ok(())
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError> {
        let mut con = self.client.get_multiplexed_async_connection().await?;
        let raw: HashMap<String, String> = con.hgetall(self.key(collection, id)).await?;
        if raw.is_empty() {
            return Ok(None);
        }

        let mut doc = Document::new();
        for (name, encoded) in raw {
            doc.insert(name, serde_json::from_str(&encoded)?);
        }
        Ok(Some(doc))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// IN-MEMORY
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Clone, Default)]
pub struct MemoryStore {
    docs: Arc<RwLock<HashMap<(String, String), Document>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.docs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.docs.read().await.is_empty()
    }

    pub async fn collection_len(&self, collection: &str) -> usize {
        self.docs
            .read()
            .await
            .keys()
            .filter(|(c, _)| c == collection)
            .count()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn merge(&self, collection: &str, id: &str, fields: Document) -> Result<(), StoreError> {
        let mut docs = self.docs.write().await;
        let doc = docs
            .entry((collection.to_string(), id.to_string()))
            .or_default();
        for (name, value) in fields {
            doc.insert(name, value);
        }
        Ok(())
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError> {
        let docs = self.docs.read().await;
        Ok(docs.get(&(collection.to_string(), id.to_string())).cloned())
    }
}
