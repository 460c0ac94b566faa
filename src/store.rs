// Key-value store boundary: the hash operations progress tracking needs,
// backed by Redis in production and by an in-memory map in tests.

use async_trait::async_trait;
use redis::AsyncCommands;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;

use crate::config::StoreEndpoint;
use crate::metrics;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

impl From<redis::RedisError> for StoreError {
    fn from(e: redis::RedisError) -> Self {
        metrics::STORE_ERRORS_TOTAL.inc();
        StoreError::Unavailable(e.to_string())
    }
}

/// Per-record hash operations. Every call is a single round trip; there are
/// no transactions spanning several keys.
#[async_trait]
pub trait KvStore: Send + Sync + 'static {
    async fn exists(&self, key: &str) -> Result<bool, StoreError>;

    /// Set one or more fields of a hash at once.
    async fn hset_multiple(&self, key: &str, fields: &[(&str, &str)]) -> Result<(), StoreError>;

    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>, StoreError>;

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>, StoreError>;
}

// ── Redis ────────────────────────────────────────────────────────────

pub struct RedisStore {
    client: redis::Client,
}

impl RedisStore {
    /// Build a client from a `redis://` URL. No connection is made until the
    /// first command.
    pub fn open(url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(url)?;
        Ok(Self { client })
    }

    /// Where the client connects, as parsed by the client itself.
    pub fn endpoint(&self) -> StoreEndpoint {
        StoreEndpoint::from(self.client.get_connection_info())
    }

    async fn connection(&self) -> Result<redis::aio::MultiplexedConnection, StoreError> {
        Ok(self.client.get_multiplexed_async_connection().await?)
    }
}

#[async_trait]
impl KvStore for RedisStore {
    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        let mut conn = self.connection().await?;
        Ok(conn.exists(key).await?)
    }

    async fn hset_multiple(&self, key: &str, fields: &[(&str, &str)]) -> Result<(), StoreError> {
        let mut conn = self.connection().await?;
        let _: () = conn.hset_multiple(key, fields).await?;
        Ok(())
    }

    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>, StoreError> {
        let mut conn = self.connection().await?;
        Ok(conn.hgetall(key).await?)
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.connection().await?;
        Ok(conn.hget(key, field).await?)
    }
}

// ── In-memory ────────────────────────────────────────────────────────

/// Hash store kept in process memory for tests. `set_offline(true)` makes
/// every call fail as if the server were unreachable.
#[derive(Default)]
pub struct MemoryStore {
    hashes: Mutex<HashMap<String, HashMap<String, String>>>,
    offline: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::Relaxed);
    }

    fn check_online(&self) -> Result<(), StoreError> {
        if self.offline.load(Ordering::Relaxed) {
            metrics::STORE_ERRORS_TOTAL.inc();
            return Err(StoreError::Unavailable("memory store offline".to_string()));
        }
        Ok(())
    }

    /// Number of hashes currently held.
    pub async fn key_count(&self) -> usize {
        self.hashes.lock().await.len()
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        self.check_online()?;
        Ok(self.hashes.lock().await.contains_key(key))
    }

    async fn hset_multiple(&self, key: &str, fields: &[(&str, &str)]) -> Result<(), StoreError> {
        self.check_online()?;
        if fields.is_empty() {
            return Ok(());
        }
        let mut hashes = self.hashes.lock().await;
        let hash = hashes.entry(key.to_string()).or_default();
        for (field, value) in fields {
            hash.insert(field.to_string(), value.to_string());
        }
        Ok(())
    }

    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>, StoreError> {
        self.check_online()?;
        Ok(self
            .hashes
            .lock()
            .await
            .get(key)
            .cloned()
            .unwrap_or_default())
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>, StoreError> {
        self.check_online()?;
        Ok(self
            .hashes
            .lock()
            .await
            .get(key)
            .and_then(|h| h.get(field).cloned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store_hash_roundtrip() {
        let store = MemoryStore::new();
        assert!(!store.exists("k").await.unwrap());

        store
            .hset_multiple("k", &[("a", "1"), ("b", "0")])
            .await
            .unwrap();
        assert!(store.exists("k").await.unwrap());
        assert_eq!(store.hget("k", "a").await.unwrap().as_deref(), Some("1"));
        assert_eq!(store.hget("k", "missing").await.unwrap(), None);

        let all = store.hgetall("k").await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all["b"], "0");
    }

    #[tokio::test]
    async fn test_memory_store_last_write_wins_per_field() {
        let store = MemoryStore::new();
        store.hset_multiple("k", &[("a", "1")]).await.unwrap();
        store.hset_multiple("k", &[("b", "1")]).await.unwrap();
        store.hset_multiple("k", &[("a", "0")]).await.unwrap();

        let all = store.hgetall("k").await.unwrap();
        assert_eq!(all["a"], "0");
        assert_eq!(all["b"], "1");
    }

    #[tokio::test]
    async fn test_memory_store_missing_key_reads_empty() {
        let store = MemoryStore::new();
        assert!(store.hgetall("nope").await.unwrap().is_empty());
        assert_eq!(store.key_count().await, 0);
    }

    #[tokio::test]
    async fn test_memory_store_offline_fails_every_call() {
        let store = MemoryStore::new();
        store.set_offline(true);

        assert!(matches!(
            store.exists("k").await,
            Err(StoreError::Unavailable(_))
        ));
        assert!(store.hset_multiple("k", &[("a", "1")]).await.is_err());
        assert!(store.hgetall("k").await.is_err());
        assert!(store.hget("k", "a").await.is_err());

        store.set_offline(false);
        assert!(store.hgetall("k").await.unwrap().is_empty());
    }

    #[test]
    fn test_redis_store_rejects_bad_url() {
        assert!(RedisStore::open("not a url").is_err());
        assert!(RedisStore::open("redis://localhost:6379/0").is_ok());
    }

    #[test]
    fn test_redis_store_endpoint_follows_client_parsing() {
        let store = RedisStore::open("redis://[::1]/3").unwrap();
        let ep = store.endpoint();
        assert_eq!(ep.db, 3);
        assert!(!ep.has_password);
    }
}
