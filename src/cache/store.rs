//! Key-value store contract and the in-process implementation.
//!
//! Every operation reports its outcome as a [`KvResult`]. A `KvError` is a
//! diagnostic for the caller's policy; it is never meant to reach users.

use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use lru::LruCache;
use thiserror::Error;
use tokio::time::Instant;

use super::entry::CacheEntry;
use super::keys::CacheKey;
use super::lock::mutex_lock;

const SOURCE: &str = "cache::store";
const DEFAULT_MEMORY_CAPACITY: usize = 1024;

pub type KvResult<T> = Result<T, KvError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KvError {
    #[error("key-value store is not configured")]
    NotConfigured,
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("unexpected status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("backend rejected `{command}`: {detail}")]
    Rejected {
        command: &'static str,
        detail: String,
    },
    #[error("malformed payload: {0}")]
    Malformed(String),
}

impl KvError {
    pub fn is_not_configured(&self) -> bool {
        matches!(self, Self::NotConfigured)
    }
}

/// Remote (or local) key-value backend holding comment list entries.
///
/// The backend offers no multi-command transactions; each call stands alone.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Whether the backend has the endpoint and credentials it needs.
    fn is_configured(&self) -> bool {
        true
    }

    /// Liveness probe.
    async fn ping(&self) -> KvResult<()>;

    /// `Ok(None)` for a missing key.
    async fn get(&self, key: &CacheKey) -> KvResult<Option<CacheEntry>>;

    /// Writes `entry` with an expiry of `ttl`.
    async fn set(&self, key: &CacheKey, entry: &CacheEntry, ttl: Duration) -> KvResult<()>;

    async fn delete(&self, key: &CacheKey) -> KvResult<()>;
}

struct StoredValue {
    raw: String,
    expires_at: Instant,
}

/// Bounded in-process store with per-key expiry.
///
/// Entries past their TTL are dropped lazily on access; the least recently
/// used entry is evicted once capacity is reached.
pub struct MemoryKvStore {
    entries: Mutex<LruCache<String, StoredValue>>,
}

impl MemoryKvStore {
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Stores a raw string payload as-is, bypassing entry encoding.
    pub fn put_raw(&self, key: &CacheKey, raw: impl Into<String>, ttl: Duration) {
        let value = StoredValue {
            raw: raw.into(),
            expires_at: Instant::now() + ttl,
        };
        mutex_lock(&self.entries, SOURCE, "put_raw").put(key.as_str().to_string(), value);
    }

    /// Whether `key` holds an unexpired value.
    pub fn contains(&self, key: &CacheKey) -> bool {
        self.read_raw(key).is_some()
    }

    /// Number of stored values, including expired ones not yet dropped.
    pub fn len(&self) -> usize {
        mutex_lock(&self.entries, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read_raw(&self, key: &CacheKey) -> Option<String> {
        let mut entries = mutex_lock(&self.entries, SOURCE, "read_raw");
        let expired = match entries.get(key.as_str()) {
            Some(value) if value.expires_at > Instant::now() => return Some(value.raw.clone()),
            Some(_) => true,
            None => false,
        };
        if expired {
            entries.pop(key.as_str());
        }
        None
    }
}

impl Default for MemoryKvStore {
    fn default() -> Self {
        Self::new(NonZeroUsize::new(DEFAULT_MEMORY_CAPACITY).unwrap_or(NonZeroUsize::MIN))
    }
}

#[async_trait]
impl KvStore for MemoryKvStore {
    async fn ping(&self) -> KvResult<()> {
        Ok(())
    }

    async fn get(&self, key: &CacheKey) -> KvResult<Option<CacheEntry>> {
        let Some(raw) = self.read_raw(key) else {
            return Ok(None);
        };
        CacheEntry::decode(&raw)
            .map(Some)
            .map_err(|err| KvError::Malformed(err.to_string()))
    }

    async fn set(&self, key: &CacheKey, entry: &CacheEntry, ttl: Duration) -> KvResult<()> {
        let raw = entry
            .encode()
            .map_err(|err| KvError::Malformed(err.to_string()))?;
        self.put_raw(key, raw, ttl);
        Ok(())
    }

    async fn delete(&self, key: &CacheKey) -> KvResult<()> {
        mutex_lock(&self.entries, SOURCE, "delete").pop(key.as_str());
        Ok(())
    }
}
