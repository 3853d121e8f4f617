//! Cache-aside manager for post comment lists.
//!
//! The document store is the source of truth. The key-value store holds a
//! TTL-bounded shadow copy per post that is consulted only while the backend
//! is believed healthy. Cache faults are absorbed here: reads fall through to
//! the document store and failed writes downgrade health. Only document
//! store errors reach callers.

use std::sync::{Arc, Mutex, Weak};
use std::time::Instant as StdInstant;

use metrics::{counter, histogram};
use serde::Serialize;
use time::OffsetDateTime;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, instrument, warn};

use crate::application::repos::{CommentsRepo, RepoError};
use crate::domain::comments::{Comment, NewComment};

use super::config::CacheConfig;
use super::entry::{CacheEntry, epoch_millis};
use super::health::{HealthSnapshot, HealthTracker};
use super::keys::CacheKey;
use super::lock::mutex_lock;
use super::store::{KvError, KvStore};

const SOURCE: &str = "cache::manager";
const TARGET: &str = "inkpost::cache";

const METRIC_CACHE_HIT: &str = "inkpost_comment_cache_hit_total";
const METRIC_CACHE_MISS: &str = "inkpost_comment_cache_miss_total";
const METRIC_CACHE_BYPASS: &str = "inkpost_comment_cache_bypass_total";
const METRIC_CACHE_WRITE_FAILURE: &str = "inkpost_comment_cache_write_failure_total";
const METRIC_CACHE_PROBE: &str = "inkpost_comment_cache_probe_total";
const METRIC_STORE_READ_MS: &str = "inkpost_comment_store_read_ms";

#[derive(Debug, Clone, Copy, Default)]
pub struct GetOptions {
    /// Skip the cache read. The fresh list is still written back.
    pub force_refresh: bool,
}

impl GetOptions {
    pub fn force_refresh() -> Self {
        Self {
            force_refresh: true,
        }
    }
}

/// Comments for one post plus where they came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommentListing {
    pub data: Vec<Comment>,
    pub from_cache: bool,
    /// Entry write time on a hit, read time otherwise (epoch milliseconds).
    pub timestamp: i64,
}

/// Stage-by-stage result of [`CommentCache::test_connection`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ConnectionReport {
    pub configured: bool,
    pub ping: bool,
    pub set_get: bool,
    pub cleanup: bool,
    pub overall: bool,
}

/// Cache-aside policy over a [`KvStore`] and a [`CommentsRepo`].
///
/// Construct one per process and share it by `Arc`. [`initialize`] starts
/// the background health probe and [`destroy`] stops it.
///
/// [`initialize`]: CommentCache::initialize
/// [`destroy`]: CommentCache::destroy
pub struct CommentCache {
    kv: Arc<dyn KvStore>,
    comments: Arc<dyn CommentsRepo>,
    config: CacheConfig,
    health: HealthTracker,
    probe_task: Mutex<Option<JoinHandle<()>>>,
}

impl CommentCache {
    pub fn new(
        kv: Arc<dyn KvStore>,
        comments: Arc<dyn CommentsRepo>,
        config: CacheConfig,
    ) -> Self {
        let health = HealthTracker::new(config.health_check_cooldown());
        Self {
            kv,
            comments,
            config,
            health,
            probe_task: Mutex::new(None),
        }
    }

    pub fn health(&self) -> HealthSnapshot {
        self.health.snapshot()
    }

    /// Probes the backend unless a probe ran within the cooldown window, in
    /// which case the last known status is returned.
    pub async fn check_health(&self) -> bool {
        let now = Instant::now();
        if !self.health.try_begin_probe(now) {
            let remaining_ms = self
                .health
                .cooldown_remaining(now)
                .map_or(0, |left| u64::try_from(left.as_millis()).unwrap_or(u64::MAX));
            debug!(target: TARGET, remaining_ms, "Skipping health probe during cooldown");
            return self.health.is_healthy();
        }

        let outcome = self.kv.ping().await;
        let healthy = outcome.is_ok();
        self.health.record_probe(healthy);
        counter!(METRIC_CACHE_PROBE, "result" => if healthy { "healthy" } else { "unhealthy" })
            .increment(1);

        match outcome {
            Ok(()) => debug!(target: TARGET, "Cache backend healthy"),
            Err(err) if err.is_not_configured() => {
                debug!(target: TARGET, "Cache backend not configured; staying unhealthy")
            }
            Err(err) => warn!(target: TARGET, error = %err, "Cache health probe failed"),
        }
        healthy
    }

    /// Reads a post's comments, from cache when possible.
    ///
    /// A cache hit is returned without consulting the document store. Every
    /// other path reads the document store and, while healthy, writes the
    /// result back under the default TTL.
    #[instrument(skip(self, options), fields(force_refresh = options.force_refresh))]
    pub async fn get_comments(
        &self,
        post_id: &str,
        options: GetOptions,
    ) -> Result<CommentListing, RepoError> {
        if !self.health.is_healthy() {
            self.check_health().await;
        }

        let key = CacheKey::comments(post_id);
        if options.force_refresh || !self.health.is_healthy() {
            let reason = if options.force_refresh {
                "force_refresh"
            } else {
                "unhealthy"
            };
            counter!(METRIC_CACHE_BYPASS, "reason" => reason).increment(1);
            debug!(target: TARGET, reason, "Bypassing comment cache");
        } else {
            match self.kv.get(&key).await {
                Ok(Some(entry)) => {
                    counter!(METRIC_CACHE_HIT).increment(1);
                    debug!(target: TARGET, count = entry.comments.len(), "Comment cache hit");
                    return Ok(CommentListing {
                        data: entry.comments,
                        from_cache: true,
                        timestamp: entry.timestamp,
                    });
                }
                Ok(None) => {
                    counter!(METRIC_CACHE_MISS).increment(1);
                    debug!(target: TARGET, "Comment cache miss");
                }
                Err(err) => {
                    counter!(METRIC_CACHE_MISS).increment(1);
                    warn!(target: TARGET, error = %err, "Comment cache read failed; treating as miss");
                }
            }
        }

        let started_at = StdInstant::now();
        let comments = self.comments.list_comments(post_id).await?;
        histogram!(METRIC_STORE_READ_MS).record(started_at.elapsed().as_secs_f64() * 1000.0);

        let entry = CacheEntry::new(comments);
        if self.health.is_healthy() {
            self.write_entry(&key, &entry, "get_comments").await;
        }

        Ok(CommentListing {
            data: entry.comments,
            from_cache: false,
            timestamp: epoch_millis(),
        })
    }

    /// Validates and creates a comment in the document store, then prepends
    /// it to the cached list on a best-effort basis.
    #[instrument(skip(self, params))]
    pub async fn add_comment(&self, post_id: &str, params: NewComment) -> Result<Comment, RepoError> {
        params
            .validate()
            .map_err(|err| RepoError::invalid_input(err.to_string()))?;

        let comment = self.comments.create_comment(params).await?;

        if !self.health.is_healthy() {
            debug!(target: TARGET, "Cache unhealthy; skipping update after create");
            return Ok(comment);
        }

        let key = CacheKey::comments(post_id);
        match self.kv.get(&key).await {
            Ok(current) => {
                let entry = match current {
                    Some(entry) => entry.prepended(comment.clone()),
                    None => CacheEntry::new(vec![comment.clone()]),
                };
                self.write_entry(&key, &entry, "add_comment").await;
            }
            Err(err) => self.discard_unreadable(&key, &err).await,
        }

        Ok(comment)
    }

    /// Deletes a comment from the document store, then removes it from the
    /// cached list if one exists. A cached list without the comment is left
    /// untouched.
    #[instrument(skip(self))]
    pub async fn delete_comment(&self, post_id: &str, comment_id: &str) -> Result<(), RepoError> {
        self.comments.delete_comment(comment_id).await?;

        if !self.health.is_healthy() {
            debug!(target: TARGET, "Cache unhealthy; skipping update after delete");
            return Ok(());
        }

        let key = CacheKey::comments(post_id);
        match self.kv.get(&key).await {
            Ok(Some(entry)) => match entry.without(comment_id) {
                Some(trimmed) => {
                    self.write_entry(&key, &trimmed, "delete_comment").await;
                }
                None => debug!(target: TARGET, "Deleted comment was not cached"),
            },
            Ok(None) => {}
            Err(err) => self.discard_unreadable(&key, &err).await,
        }

        Ok(())
    }

    /// Drops the cached list for `post_id`. Returns whether the backend
    /// acknowledged the delete.
    pub async fn invalidate(&self, post_id: &str) -> bool {
        let key = CacheKey::comments(post_id);
        match self.kv.delete(&key).await {
            Ok(()) => {
                info!(target: TARGET, key = %key, "Comment cache invalidated");
                true
            }
            Err(err) => {
                self.note_write_failure(&key, "invalidate", &err);
                false
            }
        }
    }

    /// Runs a first probe and, when the backend is configured, starts the
    /// periodic probe. Calling it again while the probe runs is a no-op.
    pub async fn initialize(self: &Arc<Self>) {
        info!(target: TARGET, "Initializing comment cache");
        let healthy = self.check_health().await;

        if !self.kv.is_configured() {
            info!(target: TARGET, "Cache backend not configured; periodic health checks disabled");
            return;
        }

        let mut slot = mutex_lock(&self.probe_task, SOURCE, "initialize");
        if slot.as_ref().is_some_and(|handle| !handle.is_finished()) {
            debug!(target: TARGET, "Periodic health checks already running");
            return;
        }

        let period = self.config.health_check_interval();
        *slot = Some(tokio::spawn(run_periodic_probe(Arc::downgrade(self))));
        info!(
            target: TARGET,
            healthy,
            interval_secs = period.as_secs(),
            "Periodic health checks started"
        );
    }

    /// Stops the periodic probe.
    pub fn destroy(&self) {
        if let Some(handle) = mutex_lock(&self.probe_task, SOURCE, "destroy").take() {
            handle.abort();
            info!(target: TARGET, "Periodic health checks stopped");
        }
    }

    pub fn has_periodic_probe(&self) -> bool {
        mutex_lock(&self.probe_task, SOURCE, "has_periodic_probe")
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Exercises ping, set, get and delete against a scratch key.
    ///
    /// Stops at the first failing stage. Health state is left untouched.
    pub async fn test_connection(&self) -> ConnectionReport {
        let mut report = ConnectionReport::default();

        if !self.kv.is_configured() {
            warn!(target: TARGET, "Connection test: cache backend not configured");
            return report;
        }
        report.configured = true;

        if let Err(err) = self.kv.ping().await {
            warn!(target: TARGET, error = %err, "Connection test: ping failed");
            return report;
        }
        report.ping = true;

        let key = CacheKey::diagnostic();
        let probe = CacheEntry::new(vec![diagnostic_comment(&key)]);
        if let Err(err) = self.kv.set(&key, &probe, self.config.diagnostic_ttl()).await {
            warn!(target: TARGET, error = %err, "Connection test: set failed");
            return report;
        }

        report.set_get = match self.kv.get(&key).await {
            Ok(Some(read)) => read.comments == probe.comments,
            Ok(None) => false,
            Err(err) => {
                warn!(target: TARGET, error = %err, "Connection test: get failed");
                false
            }
        };
        if !report.set_get {
            warn!(target: TARGET, key = %key, "Connection test: value did not round-trip");
            return report;
        }

        report.cleanup = match self.kv.delete(&key).await {
            Ok(()) => true,
            Err(err) => {
                warn!(target: TARGET, error = %err, "Connection test: cleanup failed");
                false
            }
        };

        report.overall = report.configured && report.ping && report.set_get && report.cleanup;
        info!(target: TARGET, overall = report.overall, "Connection test finished");
        report
    }

    async fn write_entry(&self, key: &CacheKey, entry: &CacheEntry, operation: &'static str) -> bool {
        match self.kv.set(key, entry, self.config.default_ttl()).await {
            Ok(()) => {
                debug!(target: TARGET, key = %key, count = entry.count, operation, "Comment cache updated");
                true
            }
            Err(err) => {
                self.note_write_failure(key, operation, &err);
                false
            }
        }
    }

    /// An entry that cannot be read cannot be patched; drop it so the next
    /// read repopulates from the document store.
    async fn discard_unreadable(&self, key: &CacheKey, err: &KvError) {
        warn!(target: TARGET, key = %key, error = %err, "Cached list unreadable; discarding");
        if let Err(delete_err) = self.kv.delete(key).await {
            self.note_write_failure(key, "discard", &delete_err);
        }
    }

    fn note_write_failure(&self, key: &CacheKey, operation: &'static str, err: &KvError) {
        counter!(METRIC_CACHE_WRITE_FAILURE, "operation" => operation).increment(1);
        if self.health.mark_unhealthy() {
            warn!(
                target: TARGET,
                key = %key,
                operation,
                error = %err,
                "Cache write failed; marking backend unhealthy"
            );
        } else {
            debug!(target: TARGET, key = %key, operation, error = %err, "Cache write failed");
        }
    }
}

impl Drop for CommentCache {
    fn drop(&mut self) {
        if let Some(handle) = mutex_lock(&self.probe_task, SOURCE, "drop").take() {
            handle.abort();
        }
    }
}

async fn run_periodic_probe(cache: Weak<CommentCache>) {
    let Some(period) = cache.upgrade().map(|cache| cache.config.health_check_interval()) else {
        return;
    };
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval.tick().await; // first tick completes immediately

    loop {
        interval.tick().await;
        let Some(cache) = cache.upgrade() else {
            break;
        };
        cache.check_health().await;
    }
}

fn diagnostic_comment(key: &CacheKey) -> Comment {
    Comment {
        id: key.as_str().to_string(),
        post_id: key.as_str().to_string(),
        content: "connection test".to_string(),
        author_id: "inkpost".to_string(),
        author_name: "inkpost".to_string(),
        created_at: OffsetDateTime::now_utc(),
    }
}
