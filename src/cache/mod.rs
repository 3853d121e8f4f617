//! Inkpost comment cache.
//!
//! Cache-aside layer for post comment lists:
//!
//! - **Source of truth**: a [`CommentsRepo`](crate::application::repos::CommentsRepo)
//!   (the document store).
//! - **Shadow copy**: one TTL-bounded [`CacheEntry`] per post in a [`KvStore`].
//! - **Policy**: [`CommentCache`] decides where reads come from, patches the
//!   shadow copy after writes and tracks backend health.
//!
//! ## Configuration
//!
//! ```toml
//! [kv]
//! url = "https://example.upstash.io"
//! token = "..."
//! default_ttl_seconds = 3600
//! health_check_cooldown_ms = 30000
//! health_check_interval_seconds = 60
//! ```

mod config;
mod entry;
mod health;
mod keys;
mod lock;
mod manager;
mod store;

pub use config::CacheConfig;
pub use entry::{CacheEntry, ENTRY_SCHEMA_VERSION, EntryError};
pub use health::{HealthSnapshot, HealthStatus, HealthTracker};
pub use keys::CacheKey;
pub use manager::{CommentCache, CommentListing, ConnectionReport, GetOptions};
pub use store::{KvError, KvResult, KvStore, MemoryKvStore};
