//! Cache configuration.
//!
//! Controls entry lifetime and health-probe pacing for the comment cache.

use std::time::Duration;

use serde::Deserialize;

// Default values for cache configuration
const DEFAULT_TTL_SECONDS: u64 = 3600;
const DEFAULT_HEALTH_CHECK_COOLDOWN_MS: u64 = 30_000;
const DEFAULT_HEALTH_CHECK_INTERVAL_SECONDS: u64 = 60;
const DEFAULT_DIAGNOSTIC_TTL_SECONDS: u64 = 60;

/// Comment cache configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Lifetime of a post's cached comment list.
    pub default_ttl_seconds: u64,
    /// Minimum spacing between two health probes.
    pub health_check_cooldown_ms: u64,
    /// Period of the background health probe.
    pub health_check_interval_seconds: u64,
    /// Lifetime of the scratch key written by the connection test.
    pub diagnostic_ttl_seconds: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl_seconds: DEFAULT_TTL_SECONDS,
            health_check_cooldown_ms: DEFAULT_HEALTH_CHECK_COOLDOWN_MS,
            health_check_interval_seconds: DEFAULT_HEALTH_CHECK_INTERVAL_SECONDS,
            diagnostic_ttl_seconds: DEFAULT_DIAGNOSTIC_TTL_SECONDS,
        }
    }
}

impl From<&crate::config::KvSettings> for CacheConfig {
    fn from(settings: &crate::config::KvSettings) -> Self {
        Self {
            default_ttl_seconds: settings.default_ttl_seconds.get(),
            health_check_cooldown_ms: u64::try_from(settings.health_check_cooldown.as_millis())
                .unwrap_or(u64::MAX),
            health_check_interval_seconds: settings.health_check_interval.as_secs(),
            ..Default::default()
        }
    }
}

impl CacheConfig {
    /// Entry TTL, clamped to one second since the backend rejects zero expiry.
    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_seconds.max(1))
    }

    pub fn health_check_cooldown(&self) -> Duration {
        Duration::from_millis(self.health_check_cooldown_ms)
    }

    /// Background probe period, clamped to one second.
    pub fn health_check_interval(&self) -> Duration {
        Duration::from_secs(self.health_check_interval_seconds.max(1))
    }

    pub fn diagnostic_ttl(&self) -> Duration {
        Duration::from_secs(self.diagnostic_ttl_seconds.max(1))
    }
}
