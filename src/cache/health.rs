//! Belief about whether the key-value backend is usable.
//!
//! The tracker starts `Unknown`. Probes move it to `Healthy` or `Unhealthy`
//! and restart the cooldown window whatever their outcome. A failed write
//! downgrades it immediately without touching the window, so only a later
//! probe can upgrade it again.

use std::sync::RwLock;
use std::time::Duration;

use metrics::gauge;
use serde::Serialize;
use tokio::time::Instant;

use super::entry::epoch_millis;
use super::lock::{rw_read, rw_write};

const SOURCE: &str = "cache::health";
const METRIC_CACHE_HEALTHY: &str = "inkpost_comment_cache_healthy";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Unknown,
    Healthy,
    Unhealthy,
}

/// Point-in-time copy of the tracker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HealthSnapshot {
    pub status: HealthStatus,
    /// Wall-clock time of the last probe, milliseconds since the Unix epoch.
    pub last_checked_at: Option<i64>,
    pub cooldown_ms: u64,
}

#[derive(Debug)]
struct HealthState {
    status: HealthStatus,
    last_probe: Option<Instant>,
    last_probe_epoch_ms: Option<i64>,
}

#[derive(Debug)]
pub struct HealthTracker {
    state: RwLock<HealthState>,
    cooldown: Duration,
}

impl HealthTracker {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            state: RwLock::new(HealthState {
                status: HealthStatus::Unknown,
                last_probe: None,
                last_probe_epoch_ms: None,
            }),
            cooldown,
        }
    }

    pub fn status(&self) -> HealthStatus {
        rw_read(&self.state, SOURCE, "status").status
    }

    pub fn is_healthy(&self) -> bool {
        self.status() == HealthStatus::Healthy
    }

    pub fn snapshot(&self) -> HealthSnapshot {
        let state = rw_read(&self.state, SOURCE, "snapshot");
        HealthSnapshot {
            status: state.status,
            last_checked_at: state.last_probe_epoch_ms,
            cooldown_ms: u64::try_from(self.cooldown.as_millis()).unwrap_or(u64::MAX),
        }
    }

    /// Time left before another probe is allowed, if any.
    pub fn cooldown_remaining(&self, now: Instant) -> Option<Duration> {
        let state = rw_read(&self.state, SOURCE, "cooldown_remaining");
        let elapsed = now.saturating_duration_since(state.last_probe?);
        (elapsed < self.cooldown).then(|| self.cooldown - elapsed)
    }

    /// Claims the next probe slot.
    ///
    /// Returns `false` while the cooldown window is open. On success the
    /// window restarts at `now`, so concurrent callers reuse the current
    /// status instead of probing again.
    pub fn try_begin_probe(&self, now: Instant) -> bool {
        let mut state = rw_write(&self.state, SOURCE, "try_begin_probe");
        if let Some(last) = state.last_probe {
            if now.saturating_duration_since(last) < self.cooldown {
                return false;
            }
        }
        state.last_probe = Some(now);
        state.last_probe_epoch_ms = Some(epoch_millis());
        true
    }

    pub fn record_probe(&self, healthy: bool) {
        let status = if healthy {
            HealthStatus::Healthy
        } else {
            HealthStatus::Unhealthy
        };
        rw_write(&self.state, SOURCE, "record_probe").status = status;
        gauge!(METRIC_CACHE_HEALTHY).set(if healthy { 1.0 } else { 0.0 });
    }

    /// Downgrades after a failed write. Returns whether the status changed.
    pub fn mark_unhealthy(&self) -> bool {
        let mut state = rw_write(&self.state, SOURCE, "mark_unhealthy");
        let changed = state.status != HealthStatus::Unhealthy;
        state.status = HealthStatus::Unhealthy;
        drop(state);
        gauge!(METRIC_CACHE_HEALTHY).set(0.0);
        changed
    }
}
