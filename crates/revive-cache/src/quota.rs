//! Caller-level quota counters.
//!
//! Fixed-window counting per caller identity. The decision carries the
//! structured metadata (limit, remaining, reset time, country) that the
//! API surfaces in its 429 body, so a denied caller gets a distinct
//! experience rather than a generic error.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::warn;

/// Bound on tracked identities; prevents unbounded growth from churning
/// callers.
const MAX_TRACKED_IDENTITIES: usize = 10_000;

/// Quota configuration.
#[derive(Debug, Clone)]
pub struct QuotaConfig {
    /// Allowed generations per window
    pub limit: u32,
    /// Window length
    pub window: Duration,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            limit: 10,
            window: Duration::from_secs(24 * 60 * 60),
        }
    }
}

/// The outcome of a quota check, surfaced verbatim in 429 responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct QuotaDecision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    pub reset_time: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
}

struct Window {
    count: u32,
    started_at: DateTime<Utc>,
}

/// Per-identity fixed-window quota store.
pub struct QuotaStore {
    config: QuotaConfig,
    windows: RwLock<HashMap<String, Window>>,
}

impl QuotaStore {
    pub fn new(config: QuotaConfig) -> Self {
        Self {
            config,
            windows: RwLock::new(HashMap::new()),
        }
    }

    fn window_duration(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.config.window)
            .unwrap_or_else(|_| chrono::Duration::hours(24))
    }

    /// Check whether `identity` may consume one generation, and consume
    /// it if so.
    pub async fn check(&self, identity: &str, country: Option<&str>) -> QuotaDecision {
        let now = Utc::now();
        let window_len = self.window_duration();
        let mut windows = self.windows.write().await;

        // Opportunistic cleanup when the map grows past its bound.
        if windows.len() > MAX_TRACKED_IDENTITIES {
            windows.retain(|_, w| now - w.started_at < window_len);
            if windows.len() > MAX_TRACKED_IDENTITIES {
                warn!("Quota store over capacity after cleanup");
            }
        }

        let window = windows.entry(identity.to_string()).or_insert(Window {
            count: 0,
            started_at: now,
        });

        // Expired window: start fresh.
        if now - window.started_at >= window_len {
            window.count = 0;
            window.started_at = now;
        }

        let reset_time = window.started_at + window_len;

        if window.count < self.config.limit {
            window.count += 1;
            QuotaDecision {
                allowed: true,
                limit: self.config.limit,
                remaining: self.config.limit - window.count,
                reset_time,
                country: country.map(str::to_string),
            }
        } else {
            QuotaDecision {
                allowed: false,
                limit: self.config.limit,
                remaining: 0,
                reset_time,
                country: country.map(str::to_string),
            }
        }
    }

    /// Read the current state without consuming.
    pub async fn peek(&self, identity: &str) -> QuotaDecision {
        let now = Utc::now();
        let window_len = self.window_duration();
        let windows = self.windows.read().await;

        match windows.get(identity) {
            Some(w) if now - w.started_at < window_len => QuotaDecision {
                allowed: w.count < self.config.limit,
                limit: self.config.limit,
                remaining: self.config.limit.saturating_sub(w.count),
                reset_time: w.started_at + window_len,
                country: None,
            },
            _ => QuotaDecision {
                allowed: true,
                limit: self.config.limit,
                remaining: self.config.limit,
                reset_time: now + window_len,
                country: None,
            },
        }
    }
}

impl Default for QuotaStore {
    fn default() -> Self {
        Self::new(QuotaConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_allows_until_limit() {
        let store = QuotaStore::new(QuotaConfig {
            limit: 3,
            window: Duration::from_secs(3600),
        });

        for expected_remaining in [2, 1, 0] {
            let d = store.check("user-1", Some("DE")).await;
            assert!(d.allowed);
            assert_eq!(d.remaining, expected_remaining);
            assert_eq!(d.limit, 3);
            assert_eq!(d.country.as_deref(), Some("DE"));
        }

        let denied = store.check("user-1", Some("DE")).await;
        assert!(!denied.allowed);
        assert_eq!(denied.remaining, 0);
        assert!(denied.reset_time > Utc::now());
    }

    #[tokio::test]
    async fn test_identities_are_independent() {
        let store = QuotaStore::new(QuotaConfig {
            limit: 1,
            window: Duration::from_secs(3600),
        });

        assert!(store.check("user-1", None).await.allowed);
        assert!(!store.check("user-1", None).await.allowed);
        assert!(store.check("user-2", None).await.allowed);
    }

    #[tokio::test]
    async fn test_expired_window_resets() {
        let store = QuotaStore::new(QuotaConfig {
            limit: 1,
            window: Duration::from_millis(10),
        });

        assert!(store.check("user-1", None).await.allowed);
        assert!(!store.check("user-1", None).await.allowed);
        std::thread::sleep(Duration::from_millis(20));
        assert!(store.check("user-1", None).await.allowed);
    }

    #[tokio::test]
    async fn test_peek_does_not_consume() {
        let store = QuotaStore::new(QuotaConfig {
            limit: 2,
            window: Duration::from_secs(3600),
        });

        assert_eq!(store.peek("user-1").await.remaining, 2);
        assert_eq!(store.peek("user-1").await.remaining, 2);
        store.check("user-1", None).await;
        assert_eq!(store.peek("user-1").await.remaining, 1);
    }
}
