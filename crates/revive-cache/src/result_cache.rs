//! Generated-result cache.
//!
//! Maps (source fingerprint, variant key) to a previously generated
//! asset so expensive regeneration is skipped. TTL-bounded, capacity-
//! bounded with oldest-first eviction, and single-flight: two concurrent
//! requests for the identical key serialize on a per-key guard and the
//! second reuses the first's result.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use metrics::counter;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};

use revive_models::{Fingerprint, ImageAsset};

/// Cache key: source fingerprint plus a variant discriminator.
///
/// The default variant (plain restoration) uses an empty string; the
/// eye-color flow uses the color value.
type Key = (Fingerprint, String);

/// Result cache configuration.
#[derive(Debug, Clone)]
pub struct ResultCacheConfig {
    /// How long an entry stays valid.
    pub ttl: Duration,
    /// Maximum number of entries before oldest-first eviction.
    pub max_entries: usize,
}

impl Default for ResultCacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(30 * 60),
            max_entries: 64,
        }
    }
}

struct Entry {
    asset: ImageAsset,
    created_at: Instant,
}

/// In-memory, per-process result cache with single-flight generation.
pub struct ResultCache {
    config: ResultCacheConfig,
    entries: RwLock<HashMap<Key, Entry>>,
    /// Per-key generation guards for single-flight coalescing.
    guards: Mutex<HashMap<Key, Arc<Mutex<()>>>>,
}

impl ResultCache {
    pub fn new(config: ResultCacheConfig) -> Self {
        Self {
            config,
            entries: RwLock::new(HashMap::new()),
            guards: Mutex::new(HashMap::new()),
        }
    }

    /// Look up a cached asset; expired entries are purged on read.
    pub async fn get(&self, fingerprint: &Fingerprint, variant: &str) -> Option<ImageAsset> {
        let key = (fingerprint.clone(), variant.to_string());

        {
            let entries = self.entries.read().await;
            match entries.get(&key) {
                Some(entry) if entry.created_at.elapsed() < self.config.ttl => {
                    debug!(fingerprint = %fingerprint, variant, "Cache hit");
                    counter!("revive_result_cache_hits_total").increment(1);
                    return Some(entry.asset.clone());
                }
                Some(_) => {}
                None => {
                    counter!("revive_result_cache_misses_total").increment(1);
                    return None;
                }
            }
        }

        // Entry exists but is stale: purge under the write lock.
        let mut entries = self.entries.write().await;
        if let Some(entry) = entries.get(&key) {
            if entry.created_at.elapsed() >= self.config.ttl {
                entries.remove(&key);
                debug!(fingerprint = %fingerprint, variant, "Purged expired entry");
            } else {
                return Some(entry.asset.clone());
            }
        }
        counter!("revive_result_cache_misses_total").increment(1);
        None
    }

    /// Insert an asset, replacing any prior entry for the same key and
    /// evicting the oldest entry when at capacity.
    pub async fn insert(&self, fingerprint: &Fingerprint, variant: &str, asset: ImageAsset) {
        let key = (fingerprint.clone(), variant.to_string());
        let mut entries = self.entries.write().await;

        if !entries.contains_key(&key) && entries.len() >= self.config.max_entries {
            if let Some(oldest) = entries
                .iter()
                .min_by_key(|(_, e)| e.created_at)
                .map(|(k, _)| k.clone())
            {
                entries.remove(&oldest);
                warn!("Result cache at capacity, evicted oldest entry");
            }
        }

        entries.insert(
            key,
            Entry {
                asset,
                created_at: Instant::now(),
            },
        );
    }

    /// Get the cached asset or generate it, coalescing concurrent
    /// callers for the same key onto one generation.
    pub async fn get_or_generate<F, Fut, E>(
        &self,
        fingerprint: &Fingerprint,
        variant: &str,
        generate: F,
    ) -> Result<ImageAsset, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<ImageAsset, E>>,
    {
        if let Some(asset) = self.get(fingerprint, variant).await {
            return Ok(asset);
        }

        let key = (fingerprint.clone(), variant.to_string());
        let guard = {
            let mut guards = self.guards.lock().await;
            Arc::clone(guards.entry(key.clone()).or_default())
        };

        let _held = guard.lock().await;

        // A concurrent caller may have generated while we waited.
        if let Some(asset) = self.get(fingerprint, variant).await {
            return Ok(asset);
        }

        let result = generate().await;
        if let Ok(ref asset) = result {
            self.insert(fingerprint, variant, asset.clone()).await;
        }

        drop(_held);
        // Drop the guard entry once no other caller holds it.
        let mut guards = self.guards.lock().await;
        if let Some(g) = guards.get(&key) {
            if Arc::strong_count(g) == 1 {
                guards.remove(&key);
            }
        }

        result
    }

    /// Drop every entry.
    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }

    /// Current entry count (expired entries included until purged).
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

impl Default for ResultCache {
    fn default() -> Self {
        Self::new(ResultCacheConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn asset(tag: u8) -> ImageAsset {
        ImageAsset::new(vec![tag; 8], "image/jpeg")
    }

    #[tokio::test]
    async fn test_round_trip_within_ttl() {
        let cache = ResultCache::default();
        let fp = Fingerprint::of(b"photo");

        cache.insert(&fp, "blue", asset(1)).await;
        assert_eq!(cache.get(&fp, "blue").await, Some(asset(1)));
        assert_eq!(cache.get(&fp, "green").await, None);
    }

    #[tokio::test]
    async fn test_expired_entry_is_bypassed_and_purged() {
        let cache = ResultCache::new(ResultCacheConfig {
            ttl: Duration::from_millis(10),
            max_entries: 8,
        });
        let fp = Fingerprint::of(b"photo");

        cache.insert(&fp, "", asset(1)).await;
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(cache.get(&fp, "").await, None);
        assert_eq!(cache.len().await, 0);
    }

    #[tokio::test]
    async fn test_clear_drops_everything() {
        let cache = ResultCache::default();
        let fp = Fingerprint::of(b"photo");
        cache.insert(&fp, "blue", asset(1)).await;
        cache.insert(&fp, "green", asset(2)).await;

        cache.clear().await;
        assert!(cache.is_empty().await);
        assert_eq!(cache.get(&fp, "blue").await, None);
    }

    #[tokio::test]
    async fn test_capacity_evicts_oldest() {
        let cache = ResultCache::new(ResultCacheConfig {
            ttl: Duration::from_secs(60),
            max_entries: 2,
        });
        let fp = Fingerprint::of(b"photo");

        cache.insert(&fp, "a", asset(1)).await;
        std::thread::sleep(Duration::from_millis(5));
        cache.insert(&fp, "b", asset(2)).await;
        std::thread::sleep(Duration::from_millis(5));
        cache.insert(&fp, "c", asset(3)).await;

        assert_eq!(cache.len().await, 2);
        assert_eq!(cache.get(&fp, "a").await, None);
        assert_eq!(cache.get(&fp, "b").await, Some(asset(2)));
        assert_eq!(cache.get(&fp, "c").await, Some(asset(3)));
    }

    #[tokio::test]
    async fn test_replacing_same_key_keeps_one_entry() {
        let cache = ResultCache::default();
        let fp = Fingerprint::of(b"photo");

        cache.insert(&fp, "blue", asset(1)).await;
        cache.insert(&fp, "blue", asset(2)).await;
        assert_eq!(cache.len().await, 1);
        assert_eq!(cache.get(&fp, "blue").await, Some(asset(2)));
    }

    #[tokio::test]
    async fn test_get_or_generate_caches_result() {
        let cache = ResultCache::default();
        let fp = Fingerprint::of(b"photo");
        let calls = AtomicU32::new(0);

        for _ in 0..3 {
            let result: Result<ImageAsset, String> = cache
                .get_or_generate(&fp, "blue", || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Ok(asset(7)) }
                })
                .await;
            assert_eq!(result.unwrap(), asset(7));
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_get_or_generate_does_not_cache_errors() {
        let cache = ResultCache::default();
        let fp = Fingerprint::of(b"photo");

        let result: Result<ImageAsset, String> = cache
            .get_or_generate(&fp, "", || async { Err("provider down".to_string()) })
            .await;
        assert!(result.is_err());
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_single_flight_coalesces_concurrent_callers() {
        let cache = Arc::new(ResultCache::default());
        let fp = Fingerprint::of(b"photo");
        let calls = Arc::new(AtomicU32::new(0));

        let mut handles = Vec::new();
        for _ in 0..4 {
            let cache = Arc::clone(&cache);
            let fp = fp.clone();
            let calls = Arc::clone(&calls);
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_generate(&fp, "blue", move || {
                        calls.fetch_add(1, Ordering::SeqCst);
                        async {
                            tokio::time::sleep(Duration::from_millis(20)).await;
                            Ok::<_, String>(asset(9))
                        }
                    })
                    .await
                    .unwrap()
            }));
        }

        for handle in handles {
            assert_eq!(handle.await.unwrap(), asset(9));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
