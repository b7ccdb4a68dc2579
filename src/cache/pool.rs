//! A single TTL cache pool.
//!
//! Values are stored as serialized JSON so one pool can hold any payload.
//! Expired entries are dropped lazily on lookup and by [`TtlCache::sweep`].

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::RwLock;
use tokio::time::Instant;

/// Longest lifetime, in seconds, any entry is kept. Longer TTLs are clamped.
pub const MAX_TTL_SECS: u64 = 30 * 24 * 60 * 60;

const MAX_TTL: Duration = Duration::from_secs(MAX_TTL_SECS);

#[derive(Debug, Clone)]
struct CacheEntry {
    value: Arc<[u8]>,
    expires_at: Instant,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PoolStats {
    pub pool: &'static str,
    pub keys: usize,
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
}

#[derive(Debug)]
pub struct TtlCache {
    name: &'static str,
    enabled: bool,
    default_ttl: Duration,
    check_period: Duration,
    entries: RwLock<HashMap<String, CacheEntry>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl TtlCache {
    pub fn new(name: &'static str, default_ttl: Duration, check_period: Duration) -> Self {
        Self {
            name,
            enabled: true,
            default_ttl,
            check_period,
            entries: RwLock::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// A disabled pool never stores anything and always computes.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    pub fn check_period(&self) -> Duration {
        self.check_period
    }

    /// Returns the cached value for `key`, or runs `compute` and caches its
    /// result for `ttl` (the pool default when `None`).
    ///
    /// Concurrent misses on the same key each run `compute`; the last write
    /// wins. Errors are returned untouched and never cached.
    pub async fn get_or_compute<T, E, F, Fut>(
        &self,
        key: &str,
        ttl: Option<Duration>,
        compute: F,
    ) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if !self.enabled {
            return compute().await;
        }

        if let Some(value) = self.get::<T>(key).await {
            return Ok(value);
        }

        let value = compute().await?;
        self.set(key, &value, ttl).await;
        Ok(value)
    }

    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let Some(raw) = self.lookup(key).await else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            tracing::trace!(pool = self.name, key, "cache miss");
            return None;
        };

        match serde_json::from_slice(&raw) {
            Ok(value) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                tracing::trace!(pool = self.name, key, "cache hit");
                Some(value)
            }
            Err(err) => {
                tracing::warn!(
                    pool = self.name,
                    key,
                    error = %err,
                    "dropping undecodable cache entry"
                );
                self.entries.write().await.remove(key);
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    pub async fn set<T: Serialize>(&self, key: &str, value: &T, ttl: Option<Duration>) {
        if !self.enabled {
            return;
        }

        let bytes = match serde_json::to_vec(value) {
            Ok(bytes) => bytes,
            Err(err) => {
                tracing::warn!(pool = self.name, key, error = %err, "value not cacheable");
                return;
            }
        };

        let ttl = ttl.unwrap_or(self.default_ttl).min(MAX_TTL);
        let entry = CacheEntry {
            value: Arc::from(bytes),
            expires_at: Instant::now() + ttl,
        };
        self.entries.write().await.insert(key.to_string(), entry);
    }

    async fn lookup(&self, key: &str) -> Option<Arc<[u8]>> {
        let now = Instant::now();
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                Some(entry) if !entry.is_expired(now) => return Some(Arc::clone(&entry.value)),
                Some(_) => {}
                None => return None,
            }
        }

        let mut entries = self.entries.write().await;
        if entries.get(key).is_some_and(|entry| entry.is_expired(now)) {
            entries.remove(key);
        }
        None
    }

    /// True when a live entry exists under `key`.
    pub async fn contains_key(&self, key: &str) -> bool {
        let now = Instant::now();
        self.entries
            .read()
            .await
            .get(key)
            .is_some_and(|entry| !entry.is_expired(now))
    }

    /// Removes every entry whose key contains `pattern`.
    pub async fn invalidate(&self, pattern: &str) {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|key, _| !key.contains(pattern));
        let removed = before - entries.len();
        if removed > 0 {
            tracing::debug!(pool = self.name, pattern, removed, "invalidated cache entries");
        }
    }

    /// Drops expired entries and returns how many were removed.
    pub async fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now));
        before - entries.len()
    }

    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }

    /// Number of stored entries, including ones not yet swept.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn stats(&self) -> PoolStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let lookups = hits + misses;
        PoolStats {
            pool: self.name,
            keys: self.len().await,
            hits,
            misses,
            hit_rate: if lookups == 0 {
                0.0
            } else {
                hits as f64 / lookups as f64
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use std::convert::Infallible;
    use std::sync::atomic::AtomicUsize;

    use super::*;

    fn pool() -> TtlCache {
        TtlCache::new("test", Duration::from_secs(300), Duration::from_secs(60))
    }

    async fn counted(pool: &TtlCache, key: &str, calls: &AtomicUsize, ttl: u64) -> u32 {
        pool.get_or_compute(key, Some(Duration::from_secs(ttl)), || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, Infallible>(42)
        })
        .await
        .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn computes_once_within_ttl() {
        let pool = pool();
        let calls = AtomicUsize::new(0);

        assert_eq!(counted(&pool, "k", &calls, 60).await, 42);
        tokio::time::advance(Duration::from_secs(59)).await;
        assert_eq!(counted(&pool, "k", &calls, 60).await, 42);

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let stats = pool.stats().await;
        assert_eq!((stats.hits, stats.misses), (1, 1));
        assert!((stats.hit_rate - 0.5).abs() < f64::EPSILON);
    }

    #[tokio::test(start_paused = true)]
    async fn recomputes_after_ttl() {
        let pool = pool();
        let calls = AtomicUsize::new(0);

        counted(&pool, "k", &calls, 60).await;
        tokio::time::advance(Duration::from_secs(61)).await;
        counted(&pool, "k", &calls, 60).await;

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_entries_are_never_returned() {
        let pool = pool();
        pool.set("k", &"stale", Some(Duration::from_secs(5))).await;
        tokio::time::advance(Duration::from_secs(5)).await;

        assert_eq!(pool.get::<String>("k").await, None);
        assert!(!pool.contains_key("k").await);
        assert_eq!(pool.len().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn default_ttl_applies_when_none_given() {
        let pool = pool();
        pool.set("k", &1_u8, None).await;
        tokio::time::advance(Duration::from_secs(299)).await;
        assert!(pool.contains_key("k").await);
        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(!pool.contains_key("k").await);
    }

    #[tokio::test(start_paused = true)]
    async fn oversized_ttls_are_clamped() {
        let pool = TtlCache::new("test", Duration::from_secs(u64::MAX), Duration::from_secs(60));
        pool.set("default", &1_u8, None).await;
        pool.set("explicit", &2_u8, Some(Duration::MAX)).await;
        assert_eq!(pool.get::<u8>("default").await, Some(1));

        tokio::time::advance(MAX_TTL - Duration::from_secs(1)).await;
        assert!(pool.contains_key("explicit").await);
        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(!pool.contains_key("default").await);
        assert!(!pool.contains_key("explicit").await);
    }

    #[tokio::test]
    async fn errors_are_not_cached() {
        let pool = pool();
        let failed: Result<u32, &str> = pool
            .get_or_compute("k", None, || async { Err("store unavailable") })
            .await;
        assert_eq!(failed, Err("store unavailable"));
        assert!(!pool.contains_key("k").await);

        let ok: Result<u32, &str> = pool.get_or_compute("k", None, || async { Ok(7) }).await;
        assert_eq!(ok, Ok(7));
        assert!(pool.contains_key("k").await);
    }

    #[tokio::test]
    async fn invalidate_removes_only_matching_keys() {
        let pool = pool();
        pool.set("report:class7:aa", &1, None).await;
        pool.set("report:class7:bb", &2, None).await;
        pool.set("report:class8:cc", &3, None).await;

        pool.invalidate(":class7:").await;

        assert!(!pool.contains_key("report:class7:aa").await);
        assert!(!pool.contains_key("report:class7:bb").await);
        assert!(pool.contains_key("report:class8:cc").await);

        pool.invalidate("no-such-key").await;
        assert_eq!(pool.len().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_drops_only_expired() {
        let pool = pool();
        pool.set("short", &1, Some(Duration::from_secs(10))).await;
        pool.set("long", &2, Some(Duration::from_secs(100))).await;
        tokio::time::advance(Duration::from_secs(11)).await;

        assert_eq!(pool.sweep().await, 1);
        assert!(pool.contains_key("long").await);
    }

    #[tokio::test]
    async fn disabled_pool_always_computes() {
        let pool = pool().with_enabled(false);
        let calls = AtomicUsize::new(0);

        counted(&pool, "k", &calls, 60).await;
        counted(&pool, "k", &calls, 60).await;

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(pool.is_empty().await);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_misses_each_compute() {
        let pool = pool();
        let calls = AtomicUsize::new(0);
        let slow = || async {
            calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok::<_, Infallible>("done".to_string())
        };

        let (a, b) = tokio::join!(
            pool.get_or_compute("k", None, slow),
            pool.get_or_compute("k", None, slow)
        );

        assert_eq!(a.unwrap(), "done");
        assert_eq!(b.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(pool.len().await, 1);
    }
}
