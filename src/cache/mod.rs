//! Process-local TTL caches.
//!
//! Pools are split by how quickly their data goes stale:
//!
//! - **api**: dashboard widgets and system stats (5 minutes)
//! - **database**: analytics queries (15 minutes)
//! - **static**: class and roster lookups (1 hour)
//! - **reports**: generated reports (2 hours)
//!
//! Each pool is its own namespace; invalidating in one never touches another.

mod config;
pub mod keys;
mod pool;

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

pub use config::CacheConfig;
pub use keys::{cache_key, class_pattern, class_prefix, teacher_pattern, teacher_prefix};
pub use pool::{PoolStats, TtlCache, MAX_TTL_SECS};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Pool {
    Api,
    Database,
    Static,
    Reports,
}

impl Pool {
    pub const ALL: [Pool; 4] = [Pool::Api, Pool::Database, Pool::Static, Pool::Reports];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Api => "api",
            Self::Database => "database",
            Self::Static => "static",
            Self::Reports => "reports",
        }
    }

    fn check_period(self) -> Duration {
        Duration::from_secs(match self {
            Self::Api => 60,
            Self::Database => 120,
            Self::Static => 300,
            Self::Reports => 600,
        })
    }
}

/// Which pools an invalidation applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    All,
    Only(Pool),
}

/// Owns every cache pool. Built once at startup and shared through `Arc`.
#[derive(Debug)]
pub struct CacheRegistry {
    api: TtlCache,
    database: TtlCache,
    statics: TtlCache,
    reports: TtlCache,
}

impl CacheRegistry {
    pub fn new(config: &CacheConfig) -> Self {
        let build = |pool: Pool, ttl: Duration| {
            TtlCache::new(pool.as_str(), ttl, pool.check_period()).with_enabled(config.enabled)
        };

        Self {
            api: build(Pool::Api, config.api_ttl),
            database: build(Pool::Database, config.database_ttl),
            statics: build(Pool::Static, config.static_ttl),
            reports: build(Pool::Reports, config.reports_ttl),
        }
    }

    pub fn pool(&self, pool: Pool) -> &TtlCache {
        match pool {
            Pool::Api => &self.api,
            Pool::Database => &self.database,
            Pool::Static => &self.statics,
            Pool::Reports => &self.reports,
        }
    }

    pub async fn invalidate(&self, pattern: &str, scope: Scope) {
        match scope {
            Scope::Only(pool) => self.pool(pool).invalidate(pattern).await,
            Scope::All => {
                for pool in Pool::ALL {
                    self.pool(pool).invalidate(pattern).await;
                }
            }
        }
    }

    /// Drops every cached value derived from one class.
    pub async fn invalidate_class(&self, class_id: i64) {
        self.invalidate(&class_pattern(class_id), Scope::All).await;
    }

    pub async fn sweep(&self) -> usize {
        let mut removed = 0;
        for pool in Pool::ALL {
            removed += self.pool(pool).sweep().await;
        }
        removed
    }

    pub async fn clear(&self) {
        for pool in Pool::ALL {
            self.pool(pool).clear().await;
        }
        tracing::info!("all caches cleared");
    }

    pub async fn stats(&self) -> Vec<PoolStats> {
        let mut stats = Vec::with_capacity(Pool::ALL.len());
        for pool in Pool::ALL {
            stats.push(self.pool(pool).stats().await);
        }
        stats
    }

    /// Spawns the periodic expiry sweep. Abort the handle on shutdown.
    pub fn spawn_sweeper(self: &Arc<Self>) -> JoinHandle<()> {
        let registry = Arc::clone(self);
        let period = Pool::ALL
            .iter()
            .map(|pool| registry.pool(*pool).check_period())
            .min()
            .unwrap_or(Duration::from_secs(60));

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let removed = registry.sweep().await;
                if removed > 0 {
                    tracing::debug!(removed, "swept expired cache entries");
                }
            }
        })
    }
}

impl Default for CacheRegistry {
    fn default() -> Self {
        Self::new(&CacheConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn pools_are_independent_namespaces() {
        let registry = CacheRegistry::default();
        registry.pool(Pool::Api).set("stats:class1:a", &1, None).await;
        registry.pool(Pool::Reports).set("report:class1:b", &2, None).await;

        registry.invalidate(":class1:", Scope::Only(Pool::Api)).await;

        assert!(!registry.pool(Pool::Api).contains_key("stats:class1:a").await);
        assert!(registry.pool(Pool::Reports).contains_key("report:class1:b").await);
    }

    #[tokio::test]
    async fn class_invalidation_spans_all_pools() {
        let registry = CacheRegistry::default();
        for pool in Pool::ALL {
            registry.pool(pool).set("x:class4:1", &1, None).await;
            registry.pool(pool).set("x:class5:1", &1, None).await;
        }

        registry.invalidate_class(4).await;

        for pool in Pool::ALL {
            assert!(!registry.pool(pool).contains_key("x:class4:1").await);
            assert!(registry.pool(pool).contains_key("x:class5:1").await);
        }
    }

    #[tokio::test]
    async fn default_ttls_follow_volatility() {
        let registry = CacheRegistry::default();
        assert_eq!(registry.pool(Pool::Api).default_ttl(), Duration::from_secs(300));
        assert_eq!(registry.pool(Pool::Reports).default_ttl(), Duration::from_secs(7200));
        let names: Vec<_> = registry.stats().await.into_iter().map(|s| s.pool).collect();
        assert_eq!(names, ["api", "database", "static", "reports"]);
    }

    #[tokio::test(start_paused = true)]
    async fn sweeper_removes_expired_entries() {
        let registry = Arc::new(CacheRegistry::default());
        registry
            .pool(Pool::Api)
            .set("short", &1, Some(Duration::from_secs(1)))
            .await;

        let handle = registry.spawn_sweeper();
        tokio::time::sleep(Duration::from_secs(61)).await;

        assert_eq!(registry.pool(Pool::Api).len().await, 0);
        handle.abort();
    }

    #[tokio::test]
    async fn clear_empties_every_pool() {
        let registry = CacheRegistry::default();
        registry.pool(Pool::Static).set("class:1", &"x", None).await;
        registry.clear().await;
        assert!(registry.pool(Pool::Static).is_empty().await);
    }
}
