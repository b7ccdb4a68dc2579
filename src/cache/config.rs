//! Cache pool configuration.

use std::time::Duration;

const DEFAULT_API_TTL_SECS: u64 = 300;
const DEFAULT_DATABASE_TTL_SECS: u64 = 900;
const DEFAULT_STATIC_TTL_SECS: u64 = 3600;
const DEFAULT_REPORTS_TTL_SECS: u64 = 7200;

/// TTLs per pool plus the global switch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    pub enabled: bool,
    pub api_ttl: Duration,
    pub database_ttl: Duration,
    pub static_ttl: Duration,
    pub reports_ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            api_ttl: Duration::from_secs(DEFAULT_API_TTL_SECS),
            database_ttl: Duration::from_secs(DEFAULT_DATABASE_TTL_SECS),
            static_ttl: Duration::from_secs(DEFAULT_STATIC_TTL_SECS),
            reports_ttl: Duration::from_secs(DEFAULT_REPORTS_TTL_SECS),
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            enabled: settings.cache_enabled,
            api_ttl: Duration::from_secs(settings.cache_api_ttl),
            database_ttl: Duration::from_secs(settings.cache_db_ttl),
            static_ttl: Duration::from_secs(settings.cache_static_ttl),
            reports_ttl: Duration::from_secs(settings.cache_reports_ttl),
        }
    }
}
