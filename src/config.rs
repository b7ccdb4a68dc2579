//! Runtime settings: command-line flags with environment fallbacks.

use std::str::FromStr;
use std::time::Duration;

use clap::builder::RangedU64ValueParser;
use clap::{Args, ValueEnum};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqliteSynchronous};

use crate::cache::MAX_TTL_SECS;
use crate::db::DEFAULT_TEACHER_ID;

const DEFAULT_DATABASE_URL: &str = "sqlite://data/app.db";
const DEFAULT_MAX_CONNECTIONS: u32 = 5;
const DEFAULT_BUSY_TIMEOUT_SECS: u64 = 5;

#[derive(Debug, Clone, Args)]
pub struct Settings {
    /// SQLite connection string.
    #[arg(long, env = "DATABASE_URL", default_value = DEFAULT_DATABASE_URL, global = true)]
    pub database_url: String,

    #[arg(
        long,
        env = "DB_MAX_CONNECTIONS",
        default_value_t = DEFAULT_MAX_CONNECTIONS,
        global = true
    )]
    pub max_connections: u32,

    /// Teacher on whose behalf commands run.
    #[arg(
        long = "teacher",
        env = "TEACHER_ID",
        default_value_t = DEFAULT_TEACHER_ID,
        global = true
    )]
    pub teacher_id: i64,

    #[command(flatten)]
    pub logging: LoggingSettings,

    #[command(flatten)]
    pub cache: CacheSettings,
}

impl Settings {
    pub fn connect_options(&self) -> Result<SqliteConnectOptions, sqlx::Error> {
        Ok(SqliteConnectOptions::from_str(&self.database_url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(DEFAULT_BUSY_TIMEOUT_SECS)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Compact,
    Json,
}

#[derive(Debug, Clone, Args)]
pub struct LoggingSettings {
    #[arg(
        long,
        env = "LOG_FORMAT",
        value_enum,
        default_value_t = LogFormat::Compact,
        global = true
    )]
    pub log_format: LogFormat,

    /// Default level when `RUST_LOG` is unset.
    #[arg(long, env = "LOG_LEVEL", default_value = "info", global = true)]
    pub log_level: tracing::level_filters::LevelFilter,
}

#[derive(Debug, Clone, Args)]
pub struct CacheSettings {
    #[arg(
        long,
        env = "CACHE_ENABLED",
        default_value_t = true,
        action = clap::ArgAction::Set,
        global = true
    )]
    pub cache_enabled: bool,

    #[arg(
        long,
        env = "CACHE_API_TTL",
        default_value_t = 300,
        value_parser = ttl_secs(),
        global = true
    )]
    pub cache_api_ttl: u64,

    #[arg(
        long,
        env = "CACHE_DB_TTL",
        default_value_t = 900,
        value_parser = ttl_secs(),
        global = true
    )]
    pub cache_db_ttl: u64,

    #[arg(
        long,
        env = "CACHE_STATIC_TTL",
        default_value_t = 3600,
        value_parser = ttl_secs(),
        global = true
    )]
    pub cache_static_ttl: u64,

    #[arg(
        long,
        env = "CACHE_REPORTS_TTL",
        default_value_t = 7200,
        value_parser = ttl_secs(),
        global = true
    )]
    pub cache_reports_ttl: u64,
}

/// Seconds between one and the longest lifetime a cache pool keeps.
fn ttl_secs() -> RangedU64ValueParser<u64> {
    clap::value_parser!(u64).range(1..=MAX_TTL_SECS)
}
