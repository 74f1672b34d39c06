//! Configuration module for the menu backend.
//!
//! All configuration is loaded from `MENU_*` environment variables with sensible defaults.

use std::env;
use std::fmt::Debug;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to SQLite database file
    pub db_path: PathBuf,
    /// Path to Tantivy menu index directory
    pub index_path: PathBuf,
    /// Address to bind the server to
    pub bind_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Telegram bot token; messages are only logged without one
    pub bot_token: Option<String>,
    pub telegram_api_url: String,
    /// Bound on every store and notification call
    pub upstream_timeout: Duration,
    pub reminder_interval: Duration,
    pub inactivity_days: u32,
    /// Idle time after which a navigation session is dropped
    pub session_ttl: Duration,
    pub tree_cache_ttl: Duration,
    /// Repeated visits to the same node closer than this count once
    pub visit_dedup_window: Duration,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let db_path = env::var("MENU_DB_PATH")
            .unwrap_or_else(|_| "./data/menu.sqlite".to_string())
            .into();

        let index_path = env::var("MENU_INDEX_PATH")
            .unwrap_or_else(|_| "./data/index".to_string())
            .into();

        let bind_addr = parse_var("MENU_BIND_ADDR", "127.0.0.1:8080");

        let log_level = env::var("MENU_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let bot_token = env::var("MENU_BOT_TOKEN").ok().filter(|t| !t.trim().is_empty());

        let telegram_api_url = env::var("MENU_TELEGRAM_API_URL")
            .unwrap_or_else(|_| "https://api.telegram.org".to_string());

        Self {
            db_path,
            index_path,
            bind_addr,
            log_level,
            bot_token,
            telegram_api_url,
            upstream_timeout: Duration::from_secs(parse_var("MENU_UPSTREAM_TIMEOUT_SECS", "15")),
            reminder_interval: Duration::from_secs(
                60 * parse_var::<u64>("MENU_REMINDER_INTERVAL_MINUTES", "60"),
            ),
            inactivity_days: parse_var("MENU_INACTIVITY_DAYS", "10"),
            session_ttl: Duration::from_secs(parse_var("MENU_SESSION_TTL_SECS", "86400")),
            tree_cache_ttl: Duration::from_secs(parse_var("MENU_TREE_CACHE_TTL_SECS", "3600")),
            visit_dedup_window: Duration::from_secs(parse_var("MENU_VISIT_DEDUP_SECS", "5")),
        }
    }
}

fn parse_var<T>(key: &str, default: &str) -> T
where
    T: FromStr,
    T::Err: Debug,
{
    env::var(key)
        .unwrap_or_else(|_| default.to_string())
        .parse()
        .unwrap_or_else(|e| panic!("Invalid {} format: {:?}", key, e))
}
