//! Application configuration.

use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Server configuration.
    pub server: ServerConfig,
    /// Database configuration.
    pub database: DatabaseConfig,
    /// Redis configuration. When absent the timeline cache lives in process memory.
    #[serde(default)]
    pub redis: Option<RedisConfig>,
    /// Feed configuration.
    #[serde(default)]
    pub feed: FeedConfig,
    /// Image storage configuration.
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to.
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to bind to.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Public URL of this instance.
    pub url: String,
}

/// Database connection configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// `PostgreSQL` connection URL.
    pub url: String,
    /// Maximum number of connections in the pool.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Minimum number of connections in the pool.
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

/// Redis configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    /// Redis connection URL.
    pub url: String,
    /// Key prefix for all Redis keys.
    #[serde(default = "default_redis_prefix")]
    pub prefix: String,
}

/// Feed configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct FeedConfig {
    /// Number of posts per page on every feed.
    #[serde(default = "default_page_size")]
    pub page_size: u64,
    /// How long a rendered timeline page may be served from cache.
    #[serde(default = "default_timeline_cache_ttl_secs")]
    pub timeline_cache_ttl_secs: u64,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            timeline_cache_ttl_secs: default_timeline_cache_ttl_secs(),
        }
    }
}

/// Local image storage configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Directory uploaded images are written to.
    #[serde(default = "default_storage_path")]
    pub base_path: PathBuf,
    /// URL prefix images are served under.
    #[serde(default = "default_storage_url")]
    pub base_url: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            base_path: default_storage_path(),
            base_url: default_storage_url(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

const fn default_port() -> u16 {
    3000
}

const fn default_max_connections() -> u32 {
    20
}

const fn default_min_connections() -> u32 {
    2
}

fn default_redis_prefix() -> String {
    "quill".to_string()
}

const fn default_page_size() -> u64 {
    10
}

const fn default_timeline_cache_ttl_secs() -> u64 {
    20
}

fn default_storage_path() -> PathBuf {
    PathBuf::from("./media")
}

fn default_storage_url() -> String {
    "/media".to_string()
}

impl Config {
    /// Load configuration from files and environment variables.
    ///
    /// Configuration is loaded in the following order:
    /// 1. `config/default.toml`
    /// 2. `config/{environment}.toml` (based on `QUILL_ENV`)
    /// 3. Environment variables with `QUILL__` prefix
    pub fn load() -> Result<Self, config::ConfigError> {
        dotenvy::dotenv().ok();

        let env = std::env::var("QUILL_ENV").unwrap_or_else(|_| "development".to_string());

        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{env}")).required(false))
            .add_source(
                config::Environment::with_prefix("QUILL")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Load configuration from a specific file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .add_source(
                config::Environment::with_prefix("QUILL")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}
