//! Timeline page cache.
//!
//! Holds serialized timeline pages so repeated reads of the public timeline
//! skip the database. Entries expire after a fixed TTL and the whole cache is
//! cleared whenever a post changes through the core. A failing backend is
//! logged and reported as a miss, so readers never see cache errors.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use fred::clients::Client as RedisClient;
use fred::interfaces::{HashesInterface, KeysInterface};
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Storage for rendered timeline pages, keyed by page.
#[async_trait]
pub trait TimelineCache: Send + Sync {
    /// Get a cached value, or `None` on a miss.
    async fn get(&self, key: &str) -> Option<String>;

    /// Store a value.
    async fn put(&self, key: &str, value: String);

    /// Drop a single entry.
    async fn invalidate(&self, key: &str);

    /// Drop every entry.
    async fn clear(&self);
}

/// In-process timeline cache with a per-entry TTL.
pub struct MemoryTimelineCache {
    entries: RwLock<HashMap<String, (Instant, String)>>,
    ttl: Duration,
}

impl MemoryTimelineCache {
    /// Create an empty cache whose entries live for `ttl`.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
        }
    }
}

#[async_trait]
impl TimelineCache for MemoryTimelineCache {
    async fn get(&self, key: &str) -> Option<String> {
        let entries = self.entries.read().await;
        match entries.get(key) {
            Some((stored_at, value)) if stored_at.elapsed() < self.ttl => {
                debug!(key = %key, "Timeline cache hit");
                Some(value.clone())
            }
            _ => {
                debug!(key = %key, "Timeline cache miss");
                None
            }
        }
    }

    async fn put(&self, key: &str, value: String) {
        let mut entries = self.entries.write().await;
        let ttl = self.ttl;
        entries.retain(|_, (stored_at, _)| stored_at.elapsed() < ttl);
        entries.insert(key.to_string(), (Instant::now(), value));
    }

    async fn invalidate(&self, key: &str) {
        self.entries.write().await.remove(key);
    }

    async fn clear(&self) {
        self.entries.write().await.clear();
        debug!("Timeline cache cleared");
    }
}

/// Redis-backed timeline cache.
///
/// Every page lives as a field of one hash, `{prefix}:timeline`, which
/// expires `ttl` after its first field is written. Clearing the cache is a
/// single `DEL` of that hash.
#[derive(Clone)]
pub struct RedisTimelineCache {
    redis: Arc<RedisClient>,
    key: String,
    ttl_secs: i64,
}

impl RedisTimelineCache {
    /// Create a cache in the given key namespace.
    #[must_use]
    pub fn new(redis: Arc<RedisClient>, prefix: &str, ttl: Duration) -> Self {
        Self {
            redis,
            key: format!("{prefix}:timeline"),
            ttl_secs: ttl.as_secs().max(1) as i64,
        }
    }
}

#[async_trait]
impl TimelineCache for RedisTimelineCache {
    async fn get(&self, key: &str) -> Option<String> {
        match self
            .redis
            .hget::<Option<String>, _, _>(self.key.as_str(), key)
            .await
        {
            Ok(Some(value)) => {
                debug!(key = %key, "Timeline cache hit");
                Some(value)
            }
            Ok(None) => {
                debug!(key = %key, "Timeline cache miss");
                None
            }
            Err(e) => {
                warn!(error = %e, key = %key, "Timeline cache read failed");
                None
            }
        }
    }

    async fn put(&self, key: &str, value: String) {
        if let Err(e) = self
            .redis
            .hset::<(), _, _>(self.key.as_str(), (key, value))
            .await
        {
            warn!(error = %e, key = %key, "Timeline cache write failed");
            return;
        }

        // -1: the hash has no expiry yet
        match self.redis.ttl::<i64, _>(self.key.as_str()).await {
            Ok(remaining) if remaining < 0 => {
                if let Err(e) = self
                    .redis
                    .expire::<(), _>(self.key.as_str(), self.ttl_secs, None)
                    .await
                {
                    warn!(error = %e, "Failed to set timeline cache expiry");
                }
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "Failed to read timeline cache expiry"),
        }
    }

    async fn invalidate(&self, key: &str) {
        if let Err(e) = self
            .redis
            .hdel::<(), _, _>(self.key.as_str(), key)
            .await
        {
            warn!(error = %e, key = %key, "Timeline cache invalidation failed");
        }
    }

    async fn clear(&self) {
        match self.redis.del::<(), _>(self.key.as_str()).await {
            Ok(()) => debug!("Timeline cache cleared"),
            Err(e) => warn!(error = %e, "Timeline cache clear failed"),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_cache_put_get() {
        let cache = MemoryTimelineCache::new(Duration::from_secs(20));
        assert_eq!(cache.get("page:1").await, None);

        cache.put("page:1", "[1]".to_string()).await;
        assert_eq!(cache.get("page:1").await.as_deref(), Some("[1]"));
    }

    #[tokio::test]
    async fn test_memory_cache_expires() {
        let cache = MemoryTimelineCache::new(Duration::from_millis(20));
        cache.put("page:1", "[1]".to_string()).await;

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(cache.get("page:1").await, None);
    }

    #[tokio::test]
    async fn test_memory_cache_invalidate_and_clear() {
        let cache = MemoryTimelineCache::new(Duration::from_secs(20));
        cache.put("page:1", "[1]".to_string()).await;
        cache.put("page:2", "[2]".to_string()).await;

        cache.invalidate("page:1").await;
        assert_eq!(cache.get("page:1").await, None);
        assert!(cache.get("page:2").await.is_some());

        cache.clear().await;
        assert_eq!(cache.get("page:2").await, None);
    }

    #[tokio::test]
    #[ignore = "requires running Redis instance"]
    async fn test_redis_cache_roundtrip() {
        use fred::interfaces::ClientLike;
        use quill_db::test_utils::TestRedisConfig;

        let url = TestRedisConfig::default().redis_url();
        let config = fred::types::config::Config::from_url(&url).unwrap();
        let client = RedisClient::new(config, None, None, None);
        client.connect();
        client.wait_for_connect().await.unwrap();

        let prefix = format!("quill_test_{}", uuid::Uuid::new_v4().simple());
        let cache = RedisTimelineCache::new(Arc::new(client), &prefix, Duration::from_secs(20));

        cache.put("page:1", "[1]".to_string()).await;
        assert_eq!(cache.get("page:1").await.as_deref(), Some("[1]"));

        cache.clear().await;
        assert_eq!(cache.get("page:1").await, None);
    }
}
