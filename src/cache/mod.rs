//! Read-through cache contract (spec §4.2).
//!
//! `RedisCache` is the production backend; `NullCache` is used whenever
//! `DISABLE_CACHE=true` or the backend failed to connect at boot — both
//! implement the same `Cache` trait so every `Get` is a miss and every `Set`
//! is a no-op, with identical observable behavior to the enabled path
//! (spec §8 testable property).

use async_trait::async_trait;
use std::hash::{Hash, Hasher};
use std::time::Duration;

#[async_trait]
pub trait Cache: Send + Sync {
    async fn get(&self, key: &str) -> Option<Vec<u8>>;
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration);
    async fn delete(&self, key: &str);
    async fn delete_pattern(&self, prefix: &str);
}

/// Cache key namespaces (spec §4.2).
pub mod namespace {
    pub const INTENT: &str = "ai:intent";
    pub const PARAMS: &str = "ai:params";
    pub const SEARCH: &str = "search";
}

/// Hash `input` into a 128-bit non-cryptographic digest, hex-encoded, for
/// use as a cache key suffix. Two independent `DefaultHasher` passes (seeded
/// by distinct prefixes) stand in for a dedicated 128-bit hash without an
/// extra dependency — collisions are a cache-miss cost, not a correctness
/// concern, since every value is keyed by its own namespace too.
pub fn hash128(input: &str) -> String {
    let mut low = std::collections::hash_map::DefaultHasher::new();
    0u8.hash(&mut low);
    input.hash(&mut low);
    let low = low.finish();

    let mut high = std::collections::hash_map::DefaultHasher::new();
    1u8.hash(&mut high);
    input.hash(&mut high);
    let high = high.finish();

    format!("{high:016x}{low:016x}")
}

pub fn cache_key(namespace: &str, input: &str) -> String {
    format!("{namespace}:{}", hash128(input))
}

/// Redis-backed implementation using an async connection manager, which
/// transparently reconnects on transient drops.
pub struct RedisCache {
    manager: redis::aio::ConnectionManager,
}

impl RedisCache {
    pub async fn connect(url: &str) -> anyhow::Result<Self> {
        let client = redis::Client::open(url)?;
        let manager = client.get_connection_manager().await?;
        Ok(Self { manager })
    }
}

#[async_trait]
impl Cache for RedisCache {
    async fn get(&self, key: &str) -> Option<Vec<u8>> {
        let mut conn = self.manager.clone();
        match redis::AsyncCommands::get::<_, Option<Vec<u8>>>(&mut conn, key).await {
            Ok(value) => value,
            Err(err) => {
                tracing::warn!(error = %err, key, "cache get failed, treating as miss");
                None
            }
        }
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) {
        let mut conn = self.manager.clone();
        let seconds = ttl.as_secs().max(1);
        if let Err(err) =
            redis::AsyncCommands::set_ex::<_, _, ()>(&mut conn, key, value, seconds).await
        {
            tracing::warn!(error = %err, key, "cache set failed, continuing without cache");
        }
    }

    async fn delete(&self, key: &str) {
        let mut conn = self.manager.clone();
        let _: Result<(), _> = redis::AsyncCommands::del(&mut conn, key).await;
    }

    async fn delete_pattern(&self, prefix: &str) {
        let mut conn = self.manager.clone();
        let pattern = format!("{prefix}*");
        if let Ok(keys) = redis::AsyncCommands::keys::<_, Vec<String>>(&mut conn, pattern).await {
            if !keys.is_empty() {
                let _: Result<(), _> = redis::AsyncCommands::del(&mut conn, keys).await;
            }
        }
    }
}

/// No-op cache used when the backend is disabled or unreachable.
#[derive(Debug, Default)]
pub struct NullCache;

#[async_trait]
impl Cache for NullCache {
    async fn get(&self, _key: &str) -> Option<Vec<u8>> {
        None
    }

    async fn set(&self, _key: &str, _value: Vec<u8>, _ttl: Duration) {}

    async fn delete(&self, _key: &str) {}

    async fn delete_pattern(&self, _prefix: &str) {}
}

/// Build the cache backend for the given config, degrading to `NullCache`
/// transparently if disabled or unreachable (spec §4.2, §9).
pub async fn build_cache(config: &crate::config::CacheConfig) -> std::sync::Arc<dyn Cache> {
    if config.disabled {
        return std::sync::Arc::new(NullCache);
    }
    let Some(url) = config.url.as_deref() else {
        return std::sync::Arc::new(NullCache);
    };
    match RedisCache::connect(url).await {
        Ok(cache) => std::sync::Arc::new(cache),
        Err(err) => {
            tracing::warn!(error = %err, "cache backend unreachable at boot, disabling cache");
            std::sync::Arc::new(NullCache)
        }
    }
}
