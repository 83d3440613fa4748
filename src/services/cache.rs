use anyhow::Result;
use moka::future::Cache;
use redis::AsyncCommands;
use serde::{de::DeserializeOwned, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Two-level cache for token metadata and prices: an in-process `moka`
/// layer in front of an optional shared redis. Redis failures only log.
pub struct CacheService {
    redis: Option<redis::aio::ConnectionManager>,
    memory: Arc<Cache<String, String>>,
}

impl CacheService {
    pub async fn new(redis_url: Option<&str>) -> Result<Self> {
        let redis = match redis_url {
            Some(url) => Self::connect(url).await,
            None => {
                tracing::info!("REDIS_URL not set, using memory cache only");
                None
            }
        };

        Ok(Self {
            redis,
            memory: Self::memory_layer(),
        })
    }

    pub fn memory_only() -> Self {
        Self {
            redis: None,
            memory: Self::memory_layer(),
        }
    }

    fn memory_layer() -> Arc<Cache<String, String>> {
        Arc::new(
            Cache::builder()
                .max_capacity(10_000)
                .time_to_live(Duration::from_secs(60))
                .build(),
        )
    }

    async fn connect(url: &str) -> Option<redis::aio::ConnectionManager> {
        match redis::Client::open(url) {
            Ok(client) => match client.get_connection_manager().await {
                Ok(conn) => {
                    tracing::info!("Redis connected successfully");
                    Some(conn)
                }
                Err(e) => {
                    tracing::warn!("Redis connection failed: {}, using memory cache only", e);
                    None
                }
            },
            Err(e) => {
                tracing::warn!("Redis client creation failed: {}, using memory cache only", e);
                None
            }
        }
    }

    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        if let Some(cached) = self.memory.get(key).await {
            if let Ok(value) = serde_json::from_str(&cached) {
                tracing::debug!("Memory cache hit for key: {}", key);
                return Ok(Some(value));
            }
        }

        if let Some(mut redis) = self.redis.clone() {
            match redis.get::<_, Option<String>>(key).await {
                Ok(Some(cached)) => {
                    if let Ok(value) = serde_json::from_str(&cached) {
                        self.memory.insert(key.to_string(), cached).await;
                        tracing::debug!("Redis cache hit for key: {}", key);
                        return Ok(Some(value));
                    }
                }
                Ok(None) => {}
                Err(e) => tracing::warn!("Redis get error: {}", e),
            }
        }

        Ok(None)
    }

    pub async fn set<T: Serialize>(&self, key: &str, value: &T, ttl_secs: u64) -> Result<()> {
        let serialized = serde_json::to_string(value)?;

        self.memory.insert(key.to_string(), serialized.clone()).await;

        if let Some(mut redis) = self.redis.clone() {
            if let Err(e) = redis.set_ex::<_, _, ()>(key, serialized, ttl_secs).await {
                tracing::warn!("Redis set error: {}", e);
            }
        }

        Ok(())
    }

    /// Returns the cached value or runs `fetch`, caching a successful result.
    pub async fn get_or_fetch<T, E, F, Fut>(&self, key: &str, ttl_secs: u64, fetch: F) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(cached) = self.get::<T>(key).await.ok().flatten() {
            return Ok(cached);
        }

        let value = fetch().await?;
        if let Err(e) = self.set(key, &value, ttl_secs).await {
            tracing::warn!("Failed to cache {}: {}", key, e);
        }
        Ok(value)
    }

    pub async fn ping(&self) -> bool {
        if let Some(mut redis) = self.redis.clone() {
            redis::cmd("PING")
                .query_async::<_, String>(&mut redis)
                .await
                .is_ok()
        } else {
            false
        }
    }
}
