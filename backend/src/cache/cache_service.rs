use async_trait::async_trait;
use dashmap::DashMap;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use crate::cache::models::CachedPrediction;

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Unsupported cache url: {0}")]
    UnsupportedUrl(String),
}

#[async_trait]
pub trait ResultCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<CachedPrediction>, CacheError>;

    async fn put(&self, key: &str, value: &CachedPrediction) -> Result<(), CacheError>;

    fn backend(&self) -> &'static str;
}

/// Connects the backend named by `url`: `memory://` or `redis://`/`rediss://`.
pub async fn connect(url: &str, ttl: Duration) -> Result<Arc<dyn ResultCache>, CacheError> {
    if url.starts_with("memory://") {
        Ok(Arc::new(MemoryCache::new(ttl)))
    } else if url.starts_with("redis://") || url.starts_with("rediss://") {
        Ok(Arc::new(RedisCache::connect(url, ttl).await?))
    } else {
        Err(CacheError::UnsupportedUrl(url.to_string()))
    }
}

/// Puts between two sweeps of expired entries.
pub const SWEEP_INTERVAL: usize = 128;

pub struct MemoryCache {
    entries: DashMap<String, (Instant, CachedPrediction)>,
    ttl: Duration,
    puts: AtomicUsize,
}

impl MemoryCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
            puts: AtomicUsize::new(0),
        }
    }

    /// Drops every entry older than the TTL.
    pub fn purge_expired(&self) {
        let ttl = self.ttl;
        self.entries
            .retain(|_, (stored_at, _)| stored_at.elapsed() < ttl);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl ResultCache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<CachedPrediction>, CacheError> {
        let hit = self.entries.get(key).and_then(|entry| {
            let (stored_at, value) = entry.value();
            (stored_at.elapsed() < self.ttl).then(|| value.clone())
        });
        if hit.is_none() {
            self.entries
                .remove_if(key, |_, (stored_at, _)| stored_at.elapsed() >= self.ttl);
        }
        Ok(hit)
    }

    async fn put(&self, key: &str, value: &CachedPrediction) -> Result<(), CacheError> {
        if (self.puts.fetch_add(1, Ordering::Relaxed) + 1) % SWEEP_INTERVAL == 0 {
            self.purge_expired();
        }
        self.entries
            .insert(key.to_string(), (Instant::now(), value.clone()));
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

pub struct RedisCache {
    conn: ConnectionManager,
    ttl_secs: u64,
}

impl RedisCache {
    pub async fn connect(url: &str, ttl: Duration) -> Result<Self, CacheError> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self {
            conn,
            ttl_secs: ttl.as_secs().max(1),
        })
    }
}

#[async_trait]
impl ResultCache for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<CachedPrediction>, CacheError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get(key).await?;
        raw.map(|raw| serde_json::from_str(&raw))
            .transpose()
            .map_err(CacheError::from)
    }

    async fn put(&self, key: &str, value: &CachedPrediction) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        let raw = serde_json::to_string(value)?;
        let _: () = conn.set_ex(key, raw, self.ttl_secs).await?;
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "redis"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::PredictionItem;

    fn sample() -> CachedPrediction {
        CachedPrediction {
            top_predictions: vec![PredictionItem {
                action: "reaching".into(),
                confidence: 0.9,
                class_id: 3,
            }],
            goal_similarity: Some(0.5),
        }
    }

    #[tokio::test]
    async fn memory_cache_round_trips_within_ttl() {
        let cache = MemoryCache::new(Duration::from_secs(60));
        assert!(cache.get("k").await.unwrap().is_none());
        cache.put("k", &sample()).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), Some(sample()));
    }

    #[tokio::test]
    async fn memory_cache_expires_entries() {
        let cache = MemoryCache::new(Duration::from_millis(10));
        cache.put("k", &sample()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(cache.get("k").await.unwrap().is_none());
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn puts_sweep_entries_nobody_reads_again() {
        let cache = MemoryCache::new(Duration::from_millis(5));
        for i in 0..1000 {
            cache.put(&format!("old-{}", i), &sample()).await.unwrap();
        }
        tokio::time::sleep(Duration::from_millis(20)).await;

        for i in 0..SWEEP_INTERVAL {
            cache.put(&format!("new-{}", i), &sample()).await.unwrap();
        }
        assert!(cache.len() <= SWEEP_INTERVAL, "{} entries left", cache.len());
        assert!(cache.entries.iter().all(|e| e.key().starts_with("new-")));
    }

    #[test]
    fn purge_keeps_live_entries() {
        let cache = MemoryCache::new(Duration::from_secs(60));
        cache
            .entries
            .insert("live".into(), (Instant::now(), sample()));
        cache.purge_expired();
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn connect_picks_backend_by_scheme() {
        let cache = connect("memory://", Duration::from_secs(1)).await.unwrap();
        assert_eq!(cache.backend(), "memory");
        assert!(matches!(
            connect("ftp://cache", Duration::from_secs(1)).await.err().unwrap(),
            CacheError::UnsupportedUrl(_)
        ));
    }
}
