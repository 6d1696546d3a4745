use chrono::{DateTime, Duration, Utc};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use redis::Client;

use crate::error::AppError;
use crate::error::AppResult;
use crate::models::{SearchCacheEntry, SearchCacheKey};
use crate::services::search_cache::CacheStore;

/// How long an expired entry lingers in Redis before Redis evicts it
pub const STALE_RETENTION: Duration = Duration::hours(24);

/// Creates a Redis client for caching
///
/// Establishes a connection to Redis for fast data caching.
/// Uses connection pooling via the connection-manager feature.
pub fn create_redis_client(redis_url: &str) -> anyhow::Result<Client> {
    let client = Client::open(redis_url)?;
    Ok(client)
}

/// Search cache entries stored as JSON under `slates:{city}:{timeframe}:{category}:{query}`
///
/// The logical expiry lives in the entry itself and is checked on every read. The Redis TTL
/// is only housekeeping: remaining lifetime plus a retention window, so stale entries are
/// invisible well before they disappear.
#[derive(Clone)]
pub struct RedisCacheStore {
    conn: ConnectionManager,
}

impl RedisCacheStore {
    pub async fn new(client: Client) -> AppResult<Self> {
        let conn = ConnectionManager::new(client).await?;
        Ok(Self { conn })
    }
}

/// Seconds Redis should keep an entry; never below one second
fn redis_ttl_seconds(
    expires_at: DateTime<Utc>,
    now: DateTime<Utc>,
    stale_retention: Duration,
) -> u64 {
    let keep = (expires_at - now) + stale_retention;
    keep.num_seconds().max(1) as u64
}

fn decode_entry(key: &SearchCacheKey, json: &str) -> AppResult<SearchCacheEntry> {
    let entry: SearchCacheEntry = serde_json::from_str(json)
        .map_err(|e| AppError::Internal(format!("Cache deserialization error: {}", e)))?;
    if &entry.key != key {
        return Err(AppError::Internal(format!(
            "Cache entry under {} carries key {}",
            key, entry.key
        )));
    }
    Ok(entry)
}

#[async_trait::async_trait]
impl CacheStore for RedisCacheStore {
    async fn lookup(
        &self,
        key: &SearchCacheKey,
        now: DateTime<Utc>,
    ) -> AppResult<Option<SearchCacheEntry>> {
        let mut conn = self.conn.clone();
        let cached: Option<String> = conn.get(key.to_string()).await?;

        match cached {
            Some(json) => {
                let entry = decode_entry(key, &json)?;
                Ok(entry.is_live(now).then_some(entry))
            }
            None => Ok(None),
        }
    }

    async fn upsert(&self, entry: SearchCacheEntry) -> AppResult<()> {
        let json = serde_json::to_string(&entry)
            .map_err(|e| AppError::Internal(format!("Cache serialization error: {}", e)))?;
        let ttl = redis_ttl_seconds(entry.expires_at, Utc::now(), STALE_RETENTION);

        let mut conn = self.conn.clone();
        let _: () = conn.set_ex(entry.key.to_string(), json, ttl).await?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}
