use std::{collections::HashMap, sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::{
    error::{AppError, AppResult},
    models::{ScoredItem, SearchCacheEntry, SearchCacheKey, Timeframe},
    services::deadline::Deadline,
};

/// Durable store behind the search cache
///
/// Writes are upserts on the composite key. Reads must never return an entry whose
/// `expires_at` is before `now`; expired entries may stay in the store.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait CacheStore: Send + Sync {
    async fn lookup(
        &self,
        key: &SearchCacheKey,
        now: DateTime<Utc>,
    ) -> AppResult<Option<SearchCacheEntry>>;

    async fn upsert(&self, entry: SearchCacheEntry) -> AppResult<()>;

    /// Store name for logging
    fn name(&self) -> &'static str;
}

/// Process-local store, used when no Redis is configured and in tests
#[derive(Default)]
pub struct MemoryCacheStore {
    entries: RwLock<HashMap<SearchCacheKey, SearchCacheEntry>>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries, expired ones included
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

#[async_trait::async_trait]
impl CacheStore for MemoryCacheStore {
    async fn lookup(
        &self,
        key: &SearchCacheKey,
        now: DateTime<Utc>,
    ) -> AppResult<Option<SearchCacheEntry>> {
        let entries = self.entries.read().await;
        Ok(entries.get(key).filter(|e| e.is_live(now)).cloned())
    }

    async fn upsert(&self, entry: SearchCacheEntry) -> AppResult<()> {
        self.entries.write().await.insert(entry.key.clone(), entry);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

/// A write request. `expires_at` defaults to now plus the timeframe's TTL.
#[derive(Debug, Clone)]
pub struct CachePut {
    pub city: String,
    pub query: String,
    pub category: Option<String>,
    pub timeframe: Timeframe,
    pub results: Vec<ScoredItem>,
    pub source: String,
    pub expires_at: Option<DateTime<Utc>>,
}

/// TTL-keyed cache of ranked results with cascading lookups.
///
/// Every store call runs under the request deadline and `timeout`; a store that stops
/// answering costs a miss or a skipped write, never a stuck request.
#[derive(Clone)]
pub struct SearchCache {
    store: Arc<dyn CacheStore>,
    timeout: Duration,
}

impl SearchCache {
    pub fn new(store: Arc<dyn CacheStore>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    pub async fn get(
        &self,
        city: &str,
        query: &str,
        category: Option<&str>,
        timeframe: Timeframe,
        deadline: &Deadline,
    ) -> Option<SearchCacheEntry> {
        self.get_at(city, query, category, timeframe, Utc::now(), deadline)
            .await
    }

    /// Tries the exact key, then the blank-query key, then the category-less key.
    ///
    /// A store error counts as a miss for that step. A timeout ends the cascade.
    pub async fn get_at(
        &self,
        city: &str,
        query: &str,
        category: Option<&str>,
        timeframe: Timeframe,
        now: DateTime<Utc>,
        deadline: &Deadline,
    ) -> Option<SearchCacheEntry> {
        let key = SearchCacheKey::new(city, query, category, timeframe);

        for (step, candidate) in key.cascade().iter().enumerate() {
            let lookup = deadline
                .run("cache", self.timeout, self.store.lookup(candidate, now))
                .await;
            match lookup {
                Ok(Some(entry)) if entry.is_live(now) => {
                    tracing::debug!(key = %candidate, step, store = self.store.name(), "Cache hit");
                    return Some(entry);
                }
                Ok(_) => {}
                Err(e @ AppError::BackendTimeout { .. }) => {
                    tracing::warn!(
                        key = %candidate,
                        store = self.store.name(),
                        error = %e,
                        "Cache lookup timed out, treating as miss"
                    );
                    return None;
                }
                Err(e) => {
                    tracing::warn!(
                        key = %candidate,
                        store = self.store.name(),
                        error = %e,
                        "Cache lookup failed, treating as miss"
                    );
                }
            }
        }

        tracing::debug!(key = %key, store = self.store.name(), "Cache miss");
        None
    }

    pub async fn put(&self, put: CachePut, deadline: &Deadline) -> AppResult<SearchCacheEntry> {
        self.put_at(put, Utc::now(), deadline).await
    }

    pub async fn put_at(
        &self,
        put: CachePut,
        now: DateTime<Utc>,
        deadline: &Deadline,
    ) -> AppResult<SearchCacheEntry> {
        let key = SearchCacheKey::new(&put.city, &put.query, put.category.as_deref(), put.timeframe);
        let entry = SearchCacheEntry {
            expires_at: put.expires_at.unwrap_or(now + put.timeframe.ttl()),
            key,
            results: put.results,
            generated_at: now,
            source: put.source,
        };

        deadline
            .run("cache", self.timeout, self.store.upsert(entry.clone()))
            .await?;
        tracing::debug!(
            key = %entry.key,
            results = entry.results.len(),
            expires_at = %entry.expires_at,
            "Cache write"
        );
        Ok(entry)
    }
}
