use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Display;

use super::{normalize_category, ScoredItem};

/// Coarse time window a query is about. Drives the cache TTL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Timeframe {
    Today,
    Week,
    Month,
}

impl Timeframe {
    pub fn ttl(&self) -> Duration {
        match self {
            Timeframe::Today => Duration::hours(6),
            Timeframe::Week => Duration::hours(12),
            Timeframe::Month => Duration::hours(24),
        }
    }

    /// Infers the timeframe from free text, falling back to `default`
    pub fn infer(text: &str, default: Timeframe) -> Timeframe {
        let text = text.to_lowercase();
        if ["today", "tonight", "now"].iter().any(|w| text.contains(w)) {
            Timeframe::Today
        } else if text.contains("week") {
            Timeframe::Week
        } else if text.contains("month") {
            Timeframe::Month
        } else {
            default
        }
    }

    /// Timeframe implied by a time budget in minutes
    pub fn for_minutes(minutes: u32) -> Timeframe {
        match minutes {
            0..=1_440 => Timeframe::Today,
            1_441..=10_080 => Timeframe::Week,
            _ => Timeframe::Month,
        }
    }
}

impl Display for Timeframe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Timeframe::Today => "TODAY",
            Timeframe::Week => "WEEK",
            Timeframe::Month => "MONTH",
        };
        write!(f, "{}", name)
    }
}

/// Trims and lowercases a query for keying
pub fn normalize_query(query: &str) -> String {
    query.trim().to_lowercase()
}

/// Composite key of a cache entry. Build with [`SearchCacheKey::new`] so the query is normalized.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchCacheKey {
    pub city: String,
    pub timeframe: Timeframe,
    pub query: String,
    pub category: Option<String>,
}

impl SearchCacheKey {
    pub fn new(city: &str, query: &str, category: Option<&str>, timeframe: Timeframe) -> Self {
        Self {
            city: city.trim().to_lowercase(),
            timeframe,
            query: normalize_query(query),
            category: normalize_category(category),
        }
    }

    /// Lookup order on a miss: exact, then blank query, then no category
    pub fn cascade(&self) -> Vec<SearchCacheKey> {
        let mut keys = vec![self.clone()];
        if !self.query.is_empty() {
            keys.push(SearchCacheKey {
                query: String::new(),
                ..self.clone()
            });
        }
        if self.category.is_some() {
            keys.push(SearchCacheKey {
                category: None,
                ..self.clone()
            });
        }
        keys
    }
}

impl Display for SearchCacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "slates:{}:{}:{}:{}",
            self.city,
            self.timeframe,
            self.category.as_deref().unwrap_or("*"),
            self.query
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchCacheEntry {
    pub key: SearchCacheKey,
    pub results: Vec<ScoredItem>,
    pub generated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub source: String,
}

impl SearchCacheEntry {
    /// Live entries are the only ones reads may return
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.expires_at >= now
    }
}
