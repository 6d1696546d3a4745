//! Search, rerank and relationship backends
//!
//! Each collaborator the pipeline talks to sits behind a trait so components receive their
//! backends through their constructors and tests can substitute doubles. Implementations
//! report failures as `AppError`; deciding whether a failure degrades or fails the request is
//! left to the caller.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{
    error::AppResult,
    models::{BackendHit, FriendOverlap, NoveltyRecord, SimilarItems, SocialHeatRecord},
};

pub mod graph;
pub mod keyword;
pub mod rerank;
pub mod vector;

pub use graph::HttpGraphStore;
pub use keyword::PgKeywordBackend;
pub use rerank::HttpReranker;
pub use vector::HttpVectorBackend;

/// Filters shared by both search backends
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchFilters {
    pub city: String,
    pub category: Option<String>,
    pub starts_after: DateTime<Utc>,
    pub starts_before: DateTime<Utc>,
    pub limit: usize,
}

/// Embedding-similarity search
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait VectorBackend: Send + Sync {
    /// Returns hits with backend-native scores, best first
    async fn search(&self, query: &str, filters: &SearchFilters) -> AppResult<Vec<BackendHit>>;

    /// Backend name for logging and debugging
    fn name(&self) -> &'static str;
}

/// Keyword / full-text search
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait KeywordBackend: Send + Sync {
    async fn search(&self, query: &str, filters: &SearchFilters) -> AppResult<Vec<BackendHit>>;

    fn name(&self) -> &'static str;
}

/// Cross-encoder reranker
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait Reranker: Send + Sync {
    /// One relevance score per document, aligned with the input order
    async fn rerank(&self, query: &str, documents: &[String]) -> AppResult<Vec<f64>>;
}

/// Read-only view of the relationship store
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait GraphStore: Send + Sync {
    async fn similar_items(&self, ids: &[String]) -> AppResult<Vec<SimilarItems>>;

    async fn novelty_for_user(&self, user_id: &str, ids: &[String])
        -> AppResult<Vec<NoveltyRecord>>;

    async fn friend_overlap(&self, user_id: &str, ids: &[String]) -> AppResult<Vec<FriendOverlap>>;

    async fn social_heat(&self, ids: &[String], window_hours: u32)
        -> AppResult<Vec<SocialHeatRecord>>;
}
