pub mod cache;
pub mod candidate;
pub mod graph;
pub mod intention;
pub mod scored;

#[cfg(test)]
pub(crate) mod fixtures;

pub use cache::{normalize_query, SearchCacheEntry, SearchCacheKey, Timeframe};
pub use candidate::{
    normalize_category, BackendHit, Candidate, CandidateSource, EventFeatures, SocialProof,
};
pub use graph::{FriendOverlap, GraphRecord, Neighbor, NoveltyRecord, SimilarItems, SocialHeatRecord};
pub use intention::{
    Budget, Companion, GeoPoint, Intention, IntentionSource, IntentionTokens, Mood,
};
pub use scored::{ComponentScore, ScoredItem, Slate, SlateLabel, Slates};
