pub mod backends;
pub mod deadline;
pub mod fit_scorer;
pub mod graph_enrichment;
pub mod metrics;
pub mod recommendations;
pub mod retriever;
pub mod search_cache;
pub mod slate_composer;

pub use deadline::Deadline;
pub use graph_enrichment::GraphEnrichment;
pub use metrics::MetricsRing;
pub use recommendations::{RecommendOptions, RecommendResponse, RecommendationService};
pub use retriever::HybridRetriever;
pub use search_cache::{CacheStore, MemoryCacheStore, SearchCache};
