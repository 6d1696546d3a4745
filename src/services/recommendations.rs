use std::{collections::HashMap, sync::Arc, time::Duration, time::Instant};

use serde::{Deserialize, Serialize};

use crate::{
    error::{AppError, AppResult},
    models::{
        normalize_query, Candidate, EventFeatures, Intention, ScoredItem, SearchCacheKey, Slates,
        Timeframe,
    },
    services::{
        deadline::Deadline,
        fit_scorer,
        graph_enrichment::{Enrichment, GraphEnrichment, NEUTRAL_NOVELTY},
        metrics::{MetricsRing, PipelineSample},
        retriever::{HybridRetriever, RetrieveOptions},
        search_cache::{CachePut, SearchCache},
        slate_composer::{self, SlateConfig},
    },
};

pub const MAX_PAGE_SIZE: u32 = 100;
const CACHE_SOURCE: &str = "pipeline";

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub request_timeout: Duration,
    pub top_k: usize,
    pub rerank_top: usize,
    pub use_reranker: bool,
    pub slates: SlateConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_millis(2_500),
            top_k: 50,
            rerank_top: 20,
            use_reranker: false,
            slates: SlateConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RecommendOptions {
    pub page: u32,
    pub page_size: u32,
    pub graph_diversification: bool,
    /// Free-text query; when absent the intention itself is the query
    pub query: Option<String>,
    pub category: Option<String>,
    /// Enables personal graph signals (novelty, friends)
    pub user_id: Option<String>,
}

impl Default for RecommendOptions {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: 20,
            graph_diversification: true,
            query: None,
            category: None,
            user_id: None,
        }
    }
}

impl RecommendOptions {
    pub fn validate(&self) -> AppResult<()> {
        if self.page == 0 {
            return Err(AppError::Validation("page starts at 1".to_string()));
        }
        if self.page_size == 0 || self.page_size > MAX_PAGE_SIZE {
            return Err(AppError::Validation(format!(
                "pageSize must be between 1 and {}",
                MAX_PAGE_SIZE
            )));
        }
        Ok(())
    }

    fn query(&self) -> Option<String> {
        self.query
            .as_deref()
            .map(normalize_query)
            .filter(|q| !q.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecommendResponse {
    pub items: Vec<ScoredItem>,
    pub slates: Slates,
    pub page: u32,
    pub has_more: bool,
    pub total: usize,
    pub degraded: bool,
    pub cached: bool,
}

struct PipelineRun {
    items: Vec<ScoredItem>,
    vector_count: usize,
    keyword_count: usize,
    degraded: bool,
}

/// Entry point of the recommendation pipeline:
/// cache, then retrieval, graph enrichment, scoring and slate composition.
pub struct RecommendationService {
    retriever: HybridRetriever,
    enrichment: GraphEnrichment,
    cache: SearchCache,
    metrics: Arc<MetricsRing>,
    config: PipelineConfig,
}

impl RecommendationService {
    pub fn new(
        retriever: HybridRetriever,
        enrichment: GraphEnrichment,
        cache: SearchCache,
        metrics: Arc<MetricsRing>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            retriever,
            enrichment,
            cache,
            metrics,
            config,
        }
    }

    pub fn metrics(&self) -> &Arc<MetricsRing> {
        &self.metrics
    }

    /// Produces ranked items and three disjoint slates for `intention`.
    ///
    /// Only malformed input is an error. Backend trouble shows up as `degraded`, and a run
    /// where everything failed is an empty degraded response.
    pub async fn recommend(
        &self,
        intention: &Intention,
        options: &RecommendOptions,
    ) -> AppResult<RecommendResponse> {
        intention.validate()?;
        options.validate()?;

        let start = Instant::now();
        let deadline = Deadline::after(self.config.request_timeout);

        let query = options.query();
        let cache_query = query
            .clone()
            .unwrap_or_else(|| intention.tokens.signature());
        let timeframe = Timeframe::infer(
            query.as_deref().unwrap_or_default(),
            Timeframe::for_minutes(intention.tokens.until_minutes),
        );
        let category = options.category.as_deref();

        let cached = self
            .cache
            .get(&intention.city, &cache_query, category, timeframe, &deadline)
            .await;

        let (run, cache_hit) = match cached {
            Some(entry) => {
                let mut items = entry.results;
                let ids: Vec<String> = items.iter().map(|i| i.id().to_string()).collect();
                let personal = self
                    .enrichment
                    .personal(&ids, options.user_id.as_deref(), &deadline)
                    .await;
                for item in &mut items {
                    apply_personal(item, &personal);
                }
                (
                    PipelineRun {
                        items,
                        vector_count: 0,
                        keyword_count: 0,
                        degraded: personal.degraded,
                    },
                    true,
                )
            }
            None => {
                let cache_key =
                    SearchCacheKey::new(&intention.city, &cache_query, category, timeframe);
                let search_text = query
                    .clone()
                    .unwrap_or_else(|| intention.tokens.mood.search_hint().to_string());
                let run = self
                    .run_pipeline(&search_text, &cache_key, intention, options, &deadline)
                    .await;

                if !run.degraded && !run.items.is_empty() {
                    let put = CachePut {
                        city: intention.city.clone(),
                        query: cache_query.clone(),
                        category: options.category.clone(),
                        timeframe,
                        results: run.items.iter().map(shareable).collect(),
                        source: CACHE_SOURCE.to_string(),
                        expires_at: None,
                    };
                    if let Err(e) = self.cache.put(put, &deadline).await {
                        tracing::warn!(key = %cache_key, error = %e, "Cache write failed");
                    }
                }
                (run, false)
            }
        };
        deadline.cancel();

        let slates = slate_composer::compose(&run.items, &self.config.slates);
        let total = run.items.len();
        let (items, has_more) = paginate(run.items, options.page, options.page_size);

        let latency_ms = start.elapsed().as_millis() as u64;
        self.metrics.record(PipelineSample {
            latency_ms,
            candidates: total,
            vector_count: run.vector_count,
            keyword_count: run.keyword_count,
            cache_hit,
            degraded: run.degraded,
        });

        tracing::info!(
            city = %intention.city,
            timeframe = %timeframe,
            cache_hit,
            total,
            page = options.page,
            degraded = run.degraded,
            latency_ms,
            "Recommendation completed"
        );

        Ok(RecommendResponse {
            items,
            slates,
            page: options.page,
            has_more,
            total,
            degraded: run.degraded,
            cached: cache_hit,
        })
    }

    async fn run_pipeline(
        &self,
        search_text: &str,
        cache_key: &SearchCacheKey,
        intention: &Intention,
        options: &RecommendOptions,
        deadline: &Deadline,
    ) -> PipelineRun {
        let retrieve_options = RetrieveOptions {
            top_k: self.config.top_k,
            rerank_top: self.config.rerank_top,
            use_reranker: self.config.use_reranker,
            timeout_ms: None,
            cache_key: Some(cache_key.to_string()),
            category: cache_key.category.clone(),
        };
        let retrieval = self
            .retriever
            .retrieve(search_text, intention, &retrieve_options, deadline)
            .await;

        let ids: Vec<String> = retrieval.candidates.iter().map(|c| c.id.clone()).collect();
        let enrichment = self
            .enrichment
            .enrich(
                &ids,
                options.user_id.as_deref(),
                options.graph_diversification,
                ids.len(),
                deadline,
            )
            .await;

        let mut items: Vec<ScoredItem> = retrieval
            .candidates
            .into_iter()
            .map(|candidate| score_candidate(candidate, intention, &enrichment))
            .collect();

        if options.graph_diversification {
            order_by(&mut items, &enrichment.ordered_ids);
        } else {
            items.sort_by(|a, b| {
                b.fit_score
                    .total_cmp(&a.fit_score)
                    .then_with(|| a.id().cmp(b.id()))
            });
        }

        PipelineRun {
            items,
            vector_count: retrieval.vector_count,
            keyword_count: retrieval.keyword_count,
            degraded: retrieval.degraded || enrichment.degraded,
        }
    }
}

fn score_candidate(
    candidate: Candidate,
    intention: &Intention,
    enrichment: &Enrichment,
) -> ScoredItem {
    let distance_km = distance_km(intention, &candidate.event);
    let fit = fit_scorer::score(
        &candidate,
        intention,
        enrichment.social.get(&candidate.id),
        distance_km,
    );
    let novelty_score = enrichment.novelty_of(&candidate.id);
    let friends_interested = enrichment
        .friends
        .get(&candidate.id)
        .cloned()
        .unwrap_or_default();

    ScoredItem {
        candidate,
        fit_score: fit.score,
        mood_score: fit.mood_score,
        component_breakdown: fit.components,
        reasons: fit.reasons,
        novelty_score,
        social_heat: fit.social_heat,
        distance_km,
        friends_interested,
    }
}

/// Copy of `item` fit for any user: personal graph signals reset to neutral
fn shareable(item: &ScoredItem) -> ScoredItem {
    ScoredItem {
        novelty_score: NEUTRAL_NOVELTY,
        friends_interested: Vec::new(),
        ..item.clone()
    }
}

fn apply_personal(item: &mut ScoredItem, personal: &Enrichment) {
    item.novelty_score = personal.novelty_of(item.id());
    item.friends_interested = personal.friends.get(item.id()).cloned().unwrap_or_default();
}

/// Haversine distance from the user's origin when both ends are known, else whatever the
/// backend supplied
pub fn distance_km(intention: &Intention, event: &EventFeatures) -> Option<f64> {
    match (&intention.origin, &event.location) {
        (Some(origin), Some(location)) => Some(origin.haversine_km(location)),
        _ => event.distance_km.filter(|d| d.is_finite() && *d >= 0.0),
    }
}

/// Reorders `items` to follow `order`; ids missing from it keep their relative order at the end
fn order_by(items: &mut [ScoredItem], order: &[String]) {
    let position: HashMap<&str, usize> = order
        .iter()
        .enumerate()
        .map(|(idx, id)| (id.as_str(), idx))
        .collect();
    items.sort_by_key(|item| position.get(item.id()).copied().unwrap_or(usize::MAX));
}

fn paginate(items: Vec<ScoredItem>, page: u32, page_size: u32) -> (Vec<ScoredItem>, bool) {
    let size = page_size as usize;
    let skip = (page.saturating_sub(1) as usize).saturating_mul(size);
    let has_more = items.len() > skip.saturating_add(size);
    let page_items = items.into_iter().skip(skip).take(size).collect();
    (page_items, has_more)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fixtures::{hit, sample_intention, scored_item};
    use crate::models::{
        BackendHit, FriendOverlap, GeoPoint, Neighbor, NoveltyRecord, SearchCacheEntry,
        SimilarItems,
    };
    use crate::services::backends::{MockGraphStore, MockKeywordBackend, MockVectorBackend};
    use crate::services::graph_enrichment::EnrichmentConfig;
    use crate::services::retriever::RetrieverConfig;
    use crate::services::search_cache::{CacheStore, MemoryCacheStore};
    use chrono::{DateTime, Utc};
    use std::collections::HashSet;

    type Hits = AppResult<Vec<BackendHit>>;

    fn vector(times: usize, result: fn() -> Hits) -> MockVectorBackend {
        let mut backend = MockVectorBackend::new();
        backend.expect_name().return_const("vector");
        backend
            .expect_search()
            .times(times)
            .returning(move |_, _| result());
        backend
    }

    fn keyword(times: usize, result: fn() -> Hits) -> MockKeywordBackend {
        let mut backend = MockKeywordBackend::new();
        backend.expect_name().return_const("keyword");
        backend
            .expect_search()
            .times(times)
            .returning(move |_, _| result());
        backend
    }

    fn quiet_graph() -> MockGraphStore {
        let mut graph = MockGraphStore::new();
        graph.expect_similar_items().returning(|_| Ok(vec![]));
        graph.expect_social_heat().returning(|_, _| Ok(vec![]));
        graph.expect_novelty_for_user().returning(|_, _| Ok(vec![]));
        graph.expect_friend_overlap().returning(|_, _| Ok(vec![]));
        graph
    }

    const CACHE_TIMEOUT: Duration = Duration::from_millis(100);

    /// Cache store that accepts calls and never answers
    struct SilentStore;

    #[async_trait::async_trait]
    impl CacheStore for SilentStore {
        async fn lookup(
            &self,
            _key: &SearchCacheKey,
            _now: DateTime<Utc>,
        ) -> AppResult<Option<SearchCacheEntry>> {
            std::future::pending().await
        }

        async fn upsert(&self, _entry: SearchCacheEntry) -> AppResult<()> {
            std::future::pending().await
        }

        fn name(&self) -> &'static str {
            "silent"
        }
    }

    fn service(
        vector: MockVectorBackend,
        keyword: MockKeywordBackend,
        graph: MockGraphStore,
    ) -> RecommendationService {
        service_with_store(vector, keyword, graph, Arc::new(MemoryCacheStore::new()))
    }

    fn service_with_store(
        vector: MockVectorBackend,
        keyword: MockKeywordBackend,
        graph: MockGraphStore,
        store: Arc<dyn CacheStore>,
    ) -> RecommendationService {
        let retriever = HybridRetriever::new(
            Arc::new(vector),
            Arc::new(keyword),
            None,
            RetrieverConfig::default(),
        );
        let enrichment = GraphEnrichment::new(Arc::new(graph), EnrichmentConfig::default());
        RecommendationService::new(
            retriever,
            enrichment,
            SearchCache::new(store, CACHE_TIMEOUT),
            Arc::new(MetricsRing::new(16)),
            PipelineConfig::default(),
        )
    }

    fn three_hits() -> Hits {
        Ok(vec![hit("a", 0.9), hit("b", 0.8), hit("c", 0.7)])
    }

    fn two_hits() -> Hits {
        Ok(vec![hit("b", 0.6), hit("d", 0.5)])
    }

    fn no_hits() -> Hits {
        Ok(vec![])
    }

    fn failing() -> Hits {
        Err(AppError::unavailable("vector", "connection refused"))
    }

    #[tokio::test]
    async fn test_invalid_intention_rejected_before_backends() {
        let svc = service(vector(0, no_hits), keyword(0, no_hits), MockGraphStore::new());
        let mut intention = sample_intention();
        intention.tokens.companions.clear();

        let result = svc.recommend(&intention, &RecommendOptions::default()).await;
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn test_invalid_page_size_rejected() {
        let svc = service(vector(0, no_hits), keyword(0, no_hits), MockGraphStore::new());
        let options = RecommendOptions {
            page_size: 0,
            ..Default::default()
        };
        tokio_test::assert_err!(svc.recommend(&sample_intention(), &options).await);

        let options = RecommendOptions {
            page_size: MAX_PAGE_SIZE + 1,
            ..Default::default()
        };
        tokio_test::assert_err!(svc.recommend(&sample_intention(), &options).await);

        let options = RecommendOptions {
            page: 0,
            ..Default::default()
        };
        tokio_test::assert_err!(options.validate());
    }

    #[tokio::test]
    async fn test_second_request_is_served_from_cache() {
        let svc = service(vector(1, three_hits), keyword(1, two_hits), quiet_graph());
        let intention = sample_intention();
        let options = RecommendOptions::default();

        let first = svc.recommend(&intention, &options).await.unwrap();
        assert!(!first.cached);
        assert!(!first.degraded);
        assert_eq!(first.total, 4);

        let second = svc.recommend(&intention, &options).await.unwrap();
        assert!(second.cached);
        let first_ids: Vec<&str> = first.items.iter().map(|i| i.id()).collect();
        let second_ids: Vec<&str> = second.items.iter().map(|i| i.id()).collect();
        assert_eq!(first_ids, second_ids);
        assert_eq!(first.slates, second.slates);

        let summary = svc.metrics().summary();
        assert_eq!(summary.count, 2);
        assert_eq!(summary.cache_hit_rate, 0.5);
    }

    #[tokio::test]
    async fn test_degraded_run_is_not_cached() {
        let svc = service(vector(2, failing), keyword(2, two_hits), quiet_graph());
        let intention = sample_intention();
        let options = RecommendOptions::default();

        let first = svc.recommend(&intention, &options).await.unwrap();
        assert!(first.degraded);
        assert_eq!(first.total, 2);

        let second = svc.recommend(&intention, &options).await.unwrap();
        assert!(!second.cached);
    }

    #[tokio::test]
    async fn test_total_failure_is_empty_degraded_response() {
        let svc = service(vector(1, failing), keyword(1, failing), quiet_graph());
        let response = svc
            .recommend(&sample_intention(), &RecommendOptions::default())
            .await
            .unwrap();

        assert!(response.degraded);
        assert!(response.items.is_empty());
        assert!(!response.has_more);
        assert!(response.slates.iter().all(|s| s.items.is_empty()));
    }

    #[tokio::test]
    async fn test_pagination() {
        let svc = service(vector(1, three_hits), keyword(1, two_hits), quiet_graph());
        let intention = sample_intention();

        let first = svc
            .recommend(
                &intention,
                &RecommendOptions {
                    page_size: 3,
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(first.items.len(), 3);
        assert!(first.has_more);

        let second = svc
            .recommend(
                &intention,
                &RecommendOptions {
                    page: 2,
                    page_size: 3,
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(second.items.len(), 1);
        assert!(!second.has_more);
        assert_eq!(second.page, 2);
    }

    #[tokio::test]
    async fn test_slates_are_disjoint() {
        let svc = service(vector(1, three_hits), keyword(1, two_hits), quiet_graph());
        let response = svc
            .recommend(&sample_intention(), &RecommendOptions::default())
            .await
            .unwrap();

        let mut seen = HashSet::new();
        for slate in response.slates.iter() {
            for id in slate.ids() {
                assert!(seen.insert(id.to_string()));
            }
        }
        assert!(!response.slates.best.items.is_empty());
    }

    #[tokio::test]
    async fn test_diversified_order_moves_near_duplicates_back() {
        let mut graph = MockGraphStore::new();
        graph.expect_similar_items().returning(|_| {
            Ok(vec![SimilarItems {
                id: "a".to_string(),
                neighbors: vec![Neighbor {
                    id: "b".to_string(),
                    similarity: 0.99,
                }],
            }])
        });
        graph.expect_social_heat().returning(|_, _| Ok(vec![]));

        let svc = service(vector(1, three_hits), keyword(1, no_hits), graph);
        let response = svc
            .recommend(&sample_intention(), &RecommendOptions::default())
            .await
            .unwrap();

        let ids: Vec<&str> = response.items.iter().map(|i| i.id()).collect();
        assert_eq!(ids, vec!["c", "a", "b"]);
    }

    #[tokio::test]
    async fn test_query_and_category_reach_cache_key() {
        let svc = service(vector(1, three_hits), keyword(1, no_hits), quiet_graph());
        let intention = sample_intention();
        let options = RecommendOptions {
            query: Some("  Jazz TONIGHT ".to_string()),
            category: Some("music".to_string()),
            ..Default::default()
        };
        svc.recommend(&intention, &options).await.unwrap();

        let deadline = Deadline::after(Duration::from_secs(1));
        let entry = svc
            .cache
            .get("lisbon", "jazz tonight", Some("MUSIC"), Timeframe::Today, &deadline)
            .await
            .unwrap();
        assert_eq!(entry.results.len(), 3);
    }

    fn personal_graph() -> MockGraphStore {
        let mut graph = MockGraphStore::new();
        graph.expect_similar_items().returning(|_| Ok(vec![]));
        graph.expect_social_heat().returning(|_, _| Ok(vec![]));
        graph.expect_novelty_for_user().returning(|user, _| {
            let seen = if user == "alice" { 9 } else { 0 };
            Ok(vec![NoveltyRecord {
                id: "a".to_string(),
                similar_total: 10,
                similar_seen: seen,
            }])
        });
        graph.expect_friend_overlap().returning(|user, _| {
            if user != "alice" {
                return Ok(vec![]);
            }
            Ok(vec![FriendOverlap {
                id: "a".to_string(),
                friend_ids: vec!["carol".to_string()],
            }])
        });
        graph
    }

    fn item<'a>(response: &'a RecommendResponse, id: &str) -> &'a ScoredItem {
        response.items.iter().find(|i| i.id() == id).unwrap()
    }

    #[tokio::test]
    async fn test_cached_results_carry_no_other_users_signals() {
        let svc = service(vector(1, three_hits), keyword(1, no_hits), personal_graph());
        let intention = sample_intention();
        let as_user = |user: Option<&str>| RecommendOptions {
            user_id: user.map(str::to_string),
            ..Default::default()
        };

        let alice = svc.recommend(&intention, &as_user(Some("alice"))).await.unwrap();
        assert!(!alice.cached);
        assert_eq!(item(&alice, "a").friends_interested, vec!["carol".to_string()]);
        assert!((item(&alice, "a").novelty_score - 0.1).abs() < 1e-9);

        let bob = svc.recommend(&intention, &as_user(Some("bob"))).await.unwrap();
        assert!(bob.cached);
        assert!(!bob.degraded);
        assert!(item(&bob, "a").friends_interested.is_empty());
        assert_eq!(item(&bob, "a").novelty_score, 1.0);
        assert_eq!(item(&bob, "b").novelty_score, NEUTRAL_NOVELTY);

        let anonymous = svc.recommend(&intention, &as_user(None)).await.unwrap();
        assert!(anonymous.cached);
        assert!(item(&anonymous, "a").friends_interested.is_empty());
        assert_eq!(item(&anonymous, "a").novelty_score, NEUTRAL_NOVELTY);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unresponsive_cache_does_not_hold_request() {
        let svc = service_with_store(
            vector(1, three_hits),
            keyword(1, two_hits),
            quiet_graph(),
            Arc::new(SilentStore),
        );
        let started = tokio::time::Instant::now();

        let response = svc
            .recommend(&sample_intention(), &RecommendOptions::default())
            .await
            .unwrap();

        assert!(!response.cached);
        assert_eq!(response.total, 4);
        assert!(started.elapsed() < PipelineConfig::default().request_timeout);
    }

    #[test]
    fn test_distance_prefers_origin() {
        let mut intention = sample_intention();
        let mut event = scored_item("a", None, 0.5, 0.5).candidate.event;
        event.distance_km = Some(9.0);
        assert_eq!(distance_km(&intention, &event), Some(9.0));

        intention.origin = Some(GeoPoint {
            lat: 38.7223,
            lon: -9.1393,
        });
        event.location = Some(GeoPoint {
            lat: 38.7223,
            lon: -9.1393,
        });
        assert_eq!(distance_km(&intention, &event), Some(0.0));
    }

    #[test]
    fn test_paginate_bounds() {
        let items: Vec<ScoredItem> = (0..5)
            .map(|i| scored_item(&i.to_string(), None, 0.5, 0.5))
            .collect();
        let (page, more) = paginate(items.clone(), 3, 2);
        assert_eq!(page.len(), 1);
        assert!(!more);

        let (page, more) = paginate(items, 4, 2);
        assert!(page.is_empty());
        assert!(!more);
    }
}
