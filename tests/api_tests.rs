use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use axum_test::TestServer;
use serde_json::{json, Value};

use slate_api::{
    api::{create_router, AppState},
    error::{AppError, AppResult},
    models::{
        BackendHit, EventFeatures, FriendOverlap, NoveltyRecord, SimilarItems, SocialHeatRecord,
    },
    services::{
        backends::{GraphStore, KeywordBackend, SearchFilters, VectorBackend},
        graph_enrichment::EnrichmentConfig,
        recommendations::PipelineConfig,
        retriever::RetrieverConfig,
        GraphEnrichment, HybridRetriever, MemoryCacheStore, MetricsRing, RecommendationService,
        SearchCache,
    },
};

/// Search backend that serves a fixed list and counts calls
struct FixedSearch {
    name: &'static str,
    hits: Vec<BackendHit>,
    fail: bool,
    calls: Arc<AtomicUsize>,
}

impl FixedSearch {
    fn new(name: &'static str, hits: Vec<BackendHit>) -> Self {
        Self {
            name,
            hits,
            fail: false,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn failing(name: &'static str) -> Self {
        Self {
            fail: true,
            ..Self::new(name, vec![])
        }
    }

    fn respond(&self) -> AppResult<Vec<BackendHit>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(AppError::unavailable(self.name, "connection refused"));
        }
        Ok(self.hits.clone())
    }
}

#[async_trait::async_trait]
impl VectorBackend for FixedSearch {
    async fn search(&self, _query: &str, _filters: &SearchFilters) -> AppResult<Vec<BackendHit>> {
        self.respond()
    }

    fn name(&self) -> &'static str {
        self.name
    }
}

#[async_trait::async_trait]
impl KeywordBackend for FixedSearch {
    async fn search(&self, _query: &str, _filters: &SearchFilters) -> AppResult<Vec<BackendHit>> {
        self.respond()
    }

    fn name(&self) -> &'static str {
        self.name
    }
}

/// Relationship store with no relationships
struct EmptyGraph;

#[async_trait::async_trait]
impl GraphStore for EmptyGraph {
    async fn similar_items(&self, _ids: &[String]) -> AppResult<Vec<SimilarItems>> {
        Ok(vec![])
    }

    async fn novelty_for_user(
        &self,
        _user_id: &str,
        _ids: &[String],
    ) -> AppResult<Vec<NoveltyRecord>> {
        Ok(vec![])
    }

    async fn friend_overlap(
        &self,
        _user_id: &str,
        _ids: &[String],
    ) -> AppResult<Vec<FriendOverlap>> {
        Ok(vec![])
    }

    async fn social_heat(
        &self,
        _ids: &[String],
        _window_hours: u32,
    ) -> AppResult<Vec<SocialHeatRecord>> {
        Ok(vec![])
    }
}

fn hit(id: &str, score: f64, category: &str, price: f64) -> BackendHit {
    BackendHit {
        id: id.to_string(),
        score,
        payload: EventFeatures {
            title: format!("Event {}", id),
            category: Some(category.to_string()),
            price_min: Some(price),
            distance_km: Some(2.0),
            ..Default::default()
        },
    }
}

fn create_test_server(vector: FixedSearch, keyword: FixedSearch) -> TestServer {
    let retriever = HybridRetriever::new(
        Arc::new(vector),
        Arc::new(keyword),
        None,
        RetrieverConfig::default(),
    );
    let service = RecommendationService::new(
        retriever,
        GraphEnrichment::new(Arc::new(EmptyGraph), EnrichmentConfig::default()),
        SearchCache::new(Arc::new(MemoryCacheStore::new()), Duration::from_millis(100)),
        Arc::new(MetricsRing::new(32)),
        PipelineConfig::default(),
    );
    let app = create_router(AppState::new(service));
    TestServer::new(app).unwrap()
}

fn default_vector() -> FixedSearch {
    FixedSearch::new(
        "vector",
        vec![
            hit("gig", 0.92, "MUSIC", 25.0),
            hit("rave", 0.81, "NIGHTLIFE", 40.0),
            hit("gallery", 0.55, "ART", 0.0),
        ],
    )
}

fn default_keyword() -> FixedSearch {
    FixedSearch::new(
        "keyword",
        vec![hit("gig", 3.2, "MUSIC", 25.0), hit("match", 2.0, "SPORTS", 60.0)],
    )
}

fn default_server() -> TestServer {
    create_test_server(default_vector(), default_keyword())
}

fn intention() -> Value {
    json!({
        "city": "Lisbon",
        "nowISO": "2026-10-19T18:00:00Z",
        "tokens": {
            "mood": "electric",
            "untilMinutes": 180,
            "distanceKm": 5.0,
            "budget": "casual",
            "companions": ["friends"]
        },
        "source": "inline"
    })
}

fn ids(items: &Value) -> Vec<String> {
    items
        .as_array()
        .unwrap()
        .iter()
        .map(|item| item["id"].as_str().unwrap().to_string())
        .collect()
}

#[tokio::test]
async fn test_health_check() {
    let server = default_server();
    let response = server.get("/health").await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn test_recommendations_return_items_and_disjoint_slates() {
    let server = default_server();

    let response = server
        .post("/api/v1/recommendations")
        .json(&json!({ "intention": intention() }))
        .await;
    response.assert_status_ok();

    let body: Value = response.json();
    assert_eq!(body["degraded"], false);
    assert_eq!(body["cached"], false);
    assert_eq!(body["total"], 4);
    assert_eq!(body["page"], 1);

    let items = body["items"].as_array().unwrap();
    assert_eq!(items.len(), 4);
    let gig = items.iter().find(|i| i["id"] == "gig").unwrap();
    assert_eq!(gig["source"], "hybrid");
    assert!(gig["reasons"].as_array().unwrap().len() <= 3);
    assert_eq!(gig["componentBreakdown"].as_array().unwrap().len(), 7);

    let mut seen = std::collections::HashSet::new();
    for label in ["best", "wildcard", "closeAndEasy"] {
        assert_eq!(body["slates"][label]["label"], label);
        for id in ids(&body["slates"][label]["items"]) {
            assert!(seen.insert(id), "slates overlap");
        }
    }
}

#[tokio::test]
async fn test_second_request_is_cached() {
    let vector = default_vector();
    let vector_calls = vector.calls.clone();
    let server = create_test_server(vector, default_keyword());
    let request = json!({ "intention": intention(), "options": { "query": "Techno tonight" } });

    let first: Value = server.post("/api/v1/recommendations").json(&request).await.json();
    let second: Value = server.post("/api/v1/recommendations").json(&request).await.json();

    assert_eq!(first["cached"], false);
    assert_eq!(second["cached"], true);
    assert_eq!(ids(&first["items"]), ids(&second["items"]));
    assert_eq!(vector_calls.load(Ordering::SeqCst), 1);

    let metrics: Value = server.get("/api/v1/metrics").await.json();
    assert_eq!(metrics["count"], 2);
    assert_eq!(metrics["cacheHitRate"], 0.5);
}

#[tokio::test]
async fn test_failed_backend_degrades_instead_of_erroring() {
    let server = create_test_server(
        FixedSearch::failing("vector"),
        FixedSearch::new("keyword", vec![hit("match", 2.0, "SPORTS", 60.0)]),
    );

    let response = server
        .post("/api/v1/recommendations")
        .json(&json!({ "intention": intention() }))
        .await;
    response.assert_status_ok();

    let body: Value = response.json();
    assert_eq!(body["degraded"], true);
    assert_eq!(ids(&body["items"]), vec!["match".to_string()]);
    assert_eq!(body["items"][0]["source"], "keyword");
}

#[tokio::test]
async fn test_all_backends_down_yields_empty_degraded_response() {
    let server =
        create_test_server(FixedSearch::failing("vector"), FixedSearch::failing("keyword"));

    let response = server
        .post("/api/v1/recommendations")
        .json(&json!({ "intention": intention() }))
        .await;
    response.assert_status_ok();

    let body: Value = response.json();
    assert_eq!(body["degraded"], true);
    assert!(body["items"].as_array().unwrap().is_empty());
    assert_eq!(body["hasMore"], false);
}

#[tokio::test]
async fn test_invalid_intention_is_bad_request() {
    let server = default_server();
    let mut bad = intention();
    bad["tokens"]["companions"] = json!([]);

    let response = server
        .post("/api/v1/recommendations")
        .json(&json!({ "intention": bad }))
        .await;

    response.assert_status(axum::http::StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert!(body["error"].as_str().unwrap().contains("companions"));
}

#[tokio::test]
async fn test_invalid_page_size_is_bad_request() {
    let server = default_server();
    let response = server
        .post("/api/v1/recommendations")
        .json(&json!({ "intention": intention(), "options": { "pageSize": 500 } }))
        .await;

    response.assert_status(axum::http::StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_pagination_over_http() {
    let server = default_server();
    let body: Value = server
        .post("/api/v1/recommendations")
        .json(&json!({ "intention": intention(), "options": { "page": 2, "pageSize": 3 } }))
        .await
        .json();

    assert_eq!(body["page"], 2);
    assert_eq!(body["items"].as_array().unwrap().len(), 1);
    assert_eq!(body["hasMore"], false);
}

#[tokio::test]
async fn test_request_id_is_echoed() {
    let server = default_server();
    let response = server
        .get("/health")
        .add_header(
            axum::http::HeaderName::from_static("x-request-id"),
            axum::http::HeaderValue::from_static("trace-123"),
        )
        .await;

    assert_eq!(response.header("x-request-id"), "trace-123");
}

#[tokio::test]
async fn test_request_id_is_generated() {
    let server = default_server();
    let response = server.get("/health").await;
    let header = response.header("x-request-id");
    assert!(uuid::Uuid::parse_str(header.to_str().unwrap()).is_ok());
}
