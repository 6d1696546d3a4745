//! Vector search backend over HTTP
//!
//! Talks to a Qdrant-style REST endpoint:
//! `POST {base}/collections/{collection}/points/search` with the query text, filters and a
//! limit. The service embeds the text itself; this client never sees vectors.

use crate::{
    error::{AppError, AppResult},
    models::{BackendHit, EventFeatures},
    services::backends::{SearchFilters, VectorBackend},
};
use reqwest::Client as HttpClient;
use serde::Deserialize;
use serde_json::{json, Value};

#[derive(Clone)]
pub struct HttpVectorBackend {
    http_client: HttpClient,
    base_url: String,
    collection: String,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    result: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct ScoredPoint {
    id: Value,
    score: f64,
    payload: EventFeatures,
}

impl HttpVectorBackend {
    pub fn new(base_url: String, collection: String) -> Self {
        Self {
            http_client: HttpClient::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            collection,
        }
    }

    fn build_body(query: &str, filters: &SearchFilters) -> Value {
        let mut must = vec![
            json!({ "key": "city", "match": { "value": filters.city } }),
            json!({
                "key": "startsAt",
                "range": {
                    "gte": filters.starts_after.to_rfc3339(),
                    "lte": filters.starts_before.to_rfc3339()
                }
            }),
        ];
        if let Some(category) = &filters.category {
            must.push(json!({ "key": "category", "match": { "value": category } }));
        }

        json!({
            "query": query,
            "filter": { "must": must },
            "limit": filters.limit,
            "with_payload": true,
        })
    }

    /// Converts raw points into hits, skipping any that fail validation
    fn parse_points(points: Vec<Value>) -> Vec<BackendHit> {
        points
            .into_iter()
            .filter_map(|raw| match serde_json::from_value::<ScoredPoint>(raw) {
                Ok(point) => {
                    let id = match point.id {
                        Value::String(s) => s,
                        Value::Number(n) => n.to_string(),
                        other => {
                            tracing::warn!(id = %other, "Vector point has unsupported id type");
                            return None;
                        }
                    };
                    if !point.score.is_finite() {
                        tracing::warn!(id = %id, "Vector point has non-finite score");
                        return None;
                    }
                    Some(BackendHit {
                        id,
                        score: point.score,
                        payload: point.payload,
                    })
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Skipping malformed vector point");
                    None
                }
            })
            .collect()
    }
}

#[async_trait::async_trait]
impl VectorBackend for HttpVectorBackend {
    async fn search(&self, query: &str, filters: &SearchFilters) -> AppResult<Vec<BackendHit>> {
        let url = format!(
            "{}/collections/{}/points/search",
            self.base_url, self.collection
        );

        let response = self
            .http_client
            .post(&url)
            .json(&Self::build_body(query, filters))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::unavailable(
                "vector",
                format!("status {}: {}", status, body),
            ));
        }

        let search: SearchResponse = response.json().await?;
        let hits = Self::parse_points(search.result);

        tracing::debug!(
            city = %filters.city,
            results = hits.len(),
            backend = "vector",
            "Vector search completed"
        );

        Ok(hits)
    }

    fn name(&self) -> &'static str {
        "vector"
    }
}
