//! Relationship store reached over HTTP
//!
//! Every endpoint answers `{"records": [...]}` with `kind`-tagged [`GraphRecord`]s. Records
//! whose kind does not match the query are dropped, never coerced.
use crate::{
    error::{AppError, AppResult},
    models::{FriendOverlap, GraphRecord, NoveltyRecord, SimilarItems, SocialHeatRecord},
    services::backends::GraphStore,
};
use reqwest::Client as HttpClient;
use serde::Deserialize;
use serde_json::{json, Value};

#[derive(Clone)]
pub struct HttpGraphStore {
    http_client: HttpClient,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct GraphResponse {
    #[serde(default)]
    records: Vec<Value>,
}

impl HttpGraphStore {
    pub fn new(base_url: String) -> Self {
        Self {
            http_client: HttpClient::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    async fn query(&self, path: &str, body: Value) -> AppResult<Vec<GraphRecord>> {
        let url = format!("{}/{}", self.base_url, path);
        let response = self.http_client.post(&url).json(&body).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::unavailable(
                "graph",
                format!("{} returned status {}: {}", path, status, body),
            ));
        }

        let parsed: GraphResponse = response.json().await?;
        Ok(decode_records(parsed.records))
    }
}

/// Validates raw records one by one so a single bad record does not sink the batch
fn decode_records(raw: Vec<Value>) -> Vec<GraphRecord> {
    raw.into_iter()
        .filter_map(|value| match serde_json::from_value::<GraphRecord>(value) {
            Ok(record) => Some(record),
            Err(e) => {
                tracing::warn!(error = %e, "Skipping malformed graph record");
                None
            }
        })
        .collect()
}

fn select<T>(
    records: Vec<GraphRecord>,
    expected: &'static str,
    pick: impl Fn(GraphRecord) -> Option<T>,
) -> Vec<T> {
    records
        .into_iter()
        .filter_map(|record| {
            let kind = record.kind();
            let picked = pick(record);
            if picked.is_none() {
                tracing::warn!(expected, got = kind, "Dropping graph record of unexpected kind");
            }
            picked
        })
        .collect()
}

#[async_trait::async_trait]
impl GraphStore for HttpGraphStore {
    async fn similar_items(&self, ids: &[String]) -> AppResult<Vec<SimilarItems>> {
        let records = self.query("similar-items", json!({ "ids": ids })).await?;
        Ok(select(records, "similar", |r| match r {
            GraphRecord::Similar(item) => Some(item),
            _ => None,
        }))
    }

    async fn novelty_for_user(
        &self,
        user_id: &str,
        ids: &[String],
    ) -> AppResult<Vec<NoveltyRecord>> {
        let records = self
            .query("novelty", json!({ "userId": user_id, "ids": ids }))
            .await?;
        Ok(select(records, "novelty", |r| match r {
            GraphRecord::Novelty(item) => Some(item),
            _ => None,
        }))
    }

    async fn friend_overlap(&self, user_id: &str, ids: &[String]) -> AppResult<Vec<FriendOverlap>> {
        let records = self
            .query("friend-overlap", json!({ "userId": user_id, "ids": ids }))
            .await?;
        Ok(select(records, "friendOverlap", |r| match r {
            GraphRecord::FriendOverlap(item) => Some(item),
            _ => None,
        }))
    }

    async fn social_heat(
        &self,
        ids: &[String],
        window_hours: u32,
    ) -> AppResult<Vec<SocialHeatRecord>> {
        let records = self
            .query("social-heat", json!({ "ids": ids, "windowHours": window_hours }))
            .await?;
        Ok(select(records, "socialHeat", |r| match r {
            GraphRecord::SocialHeat(item) => Some(item),
            _ => None,
        }))
    }
}
