use axum::{extract::State, http::StatusCode, Extension, Json};
use serde::Deserialize;
use serde_json::{json, Value};

use super::AppState;
use crate::{
    error::AppResult,
    middleware::RequestId,
    models::Intention,
    services::{metrics::MetricsSummary, RecommendOptions, RecommendResponse},
};

#[derive(Debug, Deserialize)]
pub struct RecommendRequest {
    pub intention: Intention,
    #[serde(default)]
    pub options: RecommendOptions,
}

/// Health check endpoint
pub async fn health_check() -> (StatusCode, Json<Value>) {
    (StatusCode::OK, Json(json!({ "status": "healthy" })))
}

/// Ranked items and slates for one intention
pub async fn recommend(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Json(request): Json<RecommendRequest>,
) -> AppResult<Json<RecommendResponse>> {
    tracing::info!(
        request_id = %request_id,
        city = %request.intention.city,
        mood = %request.intention.tokens.mood,
        page = request.options.page,
        "Processing recommendation request"
    );

    let response = state
        .recommendations
        .recommend(&request.intention, &request.options)
        .await?;

    tracing::info!(
        request_id = %request_id,
        items = response.items.len(),
        degraded = response.degraded,
        cached = response.cached,
        "Recommendation request completed"
    );

    Ok(Json(response))
}

/// Summary of the most recent pipeline runs
pub async fn metrics(State(state): State<AppState>) -> Json<MetricsSummary> {
    Json(state.metrics.summary())
}
