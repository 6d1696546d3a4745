use std::sync::Arc;

use crate::services::{MetricsRing, RecommendationService};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub recommendations: Arc<RecommendationService>,
    pub metrics: Arc<MetricsRing>,
}

impl AppState {
    pub fn new(recommendations: RecommendationService) -> Self {
        let metrics = recommendations.metrics().clone();
        Self {
            recommendations: Arc::new(recommendations),
            metrics,
        }
    }
}
