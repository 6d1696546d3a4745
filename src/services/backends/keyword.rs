//! Keyword backend over Postgres full-text search
//!
//! Expects an `events` table with a `search_vector tsvector` column maintained by the
//! ingestion side. Ranking uses `ts_rank`, whose scale is unrelated to the vector backend's.

use crate::{
    error::AppResult,
    models::{BackendHit, EventFeatures, GeoPoint},
    services::backends::{KeywordBackend, SearchFilters},
};
use chrono::{DateTime, Utc};
use sqlx::PgPool;

const SEARCH_SQL: &str = r#"
    SELECT id, title, category, price_min, price_max, venue, neighborhood, starts_at,
           tags, latitude, longitude,
           ts_rank(search_vector, plainto_tsquery('english', $1))::float8 AS score
    FROM events
    WHERE city_slug = $2
      AND search_vector @@ plainto_tsquery('english', $1)
      AND ($3::text IS NULL OR category = $3)
      AND (starts_at IS NULL OR starts_at BETWEEN $4 AND $5)
    ORDER BY score DESC, id ASC
    LIMIT $6
"#;

#[derive(Debug, sqlx::FromRow)]
struct EventRow {
    id: String,
    title: String,
    category: Option<String>,
    price_min: Option<f64>,
    price_max: Option<f64>,
    venue: Option<String>,
    neighborhood: Option<String>,
    starts_at: Option<DateTime<Utc>>,
    tags: Option<Vec<String>>,
    latitude: Option<f64>,
    longitude: Option<f64>,
    score: f64,
}

impl From<EventRow> for BackendHit {
    fn from(row: EventRow) -> Self {
        let location = match (row.latitude, row.longitude) {
            (Some(lat), Some(lon)) => Some(GeoPoint { lat, lon }),
            _ => None,
        };

        BackendHit {
            id: row.id,
            score: row.score,
            payload: EventFeatures {
                title: row.title,
                category: row.category,
                price_min: row.price_min,
                price_max: row.price_max,
                venue: row.venue,
                neighborhood: row.neighborhood,
                starts_at: row.starts_at,
                tags: row.tags.unwrap_or_default(),
                location,
                distance_km: None,
            },
        }
    }
}

#[derive(Clone)]
pub struct PgKeywordBackend {
    pool: PgPool,
}

impl PgKeywordBackend {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl KeywordBackend for PgKeywordBackend {
    async fn search(&self, query: &str, filters: &SearchFilters) -> AppResult<Vec<BackendHit>> {
        if query.trim().is_empty() {
            return Ok(Vec::new());
        }

        let rows: Vec<EventRow> = sqlx::query_as(SEARCH_SQL)
            .bind(query)
            .bind(&filters.city)
            .bind(filters.category.as_deref())
            .bind(filters.starts_after)
            .bind(filters.starts_before)
            .bind(filters.limit as i64)
            .fetch_all(&self.pool)
            .await?;

        tracing::debug!(
            city = %filters.city,
            results = rows.len(),
            backend = "keyword",
            "Keyword search completed"
        );

        Ok(rows.into_iter().map(BackendHit::from).collect())
    }

    fn name(&self) -> &'static str {
        "keyword"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row() -> EventRow {
        EventRow {
            id: "evt-9".to_string(),
            title: "Open-air cinema".to_string(),
            category: Some("FILM".to_string()),
            price_min: Some(0.0),
            price_max: None,
            venue: Some("Jardim".to_string()),
            neighborhood: Some("Estrela".to_string()),
            starts_at: None,
            tags: None,
            latitude: Some(38.71),
            longitude: Some(-9.16),
            score: 0.42,
        }
    }

    #[test]
    fn test_row_into_hit() {
        let hit = BackendHit::from(row());
        assert_eq!(hit.id, "evt-9");
        assert_eq!(hit.score, 0.42);
        assert_eq!(hit.payload.category.as_deref(), Some("FILM"));
        assert!(hit.payload.tags.is_empty());
        assert_eq!(hit.payload.location, Some(GeoPoint { lat: 38.71, lon: -9.16 }));
    }

    #[test]
    fn test_row_without_coordinates_has_no_location() {
        let mut row = row();
        row.longitude = None;
        assert!(BackendHit::from(row).payload.location.is_none());
    }

    #[test]
    fn test_sql_is_parameterised() {
        assert!(SEARCH_SQL.contains("plainto_tsquery('english', $1)"));
        assert!(SEARCH_SQL.contains("LIMIT $6"));
    }
}
