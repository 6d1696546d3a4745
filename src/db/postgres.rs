use std::time::Duration;

use sqlx::{postgres::PgPoolOptions, PgPool};

/// Creates the PostgreSQL pool backing the keyword search backend
///
/// Connections are opened lazily so the service starts even when the database is down;
/// keyword search then fails per request and the pipeline degrades to vector-only results.
/// Acquiring a connection is capped well below any request budget.
pub fn create_pool(database_url: &str, max_connections: u32) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_millis(500))
        .connect_lazy(database_url)?;

    Ok(pool)
}
