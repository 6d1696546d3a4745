use std::sync::Arc;

use slate_api::{
    api::{create_router, AppState},
    config::Config,
    db::{create_pool, create_redis_client, RedisCacheStore},
    services::{
        backends::{
            HttpGraphStore, HttpReranker, HttpVectorBackend, PgKeywordBackend, Reranker,
        },
        CacheStore, GraphEnrichment, HybridRetriever, MemoryCacheStore, MetricsRing,
        RecommendationService, SearchCache,
    },
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "slate_api=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    let pool = create_pool(&config.database_url, config.database_max_connections)?;
    let keyword = Arc::new(PgKeywordBackend::new(pool));
    let vector = Arc::new(HttpVectorBackend::new(
        config.vector_url.clone(),
        config.vector_collection.clone(),
    ));
    let reranker: Option<Arc<dyn Reranker>> = if config.rerank_url.is_empty() {
        None
    } else {
        Some(Arc::new(HttpReranker::new(
            config.rerank_url.clone(),
            config.rerank_model.clone(),
        )))
    };
    let graph = Arc::new(HttpGraphStore::new(config.graph_url.clone()));

    let store = cache_store(&config).await;
    tracing::info!(store = store.name(), "Search cache ready");

    let service = RecommendationService::new(
        HybridRetriever::new(vector, keyword, reranker, config.retriever()),
        GraphEnrichment::new(graph, config.enrichment()),
        SearchCache::new(store, config.cache_timeout()),
        Arc::new(MetricsRing::new(config.metrics_capacity)),
        config.pipeline(),
    );

    let app = create_router(AppState::new(service));

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

/// Redis when configured and reachable, otherwise the in-process store
async fn cache_store(config: &Config) -> Arc<dyn CacheStore> {
    if config.redis_url.is_empty() {
        return Arc::new(MemoryCacheStore::new());
    }

    let store = match create_redis_client(&config.redis_url) {
        Ok(client) => RedisCacheStore::new(client)
            .await
            .map_err(anyhow::Error::from),
        Err(e) => Err(e),
    };

    match store {
        Ok(store) => Arc::new(store),
        Err(e) => {
            tracing::warn!(error = %e, "Redis unavailable, falling back to in-process cache");
            Arc::new(MemoryCacheStore::new())
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
