use std::sync::Arc;

use axum::serve;
use fraudguard::{
    AppState, FraudAnalyzer, Settings,
    db::{
        InMemoryNftStore, NftRecordStore, PgNftStore, PgVectorStore, VectorStore,
        pool::{check_embedding_dimension, create_pool, embedding_column_dimension, run_migrations, test_connection},
    },
    routes,
};
use tokio::net::TcpListener;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env and settings before tracing so LOG_LEVEL applies
    let settings = Settings::from_env()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&settings.log_level)),
        )
        .with_target(false)
        .with_thread_ids(false)
        .with_level(true)
        .init();

    // Postgres when configured, otherwise process-local stores
    let (records, vectors, pool) = match &settings.database_url {
        Some(database_url) => {
            let pool = create_pool(database_url, settings.timeouts.persistence).await?;
            let vector_installed = test_connection(&pool).await?;
            if settings.run_migrations {
                run_migrations(&pool).await?;
            } else if !vector_installed {
                anyhow::bail!("pgvector extension missing and RUN_MIGRATIONS is disabled");
            }
            check_embedding_dimension(embedding_column_dimension(&pool).await?, settings.embedding_dimension)?;
            let records: Arc<dyn NftRecordStore> = Arc::new(PgNftStore::new(pool.clone()));
            let vectors: Arc<dyn VectorStore> = Arc::new(PgVectorStore::new(pool.clone()));
            (records, vectors, Some(pool))
        }
        None => {
            tracing::warn!("DATABASE_URL not set; using in-memory NFT store");
            let store = Arc::new(InMemoryNftStore::new());
            let records: Arc<dyn NftRecordStore> = store.clone();
            let vectors: Arc<dyn VectorStore> = store;
            (records, vectors, None)
        }
    };

    let components = FraudAnalyzer::initialize(&settings, Some(vectors));
    let address = format!("0.0.0.0:{}", settings.port);

    let app_state = AppState {
        analyzer: Arc::new(components.analyzer),
        descriptions: Arc::new(components.descriptions),
        records,
        settings: Arc::new(settings),
        pool,
    };

    //cors
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = routes::router(app_state.clone())
        .layer(CompressionLayer::new())
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    let listener = TcpListener::bind(address.as_str()).await?;
    tracing::info!("Server listening on {}", address);

    serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    app_state.close().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        return;
    }
    tracing::info!("Shutdown signal received");
}
