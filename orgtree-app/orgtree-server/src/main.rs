use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tower_http::cors::CorsLayer;
use tracing::{error, info};

use orgtree_api::{build_router, AppState};
use orgtree_core::services::HierarchyService;
use orgtree_infrastructure::{
    create_pool, create_redis_pool, run_migrations, HttpCrmRoleFeed, PgHierarchyStore,
    RedisPermissionCache,
};
use orgtree_shared::config::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration (also reads .env)
    let config = AppConfig::load().context("Failed to load configuration")?;

    // Initialize telemetry; the guard flushes file logs on exit
    let _log_guard = orgtree_shared::telemetry::init_telemetry(&config.log)?;

    info!("{} starting ({})...", config.app.name, config.app.env);

    // Connect to Database
    let pool = create_pool(&config.database)
        .await
        .context("Failed to connect to database")?;
    run_migrations(&pool).await.context("Failed to run migrations")?;
    info!("Database ready.");

    // Collaborators
    let redis_pool = create_redis_pool(&config.redis)?;
    let permission_cache = Arc::new(RedisPermissionCache::new(redis_pool, config.redis.key_prefix.clone()));
    let crm_feed = Arc::new(HttpCrmRoleFeed::new(&config.crm));
    let store = Arc::new(PgHierarchyStore::new(pool));

    let service = HierarchyService::new(store, permission_cache, crm_feed, config.engine.clone());

    // Create App State
    let state = AppState {
        service: Arc::new(service),
        app: config.app.clone(),
    };

    let app = build_router(state).layer(CorsLayer::permissive());

    // Bind address
    let host: std::net::IpAddr = config.app.host.parse()?;
    let addr = SocketAddr::from((host, config.app.port));
    info!("Listening on {}", addr);

    // Start server
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped.");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
    }
    info!("Shutdown signal received");
}
