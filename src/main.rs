use std::sync::Arc;

use axum::routing::get;
use tracing_subscriber::EnvFilter;

use media_content_jobs::{
    app_state::AppState,
    config::AppConfig,
    db,
    routes,
    services::{
        access::{AccessGate, CreditLedger, PgClientDirectory, PgCreditLedger, UnmeteredCredits},
        queue::RedisTaskQueue,
        storage,
    },
    store::{JobStore, PgJobRepository},
};

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    let config = AppConfig::from_env().expect("Failed to load configuration from environment");

    tracing::info!("Initializing media-content-jobs server");

    let prometheus_handle = Arc::new(
        routes::metrics::install_recorder().expect("Failed to install Prometheus metrics recorder"),
    );

    tracing::info!("Connecting to PostgreSQL database");
    let db_pool = db::init_pool(&config.database_url, config.worker_concurrency)
        .await
        .expect("Failed to connect to database");

    tracing::info!("Running database migrations");
    db::run_migrations(&db_pool)
        .await
        .expect("Failed to run database migrations");

    let artifacts = storage::from_config(&config).expect("Failed to initialize artifact storage");

    tracing::info!("Connecting to Redis dispatch queue");
    let queue = RedisTaskQueue::new(&config.redis_url).expect("Failed to initialize task queue");

    let clients = Arc::new(PgClientDirectory::new(db_pool.clone()));
    let credits: Arc<dyn CreditLedger> = if config.credits_enforced {
        Arc::new(PgCreditLedger::new(db_pool.clone()))
    } else {
        tracing::info!("Credit checks disabled");
        Arc::new(UnmeteredCredits)
    };

    let store = Arc::new(JobStore::new(
        Arc::new(PgJobRepository::new(db_pool)),
        clients.clone(),
    ));

    let state = AppState::new(
        store,
        AccessGate::new(clients, credits),
        Arc::new(queue),
        artifacts,
        &config.jwt_secret,
    );

    let app = routes::build_router(state, config.max_upload_bytes()).route(
        "/metrics",
        get(routes::metrics::prometheus_metrics).with_state(prometheus_handle),
    );

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutdown signal received");
        })
        .await
        .expect("Server error");
}
