use std::sync::Arc;

use media_content_jobs::{
    config::AppConfig,
    db,
    pipeline::{Pipeline, PipelineConfig},
    services::{
        access::PgClientDirectory,
        ffmpeg::FfmpegExtractor,
        queue::RedisTaskQueue,
        storage,
        worker_pool::{WorkerPool, WorkerPoolConfig},
        workers_ai::WorkersAiClient,
    },
    store::{JobStore, PgJobRepository},
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    tracing::info!("Starting media job worker");

    let config = AppConfig::from_env().expect("Failed to load configuration");

    tracing::info!("Connecting to PostgreSQL");
    let db_pool = db::init_pool(&config.database_url, config.worker_concurrency)
        .await
        .expect("Failed to connect to database");

    let store = Arc::new(JobStore::new(
        Arc::new(PgJobRepository::new(db_pool.clone())),
        Arc::new(PgClientDirectory::new(db_pool)),
    ));

    let artifacts = storage::from_config(&config).expect("Failed to initialize artifact storage");

    let queue = RedisTaskQueue::new(&config.redis_url).expect("Failed to initialize task queue");

    let ai = Arc::new(
        WorkersAiClient::new(&config.cf_account_id, &config.cf_api_token)
            .expect("Failed to initialize Workers AI client"),
    );

    let scratch_dir = std::path::Path::new(&config.media_root).join("scratch");
    let extractor = FfmpegExtractor::new(
        &config.ffmpeg_path,
        scratch_dir,
        config.conversion_timeout(),
    );

    let pipeline = Pipeline::new(
        store,
        artifacts,
        Arc::new(extractor),
        ai.clone(),
        ai.clone(),
        ai,
        PipelineConfig {
            retry_backoff: config.retry_backoff(),
        },
    );

    let pool = WorkerPool::spawn(
        Arc::new(pipeline),
        Arc::new(queue),
        WorkerPoolConfig {
            workers: config.worker_concurrency,
            poll_interval: config.poll_interval(),
        },
    )
    .expect("Invalid worker pool configuration");

    tracing::info!(workers = config.worker_concurrency, "Worker ready, waiting for jobs");

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }

    tracing::info!("Shutting down, waiting for in-flight jobs");
    if let Err(e) = pool.shutdown().await {
        tracing::error!(error = %e, "Worker pool did not shut down cleanly");
    }
}
