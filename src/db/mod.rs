use sqlx::{postgres::PgPoolOptions, PgPool};
use std::time::Duration;

/// Initialize the PostgreSQL pool. Each worker holds at most one connection
/// while writing a checkpoint, so the pool is sized from the worker count.
pub async fn init_pool(database_url: &str, workers: usize) -> Result<PgPool, sqlx::Error> {
    let max_connections = u32::try_from(workers).unwrap_or(u32::MAX).saturating_add(10);

    PgPoolOptions::new()
        .max_connections(max_connections)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .connect(database_url)
        .await
}

/// Apply the embedded `clients`, `user_credits` and `media_jobs` migrations.
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| sqlx::Error::Migrate(Box::new(e)))?;
    tracing::info!("Database migrations applied");
    Ok(())
}

pub mod queries;
