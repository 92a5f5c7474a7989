//! # Database Connection Management
//!
//! Pool construction and schema bootstrap for the pipeline's relational
//! store. The schema lives in `migrations/` and is applied idempotently.

use crate::config::PipelineConfig;
use crate::error::Result;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

const SCHEMA_SQL: &str = include_str!("../migrations/0001_initial_schema.sql");

/// Connect eagerly, verifying the database is reachable.
pub async fn connect(config: &PipelineConfig) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.database_url)
        .await?;
    Ok(pool)
}

/// Build a pool without connecting; the first query establishes the
/// connection. Useful when the store may be down at startup and the fallback
/// queue should absorb writes in the meantime.
pub fn connect_lazy(config: &PipelineConfig) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect_lazy(&config.database_url)?;
    Ok(pool)
}

/// Apply the initial schema. Every statement uses `IF NOT EXISTS`, so this
/// is safe to run on every startup.
pub async fn bootstrap_schema(pool: &PgPool) -> Result<()> {
    sqlx::raw_sql(SCHEMA_SQL).execute(pool).await?;
    tracing::info!("Database schema bootstrapped");
    Ok(())
}

pub async fn health_check(pool: &PgPool) -> Result<bool> {
    let (health,): (i32,) = sqlx::query_as("SELECT 1").fetch_one(pool).await?;
    Ok(health == 1)
}
