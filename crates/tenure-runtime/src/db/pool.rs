use std::time::Duration;

use sqlx::postgres::{PgPool, PgPoolOptions};

use tenure_core::config::DatabaseConfig;
use tenure_core::error::{Result, TenureError};

/// Open a connection pool from configuration.
///
/// Lease writes always go to the primary, so a single pool is all the
/// runtime needs.
pub async fn connect(config: &DatabaseConfig) -> Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(config.pool_size)
        .acquire_timeout(Duration::from_secs(config.pool_timeout_secs))
        .connect(&config.url)
        .await
        .map_err(|e| TenureError::Database(format!("Failed to connect: {}", e)))
}

/// Check database connectivity.
pub async fn health_check(pool: &PgPool) -> Result<()> {
    sqlx::query("SELECT 1")
        .execute(pool)
        .await
        .map_err(|e| TenureError::Database(format!("Health check failed: {}", e)))?;
    Ok(())
}
