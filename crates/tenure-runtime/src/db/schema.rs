use sqlx::PgPool;

use tenure_core::error::{Result, TenureError};

/// The internal tenure schema SQL, embedded from the migrations directory.
const TENURE_INTERNAL_SQL: &str = include_str!("../../migrations/0000_tenure_internal.sql");

/// Apply the internal schema.
///
/// Every statement is idempotent (`IF NOT EXISTS`), so this is safe to call
/// on every boot. Versioned schema migrations are the embedding
/// application's concern.
pub async fn ensure_schema(pool: &PgPool) -> Result<()> {
    sqlx::raw_sql(TENURE_INTERNAL_SQL)
        .execute(pool)
        .await
        .map_err(|e| TenureError::Database(format!("Failed to apply schema: {}", e)))?;
    Ok(())
}
