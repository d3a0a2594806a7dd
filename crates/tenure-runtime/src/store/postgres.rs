use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::PgPool;
use sqlx::{Postgres, Transaction};

use tenure_core::error::Result;
use tenure_core::leadership::{Lease, LeaseStore};

/// PostgreSQL-backed lease store.
///
/// Leadership is a single row per namespace in `tenure_leaders`; the
/// `ON CONFLICT` claims below are what make contention safe, not anything
/// the elector does.
#[derive(Clone)]
pub struct PgLeaseStore {
    pool: PgPool,
}

impl PgLeaseStore {
    /// Create a new store on the given pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn delete_expired_in_tx(
        tx: &mut Transaction<'_, Postgres>,
        name: &str,
    ) -> sqlx::Result<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM tenure_leaders
            WHERE name = $1 AND expires_at < now()
            "#,
        )
        .bind(name)
        .execute(&mut **tx)
        .await?;

        Ok(result.rows_affected())
    }
}

#[async_trait]
impl LeaseStore for PgLeaseStore {
    async fn attempt_elect(&self, leader_id: &str, name: &str, ttl: Duration) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        Self::delete_expired_in_tx(&mut tx, name).await?;

        let result = sqlx::query(
            r#"
            INSERT INTO tenure_leaders (name, leader_id, elected_at, expires_at)
            VALUES ($1, $2, now(), now() + make_interval(secs => $3))
            ON CONFLICT (name) DO NOTHING
            "#,
        )
        .bind(name)
        .bind(leader_id)
        .bind(ttl.as_secs_f64())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(result.rows_affected() > 0)
    }

    async fn attempt_reelect(&self, leader_id: &str, name: &str, ttl: Duration) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        Self::delete_expired_in_tx(&mut tx, name).await?;

        // The claim only lands if we still hold the row; the WHERE clause on
        // the conflict update turns anyone else's renewal into a no-op.
        let result = sqlx::query(
            r#"
            INSERT INTO tenure_leaders (name, leader_id, elected_at, expires_at)
            VALUES ($1, $2, now(), now() + make_interval(secs => $3))
            ON CONFLICT (name) DO UPDATE
                SET expires_at = now() + make_interval(secs => $3)
                WHERE tenure_leaders.leader_id = $2
            "#,
        )
        .bind(name)
        .bind(leader_id)
        .bind(ttl.as_secs_f64())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_expired(&self, name: &str) -> Result<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM tenure_leaders
            WHERE name = $1 AND expires_at < now()
            "#,
        )
        .bind(name)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn resign(&self, leader_id: &str, name: &str, channel: &str) -> Result<bool> {
        // Release and announcement commit atomically; pg_notify fires once
        // per released row, so peers only hear about real resignations.
        let (released,): (i64,) = sqlx::query_as(
            r#"
            WITH removed AS (
                DELETE FROM tenure_leaders
                WHERE name = $1 AND leader_id = $2
                RETURNING name, leader_id
            ), announced AS (
                SELECT pg_notify(
                    $3,
                    json_build_object(
                        'name', name,
                        'leader_id', leader_id,
                        'action', 'resigned'
                    )::text
                )
                FROM removed
            )
            SELECT count(*) FROM announced
            "#,
        )
        .bind(name)
        .bind(leader_id)
        .bind(channel)
        .fetch_one(&self.pool)
        .await?;

        Ok(released > 0)
    }

    async fn current(&self, name: &str) -> Result<Option<Lease>> {
        let row = sqlx::query(
            r#"
            SELECT name, leader_id, elected_at, expires_at
            FROM tenure_leaders
            WHERE name = $1
            "#,
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                use sqlx::Row;
                Ok(Some(Lease {
                    name: row.get("name"),
                    leader_id: row.get("leader_id"),
                    elected_at: row.get("elected_at"),
                    expires_at: row.get("expires_at"),
                }))
            }
            None => Ok(None),
        }
    }
}
