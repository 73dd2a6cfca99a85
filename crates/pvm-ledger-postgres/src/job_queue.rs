//! Generic background job queue for `pvm-core`'s `JobStore`, grounded
//! directly on the teacher's `PgJobStore`: `FOR UPDATE SKIP LOCKED` claim,
//! exponential backoff retry, dead-letter on exhaustion.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use pvm_core::job::{ClaimedJob, FailureKind, JobStore};
use sqlx::{PgPool, Row};
use uuid::Uuid;

#[derive(Clone)]
pub struct PgJobQueueStore {
    pool: PgPool,
    default_lease_ms: i64,
}

impl PgJobQueueStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool, default_lease_ms: 60_000 }
    }

    pub fn with_lease_timeout(pool: PgPool, lease_ms: i64) -> Self {
        Self { pool, default_lease_ms: lease_ms }
    }

    pub async fn reclaim_expired(&self) -> anyhow::Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE background_jobs
            SET status = 'pending', worker_id = NULL, lease_expires_at = NULL, updated_at = NOW()
            WHERE status = 'running' AND lease_expires_at < NOW()
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl JobStore for PgJobQueueStore {
    async fn claim_ready(&self, worker_id: &str, limit: i64) -> anyhow::Result<Vec<ClaimedJob>> {
        let lease_expires_at = Utc::now() + ChronoDuration::milliseconds(self.default_lease_ms);

        let rows = sqlx::query(
            r#"
            WITH claimable AS (
                SELECT id
                FROM background_jobs
                WHERE status = 'pending' AND run_at <= NOW()
                ORDER BY run_at ASC
                LIMIT $1
                FOR UPDATE SKIP LOCKED
            )
            UPDATE background_jobs
            SET status = 'running', worker_id = $2, lease_expires_at = $3, updated_at = NOW()
            WHERE id IN (SELECT id FROM claimable)
            RETURNING id, job_type, payload, attempt
            "#,
        )
        .bind(limit)
        .bind(worker_id)
        .bind(lease_expires_at)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| ClaimedJob {
                id: row.get("id"),
                job_type: row.get("job_type"),
                payload: row.get("payload"),
                version: 1,
                attempt: row.get("attempt"),
            })
            .collect())
    }

    async fn mark_succeeded(&self, job_id: Uuid) -> anyhow::Result<()> {
        sqlx::query("UPDATE background_jobs SET status = 'succeeded', updated_at = NOW() WHERE id = $1")
            .bind(job_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn mark_failed(&self, job_id: Uuid, error: &str, kind: FailureKind) -> anyhow::Result<()> {
        let mut tx = self.pool.begin().await?;

        let job = sqlx::query("SELECT attempt, max_retries FROM background_jobs WHERE id = $1 FOR UPDATE")
            .bind(job_id)
            .fetch_one(&mut *tx)
            .await?;

        let attempt: i32 = job.get("attempt");
        let max_retries: i32 = job.get("max_retries");

        match kind {
            FailureKind::Retryable if attempt < max_retries => {
                let delay_secs = 2i64.saturating_pow(attempt as u32).min(3600);
                let retry_at: DateTime<Utc> = Utc::now() + ChronoDuration::seconds(delay_secs);

                sqlx::query(
                    r#"
                    UPDATE background_jobs
                    SET status = 'pending', run_at = $1, attempt = attempt + 1,
                        error_message = $2, worker_id = NULL, lease_expires_at = NULL, updated_at = NOW()
                    WHERE id = $3
                    "#,
                )
                .bind(retry_at)
                .bind(error)
                .bind(job_id)
                .execute(&mut *tx)
                .await?;
            }
            _ => {
                sqlx::query(
                    "UPDATE background_jobs SET status = 'dead_letter', error_message = $1, updated_at = NOW() WHERE id = $2",
                )
                .bind(error)
                .bind(job_id)
                .execute(&mut *tx)
                .await?;
            }
        }

        tx.commit().await?;
        Ok(())
    }

    async fn heartbeat(&self, job_id: Uuid) -> anyhow::Result<()> {
        let lease_expires_at = Utc::now() + ChronoDuration::milliseconds(self.default_lease_ms);
        sqlx::query("UPDATE background_jobs SET lease_expires_at = $1, updated_at = NOW() WHERE id = $2 AND status = 'running'")
            .bind(lease_expires_at)
            .bind(job_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
