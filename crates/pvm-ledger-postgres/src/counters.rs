//! C3 — per-job, per-asset-type counters with watermark timers, backed
//! by one row per `(job_id, asset_type)`. `observe` and `set_completed`
//! both do their read-modify-write inside a single `UPDATE ... RETURNING`
//! so concurrent deliveries for the same counter serialize on the row
//! lock rather than racing in application code.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pvm_phase::ports::AssetCounterState;
use pvm_phase::{AssetCounterPort, CounterKind};
use sqlx::{PgPool, Row};
use std::time::Duration;
use uuid::Uuid;

#[derive(Clone)]
pub struct PgAssetCounterStore {
    pool: PgPool,
}

impl PgAssetCounterStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn row_to_state(row: &sqlx::postgres::PgRow) -> AssetCounterState {
    AssetCounterState {
        expected: row.get("expected"),
        processed: row.get("processed"),
        failed: row.get("failed"),
        watermark_deadline: row.get::<Option<DateTime<Utc>>, _>("watermark_deadline"),
        completed_emitted: row.get("completed_emitted"),
    }
}

#[async_trait]
impl AssetCounterPort for PgAssetCounterStore {
    async fn initialize(
        &self,
        job_id: Uuid,
        kind: CounterKind,
        expected: i64,
        watermark_ttl: Duration,
    ) -> anyhow::Result<AssetCounterState> {
        let deadline = Utc::now() + chrono::Duration::from_std(watermark_ttl)?;

        let row = sqlx::query(
            r#"
            INSERT INTO asset_counters (job_id, asset_type, expected, watermark_deadline)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (job_id, asset_type) DO UPDATE SET job_id = asset_counters.job_id
            RETURNING expected, processed, failed, watermark_deadline, completed_emitted
            "#,
        )
        .bind(job_id)
        .bind(kind.as_key())
        .bind(expected)
        .bind(deadline)
        .fetch_one(&self.pool)
        .await?;

        Ok(row_to_state(&row))
    }

    async fn observe(
        &self,
        job_id: Uuid,
        kind: CounterKind,
        delta_processed: i64,
        delta_failed: i64,
    ) -> anyhow::Result<AssetCounterState> {
        let row = sqlx::query(
            r#"
            UPDATE asset_counters
            SET processed = processed + $3,
                failed = failed + $4
            WHERE job_id = $1 AND asset_type = $2
            RETURNING expected, processed, failed, watermark_deadline, completed_emitted
            "#,
        )
        .bind(job_id)
        .bind(kind.as_key())
        .bind(delta_processed)
        .bind(delta_failed)
        .fetch_one(&self.pool)
        .await?;

        Ok(row_to_state(&row))
    }

    async fn current(&self, job_id: Uuid, kind: CounterKind) -> anyhow::Result<Option<AssetCounterState>> {
        let row = sqlx::query(
            "SELECT expected, processed, failed, watermark_deadline, completed_emitted \
             FROM asset_counters WHERE job_id = $1 AND asset_type = $2",
        )
        .bind(job_id)
        .bind(kind.as_key())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(row_to_state))
    }

    async fn set_completed(&self, job_id: Uuid, kind: CounterKind) -> anyhow::Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE asset_counters
            SET completed_emitted = TRUE
            WHERE job_id = $1 AND asset_type = $2 AND completed_emitted = FALSE
            "#,
        )
        .bind(job_id)
        .bind(kind.as_key())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn pending_deadlines(&self) -> anyhow::Result<Vec<(Uuid, CounterKind, DateTime<Utc>)>> {
        let rows = sqlx::query(
            "SELECT job_id, asset_type, watermark_deadline FROM asset_counters \
             WHERE completed_emitted = FALSE AND watermark_deadline IS NOT NULL",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in &rows {
            let asset_type: String = row.get("asset_type");
            let Some(kind) = CounterKind::from_key(&asset_type) else {
                continue;
            };
            let job_id: Uuid = row.get("job_id");
            let deadline: DateTime<Utc> = row.get("watermark_deadline");
            out.push((job_id, kind, deadline));
        }
        Ok(out)
    }
}
