//! C2 — the event ledger, backed by a single `(event_id, job_id,
//! event_name)` table. Idempotency rests entirely on `event_id`'s primary
//! key: a second `record` for the same id is a no-op insert conflict, not
//! a race to detect in application code.

use async_trait::async_trait;
use pvm_phase::EventLedgerPort;
use sqlx::Row;
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Clone)]
pub struct PgEventLedger {
    pool: PgPool,
}

impl PgEventLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EventLedgerPort for PgEventLedger {
    async fn record(&self, event_id: Uuid, job_id: Uuid, event_name: &str) -> anyhow::Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO event_ledger (event_id, job_id, event_name)
            VALUES ($1, $2, $3)
            ON CONFLICT (event_id) DO NOTHING
            "#,
        )
        .bind(event_id)
        .bind(job_id)
        .bind(event_name)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn has(&self, event_id: Uuid) -> anyhow::Result<bool> {
        let row = sqlx::query("SELECT 1 FROM event_ledger WHERE event_id = $1")
            .bind(event_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    async fn event_names_for_job(&self, job_id: Uuid) -> anyhow::Result<Vec<String>> {
        let rows = sqlx::query("SELECT DISTINCT event_name FROM event_ledger WHERE job_id = $1")
            .bind(job_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|r| r.get("event_name")).collect())
    }
}
