//! C8's write side: upserting accepted product-video verdicts.

use async_trait::async_trait;
use pvm_matching::{MatchOutcome, MatchRepository};
use sqlx::{PgPool, Row};
use std::collections::HashSet;
use uuid::Uuid;

#[derive(Clone)]
pub struct PgMatchRepository {
    pool: PgPool,
}

impl PgMatchRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MatchRepository for PgMatchRepository {
    async fn upsert_match(&self, job_id: Uuid, outcome: &MatchOutcome) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO matches (
                job_id, product_id, video_id, best_img_id, best_frame_id,
                best_ts, score, best_pair_score, consistency, total_pairs, status
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, 'accepted')
            ON CONFLICT (job_id, product_id, video_id) DO UPDATE SET
                best_img_id = EXCLUDED.best_img_id,
                best_frame_id = EXCLUDED.best_frame_id,
                best_ts = EXCLUDED.best_ts,
                score = EXCLUDED.score,
                best_pair_score = EXCLUDED.best_pair_score,
                consistency = EXCLUDED.consistency,
                total_pairs = EXCLUDED.total_pairs,
                status = 'accepted',
                updated_at = NOW()
            "#,
        )
        .bind(job_id)
        .bind(&outcome.product_id)
        .bind(&outcome.video_id)
        .bind(&outcome.best_img_id)
        .bind(&outcome.best_frame_id)
        .bind(outcome.best_ts)
        .bind(outcome.score)
        .bind(outcome.best_pair_score)
        .bind(outcome.consistency as i32)
        .bind(outcome.total_pairs as i32)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn count_matches(&self, job_id: Uuid) -> anyhow::Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM matches WHERE job_id = $1")
            .bind(job_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get::<i64, _>("n"))
    }

    async fn existing_pairs(&self, job_id: Uuid) -> anyhow::Result<HashSet<(String, String)>> {
        let rows = sqlx::query("SELECT product_id, video_id FROM matches WHERE job_id = $1")
            .bind(job_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|r| (r.get("product_id"), r.get("video_id"))).collect())
    }
}
