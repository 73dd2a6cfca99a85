//! C6 — job record CRUD, including the `update_phase` CAS that keeps two
//! concurrent handlers from both applying the same transition twice.

use async_trait::async_trait;
use pvm_phase::{AssetFlags, Job, Phase};
use sqlx::{PgPool, Row};
use uuid::Uuid;

#[derive(Clone)]
pub struct PgJobRecordStore {
    pool: PgPool,
}

impl PgJobRecordStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn phase_from_str(s: &str) -> anyhow::Result<Phase> {
    Ok(match s {
        "collection" => Phase::Collection,
        "feature_extraction" => Phase::FeatureExtraction,
        "matching" => Phase::Matching,
        "evidence" => Phase::Evidence,
        "completed" => Phase::Completed,
        "failed" => Phase::Failed,
        other => anyhow::bail!("unknown phase in jobs table: {other}"),
    })
}

#[async_trait]
impl pvm_phase::JobRecordPort for PgJobRecordStore {
    async fn get(&self, job_id: Uuid) -> anyhow::Result<Option<Job>> {
        let row = sqlx::query(
            "SELECT job_id, industry, phase, has_images, has_videos, created_at, updated_at \
             FROM jobs WHERE job_id = $1",
        )
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else { return Ok(None) };
        Ok(Some(Job {
            job_id: row.get("job_id"),
            industry: row.get("industry"),
            phase: phase_from_str(row.get("phase"))?,
            asset_flags: AssetFlags {
                has_images: row.get("has_images"),
                has_videos: row.get("has_videos"),
            },
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        }))
    }

    async fn create(&self, job_id: Uuid, industry: &str, asset_flags: AssetFlags) -> anyhow::Result<Job> {
        let row = sqlx::query(
            r#"
            INSERT INTO jobs (job_id, industry, phase, has_images, has_videos)
            VALUES ($1, $2, 'collection', $3, $4)
            ON CONFLICT (job_id) DO UPDATE SET job_id = jobs.job_id
            RETURNING job_id, industry, phase, has_images, has_videos, created_at, updated_at
            "#,
        )
        .bind(job_id)
        .bind(industry)
        .bind(asset_flags.has_images)
        .bind(asset_flags.has_videos)
        .fetch_one(&self.pool)
        .await?;

        Ok(Job {
            job_id: row.get("job_id"),
            industry: row.get("industry"),
            phase: phase_from_str(row.get("phase"))?,
            asset_flags,
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
    }

    async fn update_phase(&self, job_id: Uuid, expected_old: Phase, new: Phase) -> anyhow::Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET phase = $3, updated_at = NOW()
            WHERE job_id = $1 AND phase = $2
            "#,
        )
        .bind(job_id)
        .bind(expected_old.to_string())
        .bind(new.to_string())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
