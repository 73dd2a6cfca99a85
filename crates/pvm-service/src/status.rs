//! Read-only job status — grounded on `job_service.py::get_job_status`.
//!
//! The original treats a missing job, or a failed count query, as "return
//! zeros" rather than an error, since this endpoint is polled by a UI
//! that would rather show `unknown`/`0%` than a 500. We keep that shape:
//! [`StatusQuery::status`] never fails on a missing job, only on an
//! infrastructure error reaching the ports at all.

use pvm_matching::{FeatureStoreReadModel, MatchRepository};
use pvm_phase::{Job, JobId, JobRecordPort, Phase};
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Clone, Serialize)]
pub struct JobCounts {
    pub products: i64,
    pub videos: i64,
    pub matches: i64,
}

impl JobCounts {
    fn zero() -> Self {
        Self { products: 0, videos: 0, matches: 0 }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct JobStatus {
    pub job_id: JobId,
    pub phase: String,
    pub percent: f64,
    pub counts: JobCounts,
}

impl JobStatus {
    fn unknown(job_id: JobId) -> Self {
        Self { job_id, phase: "unknown".to_string(), percent: 0.0, counts: JobCounts::zero() }
    }
}

/// `job_service.py`'s `phase_progress` table, verbatim.
fn percent_for_phase(phase: Phase) -> f64 {
    match phase {
        Phase::Collection => 20.0,
        Phase::FeatureExtraction => 50.0,
        Phase::Matching => 80.0,
        Phase::Evidence => 90.0,
        Phase::Completed => 100.0,
        Phase::Failed => 0.0,
    }
}

pub struct StatusQuery<J: JobRecordPort, F: FeatureStoreReadModel, M: MatchRepository> {
    jobs: Arc<J>,
    features: Arc<F>,
    matches: Arc<M>,
}

impl<J: JobRecordPort, F: FeatureStoreReadModel, M: MatchRepository> StatusQuery<J, F, M> {
    pub fn new(jobs: Arc<J>, features: Arc<F>, matches: Arc<M>) -> Self {
        Self { jobs, features, matches }
    }

    pub async fn status(&self, job_id: JobId) -> anyhow::Result<JobStatus> {
        let job: Option<Job> = self.jobs.get(job_id).await?;
        let Some(job) = job else {
            return Ok(JobStatus::unknown(job_id));
        };

        let products = self.features.products_for_job(job_id).await.unwrap_or_default().len() as i64;
        let videos = self.features.videos_for_job(job_id).await.unwrap_or_default().len() as i64;
        let matches = self.matches.count_matches(job_id).await.unwrap_or(0);

        Ok(JobStatus {
            job_id,
            phase: job.phase.to_string(),
            percent: percent_for_phase(job.phase),
            counts: JobCounts { products, videos, matches },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pvm_phase::AssetFlags;
    use pvm_testing::{InMemoryFeatureStore, InMemoryJobRecordStore, InMemoryMatchRepository};

    #[tokio::test]
    async fn unknown_job_returns_zeroed_status() {
        let query = StatusQuery::new(
            Arc::new(InMemoryJobRecordStore::new()),
            Arc::new(InMemoryFeatureStore::new()),
            Arc::new(InMemoryMatchRepository::new()),
        );
        let status = query.status(uuid::Uuid::new_v4()).await.unwrap();
        assert_eq!(status.phase, "unknown");
        assert_eq!(status.percent, 0.0);
        assert_eq!(status.counts.matches, 0);
    }

    #[tokio::test]
    async fn existing_job_reports_phase_percent() {
        let jobs = Arc::new(InMemoryJobRecordStore::new());
        let job_id = uuid::Uuid::new_v4();
        jobs.create(job_id, "fashion", AssetFlags { has_images: true, has_videos: false }).await.unwrap();

        let query = StatusQuery::new(jobs, Arc::new(InMemoryFeatureStore::new()), Arc::new(InMemoryMatchRepository::new()));
        let status = query.status(job_id).await.unwrap();
        assert_eq!(status.phase, "collection");
        assert_eq!(status.percent, 20.0);
    }
}
