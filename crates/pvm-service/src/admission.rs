//! Job admission — the only way a [`Job`] row comes into existence.
//!
//! Grounded on `job_service.py::start_job`: create the `jobs` row in
//! phase `collection`, then publish the two requests that kick off
//! collection (`products.collect.request`, `videos.search.request`).
//! Industry classification and query generation (the original's Ollama
//! calls) are upstream of this service's scope — callers pass in an
//! already-classified industry and already-generated per-locale queries,
//! matching spec.md's Non-goals around LLM orchestration.
//!
//! The original wraps both the insert and the publish step in their own
//! try/except that only logs a warning on failure, reasoning that a job a
//! collector never hears about will simply sit idle rather than corrupt
//! state. We keep that shape for the publish step (best-effort, since the
//! bus already retries transient failures internally) but propagate the
//! insert failure, since a `Job` that doesn't exist makes every subsequent
//! phase event for it a logical no-op.

use pvm_phase::{AssetFlags, Job, JobId, JobRecordPort};
use pvm_core::{CorrelationId, EventBus};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

pub const PRODUCTS_COLLECT_REQUEST: &str = "products.collect.request";
pub const VIDEOS_SEARCH_REQUEST: &str = "videos.search.request";

/// Per-locale search queries, already generated upstream. `product` is
/// keyed by locale (the original only ever populates `"en"`); `video` is
/// keyed by platform locale (`"vi"` for YouTube, `"zh"` for Bilibili).
#[derive(Debug, Clone, Default)]
pub struct GeneratedQueries {
    pub product: HashMap<String, Vec<String>>,
    pub video: HashMap<String, Vec<String>>,
}

/// Inputs to [`AdmissionService::start_job`] — everything `start_job`
/// needs once industry classification and query generation have already
/// happened.
#[derive(Debug, Clone)]
pub struct AdmissionRequest {
    pub industry: String,
    pub queries: GeneratedQueries,
    pub top_amz: u32,
    pub top_ebay: u32,
    pub platforms: Vec<String>,
    pub recency_days: u32,
}

impl AdmissionRequest {
    fn asset_flags(&self) -> AssetFlags {
        AssetFlags {
            has_images: self.top_amz > 0 || self.top_ebay > 0,
            has_videos: !self.platforms.is_empty(),
        }
    }

    /// `job_service.py::route_video_queries`: only the locale a
    /// requested platform actually searches in is forwarded.
    fn routed_video_queries(&self) -> HashMap<String, Vec<String>> {
        let mut routed = HashMap::new();
        if self.platforms.iter().any(|p| p == "youtube") {
            if let Some(vi) = self.queries.video.get("vi") {
                routed.insert("vi".to_string(), vi.clone());
            }
        }
        if self.platforms.iter().any(|p| p == "bilibili") {
            if let Some(zh) = self.queries.video.get("zh") {
                routed.insert("zh".to_string(), zh.clone());
            }
        }
        routed
    }
}

pub struct AdmissionService<J: JobRecordPort> {
    jobs: Arc<J>,
    bus: Arc<dyn EventBus>,
}

impl<J: JobRecordPort> AdmissionService<J> {
    pub fn new(jobs: Arc<J>, bus: Arc<dyn EventBus>) -> Self {
        Self { jobs, bus }
    }

    /// Creates the job row and publishes the two collection requests.
    /// Returns the created [`Job`] even if publishing fails — the job
    /// exists and can be retried or inspected via [`crate::status`]
    /// regardless of whether the downstream collectors heard about it
    /// yet.
    pub async fn start_job(&self, request: AdmissionRequest) -> anyhow::Result<Job> {
        let job_id: JobId = Uuid::new_v4();
        let job = self.jobs.create(job_id, &request.industry, request.asset_flags()).await?;

        let correlation_id = CorrelationId::from_job(job_id);
        let en_queries = request.queries.product.get("en").cloned().unwrap_or_default();

        if let Err(err) = self
            .bus
            .publish(
                PRODUCTS_COLLECT_REQUEST,
                job_id,
                serde_json::json!({
                    "job_id": job_id,
                    "top_amz": request.top_amz,
                    "top_ebay": request.top_ebay,
                    "queries": { "en": en_queries },
                }),
                correlation_id,
            )
            .await
        {
            warn!(job_id = %job_id, error = %err, "failed to publish products.collect.request");
        }

        if let Err(err) = self
            .bus
            .publish(
                VIDEOS_SEARCH_REQUEST,
                job_id,
                serde_json::json!({
                    "job_id": job_id,
                    "industry": request.industry,
                    "queries": request.routed_video_queries(),
                    "platforms": request.platforms,
                    "recency_days": request.recency_days,
                }),
                correlation_id,
            )
            .await
        {
            warn!(job_id = %job_id, error = %err, "failed to publish videos.search.request");
        }

        Ok(job)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pvm_testing::{InMemoryJobRecordStore, RecordingEventBus};

    #[tokio::test]
    async fn start_job_creates_row_and_publishes_both_requests() {
        let jobs = Arc::new(InMemoryJobRecordStore::new());
        let bus = Arc::new(RecordingEventBus::new());
        let service = AdmissionService::new(jobs.clone(), bus.clone());

        let mut product = HashMap::new();
        product.insert("en".to_string(), vec!["red sneakers".to_string()]);
        let mut video = HashMap::new();
        video.insert("vi".to_string(), vec!["giay the thao".to_string()]);

        let request = AdmissionRequest {
            industry: "fashion".to_string(),
            queries: GeneratedQueries { product, video },
            top_amz: 10,
            top_ebay: 5,
            platforms: vec!["youtube".to_string()],
            recency_days: 30,
        };

        let job = service.start_job(request).await.unwrap();
        assert_eq!(job.phase, pvm_phase::Phase::Collection);
        assert!(job.asset_flags.has_images);
        assert!(job.asset_flags.has_videos);

        let published = bus.published();
        assert_eq!(published.len(), 2);
        assert_eq!(published[0].topic, PRODUCTS_COLLECT_REQUEST);
        assert_eq!(published[1].topic, VIDEOS_SEARCH_REQUEST);
    }
}
