//! C8/C9 — the matching engine's orchestration: for one `match.request`,
//! walk every (product, video) pair belonging to the job not already in
//! `matches`, score and aggregate, persist accepted verdicts and publish a
//! `match.result` for each one, then emit `matchings.process.completed`
//! once the whole job has been processed.

use crate::config::MatchingConfig;
use crate::domain::{PairMatch, ProductImage, VideoFrame};
use crate::ports::{FeatureStoreReadModel, MatchRepository, PairFeatureScorer};
use crate::scoring::{aggregate_matches, pair_score};
use crate::topics;
use pvm_core::{BatchOutcome, CorrelationId, EventBus, EventEnvelope, OrchestratorError};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};
use uuid::Uuid;

const PERSIST_MAX_ATTEMPTS: u32 = 3;
const PERSIST_BASE_DELAY: Duration = Duration::from_millis(100);

pub struct MatchingEngine<F, S, R, B>
where
    F: FeatureStoreReadModel,
    S: PairFeatureScorer,
    R: MatchRepository,
    B: EventBus,
{
    features: Arc<F>,
    scorer: Arc<S>,
    repo: Arc<R>,
    bus: Arc<B>,
    config: MatchingConfig,
}

impl<F, S, R, B> MatchingEngine<F, S, R, B>
where
    F: FeatureStoreReadModel,
    S: PairFeatureScorer,
    R: MatchRepository,
    B: EventBus,
{
    pub fn new(features: Arc<F>, scorer: Arc<S>, repo: Arc<R>, bus: Arc<B>, config: MatchingConfig) -> Self {
        Self { features, scorer, repo, bus, config }
    }

    /// Entry point for a `match.request` envelope. Only whole-request
    /// failures (unable to even list the job's products/videos) nack the
    /// message; a single pair's failure is skipped and counted (spec
    /// §4.8).
    pub async fn handle_match_request(&self, envelope: EventEnvelope) -> Result<(), OrchestratorError> {
        let job_id = envelope.job_id;
        let top_k = envelope
            .payload
            .get("top_k")
            .and_then(serde_json::Value::as_u64)
            .map(|v| v as u32)
            .unwrap_or(self.config.retrieval_topk);

        let products = self
            .features
            .products_for_job(job_id)
            .await
            .map_err(OrchestratorError::Transient)?;
        let videos = self
            .features
            .videos_for_job(job_id)
            .await
            .map_err(OrchestratorError::Transient)?;

        let existing = self.repo.existing_pairs(job_id).await.map_err(OrchestratorError::Transient)?;

        let mut outcome = BatchOutcome::default();
        for product_id in &products {
            for video_id in &videos {
                if existing.contains(&(product_id.clone(), video_id.clone())) {
                    outcome.record_skip();
                    continue;
                }
                match self.match_product_video(job_id, product_id, video_id, top_k).await {
                    Ok(true) => outcome.record_success(),
                    Ok(false) => outcome.record_skip(),
                    Err(err) => {
                        warn!(%job_id, product_id, video_id, error = %err, "pair match failed, skipping");
                        outcome.record_failure();
                    }
                }
            }
        }

        info!(
            %job_id,
            succeeded = outcome.succeeded,
            skipped = outcome.skipped,
            failed = outcome.failed,
            "matching pass complete"
        );

        let payload = json!({
            "job_id": job_id,
            "accepted": outcome.succeeded,
            "skipped": outcome.skipped,
            "failed": outcome.failed,
        });
        self.bus
            .publish(
                topics::MATCHINGS_PROCESS_COMPLETED,
                job_id,
                payload,
                CorrelationId::from_job(job_id),
            )
            .await?;

        Ok(())
    }

    /// Returns `Ok(true)` if a match was accepted and persisted,
    /// `Ok(false)` if no match cleared the acceptance rules (not an
    /// error — most pairs are rejects), `Err` only for a DB failure that
    /// survived retry.
    async fn match_product_video(
        &self,
        job_id: Uuid,
        product_id: &str,
        video_id: &str,
        top_k: u32,
    ) -> anyhow::Result<bool> {
        let images = self.features.product_images(product_id).await?;
        if images.is_empty() {
            return Ok(false);
        }

        let frames = self.features.video_frames(video_id).await?;
        if frames.is_empty() {
            return Ok(false);
        }

        let mut pairs = Vec::new();
        for image in &images {
            let candidates = self.features.retrieve_similar_frames(image, &frames, top_k).await?;
            for frame in &candidates {
                if let Some(pm) = self.score_pair(image, frame).await? {
                    pairs.push(pm);
                }
            }
        }

        let Some(verdict) = aggregate_matches(pairs, product_id.to_string(), video_id.to_string(), &self.config) else {
            return Ok(false);
        };

        self.persist_with_retry(job_id, &verdict).await?;

        let payload = json!({
            "job_id": job_id,
            "product_id": verdict.product_id,
            "video_id": verdict.video_id,
            "best_pair": {
                "img_id": verdict.best_img_id,
                "frame_id": verdict.best_frame_id,
                "score_pair": verdict.best_pair_score,
                "ts": verdict.best_ts,
            },
            "score": verdict.score,
        });
        self.bus
            .publish(topics::MATCH_RESULT, job_id, payload, CorrelationId::from_job(job_id))
            .await?;

        Ok(true)
    }

    /// Retrieval filter from spec §4.8: drop on `sim_deep < sim_deep_min`
    /// unconditionally, and on `sim_kp < inliers_min` only when keypoints
    /// were actually present (a fallback pair has no RANSAC ratio to
    /// compare against, so it's exempt from that half of the filter).
    async fn score_pair(&self, image: &ProductImage, frame: &VideoFrame) -> anyhow::Result<Option<PairMatch>> {
        let features = self.scorer.score_pair(image, frame).await?;
        if features.sim_deep < self.config.sim_deep_min {
            return Ok(None);
        }
        if !features.fallback && features.sim_kp < self.config.inliers_min {
            return Ok(None);
        }
        let score = pair_score(features);
        Ok(Some(PairMatch {
            img_id: image.img_id.clone(),
            frame_id: frame.frame_id.clone(),
            ts: frame.ts,
            pair_score: score,
        }))
    }

    async fn persist_with_retry(&self, job_id: Uuid, verdict: &crate::domain::MatchOutcome) -> anyhow::Result<()> {
        let mut attempt = 0;
        loop {
            match self.repo.upsert_match(job_id, verdict).await {
                Ok(()) => return Ok(()),
                Err(err) if attempt + 1 < PERSIST_MAX_ATTEMPTS => {
                    attempt += 1;
                    let delay = PERSIST_BASE_DELAY.saturating_mul(1 << attempt);
                    warn!(%job_id, attempt, error = %err, "retrying match persist");
                    sleep(delay).await;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MatchingConfig;
    use crate::domain::{ProductImage, VideoFrame};
    use pvm_testing::{InMemoryFeatureStore, InMemoryMatchRepository, RecordingEventBus, StubPairFeatureScorer};

    fn image(id: &str, emb: Vec<f32>, kp: Option<&str>) -> ProductImage {
        ProductImage { img_id: id.to_string(), emb_rgb: Some(emb), emb_gray: None, kp_blob_path: kp.map(String::from) }
    }

    fn frame(id: &str, ts: f64, emb: Vec<f32>, kp: Option<&str>) -> VideoFrame {
        VideoFrame { frame_id: id.to_string(), ts, emb_rgb: Some(emb), emb_gray: None, kp_blob_path: kp.map(String::from) }
    }

    #[tokio::test]
    async fn s5_acceptable_pair_is_persisted_and_emits_match_result() {
        let features = Arc::new(InMemoryFeatureStore::new());
        let job_id = Uuid::new_v4();
        // img_0 is orthogonal to every frame but frame_2 (cosine 0 for the
        // rest, filtered by sim_deep_min); img_1 is orthogonal to all of
        // them, so only (img_0, frame_2) ever enters aggregation.
        features.seed_product(
            job_id,
            "p1",
            vec![image("img_0", vec![1.0, 0.0, 0.0], Some("kp0")), image("img_1", vec![0.0, 0.0, 1.0], Some("kp1"))],
        );
        features.seed_video(
            job_id,
            "v1",
            (0..5)
                .map(|i| {
                    if i == 2 {
                        frame("frame_2", 2.0, vec![1.0, 0.0, 0.0], Some("kpf2"))
                    } else {
                        frame(&format!("frame_{i}"), i as f64, vec![0.0, 1.0, 0.0], Some(&format!("kpf{i}")))
                    }
                })
                .collect(),
        );

        let scorer = Arc::new(StubPairFeatureScorer::new(0.9, 0.9));
        let repo = Arc::new(InMemoryMatchRepository::new());
        let bus = Arc::new(RecordingEventBus::new());
        let engine = MatchingEngine::new(features, scorer, repo.clone(), bus.clone(), MatchingConfig::default());

        let envelope = EventEnvelope::new(topics::MATCH_REQUEST, job_id, json!({}));
        engine.handle_match_request(envelope).await.unwrap();

        let matches = repo.all();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].1.best_frame_id, "frame_2");
        assert!(matches[0].1.score >= 0.9);
        assert_eq!(bus.count_for_topic(topics::MATCH_RESULT), 1);
        let result = bus.published_to(topics::MATCH_RESULT).remove(0);
        assert_eq!(result.payload["best_pair"]["frame_id"], "frame_2");
        assert!(result.payload["score"].as_f64().unwrap() >= 0.9);
        assert_eq!(bus.count_for_topic(topics::MATCHINGS_PROCESS_COMPLETED), 1);
    }

    #[tokio::test]
    async fn pair_already_in_matches_is_skipped_and_not_rescored() {
        let features = Arc::new(InMemoryFeatureStore::new());
        let job_id = Uuid::new_v4();
        features.seed_product(
            job_id,
            "p1",
            vec![image("img_0", vec![1.0, 0.0, 0.0], Some("kp0"))],
        );
        features.seed_video(job_id, "v1", vec![frame("frame_0", 0.0, vec![1.0, 0.0, 0.0], Some("kpf0"))]);

        let scorer = Arc::new(StubPairFeatureScorer::new(0.9, 0.9));
        let repo = Arc::new(InMemoryMatchRepository::new());
        repo.upsert_match(
            job_id,
            &crate::domain::MatchOutcome {
                product_id: "p1".into(),
                video_id: "v1".into(),
                best_img_id: "img_0".into(),
                best_frame_id: "frame_0".into(),
                best_ts: 0.0,
                score: 0.9,
                best_pair_score: 0.9,
                consistency: 1,
                total_pairs: 1,
            },
        )
        .await
        .unwrap();

        let bus = Arc::new(RecordingEventBus::new());
        let engine = MatchingEngine::new(features, scorer, repo.clone(), bus.clone(), MatchingConfig::default());

        let envelope = EventEnvelope::new(topics::MATCH_REQUEST, job_id, json!({}));
        engine.handle_match_request(envelope).await.unwrap();

        // still just the one pre-seeded match, never rescored or re-published
        assert_eq!(repo.all().len(), 1);
        assert_eq!(bus.count_for_topic(topics::MATCH_RESULT), 0);
        assert_eq!(bus.count_for_topic(topics::MATCHINGS_PROCESS_COMPLETED), 1);
    }

    #[tokio::test]
    async fn s6_no_acceptable_matches_still_emits_one_completion() {
        let features = Arc::new(InMemoryFeatureStore::new());
        let job_id = Uuid::new_v4();
        features.seed_product(job_id, "p1", vec![image("img_0", vec![1.0, 0.0], Some("kp0"))]);
        features.seed_video(job_id, "v1", vec![frame("frame_0", 0.0, vec![0.0, 1.0], Some("kpf0"))]);

        let scorer = Arc::new(StubPairFeatureScorer::new(0.1, 0.1));
        let repo = Arc::new(InMemoryMatchRepository::new());
        let bus = Arc::new(RecordingEventBus::new());
        let engine = MatchingEngine::new(features, scorer, repo.clone(), bus.clone(), MatchingConfig::default());

        let envelope = EventEnvelope::new(topics::MATCH_REQUEST, job_id, json!({}));
        engine.handle_match_request(envelope).await.unwrap();

        assert!(repo.all().is_empty());
        assert_eq!(bus.count_for_topic(topics::MATCHINGS_PROCESS_COMPLETED), 1);
    }

    #[tokio::test]
    async fn missing_keypoint_blob_falls_back_to_sim_deep_and_skips_inliers_filter() {
        let features = Arc::new(InMemoryFeatureStore::new());
        let job_id = Uuid::new_v4();
        // Neither image nor frame carries a keypoint blob: both pairs score via
        // fallback (sim_kp = sim_deep, sim_edge = 0), never touching the
        // stub's configured sim_kp/sim_edge, and are exempt from inliers_min.
        features.seed_product(
            job_id,
            "p1",
            vec![image("img_0", vec![1.0, 0.0], None), image("img_1", vec![1.0, 0.0], None)],
        );
        features.seed_video(job_id, "v1", vec![frame("frame_0", 0.0, vec![1.0, 0.0], None)]);

        let scorer = Arc::new(StubPairFeatureScorer::new(0.0, 0.0));
        let repo = Arc::new(InMemoryMatchRepository::new());
        let bus = Arc::new(RecordingEventBus::new());
        let engine = MatchingEngine::new(features, scorer, repo.clone(), bus.clone(), MatchingConfig::default());

        let envelope = EventEnvelope::new(topics::MATCH_REQUEST, job_id, json!({}));
        engine.handle_match_request(envelope).await.unwrap();

        // Each fallback pair scores 0.35 + 0.55 = 0.90 (sim_edge contributes
        // nothing under fallback); two distinct images clear both the
        // consistency (>=2 @ >=0.80) and coverage bonus conditions.
        let matches = repo.all();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].1.consistency, 2);
        assert!((matches[0].1.score - 0.92).abs() < 1e-9);
    }
}
