//! In-memory `pvm-matching` port implementations.

use async_trait::async_trait;
use dashmap::DashMap;
use pvm_matching::ports::{FeatureStoreReadModel, MatchRepository, PairFeatureScorer, PairFeatures};
use pvm_matching::scoring::cosine_similarity;
use pvm_matching::{MatchOutcome, ProductImage, VideoFrame};
use std::sync::Mutex;
use uuid::Uuid;

#[derive(Default)]
pub struct InMemoryFeatureStore {
    products_by_job: DashMap<Uuid, Vec<String>>,
    videos_by_job: DashMap<Uuid, Vec<String>>,
    images_by_product: DashMap<String, Vec<ProductImage>>,
    frames_by_video: DashMap<String, Vec<VideoFrame>>,
}

impl InMemoryFeatureStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed_product(&self, job_id: Uuid, product_id: impl Into<String>, images: Vec<ProductImage>) {
        let product_id = product_id.into();
        self.products_by_job.entry(job_id).or_default().push(product_id.clone());
        self.images_by_product.insert(product_id, images);
    }

    pub fn seed_video(&self, job_id: Uuid, video_id: impl Into<String>, frames: Vec<VideoFrame>) {
        let video_id = video_id.into();
        self.videos_by_job.entry(job_id).or_default().push(video_id.clone());
        self.frames_by_video.insert(video_id, frames);
    }
}

#[async_trait]
impl FeatureStoreReadModel for InMemoryFeatureStore {
    async fn products_for_job(&self, job_id: Uuid) -> anyhow::Result<Vec<String>> {
        Ok(self.products_by_job.get(&job_id).map(|v| v.clone()).unwrap_or_default())
    }

    async fn videos_for_job(&self, job_id: Uuid) -> anyhow::Result<Vec<String>> {
        Ok(self.videos_by_job.get(&job_id).map(|v| v.clone()).unwrap_or_default())
    }

    async fn product_images(&self, product_id: &str) -> anyhow::Result<Vec<ProductImage>> {
        Ok(self.images_by_product.get(product_id).map(|v| v.clone()).unwrap_or_default())
    }

    async fn video_frames(&self, video_id: &str) -> anyhow::Result<Vec<VideoFrame>> {
        Ok(self.frames_by_video.get(video_id).map(|v| v.clone()).unwrap_or_default())
    }

    async fn retrieve_similar_frames(
        &self,
        image: &ProductImage,
        frames: &[VideoFrame],
        top_k: u32,
    ) -> anyhow::Result<Vec<VideoFrame>> {
        let Some(emb) = &image.emb_rgb else {
            return Ok(frames.iter().take(top_k as usize).cloned().collect());
        };

        let mut ranked: Vec<(f64, &VideoFrame)> = frames
            .iter()
            .filter_map(|f| f.emb_rgb.as_ref().map(|fe| (cosine_similarity(emb, fe), f)))
            .collect();
        ranked.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        Ok(ranked.into_iter().take(top_k as usize).map(|(_, f)| f.clone()).collect())
    }

    async fn get_keypoint_blob(&self, path: &str) -> anyhow::Result<Vec<u8>> {
        Ok(path.as_bytes().to_vec())
    }
}

/// Deterministic scorer for tests: `sim_deep` is real cosine similarity;
/// `sim_kp`/`sim_edge` are fixed values supplied at construction, so
/// tests can exercise both acceptance and rejection paths without
/// depending on an external keypoint matcher.
pub struct StubPairFeatureScorer {
    pub sim_kp: f64,
    pub sim_edge: f64,
}

impl StubPairFeatureScorer {
    pub fn new(sim_kp: f64, sim_edge: f64) -> Self {
        Self { sim_kp, sim_edge }
    }
}

#[async_trait]
impl PairFeatureScorer for StubPairFeatureScorer {
    async fn score_pair(&self, image: &ProductImage, frame: &VideoFrame) -> anyhow::Result<PairFeatures> {
        let sim_deep = match (&image.emb_rgb, &frame.emb_rgb) {
            (Some(a), Some(b)) => cosine_similarity(a, b),
            _ => 0.0,
        };
        if image.kp_blob_path.is_none() || frame.kp_blob_path.is_none() {
            return Ok(PairFeatures { sim_deep, sim_kp: sim_deep, sim_edge: 0.0, fallback: true });
        }
        Ok(PairFeatures { sim_deep, sim_kp: self.sim_kp, sim_edge: self.sim_edge, fallback: false })
    }
}

#[derive(Default)]
pub struct InMemoryMatchRepository {
    matches: Mutex<Vec<(Uuid, MatchOutcome)>>,
}

impl InMemoryMatchRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all(&self) -> Vec<(Uuid, MatchOutcome)> {
        self.matches.lock().unwrap().clone()
    }
}

#[async_trait]
impl MatchRepository for InMemoryMatchRepository {
    async fn upsert_match(&self, job_id: Uuid, outcome: &MatchOutcome) -> anyhow::Result<()> {
        let mut matches = self.matches.lock().unwrap();
        matches.retain(|(j, m)| !(*j == job_id && m.product_id == outcome.product_id && m.video_id == outcome.video_id));
        matches.push((job_id, outcome.clone()));
        Ok(())
    }

    async fn count_matches(&self, job_id: Uuid) -> anyhow::Result<i64> {
        Ok(self.matches.lock().unwrap().iter().filter(|(j, _)| *j == job_id).count() as i64)
    }

    async fn existing_pairs(&self, job_id: Uuid) -> anyhow::Result<std::collections::HashSet<(String, String)>> {
        Ok(self
            .matches
            .lock()
            .unwrap()
            .iter()
            .filter(|(j, _)| *j == job_id)
            .map(|(_, m)| (m.product_id.clone(), m.video_id.clone()))
            .collect())
    }
}
