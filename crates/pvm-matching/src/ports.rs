//! Ports the matching engine depends on. `pvm-ledger-postgres` provides
//! the production implementations (pgvector ANN retrieval, Postgres
//! upserts); `pvm-testing` provides in-memory ones for unit tests.

use crate::domain::{MatchOutcome, ProductId, ProductImage, VideoFrame, VideoId};
use async_trait::async_trait;

/// C8's read side: product/video membership for a job, and each side's
/// feature rows.
#[async_trait]
pub trait FeatureStoreReadModel: Send + Sync {
    async fn products_for_job(&self, job_id: uuid::Uuid) -> anyhow::Result<Vec<ProductId>>;

    async fn videos_for_job(&self, job_id: uuid::Uuid) -> anyhow::Result<Vec<VideoId>>;

    /// Rows with a non-null `emb_rgb`, matching the original matcher's
    /// `WHERE emb_rgb IS NOT NULL` — images still awaiting feature
    /// extraction are simply absent rather than returned with nulls.
    async fn product_images(&self, product_id: &str) -> anyhow::Result<Vec<ProductImage>>;

    /// Ordered by `ts` ascending.
    async fn video_frames(&self, video_id: &str) -> anyhow::Result<Vec<VideoFrame>>;

    /// ANN retrieval: the `top_k` frames from `frames` most similar to
    /// `image` by cosine distance on `emb_rgb` (pgvector `<=>` in the
    /// Postgres implementation). Frames without an embedding are dropped
    /// rather than ranked, since cosine distance against a null vector is
    /// meaningless; if `image` itself has no embedding, implementations
    /// fall back to returning the first `top_k` frames unranked, matching
    /// the original matcher's degraded-input behavior.
    async fn retrieve_similar_frames(
        &self,
        image: &ProductImage,
        frames: &[VideoFrame],
        top_k: u32,
    ) -> anyhow::Result<Vec<VideoFrame>>;

    /// Raw bytes of a keypoint blob at `path` (spec §4.9). Exists for
    /// callers outside the pre-scored `pair_features` path — the scorer
    /// this crate ships against sources `sim_kp` from that table instead
    /// of loading blobs directly.
    async fn get_keypoint_blob(&self, path: &str) -> anyhow::Result<Vec<u8>>;
}

/// The externally-computed similarity components for one image-frame
/// pair. Keypoint and edge similarity are sourced from a sidecar feature
/// pipeline (AKAZE/SIFT descriptors plus RANSAC inlier counting) that
/// this crate treats as an opaque, already-scored input — it never
/// touches image bytes or keypoint blobs itself.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PairFeatures {
    pub sim_deep: f64,
    pub sim_kp: f64,
    pub sim_edge: f64,
    /// Set when either side's keypoint blob is missing and `sim_kp` was
    /// substituted with `sim_deep` rather than measured (spec §4.8). The
    /// engine's retrieval filter skips the `inliers_min` check on a
    /// fallback pair — there is no RANSAC inlier ratio to compare against.
    pub fallback: bool,
}

#[async_trait]
pub trait PairFeatureScorer: Send + Sync {
    /// When a keypoint blob is missing on either side, implementations
    /// substitute `sim_kp = sim_deep` and set `fallback = true` (spec
    /// §4.8) rather than applying `inliers_min` themselves — that filter
    /// is the engine's job, since a fallback pair is exempt from it.
    async fn score_pair(&self, image: &ProductImage, frame: &VideoFrame) -> anyhow::Result<PairFeatures>;
}

/// C8's write side: persisting accepted (product, video) verdicts.
#[async_trait]
pub trait MatchRepository: Send + Sync {
    /// Upsert keyed on `(job_id, product_id, video_id)` — a retried
    /// match request must not create duplicate rows.
    async fn upsert_match(&self, job_id: uuid::Uuid, outcome: &MatchOutcome) -> anyhow::Result<()>;

    /// Accepted match count for a job, read by `pvm-service::status`'s
    /// count aggregation.
    async fn count_matches(&self, job_id: uuid::Uuid) -> anyhow::Result<i64>;

    /// `(product_id, video_id)` pairs already persisted for this job
    /// (spec §4.8 step 2: "for each pair not already in `matches`"). The
    /// engine skips these rather than re-scoring them on every
    /// `match.request`.
    async fn existing_pairs(&self, job_id: uuid::Uuid) -> anyhow::Result<std::collections::HashSet<(ProductId, VideoId)>>;
}
