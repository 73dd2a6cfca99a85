//! Computes the three similarity components `pvm_matching::scoring::pair_score`
//! combines. `sim_deep` is plain cosine similarity over embeddings already
//! loaded on the passed-in rows. `sim_kp`/`sim_edge` come from the
//! `pair_features` table, populated by an out-of-scope keypoint/edge
//! feature worker that scores pairs once both sides have a keypoint blob —
//! if that worker hasn't scored this pair yet, `sim_kp`/`sim_edge` default
//! to zero, which the engine's `inliers_min` filter then naturally drops
//! until a score lands. If either side has no keypoint blob at all (never
//! will be scored), spec §4.8's fallback applies instead: `sim_kp` is
//! substituted with `sim_deep` and the pair is marked `fallback` so the
//! engine skips the `inliers_min` check for it.

use async_trait::async_trait;
use pvm_matching::ports::{PairFeatureScorer, PairFeatures};
use pvm_matching::scoring::cosine_similarity;
use pvm_matching::{ProductImage, VideoFrame};
use sqlx::{PgPool, Row};

#[derive(Clone)]
pub struct PgPairFeatureScorer {
    pool: PgPool,
}

impl PgPairFeatureScorer {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PairFeatureScorer for PgPairFeatureScorer {
    async fn score_pair(&self, image: &ProductImage, frame: &VideoFrame) -> anyhow::Result<PairFeatures> {
        let sim_deep = match (&image.emb_rgb, &frame.emb_rgb) {
            (Some(a), Some(b)) => cosine_similarity(a, b),
            _ => 0.0,
        };

        if image.kp_blob_path.is_none() || frame.kp_blob_path.is_none() {
            return Ok(PairFeatures { sim_deep, sim_kp: sim_deep, sim_edge: 0.0, fallback: true });
        }

        let row = sqlx::query("SELECT inlier_ratio, edge_similarity FROM pair_features WHERE img_id = $1 AND frame_id = $2")
            .bind(&image.img_id)
            .bind(&frame.frame_id)
            .fetch_optional(&self.pool)
            .await?;

        let (sim_kp, sim_edge) = match row {
            Some(row) => (row.get::<f64, _>("inlier_ratio"), row.get::<f64, _>("edge_similarity")),
            None => (0.0, 0.0),
        };

        Ok(PairFeatures { sim_deep, sim_kp, sim_edge, fallback: false })
    }
}
