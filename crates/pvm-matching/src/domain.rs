//! Matching-engine domain types (spec §3, §4.7/§4.8).

use serde::{Deserialize, Serialize};

pub type ProductId = String;
pub type VideoId = String;

/// A product image row with whatever precomputed features it has.
/// `emb_rgb`/`emb_gray` absent means the feature-extraction pipeline
/// hasn't produced embeddings for this image yet — callers skip it rather
/// than erroring (spec §4.8: "skip on missing embeddings").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductImage {
    pub img_id: String,
    pub emb_rgb: Option<Vec<f32>>,
    pub emb_gray: Option<Vec<f32>>,
    pub kp_blob_path: Option<String>,
}

/// A video keyframe row, ordered by `ts` when read from storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoFrame {
    pub frame_id: String,
    pub ts: f64,
    pub emb_rgb: Option<Vec<f32>>,
    pub emb_gray: Option<Vec<f32>>,
    pub kp_blob_path: Option<String>,
}

/// One image-frame pair that cleared the retrieval filter, before
/// product-video aggregation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairMatch {
    pub img_id: String,
    pub frame_id: String,
    pub ts: f64,
    pub pair_score: f64,
}

/// The accepted verdict for one (product, video) pair, ready to persist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchOutcome {
    pub product_id: ProductId,
    pub video_id: VideoId,
    pub best_img_id: String,
    pub best_frame_id: String,
    pub best_ts: f64,
    pub score: f64,
    pub best_pair_score: f64,
    pub consistency: u32,
    pub total_pairs: u32,
}
