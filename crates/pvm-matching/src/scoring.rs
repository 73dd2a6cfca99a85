//! Pure scoring functions, no IO. Weights and thresholds are grounded in
//! the original matcher's `calculate_pair_score`/`aggregate_matches`.

use crate::config::MatchingConfig;
use crate::domain::{MatchOutcome, PairMatch, ProductId, VideoId};
use crate::ports::PairFeatures;

const EMBEDDING_WEIGHT: f64 = 0.35;
const KEYPOINT_WEIGHT: f64 = 0.55;
const EDGE_WEIGHT: f64 = 0.10;

/// A consistency pair must clear this fixed bar, independent of the
/// configurable `sim_deep_min` retrieval filter. The original matcher
/// hardcodes 0.80 here rather than referencing `match_accept`, even
/// though both default to the same value — kept as two separate
/// constants/config knobs so changing one doesn't silently change the
/// other.
const CONSISTENCY_PAIR_SCORE_MIN: f64 = 0.80;

const CONSISTENCY_BONUS_THRESHOLD: u32 = 3;
const CONSISTENCY_BONUS: f64 = 0.02;
const COVERAGE_BONUS_MIN_IMAGES: usize = 2;
const COVERAGE_BONUS: f64 = 0.02;

/// The weighted combination the original matcher calls `pair_score`.
pub fn pair_score(features: PairFeatures) -> f64 {
    EMBEDDING_WEIGHT * features.sim_deep + KEYPOINT_WEIGHT * features.sim_kp + EDGE_WEIGHT * features.sim_edge
}

/// Cosine similarity between two embedding vectors, clamped to `[0, 1]`
/// (the original matcher discards the sign rather than allowing negative
/// similarity through). Returns `0.0` for mismatched or zero-length
/// vectors rather than panicking — both are data errors, not crashes.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f64 = a.iter().zip(b).map(|(x, y)| *x as f64 * *y as f64).sum();
    let norm_a: f64 = a.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
    let norm_b: f64 = b.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    (dot / (norm_a * norm_b)).clamp(0.0, 1.0)
}

/// Aggregate every pair that cleared the retrieval filter (spec §4.8) up
/// to a single product-video verdict, or `None` if the acceptance rules
/// reject it. Pairs are deterministically ordered best-first: pair score
/// descending, then earliest frame timestamp, then lexicographically
/// smallest image id — so a tie between two equally-scored candidates
/// always resolves the same way regardless of arrival order.
pub fn aggregate_matches(
    mut pairs: Vec<PairMatch>,
    product_id: ProductId,
    video_id: VideoId,
    config: &MatchingConfig,
) -> Option<MatchOutcome> {
    if pairs.is_empty() {
        return None;
    }

    pairs.sort_by(|a, b| {
        b.pair_score
            .partial_cmp(&a.pair_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.ts.partial_cmp(&b.ts).unwrap_or(std::cmp::Ordering::Equal))
            .then_with(|| a.img_id.cmp(&b.img_id))
    });

    let best = pairs[0].clone();
    let best_score = best.pair_score;

    let consistency = pairs.iter().filter(|p| p.pair_score >= CONSISTENCY_PAIR_SCORE_MIN).count() as u32;

    let accepted = (best_score >= config.match_best_min && consistency >= config.match_cons_min)
        || best_score >= config.match_high_confidence;
    if !accepted {
        return None;
    }

    let mut final_score = best_score;
    if consistency >= CONSISTENCY_BONUS_THRESHOLD {
        final_score += CONSISTENCY_BONUS;
    }
    let distinct_images = pairs.iter().map(|p| p.img_id.as_str()).collect::<std::collections::HashSet<_>>().len();
    if distinct_images >= COVERAGE_BONUS_MIN_IMAGES {
        final_score += COVERAGE_BONUS;
    }
    final_score = final_score.min(1.0);

    if final_score < config.match_accept {
        return None;
    }

    Some(MatchOutcome {
        product_id,
        video_id,
        best_img_id: best.img_id,
        best_frame_id: best.frame_id,
        best_ts: best.ts,
        score: final_score,
        best_pair_score: best_score,
        consistency,
        total_pairs: pairs.len() as u32,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> MatchingConfig {
        MatchingConfig::default()
    }

    fn pair(img_id: &str, ts: f64, score: f64) -> PairMatch {
        PairMatch {
            img_id: img_id.to_string(),
            frame_id: format!("frame-{ts}"),
            ts,
            pair_score: score,
        }
    }

    #[test]
    fn cosine_similarity_identical_vectors_is_one() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_similarity_mismatched_lengths_is_zero() {
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
    }

    #[test]
    fn pair_score_applies_documented_weights() {
        let score = pair_score(PairFeatures { sim_deep: 1.0, sim_kp: 1.0, sim_edge: 1.0, fallback: false });
        assert!((score - 1.0).abs() < 1e-9);

        let score = pair_score(PairFeatures { sim_deep: 1.0, sim_kp: 0.0, sim_edge: 0.0, fallback: false });
        assert!((score - 0.35).abs() < 1e-9);
    }

    #[test]
    fn empty_pairs_never_match() {
        assert_eq!(aggregate_matches(vec![], "p1".into(), "v1".into(), &cfg()), None);
    }

    #[test]
    fn accepts_on_best_min_and_consistency() {
        let pairs = vec![pair("img1", 1.0, 0.90), pair("img2", 2.0, 0.85), pair("img1", 3.0, 0.40)];
        let outcome = aggregate_matches(pairs, "p1".into(), "v1".into(), &cfg()).unwrap();
        assert_eq!(outcome.consistency, 2);
        assert!(outcome.score >= cfg().match_accept);
    }

    #[test]
    fn accepts_on_high_confidence_alone() {
        let pairs = vec![pair("img1", 1.0, 0.95)];
        let outcome = aggregate_matches(pairs, "p1".into(), "v1".into(), &cfg()).unwrap();
        assert_eq!(outcome.consistency, 1);
    }

    #[test]
    fn rejects_below_both_rules() {
        let pairs = vec![pair("img1", 1.0, 0.85)];
        assert_eq!(aggregate_matches(pairs, "p1".into(), "v1".into(), &cfg()), None);
    }

    #[test]
    fn bonuses_apply_for_strong_consistency_and_coverage() {
        let pairs = vec![
            pair("img1", 1.0, 0.90),
            pair("img2", 2.0, 0.88),
            pair("img3", 3.0, 0.85),
        ];
        let outcome = aggregate_matches(pairs, "p1".into(), "v1".into(), &cfg()).unwrap();
        // best 0.90 + consistency bonus (3 pairs >= 0.80) + coverage bonus (3 distinct images)
        assert!((outcome.score - 0.94).abs() < 1e-9);
    }

    #[test]
    fn ties_break_by_earliest_ts_then_smallest_image_id() {
        let pairs = vec![
            pair("img2", 5.0, 0.90),
            pair("img1", 1.0, 0.90),
            pair("img1", 0.5, 0.90),
        ];
        let outcome = aggregate_matches(pairs, "p1".into(), "v1".into(), &cfg()).unwrap();
        assert_eq!(outcome.best_img_id, "img1");
        assert_eq!(outcome.best_ts, 0.5);
    }
}
