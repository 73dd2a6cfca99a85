//! Wire topic names (spec §6) and their classification into the four
//! event shapes the phase event service must interpret (spec §4.4).

use pvm_core::EventRole;

pub const PRODUCTS_IMAGE_READY: &str = "products.image.ready";
pub const PRODUCTS_IMAGES_READY_BATCH: &str = "products.images.ready.batch";
pub const VIDEO_KEYFRAMES_READY: &str = "video.keyframes.ready";
pub const VIDEO_KEYFRAMES_READY_BATCH: &str = "video.keyframes.ready.batch";

pub const IMAGE_EMBEDDING_READY: &str = "image.embedding.ready";
pub const IMAGE_KEYPOINT_READY: &str = "image.keypoint.ready";
pub const VIDEO_EMBEDDING_READY: &str = "video.embedding.ready";
pub const VIDEO_KEYPOINT_READY: &str = "video.keypoint.ready";

pub const IMAGE_EMBEDDINGS_COMPLETED: &str = "image.embeddings.completed";
pub const IMAGE_KEYPOINTS_COMPLETED: &str = "image.keypoints.completed";
pub const VIDEO_EMBEDDINGS_COMPLETED: &str = "video.embeddings.completed";
pub const VIDEO_KEYPOINTS_COMPLETED: &str = "video.keypoints.completed";

pub const PRODUCTS_COLLECTIONS_COMPLETED: &str = "products.collections.completed";
pub const VIDEOS_COLLECTIONS_COMPLETED: &str = "videos.collections.completed";
pub const MATCHINGS_PROCESS_COMPLETED: &str = "matchings.process.completed";
pub const EVIDENCES_GENERATION_COMPLETED: &str = "evidences.generation.completed";

pub const MATCH_REQUEST: &str = "match.request";
pub const JOB_FAILED: &str = "job.failed";
pub const JOB_COMPLETED: &str = "job.completed";

/// Classify a topic into the event role the phase event service dispatches
/// on (spec §4.4, step 3). Returns `None` for topics this service does not
/// interpret at all (e.g. `match.request` itself, which `pvm-matching`
/// consumes).
pub fn classify(topic: &str) -> Option<EventRole> {
    match topic {
        PRODUCTS_IMAGE_READY
        | VIDEO_KEYFRAMES_READY
        | IMAGE_EMBEDDING_READY
        | IMAGE_KEYPOINT_READY
        | VIDEO_EMBEDDING_READY
        | VIDEO_KEYPOINT_READY => Some(EventRole::AssetProgress),

        PRODUCTS_IMAGES_READY_BATCH | VIDEO_KEYFRAMES_READY_BATCH => Some(EventRole::BatchAnnouncement),

        PRODUCTS_COLLECTIONS_COMPLETED
        | VIDEOS_COLLECTIONS_COMPLETED
        | IMAGE_EMBEDDINGS_COMPLETED
        | IMAGE_KEYPOINTS_COMPLETED
        | VIDEO_EMBEDDINGS_COMPLETED
        | VIDEO_KEYPOINTS_COMPLETED
        | MATCHINGS_PROCESS_COMPLETED
        | EVIDENCES_GENERATION_COMPLETED => Some(EventRole::PhaseCompletion),

        JOB_FAILED => Some(EventRole::Failure),

        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_every_named_topic() {
        assert_eq!(classify(PRODUCTS_IMAGE_READY), Some(EventRole::AssetProgress));
        assert_eq!(classify(PRODUCTS_IMAGES_READY_BATCH), Some(EventRole::BatchAnnouncement));
        assert_eq!(classify(IMAGE_EMBEDDINGS_COMPLETED), Some(EventRole::PhaseCompletion));
        assert_eq!(classify(JOB_FAILED), Some(EventRole::Failure));
        assert_eq!(classify(MATCH_REQUEST), None);
    }
}
