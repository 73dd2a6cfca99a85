//! C5 — the phase transition manager: a pure function over `(job,
//! ledger)`. No IO, no async, no timers (those belong to C3's watermark).
//! Spec §4.5's transition table, verbatim.

use crate::domain::{AssetFlags, Job, LedgerSnapshot, Phase};
use crate::topics;

/// A side-effect the caller (C4, the phase event service) must publish if
/// a transition fires. Deliberately data-only — `decide` never touches an
/// event bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Emission {
    MatchRequest { top_k: Option<u32> },
    JobCompleted,
    JobFailedDownstream { reason: String },
}

/// The outcome of a single `decide` call: at most one phase change, plus
/// zero or more events to publish as a consequence of that change.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Decision {
    pub new_phase: Option<Phase>,
    pub emit: Vec<Emission>,
}

impl Decision {
    pub fn no_op() -> Self {
        Self::default()
    }

    fn to(phase: Phase) -> Self {
        Self {
            new_phase: Some(phase),
            emit: Vec::new(),
        }
    }

    fn to_with(phase: Phase, emit: Vec<Emission>) -> Self {
        Self {
            new_phase: Some(phase),
            emit,
        }
    }
}

fn required_feature_events(asset_flags: AssetFlags) -> Vec<&'static str> {
    let mut required = Vec::new();
    if asset_flags.has_images {
        required.push(topics::IMAGE_EMBEDDINGS_COMPLETED);
        required.push(topics::IMAGE_KEYPOINTS_COMPLETED);
    }
    if asset_flags.has_videos {
        required.push(topics::VIDEO_EMBEDDINGS_COMPLETED);
        required.push(topics::VIDEO_KEYPOINTS_COMPLETED);
    }
    required
}

/// Spec §4.5's transition table. `failed` is reachable from any
/// non-terminal phase via a `job.failed` signal, handled by the caller
/// passing `failed = true` rather than threading the failure reason
/// through the ledger (a failure is an out-of-band signal, not something
/// that accumulates in the completion ledger).
pub fn decide(job: &Job, ledger: &LedgerSnapshot, failed: bool, top_k: Option<u32>) -> Decision {
    if job.phase.is_terminal() {
        return Decision::no_op();
    }

    if failed {
        return Decision::to_with(
            Phase::Failed,
            vec![Emission::JobFailedDownstream {
                reason: "job.failed received".to_string(),
            }],
        );
    }

    match job.phase {
        Phase::Collection => {
            if ledger.contains_all(&[
                topics::PRODUCTS_COLLECTIONS_COMPLETED,
                topics::VIDEOS_COLLECTIONS_COMPLETED,
            ]) {
                Decision::to(Phase::FeatureExtraction)
            } else {
                Decision::no_op()
            }
        }

        Phase::FeatureExtraction => {
            if job.asset_flags.is_zero_asset() {
                return Decision::to_with(Phase::Matching, vec![Emission::MatchRequest { top_k }]);
            }

            let required = required_feature_events(job.asset_flags);
            if ledger.contains_all(&required) {
                Decision::to_with(Phase::Matching, vec![Emission::MatchRequest { top_k }])
            } else {
                Decision::no_op()
            }
        }

        Phase::Matching => {
            if ledger.contains(topics::MATCHINGS_PROCESS_COMPLETED) {
                Decision::to(Phase::Evidence)
            } else {
                Decision::no_op()
            }
        }

        Phase::Evidence => {
            if ledger.contains(topics::EVIDENCES_GENERATION_COMPLETED) {
                Decision::to_with(Phase::Completed, vec![Emission::JobCompleted])
            } else {
                Decision::no_op()
            }
        }

        Phase::Completed | Phase::Failed => Decision::no_op(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn job_in(phase: Phase, asset_flags: AssetFlags) -> Job {
        let mut job = Job::new(Uuid::new_v4(), "office_products", asset_flags);
        job.phase = phase;
        job
    }

    #[test]
    fn collection_waits_for_both_collector_completions() {
        let job = job_in(Phase::Collection, AssetFlags { has_images: true, has_videos: true });
        let mut ledger = LedgerSnapshot::new();
        assert_eq!(decide(&job, &ledger, false, None), Decision::no_op());

        ledger.insert(topics::PRODUCTS_COLLECTIONS_COMPLETED);
        assert_eq!(decide(&job, &ledger, false, None), Decision::no_op());

        ledger.insert(topics::VIDEOS_COLLECTIONS_COMPLETED);
        assert_eq!(decide(&job, &ledger, false, None).new_phase, Some(Phase::FeatureExtraction));
    }

    #[test]
    fn zero_asset_job_skips_straight_to_matching() {
        let job = job_in(Phase::FeatureExtraction, AssetFlags::none());
        let ledger = LedgerSnapshot::new();
        let decision = decide(&job, &ledger, false, Some(20));
        assert_eq!(decision.new_phase, Some(Phase::Matching));
        assert_eq!(decision.emit, vec![Emission::MatchRequest { top_k: Some(20) }]);
    }

    #[test]
    fn images_only_job_does_not_wait_on_video_events() {
        let job = job_in(Phase::FeatureExtraction, AssetFlags { has_images: true, has_videos: false });
        let mut ledger = LedgerSnapshot::new();
        ledger.insert(topics::IMAGE_EMBEDDINGS_COMPLETED);
        assert_eq!(decide(&job, &ledger, false, None), Decision::no_op());

        ledger.insert(topics::IMAGE_KEYPOINTS_COMPLETED);
        let decision = decide(&job, &ledger, false, None);
        assert_eq!(decision.new_phase, Some(Phase::Matching));
    }

    #[test]
    fn videos_only_job_does_not_wait_on_image_events() {
        let job = job_in(Phase::FeatureExtraction, AssetFlags { has_images: false, has_videos: true });
        let mut ledger = LedgerSnapshot::new();
        ledger.insert(topics::VIDEO_EMBEDDINGS_COMPLETED);
        ledger.insert(topics::VIDEO_KEYPOINTS_COMPLETED);
        let decision = decide(&job, &ledger, false, None);
        assert_eq!(decision.new_phase, Some(Phase::Matching));
    }

    #[test]
    fn matching_transitions_to_evidence_on_process_completed() {
        let job = job_in(Phase::Matching, AssetFlags::none());
        let mut ledger = LedgerSnapshot::new();
        assert_eq!(decide(&job, &ledger, false, None), Decision::no_op());

        ledger.insert(topics::MATCHINGS_PROCESS_COMPLETED);
        assert_eq!(decide(&job, &ledger, false, None).new_phase, Some(Phase::Evidence));
    }

    #[test]
    fn evidence_transitions_to_completed_and_emits_job_completed() {
        let job = job_in(Phase::Evidence, AssetFlags::none());
        let mut ledger = LedgerSnapshot::new();
        ledger.insert(topics::EVIDENCES_GENERATION_COMPLETED);
        let decision = decide(&job, &ledger, false, None);
        assert_eq!(decision.new_phase, Some(Phase::Completed));
        assert_eq!(decision.emit, vec![Emission::JobCompleted]);
    }

    #[test]
    fn job_failed_transitions_from_any_non_terminal_phase() {
        for phase in [Phase::Collection, Phase::FeatureExtraction, Phase::Matching, Phase::Evidence] {
            let job = job_in(phase, AssetFlags::none());
            let ledger = LedgerSnapshot::new();
            let decision = decide(&job, &ledger, true, None);
            assert_eq!(decision.new_phase, Some(Phase::Failed));
        }
    }

    #[test]
    fn terminal_phases_are_no_ops_even_on_failure_signal() {
        for phase in [Phase::Completed, Phase::Failed] {
            let job = job_in(phase, AssetFlags::none());
            let ledger = LedgerSnapshot::new();
            assert_eq!(decide(&job, &ledger, true, None), Decision::no_op());
        }
    }

    #[test]
    fn unrelated_completion_events_in_wrong_phase_are_no_ops() {
        // evidences.generation.completed arriving while still in collection.
        let job = job_in(Phase::Collection, AssetFlags::none());
        let mut ledger = LedgerSnapshot::new();
        ledger.insert(topics::EVIDENCES_GENERATION_COMPLETED);
        assert_eq!(decide(&job, &ledger, false, None), Decision::no_op());
    }
}
