//! C4 — the phase event service: the single entry point every phase-
//! relevant topic is routed through. Ties the ports (C2 ledger, C3
//! counters, C6 job record) and C5's pure `decide` together behind
//! `handle(envelope)`, following the four-step contract of spec §4.4:
//! validate, dedup, interpret by event role, apply + publish.
//!
//! Design note (spec §9): dispatch on event role is a static match over
//! topic strings rather than dynamic trait-object dispatch — every topic
//! this service understands is known at compile time.

use crate::domain::{CounterKind, Job, JobId, LedgerSnapshot, Modality, Stage};
use crate::emitter::CompletionEmitter;
use crate::ports::{AssetCounterPort, AssetCounterState, EventLedgerPort, JobRecordPort};
use crate::topics::{self, classify};
use crate::transition::{self, Emission};
use pvm_core::{CorrelationId, EventBus, EventEnvelope, EventRole, OrchestratorError};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// The decoded shape of an incoming envelope, resolved from its topic.
/// Sealed to this crate's known topic set — an unrecognized topic never
/// reaches this enum (see [`PhaseEventService::handle`]'s early return).
#[derive(Debug, Clone)]
pub enum PhaseEvent {
    AssetProgress { kind: CounterKind },
    BatchAnnouncement { kind: CounterKind, expected: i64 },
    PhaseCompletion,
    Failure,
}

fn decode(topic: &str) -> Option<PhaseEvent> {
    use topics::*;
    let role = classify(topic)?;
    Some(match (role, topic) {
        (EventRole::AssetProgress, PRODUCTS_IMAGE_READY) => PhaseEvent::AssetProgress {
            kind: CounterKind::new(Modality::Image, Stage::Collect),
        },
        (EventRole::AssetProgress, VIDEO_KEYFRAMES_READY) => PhaseEvent::AssetProgress {
            kind: CounterKind::new(Modality::Video, Stage::Collect),
        },
        (EventRole::AssetProgress, IMAGE_EMBEDDING_READY) => PhaseEvent::AssetProgress {
            kind: CounterKind::new(Modality::Image, Stage::Embedding),
        },
        (EventRole::AssetProgress, IMAGE_KEYPOINT_READY) => PhaseEvent::AssetProgress {
            kind: CounterKind::new(Modality::Image, Stage::Keypoint),
        },
        (EventRole::AssetProgress, VIDEO_EMBEDDING_READY) => PhaseEvent::AssetProgress {
            kind: CounterKind::new(Modality::Video, Stage::Embedding),
        },
        (EventRole::AssetProgress, VIDEO_KEYPOINT_READY) => PhaseEvent::AssetProgress {
            kind: CounterKind::new(Modality::Video, Stage::Keypoint),
        },
        (EventRole::BatchAnnouncement, _) => return None, // decoded separately, needs the payload
        (EventRole::PhaseCompletion, _) => PhaseEvent::PhaseCompletion,
        (EventRole::Failure, _) => PhaseEvent::Failure,
        _ => return None,
    })
}

fn batch_announcement_kind(topic: &str) -> Option<CounterKind> {
    match topic {
        topics::PRODUCTS_IMAGES_READY_BATCH => Some(CounterKind::new(Modality::Image, Stage::Collect)),
        topics::VIDEO_KEYFRAMES_READY_BATCH => Some(CounterKind::new(Modality::Video, Stage::Collect)),
        _ => None,
    }
}

fn batch_expected_count(topic: &str, payload: &serde_json::Value) -> Result<i64, OrchestratorError> {
    let field = match topic {
        topics::PRODUCTS_IMAGES_READY_BATCH => "total_images",
        topics::VIDEO_KEYFRAMES_READY_BATCH => "total_keyframes",
        _ => return Err(OrchestratorError::Validation(format!("unrecognized batch topic: {topic}"))),
    };
    payload
        .get(field)
        .and_then(serde_json::Value::as_i64)
        .ok_or_else(|| OrchestratorError::Validation(format!("batch announcement missing integer `{field}`")))
}

pub struct PhaseServiceConfig {
    pub watermark_ttl: Duration,
    pub default_top_k: Option<u32>,
    /// Bounded retries against the `update_phase` CAS before giving up and
    /// surfacing a transient error for the bus to redeliver (spec §4.6).
    pub max_cas_attempts: u32,
}

impl Default for PhaseServiceConfig {
    fn default() -> Self {
        Self {
            watermark_ttl: Duration::from_secs(300),
            default_top_k: None,
            max_cas_attempts: 3,
        }
    }
}

pub struct PhaseEventService<L, C, J, B>
where
    L: EventLedgerPort,
    C: AssetCounterPort,
    J: JobRecordPort,
    B: EventBus,
{
    ledger: Arc<L>,
    counters: Arc<C>,
    jobs: Arc<J>,
    bus: Arc<B>,
    emitter: CompletionEmitter<C, B>,
    config: PhaseServiceConfig,
}

impl<L, C, J, B> PhaseEventService<L, C, J, B>
where
    L: EventLedgerPort,
    C: AssetCounterPort,
    J: JobRecordPort,
    B: EventBus,
{
    pub fn new(ledger: Arc<L>, counters: Arc<C>, jobs: Arc<J>, bus: Arc<B>, config: PhaseServiceConfig) -> Self {
        let emitter = CompletionEmitter::new(counters.clone(), bus.clone(), config.watermark_ttl);
        Self {
            ledger,
            counters,
            jobs,
            bus,
            emitter,
            config,
        }
    }

    /// Step 1+2 of spec §4.4: structural validation, then dedup against the
    /// event ledger. `Ok(false)` means this `event_id` was already seen —
    /// the caller acks without doing anything further.
    async fn admit(&self, envelope: &EventEnvelope) -> Result<bool, OrchestratorError> {
        if envelope.topic.is_empty() {
            return Err(OrchestratorError::Validation("envelope missing topic".into()));
        }
        self.ledger
            .record(envelope.event_id, envelope.job_id, &envelope.topic)
            .await
            .map_err(OrchestratorError::Transient)
    }

    pub async fn handle(&self, envelope: EventEnvelope) -> Result<(), OrchestratorError> {
        let job_id = envelope.job_id;

        if !self.admit(&envelope).await? {
            info!(%job_id, event_id = %envelope.event_id, topic = %envelope.topic, "duplicate event, acking no-op");
            return Ok(());
        }

        if let Some(kind) = batch_announcement_kind(&envelope.topic) {
            let expected = batch_expected_count(&envelope.topic, &envelope.payload)?;
            let state = self
                .counters
                .initialize(job_id, kind, expected, self.config.watermark_ttl)
                .await
                .map_err(OrchestratorError::Transient)?;
            return self.advance_from_terminal_counter(job_id, kind, state).await;
        }

        let decoded = decode(&envelope.topic)
            .ok_or_else(|| OrchestratorError::Validation(format!("unrecognized topic: {}", envelope.topic)))?;

        match decoded {
            PhaseEvent::AssetProgress { kind } => self.handle_asset_progress(job_id, kind).await,
            PhaseEvent::PhaseCompletion => self.handle_phase_completion(job_id, &envelope.topic).await,
            PhaseEvent::Failure => self.handle_failure(job_id).await,
            PhaseEvent::BatchAnnouncement { .. } => unreachable!("handled above via batch_announcement_kind"),
        }
    }

    async fn handle_asset_progress(&self, job_id: JobId, kind: CounterKind) -> Result<(), OrchestratorError> {
        let state = self
            .counters
            .observe(job_id, kind, 1, 0)
            .await
            .map_err(OrchestratorError::Transient)?;
        self.advance_from_terminal_counter(job_id, kind, state).await
    }

    /// Shared by a per-asset `observe` and a batch `initialize` (spec §4.3:
    /// an `expected=0` batch must seed siblings / emit completion exactly
    /// like a counter that closed out through per-asset progress). No-ops
    /// if `state` isn't terminal yet.
    async fn advance_from_terminal_counter(
        &self,
        job_id: JobId,
        kind: CounterKind,
        state: AssetCounterState,
    ) -> Result<(), OrchestratorError> {
        let now = chrono::Utc::now();
        if !state.is_terminal(now) {
            return Ok(());
        }

        if kind.stage == Stage::Collect {
            // Lazily seed the sibling feature-extraction counters now that
            // the collector's total is known (spec: no `*.ready.batch` for
            // embeddings/keypoints on the wire).
            for stage in [Stage::Embedding, Stage::Keypoint] {
                let sibling = CounterKind::new(kind.modality, stage);
                self.counters
                    .initialize(job_id, sibling, state.processed, self.config.watermark_ttl)
                    .await
                    .map_err(OrchestratorError::Transient)?;
            }
            return Ok(());
        }

        self.emitter
            .try_emit(job_id, kind, state)
            .await
            .map_err(OrchestratorError::Transient)?;
        Ok(())
    }

    async fn handle_phase_completion(&self, job_id: JobId, topic: &str) -> Result<(), OrchestratorError> {
        for attempt in 0..self.config.max_cas_attempts {
            let Some(job) = self.jobs.get(job_id).await.map_err(OrchestratorError::Transient)? else {
                return Err(OrchestratorError::Logical(format!("no job record for {job_id}")));
            };

            let names = self
                .jobs_ledger_view(job_id, topic)
                .await
                .map_err(OrchestratorError::Transient)?;
            let ledger = LedgerSnapshot::from_event_names(names);

            let decision = transition::decide(&job, &ledger, false, self.config.default_top_k);
            let Some(new_phase) = decision.new_phase else {
                return Ok(());
            };

            let applied = self
                .jobs
                .update_phase(job_id, job.phase, new_phase)
                .await
                .map_err(OrchestratorError::Transient)?;

            if applied {
                self.publish_emissions(job_id, decision.emit).await?;
                return Ok(());
            }

            warn!(%job_id, attempt, "phase CAS lost race, retrying");
        }

        Err(OrchestratorError::Transient(anyhow::anyhow!(
            "exhausted CAS attempts applying phase transition for job {job_id}"
        )))
    }

    async fn handle_failure(&self, job_id: JobId) -> Result<(), OrchestratorError> {
        let Some(job) = self.jobs.get(job_id).await.map_err(OrchestratorError::Transient)? else {
            return Err(OrchestratorError::Logical(format!("no job record for {job_id}")));
        };

        if job.phase.is_terminal() {
            return Ok(());
        }

        let ledger = LedgerSnapshot::new();
        let decision = transition::decide(&job, &ledger, true, None);
        if let Some(new_phase) = decision.new_phase {
            let applied = self
                .jobs
                .update_phase(job_id, job.phase, new_phase)
                .await
                .map_err(OrchestratorError::Transient)?;
            if applied {
                self.publish_emissions(job_id, decision.emit).await?;
            }
        }
        Ok(())
    }

    async fn publish_emissions(&self, job_id: JobId, emissions: Vec<Emission>) -> Result<(), OrchestratorError> {
        for emission in emissions {
            match emission {
                Emission::MatchRequest { top_k } => {
                    let payload = json!({ "job_id": job_id, "top_k": top_k });
                    self.bus
                        .publish(topics::MATCH_REQUEST, job_id, payload, CorrelationId::from_job(job_id))
                        .await?;
                }
                Emission::JobCompleted => {
                    let payload = json!({ "job_id": job_id });
                    self.bus
                        .publish(topics::JOB_COMPLETED, job_id, payload, CorrelationId::from_job(job_id))
                        .await?;
                }
                Emission::JobFailedDownstream { reason } => {
                    warn!(%job_id, reason, "job transitioned to failed");
                }
            }
        }
        Ok(())
    }

    /// The ledger view `decide` reasons over includes the event that just
    /// triggered this call, since `EventLedgerPort::record` already
    /// persisted it before `handle_phase_completion` runs.
    async fn jobs_ledger_view(&self, job_id: JobId, _topic: &str) -> anyhow::Result<Vec<String>> {
        self.ledger.event_names_for_job(job_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_known_asset_progress_topics() {
        assert!(matches!(
            decode(topics::PRODUCTS_IMAGE_READY),
            Some(PhaseEvent::AssetProgress { kind }) if kind == CounterKind::new(Modality::Image, Stage::Collect)
        ));
        assert!(matches!(decode(topics::JOB_FAILED), Some(PhaseEvent::Failure)));
        assert!(matches!(decode(topics::MATCHINGS_PROCESS_COMPLETED), Some(PhaseEvent::PhaseCompletion)));
    }

    #[test]
    fn batch_announcement_kind_maps_collect_counters() {
        assert_eq!(
            batch_announcement_kind(topics::PRODUCTS_IMAGES_READY_BATCH),
            Some(CounterKind::new(Modality::Image, Stage::Collect))
        );
        assert_eq!(batch_announcement_kind(topics::MATCH_REQUEST), None);
    }

    #[test]
    fn batch_expected_count_reads_per_topic_field() {
        assert_eq!(
            batch_expected_count(topics::PRODUCTS_IMAGES_READY_BATCH, &json!({ "total_images": 12 })).unwrap(),
            12
        );
        assert_eq!(
            batch_expected_count(topics::VIDEO_KEYFRAMES_READY_BATCH, &json!({ "total_keyframes": 5 })).unwrap(),
            5
        );
        assert!(batch_expected_count(topics::PRODUCTS_IMAGES_READY_BATCH, &json!({ "total_keyframes": 5 })).is_err());
        assert!(batch_expected_count(topics::PRODUCTS_IMAGES_READY_BATCH, &json!({})).is_err());
    }
}
