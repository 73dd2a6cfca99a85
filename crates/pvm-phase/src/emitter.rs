//! C7 — the completion emitter: the only component allowed to publish a
//! `*.completed` event for a feature-extraction asset counter. Everything
//! else that reacts to counter state reads it through [`crate::ports::AssetCounterPort`];
//! only this component is trusted to flip `completed_emitted` and publish
//! in the same breath, which is what makes the single-emission invariant
//! (spec §4.3, testable property #2) hold under concurrent delivery.

use crate::domain::{CounterKind, JobId};
use crate::ports::{AssetCounterPort, AssetCounterState};
use pvm_core::{CorrelationId, EventBus};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

pub struct CompletionEmitter<C: AssetCounterPort, B: EventBus> {
    counters: Arc<C>,
    bus: Arc<B>,
    watermark_ttl: Duration,
}

impl<C: AssetCounterPort, B: EventBus> CompletionEmitter<C, B> {
    pub fn new(counters: Arc<C>, bus: Arc<B>, watermark_ttl: Duration) -> Self {
        Self { counters, bus, watermark_ttl }
    }

    /// Exposed so callers that only hold a `CompletionEmitter` (e.g. the
    /// watermark scheduler) can fetch current counts before calling
    /// [`Self::try_emit`].
    pub fn counters(&self) -> &Arc<C> {
        &self.counters
    }

    /// Called after every [`AssetCounterPort::observe`]/`initialize` that
    /// leaves the counter terminal. Wins or loses the CAS race with any
    /// duplicate delivery of the same triggering event; only the winner
    /// publishes. `state` carries the counts at the moment of the call
    /// that triggered this (spec §4.7's `{total_assets, processed_assets,
    /// failed_assets, has_partial_completion}`).
    pub async fn try_emit(&self, job_id: JobId, kind: CounterKind, state: AssetCounterState) -> anyhow::Result<bool> {
        let Some(topic) = kind.completion_topic() else {
            return Ok(false);
        };

        let won = self.counters.set_completed(job_id, kind).await?;
        if !won {
            return Ok(false);
        }

        let now = chrono::Utc::now();
        let payload = json!({
            "job_id": job_id,
            "asset_type": kind.as_key(),
            "total_assets": state.expected,
            "processed_assets": state.processed,
            "failed_assets": state.failed,
            "has_partial_completion": state.has_partial_completion(now),
            "watermark_ttl": self.watermark_ttl.as_secs(),
        });
        self.bus
            .publish(topic, job_id, payload, CorrelationId::from_job(job_id))
            .await?;

        info!(%job_id, asset_type = kind.as_key(), topic, "emitted completion event");
        Ok(true)
    }
}
