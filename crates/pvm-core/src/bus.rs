//! C1 — the event bus adapter: typed publish/consume over a topic-routed
//! broker, with correlation-id propagation and a DLQ escape hatch.
//!
//! This generalizes the teacher's in-memory `EventBus` (at-most-once,
//! `tokio::sync::broadcast`, "no replay") into the shape this domain needs:
//! at-least-once delivery across process boundaries, because workers here
//! are separate services publishing from collectors, feature extractors and
//! the matcher, not in-process tasks. The teacher's guarantee that "lagged
//! receivers get errors" is the wrong guarantee for a job orchestrator — an
//! event that arrives after a slow consumer must still be delivered, not
//! dropped — so this trait is a redesign of the concept rather than a reuse
//! of the implementation.

use crate::core::{CorrelationId, EventEnvelope};
use crate::error::OrchestratorError;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Handles one delivered message. Any `Err` triggers the bus's retry path;
/// the message is only acknowledged once this returns `Ok`.
#[async_trait]
pub trait TopicHandler: Send + Sync {
    async fn handle(&self, envelope: EventEnvelope) -> Result<(), OrchestratorError>;
}

/// Retry-with-backoff policy applied before a message is routed to the DLQ.
/// Defaults match spec §4.1/§6: 5 attempts, exponential backoff.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exp = self.base_delay.saturating_mul(1u32 << attempt.min(16));
        exp.min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(30),
        }
    }
}

/// A typed publish/consume surface over a topic-routed broker.
///
/// Implementations are expected to:
/// - deliver at-least-once, acknowledging only after the handler returns
///   success;
/// - propagate `correlation_id` as a header available to handlers;
/// - route messages exceeding `RetryPolicy::max_attempts` to a
///   `<topic>.dlq` topic instead of retrying indefinitely;
/// - bound concurrent in-flight handlers per subscription (spec §5:
///   default prefetch 32).
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Publish `payload` on `topic` for job `job_id`, returning the
    /// generated `event_id`. Re-publishing the same logical event (e.g. a
    /// retry at a higher level) should pass the original `event_id`
    /// through `publish_with_id` so downstream dedup via the ledger works.
    async fn publish(
        &self,
        topic: &str,
        job_id: Uuid,
        payload: serde_json::Value,
        correlation_id: CorrelationId,
    ) -> Result<Uuid, OrchestratorError> {
        let envelope = EventEnvelope::new(topic, job_id, payload).with_correlation(correlation_id);
        let event_id = envelope.event_id;
        self.publish_envelope(envelope).await?;
        Ok(event_id)
    }

    /// Publish a fully-formed envelope, preserving its `event_id` — used
    /// when re-publishing a logical event that must dedup identically on
    /// the receiving side.
    async fn publish_envelope(&self, envelope: EventEnvelope) -> Result<(), OrchestratorError>;

    /// Register `handler` for all messages delivered on `topic`. May be
    /// called multiple times for distinct topics; each gets its own bounded
    /// worker pool per spec §5.
    async fn subscribe(
        &self,
        topic: &str,
        handler: Arc<dyn TopicHandler>,
        prefetch: u32,
    ) -> Result<(), OrchestratorError>;
}
