//! Read-only event observation, independent of any machine's decisions.
//! Taps never influence behavior — they exist for metrics/logging hooks
//! that want to see every event without being in the decision path.

use crate::core::EventEnvelope;
use async_trait::async_trait;

/// Context passed to a tap: just enough to log/record without granting
/// any ability to affect the pipeline.
#[derive(Debug, Clone, Copy)]
pub struct TapContext {
    pub subscriber_count: usize,
}

/// Observes every envelope delivered on a subscribed topic. Unlike
/// [`crate::bus::TopicHandler`], a tap's `Err` never nacks the message —
/// taps are advisory only.
#[async_trait]
pub trait EventTap: Send + Sync {
    async fn observe(&self, envelope: &EventEnvelope, ctx: TapContext);
}
