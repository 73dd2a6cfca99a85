//! An `EventBus` facade that stages instead of delivering. Code that
//! mutates durable state and wants to publish a resulting event in the
//! same transaction depends on this, not on a real bus — the distinction
//! between "staged" and "delivered" is exactly what makes the outbox
//! pattern safe under crashes.

use async_trait::async_trait;
use pvm_core::{EventBus, EventEnvelope, OrchestratorError, TopicHandler};
use std::sync::Arc;

use crate::store::OutboxStore;

pub struct OutboxPublisher<S: OutboxStore> {
    store: Arc<S>,
}

impl<S: OutboxStore> OutboxPublisher<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl<S: OutboxStore> EventBus for OutboxPublisher<S> {
    async fn publish_envelope(&self, envelope: EventEnvelope) -> Result<(), OrchestratorError> {
        self.store
            .stage(envelope)
            .await
            .map_err(OrchestratorError::Transient)
    }

    async fn subscribe(
        &self,
        _topic: &str,
        _handler: Arc<dyn TopicHandler>,
        _prefetch: u32,
    ) -> Result<(), OrchestratorError> {
        unimplemented!("OutboxPublisher is write-only; subscribe against the relay's downstream bus instead")
    }
}
