//! A non-delivering `EventBus`: publishes are appended to an in-memory
//! log for assertions; `subscribe` panics if called, since tests that
//! need delivery should call handlers directly rather than depend on an
//! async dispatch loop.

use async_trait::async_trait;
use dashmap::DashMap;
use pvm_core::{CorrelationId, EventBus, EventEnvelope, OrchestratorError, TopicHandler};
use std::sync::Arc;
use std::sync::Mutex;

#[derive(Default)]
pub struct RecordingEventBus {
    published: Mutex<Vec<EventEnvelope>>,
    by_topic: DashMap<String, usize>,
}

impl RecordingEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn published(&self) -> Vec<EventEnvelope> {
        self.published.lock().unwrap().clone()
    }

    pub fn count_for_topic(&self, topic: &str) -> usize {
        self.by_topic.get(topic).map(|v| *v).unwrap_or(0)
    }

    pub fn published_to(&self, topic: &str) -> Vec<EventEnvelope> {
        self.published.lock().unwrap().iter().filter(|e| e.topic == topic).cloned().collect()
    }
}

#[async_trait]
impl EventBus for RecordingEventBus {
    async fn publish_envelope(&self, envelope: EventEnvelope) -> Result<(), OrchestratorError> {
        *self.by_topic.entry(envelope.topic.clone()).or_insert(0) += 1;
        self.published.lock().unwrap().push(envelope);
        Ok(())
    }

    async fn subscribe(
        &self,
        _topic: &str,
        _handler: Arc<dyn TopicHandler>,
        _prefetch: u32,
    ) -> Result<(), OrchestratorError> {
        unimplemented!("RecordingEventBus does not deliver; call handlers directly in tests")
    }
}

pub fn correlation_for(job_id: uuid::Uuid) -> CorrelationId {
    CorrelationId::from_job(job_id)
}
