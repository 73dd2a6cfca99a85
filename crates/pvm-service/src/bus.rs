//! `LocalEventBus` — the default, in-process [`EventBus`] implementation.
//!
//! `pvm-core::bus`'s own design note explains that the teacher's
//! in-memory `tokio::sync::broadcast` bus was deliberately *not* reused
//! because it drops messages under load and has no redelivery. This bus
//! is a different animal built on the same primitives the teacher reaches
//! for elsewhere (bounded `mpsc` channels, spawned worker loops, retry
//! with backoff — see `pvm_core::engine::Engine`, `pvm_matching::engine`'s
//! `persist_with_retry`, `pvm_outbox::relay`): it acknowledges a message
//! only once its handler returns `Ok`, retries transient failures with
//! `RetryPolicy`'s backoff, and routes exhausted retries to a `<topic>.dlq`
//! topic, so the at-least-once/DLQ contract in `pvm_core::bus`'s doc
//! comment holds even for a single-process deployment. Broker technology
//! remains abstract behind `EventBus` (spec design note) — this is one
//! implementation among several (the other being `pvm-outbox`'s staged
//! publisher), swapped in by whatever constructs the service's
//! `AppContext`.

use async_trait::async_trait;
use dashmap::DashMap;
use pvm_core::{EventBus, EventEnvelope, OrchestratorError, RetryPolicy, SafeErrorCategory, TopicHandler};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::{error, warn};

struct Inner {
    topics: DashMap<String, Vec<mpsc::Sender<EventEnvelope>>>,
    retry_policy: RetryPolicy,
}

impl Inner {
    async fn dispatch(&self, envelope: EventEnvelope) -> Result<(), OrchestratorError> {
        let senders: Vec<_> = match self.topics.get(&envelope.topic) {
            Some(v) => v.clone(),
            None => return Ok(()),
        };
        for sender in senders {
            if sender.send(envelope.clone()).await.is_err() {
                warn!(topic = %envelope.topic, "subscriber channel closed, dropping message");
            }
        }
        Ok(())
    }

    fn register(self: Arc<Self>, topic: &str, handler: Arc<dyn TopicHandler>, prefetch: u32) {
        let workers = prefetch.max(1);
        let (tx, rx) = mpsc::channel(workers as usize);
        self.topics.entry(topic.to_string()).or_default().push(tx);

        let rx = Arc::new(Mutex::new(rx));
        for _ in 0..workers {
            let inner = self.clone();
            let rx = rx.clone();
            let handler = handler.clone();
            let topic = topic.to_string();
            tokio::spawn(async move {
                loop {
                    let next = { rx.lock().await.recv().await };
                    match next {
                        Some(envelope) => handle_with_retry(inner.clone(), &topic, handler.clone(), envelope).await,
                        None => break,
                    }
                }
            });
        }
    }
}

/// Runs `handler` against `envelope`, applying spec §7's per-category
/// policy: validation/logical/data errors are terminal for this delivery
/// (no retry, no DLQ); transient errors retry with `RetryPolicy`'s
/// backoff until exhausted, then the envelope is republished on
/// `<topic>.dlq`.
async fn handle_with_retry(inner: Arc<Inner>, topic: &str, handler: Arc<dyn TopicHandler>, envelope: EventEnvelope) {
    let mut attempt = 0u32;
    loop {
        let err = match handler.handle(envelope.clone()).await {
            Ok(()) => return,
            Err(err) => err,
        };

        match err.category() {
            SafeErrorCategory::Validation => {
                error!(topic, event_id = %envelope.event_id, error = %err, "validation error, dropping");
                return;
            }
            SafeErrorCategory::Logical => {
                warn!(topic, event_id = %envelope.event_id, error = %err, "logical error, acking as no-op");
                return;
            }
            SafeErrorCategory::Data => {
                warn!(topic, event_id = %envelope.event_id, error = %err, "data error, skipping unit");
                return;
            }
            SafeErrorCategory::Transient => {
                if attempt + 1 >= inner.retry_policy.max_attempts {
                    warn!(topic, event_id = %envelope.event_id, attempts = attempt + 1, "exhausted retries, routing to dlq");
                    let mut dlq_envelope = envelope.clone();
                    dlq_envelope.topic = format!("{topic}.dlq");
                    let _ = inner.dispatch(dlq_envelope).await;
                    return;
                }
                let delay = inner.retry_policy.delay_for_attempt(attempt);
                warn!(topic, event_id = %envelope.event_id, attempt, error = %err, "retrying after transient error");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

#[derive(Clone)]
pub struct LocalEventBus {
    inner: Arc<Inner>,
}

impl LocalEventBus {
    pub fn new() -> Self {
        Self::with_retry_policy(RetryPolicy::default())
    }

    pub fn with_retry_policy(retry_policy: RetryPolicy) -> Self {
        Self {
            inner: Arc::new(Inner { topics: DashMap::new(), retry_policy }),
        }
    }
}

impl Default for LocalEventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventBus for LocalEventBus {
    async fn publish_envelope(&self, envelope: EventEnvelope) -> Result<(), OrchestratorError> {
        self.inner.dispatch(envelope).await
    }

    async fn subscribe(&self, topic: &str, handler: Arc<dyn TopicHandler>, prefetch: u32) -> Result<(), OrchestratorError> {
        self.inner.clone().register(topic, handler, prefetch);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pvm_core::CorrelationId;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use uuid::Uuid;

    struct CountingHandler {
        calls: Arc<AtomicUsize>,
        fail_until: usize,
    }

    #[async_trait]
    impl TopicHandler for CountingHandler {
        async fn handle(&self, _envelope: EventEnvelope) -> Result<(), OrchestratorError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_until {
                return Err(OrchestratorError::Transient(anyhow::anyhow!("not yet")));
            }
            Ok(())
        }
    }

    struct DlqRecorder {
        seen: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl TopicHandler for DlqRecorder {
        async fn handle(&self, _envelope: EventEnvelope) -> Result<(), OrchestratorError> {
            self.seen.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_retry_then_succeed() {
        let bus = LocalEventBus::with_retry_policy(RetryPolicy {
            max_attempts: 5,
            base_delay: std::time::Duration::from_millis(1),
            max_delay: std::time::Duration::from_millis(10),
        });
        let calls = Arc::new(AtomicUsize::new(0));
        bus.subscribe("topic.a", Arc::new(CountingHandler { calls: calls.clone(), fail_until: 2 }), 1)
            .await
            .unwrap();

        bus.publish("topic.a", Uuid::new_v4(), json!({}), CorrelationId::new()).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_retries_route_to_dlq() {
        let bus = LocalEventBus::with_retry_policy(RetryPolicy {
            max_attempts: 2,
            base_delay: std::time::Duration::from_millis(1),
            max_delay: std::time::Duration::from_millis(10),
        });
        let calls = Arc::new(AtomicUsize::new(0));
        bus.subscribe("topic.b", Arc::new(CountingHandler { calls: calls.clone(), fail_until: 100 }), 1)
            .await
            .unwrap();

        let dlq_seen = Arc::new(AtomicUsize::new(0));
        bus.subscribe("topic.b.dlq", Arc::new(DlqRecorder { seen: dlq_seen.clone() }), 1).await.unwrap();

        bus.publish("topic.b", Uuid::new_v4(), json!({}), CorrelationId::new()).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(dlq_seen.load(Ordering::SeqCst), 1);
    }
}
