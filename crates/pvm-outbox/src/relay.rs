//! Drains staged entries to a real bus, at-least-once: an entry is only
//! marked sent after `publish_envelope` returns `Ok`, so a crash between
//! publish and mark-sent just re-delivers on the next poll — downstream
//! dedup via the event ledger absorbs the duplicate.

use pvm_core::EventBus;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, warn};

use crate::store::OutboxStore;

pub struct OutboxRelay<S: OutboxStore, B: EventBus> {
    store: Arc<S>,
    bus: Arc<B>,
    batch_size: i64,
}

impl<S: OutboxStore, B: EventBus> OutboxRelay<S, B> {
    pub fn new(store: Arc<S>, bus: Arc<B>, batch_size: i64) -> Self {
        Self { store, bus, batch_size }
    }

    /// Drains one batch, returning how many entries were relayed.
    pub async fn run_once(&self) -> anyhow::Result<usize> {
        let entries = self.store.fetch_unsent(self.batch_size).await?;
        let mut relayed = 0;

        for entry in entries {
            match self.bus.publish_envelope(entry.envelope.clone()).await {
                Ok(()) => {
                    if let Err(err) = self.store.mark_sent(entry.id).await {
                        error!(entry_id = %entry.id, error = %err, "relayed but failed to mark sent, will redeliver");
                    }
                    relayed += 1;
                }
                Err(err) => {
                    warn!(entry_id = %entry.id, error = %err, "outbox relay publish failed, retrying next poll");
                }
            }
        }

        Ok(relayed)
    }

    /// Polls `run_once` on `interval` until the process is torn down.
    pub async fn run_forever(&self, interval: Duration) -> ! {
        loop {
            if let Err(err) = self.run_once().await {
                error!(error = %err, "outbox relay poll failed");
            }
            tokio::time::sleep(interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryOutboxStore;
    use pvm_core::{CorrelationId, EventEnvelope};
    use uuid::Uuid;

    struct CountingBus {
        count: std::sync::atomic::AtomicUsize,
    }

    #[async_trait::async_trait]
    impl EventBus for CountingBus {
        async fn publish_envelope(&self, _envelope: EventEnvelope) -> Result<(), pvm_core::OrchestratorError> {
            self.count.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Ok(())
        }

        async fn subscribe(
            &self,
            _topic: &str,
            _handler: Arc<dyn pvm_core::TopicHandler>,
            _prefetch: u32,
        ) -> Result<(), pvm_core::OrchestratorError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn run_once_relays_and_marks_sent_so_it_is_not_redelivered() {
        let store = Arc::new(InMemoryOutboxStore::new());
        let job_id = Uuid::new_v4();
        store
            .stage(EventEnvelope::new("job.completed", job_id, serde_json::json!({})).with_correlation(CorrelationId::from_job(job_id)))
            .await
            .unwrap();

        let bus = Arc::new(CountingBus { count: std::sync::atomic::AtomicUsize::new(0) });
        let relay = OutboxRelay::new(store.clone(), bus.clone(), 10);

        assert_eq!(relay.run_once().await.unwrap(), 1);
        assert_eq!(bus.count.load(std::sync::atomic::Ordering::SeqCst), 1);

        assert_eq!(relay.run_once().await.unwrap(), 0);
        assert_eq!(bus.count.load(std::sync::atomic::Ordering::SeqCst), 1);
    }
}
