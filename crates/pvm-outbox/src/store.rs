//! The outbox persistence seam.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use pvm_core::EventEnvelope;
use std::sync::Mutex;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct OutboxEntry {
    pub id: Uuid,
    pub envelope: EventEnvelope,
    pub created_at: DateTime<Utc>,
}

/// A database-transaction-scoped staging area for outgoing events.
/// `stage` is expected to run inside the same transaction as the state
/// mutation that produced the event; `fetch_unsent`/`mark_sent` are
/// called only by an [`crate::relay::OutboxRelay`], outside any caller
/// transaction.
#[async_trait]
pub trait OutboxStore: Send + Sync {
    async fn stage(&self, envelope: EventEnvelope) -> anyhow::Result<()>;

    async fn fetch_unsent(&self, limit: i64) -> anyhow::Result<Vec<OutboxEntry>>;

    async fn mark_sent(&self, id: Uuid) -> anyhow::Result<()>;
}

/// Ordering-preserving in-memory store. Not transactional with anything
/// — useful for tests and for a single-process deployment with no
/// database-level atomicity requirement.
#[derive(Default)]
pub struct InMemoryOutboxStore {
    entries: Mutex<Vec<OutboxEntry>>,
    sent: DashMap<Uuid, ()>,
}

impl InMemoryOutboxStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OutboxStore for InMemoryOutboxStore {
    async fn stage(&self, envelope: EventEnvelope) -> anyhow::Result<()> {
        self.entries.lock().unwrap().push(OutboxEntry {
            id: Uuid::new_v4(),
            envelope,
            created_at: Utc::now(),
        });
        Ok(())
    }

    async fn fetch_unsent(&self, limit: i64) -> anyhow::Result<Vec<OutboxEntry>> {
        let entries = self.entries.lock().unwrap();
        Ok(entries
            .iter()
            .filter(|e| !self.sent.contains_key(&e.id))
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn mark_sent(&self, id: Uuid) -> anyhow::Result<()> {
        self.sent.insert(id, ());
        Ok(())
    }
}
