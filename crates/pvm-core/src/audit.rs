//! Debug-only in-memory event audit trail, for local development
//! visibility into what the bus has delivered. Never a substitute for the
//! persistent event ledger (`pvm-ledger-postgres::ledger`), which is the
//! real idempotency source of truth — this is a read-through accelerator
//! purely for developer inspection.

use crate::core::EventEnvelope;
use dashmap::DashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Debug, Clone)]
pub struct AuditEntry {
    pub topic: String,
    pub event_id: uuid::Uuid,
    pub job_id: uuid::Uuid,
}

/// A bounded ring of recently observed envelopes, keyed by insertion
/// order, compiled in only for debug builds.
#[derive(Default)]
pub struct EventAudit {
    entries: DashMap<usize, AuditEntry>,
    next: AtomicUsize,
    capacity: usize,
}

impl EventAudit {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: DashMap::new(),
            next: AtomicUsize::new(0),
            capacity,
        }
    }

    pub fn record(&self, envelope: &EventEnvelope) {
        let slot = self.next.fetch_add(1, Ordering::SeqCst) % self.capacity.max(1);
        self.entries.insert(
            slot,
            AuditEntry {
                topic: envelope.topic.clone(),
                event_id: envelope.event_id,
                job_id: envelope.job_id,
            },
        );
    }

    pub fn recent(&self) -> Vec<AuditEntry> {
        self.entries.iter().map(|e| e.value().clone()).collect()
    }
}
