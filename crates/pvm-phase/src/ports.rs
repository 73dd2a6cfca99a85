//! Ports the phase event service depends on. `pvm-ledger-postgres`
//! provides the production implementations; `pvm-testing` provides
//! in-memory ones for unit tests.

use crate::domain::{AssetFlags, CounterKind, Job, JobId, Phase};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// C2 — the event ledger: per-event-id idempotency.
#[async_trait]
pub trait EventLedgerPort: Send + Sync {
    /// Conditionally insert `(event_id, job_id, event_name)`. Returns
    /// whether this call inserted a new row (`true`) or the id was
    /// already present (`false`).
    async fn record(&self, event_id: Uuid, job_id: JobId, event_name: &str) -> anyhow::Result<bool>;

    async fn has(&self, event_id: Uuid) -> anyhow::Result<bool>;

    /// Every distinct `event_name` recorded for `job_id` so far — what
    /// `pvm-phase::transition::decide` reads as its ledger view. Scoped by
    /// job because the transition table only ever asks "has event X been
    /// seen for this job", never globally.
    async fn event_names_for_job(&self, job_id: JobId) -> anyhow::Result<Vec<String>>;
}

/// The post-mutation state of an asset counter, as returned by
/// [`AssetCounterPort::observe`] and consulted by [`AssetCounterPort::is_terminal`].
#[derive(Debug, Clone, Copy)]
pub struct AssetCounterState {
    pub expected: i64,
    pub processed: i64,
    pub failed: i64,
    pub watermark_deadline: Option<DateTime<Utc>>,
    pub completed_emitted: bool,
}

impl AssetCounterState {
    /// spec §4.3: terminal when counts close out, or the watermark timer
    /// has already elapsed (the registry synthesises this state itself on
    /// firing — see [`AssetCounterPort::initialize`]'s watermark contract).
    pub fn is_terminal(&self, now: DateTime<Utc>) -> bool {
        self.processed + self.failed >= self.expected
            || self.watermark_deadline.is_some_and(|deadline| now >= deadline)
    }

    pub fn has_partial_completion(&self, now: DateTime<Utc>) -> bool {
        self.expected == 0 || self.processed + self.failed < self.expected || self.watermark_deadline.is_some_and(|d| now >= d)
    }
}

/// C3 — per-job, per-asset-type counters with watermark timers.
#[async_trait]
pub trait AssetCounterPort: Send + Sync {
    /// Idempotent on `(job_id, kind)`. If `expected == 0`, the
    /// implementation marks the counter terminal immediately (spec §4.3).
    async fn initialize(
        &self,
        job_id: JobId,
        kind: CounterKind,
        expected: i64,
        watermark_ttl: std::time::Duration,
    ) -> anyhow::Result<AssetCounterState>;

    async fn observe(
        &self,
        job_id: JobId,
        kind: CounterKind,
        delta_processed: i64,
        delta_failed: i64,
    ) -> anyhow::Result<AssetCounterState>;

    async fn current(&self, job_id: JobId, kind: CounterKind) -> anyhow::Result<Option<AssetCounterState>>;

    /// CAS: flips `completed_emitted` false → true. Returns `true` only
    /// for the caller that won the race — the single-emission invariant
    /// (spec §4.3, testable property #2).
    async fn set_completed(&self, job_id: JobId, kind: CounterKind) -> anyhow::Result<bool>;

    /// Every counter not yet emitted whose watermark timer hasn't already
    /// fired, for `pvm-persistence::scheduler` to rebuild its in-process
    /// `tokio::time::sleep` tasks on startup — the timers themselves are
    /// not durable, only the deadlines are.
    async fn pending_deadlines(&self) -> anyhow::Result<Vec<(JobId, CounterKind, DateTime<Utc>)>>;
}

/// C6 — job record CRUD.
#[async_trait]
pub trait JobRecordPort: Send + Sync {
    async fn get(&self, job_id: JobId) -> anyhow::Result<Option<Job>>;

    async fn create(&self, job_id: JobId, industry: &str, asset_flags: AssetFlags) -> anyhow::Result<Job>;

    /// CAS on `expected_old` — rejected (returns `false`) if the job's
    /// current phase doesn't match, preventing two concurrent handlers
    /// from both applying conflicting transitions (spec §4.6).
    async fn update_phase(&self, job_id: JobId, expected_old: Phase, new: Phase) -> anyhow::Result<bool>;
}
