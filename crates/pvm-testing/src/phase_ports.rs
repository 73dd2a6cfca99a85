//! In-memory `pvm-phase` port implementations.

use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use pvm_phase::ports::AssetCounterState;
use pvm_phase::{AssetCounterPort, AssetFlags, CounterKind, EventLedgerPort, Job, JobRecordPort, Phase};
use std::sync::Mutex;
use std::time::Duration;
use uuid::Uuid;

#[derive(Default)]
pub struct InMemoryEventLedger {
    seen_ids: DashSet<Uuid>,
    names_by_job: DashMap<Uuid, Vec<String>>,
}

impl InMemoryEventLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EventLedgerPort for InMemoryEventLedger {
    async fn record(&self, event_id: Uuid, job_id: Uuid, event_name: &str) -> anyhow::Result<bool> {
        if !self.seen_ids.insert(event_id) {
            return Ok(false);
        }
        self.names_by_job.entry(job_id).or_default().push(event_name.to_string());
        Ok(true)
    }

    async fn has(&self, event_id: Uuid) -> anyhow::Result<bool> {
        Ok(self.seen_ids.contains(&event_id))
    }

    async fn event_names_for_job(&self, job_id: Uuid) -> anyhow::Result<Vec<String>> {
        Ok(self.names_by_job.get(&job_id).map(|v| v.clone()).unwrap_or_default())
    }
}

#[derive(Default)]
pub struct InMemoryAssetCounterStore {
    counters: DashMap<(Uuid, &'static str), AssetCounterState>,
}

impl InMemoryAssetCounterStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AssetCounterPort for InMemoryAssetCounterStore {
    async fn initialize(
        &self,
        job_id: Uuid,
        kind: CounterKind,
        expected: i64,
        watermark_ttl: Duration,
    ) -> anyhow::Result<AssetCounterState> {
        let deadline = chrono::Utc::now() + chrono::Duration::from_std(watermark_ttl)?;
        let state = self
            .counters
            .entry((job_id, kind.as_key()))
            .or_insert(AssetCounterState {
                expected,
                processed: 0,
                failed: 0,
                watermark_deadline: Some(deadline),
                completed_emitted: false,
            });
        Ok(*state)
    }

    async fn observe(
        &self,
        job_id: Uuid,
        kind: CounterKind,
        delta_processed: i64,
        delta_failed: i64,
    ) -> anyhow::Result<AssetCounterState> {
        let mut entry = self
            .counters
            .entry((job_id, kind.as_key()))
            .or_insert(AssetCounterState {
                expected: 0,
                processed: 0,
                failed: 0,
                watermark_deadline: None,
                completed_emitted: false,
            });
        entry.processed += delta_processed;
        entry.failed += delta_failed;
        Ok(*entry)
    }

    async fn current(&self, job_id: Uuid, kind: CounterKind) -> anyhow::Result<Option<AssetCounterState>> {
        Ok(self.counters.get(&(job_id, kind.as_key())).map(|v| *v))
    }

    async fn set_completed(&self, job_id: Uuid, kind: CounterKind) -> anyhow::Result<bool> {
        let Some(mut entry) = self.counters.get_mut(&(job_id, kind.as_key())) else {
            return Ok(false);
        };
        if entry.completed_emitted {
            return Ok(false);
        }
        entry.completed_emitted = true;
        Ok(true)
    }

    async fn pending_deadlines(&self) -> anyhow::Result<Vec<(Uuid, CounterKind, chrono::DateTime<chrono::Utc>)>> {
        Ok(self
            .counters
            .iter()
            .filter(|entry| !entry.value().completed_emitted)
            .filter_map(|entry| {
                let (job_id, key) = *entry.key();
                entry.value().watermark_deadline.map(|deadline| (job_id, CounterKind::from_key(key).unwrap(), deadline))
            })
            .collect())
    }
}

#[derive(Default)]
pub struct InMemoryJobRecordStore {
    jobs: Mutex<std::collections::HashMap<Uuid, Job>>,
}

impl InMemoryJobRecordStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobRecordPort for InMemoryJobRecordStore {
    async fn get(&self, job_id: Uuid) -> anyhow::Result<Option<Job>> {
        Ok(self.jobs.lock().unwrap().get(&job_id).cloned())
    }

    async fn create(&self, job_id: Uuid, industry: &str, asset_flags: AssetFlags) -> anyhow::Result<Job> {
        let job = Job::new(job_id, industry, asset_flags);
        self.jobs.lock().unwrap().insert(job_id, job.clone());
        Ok(job)
    }

    async fn update_phase(&self, job_id: Uuid, expected_old: Phase, new: Phase) -> anyhow::Result<bool> {
        let mut jobs = self.jobs.lock().unwrap();
        let Some(job) = jobs.get_mut(&job_id) else {
            return Ok(false);
        };
        if job.phase != expected_old {
            return Ok(false);
        }
        job.phase = new;
        job.updated_at = chrono::Utc::now();
        Ok(true)
    }
}
