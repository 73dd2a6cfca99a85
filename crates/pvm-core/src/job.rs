//! Policy-light job-queue interfaces. A `JobStore` implementation owns
//! retry/backoff/dead-letter policy (see `pvm-ledger-postgres::PgJobStore`);
//! this module only defines the shapes everyone agrees on.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use uuid::Uuid;

/// A background command claimed from the durable queue, ready for a
/// worker to execute.
#[derive(Debug, Clone)]
pub struct ClaimedJob {
    pub id: Uuid,
    pub job_type: String,
    pub payload: serde_json::Value,
    pub version: i32,
    pub attempt: i32,
}

/// Whether a job failure should be retried or sent straight to the dead
/// letter queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureKind {
    Retryable,
    NonRetryable,
}

/// A durable job queue: claim work, report outcomes, extend leases for
/// long-running jobs. Deliberately narrow — no opinion on how `job_type`
/// strings map to handlers; that's [`CommandRegistry`]'s job.
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn claim_ready(&self, worker_id: &str, limit: i64) -> Result<Vec<ClaimedJob>, anyhow::Error>;
    async fn mark_succeeded(&self, job_id: Uuid) -> Result<(), anyhow::Error>;
    async fn mark_failed(&self, job_id: Uuid, error: &str, kind: FailureKind) -> Result<(), anyhow::Error>;
    async fn heartbeat(&self, job_id: Uuid) -> Result<(), anyhow::Error>;
}

/// Raised when a claimed job's payload doesn't deserialize into the shape
/// its `job_type` promises.
#[derive(Debug, Error)]
#[error("failed to deserialize job payload for job_type '{job_type}': {reason}")]
pub struct DeserializationError {
    pub job_type: String,
    pub reason: String,
}

/// Maps `job_type` strings to a typed decoder, so a worker pool can turn a
/// [`ClaimedJob`]'s JSON payload back into a concrete command type without
/// a giant string `match` living in the worker loop itself.
pub struct CommandRegistry {
    decoders: HashMap<String, Box<dyn Fn(&serde_json::Value) -> Result<(), DeserializationError> + Send + Sync>>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self {
            decoders: HashMap::new(),
        }
    }

    /// Register a decoder for `job_type` that only validates shape
    /// (returns `Ok(())` / `Err`); concrete command reconstruction is
    /// typically done by the caller via `serde_json::from_value` directly
    /// once shape is confirmed, keeping this registry free of a type
    /// parameter per entry.
    pub fn register<F>(&mut self, job_type: impl Into<String>, validate: F)
    where
        F: Fn(&serde_json::Value) -> Result<(), DeserializationError> + Send + Sync + 'static,
    {
        self.decoders.insert(job_type.into(), Box::new(validate));
    }

    pub fn validate(&self, job_type: &str, payload: &serde_json::Value) -> Result<(), DeserializationError> {
        match self.decoders.get(job_type) {
            Some(validate) => validate(payload),
            None => Err(DeserializationError {
                job_type: job_type.to_string(),
                reason: "no decoder registered for job_type".to_string(),
            }),
        }
    }
}

impl Default for CommandRegistry {
    fn default() -> Self {
        Self::new()
    }
}
