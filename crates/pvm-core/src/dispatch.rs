//! Routes a decided [`Command`] to its registered [`Effect`], either
//! inline or via a durable job queue for background execution.

use crate::core::Command;
use crate::error::OrchestratorError;
use crate::job::{ClaimedJob, FailureKind};
use async_trait::async_trait;
use uuid::Uuid;

/// A durable queue a `Dispatcher` can hand `Background`-mode commands to.
/// `pvm-ledger-postgres::PgJobStore` is the production implementation;
/// [`NoOpJobQueue`] is for services that never dispatch background work.
#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn enqueue(
        &self,
        job_type: &str,
        payload: serde_json::Value,
        max_retries: i32,
        priority: i32,
    ) -> Result<Uuid, OrchestratorError>;
}

/// A `JobQueue` that refuses all enqueues — used when a service's commands
/// are exclusively `ExecutionMode::Inline` and wiring a real queue would be
/// dead weight.
pub struct NoOpJobQueue;

#[async_trait]
impl JobQueue for NoOpJobQueue {
    async fn enqueue(
        &self,
        job_type: &str,
        _payload: serde_json::Value,
        _max_retries: i32,
        _priority: i32,
    ) -> Result<Uuid, OrchestratorError> {
        Err(OrchestratorError::Logical(format!(
            "NoOpJobQueue cannot enqueue background command '{job_type}'"
        )))
    }
}

/// Routes commands produced by a [`crate::Machine`] to their effect, either
/// running it inline or enqueuing it, and reports `ClaimedJob` failures
/// back to the queue with the right [`FailureKind`].
pub struct Dispatcher<Q> {
    job_queue: Q,
}

impl<Q: JobQueue> Dispatcher<Q> {
    pub fn new(job_queue: Q) -> Self {
        Self { job_queue }
    }

    /// Enqueue a background command, returning the job id the queue
    /// assigned.
    pub async fn enqueue_background<C: Command>(&self, cmd: &C) -> Result<Uuid, OrchestratorError> {
        let spec = cmd.job_spec().ok_or_else(|| {
            OrchestratorError::Logical("background command missing JobSpec".to_string())
        })?;
        let payload = cmd.serialize_to_json().ok_or_else(|| {
            OrchestratorError::Logical(format!(
                "command for job type '{}' has no serializable payload",
                spec.job_type
            ))
        })?;
        self.job_queue
            .enqueue(&spec.job_type, payload, spec.max_retries, spec.priority)
            .await
    }

    /// Classify a worker-reported failure for a claimed job into the
    /// [`FailureKind`] the job queue's retry policy expects, based on the
    /// originating [`OrchestratorError`].
    pub fn classify_failure(&self, _job: &ClaimedJob, error: &OrchestratorError) -> FailureKind {
        match error {
            OrchestratorError::Transient(_) => FailureKind::Retryable,
            _ => FailureKind::NonRetryable,
        }
    }
}
