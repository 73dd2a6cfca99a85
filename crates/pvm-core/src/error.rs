//! Error taxonomy shared across the orchestrator.
//!
//! Spec §7 distinguishes four error kinds with different handling: transient
//! (retry), validation (drop, never DLQ), logical (ack as no-op), data
//! (skip the unit, keep going). [`OrchestratorError`] carries that
//! distinction so a single top-level handler in `pvm-service` can apply the
//! right policy without re-deriving it per call site.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// Broker/database disconnects, timeouts, lock contention. Retried by
    /// the bus up to the DLQ threshold.
    #[error("transient error: {0}")]
    Transient(#[source] anyhow::Error),

    /// Missing `event_id`/`job_id`, unparseable payload. Logged at ERROR
    /// and dropped without retry, never DLQ'd.
    #[error("validation error: {0}")]
    Validation(String),

    /// Unexpected state transition attempt (e.g. a completion event
    /// arriving in a phase that doesn't expect it). Logged at WARN,
    /// acknowledged as an idempotent no-op.
    #[error("logical error: {0}")]
    Logical(String),

    /// A single unit (one pair, one asset) is missing data it needs.
    /// Skipped and counted in metrics; processing continues.
    #[error("data error: {0}")]
    Data(String),
}

impl OrchestratorError {
    pub fn category(&self) -> SafeErrorCategory {
        match self {
            OrchestratorError::Transient(_) => SafeErrorCategory::Transient,
            OrchestratorError::Validation(_) => SafeErrorCategory::Validation,
            OrchestratorError::Logical(_) => SafeErrorCategory::Logical,
            OrchestratorError::Data(_) => SafeErrorCategory::Data,
        }
    }

    /// Whether the bus should attempt redelivery for this error.
    pub fn should_retry(&self) -> bool {
        matches!(self, OrchestratorError::Transient(_))
    }

    /// Whether this error should ever reach the DLQ (vs. being dropped or
    /// acked as a no-op directly).
    pub fn dlq_eligible(&self) -> bool {
        matches!(self, OrchestratorError::Transient(_))
    }
}

/// A coarse, loggable category — deliberately smaller than the full error
/// enum so metrics/log dashboards get a bounded cardinality label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SafeErrorCategory {
    Transient,
    Validation,
    Logical,
    Data,
}

impl std::fmt::Display for SafeErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SafeErrorCategory::Transient => "transient",
            SafeErrorCategory::Validation => "validation",
            SafeErrorCategory::Logical => "logical",
            SafeErrorCategory::Data => "data",
        };
        write!(f, "{s}")
    }
}

/// Implemented by any error type that can classify itself for metrics
/// purposes, so the bus/dispatcher can label failures without a match
/// statement per error type.
pub trait Categorizable {
    fn category(&self) -> SafeErrorCategory;
}

impl Categorizable for OrchestratorError {
    fn category(&self) -> SafeErrorCategory {
        OrchestratorError::category(self)
    }
}

/// Raised when a command's effect fails after exhausting whatever local
/// retry the effect itself performs (spec §4.8: "retry up to 3 times with
/// exponential backoff; on final failure, record ... and continue").
#[derive(Debug, Error)]
#[error("command failed after {attempts} attempt(s): {source}")]
pub struct CommandFailed {
    pub attempts: u32,
    #[source]
    pub source: anyhow::Error,
}

/// The outcome of processing a batch of independent units (e.g. a batch of
/// (product, video) pairs in the matching engine) where some may fail
/// without aborting the whole batch.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub succeeded: u64,
    pub skipped: u64,
    pub failed: u64,
}

impl BatchOutcome {
    pub fn record_success(&mut self) {
        self.succeeded += 1;
    }

    pub fn record_skip(&mut self) {
        self.skipped += 1;
    }

    pub fn record_failure(&mut self) {
        self.failed += 1;
    }

    pub fn total(&self) -> u64 {
        self.succeeded + self.skipped + self.failed
    }
}
