//! Core wire types: events, commands, envelopes, correlation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use uuid::Uuid;

/// A fact: something that happened. Implemented via blanket impl for any
/// `Clone + Send + Sync + 'static` type — matching the teacher's "events are
/// just data" philosophy. No IO, no mutation.
pub trait Event: Clone + Send + Sync + 'static {}

impl<T: Clone + Send + Sync + 'static> Event for T {}

/// Intent: a request for IO with an implicit transaction boundary. Exactly
/// one [`crate::Effect`] handles a given `Command` type, and that effect's
/// `execute` is the sole transaction.
pub trait Command: fmt::Debug + Send + Sync + 'static {
    /// Whether this command should be executed inline (within the handler
    /// that decided it) or handed to the durable job queue for background
    /// execution. Most phase-FSM commands are `Inline`; commands that do
    /// real CV/network work (none live in this crate — those are external
    /// collaborators) would be `Background`.
    fn execution_mode(&self) -> ExecutionMode {
        ExecutionMode::Inline
    }

    /// If `execution_mode` is `Background`, describes how the job queue
    /// should schedule and retry this command.
    fn job_spec(&self) -> Option<JobSpec> {
        None
    }

    /// Serialize this command to JSON for job-queue persistence. Commands
    /// that derive `Serialize` can implement this with
    /// [`crate::auto_serialize`].
    fn serialize_to_json(&self) -> Option<serde_json::Value> {
        None
    }
}

/// Where a command should run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    /// Run synchronously inside the handler that produced the command.
    Inline,
    /// Enqueue on the durable job queue ([`crate::job::JobStore`]) for a
    /// worker pool to pick up.
    Background,
}

/// Scheduling metadata for a background command.
#[derive(Debug, Clone)]
pub struct JobSpec {
    pub job_type: String,
    pub max_retries: i32,
    pub priority: i32,
}

impl JobSpec {
    pub fn new(job_type: impl Into<String>) -> Self {
        Self {
            job_type: job_type.into(),
            max_retries: 3,
            priority: 0,
        }
    }

    pub fn with_max_retries(mut self, max_retries: i32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

/// A correlation id threads a client-visible request through every event
/// and command it causes, for log correlation across worker services.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CorrelationId(pub Uuid);

impl CorrelationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_job(job_id: Uuid) -> Self {
        Self(job_id)
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The wire envelope described in spec §3/§6: every message on the bus
/// carries these fields regardless of its topic-specific payload shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub event_id: Uuid,
    pub job_id: Uuid,
    pub correlation_id: CorrelationId,
    pub timestamp: DateTime<Utc>,
    pub topic: String,
    pub payload: serde_json::Value,
}

impl EventEnvelope {
    pub fn new(topic: impl Into<String>, job_id: Uuid, payload: serde_json::Value) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            job_id,
            correlation_id: CorrelationId::from_job(job_id),
            timestamp: Utc::now(),
            topic: topic.into(),
            payload,
        }
    }

    pub fn with_correlation(mut self, correlation_id: CorrelationId) -> Self {
        self.correlation_id = correlation_id;
        self
    }

    pub fn with_event_id(mut self, event_id: Uuid) -> Self {
        self.event_id = event_id;
        self
    }
}

/// Distinguishes the four event shapes the phase event service must
/// interpret (spec §4.4): per-asset progress, batch announcement, phase
/// completion, failure. Used by `pvm-phase` to classify an incoming topic
/// without re-deriving the mapping in multiple places.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventRole {
    AssetProgress,
    BatchAnnouncement,
    PhaseCompletion,
    Failure,
}

/// A type-erased command, used by the dispatcher to route a freshly
/// decided command to the effect registered for its concrete type without
/// the dispatcher needing to know every command type at compile time.
pub trait AnyCommand: Any + fmt::Debug + Send + Sync {
    fn as_any(&self) -> &dyn Any;
}

impl<T: Command + Any> AnyCommand for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// A command that can additionally be serialized for the job queue and
/// reconstructed from a stored payload by a [`crate::job::CommandRegistry`].
pub trait SerializableCommand: Command + serde::Serialize + Send + Sync {}

impl<T: Command + serde::Serialize + Send + Sync> SerializableCommand for T {}

/// Describes how an [`EnvelopeMatch`] chain resolves a topic to a decoded
/// event variant; used by the phase event service's static dispatch table
/// (spec §9 design note: "dynamic event dispatch" is replaced with a
/// static map from topic to typed handler).
pub trait EnvelopeMatch: Send + Sync {
    type Decoded;

    fn matches(&self, topic: &str) -> bool;
    fn decode(&self, envelope: &EventEnvelope) -> Result<Self::Decoded, crate::job::DeserializationError>;
}

/// A chain of [`EnvelopeMatch`] rules tried in order; the first match wins.
/// Lets a service compose a handful of small topic matchers instead of one
/// giant match statement, while keeping the whole thing a sealed, typed,
/// compile-time-checked table rather than a runtime string dispatch.
pub struct MatchChain<D> {
    rules: Vec<Box<dyn EnvelopeMatch<Decoded = D>>>,
}

impl<D> MatchChain<D> {
    pub fn new() -> Self {
        Self { rules: Vec::new() }
    }

    pub fn with(mut self, rule: Box<dyn EnvelopeMatch<Decoded = D>>) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn decode(&self, envelope: &EventEnvelope) -> Option<Result<D, crate::job::DeserializationError>> {
        self.rules
            .iter()
            .find(|rule| rule.matches(&envelope.topic))
            .map(|rule| rule.decode(envelope))
    }
}

impl<D> Default for MatchChain<D> {
    fn default() -> Self {
        Self::new()
    }
}
