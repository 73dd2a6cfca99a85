//! # pvm-core
//!
//! The coordination layer for the product-video matching orchestrator: a
//! deterministic, event-driven layer where [`Machine`]s decide, [`Effect`]s
//! execute IO, and commands carry transaction authority.
//!
//! ## Core Concepts
//!
//! - [`Event`] = Facts (what happened — a phase event, an asset-progress
//!   event, a match result).
//! - [`Command`] = Intent (a request for IO: update a phase, emit a
//!   completion, persist a match).
//!
//! Unlike an in-memory coordination layer, this one assumes **at-least-once,
//! cross-process delivery**: events arrive over a real broker, from many
//! worker services, possibly duplicated, possibly out of order. Every
//! [`Machine`] that mutates durable state must be idempotent with respect to
//! `event_id`; [`crate::job::JobStore`] and the event ledger (implemented in
//! `pvm-ledger-postgres`) are what make that safe.
//!
//! ## Architecture
//!
//! ```text
//! Worker services (collectors, feature extractors, matcher)
//!     │ publish(topic, payload, correlation_id)
//!     ▼
//! EventBus (topic-routed, at-least-once, DLQ after N retries)
//!     │ subscribe(topic, handler)
//!     ▼
//! Dispatcher ─► Machine::decide(&Event) ─► Option<Command>
//!                                               │
//!                                               ▼
//!                                         Effect::execute(cmd, ctx)
//!                                               │
//!                                               ▼
//!                                         Result<Event> ──► EventBus.publish
//! ```
//!
//! ## Key Invariants
//!
//! 1. Events are facts — immutable, no IO.
//! 2. Commands are intent — one command, one effect, one transaction.
//! 3. Machines are pure — no IO, no async; all durable state lives in
//!    Postgres and is read through the effect context.
//! 4. Effects are stateless — commands carry all data an effect needs.
//! 5. At-least-once delivery — handlers must be idempotent; see
//!    [`crate::job::JobStore`] and the ledger.

mod audit;
mod command_macro;
mod core;
mod dispatch;
mod effect_impl;
mod engine;
mod error;
mod machine;
mod request;
mod tap;

pub mod bus;
pub mod job;

#[cfg(test)]
mod tests;

pub use crate::core::{
    AnyCommand, Command, CorrelationId, EnvelopeMatch, Event, EventEnvelope, EventRole,
    ExecutionMode, JobSpec, MatchChain, SerializableCommand,
};

pub use crate::audit::{AuditEntry, EventAudit};
pub use crate::bus::{EventBus, RetryPolicy, TopicHandler};
pub use crate::dispatch::{Dispatcher, JobQueue, NoOpJobQueue};
pub use crate::effect_impl::{Effect, EffectContext, ToolContext};
pub use crate::engine::{Engine, EngineBuilder, EngineHandle, InflightBatch, InflightTracker};
pub use crate::error::{
    BatchOutcome, Categorizable, CommandFailed, OrchestratorError, SafeErrorCategory,
};
pub use crate::job::{ClaimedJob, CommandRegistry, DeserializationError, FailureKind, JobStore};
pub use crate::machine::Machine;
pub use crate::request::{dispatch_request, dispatch_request_timeout, DEFAULT_REQUEST_TIMEOUT};
pub use crate::tap::{EventTap, TapContext};

pub use async_trait::async_trait;
