//! Transactional outbox: couples an event publish to the same database
//! transaction as the state mutation that produced it, so a crash
//! between "commit the mutation" and "publish the event" can't lose the
//! event or publish one for a mutation that never landed.
//!
//! - [`store`] — `OutboxStore`, the persistence seam; `pvm-ledger-postgres`
//!   provides a table-backed implementation sharing the caller's
//!   transaction, this crate provides an in-memory one for tests.
//! - [`publisher`] — `OutboxPublisher`, an `EventBus` facade that stages
//!   instead of delivering.
//! - [`relay`] — `OutboxRelay`, the background loop that drains staged
//!   entries to a real `EventBus`.

pub mod publisher;
pub mod relay;
pub mod store;

pub use publisher::OutboxPublisher;
pub use relay::OutboxRelay;
pub use store::{InMemoryOutboxStore, OutboxEntry, OutboxStore};
