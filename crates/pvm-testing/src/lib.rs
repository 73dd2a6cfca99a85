//! In-memory test doubles used by every other crate's `#[cfg(test)]`
//! modules: an `EventBus` that records publishes instead of delivering
//! them over a broker, and in-memory implementations of `pvm-phase`'s and
//! `pvm-matching`'s ports.

pub mod bus;
pub mod matching_ports;
pub mod phase_ports;

pub use bus::RecordingEventBus;
pub use matching_ports::{InMemoryFeatureStore, InMemoryMatchRepository, StubPairFeatureScorer};
pub use phase_ports::{InMemoryAssetCounterStore, InMemoryEventLedger, InMemoryJobRecordStore};
