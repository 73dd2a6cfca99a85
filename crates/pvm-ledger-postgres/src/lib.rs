//! PostgreSQL implementations of the ports `pvm-phase` and `pvm-matching`
//! declare: the event ledger, asset counters, job records, the feature
//! store read model, and match persistence. Also a generic background
//! job queue store (`PgJobQueueStore`) for `pvm-core`'s `JobStore`,
//! grounded directly on the teacher's `PgJobStore`.
//!
//! # Schema
//!
//! See [`schema::MIGRATIONS_SQL`] for the full `CREATE TABLE` set this
//! crate assumes.

pub mod counters;
pub mod feature_store;
pub mod job_queue;
pub mod jobs;
pub mod ledger;
pub mod matches;
pub mod schema;
pub mod scorer;

pub use counters::PgAssetCounterStore;
pub use feature_store::PgFeatureStore;
pub use job_queue::PgJobQueueStore;
pub use jobs::PgJobRecordStore;
pub use ledger::PgEventLedger;
pub use matches::PgMatchRepository;
pub use scorer::PgPairFeatureScorer;
