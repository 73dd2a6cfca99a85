//! The matching engine: retrieves candidate video frames for each product
//! image, rescoring with keypoint features, aggregating pair scores to a
//! product-video verdict, and persisting accepted matches.
//!
//! - [`domain`] — `ProductImage`, `VideoFrame`, `PairMatch`, `MatchOutcome`.
//! - [`ports`] — `FeatureStoreReadModel` (C8's read side) and
//!   `MatchRepository` (C8's write side), implemented by
//!   `pvm-ledger-postgres`.
//! - [`scoring`] — pure functions: cosine similarity, the weighted pair
//!   score, and product-video aggregation with acceptance rules.
//! - [`engine`] — C8, the orchestration that ties retrieval, scoring and
//!   persistence together for one `match.request`.
//! - [`config`] — the tunable thresholds spec §6 exposes as config.
//! - [`topics`] — the two wire topics this crate touches.

pub mod config;
pub mod domain;
pub mod engine;
pub mod ports;
pub mod scoring;
pub mod topics;

pub use config::MatchingConfig;
pub use domain::{MatchOutcome, PairMatch, ProductId, ProductImage, VideoFrame, VideoId};
pub use engine::MatchingEngine;
pub use ports::{FeatureStoreReadModel, MatchRepository, PairFeatureScorer, PairFeatures};
