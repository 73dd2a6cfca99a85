//! C10 — pipeline wiring: configuration, structured logging bootstrap,
//! the in-process event bus, and the `init -> subscribe* -> serve ->
//! shutdown` lifecycle that binds C1's subscriptions to C4/C8's handlers.
//!
//! - [`config`] — `AppConfig`, environment-variable driven (spec §6).
//! - [`telemetry`] — one-time `tracing-subscriber` bootstrap.
//! - [`bus`] — `LocalEventBus`, the default in-process `EventBus`.
//! - [`admission`] — `start_job`, the only way a `Job` row comes into
//!   existence.
//! - [`status`] — the read-only job status query.
//! - [`context`] — `AppContext`, bundling every port/service and driving
//!   the service lifecycle.

pub mod admission;
pub mod bus;
pub mod config;
pub mod context;
pub mod status;
pub mod telemetry;

pub use admission::{AdmissionRequest, AdmissionService};
pub use bus::LocalEventBus;
pub use config::AppConfig;
pub use context::AppContext;
pub use status::{JobStatus, StatusQuery};
