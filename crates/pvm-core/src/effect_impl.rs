//! Effects: the only place IO happens.

use crate::core::{Command, Event};
use crate::error::OrchestratorError;
use std::sync::Arc;

/// Dependencies available to an effect: database pools, the event bus
/// handle, HTTP clients, whatever IO surface the effect needs. Generic
/// over `Deps` so each service defines its own dependency bag, the same
/// way the teacher's examples define a local `Deps` struct per binary.
#[derive(Clone)]
pub struct EffectContext<Deps> {
    deps: Arc<Deps>,
    tool: ToolContext,
}

impl<Deps> EffectContext<Deps> {
    pub fn new(deps: Arc<Deps>, tool: ToolContext) -> Self {
        Self { deps, tool }
    }

    pub fn deps(&self) -> &Deps {
        &self.deps
    }

    /// Correlation/tracing context threaded alongside the dependency bag.
    pub fn tool(&self) -> &ToolContext {
        &self.tool
    }
}

/// Cross-cutting context every effect gets regardless of its dependency
/// bag: the correlation id of the triggering event and the job it belongs
/// to, for span attachment and log correlation.
#[derive(Debug, Clone)]
pub struct ToolContext {
    pub job_id: uuid::Uuid,
    pub correlation_id: crate::core::CorrelationId,
}

/// One command type maps to exactly one effect implementation. `execute`
/// performs the IO (almost always: one database transaction) and returns
/// the fact that resulted — which re-enters the bus as a new [`Event`].
///
/// Effects are stateless: everything they need arrives via `cmd` and
/// `ctx`. This is what lets the dispatcher hold effects behind `Arc<dyn
/// Effect<..>>` and run many concurrently without synchronization beyond
/// what the database itself provides.
#[async_trait::async_trait]
pub trait Effect<C: Command, Deps>: Send + Sync {
    type Event: Event;

    async fn execute(&self, cmd: C, ctx: EffectContext<Deps>) -> Result<Self::Event, OrchestratorError>;
}
