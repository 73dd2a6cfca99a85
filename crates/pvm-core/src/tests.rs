use crate::bus::RetryPolicy;
use crate::core::{Command, CorrelationId, EventEnvelope, ExecutionMode};
use crate::effect_impl::{Effect, EffectContext};
use crate::engine::{EngineBuilder, InflightTracker};
use crate::error::OrchestratorError;
use crate::machine::Machine;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, Clone)]
enum PingEvent {
    Requested { n: u32 },
    Ponged { n: u32 },
}

#[derive(Debug, Clone)]
struct PingCommand {
    n: u32,
}

impl Command for PingCommand {
    fn execution_mode(&self) -> ExecutionMode {
        ExecutionMode::Inline
    }
}

struct PingMachine;

impl Machine for PingMachine {
    type Event = PingEvent;
    type Command = PingCommand;

    fn decide(&mut self, event: &PingEvent) -> Option<PingCommand> {
        match event {
            PingEvent::Requested { n } => Some(PingCommand { n: *n }),
            PingEvent::Ponged { .. } => None,
        }
    }
}

struct PongEffect {
    calls: Arc<AtomicU32>,
}

#[async_trait::async_trait]
impl Effect<PingCommand, ()> for PongEffect {
    type Event = PingEvent;

    async fn execute(&self, cmd: PingCommand, _ctx: EffectContext<()>) -> Result<PingEvent, OrchestratorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(PingEvent::Ponged { n: cmd.n })
    }
}

#[tokio::test]
async fn engine_runs_machine_decision_through_effect() {
    let calls = Arc::new(AtomicU32::new(0));
    let engine = EngineBuilder::new((), PingMachine)
        .with_effect(PongEffect {
            calls: calls.clone(),
        })
        .build();

    let handle = engine.start();
    handle
        .emit_and_await(PingEvent::Requested { n: 7 })
        .await
        .expect("emit_and_await should succeed");

    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn engine_no_effect_for_events_machine_ignores() {
    let calls = Arc::new(AtomicU32::new(0));
    let engine = EngineBuilder::new((), PingMachine)
        .with_effect(PongEffect {
            calls: calls.clone(),
        })
        .build();

    let handle = engine.start();
    handle
        .emit_and_await(PingEvent::Ponged { n: 1 })
        .await
        .expect("emit_and_await should still ack even with no command");

    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
fn retry_policy_backs_off_exponentially_up_to_max() {
    let policy = RetryPolicy {
        max_attempts: 5,
        base_delay: Duration::from_millis(100),
        max_delay: Duration::from_secs(1),
    };

    assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(100));
    assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(200));
    assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(400));
    // Clamped to max_delay once the exponential would exceed it.
    assert_eq!(policy.delay_for_attempt(10), Duration::from_secs(1));
}

#[test]
fn validation_errors_are_never_retried_or_dlqd() {
    let err = OrchestratorError::Validation("missing event_id".to_string());
    assert!(!err.should_retry());
    assert!(!err.dlq_eligible());
}

#[test]
fn transient_errors_are_retried_and_dlq_eligible() {
    let err = OrchestratorError::Transient(anyhow::anyhow!("connection reset"));
    assert!(err.should_retry());
    assert!(err.dlq_eligible());
}

#[test]
fn inflight_tracker_counts_down_to_zero() {
    let tracker = InflightTracker::new();
    let correlation_id = CorrelationId::new();

    tracker.start(correlation_id);
    tracker.start(correlation_id);
    assert_eq!(tracker.finish(correlation_id), 1);
    assert_eq!(tracker.finish(correlation_id), 0);
}

#[test]
fn event_envelope_preserves_event_id_across_republish() {
    let job_id = Uuid::new_v4();
    let original = EventEnvelope::new("match.request", job_id, serde_json::json!({"top_k": 20}));
    let republished = EventEnvelope::new("match.request", job_id, original.payload.clone())
        .with_event_id(original.event_id);

    assert_eq!(original.event_id, republished.event_id);
}
