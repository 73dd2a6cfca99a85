use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use pvm_phase::{AssetCounterPort, CompletionEmitter, CounterKind, JobId};
use pvm_core::EventBus;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// What happens when a counter's watermark deadline elapses. `pvm-phase`'s
/// [`CompletionEmitter`] is the only production implementation — firing a
/// watermark just means "re-check this counter for terminal state, emit if
/// it is, CAS-protected same as any other trigger".
#[async_trait]
pub trait WatermarkSink: Send + Sync {
    async fn on_watermark_elapsed(&self, job_id: JobId, kind: CounterKind) -> anyhow::Result<()>;
}

#[async_trait]
impl<C: AssetCounterPort + 'static, B: EventBus + 'static> WatermarkSink for CompletionEmitter<C, B> {
    async fn on_watermark_elapsed(&self, job_id: JobId, kind: CounterKind) -> anyhow::Result<()> {
        let Some(state) = self.counters().current(job_id, kind).await? else {
            return Ok(());
        };
        self.try_emit(job_id, kind, state).await?;
        Ok(())
    }
}

/// Tracks one `tokio::time::sleep` task per outstanding `(job_id, kind)`
/// counter. Scheduling the same key twice is a no-op — `initialize` is
/// idempotent on the counter itself, and `schedule` mirrors that here so a
/// duplicate `products.images.ready.batch` delivery doesn't spawn a second
/// task racing the first.
pub struct WatermarkScheduler<C: AssetCounterPort, S: WatermarkSink> {
    counters: Arc<C>,
    sink: Arc<S>,
    tasks: DashMap<(JobId, CounterKind), JoinHandle<()>>,
}

impl<C: AssetCounterPort + 'static, S: WatermarkSink + 'static> WatermarkScheduler<C, S> {
    pub fn new(counters: Arc<C>, sink: Arc<S>) -> Self {
        Self { counters, sink, tasks: DashMap::new() }
    }

    /// Rebuilds timer tasks from persisted deadlines — call once on
    /// startup before any new events are admitted. Returns how many were
    /// rebuilt.
    pub async fn reconstruct(&self) -> anyhow::Result<usize> {
        let pending = self.counters.pending_deadlines().await?;
        let count = pending.len();
        for (job_id, kind, deadline) in pending {
            self.schedule(job_id, kind, deadline);
        }
        info!(count, "reconstructed watermark timers from persisted deadlines");
        Ok(count)
    }

    /// Schedules (or no-ops, if already scheduled) a timer that fires at
    /// `deadline`. A `deadline` already in the past fires on the next
    /// scheduler tick rather than being skipped, so a process that was
    /// down past a counter's deadline still nudges it once on restart.
    pub fn schedule(&self, job_id: JobId, kind: CounterKind, deadline: DateTime<Utc>) {
        let key = (job_id, kind);
        if let Some(existing) = self.tasks.get(&key) {
            if !existing.is_finished() {
                return;
            }
        }

        let sink = self.sink.clone();
        let sleep_duration = (deadline - Utc::now()).to_std().unwrap_or(std::time::Duration::ZERO);

        let handle = tokio::spawn(async move {
            tokio::time::sleep(sleep_duration).await;
            if let Err(err) = sink.on_watermark_elapsed(job_id, kind).await {
                warn!(%job_id, asset_type = kind.as_key(), error = %err, "watermark sink failed");
            }
        });

        self.tasks.insert(key, handle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pvm_testing::{InMemoryAssetCounterStore, RecordingEventBus};
    use uuid::Uuid;

    #[tokio::test(start_paused = true)]
    async fn watermark_fires_and_emits_once_deadline_elapses() {
        let counters = Arc::new(InMemoryAssetCounterStore::new());
        let bus = Arc::new(RecordingEventBus::new());
        let emitter = Arc::new(CompletionEmitter::new(counters.clone(), bus.clone(), std::time::Duration::from_millis(50)));
        let scheduler = WatermarkScheduler::new(counters.clone(), emitter);

        let job_id = Uuid::new_v4();
        let kind = CounterKind::new(pvm_phase::Modality::Image, pvm_phase::domain::Stage::Embedding);
        counters
            .initialize(job_id, kind, 10, std::time::Duration::from_millis(50))
            .await
            .unwrap();
        counters.observe(job_id, kind, 7, 0).await.unwrap();

        scheduler.schedule(job_id, kind, Utc::now() + chrono::Duration::milliseconds(50));

        tokio::time::advance(std::time::Duration::from_millis(100)).await;
        tokio::task::yield_now().await;

        let state = counters.current(job_id, kind).await.unwrap().unwrap();
        assert!(state.completed_emitted);
        assert_eq!(bus.count_for_topic("image.embeddings.completed"), 1);

        let emitted = bus.published_to("image.embeddings.completed").remove(0);
        assert_eq!(emitted.payload["total_assets"], 10);
        assert_eq!(emitted.payload["processed_assets"], 7);
        assert_eq!(emitted.payload["has_partial_completion"], true);
    }

    #[tokio::test]
    async fn scheduling_the_same_key_twice_does_not_spawn_a_second_task() {
        let counters = Arc::new(InMemoryAssetCounterStore::new());
        let bus = Arc::new(RecordingEventBus::new());
        let emitter = Arc::new(CompletionEmitter::new(counters.clone(), bus.clone(), std::time::Duration::from_millis(50)));
        let scheduler = WatermarkScheduler::new(counters.clone(), emitter);

        let job_id = Uuid::new_v4();
        let kind = CounterKind::new(pvm_phase::Modality::Video, pvm_phase::domain::Stage::Keypoint);
        let deadline = Utc::now() + chrono::Duration::seconds(60);

        scheduler.schedule(job_id, kind, deadline);
        scheduler.schedule(job_id, kind, deadline);

        assert_eq!(scheduler.tasks.len(), 1);
    }
}
