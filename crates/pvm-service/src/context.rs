//! `AppContext` — the one place every port, service and background task
//! gets constructed and wired together, replacing the original's
//! module-level globals (`db`, `broker` imported fresh in every service
//! file) with a single owned object `main` builds once and passes down.
//!
//! Lifecycle: `init` (connect, construct) → `subscribe_all` → `run`
//! (await the shutdown signal) → `shutdown` (best-effort drain).

use crate::admission::AdmissionService;
use crate::bus::LocalEventBus;
use crate::config::AppConfig;
use crate::status::StatusQuery;
use async_trait::async_trait;
use pvm_core::{EventEnvelope, OrchestratorError, TopicHandler};
use pvm_ledger_postgres::{
    PgAssetCounterStore, PgEventLedger, PgFeatureStore, PgJobRecordStore, PgMatchRepository, PgPairFeatureScorer,
};
use pvm_matching::MatchingEngine;
use pvm_persistence::WatermarkScheduler;
use pvm_phase::{service::PhaseServiceConfig, topics, CompletionEmitter, PhaseEventService};
use std::sync::Arc;
use tracing::info;

type Phase = PhaseEventService<PgEventLedger, PgAssetCounterStore, PgJobRecordStore, LocalEventBus>;
type Matching = MatchingEngine<PgFeatureStore, PgPairFeatureScorer, PgMatchRepository, LocalEventBus>;
type Watermarks = WatermarkScheduler<PgAssetCounterStore, CompletionEmitter<PgAssetCounterStore, LocalEventBus>>;
type Status = StatusQuery<PgJobRecordStore, PgFeatureStore, PgMatchRepository>;
type Admission = AdmissionService<PgJobRecordStore>;

/// Adapts an `async fn` pointer of a service's `handle`/`handle_match_request`
/// method into a [`TopicHandler`] the bus can dispatch to, without every
/// service having to implement the trait itself.
struct ServiceHandler<F> {
    call: F,
}

#[async_trait]
impl<F> TopicHandler for ServiceHandler<F>
where
    F: Fn(EventEnvelope) -> futures_util_shim::BoxFuture<Result<(), OrchestratorError>> + Send + Sync + 'static,
{
    async fn handle(&self, envelope: EventEnvelope) -> Result<(), OrchestratorError> {
        (self.call)(envelope).await
    }
}

/// A minimal boxed-future alias so [`ServiceHandler`] doesn't need a
/// dependency on the `futures` crate just for `BoxFuture`.
mod futures_util_shim {
    use std::future::Future;
    use std::pin::Pin;
    pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;
}

pub struct AppContext {
    pub config: AppConfig,
    pub bus: Arc<LocalEventBus>,
    pub jobs: Arc<PgJobRecordStore>,
    pub counters: Arc<PgAssetCounterStore>,
    pub ledger: Arc<PgEventLedger>,
    pub phase: Arc<Phase>,
    pub matching: Arc<Matching>,
    pub watermarks: Arc<Watermarks>,
    pub status: Arc<Status>,
    pub admission: Arc<Admission>,
}

impl AppContext {
    pub async fn init(config: AppConfig) -> anyhow::Result<Self> {
        let pool = sqlx::postgres::PgPoolOptions::new().max_connections(10).connect(&config.postgres_dsn).await?;

        let ledger = Arc::new(PgEventLedger::new(pool.clone()));
        let counters = Arc::new(PgAssetCounterStore::new(pool.clone()));
        let jobs = Arc::new(PgJobRecordStore::new(pool.clone()));
        let features = Arc::new(PgFeatureStore::new(pool.clone()));
        let matches = Arc::new(PgMatchRepository::new(pool.clone()));
        let scorer = Arc::new(PgPairFeatureScorer::new(pool.clone()));

        let bus = Arc::new(LocalEventBus::new());

        let phase_config = PhaseServiceConfig {
            watermark_ttl: config.watermark_ttl(),
            default_top_k: Some(config.retrieval_topk),
            ..PhaseServiceConfig::default()
        };
        let phase = Arc::new(PhaseEventService::new(
            ledger.clone(),
            counters.clone(),
            jobs.clone(),
            bus.clone(),
            phase_config,
        ));

        let matching = Arc::new(MatchingEngine::new(
            features.clone(),
            scorer,
            matches.clone(),
            bus.clone(),
            config.matching_config(),
        ));

        let emitter = Arc::new(CompletionEmitter::new(counters.clone(), bus.clone(), config.watermark_ttl()));
        let watermarks = Arc::new(WatermarkScheduler::new(counters.clone(), emitter));

        let status = Arc::new(StatusQuery::new(jobs.clone(), features, matches));
        let admission = Arc::new(AdmissionService::new(jobs.clone(), bus.clone()));

        Ok(Self {
            config,
            bus,
            jobs,
            counters,
            ledger,
            phase,
            matching,
            watermarks,
            status,
            admission,
        })
    }

    /// Rebuilds in-flight watermark timers, then subscribes every
    /// phase/matching topic the service owns. Must run after `init` and
    /// before the bus starts delivering, so no message races a timer
    /// that hasn't been reconstructed yet.
    pub async fn subscribe_all(&self) -> anyhow::Result<()> {
        let rebuilt = self.watermarks.reconstruct().await?;
        info!(rebuilt, "watermark timers reconstructed");

        const PHASE_TOPICS: &[&str] = &[
            topics::PRODUCTS_IMAGE_READY,
            topics::PRODUCTS_IMAGES_READY_BATCH,
            topics::VIDEO_KEYFRAMES_READY,
            topics::VIDEO_KEYFRAMES_READY_BATCH,
            topics::IMAGE_EMBEDDING_READY,
            topics::IMAGE_KEYPOINT_READY,
            topics::VIDEO_EMBEDDING_READY,
            topics::VIDEO_KEYPOINT_READY,
            topics::IMAGE_EMBEDDINGS_COMPLETED,
            topics::IMAGE_KEYPOINTS_COMPLETED,
            topics::VIDEO_EMBEDDINGS_COMPLETED,
            topics::VIDEO_KEYPOINTS_COMPLETED,
            topics::PRODUCTS_COLLECTIONS_COMPLETED,
            topics::VIDEOS_COLLECTIONS_COMPLETED,
            topics::MATCHINGS_PROCESS_COMPLETED,
            topics::EVIDENCES_GENERATION_COMPLETED,
            topics::JOB_FAILED,
        ];

        for topic in PHASE_TOPICS.iter().copied() {
            let phase = self.phase.clone();
            self.bus
                .subscribe(
                    topic,
                    Arc::new(ServiceHandler {
                        call: move |envelope: EventEnvelope| {
                            let phase = phase.clone();
                            Box::pin(async move { phase.handle(envelope).await })
                        },
                    }),
                    self.config.prefetch,
                )
                .await?;
        }

        let matching = self.matching.clone();
        self.bus
            .subscribe(
                pvm_matching::topics::MATCH_REQUEST,
                Arc::new(ServiceHandler {
                    call: move |envelope: EventEnvelope| {
                        let matching = matching.clone();
                        Box::pin(async move { matching.handle_match_request(envelope).await })
                    },
                }),
                self.config.prefetch,
            )
            .await?;

        Ok(())
    }

    /// Blocks until a shutdown signal arrives. Nothing to drain for an
    /// in-process bus beyond letting in-flight handlers finish, which
    /// `main` does by simply returning after this resolves.
    pub async fn run_until_shutdown(&self) -> anyhow::Result<()> {
        tokio::signal::ctrl_c().await?;
        info!("shutdown signal received");
        Ok(())
    }
}
