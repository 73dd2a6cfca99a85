//! The orchestrator binary: `init -> subscribe* -> serve -> shutdown`.
//!
//! Grounded on `fourthplaces-mntogether`'s `server/main.rs` bootstrap
//! shape (tracing init, pool connect, construct, serve) with the HTTP
//! surface dropped — this binary has no inbound API of its own; it is
//! purely a bus consumer. Job admission and status queries
//! (`pvm_service::admission`, `pvm_service::status`) are exposed as a
//! library surface for whatever process embeds them (spec.md's Non-goals
//! exclude the HTTP layer itself).

use pvm_service::{AppConfig, AppContext};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env()?;
    pvm_service::telemetry::init(&config.log_level);

    tracing::info!(bus_broker = %config.bus_broker, "starting orchestrator");

    let context = AppContext::init(config).await?;
    context.subscribe_all().await?;

    tracing::info!("orchestrator ready, awaiting events");
    context.run_until_shutdown().await?;

    Ok(())
}
