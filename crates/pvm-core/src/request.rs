//! Syntactic sugar for request/response over the event bus: publish a
//! request topic and await a correlated response topic, with a timeout.

use crate::bus::EventBus;
use crate::core::CorrelationId;
use crate::error::OrchestratorError;
use std::time::Duration;
use tokio::sync::oneshot;
use uuid::Uuid;

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Publish `payload` on `request_topic` and wait (up to
/// [`DEFAULT_REQUEST_TIMEOUT`]) for `wait_for` to resolve with the
/// matching response. `wait_for` is typically a subscription the caller
/// set up ahead of time that resolves its oneshot when a response bearing
/// the same correlation id arrives.
pub async fn dispatch_request<T>(
    bus: &dyn EventBus,
    request_topic: &str,
    job_id: Uuid,
    payload: serde_json::Value,
    correlation_id: CorrelationId,
    wait_for: oneshot::Receiver<T>,
) -> Result<T, OrchestratorError> {
    dispatch_request_timeout(
        bus,
        request_topic,
        job_id,
        payload,
        correlation_id,
        wait_for,
        DEFAULT_REQUEST_TIMEOUT,
    )
    .await
}

/// Like [`dispatch_request`] but with an explicit timeout, matching spec
/// §5's per-handler deadline.
pub async fn dispatch_request_timeout<T>(
    bus: &dyn EventBus,
    request_topic: &str,
    job_id: Uuid,
    payload: serde_json::Value,
    correlation_id: CorrelationId,
    wait_for: oneshot::Receiver<T>,
    timeout: Duration,
) -> Result<T, OrchestratorError> {
    bus.publish(request_topic, job_id, payload, correlation_id)
        .await?;

    match tokio::time::timeout(timeout, wait_for).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(_)) => Err(OrchestratorError::Logical(
            "response channel dropped before a reply arrived".to_string(),
        )),
        Err(_) => Err(OrchestratorError::Transient(anyhow::anyhow!(
            "timed out waiting for a response to '{request_topic}' after {:?}",
            timeout
        ))),
    }
}
