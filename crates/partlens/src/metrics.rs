//! Alerting/metrics sink. Fire-and-forget: the resolver spawns dispatch and
//! never awaits it on the result path.

use async_trait::async_trait;
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
pub struct ResolutionEvent {
    pub request_id: Uuid,
    pub brand: Option<String>,
    pub resolved: bool,
    pub ambiguous: bool,
    pub confidence: f32,
    pub latency_ms: u64,
    pub degraded: bool,
    /// Served from the result cache rather than a fresh pipeline run.
    pub cached: bool,
}

#[async_trait]
pub trait MetricsSink: Send + Sync {
    async fn resolution_completed(&self, event: ResolutionEvent);
    async fn source_disabled(&self, adapter: &str);
}

/// Default sink: structured tracing events, nothing external.
pub struct LogSink;

#[async_trait]
impl MetricsSink for LogSink {
    async fn resolution_completed(&self, event: ResolutionEvent) {
        tracing::info!(
            request_id = %event.request_id,
            brand = event.brand.as_deref().unwrap_or("unknown"),
            resolved = event.resolved,
            ambiguous = event.ambiguous,
            confidence = event.confidence,
            latency_ms = event.latency_ms,
            degraded = event.degraded,
            cached = event.cached,
            "resolution completed"
        );
    }

    async fn source_disabled(&self, adapter: &str) {
        tracing::warn!(adapter, "source adapter disabled by health monitor");
    }
}
