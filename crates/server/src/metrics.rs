//! Prometheus metrics

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
};
use call_assist_agent::ClassificationTier;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;

use crate::state::AppState;
use crate::ServerError;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the Prometheus recorder; call once at startup
pub fn init_metrics() -> Result<PrometheusHandle, ServerError> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| ServerError::Internal(format!("Failed to install Prometheus recorder: {}", e)))?;

    register_default_metrics();

    METRICS_HANDLE.get_or_init(|| handle.clone());
    Ok(handle)
}

pub fn get_metrics_handle() -> Option<&'static PrometheusHandle> {
    METRICS_HANDLE.get()
}

fn register_default_metrics() {
    gauge!("call_assist_sessions_active").set(0.0);
    counter!("call_assist_sessions_created_total").absolute(0);
    counter!("call_assist_sessions_ended_total", "reason" => "ended").absolute(0);
    counter!("call_assist_sessions_ended_total", "reason" => "expired").absolute(0);

    counter!("call_assist_chunks_total", "outcome" => "accepted").absolute(0);
    counter!("call_assist_chunks_total", "outcome" => "ignored_role").absolute(0);
    counter!("call_assist_chunks_total", "outcome" => "unknown_call").absolute(0);

    for tier in ["pattern", "model", "fallback"] {
        counter!("call_assist_classifications_total", "tier" => tier).absolute(0);
    }
    histogram!("call_assist_tier2_latency_seconds").record(0.0);
}

pub fn record_session_created() {
    counter!("call_assist_sessions_created_total").increment(1);
}

pub fn record_session_ended(reason: &'static str) {
    counter!("call_assist_sessions_ended_total", "reason" => reason).increment(1);
}

pub fn record_active_sessions(count: usize) {
    gauge!("call_assist_sessions_active").set(count as f64);
}

pub fn record_chunk(outcome: &'static str) {
    counter!("call_assist_chunks_total", "outcome" => outcome).increment(1);
}

pub fn record_classification(tier: ClassificationTier) {
    counter!("call_assist_classifications_total", "tier" => tier.as_str()).increment(1);
}

pub fn record_action(action: &str, success: bool) {
    let outcome = if success { "ok" } else { "rejected" };
    counter!(
        "call_assist_actions_total",
        "action" => action.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

pub fn record_broadcast(kind: &'static str) {
    counter!("call_assist_broadcasts_total", "type" => kind).increment(1);
}

/// `GET /metrics`
pub async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    record_active_sessions(state.registry.count());

    match get_metrics_handle() {
        Some(handle) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
            handle.render(),
        ),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            [(header::CONTENT_TYPE, "text/plain")],
            "Metrics not enabled".to_string(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recorders_without_exporter() {
        // No recorder installed; these must be no-ops
        record_session_created();
        record_session_ended("ended");
        record_chunk("accepted");
        record_classification(ClassificationTier::Model);
        record_action("confirm_station", false);
        record_broadcast("error");
    }
}
