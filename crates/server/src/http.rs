//! HTTP Endpoints
//!
//! REST API for call sessions, transcript intake and operator actions.

use std::time::Duration;

use axum::{
    extract::{Path, State},
    http::{HeaderValue, Method, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::Value;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use call_assist_core::SpeakerRole;

use crate::metrics::metrics_handler;
use crate::state::AppState;
use crate::websocket::ws_handler;
use crate::ServerError;

/// Create the application router
pub fn create_router(state: AppState) -> Router {
    let cors_layer = build_cors_layer(
        &state.config.server.cors_origins,
        state.config.server.cors_enabled,
    );
    let timeout = Duration::from_secs(state.config.server.request_timeout_secs);

    Router::new()
        // Call sessions
        .route("/api/calls", post(start_call).get(list_calls))
        .route("/api/calls/:id", get(get_call).delete(end_call))
        .route("/api/calls/:id/transcript", post(submit_transcript))
        .route("/api/calls/:id/actions", post(submit_action))
        .route("/api/calls/:id/journey", get(get_journey))
        // Health check
        .route("/health", get(health_check))
        .route("/metrics", get(metrics_handler))
        // Realtime fan-out
        .route("/ws", get(ws_handler))
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(timeout))
        .layer(cors_layer)
        .with_state(state)
}

const DEV_ORIGIN: &str = "http://localhost:3000";

/// Build CORS layer from configured origins
///
/// - disabled: permissive, for local development
/// - no origins, or none valid: localhost:3000 only
fn build_cors_layer(origins: &[String], enabled: bool) -> CorsLayer {
    let methods = [Method::GET, Method::POST, Method::DELETE, Method::OPTIONS];

    if !enabled {
        tracing::warn!("CORS is disabled - allowing all origins (NOT FOR PRODUCTION)");
        return CorsLayer::permissive();
    }

    let parsed_origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| {
            origin.parse::<HeaderValue>().ok().or_else(|| {
                tracing::warn!(origin = %origin, "Invalid CORS origin");
                None
            })
        })
        .collect();

    if parsed_origins.is_empty() {
        if !origins.is_empty() {
            tracing::error!("All configured CORS origins are invalid, falling back to localhost");
        } else {
            tracing::info!("No CORS origins configured, defaulting to {}", DEV_ORIGIN);
        }
        return CorsLayer::new()
            .allow_origin(HeaderValue::from_static(DEV_ORIGIN))
            .allow_methods(methods)
            .allow_headers(Any);
    }

    tracing::info!(count = parsed_origins.len(), "CORS configured");
    CorsLayer::new()
        .allow_origin(parsed_origins)
        .allow_methods(methods)
        .allow_headers(Any)
}

#[derive(Debug, Default, Deserialize)]
struct StartCallRequest {
    #[serde(default)]
    call_id: Option<String>,
    #[serde(default)]
    caller_ref: Option<String>,
}

/// Start (or rejoin) a call session
async fn start_call(
    State(state): State<AppState>,
    body: Option<Json<StartCallRequest>>,
) -> Result<impl IntoResponse, ServerError> {
    let request = body.map(|Json(r)| r).unwrap_or_default();
    let call_id = request
        .call_id
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let (call_state, created) = state.gateway.start_session(&call_id, request.caller_ref)?;
    let status = if created { StatusCode::CREATED } else { StatusCode::OK };
    Ok((
        status,
        Json(serde_json::json!({
            "call_id": call_state.call_id,
            "created": created,
            "state": call_state,
        })),
    ))
}

async fn list_calls(State(state): State<AppState>) -> Json<Value> {
    let calls = state.registry.list();
    Json(serde_json::json!({
        "count": calls.len(),
        "calls": calls,
    }))
}

async fn get_call(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ServerError> {
    let session = state
        .registry
        .get(&id)
        .ok_or_else(|| ServerError::NotFound(id.clone()))?;

    let snapshot = session.snapshot();
    Ok(Json(serde_json::json!({
        "call_id": session.call_id,
        "active": session.is_active(),
        "transcript": session.transcript(),
        "guidance": snapshot.current_station.guidance(),
        "state": snapshot,
    })))
}

async fn end_call(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ServerError> {
    let final_state = state
        .gateway
        .end_session(&id)
        .ok_or_else(|| ServerError::NotFound(id.clone()))?;
    Ok(Json(serde_json::json!({ "final_state": final_state })))
}

#[derive(Debug, Deserialize)]
struct TranscriptRequest {
    text: String,
    #[serde(default = "default_speaker")]
    speaker: SpeakerRole,
}

fn default_speaker() -> SpeakerRole {
    SpeakerRole::Caller
}

/// Feed a transcript chunk
///
/// Chunks for ended calls are accepted and dropped; `fed` reports whether the
/// chunk reached classification.
async fn submit_transcript(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<TranscriptRequest>,
) -> (StatusCode, Json<Value>) {
    let fed = state
        .gateway
        .submit_transcript_chunk(&id, &request.text, request.speaker);
    (StatusCode::ACCEPTED, Json(serde_json::json!({ "fed": fed })))
}

#[derive(Debug, Deserialize)]
struct ActionRequest {
    action: String,
    #[serde(default)]
    payload: Value,
}

async fn submit_action(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<ActionRequest>,
) -> Result<impl IntoResponse, ServerError> {
    if state.registry.get(&id).is_none() {
        return Err(ServerError::NotFound(id));
    }

    let result = state
        .gateway
        .submit_operator_action(&id, &request.action, request.payload);
    let status = if result.success {
        StatusCode::OK
    } else {
        StatusCode::BAD_REQUEST
    };
    Ok((status, Json(result)))
}

async fn get_journey(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ServerError> {
    state
        .gateway
        .journey_view(&id)
        .map(Json)
        .ok_or(ServerError::NotFound(id))
}

async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "sessions": state.registry.count(),
        "tier2_enabled": state.tier2_enabled,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use call_assist_config::{JourneyCatalog, Settings};
    use call_assist_core::FunnelStation;
    use tower::ServiceExt;

    fn app() -> (Router, AppState) {
        let state = AppState::new(Settings::default(), JourneyCatalog::builtin(), None);
        (create_router(state.clone()), state)
    }

    fn json_request(method: Method, uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn read_json(response: axum::response::Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let (app, _) = app();
        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = read_json(response).await;
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["tier2_enabled"], false);
    }

    #[tokio::test]
    async fn test_start_call_created_then_existing() {
        let (app, _) = app();
        let body = serde_json::json!({ "call_id": "call-1", "caller_ref": "+441170000000" });

        let response = app
            .clone()
            .oneshot(json_request(Method::POST, "/api/calls", body.clone()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let json = read_json(response).await;
        assert_eq!(json["state"]["current_station"], "LISTEN");

        let response = app
            .oneshot(json_request(Method::POST, "/api/calls", body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_transcript_then_action() {
        let (app, state) = app();
        state.gateway.start_session("call-1", None).unwrap();

        let response = app
            .clone()
            .oneshot(json_request(
                Method::POST,
                "/api/calls/call-1/transcript",
                serde_json::json!({ "text": "can you fix my boiler" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert_eq!(read_json(response).await["fed"], true);

        let response = app
            .clone()
            .oneshot(json_request(
                Method::POST,
                "/api/calls/call-1/actions",
                serde_json::json!({ "action": "confirm_station" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = read_json(response).await;
        assert_eq!(json["success"], true);
        assert_eq!(json["state"]["current_station"], "SEGMENT");

        let response = app
            .clone()
            .oneshot(Request::get("/api/calls/call-1").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let json = read_json(response).await;
        assert_eq!(json["transcript"], "can you fix my boiler");
        assert_eq!(json["guidance"], FunnelStation::Segment.guidance());

        let response = app
            .oneshot(json_request(
                Method::POST,
                "/api/calls/call-1/actions",
                serde_json::json!({ "action": "select_destination", "payload": { "destination": "callback" } }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(read_json(response).await["success"], false);
    }

    #[tokio::test]
    async fn test_unknown_call_is_not_found() {
        let (app, _) = app();
        for request in [
            Request::get("/api/calls/ghost").body(Body::empty()).unwrap(),
            Request::get("/api/calls/ghost/journey").body(Body::empty()).unwrap(),
            Request::delete("/api/calls/ghost").body(Body::empty()).unwrap(),
            json_request(
                Method::POST,
                "/api/calls/ghost/actions",
                serde_json::json!({ "action": "confirm_station" }),
            ),
        ] {
            let response = app.clone().oneshot(request).await.unwrap();
            assert_eq!(response.status(), StatusCode::NOT_FOUND);
        }
    }

    #[tokio::test]
    async fn test_journey_view_after_segment_confirmed() {
        let (app, state) = app();
        state.gateway.start_session("call-1", None).unwrap();
        let result = state.gateway.submit_operator_action(
            "call-1",
            "select_segment",
            serde_json::json!({ "segment": "tenant" }),
        );
        assert!(result.success);

        let response = app
            .oneshot(Request::get("/api/calls/call-1/journey").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = read_json(response).await;
        assert_eq!(json["current"]["id"], "relationship");
    }

    #[tokio::test]
    async fn test_end_call_returns_final_state() {
        let (app, state) = app();
        state.gateway.start_session("call-1", None).unwrap();
        let response = app
            .oneshot(Request::delete("/api/calls/call-1").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(read_json(response).await["final_state"]["call_id"], "call-1");
        assert_eq!(state.registry.count(), 0);
    }
}
