//! Call guidance server
//!
//! Session registry, realtime gateway, and the HTTP/WebSocket surface.

pub mod gateway;
pub mod http;
pub mod metrics;
pub mod session;
pub mod sink;
pub mod snapshot;
pub mod state;
pub mod websocket;

pub use gateway::{ActionResult, OperatorAction, RealtimeGateway};
pub use http::create_router;
pub use metrics::init_metrics;
pub use session::{CallSession, RegistryConfig, SessionDeps, SessionRegistry};
pub use sink::{BroadcastSink, ChannelBroadcastSink, OutboundMessage};
pub use snapshot::{InMemorySnapshotStore, SnapshotStore};
pub use state::AppState;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

/// Server errors
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Session error: {0}")]
    Session(String),

    #[error("Call not found: {0}")]
    NotFound(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Snapshot store error: {0}")]
    Snapshot(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<&ServerError> for StatusCode {
    fn from(err: &ServerError) -> Self {
        match err {
            ServerError::Session(_) => StatusCode::SERVICE_UNAVAILABLE,
            ServerError::NotFound(_) => StatusCode::NOT_FOUND,
            ServerError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ServerError::Snapshot(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ServerError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = StatusCode::from(&self);
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

impl From<serde_json::Error> for ServerError {
    fn from(err: serde_json::Error) -> Self {
        ServerError::InvalidRequest(err.to_string())
    }
}
