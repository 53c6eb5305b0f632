//! WebSocket Handler
//!
//! Pushes every broadcast message to connected operator UIs, optionally
//! filtered to one call, and accepts inbound transcript and action frames.

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast::error::RecvError;

use call_assist_core::{CallState, SpeakerRole};

use crate::gateway::ActionResult;
use crate::state::AppState;

/// Frames sent by clients
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundFrame {
    StartSession {
        call_id: Option<String>,
        #[serde(default)]
        caller_ref: Option<String>,
    },
    Transcript {
        call_id: String,
        text: String,
        #[serde(default = "caller")]
        speaker: SpeakerRole,
    },
    Action {
        call_id: String,
        action: String,
        #[serde(default)]
        payload: Value,
    },
    EndSession {
        call_id: String,
    },
    Ping,
}

fn caller() -> SpeakerRole {
    SpeakerRole::Caller
}

/// Direct replies to a client frame
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReplyFrame {
    SessionInfo {
        call_id: String,
        created: bool,
        state: CallState,
    },
    ActionResult {
        call_id: String,
        action: String,
        #[serde(flatten)]
        result: ActionResult,
    },
    Error {
        message: String,
    },
    Pong,
}

#[derive(Debug, Default, Deserialize)]
pub struct WsParams {
    /// Only forward broadcasts for this call
    pub call_id: Option<String>,
}

/// `GET /ws`
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(params): Query<WsParams>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state, params.call_id))
}

async fn handle_socket(socket: WebSocket, state: AppState, filter: Option<String>) {
    let (sender, mut receiver) = socket.split();
    let sender = Arc::new(tokio::sync::Mutex::new(sender));
    let mut broadcasts = state.sink.subscribe();

    tracing::info!(call_id = ?filter, "WebSocket client connected");

    // Outbound fan-out
    let fan_out_sender = sender.clone();
    let fan_out_filter = filter.clone();
    let fan_out = tokio::spawn(async move {
        loop {
            let message = match broadcasts.recv().await {
                Ok(message) => message,
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "WebSocket client lagging, messages dropped");
                    continue;
                }
                Err(RecvError::Closed) => break,
            };
            if let Some(call_id) = &fan_out_filter {
                if message.call_id() != call_id {
                    continue;
                }
            }
            let text = match serde_json::to_string(&message) {
                Ok(text) => text,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to serialize broadcast");
                    continue;
                }
            };
            if fan_out_sender.lock().await.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    // Inbound frames
    while let Some(frame) = receiver.next().await {
        let text = match frame {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                tracing::debug!(error = %e, "WebSocket receive error");
                break;
            }
        };

        let reply = match serde_json::from_str::<InboundFrame>(&text) {
            Ok(frame) => handle_frame(&state, frame),
            Err(e) => Some(ReplyFrame::Error {
                message: format!("Invalid frame: {}", e),
            }),
        };

        if let Some(reply) = reply {
            let Ok(text) = serde_json::to_string(&reply) else {
                continue;
            };
            if sender.lock().await.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    }

    fan_out.abort();
    tracing::info!(call_id = ?filter, "WebSocket client disconnected");
}

fn handle_frame(state: &AppState, frame: InboundFrame) -> Option<ReplyFrame> {
    match frame {
        InboundFrame::StartSession {
            call_id,
            caller_ref,
        } => {
            let call_id = call_id
                .filter(|id| !id.trim().is_empty())
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
            match state.gateway.start_session(&call_id, caller_ref) {
                Ok((call_state, created)) => Some(ReplyFrame::SessionInfo {
                    call_id,
                    created,
                    state: call_state,
                }),
                Err(e) => Some(ReplyFrame::Error {
                    message: e.to_string(),
                }),
            }
        }
        InboundFrame::Transcript {
            call_id,
            text,
            speaker,
        } => {
            state
                .gateway
                .submit_transcript_chunk(&call_id, &text, speaker);
            None
        }
        InboundFrame::Action {
            call_id,
            action,
            payload,
        } => {
            let result = state
                .gateway
                .submit_operator_action(&call_id, &action, payload);
            Some(ReplyFrame::ActionResult {
                call_id,
                action,
                result,
            })
        }
        // session_ended is broadcast to every client
        InboundFrame::EndSession { call_id } => match state.gateway.end_session(&call_id) {
            Some(_) => None,
            None => Some(ReplyFrame::Error {
                message: format!("Call not found: {}", call_id),
            }),
        },
        InboundFrame::Ping => Some(ReplyFrame::Pong),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use call_assist_config::{JourneyCatalog, Settings};

    fn state() -> AppState {
        AppState::new(Settings::default(), JourneyCatalog::builtin(), None)
    }

    fn frame(json: Value) -> InboundFrame {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn test_inbound_frame_shapes() {
        assert!(matches!(
            frame(serde_json::json!({"type": "ping"})),
            InboundFrame::Ping
        ));
        match frame(serde_json::json!({"type": "transcript", "call_id": "c1", "text": "hi"})) {
            InboundFrame::Transcript { speaker, .. } => assert_eq!(speaker, SpeakerRole::Caller),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_frames_drive_gateway() {
        let state = state();

        let reply = handle_frame(
            &state,
            frame(serde_json::json!({"type": "start_session", "call_id": "c1"})),
        );
        assert!(matches!(reply, Some(ReplyFrame::SessionInfo { created: true, .. })));

        let reply = handle_frame(
            &state,
            frame(serde_json::json!({"type": "transcript", "call_id": "c1", "text": "my radiator is broken"})),
        );
        assert!(reply.is_none());

        let reply = handle_frame(
            &state,
            frame(serde_json::json!({"type": "action", "call_id": "c1", "action": "confirm_station"})),
        );
        match reply {
            Some(ReplyFrame::ActionResult { result, .. }) => assert!(result.success),
            other => panic!("unexpected {:?}", other),
        }

        let reply = handle_frame(&state, frame(serde_json::json!({"type": "end_session", "call_id": "c1"})));
        assert!(reply.is_none());
        let reply = handle_frame(&state, frame(serde_json::json!({"type": "end_session", "call_id": "c1"})));
        assert!(matches!(reply, Some(ReplyFrame::Error { .. })));
    }

    #[test]
    fn test_action_result_reply_is_flat() {
        let reply = ReplyFrame::ActionResult {
            call_id: "c1".into(),
            action: "fast_track".into(),
            result: ActionResult {
                success: false,
                error: Some("no job".into()),
                state: None,
            },
        };
        let json = serde_json::to_value(&reply).unwrap();
        assert_eq!(json["type"], "action_result");
        assert_eq!(json["success"], false);
        assert_eq!(json["error"], "no job");
    }
}
