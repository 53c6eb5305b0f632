//! Realtime gateway
//!
//! Routes transcript chunks and operator actions to the right session.
//! Outbound traffic is wired per session in the registry; the gateway only
//! adds the inbound side.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use call_assist_agent::{AgentError, JourneyView};
use call_assist_core::{CallState, CapturedInfo, Destination, Segment, SpeakerRole};

use crate::metrics;
use crate::session::{CallSession, SessionRegistry};
use crate::ServerError;

/// Closed set of operator actions
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "action", content = "payload", rename_all = "snake_case")]
pub enum OperatorAction {
    ConfirmStation,
    SelectSegment {
        segment: Segment,
    },
    SetQualified {
        qualified: bool,
        #[serde(default)]
        notes: Vec<String>,
    },
    SelectDestination {
        destination: Destination,
    },
    UpdateInfo(CapturedInfo),
    FastTrack,
    AdvanceJourney {
        #[serde(default)]
        option_id: Option<String>,
    },
    JourneyBack,
}

impl OperatorAction {
    pub const NAMES: [&'static str; 8] = [
        "confirm_station",
        "select_segment",
        "set_qualified",
        "select_destination",
        "update_info",
        "fast_track",
        "advance_journey",
        "journey_back",
    ];

    /// Parse an action name and its JSON payload
    pub fn parse(name: &str, payload: Value) -> Result<Self, String> {
        let name = name.trim();
        if !Self::NAMES.contains(&name) {
            return Err(format!("Unknown action '{}'", name));
        }

        let payload = match payload {
            Value::Null => Value::Object(Default::default()),
            other => other,
        };

        // Unit variants reject a payload, so leave it off for them
        let tagged = match name {
            "confirm_station" | "fast_track" | "journey_back" => {
                serde_json::json!({ "action": name })
            }
            _ => serde_json::json!({ "action": name, "payload": payload }),
        };
        serde_json::from_value(tagged).map_err(|e| format!("Invalid payload for '{}': {}", name, e))
    }

    pub fn name(&self) -> &'static str {
        match self {
            OperatorAction::ConfirmStation => "confirm_station",
            OperatorAction::SelectSegment { .. } => "select_segment",
            OperatorAction::SetQualified { .. } => "set_qualified",
            OperatorAction::SelectDestination { .. } => "select_destination",
            OperatorAction::UpdateInfo(_) => "update_info",
            OperatorAction::FastTrack => "fast_track",
            OperatorAction::AdvanceJourney { .. } => "advance_journey",
            OperatorAction::JourneyBack => "journey_back",
        }
    }
}

/// Outcome of an operator action; never an error past the API boundary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Current state, absent only when the call is unknown
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<CallState>,
}

impl ActionResult {
    fn ok(state: CallState) -> Self {
        Self {
            success: true,
            error: None,
            state: Some(state),
        }
    }

    fn failed(error: impl Into<String>, state: Option<CallState>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            state,
        }
    }
}

pub struct RealtimeGateway {
    registry: Arc<SessionRegistry>,
    classify_roles: Vec<SpeakerRole>,
}

impl RealtimeGateway {
    pub fn new(registry: Arc<SessionRegistry>, classify_roles: Vec<SpeakerRole>) -> Self {
        Self {
            registry,
            classify_roles,
        }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Get or create the session; the bool is true when it was created
    pub fn start_session(
        &self,
        call_id: &str,
        caller_ref: Option<String>,
    ) -> Result<(CallState, bool), ServerError> {
        let (session, created) = self.registry.start(call_id, caller_ref)?;
        Ok((session.snapshot(), created))
    }

    /// Route a transcript chunk; returns whether it was fed to the session
    ///
    /// Unknown calls are expected when delivery races teardown, so they are
    /// logged and dropped.
    pub fn submit_transcript_chunk(&self, call_id: &str, text: &str, role: SpeakerRole) -> bool {
        if !self.classify_roles.contains(&role) {
            tracing::trace!(call_id = %call_id, ?role, "Chunk ignored for speaker role");
            metrics::record_chunk("ignored_role");
            return false;
        }

        let Some(session) = self.live_session(call_id) else {
            tracing::debug!(call_id = %call_id, "Chunk for unknown call dropped");
            metrics::record_chunk("unknown_call");
            return false;
        };

        session.touch();
        session.feed(text);
        metrics::record_chunk("accepted");
        true
    }

    /// Apply a named operator action
    pub fn submit_operator_action(&self, call_id: &str, action: &str, payload: Value) -> ActionResult {
        let Some(session) = self.live_session(call_id) else {
            tracing::debug!(call_id = %call_id, action, "Action for unknown call dropped");
            metrics::record_action(action, false);
            return ActionResult::failed(format!("Call not found: {}", call_id), None);
        };
        session.touch();

        let parsed = match OperatorAction::parse(action, payload) {
            Ok(parsed) => parsed,
            Err(error) => {
                tracing::warn!(call_id = %call_id, action, error = %error, "Rejected operator action");
                metrics::record_action(action, false);
                return ActionResult::failed(error, Some(session.snapshot()));
            }
        };

        self.apply(&session, parsed)
    }

    /// Apply an already-parsed action
    pub fn apply(&self, session: &CallSession, action: OperatorAction) -> ActionResult {
        let name = action.name();
        let outcome = session.with_machine(|machine| -> Result<(), AgentError> {
            match action {
                OperatorAction::ConfirmStation => machine.confirm_station().map(|_| ()),
                OperatorAction::SelectSegment { segment } => {
                    machine.confirm_segment(segment);
                    Ok(())
                }
                OperatorAction::SetQualified { qualified, notes } => {
                    machine.set_qualified(qualified, notes)
                }
                OperatorAction::SelectDestination { destination } => {
                    machine.select_destination(destination)
                }
                OperatorAction::UpdateInfo(info) => {
                    machine.update_captured_info(&info);
                    Ok(())
                }
                OperatorAction::FastTrack => machine.fast_track_to_destination(),
                OperatorAction::AdvanceJourney { option_id } => {
                    machine.advance_journey(option_id.as_deref()).map(|_| ())
                }
                OperatorAction::JourneyBack => machine.go_back_in_journey().map(|_| ()),
            }
        });

        let state = session.snapshot();
        match outcome {
            Ok(()) => {
                tracing::info!(
                    call_id = %session.call_id,
                    action = name,
                    station = %state.current_station,
                    "Operator action applied"
                );
                metrics::record_action(name, true);
                ActionResult::ok(state)
            }
            Err(e) => {
                metrics::record_action(name, false);
                ActionResult::failed(e.to_string(), Some(state))
            }
        }
    }

    pub fn end_session(&self, call_id: &str) -> Option<CallState> {
        self.registry.end(call_id)
    }

    pub fn session_state(&self, call_id: &str) -> Option<CallState> {
        self.registry.get(call_id).map(|s| s.snapshot())
    }

    pub fn journey_view(&self, call_id: &str) -> Option<JourneyView> {
        self.registry.get(call_id).map(|s| s.journey_view())
    }

    fn live_session(&self, call_id: &str) -> Option<Arc<CallSession>> {
        self.registry.get(call_id).filter(|s| s.is_active())
    }
}
