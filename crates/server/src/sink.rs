//! Outbound broadcast messages and the sink they are pushed into

use call_assist_agent::{ClassificationResult, ClassificationTier, SegmentMatch};
use call_assist_core::{
    CallEvent, CallState, CapturedInfo, Destination, FunnelStation, InfoField, Segment,
};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Message pushed to UI clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundMessage {
    SessionStarted {
        call_id: String,
        state: CallState,
    },
    SegmentDetected {
        call_id: String,
        segment: Segment,
        confidence: u8,
        signals: Vec<String>,
        alternatives: Vec<SegmentMatch>,
        tier: ClassificationTier,
    },
    InfoCaptured {
        call_id: String,
        changed: Vec<InfoField>,
        captured_info: CapturedInfo,
    },
    StationUpdate {
        call_id: String,
        from: FunnelStation,
        to: FunnelStation,
        fast_track: bool,
        state: CallState,
    },
    SegmentConfirmed {
        call_id: String,
        segment: Segment,
        previous: Option<Segment>,
    },
    QualifiedSet {
        call_id: String,
        qualified: bool,
        notes: Vec<String>,
    },
    DestinationSelected {
        call_id: String,
        destination: Destination,
        state: CallState,
    },
    JourneyUpdate {
        call_id: String,
        event: CallEvent,
        state: CallState,
    },
    SessionEnded {
        call_id: String,
        final_state: CallState,
    },
    Error {
        call_id: String,
        message: String,
    },
}

impl OutboundMessage {
    pub fn call_id(&self) -> &str {
        match self {
            OutboundMessage::SessionStarted { call_id, .. }
            | OutboundMessage::SegmentDetected { call_id, .. }
            | OutboundMessage::InfoCaptured { call_id, .. }
            | OutboundMessage::StationUpdate { call_id, .. }
            | OutboundMessage::SegmentConfirmed { call_id, .. }
            | OutboundMessage::QualifiedSet { call_id, .. }
            | OutboundMessage::DestinationSelected { call_id, .. }
            | OutboundMessage::JourneyUpdate { call_id, .. }
            | OutboundMessage::SessionEnded { call_id, .. }
            | OutboundMessage::Error { call_id, .. } => call_id,
        }
    }

    /// Wire tag, also used as a metrics label
    pub fn kind(&self) -> &'static str {
        match self {
            OutboundMessage::SessionStarted { .. } => "session_started",
            OutboundMessage::SegmentDetected { .. } => "segment_detected",
            OutboundMessage::InfoCaptured { .. } => "info_captured",
            OutboundMessage::StationUpdate { .. } => "station_update",
            OutboundMessage::SegmentConfirmed { .. } => "segment_confirmed",
            OutboundMessage::QualifiedSet { .. } => "qualified_set",
            OutboundMessage::DestinationSelected { .. } => "destination_selected",
            OutboundMessage::JourneyUpdate { .. } => "journey_update",
            OutboundMessage::SessionEnded { .. } => "session_ended",
            OutboundMessage::Error { .. } => "error",
        }
    }

    pub fn segment_detected(call_id: &str, result: &ClassificationResult) -> Self {
        OutboundMessage::SegmentDetected {
            call_id: call_id.to_string(),
            segment: result.segment,
            confidence: result.confidence,
            signals: result.signals.clone(),
            alternatives: result.alternatives.clone(),
            tier: result.tier,
        }
    }

    /// Translate a state machine event
    ///
    /// `segment:detected` is skipped; the classifier callback broadcasts it
    /// with alternatives and tier attached.
    pub fn from_event(event: &CallEvent, state: &CallState) -> Option<Self> {
        let call_id = state.call_id.clone();
        let message = match event {
            CallEvent::StationChanged {
                from,
                to,
                fast_track,
            } => OutboundMessage::StationUpdate {
                call_id,
                from: *from,
                to: *to,
                fast_track: *fast_track,
                state: state.clone(),
            },
            CallEvent::SegmentDetected { .. } => return None,
            CallEvent::SegmentConfirmed { segment, previous } => OutboundMessage::SegmentConfirmed {
                call_id,
                segment: *segment,
                previous: *previous,
            },
            CallEvent::InfoCaptured { changed, info } => OutboundMessage::InfoCaptured {
                call_id,
                changed: changed.clone(),
                captured_info: info.clone(),
            },
            CallEvent::QualifiedSet { qualified, notes } => OutboundMessage::QualifiedSet {
                call_id,
                qualified: *qualified,
                notes: notes.clone(),
            },
            CallEvent::DestinationSelected { destination } => {
                OutboundMessage::DestinationSelected {
                    call_id,
                    destination: *destination,
                    state: state.clone(),
                }
            }
            CallEvent::Error { message } => OutboundMessage::Error {
                call_id,
                message: message.clone(),
            },
            journey => OutboundMessage::JourneyUpdate {
                call_id,
                event: journey.clone(),
                state: state.clone(),
            },
        };
        Some(message)
    }
}

/// Where outbound messages go; transport is the implementor's business
pub trait BroadcastSink: Send + Sync {
    fn send(&self, message: OutboundMessage);
}

/// Fan-out over a tokio broadcast channel
pub struct ChannelBroadcastSink {
    tx: broadcast::Sender<OutboundMessage>,
}

impl ChannelBroadcastSink {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<OutboundMessage> {
        self.tx.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl BroadcastSink for ChannelBroadcastSink {
    fn send(&self, message: OutboundMessage) {
        crate::metrics::record_broadcast(message.kind());
        // No subscribers is normal between UI connections
        if self.tx.send(message).is_err() {
            tracing::trace!("Broadcast dropped, no subscribers");
        }
    }
}
