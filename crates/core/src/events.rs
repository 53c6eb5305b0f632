//! Events emitted by the call state machine

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::call::{CapturedInfo, FieldValue, FunnelStation, InfoField};
use crate::segment::{Destination, Segment};

/// Event tag used for listener registration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventKind {
    StationChanged,
    SegmentDetected,
    SegmentConfirmed,
    InfoCaptured,
    QualifiedSet,
    DestinationSelected,
    JourneyStarted,
    JourneyAdvanced,
    JourneyBack,
    JourneyCompleted,
    JourneyReset,
    JourneyFlag,
    Error,
}

impl EventKind {
    pub const ALL: [EventKind; 13] = [
        EventKind::StationChanged,
        EventKind::SegmentDetected,
        EventKind::SegmentConfirmed,
        EventKind::InfoCaptured,
        EventKind::QualifiedSet,
        EventKind::DestinationSelected,
        EventKind::JourneyStarted,
        EventKind::JourneyAdvanced,
        EventKind::JourneyBack,
        EventKind::JourneyCompleted,
        EventKind::JourneyReset,
        EventKind::JourneyFlag,
        EventKind::Error,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::StationChanged => "station:changed",
            EventKind::SegmentDetected => "segment:detected",
            EventKind::SegmentConfirmed => "segment:confirmed",
            EventKind::InfoCaptured => "info:captured",
            EventKind::QualifiedSet => "qualified:set",
            EventKind::DestinationSelected => "destination:selected",
            EventKind::JourneyStarted => "journey:started",
            EventKind::JourneyAdvanced => "journey:advanced",
            EventKind::JourneyBack => "journey:back",
            EventKind::JourneyCompleted => "journey:completed",
            EventKind::JourneyReset => "journey:reset",
            EventKind::JourneyFlag => "journey:flag",
            EventKind::Error => "error",
        }
    }

    /// Whether the event belongs to the `journey:*` family
    pub fn is_journey(&self) -> bool {
        self.as_str().starts_with("journey:")
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A state change notification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CallEvent {
    StationChanged {
        from: FunnelStation,
        to: FunnelStation,
        fast_track: bool,
    },
    SegmentDetected {
        segment: Segment,
        confidence: u8,
        signals: Vec<String>,
    },
    SegmentConfirmed {
        segment: Segment,
        previous: Option<Segment>,
    },
    InfoCaptured {
        changed: Vec<InfoField>,
        info: CapturedInfo,
    },
    QualifiedSet {
        qualified: bool,
        notes: Vec<String>,
    },
    DestinationSelected {
        destination: Destination,
    },
    JourneyStarted {
        segment: Segment,
        station: String,
    },
    JourneyAdvanced {
        from: String,
        to: String,
        option_id: Option<String>,
    },
    JourneyBack {
        from: Option<String>,
        to: String,
    },
    JourneyCompleted {
        station: String,
        option_id: Option<String>,
    },
    JourneyReset {
        segment: Option<Segment>,
    },
    JourneyFlag {
        flag: String,
        value: FieldValue,
    },
    Error {
        message: String,
    },
}

impl CallEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            CallEvent::StationChanged { .. } => EventKind::StationChanged,
            CallEvent::SegmentDetected { .. } => EventKind::SegmentDetected,
            CallEvent::SegmentConfirmed { .. } => EventKind::SegmentConfirmed,
            CallEvent::InfoCaptured { .. } => EventKind::InfoCaptured,
            CallEvent::QualifiedSet { .. } => EventKind::QualifiedSet,
            CallEvent::DestinationSelected { .. } => EventKind::DestinationSelected,
            CallEvent::JourneyStarted { .. } => EventKind::JourneyStarted,
            CallEvent::JourneyAdvanced { .. } => EventKind::JourneyAdvanced,
            CallEvent::JourneyBack { .. } => EventKind::JourneyBack,
            CallEvent::JourneyCompleted { .. } => EventKind::JourneyCompleted,
            CallEvent::JourneyReset { .. } => EventKind::JourneyReset,
            CallEvent::JourneyFlag { .. } => EventKind::JourneyFlag,
            CallEvent::Error { .. } => EventKind::Error,
        }
    }
}
