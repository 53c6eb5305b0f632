//! Core types for the call guidance engine
//!
//! This crate provides the data model shared by every other crate:
//! - Segments and routing destinations
//! - Per-call state (funnel station, captured info, journey cursor)
//! - Segment journey configuration types
//! - State-change events
//! - Error types

pub mod call;
pub mod error;
pub mod events;
pub mod journey;
pub mod segment;

pub use call::{CallState, CapturedInfo, FieldValue, FunnelStation, InfoField, SpeakerRole};
pub use error::{Error, Result};
pub use events::{CallEvent, EventKind};
pub use journey::{
    JourneyStation, OptionAction, OptionCondition, SegmentJourney, StationKind, StationOption,
};
pub use segment::{Destination, Segment};
