//! Real-time call guidance
//!
//! Features:
//! - Per-call funnel state machine with segment journey trees
//! - Tiered segment classifier (keyword patterns, then a language model)
//! - Debounced streaming classifier, one per call
//! - Info extraction from partial transcript text
//! - Fault-isolated event listeners

pub mod classifier;
pub mod events;
pub mod extractor;
pub mod machine;

pub use classifier::{
    ClassificationCallback, ClassificationResult, ClassificationTier, ClassifierError,
    ClassifyOptions, ModelClassifier, ModelVerdict, SegmentMatch, SegmentModel,
    StreamingClassifier, StreamingOptions, TieredClassifier,
};
pub use events::{EventBus, Listener, ListenerId};
pub use extractor::{InfoCallback, InfoUpdate, StreamingInfoExtractor};
pub use machine::{CallStateMachine, JourneyView};

use call_assist_core::FunnelStation;
use thiserror::Error;

/// Agent errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AgentError {
    #[error("Invalid transition from {from}: {reason}")]
    InvalidTransition { from: FunnelStation, reason: String },

    #[error("Journey error: {0}")]
    Journey(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<call_assist_core::Error> for AgentError {
    fn from(err: call_assist_core::Error) -> Self {
        AgentError::InvalidInput(err.to_string())
    }
}

impl From<serde_json::Error> for AgentError {
    fn from(err: serde_json::Error) -> Self {
        AgentError::Serialization(err.to_string())
    }
}
