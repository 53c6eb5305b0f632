//! Segment classification
//!
//! Tier 1 is a pure keyword matcher; Tier 2 asks a language model. The
//! [`TieredClassifier`] decides per call whether the Tier 1 answer is good
//! enough, and [`StreamingClassifier`] drives it from transcript chunks.

pub mod disqualify;
pub mod model;
pub mod pattern;
pub mod streaming;
pub mod tiered;

pub use disqualify::{disqualified_segments, is_disqualified};
pub use model::{ModelClassifier, ModelVerdict, SegmentModel};
pub use pattern::{confidence_for, match_segments};
pub use streaming::{ClassificationCallback, StreamingClassifier, StreamingOptions};
pub use tiered::{ClassifyOptions, TieredClassifier};

use call_assist_core::Segment;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Which tier produced a classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationTier {
    /// Keyword patterns
    Pattern,
    /// Language model
    Model,
    /// Tier 2 was attempted and failed; best Tier 1 guess or the default
    Fallback,
}

impl ClassificationTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClassificationTier::Pattern => "pattern",
            ClassificationTier::Model => "model",
            ClassificationTier::Fallback => "fallback",
        }
    }
}

impl fmt::Display for ClassificationTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One segment's Tier 1 score
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentMatch {
    pub segment: Segment,
    /// 0 - 95
    pub confidence: u8,
    /// Matched keywords, in keyword-list order
    pub signals: Vec<String>,
    pub match_count: usize,
}

/// Outcome of a classification pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub segment: Segment,
    /// 0 - 100
    pub confidence: u8,
    pub signals: Vec<String>,
    /// Runner-up Tier 1 matches, best first
    pub alternatives: Vec<SegmentMatch>,
    pub tier: ClassificationTier,
}

/// Tier 2 failures; never surfaced past the tiered classifier
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClassifierError {
    #[error("Model backend error: {0}")]
    Backend(String),

    #[error("Model request timed out after {0}ms")]
    Timeout(u64),

    #[error("Malformed model response: {0}")]
    MalformedResponse(String),

    #[error("Model returned unsupported segment: {0}")]
    UnknownSegment(String),
}

impl From<call_assist_llm::LlmError> for ClassifierError {
    fn from(err: call_assist_llm::LlmError) -> Self {
        ClassifierError::Backend(err.to_string())
    }
}
