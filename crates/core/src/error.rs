//! Core error type

use thiserror::Error;

/// Errors raised by core data-model operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("Unknown segment: {0}")]
    UnknownSegment(String),

    #[error("Unknown speaker role: {0}")]
    UnknownSpeakerRole(String),

    #[error("Unknown info field: {0}")]
    UnknownInfoField(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidFieldValue { field: String, message: String },

    #[error("Invalid journey: {0}")]
    InvalidJourney(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
