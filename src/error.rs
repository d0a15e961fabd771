//! Error handling for Maqam
//!
//! Every pipeline stage reports failures through `MaqamError`. An empty
//! window batch is not an error; see `inference::Outcome::Empty`.

use thiserror::Error;

/// Result type alias for Maqam operations
pub type Result<T> = std::result::Result<T, MaqamError>;

/// Pipeline stage an error originated from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Load,
    Filter,
    Windowing,
    Inference,
    Config,
}

/// Main error type for Maqam operations
#[derive(Error, Debug)]
pub enum MaqamError {
    // Decode Errors
    #[error("File not found: {path}")]
    FileNotFound { path: String },

    #[error("Cannot decode audio: {reason}")]
    Decode {
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    // Filter Errors
    #[error("Band-pass filter error: {reason}")]
    Filter { reason: String },

    // Inference Errors
    #[error("Classifier error: {reason}")]
    Classifier { reason: String },

    // Parameter Errors
    #[error("Invalid parameter '{param}': got {value}, expected {expected}")]
    InvalidParameter {
        param: String,
        value: String,
        expected: String,
    },

    // I/O Errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization Errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl MaqamError {
    pub(crate) fn decode(reason: impl Into<String>) -> Self {
        MaqamError::Decode {
            reason: reason.into(),
            source: None,
        }
    }

    pub(crate) fn filter(reason: impl Into<String>) -> Self {
        MaqamError::Filter {
            reason: reason.into(),
        }
    }

    pub(crate) fn classifier(reason: impl Into<String>) -> Self {
        MaqamError::Classifier {
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid_parameter(
        param: &str,
        value: impl ToString,
        expected: &str,
    ) -> Self {
        MaqamError::InvalidParameter {
            param: param.to_string(),
            value: value.to_string(),
            expected: expected.to_string(),
        }
    }

    /// Get the error code for this error type
    pub fn error_code(&self) -> &'static str {
        match self {
            MaqamError::FileNotFound { .. } => "FILE_NOT_FOUND",
            MaqamError::Decode { .. } => "DECODE_ERROR",
            MaqamError::Filter { .. } => "FILTER_ERROR",
            MaqamError::Classifier { .. } => "CLASSIFIER_ERROR",
            MaqamError::InvalidParameter { .. } => "INVALID_PARAMETER",
            MaqamError::Io(_) => "IO_ERROR",
            MaqamError::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }

    /// Pipeline stage that produced this error
    pub fn stage(&self) -> Stage {
        match self {
            MaqamError::FileNotFound { .. } | MaqamError::Decode { .. } | MaqamError::Io(_) => {
                Stage::Load
            }
            MaqamError::Filter { .. } => Stage::Filter,
            MaqamError::Classifier { .. } => Stage::Inference,
            MaqamError::InvalidParameter { .. } => Stage::Windowing,
            MaqamError::Serialization(_) => Stage::Config,
        }
    }

    /// Get a user-friendly message for this error
    pub fn friendly_message(&self) -> String {
        match self {
            MaqamError::FileNotFound { path } => {
                format!("Could not find the recording at '{}'.", path)
            }
            MaqamError::Decode { reason, .. } => {
                format!(
                    "This file doesn't look like playable audio ({}). Try re-exporting it as WAV.",
                    reason
                )
            }
            MaqamError::Filter { .. } => {
                "The recording is too short to analyse. Please record a longer recitation."
                    .to_string()
            }
            MaqamError::Classifier { reason } => {
                format!("The classifier could not score this recording: {}", reason)
            }
            _ => self.to_string(),
        }
    }
}
