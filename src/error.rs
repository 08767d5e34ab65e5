use std::collections::TryReserveError;

use thiserror::Error;

/// Outcome category reported for every failed operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    InvalidArgument,
    IoError,
    OutOfMemory,
    InvalidState,
}

/// Unified engine errors.
#[derive(Error, Debug)]
pub enum IntentError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid frame length: expected {expected}, got {actual}")]
    FrameLength { expected: usize, actual: usize },

    #[error("Sensitivity must be within [0, 1], got {0}")]
    Sensitivity(f32),

    #[error("Scoring failed: {0}")]
    Scoring(String),

    #[cfg(feature = "onnx")]
    #[error("ORT error: {0}")]
    Ort(#[from] ort::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid acoustic model: {0}")]
    InvalidModel(String),

    #[error("Invalid context: {0}")]
    InvalidContext(String),

    #[error("Audio decode error: {0}")]
    Audio(String),

    #[error("Allocation failed: {0}")]
    OutOfMemory(#[from] TryReserveError),

    #[error("Intent extraction is not finalized")]
    NotFinalized,

    #[error("Intent extraction is already finalized; reset the session first")]
    AlreadyFinalized,

    #[error("The utterance was not understood")]
    NotUnderstood,
}

impl IntentError {
    pub fn status(&self) -> Status {
        match self {
            Self::InvalidArgument(_)
            | Self::FrameLength { .. }
            | Self::Sensitivity(_)
            | Self::Scoring(_) => Status::InvalidArgument,
            #[cfg(feature = "onnx")]
            Self::Ort(_) => Status::InvalidArgument,
            Self::Io(_)
            | Self::Parse(_)
            | Self::InvalidModel(_)
            | Self::InvalidContext(_)
            | Self::Audio(_) => Status::IoError,
            Self::OutOfMemory(_) => Status::OutOfMemory,
            Self::NotFinalized | Self::AlreadyFinalized | Self::NotUnderstood => {
                Status::InvalidState
            }
        }
    }
}
