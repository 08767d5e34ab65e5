pub mod audio_io;
pub mod config;
pub mod decoder;
pub mod endpoint;
pub mod engine;
pub mod error;
pub mod grammar;
pub mod result;
pub mod scoring;

pub use config::DecoderConfig;
pub use decoder::{Sensitivity, Session};
pub use engine::EngineBuilder;
pub use error::{IntentError, Status};
pub use grammar::{ContextDefinition, Grammar};
pub use result::Intent;
pub use scoring::{AcousticModel, FrameScores, ScoringProvider, TemplateScorer};

/// Number of samples the engine consumes per frame.
pub const FRAME_LENGTH: usize = 512;

/// Sample rate (Hz) of the PCM the engine accepts.
pub const SAMPLE_RATE: u32 = 16_000;

pub(crate) const FRAME_DURATION_MS: u32 = (FRAME_LENGTH as u32 * 1000) / SAMPLE_RATE;

/// Semantic version of the engine.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

pub fn frame_length() -> usize {
    FRAME_LENGTH
}

pub fn sample_rate() -> u32 {
    SAMPLE_RATE
}
