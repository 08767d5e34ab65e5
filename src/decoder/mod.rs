use crate::config::DecoderConfig;
use crate::error::IntentError;

pub(crate) mod search;
pub(crate) mod session;
pub(crate) mod state;

pub use session::Session;
pub use state::{Cursor, FrameSummary, Hypothesis};

/// Trade-off between misses and false acceptances, within `[0, 1]`.
///
/// Higher values lower the confidence a command needs to be accepted. The
/// grammar network searched is the same at every sensitivity.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Sensitivity(f32);

impl Sensitivity {
    pub fn new(value: f32) -> Result<Self, IntentError> {
        if !(0.0..=1.0).contains(&value) {
            return Err(IntentError::Sensitivity(value));
        }
        Ok(Self(value))
    }

    pub fn value(self) -> f32 {
        self.0
    }

    /// Minimum confidence a complete command needs to be accepted.
    pub fn threshold(self, config: &DecoderConfig) -> f32 {
        config.max_confidence - self.0 * (config.max_confidence - config.min_confidence)
    }
}

impl Default for Sensitivity {
    fn default() -> Self {
        Self(0.5)
    }
}

impl TryFrom<f32> for Sensitivity {
    type Error = IntentError;

    fn try_from(value: f32) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}
