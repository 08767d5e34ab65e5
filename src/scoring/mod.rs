//! Acoustic scoring behind a narrow capability interface.
//!
//! The decoder only needs, per frame, a log score for every label it may
//! extend into and a silence likelihood. Anything that can produce those
//! (the bundled template model, an ONNX network, a test double) plugs in
//! through [`ScoringProvider`].

mod model;
#[cfg(feature = "onnx")]
mod onnx;
mod template;

pub use model::{AcousticModel, LabelTemplate, ModelParameters};
#[cfg(feature = "onnx")]
pub use onnx::OnnxScorer;
pub use template::TemplateScorer;

use crate::error::IntentError;
use crate::grammar::LabelId;

/// Floor applied to log probabilities (`ln 1e-10`).
pub const MIN_LOG_PROB: f32 = -23.025_85;

pub trait ScoringProvider: Send {
    /// Vocabulary, indexed by [`LabelId`].
    fn labels(&self) -> &[String];

    /// Scores one frame. Only the labels in `active` must be written;
    /// `scores` arrives cleared to the vocabulary size.
    fn score_frame(
        &mut self,
        pcm: &[i16],
        active: &[LabelId],
        scores: &mut FrameScores,
    ) -> Result<(), IntentError>;

    /// Drops any state carried between frames.
    fn reset(&mut self) {}
}

impl<S: ScoringProvider + ?Sized> ScoringProvider for Box<S> {
    fn labels(&self) -> &[String] {
        (**self).labels()
    }

    fn score_frame(
        &mut self,
        pcm: &[i16],
        active: &[LabelId],
        scores: &mut FrameScores,
    ) -> Result<(), IntentError> {
        (**self).score_frame(pcm, active, scores)
    }

    fn reset(&mut self) {
        (**self).reset()
    }
}

/// Per-frame output of a [`ScoringProvider`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameScores {
    labels: Vec<f32>,
    silence: f32,
}

impl FrameScores {
    pub fn new(num_labels: usize) -> Self {
        let mut scores = Self::default();
        scores.clear(num_labels);
        scores
    }

    /// Marks every label unscored and the frame as non-silent.
    pub fn clear(&mut self, num_labels: usize) {
        self.labels.clear();
        self.labels.resize(num_labels, f32::NEG_INFINITY);
        self.silence = 0.0;
    }

    /// Log probability of `label`; unscored labels are `-inf`.
    pub fn label(&self, label: LabelId) -> f32 {
        self.labels.get(label).copied().unwrap_or(f32::NEG_INFINITY)
    }

    pub fn set_label(&mut self, label: LabelId, log_prob: f32) {
        if let Some(slot) = self.labels.get_mut(label) {
            *slot = if log_prob.is_nan() {
                f32::NEG_INFINITY
            } else {
                log_prob.min(0.0)
            };
        }
    }

    /// Silence likelihood in `[0, 1]`.
    pub fn silence(&self) -> f32 {
        self.silence
    }

    pub fn set_silence(&mut self, likelihood: f32) {
        self.silence = if likelihood.is_nan() {
            0.0
        } else {
            likelihood.clamp(0.0, 1.0)
        };
    }

    pub fn silence_log(&self) -> f32 {
        log_prob(self.silence)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

pub(crate) fn log_prob(p: f32) -> f32 {
    if p > 0.0 {
        p.ln().max(MIN_LOG_PROB)
    } else {
        MIN_LOG_PROB
    }
}
