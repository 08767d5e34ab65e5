use std::sync::Arc;

use ndarray::Array1;

use super::model::AcousticModel;
use super::{log_prob, FrameScores, ScoringProvider, MIN_LOG_PROB};
use crate::error::IntentError;
use crate::grammar::LabelId;
use crate::FRAME_LENGTH;

/// Scores frames by comparing band magnitudes against per-word templates.
///
/// Label posteriors come from a softmax over template similarities plus a
/// garbage class, scaled by the probability that the frame is not silence.
pub struct TemplateScorer {
    model: Arc<AcousticModel>,
    samples: Array1<f32>,
    logits: Vec<f32>,
}

impl TemplateScorer {
    pub fn new(model: Arc<AcousticModel>) -> Self {
        let labels = model.labels().len();
        Self {
            model,
            samples: Array1::zeros(FRAME_LENGTH),
            logits: Vec::with_capacity(labels),
        }
    }

    pub fn model(&self) -> &Arc<AcousticModel> {
        &self.model
    }
}

impl ScoringProvider for TemplateScorer {
    fn labels(&self) -> &[String] {
        self.model.labels()
    }

    fn score_frame(
        &mut self,
        pcm: &[i16],
        active: &[LabelId],
        scores: &mut FrameScores,
    ) -> Result<(), IntentError> {
        if pcm.len() != FRAME_LENGTH {
            return Err(IntentError::FrameLength {
                expected: FRAME_LENGTH,
                actual: pcm.len(),
            });
        }

        let model = &*self.model;
        for (dst, &s) in self.samples.iter_mut().zip(pcm) {
            *dst = s as f32 / 32768.0;
        }
        let rms = (self.samples.dot(&self.samples) / FRAME_LENGTH as f32).sqrt();

        let re = model.cos_basis.dot(&self.samples);
        let im = model.sin_basis.dot(&self.samples);
        let mut features = (&re * &re + &im * &im).mapv(f32::sqrt);
        let norm = features.dot(&features).sqrt();
        if norm > f32::EPSILON {
            features /= norm;
        } else {
            features.fill(0.0);
        }

        let similarities = model.templates.dot(&features);
        self.logits.clear();
        self.logits
            .extend(similarities.iter().map(|s| model.sharpness * s));
        let garbage = model.sharpness * model.garbage_similarity;

        let max = self.logits.iter().copied().fold(garbage, f32::max);
        let sum: f32 = self.logits.iter().map(|l| (l - max).exp()).sum::<f32>()
            + (garbage - max).exp();
        let log_norm = max + sum.ln();

        // p(silence) = sigmoid(z); ln(1 - p(silence)) = -softplus(z)
        let z = (model.silence_rms - rms) * model.silence_slope;
        let silence = 1.0 / (1.0 + (-z).exp());
        let log_speech = -(z.max(0.0) + (-z.abs()).exp().ln_1p());

        for &label in active {
            if let Some(&logit) = self.logits.get(label) {
                scores.set_label(label, (logit - log_norm + log_speech).max(MIN_LOG_PROB));
            }
        }
        scores.set_silence(silence);

        log::trace!(
            "Frame rms={:.4} silence={:.3} active={} speech_logp={:.2}",
            rms,
            silence,
            active.len(),
            log_prob(1.0 - silence)
        );
        Ok(())
    }
}
