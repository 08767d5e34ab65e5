use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use crate::config::DecoderConfig;
use crate::endpoint::{EndpointDetector, FrameEvidence};
use crate::error::IntentError;
use crate::grammar::{ContextDefinition, Grammar};
use crate::result::{self, Intent};
use crate::scoring::{AcousticModel, FrameScores, ScoringProvider, TemplateScorer};
use crate::FRAME_LENGTH;

use super::search::Frontier;
use super::Sensitivity;

/// One streaming intent extraction over a shared grammar.
///
/// Feed frames with [`Session::process`] until it returns `true`, then read
/// the outcome with [`Session::is_understood`] and [`Session::intent`].
/// [`Session::reset`] starts a new utterance.
pub struct Session<S: ScoringProvider = TemplateScorer> {
    grammar: Arc<Grammar>,
    scorer: S,
    config: DecoderConfig,
    sensitivity: Sensitivity,
    threshold: f32,
    frontier: Frontier,
    endpoint: EndpointDetector,
    scores: FrameScores,
    outcome: Option<Intent>,
}

impl Session<TemplateScorer> {
    /// Loads the acoustic model and context, compiles the grammar and
    /// applies `INTENT_*` environment overrides to the default config.
    pub fn from_files<P: AsRef<Path>, Q: AsRef<Path>>(
        model_path: P,
        context_path: Q,
        sensitivity: f32,
    ) -> Result<Self, IntentError> {
        let sensitivity = Sensitivity::new(sensitivity)?;
        let model = Arc::new(AcousticModel::from_file(model_path)?);
        let context = ContextDefinition::from_file(context_path)?;
        let grammar = Arc::new(Grammar::compile(&context, model.labels())?);
        Self::new(
            grammar,
            TemplateScorer::new(model),
            sensitivity.value(),
            DecoderConfig::from_env(),
        )
    }
}

impl<S: ScoringProvider> Session<S> {
    pub fn new(
        grammar: Arc<Grammar>,
        scorer: S,
        sensitivity: f32,
        config: DecoderConfig,
    ) -> Result<Self, IntentError> {
        let sensitivity = Sensitivity::new(sensitivity)?;
        config.validate()?;
        if grammar.labels() != scorer.labels() {
            return Err(IntentError::InvalidArgument(format!(
                "grammar '{}' was compiled against a different vocabulary than the scorer",
                grammar.name()
            )));
        }

        let threshold = sensitivity.threshold(&config);
        log::debug!(
            "Session for '{}' ready: sensitivity {:.2}, threshold {:.3}, beam {}",
            grammar.name(),
            sensitivity.value(),
            threshold,
            config.beam_width
        );

        Ok(Self {
            frontier: Frontier::new(&grammar),
            scores: FrameScores::new(grammar.labels().len()),
            grammar,
            scorer,
            config,
            sensitivity,
            threshold,
            endpoint: EndpointDetector::new(),
            outcome: None,
        })
    }

    /// Consumes one frame of [`FRAME_LENGTH`] 16 kHz samples. Returns `true`
    /// once the utterance is finalized.
    ///
    /// On error nothing observable changes.
    pub fn process(&mut self, pcm: &[i16]) -> Result<bool, IntentError> {
        if self.endpoint.is_finalized() {
            return Err(IntentError::AlreadyFinalized);
        }
        if pcm.len() != FRAME_LENGTH {
            return Err(IntentError::FrameLength {
                expected: FRAME_LENGTH,
                actual: pcm.len(),
            });
        }

        self.scores.clear(self.grammar.labels().len());
        let active = self
            .frontier
            .active_labels(&self.grammar, self.config.min_word_frames);
        self.scorer.score_frame(pcm, active, &mut self.scores)?;

        let summary =
            self.frontier
                .prepare(&self.grammar, &self.scores, &self.config, self.threshold)?;
        let evidence = FrameEvidence::new(self.scores.silence(), &summary);
        let update = self.endpoint.evaluate(&evidence, &self.config);

        self.frontier.commit();
        self.endpoint.apply(update);

        let Some(reason) = update.finalized else {
            return Ok(false);
        };
        self.outcome = result::extract(
            &self.grammar,
            self.frontier.hypotheses(),
            self.config.min_word_frames,
            self.threshold,
        );
        log::info!(
            "Finalized after {} frames ({:?}): {}",
            update.counters.frames,
            reason,
            self.outcome
                .as_ref()
                .map_or("not understood", |intent| intent.name.as_str())
        );
        Ok(true)
    }

    /// Feeds `samples` frame by frame until the utterance is finalized or
    /// the samples run out. A trailing partial frame is padded with zeros.
    pub fn process_samples(&mut self, samples: &[i16]) -> Result<bool, IntentError> {
        let start = Instant::now();
        let mut frames = 0usize;
        let mut chunks = samples.chunks_exact(FRAME_LENGTH);
        for frame in chunks.by_ref() {
            frames += 1;
            if self.process(frame)? {
                log::debug!("Finalized on frame {} in {:?}", frames, start.elapsed());
                return Ok(true);
            }
        }

        let tail = chunks.remainder();
        if !tail.is_empty() {
            let mut padded = [0i16; FRAME_LENGTH];
            padded[..tail.len()].copy_from_slice(tail);
            return self.process(&padded);
        }
        Ok(false)
    }

    pub fn is_understood(&self) -> Result<bool, IntentError> {
        if !self.endpoint.is_finalized() {
            return Err(IntentError::NotFinalized);
        }
        Ok(self.outcome.is_some())
    }

    pub fn intent(&self) -> Result<Intent, IntentError> {
        if !self.endpoint.is_finalized() {
            return Err(IntentError::NotFinalized);
        }
        self.outcome.clone().ok_or(IntentError::NotUnderstood)
    }

    /// Abandons the current utterance and starts listening again.
    pub fn reset(&mut self) {
        self.frontier.reset(self.grammar.start());
        self.endpoint.reset();
        self.scorer.reset();
        self.outcome = None;
    }

    /// YAML-like listing of the expressions and slots the session accepts.
    pub fn context_info(&self) -> &str {
        self.grammar.describe()
    }

    pub fn grammar(&self) -> &Arc<Grammar> {
        &self.grammar
    }

    pub fn sensitivity(&self) -> Sensitivity {
        self.sensitivity
    }

    pub fn config(&self) -> &DecoderConfig {
        &self.config
    }

    pub fn endpoint(&self) -> &EndpointDetector {
        &self.endpoint
    }

    pub fn hypothesis_count(&self) -> usize {
        self.frontier.len()
    }

    pub fn is_finalized(&self) -> bool {
        self.endpoint.is_finalized()
    }
}
