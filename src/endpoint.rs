//! Decides when an utterance is over.
//!
//! The detector is one named state plus a handful of run-length counters.
//! It is fed one [`FrameEvidence`] per processed frame and only moves from
//! [`EndpointState::Listening`] to [`EndpointState::Finalized`].

use crate::config::DecoderConfig;
use crate::decoder::FrameSummary;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EndpointState {
    #[default]
    Listening,
    Finalized,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EndpointCounters {
    /// Frames processed since the last reset.
    pub frames: usize,
    /// Consecutive silent frames up to the current one.
    pub silence_run: usize,
    /// Consecutive frames in which no hypothesis left the start node.
    pub stalled_run: usize,
    /// Some hypothesis has left the start node at least once.
    pub speech_started: bool,
}

/// Why an utterance was finalized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointReason {
    /// Trailing silence after an accepted command.
    Complete,
    /// Long trailing silence without an accepted command.
    Incomplete,
    /// Nothing matched the start of any expression.
    NoSpeech,
    MaxLength,
    /// Best path is an accepted command and trailing silence is not required.
    Immediate,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameEvidence {
    pub silence: f32,
    pub advanced: bool,
    pub accepted_terminal: bool,
    pub best_is_accepted_terminal: bool,
}

impl FrameEvidence {
    pub fn new(silence: f32, summary: &FrameSummary) -> Self {
        Self {
            silence,
            advanced: summary.advanced,
            accepted_terminal: summary.accepted_terminal,
            best_is_accepted_terminal: summary.best_is_accepted_terminal,
        }
    }
}

/// Outcome of evaluating one frame, applied with [`EndpointDetector::apply`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndpointUpdate {
    pub counters: EndpointCounters,
    pub finalized: Option<EndpointReason>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EndpointDetector {
    state: EndpointState,
    counters: EndpointCounters,
}

impl EndpointDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> EndpointState {
        self.state
    }

    pub fn counters(&self) -> &EndpointCounters {
        &self.counters
    }

    pub fn is_finalized(&self) -> bool {
        self.state == EndpointState::Finalized
    }

    /// Computes the counters and decision for `evidence` without changing
    /// the detector.
    pub fn evaluate(&self, evidence: &FrameEvidence, config: &DecoderConfig) -> EndpointUpdate {
        let mut c = self.counters;
        c.frames += 1;
        if evidence.silence >= config.silence_threshold {
            c.silence_run += 1;
        } else {
            c.silence_run = 0;
        }
        if evidence.advanced {
            c.stalled_run = 0;
            c.speech_started = true;
        } else {
            c.stalled_run += 1;
        }

        let finalized = if c.speech_started
            && evidence.accepted_terminal
            && c.silence_run >= config.endpoint_frames()
        {
            Some(EndpointReason::Complete)
        } else if !config.require_endpoint && evidence.best_is_accepted_terminal {
            Some(EndpointReason::Immediate)
        } else if c.speech_started
            && !evidence.accepted_terminal
            && c.silence_run >= config.incomplete_frames()
        {
            Some(EndpointReason::Incomplete)
        } else if c.stalled_run >= config.no_speech_frames() {
            Some(EndpointReason::NoSpeech)
        } else if c.frames >= config.max_utterance_frames() {
            Some(EndpointReason::MaxLength)
        } else {
            None
        };

        EndpointUpdate {
            counters: c,
            finalized,
        }
    }

    pub fn apply(&mut self, update: EndpointUpdate) {
        if self.is_finalized() {
            return;
        }
        self.counters = update.counters;
        if update.finalized.is_some() {
            self.state = EndpointState::Finalized;
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
