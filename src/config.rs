use crate::error::IntentError;
use crate::FRAME_DURATION_MS;

const ENV_PREFIX: &str = "INTENT_";

/// Tunable search and endpointing parameters.
///
/// Durations are in milliseconds and are turned into whole frames (rounded
/// up) by the `*_frames` accessors.
#[derive(Debug, Clone, PartialEq)]
pub struct DecoderConfig {
    /// Maximum number of hypotheses kept after each frame.
    pub beam_width: usize,
    /// Hypotheses scoring more than this below the best one are dropped.
    pub prune_margin: f32,
    /// Minimum label posterior needed to start a word.
    pub entry_floor: f32,
    /// Frames a word must span before the path may leave it.
    pub min_word_frames: usize,
    /// Frames with a silence likelihood at or above this count as silence.
    pub silence_threshold: f32,
    /// Trailing silence that finalizes a complete command.
    pub endpoint_ms: u32,
    /// Trailing silence that finalizes an incomplete or rejected command.
    pub incomplete_ms: u32,
    /// Frames without any path leaving the root before giving up.
    pub no_speech_ms: u32,
    /// Hard cap on the utterance length.
    pub max_utterance_ms: u32,
    /// When false, a confident complete command finalizes without waiting
    /// for trailing silence.
    pub require_endpoint: bool,
    /// Acceptance threshold at sensitivity 1.
    pub min_confidence: f32,
    /// Acceptance threshold at sensitivity 0.
    pub max_confidence: f32,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            beam_width: 64,
            prune_margin: 40.0,
            entry_floor: 0.05,
            min_word_frames: 2,
            silence_threshold: 0.5,
            endpoint_ms: 1000,
            incomplete_ms: 2000,
            no_speech_ms: 3000,
            max_utterance_ms: 10_000,
            require_endpoint: true,
            min_confidence: 0.25,
            max_confidence: 0.9,
        }
    }
}

impl DecoderConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides(ENV_PREFIX);
        config
    }

    fn apply_env_overrides(&mut self, prefix: &str) {
        let parse_env = |suffix: &str| std::env::var(format!("{prefix}{suffix}")).ok();

        fn apply<T: std::str::FromStr>(name: &str, raw: Option<String>, target: &mut T) {
            if let Some(raw) = raw {
                match raw.parse() {
                    Ok(v) => *target = v,
                    Err(_) => log::warn!("Ignoring invalid {name} value '{raw}'"),
                }
            }
        }

        apply("BEAM_WIDTH", parse_env("BEAM_WIDTH"), &mut self.beam_width);
        apply("PRUNE_MARGIN", parse_env("PRUNE_MARGIN"), &mut self.prune_margin);
        apply("ENTRY_FLOOR", parse_env("ENTRY_FLOOR"), &mut self.entry_floor);
        apply(
            "MIN_WORD_FRAMES",
            parse_env("MIN_WORD_FRAMES"),
            &mut self.min_word_frames,
        );
        apply(
            "SILENCE_THRESHOLD",
            parse_env("SILENCE_THRESHOLD"),
            &mut self.silence_threshold,
        );
        apply("ENDPOINT_MS", parse_env("ENDPOINT_MS"), &mut self.endpoint_ms);
        apply("INCOMPLETE_MS", parse_env("INCOMPLETE_MS"), &mut self.incomplete_ms);
        apply("NO_SPEECH_MS", parse_env("NO_SPEECH_MS"), &mut self.no_speech_ms);
        apply(
            "MAX_UTTERANCE_MS",
            parse_env("MAX_UTTERANCE_MS"),
            &mut self.max_utterance_ms,
        );
        apply(
            "REQUIRE_ENDPOINT",
            parse_env("REQUIRE_ENDPOINT"),
            &mut self.require_endpoint,
        );
        apply(
            "MIN_CONFIDENCE",
            parse_env("MIN_CONFIDENCE"),
            &mut self.min_confidence,
        );
        apply(
            "MAX_CONFIDENCE",
            parse_env("MAX_CONFIDENCE"),
            &mut self.max_confidence,
        );
    }

    pub fn validate(&self) -> Result<(), IntentError> {
        let invalid = |msg: &str| Err(IntentError::InvalidArgument(msg.to_string()));
        if self.beam_width == 0 {
            return invalid("beam_width must be at least 1");
        }
        if !(self.prune_margin.is_finite() && self.prune_margin > 0.0) {
            return invalid("prune_margin must be a positive number");
        }
        if !(self.entry_floor > 0.0 && self.entry_floor < 1.0) {
            return invalid("entry_floor must be within (0, 1)");
        }
        if self.min_word_frames == 0 {
            return invalid("min_word_frames must be at least 1");
        }
        if !(0.0..=1.0).contains(&self.silence_threshold) {
            return invalid("silence_threshold must be within [0, 1]");
        }
        if self.endpoint_ms == 0 || self.incomplete_ms == 0 || self.no_speech_ms == 0 {
            return invalid("endpoint durations must be positive");
        }
        if self.max_utterance_ms < self.endpoint_ms {
            return invalid("max_utterance_ms must not be shorter than endpoint_ms");
        }
        if !(0.0 < self.min_confidence
            && self.min_confidence <= self.max_confidence
            && self.max_confidence < 1.0)
        {
            return invalid("confidence bounds must satisfy 0 < min <= max < 1");
        }
        Ok(())
    }

    pub fn endpoint_frames(&self) -> usize {
        frames_for_ms(self.endpoint_ms)
    }

    pub fn incomplete_frames(&self) -> usize {
        frames_for_ms(self.incomplete_ms)
    }

    pub fn no_speech_frames(&self) -> usize {
        frames_for_ms(self.no_speech_ms)
    }

    pub fn max_utterance_frames(&self) -> usize {
        frames_for_ms(self.max_utterance_ms)
    }
}

pub(crate) fn frames_for_ms(ms: u32) -> usize {
    ms.div_ceil(FRAME_DURATION_MS).max(1) as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(DecoderConfig::default().validate().is_ok());
    }

    #[test]
    fn durations_round_up_to_whole_frames() {
        assert_eq!(frames_for_ms(32), 1);
        assert_eq!(frames_for_ms(33), 2);
        assert_eq!(frames_for_ms(1000), 32);
        assert_eq!(frames_for_ms(0), 1);
    }

    #[test]
    fn inconsistent_values_are_rejected() {
        let mut config = DecoderConfig {
            beam_width: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        config.beam_width = 8;
        config.min_confidence = 0.95;
        assert!(config.validate().is_err());

        config.min_confidence = 0.2;
        config.max_utterance_ms = 100;
        assert!(config.validate().is_err());
    }

    #[test]
    fn env_overrides_apply_and_bad_values_are_ignored() {
        std::env::set_var("INTENT_TEST_BEAM_WIDTH", "7");
        std::env::set_var("INTENT_TEST_ENDPOINT_MS", "not-a-number");
        std::env::set_var("INTENT_TEST_REQUIRE_ENDPOINT", "false");

        let mut config = DecoderConfig::default();
        config.apply_env_overrides("INTENT_TEST_");

        assert_eq!(config.beam_width, 7);
        assert_eq!(config.endpoint_ms, DecoderConfig::default().endpoint_ms);
        assert!(!config.require_endpoint);
    }
}
