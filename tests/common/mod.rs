//! Synthetic acoustic model and audio shared by the integration tests.
//!
//! Every vocabulary word is a pure tone on its own DFT bin, so any word
//! sequence can be rendered to frames that the template scorer recognizes
//! with a known posterior.
#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use voice_intent::scoring::{LabelTemplate, ModelParameters};
use voice_intent::{
    AcousticModel, ContextDefinition, DecoderConfig, Grammar, Session, TemplateScorer,
    FRAME_LENGTH, SAMPLE_RATE,
};

pub const WORDS: [&str; 10] = [
    "turn", "on", "off", "the", "light", "kitchen", "bedroom", "living", "room", "garage",
];

/// Measured bands that no word template uses.
pub const NOISE_BINS: [f32; 2] = [40.0, 44.0];

pub const LEAD_FRAMES: usize = 5;
pub const WORD_FRAMES: usize = 6;
pub const GAP_FRAMES: usize = 2;

pub const LIGHTS_CONTEXT: &str = r#"{
    "name": "smartLighting",
    "intents": [
        { "name": "turnLightOn", "expressions": ["turn on the $location:location light"] },
        { "name": "turnLightOff", "expressions": ["turn off the $location:location light"] }
    ],
    "slots": [{ "name": "location", "values": ["kitchen", "bedroom", "living room"] }]
}"#;

const BIN_HZ: f32 = SAMPLE_RATE as f32 / FRAME_LENGTH as f32;
const AMPLITUDE: f32 = 0.3;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn bin_of(word: &str) -> f32 {
    let index = WORDS
        .iter()
        .position(|w| *w == word)
        .unwrap_or_else(|| panic!("'{word}' is not in the test vocabulary"));
    8.0 + 3.0 * index as f32
}

pub fn model_parameters() -> ModelParameters {
    let mut bands: Vec<f32> = WORDS.iter().map(|w| bin_of(w)).collect();
    bands.extend(NOISE_BINS);
    let labels = WORDS
        .iter()
        .enumerate()
        .map(|(i, word)| {
            let mut template = vec![0.0; bands.len()];
            template[i] = 1.0;
            LabelTemplate {
                word: word.to_string(),
                template,
            }
        })
        .collect();

    ModelParameters {
        format_version: AcousticModel::FORMAT_VERSION.to_string(),
        sample_rate: SAMPLE_RATE,
        frame_length: FRAME_LENGTH,
        bands_hz: bands.iter().map(|b| b * BIN_HZ).collect(),
        sharpness: 12.0,
        garbage_similarity: 0.7,
        silence_rms: 0.01,
        silence_slope: 800.0,
        labels,
    }
}

pub fn model() -> Arc<AcousticModel> {
    Arc::new(AcousticModel::from_parameters(model_parameters()).expect("test model is valid"))
}

pub fn grammar(model: &AcousticModel) -> Arc<Grammar> {
    let context = ContextDefinition::from_json(LIGHTS_CONTEXT).expect("context parses");
    Arc::new(Grammar::compile(&context, model.labels()).expect("context compiles"))
}

pub fn session(sensitivity: f32, config: DecoderConfig) -> Session {
    let model = model();
    let grammar = grammar(&model);
    Session::new(grammar, TemplateScorer::new(model), sensitivity, config)
        .expect("session builds")
}

/// One frame holding a tone on each of `bins`.
pub fn tones(bins: &[f32]) -> Vec<i16> {
    (0..FRAME_LENGTH)
        .map(|n| {
            let sum: f32 = bins
                .iter()
                .map(|bin| {
                    let phase = 2.0 * std::f32::consts::PI * bin * n as f32 / FRAME_LENGTH as f32;
                    AMPLITUDE * phase.sin()
                })
                .sum();
            (sum * i16::MAX as f32) as i16
        })
        .collect()
}

pub fn silence() -> Vec<i16> {
    vec![0; FRAME_LENGTH]
}

/// Leading silence followed by `words`, each held for [`WORD_FRAMES`] and
/// separated by short pauses.
pub fn utterance(words: &[&str]) -> Vec<Vec<i16>> {
    render(words, |word| tones(&[bin_of(word)]))
}

/// Like [`utterance`], but every word shares its frames with an equally
/// loud tone on an unmodelled band, which roughly halves its posterior.
pub fn mumbled(words: &[&str]) -> Vec<Vec<i16>> {
    render(words, |word| tones(&[bin_of(word), NOISE_BINS[0]]))
}

fn render(words: &[&str], frame: impl Fn(&str) -> Vec<i16>) -> Vec<Vec<i16>> {
    let mut frames = vec![silence(); LEAD_FRAMES];
    for (i, word) in words.iter().enumerate() {
        if i > 0 {
            frames.extend(vec![silence(); GAP_FRAMES]);
        }
        frames.extend(vec![frame(word); WORD_FRAMES]);
    }
    frames
}

/// Feeds `frames` and then silence until the session finalizes. Returns the
/// number of frames consumed.
pub fn run_to_end(session: &mut Session, frames: &[Vec<i16>]) -> usize {
    let mut fed = 0;
    for frame in frames {
        fed += 1;
        if session.process(frame).expect("frame is valid") {
            return fed;
        }
    }
    let quiet = silence();
    loop {
        fed += 1;
        if session.process(&quiet).expect("frame is valid") {
            return fed;
        }
        assert!(fed < 10_000, "session never finalized");
    }
}

pub fn flatten(frames: &[Vec<i16>]) -> Vec<i16> {
    frames.iter().flatten().copied().collect()
}

pub fn temp_dir(tag: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!(
        "voice_intent_{tag}_{}",
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos()
    ));
    std::fs::create_dir_all(&dir).expect("temp dir should be creatable");
    dir
}

/// Writes the test model and lights context to a fresh directory.
pub fn write_fixtures(tag: &str) -> (PathBuf, PathBuf, PathBuf) {
    let dir = temp_dir(tag);
    let model_path = dir.join("model.json");
    let context_path = dir.join("lights.json");
    std::fs::write(
        &model_path,
        serde_json::to_string_pretty(&model_parameters()).unwrap(),
    )
    .unwrap();
    std::fs::write(&context_path, LIGHTS_CONTEXT).unwrap();
    (dir, model_path, context_path)
}
