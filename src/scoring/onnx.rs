use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::time::Instant;

use ndarray::Array2;
use num_cpus::get_physical;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::TensorRef;

use super::{FrameScores, ScoringProvider};
use crate::error::IntentError;
use crate::grammar::LabelId;
use crate::FRAME_LENGTH;

const THREAD_ENV: &str = "INTENT_ORT_THREADS";
const SILENCE_TOKEN: &str = "<sil>";

fn resolve_thread_count() -> usize {
    std::env::var(THREAD_ENV)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or_else(get_physical)
}

fn init_session(path: &Path, threads: usize) -> Result<Session, ort::Error> {
    Ok(Session::builder()?
        .with_optimization_level(GraphOptimizationLevel::Level3)?
        .with_intra_threads(threads)?
        .commit_from_file(path)?)
}

/// Acoustic scorer backed by an ONNX network.
///
/// The model directory holds `acoustic.onnx`, taking `pcm` `[1, 512]` and
/// producing `log_probs` `[1, labels]`, and `labels.txt` with one
/// `word id` pair per line. The `<sil>` entry marks the silence output.
pub struct OnnxScorer {
    session: Session,
    labels: Vec<String>,
    label_outputs: Vec<usize>,
    silence_output: usize,
    input: Array2<f32>,
}

impl OnnxScorer {
    pub fn new<P: AsRef<Path>>(model_dir: P) -> Result<Self, IntentError> {
        let start = Instant::now();
        let dir = model_dir.as_ref();
        let (labels, label_outputs, silence_output) = Self::load_labels(dir)?;

        let session = init_session(&dir.join("acoustic.onnx"), resolve_thread_count())
            .map_err(|e| IntentError::InvalidModel(e.to_string()))?;

        log::info!(
            "ONNX acoustic model with {} labels loaded from {} in {:?}",
            labels.len(),
            dir.display(),
            start.elapsed()
        );

        Ok(Self {
            session,
            labels,
            label_outputs,
            silence_output,
            input: Array2::zeros((1, FRAME_LENGTH)),
        })
    }

    fn load_labels(dir: &Path) -> Result<(Vec<String>, Vec<usize>, usize), IntentError> {
        let content = fs::read_to_string(dir.join("labels.txt"))?;
        let mut silence = None;
        let mut labels = Vec::new();
        let mut outputs = Vec::new();
        let mut seen = HashSet::new();

        for (number, line) in content.lines().enumerate() {
            let parts: Vec<&str> = line.split_whitespace().collect();
            let (word, id) = match parts.as_slice() {
                [] => continue,
                [word, id] => (*word, *id),
                _ => {
                    return Err(IntentError::InvalidModel(format!(
                        "labels.txt line {}: expected 'word id', got '{line}'",
                        number + 1
                    )))
                }
            };
            let id: usize = id.parse().map_err(|_| {
                IntentError::InvalidModel(format!("labels.txt line {}: bad id '{id}'", number + 1))
            })?;
            if !seen.insert(id) {
                return Err(IntentError::InvalidModel(format!(
                    "labels.txt line {}: output {id} is assigned twice",
                    number + 1
                )));
            }
            if word == SILENCE_TOKEN {
                silence = Some(id);
            } else {
                labels.push(word.to_lowercase());
                outputs.push(id);
            }
        }

        let silence = silence
            .ok_or_else(|| IntentError::InvalidModel(format!("missing {SILENCE_TOKEN} label")))?;
        if labels.is_empty() {
            return Err(IntentError::InvalidModel(
                "labels.txt has no word labels".into(),
            ));
        }
        Ok((labels, outputs, silence))
    }
}

impl ScoringProvider for OnnxScorer {
    fn labels(&self) -> &[String] {
        &self.labels
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
        for (dst, &s) in self.input.iter_mut().zip(pcm) {
            *dst = s as f32 / 32768.0;
        }

        let outputs = self.session.run(ort::inputs![
            "pcm" => TensorRef::from_array_view(self.input.view())?,
        ])?;
        let log_probs = outputs
            .get("log_probs")
            .ok_or_else(|| IntentError::Scoring("model output 'log_probs' not found".into()))?
            .try_extract_array::<f32>()?;
        let flat: Vec<f32> = log_probs.iter().copied().collect();

        for &label in active {
            if let Some(&out) = self.label_outputs.get(label) {
                if let Some(&lp) = flat.get(out) {
                    scores.set_label(label, lp);
                }
            }
        }
        let silence = flat
            .get(self.silence_output)
            .map(|lp| lp.exp())
            .ok_or_else(|| IntentError::Scoring("silence output out of range".into()))?;
        scores.set_silence(silence);
        Ok(())
    }
}
