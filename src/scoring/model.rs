use std::path::Path;
use std::time::Instant;

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

use crate::error::IntentError;
use crate::{FRAME_LENGTH, SAMPLE_RATE};

/// Serialized form of the template acoustic model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelParameters {
    /// `major.minor`; the major version must match the engine's.
    pub format_version: String,
    pub sample_rate: u32,
    pub frame_length: usize,
    /// Analysis band centre frequencies.
    pub bands_hz: Vec<f32>,
    /// Softmax scale applied to template similarities.
    pub sharpness: f32,
    /// Similarity assigned to the garbage class.
    pub garbage_similarity: f32,
    /// Frame RMS (of samples scaled to [-1, 1]) at which silence is 50% likely.
    pub silence_rms: f32,
    /// Steepness of the silence logistic around `silence_rms`.
    pub silence_slope: f32,
    pub labels: Vec<LabelTemplate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelTemplate {
    pub word: String,
    /// Expected band magnitudes; normalized at load time.
    pub template: Vec<f32>,
}

/// Immutable, validated acoustic model shared by every scorer built on it.
#[derive(Debug)]
pub struct AcousticModel {
    labels: Vec<String>,
    pub(super) templates: Array2<f32>,
    pub(super) cos_basis: Array2<f32>,
    pub(super) sin_basis: Array2<f32>,
    pub(super) sharpness: f32,
    pub(super) garbage_similarity: f32,
    pub(super) silence_rms: f32,
    pub(super) silence_slope: f32,
}

fn invalid(msg: String) -> IntentError {
    IntentError::InvalidModel(msg)
}

impl AcousticModel {
    pub const FORMAT_VERSION: &'static str = "1.0";

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, IntentError> {
        let start = Instant::now();
        let content = std::fs::read_to_string(path.as_ref())?;
        let params: ModelParameters = serde_json::from_str(&content)?;
        let model = Self::from_parameters(params)?;
        log::info!(
            "Acoustic model with {} labels loaded from {} in {:?}",
            model.labels.len(),
            path.as_ref().display(),
            start.elapsed()
        );
        Ok(model)
    }

    pub fn from_parameters(params: ModelParameters) -> Result<Self, IntentError> {
        validate(&params)?;

        let bands = params.bands_hz.len();
        let mut templates = Array2::<f32>::zeros((params.labels.len(), bands));
        for (mut row, label) in templates.outer_iter_mut().zip(&params.labels) {
            let template = Array1::from_vec(label.template.clone());
            let norm = template.dot(&template).sqrt();
            row.assign(&(template / norm));
        }

        let mut cos_basis = Array2::<f32>::zeros((bands, FRAME_LENGTH));
        let mut sin_basis = Array2::<f32>::zeros((bands, FRAME_LENGTH));
        for (b, &hz) in params.bands_hz.iter().enumerate() {
            let omega = 2.0 * std::f64::consts::PI * hz as f64 / SAMPLE_RATE as f64;
            for n in 0..FRAME_LENGTH {
                let phase = omega * n as f64;
                cos_basis[[b, n]] = phase.cos() as f32;
                sin_basis[[b, n]] = phase.sin() as f32;
            }
        }

        Ok(Self {
            labels: params.labels.iter().map(|l| l.word.trim().to_lowercase()).collect(),
            templates,
            cos_basis,
            sin_basis,
            sharpness: params.sharpness,
            garbage_similarity: params.garbage_similarity,
            silence_rms: params.silence_rms,
            silence_slope: params.silence_slope,
        })
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn band_count(&self) -> usize {
        self.cos_basis.nrows()
    }
}

fn validate(params: &ModelParameters) -> Result<(), IntentError> {
    let engine_major = AcousticModel::FORMAT_VERSION.split('.').next();
    if params.format_version.split('.').next() != engine_major {
        return Err(invalid(format!(
            "unsupported format version {} (engine reads {})",
            params.format_version,
            AcousticModel::FORMAT_VERSION
        )));
    }
    if params.sample_rate != SAMPLE_RATE {
        return Err(invalid(format!(
            "sample rate {} Hz, expected {SAMPLE_RATE} Hz",
            params.sample_rate
        )));
    }
    if params.frame_length != FRAME_LENGTH {
        return Err(invalid(format!(
            "frame length {}, expected {FRAME_LENGTH}",
            params.frame_length
        )));
    }
    let nyquist = SAMPLE_RATE as f32 / 2.0;
    if params.bands_hz.is_empty() || params.bands_hz.iter().any(|&f| !(f > 0.0 && f < nyquist)) {
        return Err(invalid(format!(
            "band frequencies must be non-empty and within (0, {nyquist}) Hz"
        )));
    }
    if !(params.sharpness.is_finite() && params.sharpness > 0.0) {
        return Err(invalid("sharpness must be positive".to_string()));
    }
    if !(0.0..=1.0).contains(&params.garbage_similarity) {
        return Err(invalid("garbage_similarity must be within [0, 1]".to_string()));
    }
    if !(params.silence_rms > 0.0 && params.silence_slope > 0.0) {
        return Err(invalid("silence parameters must be positive".to_string()));
    }
    if params.labels.is_empty() {
        return Err(invalid("model has no labels".to_string()));
    }

    let mut seen = std::collections::HashSet::new();
    for label in &params.labels {
        let word = label.word.trim().to_lowercase();
        if word.is_empty() || word.contains(char::is_whitespace) {
            return Err(invalid(format!("invalid label '{}'", label.word)));
        }
        if !seen.insert(word) {
            return Err(invalid(format!("duplicate label '{}'", label.word)));
        }
        if label.template.len() != params.bands_hz.len() {
            return Err(invalid(format!(
                "template of '{}' has {} values, expected {}",
                label.word,
                label.template.len(),
                params.bands_hz.len()
            )));
        }
        let energy: f32 = label.template.iter().map(|v| v * v).sum();
        if !(energy.is_finite() && energy > 0.0) {
            return Err(invalid(format!("template of '{}' is empty", label.word)));
        }
    }
    Ok(())
}
