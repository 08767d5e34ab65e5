//! High-level construction facade for intent sessions.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use crate::config::DecoderConfig;
use crate::decoder::{Sensitivity, Session};
use crate::error::IntentError;
use crate::grammar::{ContextDefinition, Grammar};
use crate::scoring::{AcousticModel, TemplateScorer};

/// Builds a [`Session`] from an acoustic model file and a context file.
///
/// ```no_run
/// use voice_intent::EngineBuilder;
///
/// let mut session = EngineBuilder::new("model.json", "lights.json")
///     .sensitivity(0.6)
///     .build()?;
/// # Ok::<(), voice_intent::IntentError>(())
/// ```
#[derive(Debug, Clone)]
pub struct EngineBuilder {
    model_path: PathBuf,
    context_path: PathBuf,
    sensitivity: f32,
    config: DecoderConfig,
}

impl EngineBuilder {
    pub fn new(model_path: impl Into<PathBuf>, context_path: impl Into<PathBuf>) -> Self {
        Self {
            model_path: model_path.into(),
            context_path: context_path.into(),
            sensitivity: Sensitivity::default().value(),
            config: DecoderConfig::from_env(),
        }
    }

    pub fn sensitivity(mut self, sensitivity: f32) -> Self {
        self.sensitivity = sensitivity;
        self
    }

    /// Replaces the whole configuration, including any environment overrides.
    pub fn config(mut self, config: DecoderConfig) -> Self {
        self.config = config;
        self
    }

    pub fn endpoint_ms(mut self, ms: u32) -> Self {
        self.config.endpoint_ms = ms;
        self
    }

    pub fn require_endpoint(mut self, require: bool) -> Self {
        self.config.require_endpoint = require;
        self
    }

    pub fn build(self) -> Result<Session, IntentError> {
        let start = Instant::now();
        let sensitivity = Sensitivity::new(self.sensitivity)?;
        self.config.validate()?;

        let model = Arc::new(AcousticModel::from_file(&self.model_path)?);

        let compile_start = Instant::now();
        let context = ContextDefinition::from_file(&self.context_path)?;
        let grammar = Arc::new(Grammar::compile(&context, model.labels())?);
        log::info!(
            "Context '{}' from {} compiled in {:?}",
            grammar.name(),
            self.context_path.display(),
            compile_start.elapsed()
        );

        let session = Session::new(
            grammar,
            TemplateScorer::new(model),
            sensitivity.value(),
            self.config,
        )?;
        log::info!("Intent session built in {:?}", start.elapsed());
        Ok(session)
    }
}
