//! High-level generation session.
//!
//! A [`Session`] ties together a loaded model and its sampler chain into the
//! three operations a caller needs: load, format a conversation, generate.

use std::io::Write;
use std::path::Path;

use llama_engine::{ChatMessage, InferenceEngine};
use llama_runtime::{NoopTelemetry, TelemetryHook};

use crate::config::SessionConfig;
use crate::context::create_context;
use crate::error::{Result, SessionError};
use crate::generate::{run_generation, GenerationReport};
use crate::prompt::format_prompt;
use crate::sampler::build_sampler_chain;
use crate::tokenize::tokenize_prompt;

/// One loaded model and the sampler chain that serves every call on it.
///
/// Generation takes `&mut self`: the penalty stage's history is updated in
/// emission order, so two calls may never share a chain concurrently.
/// Independent sessions each own their own chain and contexts.
pub struct Session<E: InferenceEngine> {
    // Field order is drop order: the sampler goes before the model it samples for.
    sampler: Option<E::Sampler>,
    model: E::Model,
    config: SessionConfig,
    telemetry: Box<dyn TelemetryHook>,
    engine: E,
}

impl<E: InferenceEngine> Session<E> {
    /// Load the model named by `config` and build the sampler chain.
    ///
    /// Fails with [`SessionError::ModelLoad`] before anything else touches the engine
    /// if the model file is missing or malformed.
    pub fn new(engine: E, config: SessionConfig) -> Result<Self> {
        config.validate()?;

        let model = engine
            .load_model(&config.model_path, &config.model_params())
            .ok_or_else(|| SessionError::ModelLoad {
                path: config.model_path.clone(),
            })?;
        tracing::info!(
            path = %config.model_path.display(),
            gpu_layers = config.gpu_layers,
            "model loaded"
        );

        let mut session = Self {
            sampler: None,
            model,
            config,
            telemetry: Box::new(NoopTelemetry),
            engine,
        };
        session.initialize_sampler()?;
        Ok(session)
    }

    /// Report generation metrics to `hook`.
    pub fn with_telemetry(mut self, hook: impl TelemetryHook + 'static) -> Self {
        self.telemetry = Box::new(hook);
        self
    }

    /// Build the sampler chain if it does not exist yet. Later calls do nothing.
    pub fn initialize_sampler(&mut self) -> Result<()> {
        if self.sampler.is_some() {
            return Ok(());
        }
        let vocab = self.engine.vocab(&self.model);
        self.sampler = Some(build_sampler_chain(
            &self.engine,
            vocab,
            self.config.temperature,
        )?);
        Ok(())
    }

    /// Render a conversation into a prompt with the model's chat template.
    pub fn formatted_prompt(&self, messages: &[ChatMessage]) -> Result<String> {
        let template = self.engine.chat_template(&self.model);
        format_prompt(&self.engine, template.as_deref(), messages)
    }

    /// Generate a response to `prompt`, streaming text into `out` as it is produced.
    ///
    /// A fresh context sized `prompt tokens + prediction budget` is created for
    /// the call and released before returning, whether it succeeds or fails.
    pub fn generate_response<W>(&mut self, prompt: &str, out: &mut W) -> Result<GenerationReport>
    where
        W: Write + ?Sized,
    {
        self.initialize_sampler()?;

        let vocab = self.engine.vocab(&self.model);
        let tokens = tokenize_prompt(&self.engine, vocab, prompt)?;
        let mut context = create_context(
            &self.engine,
            &self.model,
            tokens.len(),
            self.config.prediction_budget,
        )?;

        let Some(sampler) = self.sampler.as_mut() else {
            return Err(SessionError::SamplerInit);
        };

        let report = run_generation(
            &self.engine,
            vocab,
            &mut context,
            sampler,
            tokens,
            out,
            self.telemetry.as_ref(),
        )?;

        tracing::info!(
            stop = ?report.stop,
            prompt_tokens = report.prompt_tokens,
            generated_tokens = report.generated_tokens,
            tokens_per_sec = report.metrics.tokens_per_sec,
            "generation finished"
        );
        Ok(report)
    }

    pub fn temperature(&self) -> f32 {
        self.config.temperature
    }

    pub fn prediction_budget(&self) -> usize {
        self.config.prediction_budget
    }

    pub fn model_path(&self) -> &Path {
        &self.config.model_path
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }
}
