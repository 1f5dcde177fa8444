//! Session configuration.

use std::path::PathBuf;

use llama_engine::ModelParams;

use crate::error::{Result, SessionError};

/// Configuration for creating a [`Session`](crate::Session).
///
/// Temperature and prediction budget are fixed for the life of a session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    /// Path to the model file (GGUF for the llama.cpp backend).
    pub model_path: PathBuf,

    /// Sampling temperature (0.0 = sharpest, higher = flatter distribution).
    pub temperature: f32,

    /// Number of model layers offloaded to the GPU.
    pub gpu_layers: i32,

    /// Maximum number of tokens generated per call.
    pub prediction_budget: usize,
}

impl SessionConfig {
    pub const DEFAULT_TEMPERATURE: f32 = 0.5;
    pub const DEFAULT_GPU_LAYERS: i32 = 99;
    pub const DEFAULT_PREDICTION_BUDGET: usize = 512;

    /// Create a config for `model_path` with default sampling settings.
    pub fn new(model_path: impl Into<PathBuf>) -> Self {
        Self {
            model_path: model_path.into(),
            temperature: Self::DEFAULT_TEMPERATURE,
            gpu_layers: Self::DEFAULT_GPU_LAYERS,
            prediction_budget: Self::DEFAULT_PREDICTION_BUDGET,
        }
    }

    /// Set temperature.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Set GPU layer count.
    pub fn with_gpu_layers(mut self, gpu_layers: i32) -> Self {
        self.gpu_layers = gpu_layers;
        self
    }

    /// Set the per-call prediction budget.
    pub fn with_prediction_budget(mut self, budget: usize) -> Self {
        self.prediction_budget = budget;
        self
    }

    /// Reject settings the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if !self.temperature.is_finite() || self.temperature < 0.0 {
            return Err(SessionError::InvalidConfig(format!(
                "temperature must be a finite non-negative number (got {})",
                self.temperature
            )));
        }
        if self.prediction_budget == 0 {
            return Err(SessionError::InvalidConfig(
                "prediction budget must be at least 1 token".to_string(),
            ));
        }
        Ok(())
    }

    pub(crate) fn model_params(&self) -> ModelParams {
        ModelParams {
            gpu_layers: self.gpu_layers,
        }
    }
}
