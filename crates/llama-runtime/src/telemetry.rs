//! Telemetry hooks for generation performance measurement.
//!
//! Provides:
//! - [`GenerationMetrics`]: TTFT, tokens/sec, and generation summary
//! - [`TelemetryHook`] trait: callback interface for real-time metric reporting
//! - [`GenerationTimer`]: records timestamps and computes metrics
//! - [`NoopTelemetry`] / [`LogTelemetry`]: built-in hook implementations

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

/// Aggregate metrics from a generation run.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationMetrics {
    /// Time from start until the prompt batch was decoded, in milliseconds.
    pub ttft_ms: f64,
    /// Tokens emitted per second (excludes prompt decoding).
    pub tokens_per_sec: f64,
    /// Number of prompt tokens decoded in the first batch.
    pub prompt_tokens: usize,
    /// Number of tokens emitted to the output sink.
    pub generated_tokens: usize,
    /// Total wall-clock time in milliseconds.
    pub total_time_ms: f64,
}

/// Callback trait for real-time generation telemetry.
///
/// All methods have default no-op implementations so hooks can be selective.
pub trait TelemetryHook: Send + Sync {
    /// Called after the prompt batch has been decoded.
    fn on_prefill_complete(&self, _ttft_ms: f64) {}

    /// Called after each token is emitted.
    fn on_token_generated(&self, _token_idx: usize, _elapsed_ms: f64) {}

    /// Called when generation finishes with the full metrics summary.
    fn on_generation_complete(&self, _metrics: &GenerationMetrics) {}
}

/// No-op telemetry hook.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTelemetry;

impl TelemetryHook for NoopTelemetry {}

/// Logging telemetry hook: logs each completed run and keeps the last report.
#[derive(Debug, Clone, Default)]
pub struct LogTelemetry {
    last_report: Arc<Mutex<Option<GenerationMetrics>>>,
}

impl LogTelemetry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Retrieve the last completed generation's metrics.
    pub fn last_metrics(&self) -> Option<GenerationMetrics> {
        self.last_report
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl TelemetryHook for LogTelemetry {
    fn on_generation_complete(&self, metrics: &GenerationMetrics) {
        tracing::info!(
            prompt_tokens = metrics.prompt_tokens,
            generated_tokens = metrics.generated_tokens,
            ttft_ms = metrics.ttft_ms,
            tokens_per_sec = metrics.tokens_per_sec,
            "generation complete"
        );
        *self
            .last_report
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(metrics.clone());
    }
}

/// Records timestamps during generation to compute [`GenerationMetrics`].
///
/// Usage:
/// 1. Call [`GenerationTimer::new`] before the first decode
/// 2. Call [`GenerationTimer::mark_prefill_complete`] after the prompt batch decodes
/// 3. Call [`GenerationTimer::mark_token`] after each emitted token
/// 4. Call [`GenerationTimer::finish`] to compute final metrics
pub struct GenerationTimer<'h> {
    prompt_tokens: usize,
    start: Instant,
    prefill_end: Option<Instant>,
    token_count: usize,
    hook: &'h dyn TelemetryHook,
}

impl<'h> GenerationTimer<'h> {
    /// Start a new timer for a generation run.
    pub fn new(prompt_tokens: usize, hook: &'h dyn TelemetryHook) -> Self {
        Self {
            prompt_tokens,
            start: Instant::now(),
            prefill_end: None,
            token_count: 0,
            hook,
        }
    }

    /// Mark the prompt batch decoded. Only the first call has an effect.
    pub fn mark_prefill_complete(&mut self) {
        if self.prefill_end.is_some() {
            return;
        }
        let now = Instant::now();
        self.prefill_end = Some(now);
        let ttft_ms = now.duration_since(self.start).as_secs_f64() * 1000.0;
        self.hook.on_prefill_complete(ttft_ms);
    }

    /// Mark one token emitted. Fires `on_token_generated`.
    pub fn mark_token(&mut self) {
        self.token_count += 1;
        let elapsed_ms = self.start.elapsed().as_secs_f64() * 1000.0;
        self.hook.on_token_generated(self.token_count, elapsed_ms);
    }

    /// Tokens marked so far.
    pub fn tokens(&self) -> usize {
        self.token_count
    }

    /// Finalize and return metrics. Fires `on_generation_complete`.
    pub fn finish(self) -> GenerationMetrics {
        let total_time_ms = self.start.elapsed().as_secs_f64() * 1000.0;

        let ttft_ms = self
            .prefill_end
            .map(|t| t.duration_since(self.start).as_secs_f64() * 1000.0)
            .unwrap_or(0.0);

        let decode_time_ms = total_time_ms - ttft_ms;
        let tokens_per_sec = if decode_time_ms > 0.0 && self.token_count > 0 {
            self.token_count as f64 / (decode_time_ms / 1000.0)
        } else {
            0.0
        };

        let metrics = GenerationMetrics {
            ttft_ms,
            tokens_per_sec,
            prompt_tokens: self.prompt_tokens,
            generated_tokens: self.token_count,
            total_time_ms,
        };

        self.hook.on_generation_complete(&metrics);
        metrics
    }
}
