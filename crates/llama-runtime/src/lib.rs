//! # llama-runtime
//!
//! Concrete inference backends and generation telemetry for llama.rs.
//!
//! - [`telemetry`]: TTFT, tokens/sec and hooks, always compiled
//! - `llama_cpp`: llama.cpp backend behind the `native` cargo feature

#[cfg(feature = "native")]
pub mod llama_cpp;
pub mod telemetry;

#[cfg(feature = "native")]
pub use llama_cpp::LlamaCpp;
pub use telemetry::{GenerationMetrics, GenerationTimer, LogTelemetry, NoopTelemetry, TelemetryHook};
