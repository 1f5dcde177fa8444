//! # llama-session
//!
//! Single-shot streaming generation on top of an [`InferenceEngine`].
//!
//! Wires: chat messages → prompt formatter → tokenizer → context → decode/sample loop → output sink.
//!
//! A [`Session`] owns one loaded model and one sampler chain. Each call to
//! [`Session::generate_response`] creates its own context, streams generated
//! text into a writer token by token, and releases the context before returning.
//!
//! [`InferenceEngine`]: llama_engine::InferenceEngine

pub mod config;
pub mod context;
pub mod error;
pub mod generate;
pub mod prompt;
pub mod sampler;
pub mod session;
pub mod tokenize;

pub use config::SessionConfig;
pub use error::{Result, SessionError};
pub use generate::{GenerationReport, StopReason, PIECE_BUFFER_SIZE};
pub use session::Session;
