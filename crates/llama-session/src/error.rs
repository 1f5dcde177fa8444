//! Error types for generation sessions.

use std::path::PathBuf;

use llama_engine::TokenId;

/// Result type for session operations.
pub type Result<T> = std::result::Result<T, SessionError>;

/// Every failure a session can report. All of them abort the current call.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to load model from {}", path.display())]
    ModelLoad { path: PathBuf },

    #[error("failed to initialize sampler chain")]
    SamplerInit,

    #[error("failed to apply chat template: {0}")]
    TemplateApply(String),

    #[error("failed to tokenize prompt: {0}")]
    Tokenize(String),

    #[error(
        "failed to create context of {requested} tokens ({prompt_tokens} prompt tokens + prediction budget)"
    )]
    ContextCreate {
        requested: usize,
        prompt_tokens: usize,
    },

    #[error("failed to decode batch at position {position} (engine code {code})")]
    Decode { position: usize, code: i32 },

    #[error("failed to convert token {token} to text (engine code {code})")]
    TokenRender { token: TokenId, code: i32 },

    #[error("failed to write output: {0}")]
    Io(#[from] std::io::Error),
}
