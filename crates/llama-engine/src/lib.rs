//! # llama-engine
//!
//! The "narrow waist" of the llama.rs stack. Defines the [`InferenceEngine`] trait
//! that describes everything the generation layer needs from a native inference
//! engine, plus the small value types passed across that boundary.
//!
//! ## Design Notes
//!
//! ### Raw size conventions
//! Chat templating, tokenization and token rendering keep the engine's native
//! integer conventions (required sizes, negative counts, negative failures).
//! The measure-then-fill protocols built on top of them live in `llama-session`,
//! where they can be exercised against scripted engines.
//!
//! ### Handle ownership
//! `Model`, `Context` and `Sampler` are owned handles; dropping one releases the
//! native resource. `Vocab` is only ever reachable as a borrow of its `Model`, so
//! it can never outlive the model it belongs to.
//!
//! ### Token Type
//! `TokenId` is aliased as `i32` for FFI compatibility, though token IDs are logically
//! non-negative.

use std::fmt;
use std::path::Path;

/// Token ID type (i32 for FFI compat; logically non-negative).
pub type TokenId = i32;

/// Returned by [`InferenceEngine::tokenize`] when the text is too large for the
/// engine to measure at all. Distinct from any real negated token count.
pub const TOKENIZE_OVERFLOW: i32 = i32::MIN;

/// Seed value that asks the engine to use its default seed for the final draw.
pub const DEFAULT_SEED: u32 = 0xFFFF_FFFF;

/// Speaker tag attached to a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    /// The tag chat templates expect for this role.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single role-tagged message in a conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// Parameters used when loading a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelParams {
    /// Number of layers to offload to the GPU.
    pub gpu_layers: i32,
}

impl Default for ModelParams {
    fn default() -> Self {
        Self { gpu_layers: 99 }
    }
}

/// Parameters used when creating an inference context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextParams {
    /// Total context window in tokens.
    pub context_size: u32,
    /// Maximum number of tokens submitted in one decode call.
    pub batch_size: u32,
}

/// One stage of a sampler chain.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SamplerStage {
    /// Keep only the `k` most probable candidates.
    TopK { k: i32 },
    /// Drop candidates below `p` times the top probability, keeping at least `min_keep`.
    MinP { p: f32, min_keep: usize },
    /// Rescale logits by `1 / t`.
    Temperature { t: f32 },
    /// Penalize tokens seen in the last `last_n` sampled tokens.
    Penalties {
        last_n: i32,
        repeat: f32,
        frequency: f32,
        presence: f32,
    },
    /// Draw one token from the remaining distribution.
    Distribution { seed: u32 },
}

/// The capability surface of a native inference engine.
///
/// Implementations wrap a concrete engine (llama.cpp via FFI, or a scripted
/// engine in tests). All calls are synchronous and block until the engine returns.
pub trait InferenceEngine {
    /// Exclusively owned model handle.
    type Model;
    /// Vocabulary, borrowed from a [`InferenceEngine::Model`].
    type Vocab;
    /// Per-call inference context.
    type Context;
    /// Sampler chain handle.
    type Sampler;

    /// Load a model from disk. `None` if the file is missing or malformed.
    fn load_model(&self, path: &Path, params: &ModelParams) -> Option<Self::Model>;

    /// Borrow the vocabulary of a loaded model.
    fn vocab<'m>(&self, model: &'m Self::Model) -> &'m Self::Vocab;

    /// The chat template embedded in the model, if any.
    fn chat_template(&self, model: &Self::Model) -> Option<String>;

    /// Render `messages` through `template` into `buf`.
    ///
    /// Returns the total number of bytes the rendered prompt needs, which may be
    /// larger than `buf`; a negative value means the template could not be applied.
    fn apply_chat_template(
        &self,
        template: Option<&str>,
        messages: &[ChatMessage],
        add_assistant: bool,
        buf: &mut [u8],
    ) -> i32;

    /// Tokenize `text` into `buf`.
    ///
    /// Returns the number of tokens written, or the negated number of tokens
    /// required when `buf` is too small. Text the engine cannot accept at all
    /// yields [`TOKENIZE_OVERFLOW`].
    fn tokenize(
        &self,
        vocab: &Self::Vocab,
        text: &str,
        buf: &mut [TokenId],
        add_special: bool,
        parse_special: bool,
    ) -> i32;

    /// Create a context. `None` if the engine cannot allocate one of the requested size.
    fn create_context(&self, model: &Self::Model, params: &ContextParams)
        -> Option<Self::Context>;

    /// Context window size as reported by the engine.
    fn context_size(&self, context: &Self::Context) -> u32;

    /// Decode one batch of tokens. Returns 0 on success.
    fn decode(&self, context: &mut Self::Context, batch: &mut [TokenId]) -> i32;

    /// Create an empty sampler chain for models using `vocab`.
    ///
    /// Stages that track token history size their state from the vocabulary.
    /// `None` if the engine could not allocate a chain.
    fn sampler_chain(&self, vocab: &Self::Vocab) -> Option<Self::Sampler>;

    /// Append a stage to the end of a sampler chain.
    fn add_sampler_stage(&self, chain: &mut Self::Sampler, stage: SamplerStage);

    /// Sample the next token from the last decoded logits.
    ///
    /// The sampled token is recorded in the chain's history, which is what the
    /// penalty stage reads on later calls.
    fn sample(&self, chain: &mut Self::Sampler, context: &mut Self::Context) -> TokenId;

    /// Whether `token` marks the end of generation.
    fn is_end_of_generation(&self, vocab: &Self::Vocab, token: TokenId) -> bool;

    /// Render one token into `buf`.
    ///
    /// Returns the number of bytes written; a negative value means failure
    /// (for llama.cpp, the negated size the piece needs).
    fn token_to_piece(
        &self,
        vocab: &Self::Vocab,
        token: TokenId,
        buf: &mut [u8],
        lstrip: i32,
        special: bool,
    ) -> i32;
}
