//! The decode → sample → render → emit loop.
//!
//! ```text
//! Decoding ──► Sampling ──► Checking-Stop ──► Emitting ──┐
//!    ▲                          │                         │
//!    │                          ▼                         │
//!    │                   Terminated-EOG                   │
//!    └──────────── (next batch: one token) ◄──────────────┘
//! ```
//!
//! Before every decode the loop checks `position + batch < context_size`;
//! when that fails it stops with [`StopReason::ContextFull`]. The first batch is
//! the whole prompt, every later batch is the single token just sampled. The
//! engine context keeps the decoding history, so earlier tokens are never resubmitted.

use std::io::Write;

use llama_engine::{InferenceEngine, TokenId};
use llama_runtime::{GenerationMetrics, GenerationTimer, TelemetryHook};

use crate::context::GenerationContext;
use crate::error::{Result, SessionError};

/// Capacity of the buffer a single token is rendered into.
///
/// Assumed to fit any token piece; a larger piece fails the call with
/// [`SessionError::TokenRender`] rather than being re-measured.
pub const PIECE_BUFFER_SIZE: usize = 256;

/// Why generation stopped. Both are successful completions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The model sampled an end-of-generation token.
    EndOfGeneration,
    /// The context window has no room for another batch.
    ContextFull,
}

/// Summary of one generation call.
#[derive(Debug, Clone)]
pub struct GenerationReport {
    pub stop: StopReason,
    /// Tokens in the prompt batch.
    pub prompt_tokens: usize,
    /// Tokens rendered and written to the sink.
    pub generated_tokens: usize,
    /// Context size the loop ran against.
    pub context_size: usize,
    pub metrics: GenerationMetrics,
}

/// Run the generation loop until end-of-generation or a full context.
///
/// Rendered text is written and flushed to `out` one token at a time, followed
/// by a single newline once the loop ends.
pub fn run_generation<E, W>(
    engine: &E,
    vocab: &E::Vocab,
    context: &mut GenerationContext<E::Context>,
    sampler: &mut E::Sampler,
    prompt: Vec<TokenId>,
    out: &mut W,
    hook: &dyn TelemetryHook,
) -> Result<GenerationReport>
where
    E: InferenceEngine,
    W: Write + ?Sized,
{
    let context_size = context.size();
    let prompt_tokens = prompt.len();
    let mut timer = GenerationTimer::new(prompt_tokens, hook);
    let mut piece = [0u8; PIECE_BUFFER_SIZE];

    let mut batch = prompt;
    let mut position = 0usize;

    let stop = loop {
        if position + batch.len() >= context_size {
            break StopReason::ContextFull;
        }

        let code = engine.decode(context.inner_mut(), &mut batch);
        if code != 0 {
            return Err(SessionError::Decode { position, code });
        }
        position += batch.len();
        timer.mark_prefill_complete();

        let token = engine.sample(sampler, context.inner_mut());
        if engine.is_end_of_generation(vocab, token) {
            break StopReason::EndOfGeneration;
        }

        let rendered = engine.token_to_piece(vocab, token, &mut piece, 0, true);
        let text = usize::try_from(rendered)
            .ok()
            .and_then(|len| piece.get(..len))
            .ok_or(SessionError::TokenRender {
                token,
                code: rendered,
            })?;

        out.write_all(text)?;
        out.flush()?;
        timer.mark_token();

        batch.clear();
        batch.push(token);
    };

    out.write_all(b"\n")?;
    out.flush()?;

    tracing::debug!(?stop, position, context_size, "generation loop finished");

    let generated_tokens = timer.tokens();
    Ok(GenerationReport {
        stop,
        prompt_tokens,
        generated_tokens,
        context_size,
        metrics: timer.finish(),
    })
}
