//! Context lifecycle.
//!
//! A context is sized to hold the whole prompt plus the prediction budget and
//! lives for exactly one generation call. Dropping [`GenerationContext`]
//! releases the engine context on every exit path.

use llama_engine::{ContextParams, InferenceEngine};

use crate::error::{Result, SessionError};

/// An engine context together with the size it was requested with.
pub struct GenerationContext<C> {
    inner: C,
    size: usize,
    prompt_tokens: usize,
}

impl<C> GenerationContext<C> {
    /// Requested context size: prompt tokens plus prediction budget.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Number of prompt tokens this context was sized for.
    pub fn prompt_tokens(&self) -> usize {
        self.prompt_tokens
    }

    pub(crate) fn inner_mut(&mut self) -> &mut C {
        &mut self.inner
    }
}

/// Create a context for a prompt of `prompt_tokens` tokens.
///
/// The whole prompt is decoded as one batch, so the batch size equals the
/// prompt length. There is no retry with a smaller size: if the engine cannot
/// allocate the context, that is reported as-is.
pub fn create_context<E: InferenceEngine>(
    engine: &E,
    model: &E::Model,
    prompt_tokens: usize,
    prediction_budget: usize,
) -> Result<GenerationContext<E::Context>> {
    let context_error = |requested| SessionError::ContextCreate {
        requested,
        prompt_tokens,
    };

    let size = prompt_tokens
        .checked_add(prediction_budget)
        .ok_or_else(|| context_error(usize::MAX))?;
    let params = ContextParams {
        context_size: u32::try_from(size).map_err(|_| context_error(size))?,
        batch_size: u32::try_from(prompt_tokens).map_err(|_| context_error(size))?,
    };

    let inner = engine
        .create_context(model, &params)
        .ok_or_else(|| context_error(size))?;

    let reported = engine.context_size(&inner) as usize;
    if reported != size {
        tracing::debug!(requested = size, reported, "engine adjusted context size");
    }
    tracing::debug!(context_size = size, batch_size = prompt_tokens, "context created");

    Ok(GenerationContext {
        inner,
        size,
        prompt_tokens,
    })
}
