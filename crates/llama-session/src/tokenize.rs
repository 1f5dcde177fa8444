//! Prompt tokenization.
//!
//! Same measure-then-fill shape as prompt formatting, but the probe reports
//! its size as a negative count: tokenizing into an empty buffer returns
//! `-n` where `n` is the exact number of tokens.

use llama_engine::{InferenceEngine, TokenId, TOKENIZE_OVERFLOW};

use crate::error::{Result, SessionError};

/// Prepend BOS and similar tokens the model expects.
const ADD_SPECIAL: bool = true;
/// Recognise control tokens the chat template inserted as text.
const PARSE_SPECIAL: bool = true;

/// Convert `prompt` into the token sequence the engine will decode.
pub fn tokenize_prompt<E: InferenceEngine>(
    engine: &E,
    vocab: &E::Vocab,
    prompt: &str,
) -> Result<Vec<TokenId>> {
    let probed = engine.tokenize(vocab, prompt, &mut [], ADD_SPECIAL, PARSE_SPECIAL);
    if probed == TOKENIZE_OVERFLOW {
        return Err(SessionError::Tokenize(format!(
            "prompt of {} bytes is too large for the tokenizer",
            prompt.len()
        )));
    }
    if probed == 0 {
        return Err(SessionError::Tokenize(
            "prompt produced no tokens".to_string(),
        ));
    }
    if probed > 0 {
        return Err(SessionError::Tokenize(format!(
            "size probe wrote {probed} tokens into an empty buffer"
        )));
    }

    let count = probed.unsigned_abs() as usize;
    tracing::debug!(tokens = count, "tokenizer probe");

    let mut tokens = vec![0; count];
    let written = engine.tokenize(vocab, prompt, &mut tokens, ADD_SPECIAL, PARSE_SPECIAL);
    if written < 0 {
        return Err(SessionError::Tokenize(format!(
            "fill failed after probe reported {count} tokens (engine code {written})"
        )));
    }
    if written as usize != count {
        return Err(SessionError::Tokenize(format!(
            "token count changed between probe ({count}) and fill ({written})"
        )));
    }

    Ok(tokens)
}
