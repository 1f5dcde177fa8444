//! Chat-template prompt formatting.
//!
//! The rendered size is not known up front, so formatting is two calls: a probe
//! with an empty buffer that reports the exact size, then a fill into a buffer
//! of that size. The probe is exact for unchanged inputs, so a third call is
//! never needed.

use llama_engine::{ChatMessage, InferenceEngine};

use crate::error::{Result, SessionError};

/// Render `messages` into one prompt string, ending with the assistant turn opener.
pub fn format_prompt<E: InferenceEngine>(
    engine: &E,
    template: Option<&str>,
    messages: &[ChatMessage],
) -> Result<String> {
    let mut buf = Vec::new();

    let probed = engine.apply_chat_template(template, messages, true, &mut buf);
    let required = usize::try_from(probed).map_err(|_| {
        SessionError::TemplateApply(format!("size probe failed (engine code {probed})"))
    })?;
    tracing::debug!(bytes = required, messages = messages.len(), "chat template probe");

    if required > 0 {
        buf.resize(required, 0);
        let written = engine.apply_chat_template(template, messages, true, &mut buf);
        if written < 0 {
            return Err(SessionError::TemplateApply(format!(
                "fill failed after probe reported {required} bytes (engine code {written})"
            )));
        }
        if usize::try_from(written).ok() != Some(required) {
            return Err(SessionError::TemplateApply(format!(
                "rendered size changed between probe ({required}) and fill ({written})"
            )));
        }
    }

    String::from_utf8(buf).map_err(|e| {
        SessionError::TemplateApply(format!("rendered prompt is not valid UTF-8: {e}"))
    })
}
