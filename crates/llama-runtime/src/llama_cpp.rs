//! llama.cpp backend over the raw `llama-cpp-sys-2` bindings.
//!
//! Every native handle is wrapped in an owning type that frees it on drop.
//! Process-wide setup (backend init, log callback) runs once, guarded by a
//! [`OnceLock`], no matter how many [`LlamaCpp`] values are created.

use std::ffi::{c_char, c_void, CStr, CString};
use std::path::Path;
use std::ptr::{self, NonNull};
use std::sync::OnceLock;

use llama_cpp_sys_2 as sys;
use llama_engine::{
    ChatMessage, ContextParams, InferenceEngine, ModelParams, Role, SamplerStage, TokenId,
    TOKENIZE_OVERFLOW,
};

static BACKEND: OnceLock<()> = OnceLock::new();

/// Handle to the process-wide llama.cpp backend.
#[derive(Debug, Clone, Copy)]
pub struct LlamaCpp {
    _initialized: (),
}

impl LlamaCpp {
    /// Initialize llama.cpp (once per process) and return a handle to it.
    pub fn init() -> Self {
        BACKEND.get_or_init(|| {
            // SAFETY: runs exactly once; the callback is a plain function with
            // no user data and stays valid for the life of the process.
            unsafe {
                sys::llama_backend_init();
                sys::llama_log_set(Some(forward_log), ptr::null_mut());
            }
            tracing::debug!("llama.cpp backend initialized");
        });
        Self { _initialized: () }
    }
}

/// Routes llama.cpp log lines into `tracing`.
unsafe extern "C" fn forward_log(
    level: sys::ggml_log_level,
    text: *const c_char,
    _user_data: *mut c_void,
) {
    if text.is_null() {
        return;
    }
    let message = CStr::from_ptr(text).to_string_lossy();
    let message = message.trim_end();
    if message.is_empty() {
        return;
    }
    match level {
        sys::GGML_LOG_LEVEL_ERROR => tracing::error!(target: "llama_cpp", "{message}"),
        sys::GGML_LOG_LEVEL_WARN => tracing::warn!(target: "llama_cpp", "{message}"),
        _ => tracing::trace!(target: "llama_cpp", "{message}"),
    }
}

/// A loaded model. Owns the native model; the vocabulary lives inside it.
pub struct Model {
    raw: NonNull<sys::llama_model>,
    vocab: Vocab,
}

// SAFETY: llama.cpp models are immutable after load and may be read from
// several threads; all mutation happens in contexts and samplers.
unsafe impl Send for Model {}
unsafe impl Sync for Model {}

impl Drop for Model {
    fn drop(&mut self) {
        unsafe { sys::llama_model_free(self.raw.as_ptr()) }
    }
}

/// Vocabulary of a [`Model`]. Not constructible or clonable outside the model.
pub struct Vocab {
    raw: NonNull<sys::llama_vocab>,
}

unsafe impl Send for Vocab {}
unsafe impl Sync for Vocab {}

/// A per-call inference context.
pub struct Context {
    raw: NonNull<sys::llama_context>,
}

unsafe impl Send for Context {}

impl Drop for Context {
    fn drop(&mut self) {
        unsafe { sys::llama_free(self.raw.as_ptr()) }
    }
}

/// A sampler chain; owns every stage added to it.
pub struct Sampler {
    raw: NonNull<sys::llama_sampler>,
    /// Vocabulary size of the model the chain samples for. The penalty stage
    /// sizes its token counters from it.
    n_vocab: i32,
}

unsafe impl Send for Sampler {}

impl Drop for Sampler {
    fn drop(&mut self) {
        unsafe { sys::llama_sampler_free(self.raw.as_ptr()) }
    }
}

fn role_tag(role: Role) -> &'static CStr {
    match role {
        Role::System => c"system",
        Role::User => c"user",
        Role::Assistant => c"assistant",
    }
}

fn buffer_len(len: usize) -> i32 {
    i32::try_from(len).unwrap_or(i32::MAX)
}

impl InferenceEngine for LlamaCpp {
    type Model = Model;
    type Vocab = Vocab;
    type Context = Context;
    type Sampler = Sampler;

    fn load_model(&self, path: &Path, params: &ModelParams) -> Option<Model> {
        let Some(c_path) = path.to_str().and_then(|p| CString::new(p).ok()) else {
            tracing::error!(
                path = %path.display(),
                "model path is not representable as a C string"
            );
            return None;
        };

        let raw = unsafe {
            let mut model_params = sys::llama_model_default_params();
            model_params.n_gpu_layers = params.gpu_layers;
            sys::llama_model_load_from_file(c_path.as_ptr(), model_params)
        };
        let raw = NonNull::new(raw)?;

        let vocab = unsafe { sys::llama_model_get_vocab(raw.as_ptr()) };
        match NonNull::new(vocab.cast_mut()) {
            Some(vocab) => Some(Model {
                raw,
                vocab: Vocab { raw: vocab },
            }),
            None => {
                unsafe { sys::llama_model_free(raw.as_ptr()) };
                None
            }
        }
    }

    fn vocab<'m>(&self, model: &'m Model) -> &'m Vocab {
        &model.vocab
    }

    fn chat_template(&self, model: &Model) -> Option<String> {
        let tmpl = unsafe { sys::llama_model_chat_template(model.raw.as_ptr(), ptr::null()) };
        if tmpl.is_null() {
            return None;
        }
        Some(unsafe { CStr::from_ptr(tmpl) }.to_string_lossy().into_owned())
    }

    fn apply_chat_template(
        &self,
        template: Option<&str>,
        messages: &[ChatMessage],
        add_assistant: bool,
        buf: &mut [u8],
    ) -> i32 {
        let Ok(template) = template.map(CString::new).transpose() else {
            return -1;
        };
        let Ok(contents) = messages
            .iter()
            .map(|m| CString::new(m.content.as_str()))
            .collect::<Result<Vec<_>, _>>()
        else {
            return -1;
        };

        let chat: Vec<sys::llama_chat_message> = messages
            .iter()
            .zip(&contents)
            .map(|(message, content)| sys::llama_chat_message {
                role: role_tag(message.role).as_ptr(),
                content: content.as_ptr(),
            })
            .collect();

        unsafe {
            sys::llama_chat_apply_template(
                template.as_ref().map_or(ptr::null(), |t| t.as_ptr()),
                chat.as_ptr(),
                chat.len(),
                add_assistant,
                buf.as_mut_ptr().cast::<c_char>(),
                buffer_len(buf.len()),
            )
        }
    }

    fn tokenize(
        &self,
        vocab: &Vocab,
        text: &str,
        buf: &mut [TokenId],
        add_special: bool,
        parse_special: bool,
    ) -> i32 {
        let Ok(text_len) = i32::try_from(text.len()) else {
            tracing::error!(bytes = text.len(), "prompt too long to tokenize");
            return TOKENIZE_OVERFLOW;
        };
        unsafe {
            sys::llama_tokenize(
                vocab.raw.as_ptr(),
                text.as_ptr().cast::<c_char>(),
                text_len,
                buf.as_mut_ptr(),
                buffer_len(buf.len()),
                add_special,
                parse_special,
            )
        }
    }

    fn create_context(&self, model: &Model, params: &ContextParams) -> Option<Context> {
        let raw = unsafe {
            let mut context_params = sys::llama_context_default_params();
            context_params.n_ctx = params.context_size;
            context_params.n_batch = params.batch_size;
            sys::llama_init_from_model(model.raw.as_ptr(), context_params)
        };
        NonNull::new(raw).map(|raw| Context { raw })
    }

    fn context_size(&self, context: &Context) -> u32 {
        unsafe { sys::llama_n_ctx(context.raw.as_ptr()) }
    }

    fn decode(&self, context: &mut Context, batch: &mut [TokenId]) -> i32 {
        unsafe {
            let batch = sys::llama_batch_get_one(batch.as_mut_ptr(), buffer_len(batch.len()));
            sys::llama_decode(context.raw.as_ptr(), batch)
        }
    }

    fn sampler_chain(&self, vocab: &Vocab) -> Option<Sampler> {
        let n_vocab = unsafe { sys::llama_vocab_n_tokens(vocab.raw.as_ptr()) };
        let raw = unsafe {
            sys::llama_sampler_chain_init(sys::llama_sampler_chain_default_params())
        };
        NonNull::new(raw).map(|raw| Sampler { raw, n_vocab })
    }

    fn add_sampler_stage(&self, chain: &mut Sampler, stage: SamplerStage) {
        unsafe {
            let stage = match stage {
                SamplerStage::TopK { k } => sys::llama_sampler_init_top_k(k),
                SamplerStage::MinP { p, min_keep } => sys::llama_sampler_init_min_p(p, min_keep),
                SamplerStage::Temperature { t } => sys::llama_sampler_init_temp(t),
                SamplerStage::Penalties {
                    last_n,
                    repeat,
                    frequency,
                    presence,
                } => sys::llama_sampler_init_penalties(
                    chain.n_vocab,
                    last_n,
                    repeat,
                    frequency,
                    presence,
                ),
                SamplerStage::Distribution { seed } => sys::llama_sampler_init_dist(seed),
            };
            sys::llama_sampler_chain_add(chain.raw.as_ptr(), stage);
        }
    }

    fn sample(&self, chain: &mut Sampler, context: &mut Context) -> TokenId {
        // -1 selects the logits of the last token in the decoded batch.
        unsafe { sys::llama_sampler_sample(chain.raw.as_ptr(), context.raw.as_ptr(), -1) }
    }

    fn is_end_of_generation(&self, vocab: &Vocab, token: TokenId) -> bool {
        unsafe { sys::llama_vocab_is_eog(vocab.raw.as_ptr(), token) }
    }

    fn token_to_piece(
        &self,
        vocab: &Vocab,
        token: TokenId,
        buf: &mut [u8],
        lstrip: i32,
        special: bool,
    ) -> i32 {
        unsafe {
            sys::llama_token_to_piece(
                vocab.raw.as_ptr(),
                token,
                buf.as_mut_ptr().cast::<c_char>(),
                buffer_len(buf.len()),
                lstrip,
                special,
            )
        }
    }
}
