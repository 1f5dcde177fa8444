//! Scripted in-memory engine shared by the session integration tests.
//!
//! Records every engine call (including handle drops) into a [`Journal`] and
//! can be told to fail at any stage.
#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::rc::Rc;

use llama_engine::{
    ChatMessage, ContextParams, InferenceEngine, ModelParams, SamplerStage, TokenId,
};

pub const BOS: TokenId = 1;
pub const EOG: TokenId = 2;
/// Token the sampler falls back to once its script runs out.
pub const FILLER: TokenId = 500;
/// Token whose piece does not fit the render buffer.
pub const OVERSIZED: TokenId = 999;
/// Vocabulary size of every scripted model.
pub const VOCAB_SIZE: i32 = 32_000;

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    LoadModel { path: PathBuf, gpu_layers: i32 },
    ApplyTemplate { capacity: usize },
    Tokenize { capacity: usize },
    SamplerChain { vocab_size: i32 },
    CreateContext(ContextParams),
    Decode { batch: Vec<TokenId> },
    AddStage(SamplerStage),
    Sample,
    Render { token: TokenId },
    ContextDropped,
    SamplerDropped,
    ModelDropped,
}

#[derive(Debug, Default)]
pub struct Journal {
    pub calls: Vec<Call>,
}

pub type SharedJournal = Rc<RefCell<Journal>>;

/// Knobs controlling how the scripted engine behaves.
#[derive(Debug, Clone)]
pub struct Script {
    /// Tokens the sampler returns in order, then [`FILLER`] forever.
    pub samples: Vec<TokenId>,
    /// Largest context the engine will allocate.
    pub max_context: u32,
    /// Decode call (0-based) that fails, if any.
    pub fail_decode_at: Option<usize>,
    pub fail_load: bool,
    pub fail_template_probe: bool,
    pub fail_template_fill: bool,
    /// Report this many bytes on fill instead of the true size.
    pub template_fill_len: Option<i32>,
    pub fail_tokenize_fill: bool,
    /// Report the prompt as too large for the tokenizer.
    pub tokenize_overflow: bool,
    pub fail_sampler_chain: bool,
    /// Context size the engine reports back, if different from the request.
    pub reported_context_size: Option<u32>,
    pub pieces: HashMap<TokenId, String>,
}

impl Default for Script {
    fn default() -> Self {
        Self {
            samples: Vec::new(),
            max_context: 4096,
            fail_decode_at: None,
            fail_load: false,
            fail_template_probe: false,
            fail_template_fill: false,
            template_fill_len: None,
            fail_tokenize_fill: false,
            tokenize_overflow: false,
            fail_sampler_chain: false,
            reported_context_size: None,
            pieces: HashMap::new(),
        }
    }
}

pub struct ScriptedEngine {
    pub journal: SharedJournal,
    script: Script,
    samples: RefCell<VecDeque<TokenId>>,
    decodes: RefCell<usize>,
    chains: RefCell<Vec<SharedHistory>>,
}

/// Tokens a sampler chain has drawn, in order.
pub type SharedHistory = Rc<RefCell<Vec<TokenId>>>;

impl ScriptedEngine {
    pub fn new(script: Script) -> Self {
        Self {
            journal: Rc::new(RefCell::new(Journal::default())),
            samples: RefCell::new(script.samples.iter().copied().collect()),
            decodes: RefCell::new(0),
            chains: RefCell::new(Vec::new()),
            script,
        }
    }

    pub fn journal(&self) -> SharedJournal {
        Rc::clone(&self.journal)
    }

    /// Sampling history of every chain this engine has created.
    pub fn chain_histories(&self) -> Vec<Vec<TokenId>> {
        self.chains
            .borrow()
            .iter()
            .map(|history| history.borrow().clone())
            .collect()
    }

    fn record(&self, call: Call) {
        self.journal.borrow_mut().calls.push(call);
    }

    /// Word-per-token tokenization with a leading BOS.
    pub fn token_ids(text: &str) -> Vec<TokenId> {
        std::iter::once(BOS)
            .chain(
                text.split_whitespace()
                    .enumerate()
                    .map(|(i, _)| 100 + i as TokenId),
            )
            .collect()
    }

    /// What the chat template renders `messages` into.
    pub fn render_template(messages: &[ChatMessage], add_assistant: bool) -> String {
        let mut out = String::new();
        for message in messages {
            out.push_str(&format!("<|{}|>{}\n", message.role, message.content));
        }
        if add_assistant {
            out.push_str("<|assistant|>");
        }
        out
    }

    pub fn piece(&self, token: TokenId) -> String {
        self.script
            .pieces
            .get(&token)
            .cloned()
            .unwrap_or_else(|| format!("t{token} "))
    }
}

pub struct Model {
    vocab: Vocab,
    journal: SharedJournal,
}

impl Drop for Model {
    fn drop(&mut self) {
        self.journal.borrow_mut().calls.push(Call::ModelDropped);
    }
}

pub struct Vocab {
    size: i32,
}

pub struct Context {
    params: ContextParams,
    journal: SharedJournal,
}

impl Drop for Context {
    fn drop(&mut self) {
        self.journal.borrow_mut().calls.push(Call::ContextDropped);
    }
}

pub struct Sampler {
    stages: Vec<SamplerStage>,
    n_vocab: i32,
    history: SharedHistory,
    journal: SharedJournal,
}

impl Drop for Sampler {
    fn drop(&mut self) {
        self.journal.borrow_mut().calls.push(Call::SamplerDropped);
    }
}

impl InferenceEngine for ScriptedEngine {
    type Model = Model;
    type Vocab = Vocab;
    type Context = Context;
    type Sampler = Sampler;

    fn load_model(&self, path: &Path, params: &ModelParams) -> Option<Model> {
        self.record(Call::LoadModel {
            path: path.to_path_buf(),
            gpu_layers: params.gpu_layers,
        });
        if self.script.fail_load {
            return None;
        }
        Some(Model {
            vocab: Vocab { size: VOCAB_SIZE },
            journal: self.journal(),
        })
    }

    fn vocab<'m>(&self, model: &'m Model) -> &'m Vocab {
        &model.vocab
    }

    fn chat_template(&self, _model: &Model) -> Option<String> {
        Some("scripted".to_string())
    }

    fn apply_chat_template(
        &self,
        _template: Option<&str>,
        messages: &[ChatMessage],
        add_assistant: bool,
        buf: &mut [u8],
    ) -> i32 {
        self.record(Call::ApplyTemplate {
            capacity: buf.len(),
        });
        let probing = buf.is_empty();
        if probing && self.script.fail_template_probe {
            return -1;
        }
        if !probing && self.script.fail_template_fill {
            return -1;
        }
        let rendered = Self::render_template(messages, add_assistant);
        let n = rendered.len().min(buf.len());
        buf[..n].copy_from_slice(&rendered.as_bytes()[..n]);
        match (probing, self.script.template_fill_len) {
            (false, Some(len)) => len,
            _ => rendered.len() as i32,
        }
    }

    fn tokenize(
        &self,
        _vocab: &Vocab,
        text: &str,
        buf: &mut [TokenId],
        _add_special: bool,
        _parse_special: bool,
    ) -> i32 {
        self.record(Call::Tokenize {
            capacity: buf.len(),
        });
        if self.script.tokenize_overflow {
            return llama_engine::TOKENIZE_OVERFLOW;
        }
        if !buf.is_empty() && self.script.fail_tokenize_fill {
            return -1;
        }
        let ids = Self::token_ids(text);
        if buf.len() < ids.len() {
            return -(ids.len() as i32);
        }
        buf[..ids.len()].copy_from_slice(&ids);
        ids.len() as i32
    }

    fn create_context(&self, _model: &Model, params: &ContextParams) -> Option<Context> {
        self.record(Call::CreateContext(*params));
        if params.context_size > self.script.max_context {
            return None;
        }
        Some(Context {
            params: *params,
            journal: self.journal(),
        })
    }

    fn context_size(&self, context: &Context) -> u32 {
        self.script
            .reported_context_size
            .unwrap_or(context.params.context_size)
    }

    fn decode(&self, _context: &mut Context, batch: &mut [TokenId]) -> i32 {
        self.record(Call::Decode {
            batch: batch.to_vec(),
        });
        let mut decodes = self.decodes.borrow_mut();
        let index = *decodes;
        *decodes += 1;
        if self.script.fail_decode_at == Some(index) {
            return 1;
        }
        0
    }

    fn sampler_chain(&self, vocab: &Vocab) -> Option<Sampler> {
        self.record(Call::SamplerChain {
            vocab_size: vocab.size,
        });
        if self.script.fail_sampler_chain {
            return None;
        }
        let history = SharedHistory::default();
        self.chains.borrow_mut().push(Rc::clone(&history));
        Some(Sampler {
            stages: Vec::new(),
            n_vocab: vocab.size,
            history,
            journal: self.journal(),
        })
    }

    fn add_sampler_stage(&self, chain: &mut Sampler, stage: SamplerStage) {
        self.record(Call::AddStage(stage));
        chain.stages.push(stage);
    }

    fn sample(&self, chain: &mut Sampler, _context: &mut Context) -> TokenId {
        self.record(Call::Sample);
        let token = self.samples.borrow_mut().pop_front().unwrap_or(FILLER);
        chain.history.borrow_mut().push(token);
        token
    }

    fn is_end_of_generation(&self, _vocab: &Vocab, token: TokenId) -> bool {
        token == EOG
    }

    fn token_to_piece(
        &self,
        _vocab: &Vocab,
        token: TokenId,
        buf: &mut [u8],
        _lstrip: i32,
        _special: bool,
    ) -> i32 {
        self.record(Call::Render { token });
        if token == OVERSIZED {
            return -300;
        }
        let piece = self.piece(token);
        if piece.len() > buf.len() {
            return -(piece.len() as i32);
        }
        buf[..piece.len()].copy_from_slice(piece.as_bytes());
        piece.len() as i32
    }
}

/// Count of calls in `journal` matching `pred`.
pub fn count(journal: &SharedJournal, pred: impl Fn(&Call) -> bool) -> usize {
    journal.borrow().calls.iter().filter(|c| pred(c)).count()
}

/// Batches submitted to decode, in order.
pub fn decoded_batches(journal: &SharedJournal) -> Vec<Vec<TokenId>> {
    journal
        .borrow()
        .calls
        .iter()
        .filter_map(|c| match c {
            Call::Decode { batch } => Some(batch.clone()),
            _ => None,
        })
        .collect()
}

/// Sink that records every write and flush.
#[derive(Debug, Default)]
pub struct RecordingSink {
    pub bytes: Vec<u8>,
    pub writes: usize,
    pub flushes: usize,
    /// Fail the write after this many successful ones.
    pub fail_after: Option<usize>,
}

impl RecordingSink {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.bytes).into_owned()
    }
}

impl Write for RecordingSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.fail_after == Some(self.writes) {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "sink closed"));
        }
        self.writes += 1;
        self.bytes.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.flushes += 1;
        Ok(())
    }
}
