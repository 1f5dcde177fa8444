//! # llama-cli
//!
//! Document summarizer: reads text from standard input and streams a short
//! summary of it from a local model.
//!
//! Wires: stdin → summarization conversation → chat template → generation → stdout.
//! Everything except process setup lives here so it can run against any
//! [`InferenceEngine`].

use std::io::{self, Read, Write};
use std::path::PathBuf;

use clap::Parser;
use llama_engine::{ChatMessage, InferenceEngine};
use llama_session::{GenerationReport, Session, SessionConfig, SessionError};

/// Model used when neither `--model` nor `SUMMARIZE_MODEL` is given.
pub const DEFAULT_MODEL_PATH: &str = "models/model.gguf";

/// Printed instead of generating when standard input is empty.
pub const NOTHING_TO_SUMMARIZE: &str = "Nothing to summarize!";

pub const SYSTEM_PROMPT: &str = "You are a document summarizer. User will provide a technical text and \
you will summarize it. Be brief and direct. Include only essential information. Keep your summary \
short with few sentences. Only focus on human readable text. Write ONLY 3-5 sentences, then \
stop.\n\nTEXT:\n";

pub const USER_PROMPT_SUFFIX: &str =
    "\n\nSHORT SUMMARY (Be brief and precise, stop after 3-5 sentences):\n";

/// Errors from the summarizer.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("failed to read input: {0}")]
    Input(#[source] io::Error),
    #[error("failed to write output: {0}")]
    Output(#[source] io::Error),
}

/// Document Summarizer
///
/// It reads from stdin and summarizes the input text with the given model.
#[derive(Debug, Clone, Parser)]
#[command(name = "summarize", version)]
pub struct Cli {
    /// Sampling temperature.
    #[arg(short, long, default_value_t = SessionConfig::DEFAULT_TEMPERATURE)]
    pub temperature: f32,

    /// Path to the model file (GGUF).
    #[arg(short, long, env = "SUMMARIZE_MODEL", default_value = DEFAULT_MODEL_PATH)]
    pub model: PathBuf,

    /// Number of model layers to offload to the GPU.
    #[arg(short, long, default_value_t = SessionConfig::DEFAULT_GPU_LAYERS)]
    pub gpu_layers: i32,

    /// Maximum number of tokens to generate.
    #[arg(
        short = 'n',
        long = "predict",
        default_value_t = SessionConfig::DEFAULT_PREDICTION_BUDGET
    )]
    pub prediction_budget: usize,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig::new(&self.model)
            .with_temperature(self.temperature)
            .with_gpu_layers(self.gpu_layers)
            .with_prediction_budget(self.prediction_budget)
    }

    pub fn log_level(&self) -> tracing::Level {
        match self.verbose {
            0 => tracing::Level::WARN,
            1 => tracing::Level::INFO,
            2 => tracing::Level::DEBUG,
            _ => tracing::Level::TRACE,
        }
    }
}

/// How a run ended.
#[derive(Debug)]
pub enum Outcome {
    /// Input was empty; no model was loaded.
    NothingToSummarize,
    Summarized(GenerationReport),
}

/// Read all of `reader` as text. Invalid UTF-8 is replaced rather than rejected.
pub fn read_input(mut reader: impl Read) -> Result<String, CliError> {
    let mut bytes = Vec::new();
    reader.read_to_end(&mut bytes).map_err(CliError::Input)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// The two-message conversation asking the model to summarize `text`.
pub fn summary_messages(text: &str) -> Vec<ChatMessage> {
    let mut user_prompt = String::with_capacity(text.len() + USER_PROMPT_SUFFIX.len());
    user_prompt.push_str(text);
    user_prompt.push_str(USER_PROMPT_SUFFIX);

    vec![
        ChatMessage::system(SYSTEM_PROMPT),
        ChatMessage::user(user_prompt),
    ]
}

/// Summarize `input` into `out`.
///
/// `engine` is only invoked when there is something to summarize, so empty
/// input never initializes a backend.
pub fn run<E, F, W>(
    engine: F,
    config: SessionConfig,
    input: &str,
    out: &mut W,
) -> Result<Outcome, CliError>
where
    E: InferenceEngine,
    F: FnOnce() -> E,
    W: Write + ?Sized,
{
    if input.is_empty() {
        writeln!(out, "{NOTHING_TO_SUMMARIZE}").map_err(CliError::Output)?;
        return Ok(Outcome::NothingToSummarize);
    }

    writeln!(out, "Model path: {}", config.model_path.display()).map_err(CliError::Output)?;

    let messages = summary_messages(input);
    let mut session = Session::new(engine(), config)?;
    let prompt = session.formatted_prompt(&messages)?;
    tracing::debug!(bytes = prompt.len(), "prompt formatted");

    let report = session.generate_response(&prompt, out)?;
    Ok(Outcome::Summarized(report))
}
