//! Sampler chain construction.
//!
//! The chain is fixed: top-k → min-p → temperature → penalties → final draw.
//! Each stage narrows or reweights what the previous one left, so the order
//! matters and must not change.

use llama_engine::{InferenceEngine, SamplerStage, DEFAULT_SEED};

use crate::error::{Result, SessionError};

pub const TOP_K: i32 = 35;
pub const MIN_P: f32 = 0.3;
pub const MIN_KEEP: usize = 2;
/// How many recently sampled tokens the penalty stage looks at.
pub const PENALTY_LAST_N: i32 = 128;
pub const REPEAT_PENALTY: f32 = 1.5;
pub const FREQUENCY_PENALTY: f32 = 0.7;
pub const PRESENCE_PENALTY: f32 = 0.7;

/// The stages of the chain, in order, for a given temperature.
pub fn sampler_stages(temperature: f32) -> [SamplerStage; 5] {
    [
        SamplerStage::TopK { k: TOP_K },
        SamplerStage::MinP {
            p: MIN_P,
            min_keep: MIN_KEEP,
        },
        SamplerStage::Temperature { t: temperature },
        SamplerStage::Penalties {
            last_n: PENALTY_LAST_N,
            repeat: REPEAT_PENALTY,
            frequency: FREQUENCY_PENALTY,
            presence: PRESENCE_PENALTY,
        },
        SamplerStage::Distribution { seed: DEFAULT_SEED },
    ]
}

/// Build the sampler chain for a model with vocabulary `vocab`.
pub fn build_sampler_chain<E: InferenceEngine>(
    engine: &E,
    vocab: &E::Vocab,
    temperature: f32,
) -> Result<E::Sampler> {
    let mut chain = engine.sampler_chain(vocab).ok_or(SessionError::SamplerInit)?;
    for stage in sampler_stages(temperature) {
        engine.add_sampler_stage(&mut chain, stage);
    }
    tracing::debug!(temperature, "sampler chain built");
    Ok(chain)
}
