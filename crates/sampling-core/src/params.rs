use std::{borrow::Cow, ops::RangeInclusive, path::PathBuf};

use derivative::Derivative;
use serde::{Deserialize, Serialize};

use crate::ConstructionError;

/// Seed value that asks the context to pick a random seed on construction.
pub const DEFAULT_SEED: u32 = u32::MAX;

/// Feedback-controlled sampling mode. Serialized as `0`, `1` or `2`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "i32", into = "i32")]
pub enum Mirostat {
    #[default]
    Off,
    V1,
    V2,
}

impl TryFrom<i32> for Mirostat {
    type Error = ConstructionError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Off),
            1 => Ok(Self::V1),
            2 => Ok(Self::V2),
            value => Err(ConstructionError::Mirostat(value)),
        }
    }
}

impl From<Mirostat> for i32 {
    fn from(value: Mirostat) -> Self {
        match value {
            Mirostat::Off => 0,
            Mirostat::V1 => 1,
            Mirostat::V2 => 2,
        }
    }
}

/// Where the grammar definition comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrammarSource {
    /// Path to a grammar file, read once at construction.
    Path(PathBuf),
    /// Grammar text given directly.
    Inline(String),
}

impl GrammarSource {
    pub fn load(&self) -> Result<Cow<'_, str>, ConstructionError> {
        match self {
            GrammarSource::Inline(schema) => Ok(Cow::Borrowed(schema)),
            GrammarSource::Path(path) => std::fs::read_to_string(path)
                .map(Cow::Owned)
                .map_err(|source| ConstructionError::GrammarIo {
                    path: path.clone(),
                    source,
                }),
        }
    }
}

#[derive(Debug, Clone, Derivative, Serialize, Deserialize)]
#[derivative(Default)]
#[serde(default)]
pub struct SamplingParams {
    /// Number of previous tokens to remember.
    #[derivative(Default(value = "64"))]
    pub n_prev: i32,
    /// If greater than 0, report the probabilities of the top `n_probs` tokens.
    pub n_probs: i32,
    /// Lower bound on candidates surviving the filters (0 = no floor beyond one).
    pub min_keep: i32,
    /// Less than or equal to 0 to keep the whole vocabulary.
    #[derivative(Default(value = "40"))]
    pub top_k: i32,
    /// 1.0 = disabled.
    #[derivative(Default(value = "0.95"))]
    pub top_p: f32,
    /// 0.0 = disabled.
    #[derivative(Default(value = "0.05"))]
    pub min_p: f32,
    /// 1.0 = disabled.
    #[derivative(Default(value = "1.0"))]
    pub tfs_z: f32,
    /// 1.0 = disabled.
    #[derivative(Default(value = "1.0"))]
    pub typical_p: f32,
    /// Less than 0 samples greedily; exactly 0 samples greedily without reporting probabilities.
    #[derivative(Default(value = "0.8"))]
    #[serde(alias = "temperature")]
    pub temp: f32,
    /// 0.0 = disabled.
    pub dynatemp_range: f32,
    /// Controls how entropy maps to temperature in dynamic temperature sampling.
    #[derivative(Default(value = "1.0"))]
    pub dynatemp_exponent: f32,
    /// Last n tokens to penalize (0 = disabled, -1 = whole history).
    #[derivative(Default(value = "64"))]
    pub penalty_last_n: i32,
    /// 1.0 = disabled.
    #[derivative(Default(value = "1.0"))]
    pub penalty_repeat: f32,
    /// 0.0 = disabled.
    #[serde(alias = "frequency_penalty")]
    pub penalty_freq: f32,
    /// 0.0 = disabled.
    #[serde(alias = "presence_penalty")]
    pub penalty_present: f32,
    pub mirostat: Mirostat,
    /// Target surprise.
    #[derivative(Default(value = "5.0"))]
    pub mirostat_tau: f32,
    /// Learning rate.
    #[derivative(Default(value = "0.1"))]
    #[serde(alias = "learning_rate")]
    pub mirostat_eta: f32,
    /// Candidates used to estimate the Zipf exponent in mirostat v1.
    #[derivative(Default(value = "100"))]
    pub mirostat_m: i32,
    /// Consider newlines as a repeatable token.
    pub penalize_nl: bool,
    #[derivative(Default(value = "DEFAULT_SEED"))]
    pub seed: u32,
    pub grammar: Option<GrammarSource>,
}

impl SamplingParams {
    /// Reject out-of-range or non-finite values. Sentinels are accepted as-is.
    pub fn validate(&self) -> Result<(), ConstructionError> {
        non_negative("n_prev", self.n_prev)?;
        non_negative("n_probs", self.n_probs)?;
        non_negative("min_keep", self.min_keep)?;
        if self.penalty_last_n < -1 {
            return Err(ConstructionError::param(
                "penalty_last_n",
                self.penalty_last_n,
            ));
        }
        if self.mirostat_m < 1 {
            return Err(ConstructionError::param("mirostat_m", self.mirostat_m));
        }

        finite_in("top_p", self.top_p, 0.0..=1.0)?;
        finite_in("min_p", self.min_p, 0.0..=1.0)?;
        finite_in("tfs_z", self.tfs_z, 0.0..=1.0)?;
        finite_in("typical_p", self.typical_p, 0.0..=1.0)?;
        finite_in("temp", self.temp, f32::MIN..=f32::MAX)?;
        finite_in("dynatemp_range", self.dynatemp_range, 0.0..=f32::MAX)?;
        finite_in("dynatemp_exponent", self.dynatemp_exponent, 0.0..=f32::MAX)?;
        finite_in("penalty_repeat", self.penalty_repeat, f32::MIN_POSITIVE..=f32::MAX)?;
        finite_in("penalty_freq", self.penalty_freq, f32::MIN..=f32::MAX)?;
        finite_in("penalty_present", self.penalty_present, f32::MIN..=f32::MAX)?;
        finite_in("mirostat_tau", self.mirostat_tau, 0.0..=f32::MAX)?;
        finite_in("mirostat_eta", self.mirostat_eta, 0.0..=f32::MAX)?;
        Ok(())
    }

    /// Number of probabilities to report, clipped to the vocabulary.
    pub fn n_probs(&self, num_vocab: usize) -> usize {
        match self.temp == 0.0 {
            true => 0,
            false => (self.n_probs.max(0) as usize).min(num_vocab),
        }
    }
}

fn non_negative(name: &'static str, value: i32) -> Result<(), ConstructionError> {
    match value >= 0 {
        true => Ok(()),
        false => Err(ConstructionError::param(name, value)),
    }
}

fn finite_in(
    name: &'static str,
    value: f32,
    range: RangeInclusive<f32>,
) -> Result<(), ConstructionError> {
    match value.is_finite() && range.contains(&value) {
        true => Ok(()),
        false => Err(ConstructionError::param(name, value)),
    }
}
