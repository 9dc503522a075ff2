use std::path::PathBuf;

use thiserror::Error;

/// Failure to build a [`SamplingContext`](crate::SamplingContext). No context exists afterwards.
#[derive(Debug, Error)]
pub enum ConstructionError {
    #[error("invalid sampling parameter `{name}`: {value}")]
    InvalidParam { name: &'static str, value: String },
    #[error("invalid mirostat mode `{0}`, expected 0 (off), 1 or 2")]
    Mirostat(i32),
    #[error("model reports an empty vocabulary")]
    EmptyVocab,
    #[error("newline token {token} is outside the vocabulary of {num_vocab} tokens")]
    NewlineToken { token: u32, num_vocab: usize },
    #[error("vocabulary lists {found} tokens but the model reports {expected}")]
    VocabMismatch { expected: usize, found: usize },
    #[error("failed to read grammar from {path:?}")]
    GrammarIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to compile grammar: {0}")]
    Grammar(anyhow::Error),
}

impl ConstructionError {
    pub(crate) fn param(name: &'static str, value: impl std::fmt::Display) -> Self {
        Self::InvalidParam {
            name,
            value: value.to_string(),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SampleError {
    #[error("score source has no scores for position {0}")]
    MissingScores(i32),
    #[error("score vector has {found} entries, expected {expected}")]
    ScoreLength { expected: usize, found: usize },
    #[error("no candidate left to draw from")]
    EmptyPool,
}
