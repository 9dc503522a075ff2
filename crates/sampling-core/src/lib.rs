pub mod candidates;
pub mod context;
pub mod error;
pub mod history;
pub mod params;
pub mod sampler;

pub use candidates::{Candidate, CandidatePool};
pub use context::{GrammarOutcome, SampleReport, SamplingContext};
pub use error::{ConstructionError, SampleError};
pub use history::HistoryBuffer;
pub use params::{GrammarSource, Mirostat, SamplingParams, DEFAULT_SEED};

/// What the context needs to know about the model, read once at construction.
#[derive(Debug, Clone, Default)]
pub struct ModelInfo {
    pub num_vocab: usize,
    pub token_nl: u32,
    /// Bytes of every token, indexed by id. Only required when a grammar is configured.
    pub tokens: Vec<Vec<u8>>,
}

/// Per-position model scores. Position `-1` refers to the last row.
pub trait ScoreSource {
    fn scores(&self, position: i32) -> Option<&[f32]>;
}

impl ScoreSource for [Vec<f32>] {
    fn scores(&self, position: i32) -> Option<&[f32]> {
        let index = match position {
            -1 => self.len().checked_sub(1)?,
            position => usize::try_from(position).ok()?,
        };
        self.get(index).map(Vec::as_slice)
    }
}

impl ScoreSource for Vec<Vec<f32>> {
    fn scores(&self, position: i32) -> Option<&[f32]> {
        self.as_slice().scores(position)
    }
}

/// A single row, reachable at position `0` or `-1`.
impl ScoreSource for Vec<f32> {
    fn scores(&self, position: i32) -> Option<&[f32]> {
        match position {
            0 | -1 => Some(self),
            _ => None,
        }
    }
}
