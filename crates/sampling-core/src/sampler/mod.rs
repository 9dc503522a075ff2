use crate::CandidatePool;

pub mod bnf;
pub mod chain;
pub mod mirostat;
pub mod nucleus;
pub mod penalty;
pub mod tail_free;
pub mod temperature;
pub mod typical;

pub trait Filter: std::fmt::Debug {
    /// Shrink the pool. Implementations keep at least one candidate and leave the pool sorted.
    fn apply(&self, pool: CandidatePool) -> CandidatePool;
}

pub trait Grammar: std::fmt::Debug {
    /// Set the logits of tokens illegal in the current state to negative infinity.
    fn transform(&self, logits: &mut [f32]);
    /// Advance the state after a token is accepted. Return if the state machine is halt.
    fn update(&mut self, token: u32) -> bool;
    /// If the state machine reached a terminal state.
    fn is_finished(&self) -> bool;

    /// Legality of every token id in the current state.
    fn allowed(&self, num_vocab: usize) -> Vec<bool> {
        let mut mask = vec![0.0; num_vocab];
        self.transform(&mut mask);
        mask.into_iter().map(|x| x > f32::NEG_INFINITY).collect()
    }
}
