use anyhow::Result;
use kbnf::{
    engine_like::AcceptTokenError, AcceptTokenResult, Engine, EngineLike, Token, Vocabulary,
};

use super::Grammar;

/// A `kbnf` automaton over the model vocabulary.
#[derive(Debug)]
pub struct BnfGrammar(Engine);

impl BnfGrammar {
    /// Compile `schema` against the per-id token bytes. Empty tokens can never be produced by the grammar.
    pub fn new(tokens: &[Vec<u8>], schema: &str) -> Result<Self> {
        let tokens_iter = || {
            tokens
                .iter()
                .enumerate()
                .filter(|(_, v)| !v.is_empty())
        };
        let ids = tokens_iter()
            .map(|(k, v)| (k as u32, Token(v.clone().into_boxed_slice())))
            .collect();
        let strings = tokens_iter()
            .map(|(k, v)| (k as u32, String::from_utf8_lossy(v).to_string()))
            .collect();
        let vocab = Vocabulary::new(ids, strings)?;
        let mut engine = Engine::new(schema, vocab)?;
        engine.compute_allowed_token_ids();
        Ok(Self(engine))
    }
}

impl Grammar for BnfGrammar {
    fn transform(&self, logits: &mut [f32]) {
        let len = self.0.vocab().vocab_size().min(logits.len());
        let (head, tail) = logits.split_at_mut(len);
        if let Err(err) = self.0.mask_logits(head) {
            log::warn!("[bnf][transform] {err}");
        }
        tail.fill(f32::NEG_INFINITY);
    }

    fn update(&mut self, token: u32) -> bool {
        let halt = match self.0.try_accept_new_token(token) {
            Ok(AcceptTokenResult::Finished) | Err(AcceptTokenError::Finished) => true,
            Ok(AcceptTokenResult::Ongoing) => false,
            Err(err) => {
                log::warn!("[bnf][reject][token: {token}] {err}");
                self.0.is_finished()
            }
        };
        self.0.compute_allowed_token_ids();
        halt
    }

    fn is_finished(&self) -> bool {
        self.0.is_finished()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vocab() -> Vec<Vec<u8>> {
        ["a", "b", "c"].map(|s| s.as_bytes().to_vec()).to_vec()
    }

    #[test]
    fn test_malformed_grammar() {
        assert!(BnfGrammar::new(&vocab(), "start::=").is_err());
    }

    #[test]
    fn test_single_legal_token() {
        let mut grammar = BnfGrammar::new(&vocab(), "start::='b';").unwrap();
        assert_eq!(grammar.allowed(3), vec![false, true, false]);
        assert!(!grammar.is_finished());

        assert!(grammar.update(1));
        assert!(grammar.is_finished());
    }
}
