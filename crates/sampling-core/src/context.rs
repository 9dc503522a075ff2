//! Per-stream sampling state and the token pipeline.
//!
//! Each call to [`SamplingContext::sample`] runs
//! scores → pool → grammar pre-mask → penalties → filters → strategy → grammar post-check,
//! and [`SamplingContext::accept`] is the only way to advance history and grammar.

use serde::Serialize;

use crate::{
    sampler::{
        bnf::BnfGrammar,
        chain::FilterChain,
        mirostat::MirostatState,
        penalty::Penalties,
        temperature::{Selection, Strategy},
        Grammar,
    },
    CandidatePool, ConstructionError, HistoryBuffer, ModelInfo, SampleError, SamplingParams,
    ScoreSource, DEFAULT_SEED,
};

/// How the grammar took part in the last sample.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GrammarOutcome {
    /// No grammar is configured.
    #[default]
    Unconstrained,
    /// The pool was restricted to legal tokens before sampling.
    Masked,
    /// The unconstrained choice was legal.
    Accepted,
    /// The unconstrained choice was illegal and the legal tokens were sampled again.
    Resampled,
    /// No token was legal, so the grammar was ignored for this sample.
    Bypassed,
}

#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct SampleReport {
    pub token: u32,
    pub outcome: GrammarOutcome,
    /// Top `n_probs` candidates with their probabilities, most likely first.
    pub probs: Vec<(u32, f32)>,
}

#[derive(Debug)]
pub struct SamplingContext {
    params: SamplingParams,
    num_vocab: usize,
    seed: u32,
    history: HistoryBuffer,
    rng: fastrand::Rng,
    strategy: Strategy,
    chain: FilterChain,
    penalties: Penalties,
    grammar: Option<Box<dyn Grammar + Send>>,
    report: Option<SampleReport>,
}

impl SamplingContext {
    /// Validate `params` and compile the configured grammar, if any.
    pub fn new(info: &ModelInfo, params: SamplingParams) -> Result<Self, ConstructionError> {
        Self::check(info, &params)?;
        let grammar = match &params.grammar {
            Some(source) => {
                if info.tokens.len() != info.num_vocab {
                    return Err(ConstructionError::VocabMismatch {
                        expected: info.num_vocab,
                        found: info.tokens.len(),
                    });
                }
                let schema = source.load()?;
                let grammar =
                    BnfGrammar::new(&info.tokens, &schema).map_err(ConstructionError::Grammar)?;
                log::info!("[context][grammar] compiled");
                Some(Box::new(grammar) as Box<dyn Grammar + Send>)
            }
            None => None,
        };
        Ok(Self::build(info, params, grammar))
    }

    /// Use a caller-supplied automaton instead of compiling `params.grammar`.
    pub fn with_grammar(
        info: &ModelInfo,
        params: SamplingParams,
        grammar: impl Grammar + Send + 'static,
    ) -> Result<Self, ConstructionError> {
        Self::check(info, &params)?;
        Ok(Self::build(info, params, Some(Box::new(grammar))))
    }

    fn check(info: &ModelInfo, params: &SamplingParams) -> Result<(), ConstructionError> {
        params.validate()?;
        if info.num_vocab == 0 {
            return Err(ConstructionError::EmptyVocab);
        }
        if info.token_nl as usize >= info.num_vocab {
            return Err(ConstructionError::NewlineToken {
                token: info.token_nl,
                num_vocab: info.num_vocab,
            });
        }
        Ok(())
    }

    fn build(
        info: &ModelInfo,
        params: SamplingParams,
        grammar: Option<Box<dyn Grammar + Send>>,
    ) -> Self {
        let seed = match params.seed {
            DEFAULT_SEED => {
                let seed = fastrand::u32(..DEFAULT_SEED);
                log::info!("[context][seed: {seed}] random");
                seed
            }
            seed => seed,
        };
        let num_vocab = info.num_vocab;
        let history = HistoryBuffer::new(params.n_prev.max(0) as usize);
        let strategy = Strategy::from_params(&params, num_vocab);
        let chain = FilterChain::from_params(&params);
        let penalties = Penalties::new(&params, info.token_nl);
        log::debug!("[context][strategy] {strategy:?}");
        log::debug!("[context][chain] {chain:?}");

        Self {
            params,
            num_vocab,
            seed,
            history,
            rng: fastrand::Rng::with_seed(seed as u64),
            strategy,
            chain,
            penalties,
            grammar,
            report: None,
        }
    }

    /// Select the next token from the scores at `position`.
    ///
    /// With `grammar_first`, the pool is restricted to legal tokens before anything else runs.
    /// Otherwise the unconstrained choice is checked afterwards and, if illegal, sampling is
    /// repeated over the legal tokens. History and grammar state are left untouched.
    pub fn sample<S: ScoreSource + ?Sized>(
        &mut self,
        source: &S,
        position: i32,
        grammar_first: bool,
    ) -> Result<u32, SampleError> {
        let scores = source
            .scores(position)
            .ok_or(SampleError::MissingScores(position))?;
        if scores.len() != self.num_vocab {
            return Err(SampleError::ScoreLength {
                expected: self.num_vocab,
                found: scores.len(),
            });
        }

        let pool = CandidatePool::from_logits(scores);
        let allowed = self
            .grammar
            .as_ref()
            .map(|grammar| grammar.allowed(self.num_vocab));

        let ((selection, probs), outcome) = match (allowed, grammar_first) {
            (None, _) => (self.select(pool)?, GrammarOutcome::Unconstrained),
            (Some(allowed), true) => {
                let masked = pool.filtered(|c| allowed[c.id as usize]);
                match masked.is_empty() {
                    true => {
                        log::warn!("[sample][grammar] no legal token, bypassing");
                        (self.select(pool)?, GrammarOutcome::Bypassed)
                    }
                    false => (self.select(masked)?, GrammarOutcome::Masked),
                }
            }
            (Some(allowed), false) => {
                let masked = pool.filtered(|c| allowed[c.id as usize]);
                let first = self.select(pool)?;
                let token = first.0.token.id;
                match (allowed[token as usize], masked.is_empty()) {
                    (true, _) => (first, GrammarOutcome::Accepted),
                    (false, true) => {
                        log::warn!("[sample][grammar] no legal token, bypassing");
                        (first, GrammarOutcome::Bypassed)
                    }
                    (false, false) => {
                        log::debug!("[sample][grammar][token: {token}] illegal, resampling");
                        (self.select(masked)?, GrammarOutcome::Resampled)
                    }
                }
            }
        };

        if let Some(state) = selection.mirostat {
            self.strategy.commit(state);
        }
        let token = selection.token.id;
        self.report = Some(SampleReport {
            token,
            outcome,
            probs,
        });
        Ok(token)
    }

    /// Run penalties, filters and the strategy over `pool` without committing any state.
    fn select(
        &mut self,
        mut pool: CandidatePool,
    ) -> Result<(Selection, Vec<(u32, f32)>), SampleError> {
        self.penalties.apply(&mut pool, &self.history);
        let pool = match self.strategy.uses_filters() {
            true => self.chain.apply(pool),
            false => pool,
        };

        let probs = match self.params.n_probs(self.num_vocab) {
            0 => vec![],
            n => {
                let mut pool = pool.clone();
                pool.softmax();
                pool.iter().take(n).map(|c| (c.id, c.p)).collect()
            }
        };
        let selection = self
            .strategy
            .sample(pool, &mut self.rng)
            .ok_or(SampleError::EmptyPool)?;
        Ok((selection, probs))
    }

    /// Record `token` in the history and, if `apply_grammar`, advance the grammar with it.
    pub fn accept(&mut self, token: u32, apply_grammar: bool) {
        self.history.push(token);
        if !apply_grammar {
            return;
        }
        if let Some(grammar) = self.grammar.as_mut() {
            if grammar.update(token) {
                log::debug!("[accept][grammar][token: {token}] finished");
            }
        }
    }

    /// Clear the history, restore the initial mirostat state and reseed.
    /// The grammar keeps its state.
    pub fn reset(&mut self) {
        self.history.clear();
        self.strategy.reset();
        self.rng = fastrand::Rng::with_seed(self.seed as u64);
        self.report = None;
    }

    /// The seed in use, which differs from `params().seed` if that was [`DEFAULT_SEED`].
    pub fn seed(&self) -> u32 {
        self.seed
    }

    pub fn params(&self) -> &SamplingParams {
        &self.params
    }

    pub fn history(&self) -> &HistoryBuffer {
        &self.history
    }

    pub fn last_sample(&self) -> Option<&SampleReport> {
        self.report.as_ref()
    }

    pub fn mirostat_state(&self) -> Option<MirostatState> {
        self.strategy.mirostat_state()
    }

    /// If the grammar reached a terminal state. Always false without a grammar.
    pub fn is_finished(&self) -> bool {
        self.grammar
            .as_ref()
            .map(|grammar| grammar.is_finished())
            .unwrap_or(false)
    }
}
