use crate::{CandidatePool, HistoryBuffer, SamplingParams};

/// Repetition, frequency and presence penalties over a window of the history.
#[derive(Debug, Clone)]
pub struct Penalties {
    /// Window size; 0 disables, -1 covers the whole history.
    pub last_n: i32,
    pub repeat: f32,
    pub freq: f32,
    pub present: f32,
    pub penalize_nl: bool,
    pub token_nl: u32,
}

impl Penalties {
    pub fn new(params: &SamplingParams, token_nl: u32) -> Self {
        Self {
            last_n: params.penalty_last_n,
            repeat: params.penalty_repeat,
            freq: params.penalty_freq,
            present: params.penalty_present,
            penalize_nl: params.penalize_nl,
            token_nl,
        }
    }

    pub fn is_active(&self) -> bool {
        self.last_n != 0 && (self.repeat != 1.0 || self.freq != 0.0 || self.present != 0.0)
    }

    pub fn apply(&self, pool: &mut CandidatePool, history: &HistoryBuffer) {
        if !self.is_active() {
            return;
        }
        let counts = history.counts(self.last_n);
        if counts.is_empty() {
            return;
        }

        let newline = match self.penalize_nl {
            true => None,
            false => pool.get(self.token_nl),
        };

        for candidate in pool.iter_mut() {
            let Some(&count) = counts.get(&candidate.id) else {
                continue;
            };
            // dividing a negative logit would make it more likely
            match candidate.logit > 0.0 {
                true => candidate.logit /= self.repeat,
                false => candidate.logit *= self.repeat,
            }
            candidate.logit -= self.freq * count as f32;
            candidate.logit -= self.present;
        }

        if let Some(newline) = newline {
            pool.set_logit(newline.id, newline.logit);
        }
    }
}
