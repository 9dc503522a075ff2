use crate::{Candidate, CandidatePool, Mirostat, SamplingParams};

#[derive(Debug, Clone, PartialEq)]
pub struct MirostatParams {
    pub version: Mirostat,
    /// Target surprise in bits.
    pub tau: f32,
    /// Learning rate.
    pub eta: f32,
    /// Candidates used to estimate the Zipf exponent (v1 only).
    pub m: usize,
    pub temp: f32,
    pub num_vocab: usize,
}

impl MirostatParams {
    pub fn new(params: &SamplingParams, num_vocab: usize) -> Self {
        Self {
            version: params.mirostat,
            tau: params.mirostat_tau,
            eta: params.mirostat_eta,
            m: params.mirostat_m.max(1) as usize,
            temp: params.temp,
            num_vocab,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MirostatState {
    /// Maximum surprise allowed for the next draw.
    pub mu: f32,
    /// Surprise of the last committed token.
    pub surprise: Option<f32>,
}

#[derive(Debug, Clone)]
pub struct MirostatSampler {
    pub params: MirostatParams,
    pub state: MirostatState,
}

impl MirostatSampler {
    pub fn new(params: MirostatParams) -> Self {
        let state = MirostatState {
            mu: params.tau * 2.0,
            surprise: None,
        };
        Self { params, state }
    }

    /// Draw a token and compute the state that would follow it. The state is
    /// only advanced by [`commit`](Self::commit).
    pub fn sample(
        &self,
        mut pool: CandidatePool,
        rng: &mut fastrand::Rng,
    ) -> Option<(Candidate, MirostatState)> {
        let MirostatSampler { params, state } = self;

        pool.scale(params.temp);
        pool.softmax();
        match params.version {
            Mirostat::V1 => {
                let k = self.estimate_k(&pool);
                pool.truncate(k);
            }
            Mirostat::V2 | Mirostat::Off => {
                let keep = pool
                    .iter()
                    .position(|c| c.surprise() > state.mu)
                    .unwrap_or(pool.len());
                pool.truncate(keep);
            }
        }
        pool.softmax();

        let token = pool.draw(rng)?;
        let surprise = token.surprise();
        let next = MirostatState {
            mu: state.mu - params.eta * (surprise - params.tau),
            surprise: Some(surprise),
        };
        Some((token, next))
    }

    pub fn commit(&mut self, state: MirostatState) {
        self.state = state;
    }

    pub fn reset(&mut self) {
        self.state = MirostatState {
            mu: self.params.tau * 2.0,
            surprise: None,
        };
    }

    /// Number of candidates to keep under a Zipf fit of the head of the distribution.
    fn estimate_k(&self, pool: &CandidatePool) -> usize {
        let candidates = pool.as_slice();
        let len = candidates.len();

        let (sum_ti_bi, sum_ti_sq) = candidates
            .windows(2)
            .take(self.params.m.saturating_sub(1))
            .take_while(|pair| pair[1].p > 0.0)
            .enumerate()
            .fold((0.0f32, 0.0f32), |(sum_ti_bi, sum_ti_sq), (i, pair)| {
                let t_i = ((i + 2) as f32 / (i + 1) as f32).ln();
                let b_i = (pair[0].p / pair[1].p).ln();
                (sum_ti_bi + t_i * b_i, sum_ti_sq + t_i * t_i)
            });
        let s_hat = sum_ti_bi / sum_ti_sq;
        if !s_hat.is_finite() {
            return len;
        }

        let epsilon = s_hat - 1.0;
        let n = self.params.num_vocab as f32;
        let k = ((epsilon * 2f32.powf(self.state.mu)) / (1.0 - n.powf(-epsilon))).powf(1.0 / s_hat);
        match k.is_finite() {
            true => (k as usize).clamp(1, len),
            false => len,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sampler(version: Mirostat) -> MirostatSampler {
        MirostatSampler::new(MirostatParams {
            version,
            tau: 5.0,
            eta: 0.1,
            m: 100,
            temp: 1.0,
            num_vocab: 2,
        })
    }

    #[test]
    fn test_v2_mu_update() {
        let mut sampler = sampler(Mirostat::V2);
        let mut rng = fastrand::Rng::with_seed(0);
        assert_eq!(sampler.state.mu, 10.0);

        let (_, state) = sampler
            .sample(CandidatePool::from_logits(&[0.0, 0.0]), &mut rng)
            .unwrap();
        assert!((state.mu - 10.4).abs() < 1e-5);
        assert_eq!(sampler.state.mu, 10.0);
        sampler.commit(state);

        let (_, state) = sampler
            .sample(CandidatePool::from_logits(&[0.0, 0.0]), &mut rng)
            .unwrap();
        assert!((state.mu - 10.8).abs() < 1e-5);
        assert_eq!(state.surprise, Some(1.0));

        sampler.reset();
        assert_eq!(sampler.state.mu, 10.0);
        assert_eq!(sampler.state.surprise, None);
    }

    #[test]
    fn test_v2_truncates_by_surprise() {
        let mut sampler = sampler(Mirostat::V2);
        sampler.state.mu = 1.5;
        let mut rng = fastrand::Rng::with_seed(3);
        // p = [0.5, 0.25, 0.125, 0.125]; only the first has surprise below 1.5 bits
        let logits = [0.5f32.ln(), 0.25f32.ln(), 0.125f32.ln(), 0.125f32.ln()];
        for _ in 0..16 {
            let (token, state) = sampler
                .sample(CandidatePool::from_logits(&logits), &mut rng)
                .unwrap();
            assert_eq!(token.id, 0);
            assert_eq!(state.surprise, Some(0.0));
        }
    }

    #[test]
    fn test_v2_keeps_one_when_mu_is_low() {
        let mut sampler = sampler(Mirostat::V2);
        sampler.state.mu = -1.0;
        let mut rng = fastrand::Rng::with_seed(3);
        let (token, _) = sampler
            .sample(CandidatePool::from_logits(&[1.0, 3.0, 2.0]), &mut rng)
            .unwrap();
        assert_eq!(token.id, 1);
    }

    #[test]
    fn test_v1_uniform_keeps_all() {
        // a flat distribution has no Zipf slope to fit
        let sampler = MirostatSampler::new(MirostatParams {
            num_vocab: 8,
            ..sampler(Mirostat::V1).params
        });
        let mut pool = CandidatePool::from_logits(&[0.0; 8]);
        pool.softmax();
        assert_eq!(sampler.estimate_k(&pool), 8);
    }

    #[test]
    fn test_v1_low_mu_keeps_head() {
        let mut sampler = MirostatSampler::new(MirostatParams {
            num_vocab: 5,
            ..sampler(Mirostat::V1).params
        });
        sampler.state.mu = 0.0;
        let mut pool = CandidatePool::from_logits(&[8.0, 4.0, 2.0, 1.0, 0.0]);
        pool.softmax();
        assert_eq!(sampler.estimate_k(&pool), 1);

        let mut rng = fastrand::Rng::with_seed(11);
        let (token, state) = sampler
            .sample(CandidatePool::from_logits(&[8.0, 4.0, 2.0, 1.0, 0.0]), &mut rng)
            .unwrap();
        assert_eq!(token.id, 0);
        assert!((state.mu - 0.5).abs() < 1e-5);
    }
}
