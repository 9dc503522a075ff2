use super::mirostat::{MirostatParams, MirostatSampler, MirostatState};
use crate::{Candidate, CandidatePool, Mirostat, SamplingParams};

/// Entropy-driven temperature in `[temp - range, temp + range]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DynamicTemp {
    pub temp: f32,
    pub range: f32,
    pub exponent: f32,
}

impl DynamicTemp {
    /// Temperature for a pool whose probabilities are already computed.
    pub fn temperature(&self, pool: &CandidatePool) -> f32 {
        if pool.len() <= 1 {
            return self.temp;
        }
        let min = (self.temp - self.range).max(0.0);
        let max = self.temp + self.range;

        let max_entropy = (pool.len() as f32).ln();
        let normalized = pool.entropy() / max_entropy;
        let temp = min + (max - min) * normalized.powf(self.exponent);
        match temp.is_finite() {
            true => temp.max(f32::EPSILON),
            false => self.temp,
        }
    }
}

/// The last stage of the pipeline: turns a pool into one token.
#[derive(Debug, Clone)]
pub enum Strategy {
    Greedy,
    FixedTemp(f32),
    DynamicTemp(DynamicTemp),
    Mirostat(MirostatSampler),
}

/// A drawn token and, under mirostat, the state it would advance to.
#[derive(Debug, Clone, Copy)]
pub struct Selection {
    pub token: Candidate,
    pub mirostat: Option<MirostatState>,
}

impl Strategy {
    pub fn from_params(params: &SamplingParams, num_vocab: usize) -> Self {
        if params.temp <= 0.0 {
            return Self::Greedy;
        }
        match params.mirostat {
            Mirostat::V1 | Mirostat::V2 => {
                let params = MirostatParams::new(params, num_vocab);
                Self::Mirostat(MirostatSampler::new(params))
            }
            Mirostat::Off if params.dynatemp_range > 0.0 => Self::DynamicTemp(DynamicTemp {
                temp: params.temp,
                range: params.dynatemp_range,
                exponent: params.dynatemp_exponent,
            }),
            Mirostat::Off => Self::FixedTemp(params.temp),
        }
    }

    /// Mirostat does its own truncation and skips the filter chain.
    pub fn uses_filters(&self) -> bool {
        !matches!(self, Self::Mirostat(_))
    }

    /// Pick a token. The pool must not be empty.
    pub fn sample(&self, mut pool: CandidatePool, rng: &mut fastrand::Rng) -> Option<Selection> {
        let token = match self {
            Strategy::Greedy => {
                pool.softmax();
                pool.first()?
            }
            Strategy::FixedTemp(temp) => {
                pool.scale(*temp);
                pool.softmax();
                pool.draw(rng)?
            }
            Strategy::DynamicTemp(dynamic) => {
                pool.softmax();
                let temp = dynamic.temperature(&pool);
                log::trace!("[sample][dynatemp: {temp}]");
                pool.scale(temp);
                pool.softmax();
                pool.draw(rng)?
            }
            Strategy::Mirostat(sampler) => {
                let (token, state) = sampler.sample(pool, rng)?;
                return Some(Selection {
                    token,
                    mirostat: Some(state),
                });
            }
        };
        Some(Selection {
            token,
            mirostat: None,
        })
    }

    pub fn mirostat_state(&self) -> Option<MirostatState> {
        match self {
            Strategy::Mirostat(sampler) => Some(sampler.state),
            _ => None,
        }
    }

    pub fn commit(&mut self, state: MirostatState) {
        if let Strategy::Mirostat(sampler) = self {
            sampler.commit(state);
        }
    }

    pub fn reset(&mut self) {
        if let Strategy::Mirostat(sampler) = self {
            sampler.reset();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selection_order() {
        let params = SamplingParams {
            temp: 0.0,
            mirostat: Mirostat::V2,
            ..Default::default()
        };
        assert!(matches!(Strategy::from_params(&params, 4), Strategy::Greedy));

        let params = SamplingParams {
            mirostat: Mirostat::V1,
            dynatemp_range: 0.5,
            ..Default::default()
        };
        let strategy = Strategy::from_params(&params, 4);
        assert!(matches!(strategy, Strategy::Mirostat(_)));
        assert!(!strategy.uses_filters());

        let params = SamplingParams {
            dynatemp_range: 0.5,
            ..Default::default()
        };
        assert!(matches!(
            Strategy::from_params(&params, 4),
            Strategy::DynamicTemp(_)
        ));

        let strategy = Strategy::from_params(&SamplingParams::default(), 4);
        assert!(matches!(strategy, Strategy::FixedTemp(temp) if temp == 0.8));
        assert!(strategy.uses_filters());
    }

    #[test]
    fn test_greedy_ignores_rng() {
        let logits = [1.0, 5.0, 2.0, 5.0, -1.0];
        let mut a = fastrand::Rng::with_seed(1);
        let mut b = fastrand::Rng::with_seed(1);
        let selection = Strategy::Greedy
            .sample(CandidatePool::from_logits(&logits), &mut a)
            .unwrap();
        assert_eq!(selection.token.id, 1);
        assert!(selection.mirostat.is_none());
        assert_eq!(a.u64(..), b.u64(..));
    }

    #[test]
    fn test_low_temperature_sharpens() {
        let mut rng = fastrand::Rng::with_seed(5);
        let strategy = Strategy::FixedTemp(0.01);
        for _ in 0..32 {
            let selection = strategy
                .sample(CandidatePool::from_logits(&[0.0, 1.0, 0.5]), &mut rng)
                .unwrap();
            assert_eq!(selection.token.id, 1);
        }
    }

    #[test]
    fn test_dynamic_temperature_bounds() {
        let dynamic = DynamicTemp {
            temp: 1.0,
            range: 0.5,
            exponent: 1.0,
        };

        let mut flat = CandidatePool::from_logits(&[0.0; 4]);
        flat.softmax();
        assert!((dynamic.temperature(&flat) - 1.5).abs() < 1e-5);

        let mut peaked = CandidatePool::from_logits(&[100.0, 0.0, 0.0, 0.0]);
        peaked.softmax();
        assert!((dynamic.temperature(&peaked) - 0.5).abs() < 1e-3);

        let mut single = CandidatePool::from_logits(&[3.0]);
        single.softmax();
        assert_eq!(dynamic.temperature(&single), 1.0);
    }

    #[test]
    fn test_dynamic_temperature_stays_positive() {
        let dynamic = DynamicTemp {
            temp: 0.5,
            range: 1.0,
            exponent: 1.0,
        };
        let mut peaked = CandidatePool::from_logits(&[100.0, 0.0]);
        peaked.softmax();
        assert!(dynamic.temperature(&peaked) > 0.0);
    }
}
