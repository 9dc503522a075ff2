use super::{
    nucleus::{MinP, TopK, TopP},
    tail_free::TailFree,
    typical::Typical,
    Filter,
};
use crate::{CandidatePool, SamplingParams};

/// Truncation filters applied in order, followed by the `min_keep` floor.
#[derive(Debug, Default)]
pub struct FilterChain {
    filters: Vec<Box<dyn Filter + Send + Sync>>,
    min_keep: usize,
}

impl FilterChain {
    pub fn new(min_keep: usize) -> Self {
        Self {
            filters: Vec::new(),
            min_keep,
        }
    }

    /// Build the chain top-k, tail-free, typical, top-p, min-p, skipping filters at their disabled values.
    pub fn from_params(params: &SamplingParams) -> Self {
        let mut chain = Self::new(params.min_keep.max(0) as usize);
        if params.top_k > 0 {
            chain = chain.with(TopK(params.top_k as usize));
        }
        if params.tfs_z < 1.0 {
            chain = chain.with(TailFree(params.tfs_z));
        }
        if params.typical_p < 1.0 {
            chain = chain.with(Typical(params.typical_p));
        }
        if params.top_p < 1.0 {
            chain = chain.with(TopP(params.top_p));
        }
        if params.min_p > 0.0 {
            chain = chain.with(MinP(params.min_p));
        }
        chain
    }

    pub fn with(mut self, filter: impl Filter + Send + Sync + 'static) -> Self {
        self.filters.push(Box::new(filter));
        self
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    pub fn min_keep(&self) -> usize {
        self.min_keep
    }

    /// Run every filter. If fewer than `max(min_keep, 1)` candidates survive,
    /// return the highest-scoring ones from the pool as it was before the chain.
    pub fn apply(&self, mut pool: CandidatePool) -> CandidatePool {
        if pool.is_empty() {
            return pool;
        }
        let floor = self.min_keep.max(1).min(pool.len());
        let reserve = pool.top(floor);

        let pool = self
            .filters
            .iter()
            .fold(pool, |pool, filter| filter.apply(pool));
        match pool.len() < floor {
            true => {
                let mut pool = CandidatePool::from_vec(reserve);
                pool.sort();
                pool
            }
            false => pool,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_params_order() {
        let params = SamplingParams {
            top_k: 10,
            tfs_z: 0.9,
            typical_p: 0.9,
            top_p: 0.9,
            min_p: 0.1,
            ..Default::default()
        };
        let chain = FilterChain::from_params(&params);
        let names = format!("{chain:?}");
        let order = ["TopK", "TailFree", "Typical", "TopP", "MinP"]
            .map(|name| names.find(name).unwrap());
        assert!(order.windows(2).all(|pair| pair[0] < pair[1]));
    }

    #[test]
    fn test_disabled_sentinels() {
        let params = SamplingParams {
            top_k: 0,
            tfs_z: 1.0,
            typical_p: 1.0,
            top_p: 1.0,
            min_p: 0.0,
            ..Default::default()
        };
        assert!(FilterChain::from_params(&params).is_empty());
    }

    #[test]
    fn test_min_keep_floor() {
        let chain = FilterChain::new(3).with(TopK(1));
        let pool = chain.apply(CandidatePool::from_logits(&[0.0, 4.0, 1.0, 3.0, 2.0]));
        assert_eq!(pool.ids(), vec![1, 3, 4]);
    }

    #[test]
    fn test_min_keep_capped_by_pool() {
        let chain = FilterChain::new(10).with(TopP(0.1));
        let pool = chain.apply(CandidatePool::from_logits(&[0.0, 1.0]));
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn test_min_keep_not_needed() {
        let chain = FilterChain::new(2).with(TopK(3));
        let pool = chain.apply(CandidatePool::from_logits(&[0.0, 4.0, 1.0, 3.0, 2.0]));
        assert_eq!(pool.ids(), vec![1, 3, 4]);
    }
}
