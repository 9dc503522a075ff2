//! The working set of tokens during one sampling call.
//!
//! Filters and strategies take the pool by value or by mutable reference and
//! leave it sorted by logit, most likely first, whenever they compute
//! probabilities. A pool handed to a filter or strategy is never empty.

use itertools::Itertools;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    pub id: u32,
    pub logit: f32,
    /// Probability after the last softmax over the pool.
    pub p: f32,
}

impl Candidate {
    pub fn new(id: u32, logit: f32) -> Self {
        Self { id, logit, p: 0.0 }
    }

    /// Information content in bits.
    #[inline]
    pub fn surprise(&self) -> f32 {
        -self.p.log2()
    }
}

#[derive(Debug, Clone, Default)]
pub struct CandidatePool {
    data: Vec<Candidate>,
    sorted: bool,
}

impl CandidatePool {
    /// Copy raw model scores into a pool. `NaN` becomes negative infinity and
    /// positive infinity is clamped so the softmax stays finite.
    pub fn from_logits(logits: &[f32]) -> Self {
        let data = logits
            .iter()
            .enumerate()
            .map(|(id, &logit)| {
                let logit = match logit.is_nan() {
                    true => f32::NEG_INFINITY,
                    false => logit.min(f32::MAX),
                };
                Candidate::new(id as u32, logit)
            })
            .collect();
        Self {
            data,
            sorted: false,
        }
    }

    pub fn from_vec(data: Vec<Candidate>) -> Self {
        Self {
            data,
            sorted: false,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    pub fn as_slice(&self) -> &[Candidate] {
        &self.data
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Candidate> {
        self.data.iter()
    }

    /// Mutable access invalidates the sort order.
    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, Candidate> {
        self.sorted = false;
        self.data.iter_mut()
    }

    pub fn first(&self) -> Option<Candidate> {
        self.data.first().copied()
    }

    pub fn get(&self, id: u32) -> Option<Candidate> {
        self.data.iter().find(|c| c.id == id).copied()
    }

    pub fn contains(&self, id: u32) -> bool {
        self.data.iter().any(|c| c.id == id)
    }

    pub fn ids(&self) -> Vec<u32> {
        self.data.iter().map(|c| c.id).collect()
    }

    pub fn set_logit(&mut self, id: u32, logit: f32) {
        if let Some(candidate) = self.data.iter_mut().find(|c| c.id == id) {
            candidate.logit = logit;
            self.sorted = false;
        }
    }

    /// Sort by logit descending; ties go to the lower token id.
    pub fn sort(&mut self) {
        if self.sorted {
            return;
        }
        self.data
            .sort_by(|a, b| b.logit.total_cmp(&a.logit).then(a.id.cmp(&b.id)));
        self.sorted = true;
    }

    /// Sort and compute probabilities. The exponent sum is taken in `f64`.
    pub fn softmax(&mut self) {
        self.sort();
        let Some(max) = self.data.first().map(|c| c.logit) else {
            return;
        };
        if max == f32::NEG_INFINITY {
            let p = 1.0 / self.data.len() as f32;
            self.data.iter_mut().for_each(|c| c.p = p);
            return;
        }

        let sum = self.data.iter_mut().fold(0.0f64, |sum, c| {
            c.p = (c.logit - max).exp();
            sum + c.p as f64
        });
        let sum = sum as f32;
        self.data.iter_mut().for_each(|c| c.p /= sum);
    }

    /// Keep the first `len` candidates, never fewer than one.
    pub fn truncate(&mut self, len: usize) {
        self.data.truncate(len.max(1));
    }

    /// A new pool holding only the candidates that pass `f`. May be empty.
    pub fn filtered(&self, f: impl Fn(&Candidate) -> bool) -> Self {
        let data = self.data.iter().filter(|c| f(c)).copied().collect();
        Self {
            data,
            sorted: self.sorted,
        }
    }

    /// Divide every logit by `temp`. Order is preserved for positive `temp`.
    pub fn scale(&mut self, temp: f32) {
        if temp <= 0.0 || temp == 1.0 {
            return;
        }
        self.data.iter_mut().for_each(|c| c.logit /= temp);
    }

    /// The `n` highest-scoring candidates.
    pub fn top(&mut self, n: usize) -> Vec<Candidate> {
        self.sort();
        self.data.iter().take(n).copied().collect()
    }

    /// Shannon entropy in nats of the current probabilities.
    pub fn entropy(&self) -> f32 {
        self.data
            .iter()
            .filter(|c| c.p > 0.0)
            .map(|c| -c.p * c.p.ln())
            .sum()
    }

    /// Draw one candidate in proportion to `p`. Falls back to the first
    /// candidate when the probabilities are degenerate.
    pub fn draw(&self, rng: &mut fastrand::Rng) -> Option<Candidate> {
        let sum: f32 = self.data.iter().map(|c| c.p).sum();
        if !(sum.is_finite() && sum > 0.0) {
            return self.first();
        }

        let rand = rng.f32() * sum;
        self.data
            .iter()
            .scan(0.0, |cum, &c| {
                *cum += c.p;
                Some((*cum, c))
            })
            .filter(|(_, c)| c.p > 0.0)
            .find_or_last(|&(cum, _)| rand < cum)
            .map(|(_, c)| c)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_logits_sanitizes() {
        let pool = CandidatePool::from_logits(&[f32::NAN, f32::INFINITY, 1.0]);
        assert_eq!(pool.len(), 3);
        assert_eq!(pool.as_slice()[0].logit, f32::NEG_INFINITY);
        assert_eq!(pool.as_slice()[1].logit, f32::MAX);
        assert_eq!(pool.as_slice()[2].logit, 1.0);
    }

    #[test]
    fn test_sort_breaks_ties_by_id() {
        let mut pool = CandidatePool::from_logits(&[1.0, 3.0, 3.0, 2.0]);
        pool.sort();
        assert_eq!(pool.ids(), vec![1, 2, 3, 0]);
    }

    #[test]
    fn test_softmax() {
        let mut pool = CandidatePool::from_logits(&[0.0, 2.0, 1.0, -1.0]);
        pool.softmax();
        assert_eq!(pool.ids(), vec![1, 2, 0, 3]);

        let sum: f32 = pool.iter().map(|c| c.p).sum();
        assert!((sum - 1.0).abs() < 1e-5);
        for pair in pool.as_slice().windows(2) {
            assert!(pair[0].p >= pair[1].p);
        }
        assert!((pool.as_slice()[0].p - 0.6439).abs() < 1e-3);
    }

    #[test]
    fn test_softmax_all_negative_infinity() {
        let mut pool = CandidatePool::from_logits(&[f32::NEG_INFINITY; 4]);
        pool.softmax();
        assert!(pool.iter().all(|c| c.p == 0.25));
    }

    #[test]
    fn test_softmax_single_candidate() {
        let mut pool = CandidatePool::from_logits(&[-3.0]);
        pool.softmax();
        assert_eq!(pool.as_slice()[0].p, 1.0);
        assert_eq!(pool.as_slice()[0].surprise(), 0.0);
    }

    #[test]
    fn test_truncate_keeps_one() {
        let mut pool = CandidatePool::from_logits(&[0.0, 1.0, 2.0]);
        pool.sort();
        pool.truncate(0);
        assert_eq!(pool.ids(), vec![2]);
    }

    #[test]
    fn test_entropy_uniform() {
        let mut pool = CandidatePool::from_logits(&[0.0; 8]);
        pool.softmax();
        assert!((pool.entropy() - 8f32.ln()).abs() < 1e-5);
    }

    #[test]
    fn test_draw_skips_zero_probability() {
        let mut pool = CandidatePool::from_logits(&[f32::NEG_INFINITY, 0.0, f32::NEG_INFINITY]);
        pool.softmax();
        let mut rng = fastrand::Rng::with_seed(7);
        for _ in 0..32 {
            assert_eq!(pool.draw(&mut rng).map(|c| c.id), Some(1));
        }
    }

    #[test]
    fn test_draw_follows_distribution() {
        let mut pool = CandidatePool::from_logits(&[0.0, 0.0]);
        pool.softmax();
        let mut rng = fastrand::Rng::with_seed(42);
        let hits = (0..2000)
            .filter_map(|_| pool.draw(&mut rng))
            .filter(|c| c.id == 0)
            .count();
        assert!((800..1200).contains(&hits), "{hits}");
    }
}
