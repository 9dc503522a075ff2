use super::Filter;
use crate::CandidatePool;

/// Keep the `k` highest-scoring candidates. A `k` of 0 keeps all.
#[derive(Debug, Clone, Copy)]
pub struct TopK(pub usize);

impl Filter for TopK {
    fn apply(&self, mut pool: CandidatePool) -> CandidatePool {
        pool.sort();
        if self.0 > 0 {
            pool.truncate(self.0);
        }
        pool
    }
}

/// Keep the smallest prefix whose probability mass reaches `p`.
#[derive(Debug, Clone, Copy)]
pub struct TopP(pub f32);

impl Filter for TopP {
    fn apply(&self, mut pool: CandidatePool) -> CandidatePool {
        pool.softmax();
        let mut cum = 0.0;
        let keep = pool
            .iter()
            .position(|c| {
                cum += c.p;
                cum >= self.0
            })
            .map(|index| index + 1)
            .unwrap_or(pool.len());
        pool.truncate(keep);
        pool
    }
}

/// Keep candidates at least `p` times as likely as the most likely one.
#[derive(Debug, Clone, Copy)]
pub struct MinP(pub f32);

impl Filter for MinP {
    fn apply(&self, mut pool: CandidatePool) -> CandidatePool {
        pool.softmax();
        let Some(head) = pool.first() else {
            return pool;
        };
        let threshold = head.p * self.0;
        let keep = pool.iter().take_while(|c| c.p >= threshold).count();
        pool.truncate(keep);
        pool
    }
}
