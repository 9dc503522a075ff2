use std::cmp::Ordering;

use itertools::Itertools;
use voracious_radix_sort::{RadixSort, Radixable};

use super::Filter;
use crate::{Candidate, CandidatePool};

/// Distance of a candidate's information content from the pool entropy.
#[derive(Debug, Clone, Copy)]
struct Deviation {
    index: usize,
    distance: f32,
}

impl Deviation {
    fn new(index: usize, candidate: &Candidate, entropy: f32) -> Self {
        let distance = match candidate.p > 0.0 {
            true => (-candidate.p.ln() - entropy).abs(),
            false => f32::INFINITY,
        };
        Self { index, distance }
    }
}

impl PartialEq for Deviation {
    fn eq(&self, other: &Self) -> bool {
        self.distance == other.distance
    }
}

impl PartialOrd for Deviation {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        self.distance.partial_cmp(&other.distance)
    }
}

impl Radixable<f32> for Deviation {
    type Key = f32;
    #[inline]
    fn key(&self) -> Self::Key {
        self.distance
    }
}

/// Locally typical sampling: prefer tokens whose information content is
/// close to the entropy of the distribution, up to mass `p`.
#[derive(Debug, Clone, Copy)]
pub struct Typical(pub f32);

impl Filter for Typical {
    fn apply(&self, mut pool: CandidatePool) -> CandidatePool {
        pool.softmax();
        let entropy = pool.entropy();

        let mut shifted = pool
            .iter()
            .enumerate()
            .map(|(index, c)| Deviation::new(index, c, entropy))
            .collect_vec();
        shifted.voracious_sort();

        let candidates = pool.as_slice();
        let mut cum = 0.0;
        let keep = shifted
            .iter()
            .position(|deviation| {
                cum += candidates[deviation.index].p;
                cum > self.0
            })
            .map(|position| position + 1)
            .unwrap_or(shifted.len());

        let data = shifted
            .into_iter()
            .take(keep)
            .map(|deviation| candidates[deviation.index])
            .collect();
        let mut pool = CandidatePool::from_vec(data);
        pool.sort();
        pool
    }
}
