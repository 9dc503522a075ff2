use itertools::Itertools;

use super::Filter;
use crate::CandidatePool;

/// Tail-free sampling: cut where the curvature of the sorted distribution
/// has accumulated more than `z` of its total mass.
#[derive(Debug, Clone, Copy)]
pub struct TailFree(pub f32);

impl Filter for TailFree {
    fn apply(&self, mut pool: CandidatePool) -> CandidatePool {
        pool.softmax();
        if pool.len() <= 2 {
            return pool;
        }

        let second_derivatives = pool
            .iter()
            .tuple_windows()
            .map(|(a, b)| a.p - b.p)
            .tuple_windows()
            .map(|(a, b): (f32, f32)| (a - b).abs())
            .collect_vec();

        let sum: f32 = second_derivatives.iter().sum();
        let normalized = match sum > 1e-6 {
            true => second_derivatives.iter().map(|x| x / sum).collect_vec(),
            false => vec![1.0 / second_derivatives.len() as f32; second_derivatives.len()],
        };

        let mut cum = 0.0;
        let keep = normalized
            .iter()
            .enumerate()
            .position(|(index, x)| {
                cum += x;
                cum > self.0 && index >= 1
            })
            .unwrap_or(pool.len());
        pool.truncate(keep);
        pool
    }
}
