use std::collections::{HashMap, VecDeque};

use itertools::Itertools;

/// Fixed-capacity record of accepted tokens, oldest first.
#[derive(Debug, Clone, Default)]
pub struct HistoryBuffer {
    tokens: VecDeque<u32>,
    capacity: usize,
}

impl HistoryBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            tokens: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Append a token, evicting the oldest one once the capacity is exceeded.
    pub fn push(&mut self, token: u32) {
        if self.capacity == 0 {
            return;
        }
        if self.tokens.len() == self.capacity {
            self.tokens.pop_front();
        }
        self.tokens.push_back(token);
    }

    /// The most recent `min(n, len)` tokens, most recent last. A negative `n` selects everything.
    pub fn window(&self, n: i32) -> impl DoubleEndedIterator<Item = u32> + '_ {
        let n = match usize::try_from(n) {
            Ok(n) => n.min(self.tokens.len()),
            Err(_) => self.tokens.len(),
        };
        self.tokens.range(self.tokens.len() - n..).copied()
    }

    /// Occurrences of each token inside the window.
    pub fn counts(&self, n: i32) -> HashMap<u32, usize> {
        self.window(n).counts()
    }

    /// Occurrences of `token` inside the window.
    pub fn count(&self, token: u32, n: i32) -> usize {
        self.window(n).filter(|&x| x == token).count()
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = u32> + '_ {
        self.tokens.iter().copied()
    }

    pub fn clear(&mut self) {
        self.tokens.clear();
    }
}
