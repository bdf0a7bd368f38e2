//! Injectable randomness for tie-breaks and connection selection.

use std::fmt;

use rand::Rng;

/// Source of the fetcher's random choices.
pub trait RandomSource: Send + Sync + fmt::Debug {
    /// Fair coin; `true` selects the first of two candidates.
    fn coin_flip(&self) -> bool;

    /// Uniform index in `0..len`. `len` is never zero.
    fn pick(&self, len: usize) -> usize;
}

/// Thread-local generator.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadRandom;

impl RandomSource for ThreadRandom {
    fn coin_flip(&self) -> bool {
        rand::thread_rng().gen_bool(0.5)
    }

    fn pick(&self, len: usize) -> usize {
        rand::thread_rng().gen_range(0..len)
    }
}
