//! Randomness seam for the fault path. Everything that rolls dice goes through
//! `RandomSource` so tests can seed it and count how much entropy was pulled.
//!
//! SPDX-License-Identifier: MIT

use std::sync::{Arc, Mutex};

use rand::{Rng, RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::misc::lock;

/// Trait all random sources must implement
pub trait RandomSource: Send {
    /// Return 64 uniformly random bits
    fn next_u64(&mut self) -> u64;

    /// Return a uniform real in [0, 1)
    fn next_f64(&mut self) -> f64;

    /// Return a uniform index in [0, bound), `bound` must be non-zero
    fn below(&mut self, bound: usize) -> usize;

    /// Return a uniform value in [low, high]
    fn between(&mut self, low: usize, high: usize) -> usize;

    /// Number of draws taken so far
    fn draws(&self) -> u64;
}

/// Default source backed by ChaCha8, reproducible when seeded
pub struct ChaChaSource {
    rng: ChaCha8Rng,
    draws: u64,
}

impl ChaChaSource {
    pub fn seeded(seed: u64) -> Self {
        ChaChaSource {
            rng: ChaCha8Rng::seed_from_u64(seed),
            draws: 0,
        }
    }

    pub fn from_entropy() -> Self {
        ChaChaSource {
            rng: ChaCha8Rng::from_entropy(),
            draws: 0,
        }
    }
}

impl RandomSource for ChaChaSource {
    fn next_u64(&mut self) -> u64 {
        self.draws += 1;
        self.rng.next_u64()
    }

    fn next_f64(&mut self) -> f64 {
        self.draws += 1;
        self.rng.gen::<f64>()
    }

    fn below(&mut self, bound: usize) -> usize {
        self.draws += 1;
        self.rng.gen_range(0..bound)
    }

    fn between(&mut self, low: usize, high: usize) -> usize {
        self.draws += 1;
        self.rng.gen_range(low..=high)
    }

    fn draws(&self) -> u64 {
        self.draws
    }
}

/// Shared handle to one random source. Cloning shares the underlying state,
/// which is what lets a deferred corruption keep drawing after the caller has
/// moved on.
#[derive(Clone)]
pub struct Entropy {
    source: Arc<Mutex<Box<dyn RandomSource>>>,
}

impl Entropy {
    pub fn new<R: RandomSource + 'static>(source: R) -> Self {
        Entropy {
            source: Arc::new(Mutex::new(Box::new(source))),
        }
    }

    pub fn seeded(seed: u64) -> Self {
        Entropy::new(ChaChaSource::seeded(seed))
    }

    pub fn from_entropy() -> Self {
        Entropy::new(ChaChaSource::from_entropy())
    }

    /// Run `f` with exclusive access to the source
    pub fn with<T>(&self, f: impl FnOnce(&mut dyn RandomSource) -> T) -> T {
        let mut guard = lock(&self.source);
        f(guard.as_mut())
    }

    pub fn draws(&self) -> u64 {
        lock(&self.source).draws()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeded_sources_agree() {
        let mut a = ChaChaSource::seeded(7);
        let mut b = ChaChaSource::seeded(7);
        for _ in 0..32 {
            assert_eq!(a.next_u64(), b.next_u64());
        }
    }

    #[test]
    fn between_is_inclusive() {
        let mut rng = ChaChaSource::seeded(1);
        let mut seen = [false; 5];
        for _ in 0..1_000 {
            let v = rng.between(1, 5);
            assert!((1..=5).contains(&v));
            seen[v - 1] = true;
        }
        assert!(seen.iter().all(|s| *s));
    }

    #[test]
    fn entropy_counts_draws_across_clones() {
        let entropy = Entropy::seeded(3);
        let other = entropy.clone();
        entropy.with(|rng| rng.next_f64());
        other.with(|rng| rng.below(10));
        assert_eq!(entropy.draws(), 2);
    }
}
