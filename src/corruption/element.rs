//! Per-type random value generation and the shared overwrite helper every
//! frame variant funnels through.
//!
//! SPDX-License-Identifier: MIT

use crate::rng::RandomSource;

/// A fixed-width value that can be replaced by a random one from its full
/// representable range
pub trait Element: Copy {
    fn random(rng: &mut dyn RandomSource) -> Self;
}

// Truncating 64 random bits keeps integer draws uniform over the whole range
macro_rules! int_element {
    ($($ty:ty => $bits:ty),* $(,)?) => {
        $(
            impl Element for $ty {
                #[inline]
                fn random(rng: &mut dyn RandomSource) -> Self {
                    rng.next_u64() as $bits as $ty
                }
            }
        )*
    };
}

int_element!(
    u8 => u8,
    i8 => u8,
    u16 => u16,
    i16 => u16,
    u32 => u32,
    i32 => u32,
);

impl Element for f32 {
    #[inline]
    fn random(rng: &mut dyn RandomSource) -> Self {
        ((rng.next_f64() * 2.0 - 1.0) * f32::MAX as f64) as f32
    }
}

impl Element for f64 {
    #[inline]
    fn random(rng: &mut dyn RandomSource) -> Self {
        (rng.next_f64() * 2.0 - 1.0) * f64::MAX
    }
}

/// Overwrite `rounds` randomly chosen elements with random values. The same
/// index may be picked more than once.
pub fn overwrite<T: Element>(elems: &mut [T], rounds: usize, rng: &mut dyn RandomSource) {
    if elems.is_empty() {
        return;
    }

    for _ in 0..rounds {
        // Pick an index to mutate
        let idx = rng.below(elems.len());

        // Set the value there randomly
        elems[idx] = T::random(rng);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rng::ChaChaSource;

    #[test]
    fn floats_stay_finite() {
        let mut rng = ChaChaSource::seeded(11);
        for _ in 0..10_000 {
            assert!(f32::random(&mut rng).is_finite());
            assert!(f64::random(&mut rng).is_finite());
        }
    }

    #[test]
    fn signed_bytes_reach_both_signs() {
        let mut rng = ChaChaSource::seeded(5);
        let draws: Vec<i8> = (0..512).map(|_| i8::random(&mut rng)).collect();
        assert!(draws.iter().any(|v| *v < 0));
        assert!(draws.iter().any(|v| *v > 0));
    }

    #[test]
    fn single_element_absorbs_every_round() {
        let mut rng = ChaChaSource::seeded(9);
        let mut elems = [0u32];
        overwrite(&mut elems, 5, &mut rng);
        // One index draw and one value draw per round
        assert_eq!(rng.draws(), 10);
    }

    #[test]
    fn empty_slice_draws_nothing() {
        let mut rng = ChaChaSource::seeded(9);
        let mut elems: [u8; 0] = [];
        overwrite(&mut elems, 3, &mut rng);
        assert_eq!(rng.draws(), 0);
    }
}
