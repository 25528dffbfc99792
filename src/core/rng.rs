//! Deterministic random number generation.
//!
//! ## Key Features
//!
//! - **Deterministic**: same seed produces an identical sequence, so a
//!   seeded room replays identically given the same event order
//! - **Single stream**: die faces, question draws and content
//!   instantiation all flow through one generator
//!
//! Uses ChaCha8 for speed while keeping high-quality randomness.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Deterministic RNG for one room.
#[derive(Clone, Debug)]
pub struct GameRng {
    inner: ChaCha8Rng,
    seed: u64,
}

impl GameRng {
    /// Create a new RNG with the given seed.
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self {
            inner: ChaCha8Rng::seed_from_u64(seed),
            seed,
        }
    }

    /// Create a new RNG from an entropy seed.
    #[must_use]
    pub fn from_entropy() -> Self {
        Self::new(rand::random())
    }

    /// The seed this RNG was created with.
    #[must_use]
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Roll a die with the given number of faces, returning 1..=faces.
    pub fn die_roll(&mut self, faces: u8) -> u8 {
        debug_assert!(faces >= 1);
        self.inner.gen_range(1..=faces)
    }

    /// Generate a random usize in the given range.
    pub fn gen_range_usize(&mut self, range: std::ops::Range<usize>) -> usize {
        self.inner.gen_range(range)
    }

    /// Choose a random element with weighted probability.
    ///
    /// Returns the index of the chosen element. Weights do not need to
    /// sum to 1.0. Returns `None` if weights are empty or all zero.
    pub fn choose_weighted(&mut self, weights: &[f32]) -> Option<usize> {
        if weights.is_empty() {
            return None;
        }

        let total: f32 = weights.iter().sum();
        if total <= 0.0 {
            return None;
        }

        let mut threshold = self.inner.gen::<f32>() * total;

        for (i, &weight) in weights.iter().enumerate() {
            threshold -= weight;
            if threshold <= 0.0 {
                return Some(i);
            }
        }

        // Floating point edge case - return last weight
        Some(weights.len() - 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_determinism() {
        let mut rng1 = GameRng::new(42);
        let mut rng2 = GameRng::new(42);

        for _ in 0..100 {
            assert_eq!(rng1.die_roll(3), rng2.die_roll(3));
        }
    }

    #[test]
    fn test_different_seeds() {
        let mut rng1 = GameRng::new(1);
        let mut rng2 = GameRng::new(2);

        let seq1: Vec<_> = (0..20).map(|_| rng1.gen_range_usize(0..1000)).collect();
        let seq2: Vec<_> = (0..20).map(|_| rng2.gen_range_usize(0..1000)).collect();

        assert_ne!(seq1, seq2);
    }

    #[test]
    fn test_die_roll_in_range() {
        let mut rng = GameRng::new(7);
        for _ in 0..1000 {
            let face = rng.die_roll(3);
            assert!((1..=3).contains(&face));
        }
    }

    #[test]
    fn test_die_roll_covers_all_faces() {
        let mut rng = GameRng::new(7);
        let mut seen = [false; 3];
        for _ in 0..1000 {
            seen[(rng.die_roll(3) - 1) as usize] = true;
        }
        assert_eq!(seen, [true, true, true]);
    }

    #[test]
    fn test_weighted_empty_and_zero() {
        let mut rng = GameRng::new(42);
        assert_eq!(rng.choose_weighted(&[]), None);
        assert_eq!(rng.choose_weighted(&[0.0, 0.0]), None);
    }

    #[test]
    fn test_weighted_single_nonzero() {
        let mut rng = GameRng::new(42);
        for _ in 0..100 {
            assert_eq!(rng.choose_weighted(&[0.0, 1.0, 0.0]), Some(1));
        }
    }

    #[test]
    fn test_weighted_distribution_roughly_follows_weights() {
        let mut rng = GameRng::new(42);
        let weights = [0.1, 0.9];
        let mut counts = [0u32; 2];
        for _ in 0..10_000 {
            counts[rng.choose_weighted(&weights).unwrap()] += 1;
        }
        assert!(counts[1] > counts[0] * 4, "counts: {counts:?}");
    }
}
