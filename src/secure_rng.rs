//! Seedable ChaCha20 random number generation for bootstrap resampling.
//!
//! Every generator is owned by the call that creates it. There is no
//! process-wide generator and no shared state to reseed, so two calls with
//! the same seed always draw the same sequence.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;

/// ChaCha20 wrapper used for drawing bootstrap indices.
#[derive(Debug, Clone)]
pub struct SecureRng {
    rng: ChaCha20Rng,
    seed: Option<u64>,
}

impl Default for SecureRng {
    fn default() -> Self {
        Self::new()
    }
}

impl SecureRng {
    /// Create a generator seeded from OS entropy.
    pub fn new() -> Self {
        Self {
            rng: ChaCha20Rng::from_entropy(),
            seed: None,
        }
    }

    /// Create a generator with a fixed seed for reproducible draws.
    ///
    /// The `u64` is expanded to the full 256-bit ChaCha key by
    /// `seed_from_u64`.
    pub fn with_seed(seed: u64) -> Self {
        log::trace!("seeding ChaCha20 generator with {}", seed);
        Self {
            rng: ChaCha20Rng::seed_from_u64(seed),
            seed: Some(seed),
        }
    }

    /// Seed this generator was created with, if any.
    pub fn seed(&self) -> Option<u64> {
        self.seed
    }

    /// Fill `buffer` with uniform draws from `0..upper`.
    ///
    /// Draws are sampled as `u64` so that a seed yields the same indices on
    /// 32-bit and 64-bit targets.
    pub fn fill_usize(&mut self, buffer: &mut [usize], upper: usize) {
        let upper = upper as u64;
        for value in buffer.iter_mut() {
            *value = self.rng.gen_range(0..upper) as usize;
        }
    }
}
